//! Bounded conversation history.

use crate::llm::Message;

/// Ordered messages of the session, capped at a number of turn pairs.
#[derive(Debug, Clone)]
pub struct History {
    messages: Vec<Message>,
    max_turns: usize,
}

impl History {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Number of user turns currently held.
    pub fn turn_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user_text()).count()
    }

    /// Drop the oldest messages beyond `max_turns * 2`.
    ///
    /// The kept window always starts at a user text message so a tool result
    /// is never separated from the call that produced it.
    pub fn trim(&mut self) {
        let cap = (self.max_turns * 2).max(1);
        if self.messages.len() > cap {
            let excess = self.messages.len() - cap;
            self.messages.drain(..excess);
        }

        let start = self
            .messages
            .iter()
            .position(|m| m.is_user_text())
            .unwrap_or(self.messages.len());
        if start > 0 {
            self.messages.drain(..start);
        }
    }

    /// Remove the most recent user message and everything after it.
    pub fn rollback_last_turn(&mut self) {
        if let Some(pos) = self.messages.iter().rposition(|m| m.is_user_text()) {
            self.messages.truncate(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Part, ToolCall, ToolResult};
    use serde_json::json;

    fn call() -> Message {
        Message::model(vec![Part::ToolCall(ToolCall::new("list_files", json!({})))])
    }

    fn result() -> Message {
        Message::tool_results(vec![ToolResult {
            name: "list_files".into(),
            value: "Empty.".into(),
        }])
    }

    #[test]
    fn trim_keeps_the_newest_pairs() {
        let mut history = History::new(2);
        for i in 0..4 {
            history.push(Message::user(format!("q{}", i)));
            history.push(Message::model(vec![Part::Text(format!("a{}", i))]));
        }
        history.trim();

        assert_eq!(history.len(), 4);
        assert_eq!(history.messages()[0], Message::user("q2"));
        assert_eq!(history.turn_count(), 2);
    }

    #[test]
    fn trim_never_starts_with_tool_output() {
        let mut history = History::new(2);
        history.push(Message::user("q0"));
        history.push(call());
        history.push(result());
        history.push(Message::model(vec![Part::Text("done".into())]));
        history.push(Message::user("q1"));
        history.trim();

        assert_eq!(history.messages()[0], Message::user("q1"));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn rollback_removes_the_failed_turn() {
        let mut history = History::new(50);
        history.push(Message::user("first"));
        history.push(Message::model(vec![Part::Text("ok".into())]));
        history.push(Message::user("second"));
        history.push(call());
        history.push(result());

        history.rollback_last_turn();
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0], Message::user("first"));
    }

    #[test]
    fn zero_turn_cap_keeps_the_latest_message() {
        let mut history = History::new(0);
        history.push(Message::user("a"));
        history.push(Message::user("b"));
        history.trim();
        assert_eq!(history.messages(), &[Message::user("b")]);
    }
}
