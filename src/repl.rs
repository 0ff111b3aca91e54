//! Interactive command line loop.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::agent::{Session, TurnOutcome};

/// One line of user input, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    Reset,
    Status,
    Empty,
    Message(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => ReplCommand::Empty,
            "exit" | "quit" => ReplCommand::Exit,
            "reset" | "clear" => ReplCommand::Reset,
            "status" | "stats" => ReplCommand::Status,
            _ => ReplCommand::Message(trimmed.to_string()),
        }
    }
}

/// Where input lines come from.
pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> Result<String, ReadlineError>;

    /// Keep a submitted message in the in-memory history.
    fn remember(&mut self, line: &str);
}

impl LineReader for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> Result<String, ReadlineError> {
        self.readline(prompt)
    }

    fn remember(&mut self, line: &str) {
        if let Err(err) = self.add_history_entry(line) {
            tracing::debug!("Failed to add history entry: {}", err);
        }
    }
}

fn print_banner(session: &Session) {
    let models = session.agent().models();
    println!("deskpilot - desktop assistant");
    println!(
        "Models: {} (fast) / {} (capable, {} calls/day)",
        models.fast, models.capable, models.capable_daily_quota
    );
    println!("Desktop: {}", session.agent().tools().context().desktop.display());
    println!("WebDriver: {}", session.browser().webdriver_url());
    println!("Tools: {}", session.agent().tools().len());
    println!("Commands: exit | reset | status\n");
}

/// Read lines until the user exits. Turn failures are reported, never fatal.
pub async fn run(session: &mut Session) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    print_banner(session);
    drive(&mut editor, session).await
}

/// Run the loop, then release the browser however the loop ended.
pub async fn drive(reader: &mut impl LineReader, session: &mut Session) -> anyhow::Result<()> {
    let outcome = read_loop(reader, session).await;
    session.shutdown().await;
    println!("Goodbye.");
    outcome
}

async fn read_loop(reader: &mut impl LineReader, session: &mut Session) -> anyhow::Result<()> {
    loop {
        let line = match reader.read_line("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Exit => return Ok(()),
            ReplCommand::Reset => {
                session.reset().await;
                println!("Conversation cleared.\n");
            }
            ReplCommand::Status => {
                println!("{}\n", session.status().await);
            }
            ReplCommand::Message(text) => {
                reader.remember(&text);

                match session.submit(&text).await {
                    Ok(report) => {
                        println!("[{} tier: {}]", report.tier, report.model);
                        match report.outcome {
                            TurnOutcome::Answer(answer) => println!("Assistant: {}\n", answer),
                            TurnOutcome::IterationLimit => {
                                println!("Assistant: Reached iteration limit.\n")
                            }
                        }
                    }
                    Err(e) => eprintln!("Error: {}\n", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::config::Config;
    use crate::llm::{GenerationConfig, LlmClient, LlmError, Message, Part, ToolSchema};

    /// Replays canned input lines and records what was remembered.
    struct ScriptedReader {
        lines: VecDeque<Result<String, ReadlineError>>,
        remembered: Vec<String>,
    }

    impl ScriptedReader {
        fn new(lines: Vec<Result<String, ReadlineError>>) -> Self {
            Self {
                lines: lines.into(),
                remembered: Vec::new(),
            }
        }
    }

    impl LineReader for ScriptedReader {
        fn read_line(&mut self, _prompt: &str) -> Result<String, ReadlineError> {
            self.lines.pop_front().unwrap_or(Err(ReadlineError::Eof))
        }

        fn remember(&mut self, line: &str) {
            self.remembered.push(line.to_string());
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn generate(
            &self,
            _model: &str,
            _history: &[Message],
            _tools: &[ToolSchema],
            _config: &GenerationConfig,
        ) -> Result<Message, LlmError> {
            Ok(Message::model(vec![Part::Text("done".into())]))
        }
    }

    fn session() -> Session {
        let mut config = Config::new("test".into(), std::env::temp_dir());
        config.browser.webdriver_url = "http://127.0.0.1:9".into();
        Session::new(&config, Arc::new(EchoLlm))
    }

    fn line(text: &str) -> Result<String, ReadlineError> {
        Ok(text.to_string())
    }

    #[tokio::test]
    async fn read_error_still_closes_the_browser() {
        let mut session = session();
        session.browser().attach_session("abc").await;
        let mut reader = ScriptedReader::new(vec![
            line("open my notes"),
            Err(ReadlineError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "terminal went away",
            ))),
        ]);

        let result = drive(&mut reader, &mut session).await;

        assert!(result.is_err());
        assert_eq!(session.history().turn_count(), 1);
        assert!(!session.browser().is_open().await);
    }

    #[tokio::test]
    async fn only_messages_are_remembered() {
        let mut session = session();
        let mut reader = ScriptedReader::new(vec![
            line("   "),
            line("status"),
            line("rename the report"),
            line("reset"),
            line("quit"),
            line("never read"),
        ]);

        drive(&mut reader, &mut session).await.unwrap();

        assert_eq!(reader.remembered, vec!["rename the report".to_string()]);
        assert_eq!(reader.lines.len(), 1);
        assert_eq!(session.history().len(), 0);
    }

    #[test]
    fn reserved_words_are_case_insensitive() {
        assert_eq!(ReplCommand::parse("  EXIT "), ReplCommand::Exit);
        assert_eq!(ReplCommand::parse("quit"), ReplCommand::Exit);
        assert_eq!(ReplCommand::parse("Clear"), ReplCommand::Reset);
        assert_eq!(ReplCommand::parse("reset"), ReplCommand::Reset);
        assert_eq!(ReplCommand::parse("stats"), ReplCommand::Status);
        assert_eq!(ReplCommand::parse("STATUS"), ReplCommand::Status);
    }

    #[test]
    fn blank_lines_are_empty() {
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
        assert_eq!(ReplCommand::parse(""), ReplCommand::Empty);
    }

    #[test]
    fn other_text_is_a_message() {
        assert_eq!(
            ReplCommand::parse("  exit the browser "),
            ReplCommand::Message("exit the browser".into())
        );
    }
}
