//! End-to-end turns against a scripted model and the real tool registry.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use deskpilot::agent::{Agent, Clock, Session, Tier, TierSelector, TurnOutcome};
use deskpilot::config::{BrowserConfig, Config, RetryConfig};
use deskpilot::llm::{
    GenerationConfig, LlmClient, LlmError, Message, Part, Role, ToolCall, ToolSchema,
};
use deskpilot::tools::{Browser, ToolContext, ToolRegistry};

struct FixedClock;

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }
}

/// Replays replies in order and remembers what each call saw.
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Message, LlmError>>>,
    seen: Mutex<Vec<(String, Vec<Message>)>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<Message, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn models(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    fn last_history(&self) -> Vec<Message> {
        self.seen.lock().unwrap().last().unwrap().1.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedModel {
    async fn generate(
        &self,
        model: &str,
        history: &[Message],
        _tools: &[ToolSchema],
        _config: &GenerationConfig,
    ) -> Result<Message, LlmError> {
        self.seen
            .lock()
            .unwrap()
            .push((model.to_string(), history.to_vec()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Request("no more replies".into())))
    }
}

fn text(s: &str) -> Result<Message, LlmError> {
    Ok(Message::model(vec![Part::Text(s.into())]))
}

fn call(name: &str, args: serde_json::Value) -> Part {
    Part::ToolCall(ToolCall::new(name, args))
}

fn session_in(
    workspace: &std::path::Path,
    model: Arc<ScriptedModel>,
    max_iterations: usize,
) -> Session {
    let mut config = Config::new("test-key".into(), workspace.to_path_buf());
    config.max_iterations = max_iterations;
    config.retry = RetryConfig::immediate(3);

    let browser = Arc::new(Browser::new(BrowserConfig {
        webdriver_url: "http://127.0.0.1:9".into(),
        headless: true,
    }));
    let tools = ToolRegistry::new(ToolContext::new(workspace.to_path_buf()), browser.clone());
    let selector = TierSelector::new(
        config.models.capable_daily_quota,
        Arc::new(FixedClock),
    );

    Session::with_parts(
        Agent::new(model, tools, &config),
        selector,
        browser,
        config.max_history_turns,
    )
}

#[tokio::test]
async fn listing_files_is_a_fast_four_message_turn() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    std::fs::create_dir(dir.path().join("photos")).unwrap();

    let model = ScriptedModel::new(vec![
        Ok(Message::model(vec![call("list_files", json!({"directory": "."}))])),
        text("You have notes.txt and a photos folder."),
    ]);
    let mut session = session_in(dir.path(), model.clone(), 25);

    let report = session
        .submit("list files in the current folder")
        .await
        .unwrap();

    assert_eq!(report.tier, Tier::Fast);
    assert_eq!(
        report.outcome,
        TurnOutcome::Answer("You have notes.txt and a photos folder.".into())
    );
    assert_eq!(session.history().len(), 4);
    assert_eq!(session.status().await.quota.used, 0);

    // The second model call saw the listing as a tool result.
    let history = model.last_history();
    let listing = match &history[2].parts[0] {
        Part::ToolResult(result) => result.value.clone(),
        other => panic!("expected a tool result, got {:?}", other),
    };
    assert_eq!(history[2].role, Role::Tool);
    assert_eq!(listing, "📄 notes.txt (5 B)\n📁 photos/");
}

#[tokio::test]
async fn rate_limited_capable_turn_finishes_on_fast() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        Err(LlmError::RateLimited("RESOURCE_EXHAUSTED".into())),
        text("Here is the analysis."),
    ]);
    let mut session = session_in(dir.path(), model.clone(), 25);

    let report = session
        .submit("analyze last month's budget")
        .await
        .unwrap();

    assert_eq!(report.tier, Tier::Fast);
    let models = model.models();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0], session.agent().models().capable);
    assert_eq!(models[1], session.agent().models().fast);
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn endless_tool_requests_hit_the_iteration_limit() {
    let dir = tempfile::tempdir().unwrap();
    let replies = (0..5)
        .map(|_| Ok(Message::model(vec![call("list_files", json!({}))])))
        .collect();
    let model = ScriptedModel::new(replies);
    let mut session = session_in(dir.path(), model.clone(), 3);

    let report = session.submit("show everything").await.unwrap();

    assert_eq!(report.outcome, TurnOutcome::IterationLimit);
    assert_eq!(model.models().len(), 3);
    // user + 3 × (call, results): every call stays paired with its results.
    let roles: Vec<Role> = session.history().messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Model,
            Role::Tool,
            Role::Model,
            Role::Tool,
            Role::Model,
            Role::Tool
        ]
    );
}

#[tokio::test]
async fn several_calls_produce_one_tool_message() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        Ok(Message::model(vec![
            call("write_file", json!({"path": "a.txt", "content": "A"})),
            call("nonexistent_tool", json!({})),
            call("read_file", json!({"path": "a.txt"})),
        ])),
        text("Done."),
    ]);
    let mut session = session_in(dir.path(), model, 25);

    session.submit("save a note then read it").await.unwrap();

    let tool_messages: Vec<&Message> = session
        .history()
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 1);

    let values: Vec<&str> = tool_messages[0]
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::ToolResult(r) => Some(r.value.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(values.len(), 3);
    assert!(values[0].starts_with("Saved:"));
    assert_eq!(values[1], "Unknown tool: nonexistent_tool");
    assert_eq!(values[2], "A");
}

#[tokio::test]
async fn plain_answer_takes_a_single_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![text("Hello!")]);
    let mut session = session_in(dir.path(), model.clone(), 25);

    let report = session.submit("hi").await.unwrap();

    assert_eq!(report.iterations, 1);
    assert_eq!(report.tool_calls, 0);
    assert_eq!(model.models().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_leave_history_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        text("first"),
        Err(LlmError::Request("connection reset".into())),
        Err(LlmError::Request("connection reset".into())),
        Err(LlmError::Request("connection reset".into())),
    ]);
    let mut session = session_in(dir.path(), model, 25);

    session.submit("hi").await.unwrap();
    let err = session.submit("hi again").await.unwrap_err();

    assert!(err.to_string().contains("3 attempt(s)"));
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.status().await.turns_completed, 1);
}
