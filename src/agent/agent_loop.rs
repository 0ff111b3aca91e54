//! Core agent loop implementation.
//!
//! `run_turn` owns the attempt counter and tier downgrades; `run_iterations`
//! owns the model round-trip counter for one attempt.

use std::sync::Arc;

use crate::config::{Config, ModelTiers, RetryConfig};
use crate::llm::{GenerationConfig, LlmClient, LlmError, Message, ToolCall, ToolSchema};
use crate::tools::ToolRegistry;

use super::error::AgentError;
use super::history::History;
use super::prompt::build_system_prompt;
use super::tier::Tier;

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model replied without requesting tools.
    Answer(String),
    /// The round-trip cap was hit while the model still wanted tools.
    IterationLimit,
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Tier in use when the turn finished (after any downgrade).
    pub tier: Tier,
    pub model: String,
    /// Model round-trips in the successful attempt.
    pub iterations: usize,
    /// Tool calls executed in the successful attempt.
    pub tool_calls: usize,
}

struct Progress {
    outcome: TurnOutcome,
    iterations: usize,
    tool_calls: usize,
}

/// The tool-using agent.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    schemas: Vec<ToolSchema>,
    generation: GenerationConfig,
    models: ModelTiers,
    retry: RetryConfig,
    max_iterations: usize,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry, config: &Config) -> Self {
        let generation = GenerationConfig {
            system_instruction: build_system_prompt(tools.context(), &tools),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        };
        let schemas = tools.get_tool_schemas();

        Self {
            llm,
            tools,
            schemas,
            generation,
            models: config.models.clone(),
            retry: config.retry.clone(),
            max_iterations: config.max_iterations,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn models(&self) -> &ModelTiers {
        &self.models
    }

    /// Process one user message to completion.
    ///
    /// The message is appended to `history` before the first model call. On
    /// error the caller decides whether to roll it back.
    pub async fn run_turn(
        &self,
        history: &mut History,
        user_text: &str,
        tier: Tier,
    ) -> Result<TurnReport, AgentError> {
        history.push(Message::user(user_text));
        history.trim();

        let max_attempts = self.retry.max_attempts.max(1);
        let mut tier = tier;
        let mut attempt = 0;

        loop {
            let model = tier.model(&self.models).to_string();
            tracing::info!("🤖 {} ({} tier)", model, tier);

            let error = match self.run_iterations(history, &model).await {
                Ok(progress) => {
                    return Ok(TurnReport {
                        outcome: progress.outcome,
                        tier,
                        model,
                        iterations: progress.iterations,
                        tool_calls: progress.tool_calls,
                    });
                }
                Err(e) => e,
            };

            if tier == Tier::Capable
                && matches!(
                    error,
                    LlmError::RateLimited(_) | LlmError::ModelUnavailable(_)
                )
            {
                tracing::warn!("{} failed ({}), switching to fast tier", model, error);
                tier = Tier::Fast;
                continue;
            }

            attempt += 1;
            if attempt >= max_attempts {
                tracing::error!("Giving up after {} attempt(s): {}", attempt, error);
                return Err(AgentError::RetriesExhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = match error {
                LlmError::RateLimited(_) => self.retry.backoff_for(attempt - 1),
                _ => self.retry.fixed_delay,
            };
            tracing::warn!(
                "Attempt {}/{} failed: {}. Retrying in {:?}",
                attempt,
                max_attempts,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Alternate model calls and tool execution until the model answers.
    async fn run_iterations(
        &self,
        history: &mut History,
        model: &str,
    ) -> Result<Progress, LlmError> {
        let mut tool_calls = 0;

        for iteration in 1..=self.max_iterations {
            tracing::debug!("Agent iteration {}", iteration);

            let reply = self
                .llm
                .generate(model, history.messages(), &self.schemas, &self.generation)
                .await?;

            let calls: Vec<ToolCall> = reply.tool_calls().into_iter().cloned().collect();
            let answer = reply.text();
            history.push(reply);

            if calls.is_empty() {
                return Ok(Progress {
                    outcome: TurnOutcome::Answer(answer),
                    iterations: iteration,
                    tool_calls,
                });
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                results.push(self.tools.dispatch(call).await);
            }
            tool_calls += calls.len();
            history.push(Message::tool_results(results));
        }

        tracing::warn!("Iteration limit ({}) reached", self.max_iterations);
        Ok(Progress {
            outcome: TurnOutcome::IterationLimit,
            iterations: self.max_iterations,
            tool_calls,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::{Part, Role};
    use crate::tools::ToolContext;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// LLM double that replays scripted replies and records the models used.
    pub(crate) struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<Message, LlmError>>>,
        pub(crate) models: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub(crate) fn new(replies: Vec<Result<Message, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                models: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.models.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(
            &self,
            model: &str,
            _history: &[Message],
            _tools: &[ToolSchema],
            _config: &GenerationConfig,
        ) -> Result<Message, LlmError> {
            self.models.lock().unwrap().push(model.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Request("script exhausted".into())))
        }
    }

    pub(crate) fn text(s: &str) -> Result<Message, LlmError> {
        Ok(Message::model(vec![Part::Text(s.to_string())]))
    }

    pub(crate) fn calls(names: &[&str]) -> Result<Message, LlmError> {
        Ok(Message::model(
            names
                .iter()
                .map(|n| Part::ToolCall(ToolCall::new(*n, json!({}))))
                .collect(),
        ))
    }

    fn agent(llm: Arc<ScriptedLlm>, max_iterations: usize) -> Agent {
        let mut config = Config::new("test".into(), std::env::temp_dir());
        config.max_iterations = max_iterations;
        config.retry = RetryConfig::immediate(3);
        let tools = ToolRegistry::empty(ToolContext::new(std::env::temp_dir()));
        Agent::new(llm, tools, &config)
    }

    #[tokio::test]
    async fn answer_without_tools_takes_one_round_trip() {
        let llm = ScriptedLlm::new(vec![text("Hi there")]);
        let agent = agent(llm.clone(), 25);
        let mut history = History::new(50);

        let report = agent.run_turn(&mut history, "hello", Tier::Fast).await.unwrap();

        assert_eq!(report.outcome, TurnOutcome::Answer("Hi there".into()));
        assert_eq!(report.iterations, 1);
        assert_eq!(llm.calls(), 1);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn tool_results_share_one_message_in_call_order() {
        let llm = ScriptedLlm::new(vec![calls(&["first", "second", "third"]), text("done")]);
        let agent = agent(llm, 25);
        let mut history = History::new(50);

        let report = agent.run_turn(&mut history, "go", Tier::Fast).await.unwrap();
        assert_eq!(report.tool_calls, 3);

        let tool_messages: Vec<_> = history
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 1);
        let names: Vec<_> = tool_messages[0]
            .parts
            .iter()
            .map(|p| match p {
                Part::ToolResult(r) => r.name.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn iteration_limit_keeps_calls_paired() {
        let llm = ScriptedLlm::new(vec![calls(&["a"]), calls(&["b"]), calls(&["c"])]);
        let agent = agent(llm.clone(), 2);
        let mut history = History::new(50);

        let report = agent.run_turn(&mut history, "loop", Tier::Fast).await.unwrap();

        assert_eq!(report.outcome, TurnOutcome::IterationLimit);
        assert_eq!(llm.calls(), 2);
        assert_eq!(history.len(), 5);
        assert_eq!(history.messages()[4].role, Role::Tool);
    }

    #[tokio::test]
    async fn rate_limit_on_capable_downgrades_for_free() {
        let llm = ScriptedLlm::new(vec![
            Err(LlmError::RateLimited("429".into())),
            text("ok"),
        ]);
        let agent = agent(llm.clone(), 25);
        let mut history = History::new(50);

        let report = agent
            .run_turn(&mut history, "analyze", Tier::Capable)
            .await
            .unwrap();

        assert_eq!(report.tier, Tier::Fast);
        let models = llm.models.lock().unwrap().clone();
        assert_eq!(models, vec![agent.models().capable.clone(), agent.models().fast.clone()]);
    }

    #[tokio::test]
    async fn unavailable_model_on_capable_downgrades() {
        let llm = ScriptedLlm::new(vec![
            Err(LlmError::ModelUnavailable("404".into())),
            text("ok"),
        ]);
        let agent = agent(llm, 25);
        let mut history = History::new(50);

        let report = agent
            .run_turn(&mut history, "plan", Tier::Capable)
            .await
            .unwrap();
        assert_eq!(report.tier, Tier::Fast);
    }

    #[tokio::test]
    async fn persistent_failure_exhausts_attempts() {
        let llm = ScriptedLlm::new(vec![
            Err(LlmError::Request("boom".into())),
            Err(LlmError::RateLimited("429".into())),
            Err(LlmError::Request("boom".into())),
        ]);
        let agent = agent(llm.clone(), 25);
        let mut history = History::new(50);

        let err = agent.run_turn(&mut history, "hi", Tier::Fast).await.unwrap_err();

        assert!(matches!(err, AgentError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn capable_downgrade_happens_once() {
        let llm = ScriptedLlm::new(vec![
            Err(LlmError::RateLimited("429".into())),
            Err(LlmError::RateLimited("429".into())),
            Err(LlmError::RateLimited("429".into())),
            Err(LlmError::RateLimited("429".into())),
        ]);
        let agent = agent(llm.clone(), 25);
        let mut history = History::new(50);

        let err = agent
            .run_turn(&mut history, "compare", Tier::Capable)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(llm.calls(), 4);
    }
}
