//! Interactive session state: history, tier quota and the shared browser.

use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::llm::LlmClient;
use crate::tools::{Browser, ToolContext, ToolRegistry};

use super::agent_loop::{Agent, TurnReport};
use super::error::AgentError;
use super::history::History;
use super::tier::{QuotaUsage, SystemClock, TierSelector};

/// Snapshot shown by the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub quota: QuotaUsage,
    pub history_turns: usize,
    pub history_messages: usize,
    pub turns_completed: usize,
    pub browser_open: bool,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Capable quota: {}/{} today",
            self.quota.used, self.quota.limit
        )?;
        writeln!(
            f,
            "History: {} turn(s), {} message(s)",
            self.history_turns, self.history_messages
        )?;
        writeln!(f, "Completed turns: {}", self.turns_completed)?;
        write!(
            f,
            "Browser: {}",
            if self.browser_open { "open" } else { "closed" }
        )
    }
}

pub struct Session {
    agent: Agent,
    history: History,
    selector: TierSelector,
    browser: Arc<Browser>,
    turns_completed: usize,
}

impl Session {
    /// Session with the full tool set and the system clock.
    pub fn new(config: &Config, llm: Arc<dyn LlmClient>) -> Self {
        let browser = Arc::new(Browser::new(config.browser.clone()));
        let ctx = ToolContext::new(config.workspace_path.clone());
        let tools = ToolRegistry::new(ctx, browser.clone());
        let selector = TierSelector::new(config.models.capable_daily_quota, Arc::new(SystemClock));

        Self::with_parts(
            Agent::new(llm, tools, config),
            selector,
            browser,
            config.max_history_turns,
        )
    }

    pub fn with_parts(
        agent: Agent,
        selector: TierSelector,
        browser: Arc<Browser>,
        max_history_turns: usize,
    ) -> Self {
        Self {
            agent,
            history: History::new(max_history_turns),
            selector,
            browser,
            turns_completed: 0,
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Run one user turn. A failed turn leaves no trace in the history.
    pub async fn submit(&mut self, text: &str) -> Result<TurnReport, AgentError> {
        let tier = self.selector.choose_tier(text);

        match self.agent.run_turn(&mut self.history, text, tier).await {
            Ok(report) => {
                self.turns_completed += 1;
                tracing::debug!(
                    iterations = report.iterations,
                    tool_calls = report.tool_calls,
                    "Turn {} completed on {}",
                    self.turns_completed,
                    report.model
                );
                Ok(report)
            }
            Err(e) => {
                self.history.rollback_last_turn();
                Err(e)
            }
        }
    }

    /// Forget the conversation and close the browser.
    pub async fn reset(&mut self) {
        self.history.clear();
        self.browser.close().await;
        tracing::info!("Session reset");
    }

    pub async fn status(&mut self) -> SessionStatus {
        SessionStatus {
            quota: self.selector.usage(),
            history_turns: self.history.turn_count(),
            history_messages: self.history.len(),
            turns_completed: self.turns_completed,
            browser_open: self.browser.is_open().await,
        }
    }

    /// Release the browser before exit.
    pub async fn shutdown(&self) {
        self.browser.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::agent_loop::tests::{calls, text, ScriptedLlm};
    use crate::config::RetryConfig;
    use crate::llm::LlmError;

    fn session(llm: Arc<ScriptedLlm>) -> Session {
        let mut config = Config::new("test".into(), std::env::temp_dir());
        config.retry = RetryConfig::immediate(2);
        config.browser.webdriver_url = "http://127.0.0.1:9".into();
        Session::new(&config, llm)
    }

    #[tokio::test]
    async fn failed_turn_is_rolled_back() {
        let llm = ScriptedLlm::new(vec![
            text("first answer"),
            calls(&["list_files"]),
            Err(LlmError::Request("boom".into())),
            Err(LlmError::Request("boom".into())),
        ]);
        let mut session = session(llm);

        session.submit("list the files").await.unwrap();
        assert_eq!(session.history().len(), 2);

        assert!(session.submit("list them again").await.is_err());
        assert_eq!(session.history().len(), 2);

        let status = session.status().await;
        assert_eq!(status.turns_completed, 1);
        assert_eq!(status.history_turns, 1);
    }

    #[tokio::test]
    async fn reset_clears_history_but_keeps_counters() {
        let llm = ScriptedLlm::new(vec![text("hello")]);
        let mut session = session(llm);
        session.submit("close it").await.unwrap();

        session.reset().await;

        let status = session.status().await;
        assert_eq!(status.history_messages, 0);
        assert_eq!(status.turns_completed, 1);
        assert!(!status.browser_open);
    }

    #[tokio::test]
    async fn status_reports_quota_usage() {
        let llm = ScriptedLlm::new(vec![text("a"), text("b")]);
        let mut session = session(llm);
        session.submit("summarize my notes").await.unwrap();
        session.submit("scroll down").await.unwrap();

        let status = session.status().await;
        assert_eq!(status.quota.used, 1);
        assert_eq!(status.quota.limit, 100);
        assert!(status.to_string().contains("Capable quota: 1/100 today"));
        assert!(status.to_string().ends_with("Browser: closed"));
    }
}
