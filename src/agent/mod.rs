//! Agent module - the core autonomous agent logic.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Pick a model tier for the user message
//! 2. Call the LLM with the conversation and available tools
//! 3. If the LLM requests tool calls, execute them and feed the results back
//! 4. Repeat until the LLM produces a final response or max iterations reached

mod agent_loop;
mod error;
mod history;
mod prompt;
mod session;
mod tier;

pub use agent_loop::{Agent, TurnOutcome, TurnReport};
pub use error::AgentError;
pub use history::History;
pub use prompt::build_system_prompt;
pub use session::{Session, SessionStatus};
pub use tier::{classify, Clock, QuotaCounter, QuotaUsage, SystemClock, Tier, TierSelector};
