use thiserror::Error;

use crate::llm::LlmError;

/// A user turn that could not be completed.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model call failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: LlmError,
    },
}
