use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while resolving or executing a tool call
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that terminate an orchestrated run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Maximum turns exceeded: {max_turns}")]
    MaxTurnsExceeded { max_turns: usize },

    #[error("Maximum handoffs exceeded: {max_handoffs}")]
    MaxHandoffsExceeded { max_handoffs: usize },

    #[error("Run did not finish within {seconds}s")]
    Timeout { seconds: u64 },
}
