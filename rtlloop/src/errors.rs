//! Typed collaborator failures.
//!
//! Adapters return these inside `anyhow::Error`; the orchestrator downcasts to
//! decide how the run ends.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// A collaborator broke its contract: unsafe path, malformed response.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A collaborator could not be launched or lacked a required input.
    #[error("tool invocation failed: {0}")]
    ToolInvocation(String),
}

impl FlowError {
    pub fn validation(detail: impl Into<String>) -> Self {
        FlowError::Validation(detail.into())
    }

    pub fn tool(detail: impl Into<String>) -> Self {
        FlowError::ToolInvocation(detail.into())
    }
}
