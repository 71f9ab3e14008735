//! Error types for the routing and dispatch engine

use thiserror::Error;

/// Errors that can occur during agent and orchestration operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent or supervisor construction failed
    #[error("Construction error: {0}")]
    Construction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Model-call boundary error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// No handler registered for the requested tool name
    #[error("Unknown tool use name: {0}")]
    UnknownTool(String),

    /// Tool handler raised while executing
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Conversation store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Agent execution error
    #[error("Execution error: {0}")]
    Execution(String),

    /// Streaming channel closed or misused
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors specific to the opaque model-call boundary
#[derive(Debug, Error)]
pub enum ModelError {
    /// Request rejected or failed before a reply was produced
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Reply could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Streaming error mid-reply
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Client does not implement the streaming variant
    #[error("Streaming not supported by model: {0}")]
    StreamingUnsupported(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Model(ModelError::Serialization(err.to_string()))
    }
}

/// Result type alias for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type alias for model-call operations
pub type ModelResult<T> = Result<T, ModelError>;
