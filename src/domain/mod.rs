//! Core domain types shared across the engine
//!
//! - `message`: conversation roles, content blocks, and messages
//! - `response`: routing metadata and the response envelope, including
//!   the streaming variant

pub mod message;
pub mod response;

pub use message::{ContentBlock, ConversationMessage, ParticipantRole};
pub use response::{
    AgentOutput, AgentProcessingResult, AgentResponse, ResponseChunk, ResponseStream,
    ResponseStreamSender, RoutingFault,
};

/// Caller-supplied parameters threaded through routing, agents, and tools
pub type ParamMap = std::collections::HashMap<String, String>;
