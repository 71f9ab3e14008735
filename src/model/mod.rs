//! Opaque model-call boundary
//!
//! The engine never sees a provider wire format: concrete clients translate
//! their own response shapes into [`ConversationMessage`] blocks (or
//! [`ModelEvent`]s when streaming) at the edge. Everything here is the
//! contract the tool-recursion loop is written against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ConversationMessage;
use crate::error::ModelResult;
use crate::tools::ToolSpec;

pub mod stream;

pub use stream::{BlockAccumulator, ModelEvent, ModelStream, ModelStreamSender};

fn default_max_tokens() -> u32 {
    1000
}

fn default_top_p() -> f32 {
    0.9
}

/// Inference parameters sent with every model call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Sequences that stop generation
    pub stop_sequences: Vec<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            top_p: default_top_p(),
            stop_sequences: Vec::new(),
        }
    }
}

/// One outbound request assembled from the running conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    /// System prompt for this call
    pub system_prompt: String,
    /// Accumulated conversation, including prior tool results
    pub messages: Vec<ConversationMessage>,
    /// Tools offered to the model; empty when the agent has none
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    /// Inference parameters
    #[serde(default)]
    pub inference: InferenceConfig,
}

impl ModelRequest {
    /// Create a request from a system prompt and conversation
    pub fn new(system_prompt: impl Into<String>, messages: Vec<ConversationMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
            tools: Vec::new(),
            inference: InferenceConfig::default(),
        }
    }

    /// Offer tools to the model
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Override the inference parameters
    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }
}

/// A model back-end able to turn a request into an assistant reply
///
/// Replies must carry `role = Assistant`. Implementations that cannot
/// stream keep the default `converse_stream`, which yields a single
/// unsupported-streaming error.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Identifier of the underlying model, for logging
    fn model_id(&self) -> &str;

    /// Single-response variant: one request, one complete reply
    async fn converse(&self, request: ModelRequest) -> ModelResult<ConversationMessage>;

    /// Streaming variant: events arrive as the model produces them
    fn converse_stream(&self, _request: ModelRequest) -> ModelStream {
        ModelStream::failed(crate::error::ModelError::StreamingUnsupported(
            self.model_id().to_string(),
        ))
    }
}
