//! Routing metadata and the response envelope

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::error::{AgentError, AgentResult};

use super::message::ConversationMessage;
use super::ParamMap;

/// Where in the routing pipeline an absorbed failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingFault {
    /// Classifier raised or returned nothing usable
    ClassificationFailed,
    /// Classifier abstained and fallback is disabled
    NoAgentSelected,
    /// Selected agent's process_request raised
    DispatchFailed,
}

impl std::fmt::Display for RoutingFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingFault::ClassificationFailed => write!(f, "classification_failed"),
            RoutingFault::NoAgentSelected => write!(f, "no_agent_selected"),
            RoutingFault::DispatchFailed => write!(f, "dispatch_failed"),
        }
    }
}

/// Metadata describing one routed request
///
/// Built once per request and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProcessingResult {
    /// The utterance that was routed
    pub user_input: String,
    /// Selected agent id (or the `no_agent_selected` sentinel)
    pub agent_id: String,
    /// Selected agent display name
    pub agent_name: String,
    /// Requesting user
    pub user_id: String,
    /// Session the request belongs to
    pub session_id: String,
    /// Caller-supplied parameters passed through to the agent
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub additional_params: ParamMap,
    /// Set when the envelope carries an absorbed failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<RoutingFault>,
}

impl AgentProcessingResult {
    /// Create metadata for a routed request
    pub fn new(
        user_input: impl Into<String>,
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        additional_params: ParamMap,
    ) -> Self {
        Self {
            user_input: user_input.into(),
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            additional_params,
            error_type: None,
        }
    }

    /// Tag the metadata with an absorbed failure
    pub fn with_error(mut self, fault: RoutingFault) -> Self {
        self.error_type = Some(fault);
        self
    }
}

/// The payload of an agent response: a complete message or a live stream
pub enum AgentOutput {
    /// A complete assistant message
    Message(ConversationMessage),
    /// A single-pass stream of partial text terminated by a final message
    Stream(ResponseStream),
}

impl AgentOutput {
    /// Whether this output is the streaming variant
    pub fn is_streaming(&self) -> bool {
        matches!(self, AgentOutput::Stream(_))
    }

    /// The complete message, if this output is not streaming
    pub fn as_message(&self) -> Option<&ConversationMessage> {
        match self {
            AgentOutput::Message(message) => Some(message),
            AgentOutput::Stream(_) => None,
        }
    }

    /// Resolve to a final message, draining the stream if necessary
    pub async fn into_final_message(self) -> AgentResult<ConversationMessage> {
        match self {
            AgentOutput::Message(message) => Ok(message),
            AgentOutput::Stream(stream) => stream.collect_final().await,
        }
    }
}

/// Uniform envelope returned by the orchestrator for every routed request
pub struct AgentResponse {
    /// Routing metadata, including any absorbed failure tag
    pub metadata: AgentProcessingResult,
    /// The selected agent's output (or a fixed error message)
    pub output: AgentOutput,
}

impl AgentResponse {
    /// Create an envelope from metadata and output
    pub fn new(metadata: AgentProcessingResult, output: AgentOutput) -> Self {
        Self { metadata, output }
    }

    /// Create a non-streaming envelope carrying a fixed assistant text
    pub fn from_text(metadata: AgentProcessingResult, text: impl Into<String>) -> Self {
        Self {
            metadata,
            output: AgentOutput::Message(ConversationMessage::assistant_text(text)),
        }
    }

    /// Whether the output is the streaming variant
    pub fn streaming(&self) -> bool {
        self.output.is_streaming()
    }
}

/// A chunk of streaming agent output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseChunk {
    /// Partial text as it arrives from the model
    Text { text: String },
    /// The final complete message; always the last chunk on success
    Final { message: ConversationMessage },
}

impl ResponseChunk {
    /// Create a text chunk
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a final-message chunk
    pub fn final_message(message: ConversationMessage) -> Self {
        Self::Final { message }
    }
}

/// Single-pass streaming output from an agent
pub struct ResponseStream {
    receiver: mpsc::Receiver<AgentResult<ResponseChunk>>,
}

impl ResponseStream {
    /// Create a stream from a channel receiver
    pub fn new(receiver: mpsc::Receiver<AgentResult<ResponseChunk>>) -> Self {
        Self { receiver }
    }

    /// Create a channel pair for building a response stream
    pub fn channel(buffer: usize) -> (ResponseStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (ResponseStreamSender { sender: tx }, Self { receiver: rx })
    }

    /// Drain the stream and return the final message
    ///
    /// If the stream closes without a final chunk, a message is rebuilt
    /// from the accumulated text chunks.
    pub async fn collect_final(mut self) -> AgentResult<ConversationMessage> {
        let mut text = String::new();
        let mut final_message: Option<ConversationMessage> = None;

        while let Some(result) = self.receiver.recv().await {
            match result? {
                ResponseChunk::Text { text: delta } => text.push_str(&delta),
                ResponseChunk::Final { message } => final_message = Some(message),
            }
        }

        match final_message {
            Some(message) => Ok(message),
            None if !text.is_empty() => Ok(ConversationMessage::assistant_text(text)),
            None => Err(AgentError::Streaming(
                "stream closed without a final message".to_string(),
            )),
        }
    }
}

impl Stream for ResponseStream {
    type Item = AgentResult<ResponseChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half for building a response stream
#[derive(Clone)]
pub struct ResponseStreamSender {
    sender: mpsc::Sender<AgentResult<ResponseChunk>>,
}

impl ResponseStreamSender {
    /// Send partial text
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.sender.send(Ok(ResponseChunk::text(text))).await.is_ok()
    }

    /// Send the final message
    pub async fn send_final(&self, message: ConversationMessage) -> bool {
        self.sender
            .send(Ok(ResponseChunk::final_message(message)))
            .await
            .is_ok()
    }

    /// Send an error
    pub async fn send_error(&self, error: AgentError) -> bool {
        self.sender.send(Err(error)).await.is_ok()
    }

    /// Check if the receiver is closed
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
