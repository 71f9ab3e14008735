//! Streaming events from a model and block reassembly

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::domain::{ContentBlock, ConversationMessage, ParticipantRole};
use crate::error::ModelError;

/// One streaming event emitted by a model client
///
/// Text and tool-input deltas always belong to the block most recently
/// opened; `BlockStop` closes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelEvent {
    /// A tool-use block opened; id and name arrive up front
    ToolUseStart { id: String, name: String },
    /// Partial text for the current text block
    TextDelta { text: String },
    /// Partial JSON input for the current tool-use block
    ToolInputDelta { partial_json: String },
    /// The current block is complete
    BlockStop,
}

#[derive(Debug)]
struct ToolUseBuilder {
    id: String,
    name: String,
    input_json: String,
}

/// Reassembles streamed deltas into the final assistant message
///
/// Deltas are buffered per block until a `BlockStop`; a trailing open block
/// is flushed at `finish`, so a stream that closes without a final stop
/// still yields its content. Tool input that fails to parse as JSON
/// degrades to an empty object, mirroring what providers send for
/// zero-argument tools.
#[derive(Debug, Default)]
pub struct BlockAccumulator {
    blocks: Vec<ContentBlock>,
    text: String,
    tool: Option<ToolUseBuilder>,
}

impl BlockAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one streamed event
    pub fn apply(&mut self, event: &ModelEvent) {
        match event {
            ModelEvent::ToolUseStart { id, name } => {
                self.flush_text();
                self.tool = Some(ToolUseBuilder {
                    id: id.clone(),
                    name: name.clone(),
                    input_json: String::new(),
                });
            }
            ModelEvent::TextDelta { text } => self.text.push_str(text),
            ModelEvent::ToolInputDelta { partial_json } => {
                if let Some(tool) = &mut self.tool {
                    tool.input_json.push_str(partial_json);
                }
            }
            ModelEvent::BlockStop => self.close_block(),
        }
    }

    /// Close any open block and produce the assistant message
    pub fn finish(mut self) -> ConversationMessage {
        self.close_block();
        self.flush_text();
        ConversationMessage::new(ParticipantRole::Assistant, self.blocks)
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.blocks.push(ContentBlock::Text { text });
        }
    }

    fn close_block(&mut self) {
        match self.tool.take() {
            Some(tool) => {
                let input = if tool.input_json.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&tool.input_json)
                        .unwrap_or(Value::Object(Default::default()))
                };
                self.blocks.push(ContentBlock::ToolUse {
                    id: tool.id,
                    name: tool.name,
                    input,
                });
            }
            None => self.flush_text(),
        }
    }
}

/// Streaming response from a model client
pub struct ModelStream {
    receiver: mpsc::Receiver<Result<ModelEvent, ModelError>>,
}

impl ModelStream {
    /// Create a stream from a channel receiver
    pub fn new(receiver: mpsc::Receiver<Result<ModelEvent, ModelError>>) -> Self {
        Self { receiver }
    }

    /// Create a channel pair for building a model stream
    pub fn channel(buffer: usize) -> (ModelStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (ModelStreamSender { sender: tx }, Self { receiver: rx })
    }

    /// A stream that yields a single error and closes
    pub fn failed(error: ModelError) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(Err(error));
        Self { receiver: rx }
    }
}

impl Stream for ModelStream {
    type Item = Result<ModelEvent, ModelError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half for building a model stream
#[derive(Clone)]
pub struct ModelStreamSender {
    sender: mpsc::Sender<Result<ModelEvent, ModelError>>,
}

impl ModelStreamSender {
    /// Send an event; false once the receiver is gone
    pub async fn send(&self, event: ModelEvent) -> bool {
        self.sender.send(Ok(event)).await.is_ok()
    }

    /// Send a text delta
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(ModelEvent::TextDelta { text: text.into() }).await
    }

    /// Send an error
    pub async fn send_error(&self, error: ModelError) -> bool {
        self.sender.send(Err(error)).await.is_ok()
    }

    /// Check if the receiver is closed
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
