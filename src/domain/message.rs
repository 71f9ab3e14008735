//! Conversation roles, content blocks, and messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a conversation participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    /// End user (also carries aggregated tool results between model rounds)
    User,
    /// Model or agent reply
    Assistant,
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipantRole::User => write!(f, "user"),
            ParticipantRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One tagged block of message content
///
/// Provider-specific block formats are translated into this shape at the
/// edge; nothing inside the engine ever sees a provider wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text { text: String },
    /// A model request to execute a named tool
    ToolUse { id: String, name: String, input: Value },
    /// The result of a tool execution, keyed back to the originating use
    ToolResult { id: String, value: Value },
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a tool-use block
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Create a tool-result block
    pub fn tool_result(id: impl Into<String>, value: Value) -> Self {
        Self::ToolResult {
            id: id.into(),
            value,
        }
    }

    /// Whether this block is a tool-use request
    pub fn is_tool_use(&self) -> bool {
        matches!(self, ContentBlock::ToolUse { .. })
    }
}

/// A single conversation turn: a role plus an ordered sequence of blocks
///
/// Messages are treated as immutable once constructed; the store and the
/// engine only ever clone or append them, never rewrite their contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Who produced the turn
    pub role: ParticipantRole,
    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
}

impl ConversationMessage {
    /// Create a message from a role and content blocks
    pub fn new(role: ParticipantRole, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    /// Create a user message with a single text block
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(ParticipantRole::User, vec![ContentBlock::text(text)])
    }

    /// Create an assistant message with a single text block
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(ParticipantRole::Assistant, vec![ContentBlock::text(text)])
    }

    /// Aggregate tool results into the single user-role message that model
    /// providers expect between tool rounds
    pub fn tool_results(blocks: Vec<ContentBlock>) -> Self {
        Self::new(ParticipantRole::User, blocks)
    }

    /// First text block, if any
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// All text blocks concatenated
    pub fn collect_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether any block requests a tool execution
    pub fn has_tool_use(&self) -> bool {
        self.content.iter().any(ContentBlock::is_tool_use)
    }
}
