//! Agent contract and the built-in agent implementations
//!
//! - `tool_loop`: the bounded model/tool recursion engine
//! - `llm`: model-backed agent running the engine
//! - `chain`: sequential composition of agents
//! - `supervisor`: team coordinator with the fan-out tool

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AgentOutput, ConversationMessage, ParamMap};
use crate::error::{AgentError, AgentResult};

pub mod chain;
pub mod llm;
pub mod supervisor;
pub mod tool_loop;

pub use chain::ChainAgent;
pub use llm::{LlmAgent, LlmAgentBuilder};
pub use supervisor::{SupervisorAgent, SupervisorAgentBuilder};
pub use tool_loop::{converse_with_tools, converse_with_tools_streaming, LoopOutcome};

/// Identity and flags shared by every agent implementation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMeta {
    /// Immutable id, derived from the name at construction
    pub id: String,
    /// Display name, also used to address the agent in a fan-out
    pub name: String,
    /// What this agent handles; the classifier's main signal
    pub description: String,
    /// Whether the orchestrator persists this agent's turns
    pub save_chat: bool,
}

impl AgentMeta {
    /// Create metadata, deriving the id from the name
    ///
    /// The id is the lowercased name with every run of non-alphanumeric
    /// characters collapsed to a single hyphen. Names that produce an
    /// empty id are rejected.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> AgentResult<Self> {
        let name = name.into();
        let id = slug_from_name(&name);
        if id.is_empty() {
            return Err(AgentError::Construction(format!(
                "agent name '{}' does not produce a usable id",
                name
            )));
        }
        Ok(Self {
            id,
            name,
            description: description.into(),
            save_chat: true,
        })
    }

    /// Override the save_chat flag
    pub fn with_save_chat(mut self, save_chat: bool) -> Self {
        self.save_chat = save_chat;
        self
    }
}

fn slug_from_name(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// A named unit that turns input text plus history into a response
///
/// Implementations must return assistant-role terminal results and
/// propagate internal faults as errors; recovery policy belongs to the
/// orchestrator.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Identity and flags
    fn meta(&self) -> &AgentMeta;

    /// Immutable id
    fn id(&self) -> &str {
        &self.meta().id
    }

    /// Display name
    fn name(&self) -> &str {
        &self.meta().name
    }

    /// Capability description
    fn description(&self) -> &str {
        &self.meta().description
    }

    /// Whether the orchestrator persists this agent's turns
    fn save_chat(&self) -> bool {
        self.meta().save_chat
    }

    /// Whether process_request returns the streaming variant
    fn is_streaming(&self) -> bool {
        false
    }

    /// Produce a response for one user turn
    ///
    /// `history` is this agent's own prior conversation, without the
    /// current input; the agent appends the input itself.
    async fn process_request(
        &self,
        input_text: &str,
        user_id: &str,
        session_id: &str,
        history: &[ConversationMessage],
        additional_params: &ParamMap,
    ) -> AgentResult<AgentOutput>;
}
