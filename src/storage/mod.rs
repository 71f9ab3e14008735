//! Conversation persistence: an append-only log with pair retention
//!
//! Turns are keyed by `(user, session, agent)`. The only mutation is
//! `append`, which may trim the oldest whole pairs past a cap; nothing is
//! ever rewritten in place. Backends are interchangeable behind
//! [`ConversationStore`]; the in-memory implementation ships here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ConversationMessage;
use crate::error::AgentResult;

pub mod in_memory;

pub use in_memory::InMemoryStore;

/// One turn of the cross-agent session view, with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTurn {
    /// Agent whose conversation this turn belongs to
    pub agent_id: String,
    /// The turn itself
    pub message: ConversationMessage,
}

/// Keyed append-only conversation log
///
/// `fetch` and `fetch_all` never fail: backends absorb their own read
/// errors and return what they have. `append` is fallible but every call
/// site treats it as best-effort; a lost turn degrades future context, not
/// the current response.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// This agent's conversation, in append order (empty if absent)
    async fn fetch(
        &self,
        user_id: &str,
        session_id: &str,
        agent_id: &str,
    ) -> Vec<ConversationMessage>;

    /// Every agent's turns in the session, in global append order
    async fn fetch_all(&self, user_id: &str, session_id: &str) -> Vec<SessionTurn>;

    /// Append one turn; then, while the stored pair count exceeds
    /// `max_pairs`, drop the oldest pair. Append and trim are atomic per
    /// key. `None` means unlimited.
    async fn append(
        &self,
        user_id: &str,
        session_id: &str,
        agent_id: &str,
        message: ConversationMessage,
        max_pairs: Option<usize>,
    ) -> AgentResult<()>;
}
