//! In-memory conversation store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::ConversationMessage;
use crate::error::AgentResult;

use super::{ConversationStore, SessionTurn};

#[derive(Debug, Clone)]
struct StoredMessage {
    seq: u64,
    message: ConversationMessage,
}

#[derive(Debug, Default)]
struct SessionLog {
    next_seq: u64,
    by_agent: HashMap<String, Vec<StoredMessage>>,
}

/// Conversation store backed by a shared in-process map
///
/// A per-session sequence number is assigned under the same write lock as
/// the append, so the cross-agent view keeps true global append order even
/// when fan-out sub-dispatches land interleaved.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<(String, String), SessionLog>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn fetch(
        &self,
        user_id: &str,
        session_id: &str,
        agent_id: &str,
    ) -> Vec<ConversationMessage> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&(user_id.to_string(), session_id.to_string()))
            .and_then(|log| log.by_agent.get(agent_id))
            .map(|messages| messages.iter().map(|m| m.message.clone()).collect())
            .unwrap_or_default()
    }

    async fn fetch_all(&self, user_id: &str, session_id: &str) -> Vec<SessionTurn> {
        let sessions = self.sessions.read().await;
        let Some(log) = sessions.get(&(user_id.to_string(), session_id.to_string())) else {
            return Vec::new();
        };

        let mut turns: Vec<(u64, SessionTurn)> = log
            .by_agent
            .iter()
            .flat_map(|(agent_id, messages)| {
                messages.iter().map(|m| {
                    (
                        m.seq,
                        SessionTurn {
                            agent_id: agent_id.clone(),
                            message: m.message.clone(),
                        },
                    )
                })
            })
            .collect();
        turns.sort_by_key(|(seq, _)| *seq);
        turns.into_iter().map(|(_, turn)| turn).collect()
    }

    async fn append(
        &self,
        user_id: &str,
        session_id: &str,
        agent_id: &str,
        message: ConversationMessage,
        max_pairs: Option<usize>,
    ) -> AgentResult<()> {
        let mut sessions = self.sessions.write().await;
        let log = sessions
            .entry((user_id.to_string(), session_id.to_string()))
            .or_default();
        let seq = log.next_seq;
        log.next_seq += 1;

        let messages = log.by_agent.entry(agent_id.to_string()).or_default();
        messages.push(StoredMessage { seq, message });

        if let Some(max_pairs) = max_pairs {
            // A trailing unpaired user turn never counts as a pair.
            while messages.len() / 2 > max_pairs {
                messages.drain(0..2);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> ConversationMessage {
        ConversationMessage::user_text(text)
    }

    fn assistant(text: &str) -> ConversationMessage {
        ConversationMessage::assistant_text(text)
    }

    #[tokio::test]
    async fn fetch_returns_appends_in_order() {
        let store = InMemoryStore::new();
        store.append("u", "s", "a", user("one"), None).await.unwrap();
        store.append("u", "s", "a", assistant("two"), None).await.unwrap();

        let messages = store.fetch("u", "s", "a").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].first_text(), Some("one"));
        assert_eq!(messages[1].first_text(), Some("two"));
    }

    #[tokio::test]
    async fn unknown_keys_fetch_empty() {
        let store = InMemoryStore::new();
        assert!(store.fetch("u", "s", "missing").await.is_empty());
        assert!(store.fetch_all("u", "nope").await.is_empty());
    }

    #[tokio::test]
    async fn trims_oldest_whole_pairs_past_the_cap() {
        let store = InMemoryStore::new();
        for i in 0..3 {
            let cap = Some(2);
            store
                .append("u", "s", "a", user(&format!("q{}", i)), cap)
                .await
                .unwrap();
            store
                .append("u", "s", "a", assistant(&format!("r{}", i)), cap)
                .await
                .unwrap();
        }

        let messages = store.fetch("u", "s", "a").await;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].first_text(), Some("q1"));
        assert_eq!(messages[3].first_text(), Some("r2"));
    }

    #[tokio::test]
    async fn a_trailing_user_turn_does_not_trigger_trimming() {
        let store = InMemoryStore::new();
        let cap = Some(1);
        store.append("u", "s", "a", user("q0"), cap).await.unwrap();
        store.append("u", "s", "a", assistant("r0"), cap).await.unwrap();
        store.append("u", "s", "a", user("q1"), cap).await.unwrap();

        // One complete pair plus a dangling user turn stays within the cap.
        assert_eq!(store.fetch("u", "s", "a").await.len(), 3);

        store.append("u", "s", "a", assistant("r1"), cap).await.unwrap();
        let messages = store.fetch("u", "s", "a").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].first_text(), Some("q1"));
    }

    #[tokio::test]
    async fn fetch_all_preserves_global_append_order() {
        let store = InMemoryStore::new();
        store.append("u", "s", "alpha", user("to alpha"), None).await.unwrap();
        store.append("u", "s", "beta", user("to beta"), None).await.unwrap();
        store
            .append("u", "s", "alpha", assistant("from alpha"), None)
            .await
            .unwrap();
        store
            .append("u", "s", "beta", assistant("from beta"), None)
            .await
            .unwrap();

        let turns = store.fetch_all("u", "s").await;
        let order: Vec<&str> = turns.iter().map(|t| t.agent_id.as_str()).collect();
        assert_eq!(order, vec!["alpha", "beta", "alpha", "beta"]);
        assert_eq!(turns[2].message.first_text(), Some("from alpha"));
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_user_and_session() {
        let store = InMemoryStore::new();
        store.append("u1", "s1", "a", user("one"), None).await.unwrap();
        store.append("u2", "s1", "a", user("two"), None).await.unwrap();
        store.append("u1", "s2", "a", user("three"), None).await.unwrap();

        assert_eq!(store.fetch("u1", "s1", "a").await.len(), 1);
        assert_eq!(store.fetch("u2", "s1", "a").await.len(), 1);
        assert_eq!(store.fetch_all("u1", "s2").await.len(), 1);
    }
}
