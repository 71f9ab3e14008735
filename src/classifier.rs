//! Classifier boundary: selecting an agent for an utterance

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::Agent;
use crate::error::AgentResult;
use crate::storage::SessionTurn;

/// The classifier's verdict for one utterance
///
/// Produced fresh per user turn and never persisted. An absent agent means
/// the classifier abstained; the orchestrator decides what happens next.
#[derive(Clone)]
pub struct ClassifierResult {
    /// The chosen agent, if any
    pub selected_agent: Option<Arc<dyn Agent>>,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl ClassifierResult {
    /// A positive selection
    pub fn selected(agent: Arc<dyn Agent>, confidence: f64) -> Self {
        Self {
            selected_agent: Some(agent),
            confidence,
        }
    }

    /// An abstention
    pub fn abstained() -> Self {
        Self {
            selected_agent: None,
            confidence: 0.0,
        }
    }

    /// The fallback substitution used when classification abstains and a
    /// default agent is configured: selected at confidence zero
    pub fn fallback(agent: Arc<dyn Agent>) -> Self {
        Self {
            selected_agent: Some(agent),
            confidence: 0.0,
        }
    }
}

/// Maps an utterance plus cross-agent history to an agent selection
///
/// The candidate set is pushed in through `set_agents` whenever the
/// orchestrator's registry changes, so `classify` keeps the two-argument
/// shape of the boundary. Failures propagate as errors; the orchestrator
/// absorbs them into a fixed user-visible message.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Replace the candidate set
    async fn set_agents(&self, agents: Vec<Arc<dyn Agent>>);

    /// Select an agent for the utterance
    async fn classify(
        &self,
        input_text: &str,
        history: &[SessionTurn],
    ) -> AgentResult<ClassifierResult>;
}
