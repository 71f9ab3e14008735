//! Utterance routing: classify, dispatch, persist, envelope
//!
//! `route_request` never fails: classifier and agent failures are absorbed
//! into a uniform [`AgentResponse`] carrying a fixed user-facing message and
//! a fault tag in the metadata. Construction problems are the only errors
//! that surface as `Err`.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::agents::Agent;
use crate::classifier::{Classifier, ClassifierResult};
use crate::config::OrchestratorConfig;
use crate::domain::{
    AgentOutput, AgentProcessingResult, AgentResponse, ConversationMessage, ParamMap, RoutingFault,
};
use crate::error::{AgentError, AgentResult};
use crate::storage::{ConversationStore, InMemoryStore};

/// Sentinel agent id used in envelopes when no agent was invoked
pub const NO_AGENT_SELECTED_ID: &str = "no_agent_selected";
const NO_AGENT_NAME: &str = "No Agent";

/// Routes each utterance to one agent and shepherds the exchange
pub struct Orchestrator {
    agents: RwLock<Vec<Arc<dyn Agent>>>,
    classifier: Arc<dyn Classifier>,
    storage: Arc<dyn ConversationStore>,
    default_agent: Option<Arc<dyn Agent>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Start building an orchestrator
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// The active configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Snapshot of the registered agents
    pub async fn agents(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.read().await.clone()
    }

    /// Register an agent and republish the candidate set to the classifier
    ///
    /// Ids must be unique across the registry.
    pub async fn add_agent(&self, agent: Arc<dyn Agent>) -> AgentResult<()> {
        let snapshot = {
            let mut agents = self.agents.write().await;
            if agents.iter().any(|a| a.id() == agent.id()) {
                return Err(AgentError::Configuration(format!(
                    "an agent with id '{}' is already registered",
                    agent.id()
                )));
            }
            agents.push(agent);
            agents.clone()
        };
        self.classifier.set_agents(snapshot).await;
        Ok(())
    }

    /// Classify the utterance and dispatch it to the selected agent
    pub async fn route_request(
        &self,
        input_text: &str,
        user_id: &str,
        session_id: &str,
        additional_params: ParamMap,
    ) -> AgentResponse {
        let history = self.storage.fetch_all(user_id, session_id).await;

        let started = Instant::now();
        let classification = self.classifier.classify(input_text, &history).await;
        if self.config.log_execution_times {
            tracing::info!("Classification took {:?}", started.elapsed());
        }

        let classification = match classification {
            Ok(result) => result,
            Err(err) => {
                tracing::error!("Classification failed: {}", err);
                let metadata = self
                    .unrouted_metadata(input_text, user_id, session_id, additional_params)
                    .with_error(RoutingFault::ClassificationFailed);
                return AgentResponse::from_text(
                    metadata,
                    &self.config.classification_error_message,
                );
            }
        };

        let classification = if classification.selected_agent.is_some() {
            classification
        } else if let Some(default) = self.fallback_agent() {
            tracing::debug!("No agent identified; falling back to the default agent");
            ClassifierResult::fallback(default)
        } else {
            let metadata = self
                .unrouted_metadata(input_text, user_id, session_id, additional_params)
                .with_error(RoutingFault::NoAgentSelected);
            return AgentResponse::from_text(metadata, &self.config.no_agent_selected_message);
        };

        self.dispatch_request(input_text, user_id, session_id, classification, additional_params)
            .await
    }

    /// Dispatch with an already-computed classification
    ///
    /// On success the user turn is persisted, and the assistant turn too when
    /// the output is a complete message; a streamed assistant turn is not
    /// persisted here since its text is not known yet. Nothing is persisted
    /// on dispatch failure.
    pub async fn dispatch_request(
        &self,
        input_text: &str,
        user_id: &str,
        session_id: &str,
        classification: ClassifierResult,
        additional_params: ParamMap,
    ) -> AgentResponse {
        let Some(agent) = classification.selected_agent else {
            let metadata = self
                .unrouted_metadata(input_text, user_id, session_id, additional_params)
                .with_error(RoutingFault::NoAgentSelected);
            return AgentResponse::from_text(metadata, &self.config.no_agent_selected_message);
        };

        tracing::info!(
            "Selected agent '{}' (confidence {:.2})",
            agent.name(),
            classification.confidence
        );
        let metadata = AgentProcessingResult::new(
            input_text,
            agent.id(),
            agent.name(),
            user_id,
            session_id,
            additional_params.clone(),
        );

        let started = Instant::now();
        let result = self
            .dispatch_to_agent(agent.as_ref(), input_text, user_id, session_id, &additional_params)
            .await;
        if self.config.log_execution_times {
            tracing::info!("Agent '{}' took {:?}", agent.name(), started.elapsed());
        }

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                tracing::error!("Agent '{}' failed to process the request: {}", agent.name(), err);
                return AgentResponse::from_text(
                    metadata.with_error(RoutingFault::DispatchFailed),
                    &self.config.general_routing_error_message,
                );
            }
        };

        if agent.save_chat() {
            self.persist_turn(
                user_id,
                session_id,
                agent.id(),
                ConversationMessage::user_text(input_text),
            )
            .await;
            if let Some(message) = output.as_message() {
                self.persist_turn(user_id, session_id, agent.id(), message.clone())
                    .await;
            }
        }

        AgentResponse::new(metadata, output)
    }

    /// Invoke one agent with its own history, returning the raw result
    pub async fn dispatch_to_agent(
        &self,
        agent: &dyn Agent,
        input_text: &str,
        user_id: &str,
        session_id: &str,
        additional_params: &ParamMap,
    ) -> AgentResult<AgentOutput> {
        let history = self.storage.fetch(user_id, session_id, agent.id()).await;
        agent
            .process_request(input_text, user_id, session_id, &history, additional_params)
            .await
    }

    fn fallback_agent(&self) -> Option<Arc<dyn Agent>> {
        if self.config.use_default_agent_if_none_identified {
            self.default_agent.clone()
        } else {
            None
        }
    }

    fn unrouted_metadata(
        &self,
        input_text: &str,
        user_id: &str,
        session_id: &str,
        additional_params: ParamMap,
    ) -> AgentProcessingResult {
        AgentProcessingResult::new(
            input_text,
            NO_AGENT_SELECTED_ID,
            NO_AGENT_NAME,
            user_id,
            session_id,
            additional_params,
        )
    }

    async fn persist_turn(
        &self,
        user_id: &str,
        session_id: &str,
        agent_id: &str,
        message: ConversationMessage,
    ) {
        if let Err(err) = self
            .storage
            .append(
                user_id,
                session_id,
                agent_id,
                message,
                self.config.max_message_pairs_per_agent,
            )
            .await
        {
            tracing::warn!("Failed to persist a turn for agent '{}': {}", agent_id, err);
        }
    }
}

// The classifier, storage, and agent fields are trait objects, so Debug is
// written by hand over the remaining state.
impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("has_default_agent", &self.default_agent.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Orchestrator`]
#[derive(Default)]
pub struct OrchestratorBuilder {
    classifier: Option<Arc<dyn Classifier>>,
    storage: Option<Arc<dyn ConversationStore>>,
    default_agent: Option<Arc<dyn Agent>>,
    config: Option<OrchestratorConfig>,
    agents: Vec<Arc<dyn Agent>>,
}

impl OrchestratorBuilder {
    /// The classifier consulted for every routed request
    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Conversation store (defaults to the in-memory one)
    pub fn storage(mut self, storage: Arc<dyn ConversationStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Agent substituted when classification abstains and fallback is on
    pub fn default_agent(mut self, default_agent: Arc<dyn Agent>) -> Self {
        self.default_agent = Some(default_agent);
        self
    }

    /// Override the configuration
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register an agent up front
    pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Validate, publish the initial candidate set, and build
    pub async fn build(self) -> AgentResult<Orchestrator> {
        let classifier = self.classifier.ok_or_else(|| {
            AgentError::Construction("orchestrator requires a classifier".to_string())
        })?;
        let config = self.config.unwrap_or_default();
        if config.use_default_agent_if_none_identified && self.default_agent.is_none() {
            return Err(AgentError::Construction(
                "default-agent fallback is enabled but no default agent is set".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id()) {
                return Err(AgentError::Configuration(format!(
                    "an agent with id '{}' is already registered",
                    agent.id()
                )));
            }
        }

        classifier.set_agents(self.agents.clone()).await;

        Ok(Orchestrator {
            agents: RwLock::new(self.agents),
            classifier,
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(InMemoryStore::new())),
            default_agent: self.default_agent,
            config,
        })
    }
}
