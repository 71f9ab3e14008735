//! Orchestrator configuration
//!
//! Everything here has a sensible default, so `OrchestratorConfig::default()`
//! is a working configuration and files only need to name what they change.

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};

/// Routing behavior knobs and the user-facing fallback strings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Substitute the default agent when classification abstains
    pub use_default_agent_if_none_identified: bool,
    /// Cap on stored message pairs per agent; unlimited when absent
    pub max_message_pairs_per_agent: Option<usize>,
    /// Log how long classification and dispatch take
    pub log_execution_times: bool,
    /// Reply used when the classifier itself fails
    pub classification_error_message: String,
    /// Reply used when no agent matches and no fallback applies
    pub no_agent_selected_message: String,
    /// Reply used when the selected agent fails to respond
    pub general_routing_error_message: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            use_default_agent_if_none_identified: true,
            max_message_pairs_per_agent: None,
            log_execution_times: false,
            classification_error_message:
                "I'm sorry, an error occurred while processing your request. Please try again later."
                    .to_string(),
            no_agent_selected_message:
                "I'm sorry, I couldn't determine how to handle your request. Could you please rephrase it?"
                    .to_string(),
            general_routing_error_message:
                "An error occurred while processing your request. Please try again later."
                    .to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from a file (optional) layered with `HERMES_`-prefixed
    /// environment variables; the environment wins
    pub fn from_file(path: impl AsRef<Path>) -> AgentResult<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("HERMES"))
            .build()
            .map_err(|e| AgentError::Configuration(e.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|e| AgentError::Configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = OrchestratorConfig::default();
        assert!(config.use_default_agent_if_none_identified);
        assert_eq!(config.max_message_pairs_per_agent, None);
        assert!(!config.log_execution_times);
        assert!(config.no_agent_selected_message.contains("rephrase"));
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"max_message_pairs_per_agent": 5}"#).unwrap();
        assert_eq!(config.max_message_pairs_per_agent, Some(5));
        assert!(config.use_default_agent_if_none_identified);
        assert_eq!(
            config.classification_error_message,
            OrchestratorConfig::default().classification_error_message
        );
    }
}
