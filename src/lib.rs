//! # Hermes - Multi-Agent Utterance Router
//!
//! Hermes routes each user utterance to one of several specialized
//! conversational agents, keeps per-agent conversation memory, and supports
//! a hierarchical supervisor pattern where one agent decomposes a task and
//! fans it out concurrently to a team of subordinate agents.
//!
//! ## Features
//!
//! - **Classifier-driven routing**: pluggable classification with
//!   default-agent fallback and absorbed failures
//! - **Uniform envelopes**: every routed request returns an
//!   `AgentResponse`; classifier and agent errors become fixed messages
//!   with fault tags, never panics or raised errors
//! - **Tool recursion**: a bounded model/tool loop, with a streaming
//!   variant that forwards text deltas as they arrive
//! - **Supervisor fan-out**: parallel sub-dispatch to named team members
//!   with per-member persistence and a cross-agent memory digest
//! - **Conversation memory**: append-only store keyed by
//!   `(user, session, agent)` with pair-granular trimming
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hermes::config::OrchestratorConfig;
//! use hermes::storage::InMemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> hermes::error::AgentResult<()> {
//!     let config = OrchestratorConfig::from_file("hermes.toml")?;
//!     let storage = Arc::new(InMemoryStore::new());
//!
//!     // Build an Orchestrator with a classifier and agents, then:
//!     // orchestrator.route_request(input, user_id, session_id, params).await
//!     let _ = (config, storage);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **domain**: messages, content blocks, and response envelopes
//! - **model**: the opaque model-client boundary and its streaming events
//! - **tools**: tool specs, the execution boundary, and recursion budgets
//! - **agents**: the agent contract plus the LLM, chain, and supervisor agents
//! - **classifier**: the classification boundary
//! - **storage**: conversation persistence
//! - **orchestrator**: routing, dispatch, persistence, and envelopes

pub mod agents;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod storage;
pub mod tools;

pub use agents::{Agent, AgentMeta, ChainAgent, LlmAgent, SupervisorAgent};
pub use classifier::{Classifier, ClassifierResult};
pub use config::OrchestratorConfig;
pub use domain::{
    AgentOutput, AgentProcessingResult, AgentResponse, ConversationMessage, ParticipantRole,
};
pub use error::{AgentError, AgentResult, ModelError, ModelResult};
pub use model::{ModelClient, ModelRequest};
pub use orchestrator::Orchestrator;
pub use storage::{ConversationStore, InMemoryStore};
pub use tools::{ToolSpec, ToolTable, Toolbox};
