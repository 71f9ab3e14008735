//! Tool specifications, the execution boundary, and the toolbox
//!
//! A [`Toolbox`] is assembled once at agent construction and owned by that
//! instance; nothing mutates it afterwards. Handlers receive an explicit
//! [`ToolContext`] so request identity never travels through shared state.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::ParamMap;
use crate::error::{AgentError, AgentResult};

/// Default model/tool round budget for tool-using agents
pub const DEFAULT_MAX_RECURSIONS: u32 = 20;

/// Declarative description of one tool offered to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name the model uses to request the tool
    pub name: String,
    /// What the tool does, in model-facing language
    pub description: String,
    /// JSON schema of the tool input
    pub input_schema: Value,
}

impl ToolSpec {
    /// Create a tool spec
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Request-scoped context handed to every tool handler
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// User the current request belongs to
    pub user_id: String,
    /// Session the current request belongs to
    pub session_id: String,
    /// Caller-supplied parameters, passed through unchanged
    pub additional_params: ParamMap,
}

impl ToolContext {
    /// Create a context for one request
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        additional_params: ParamMap,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            additional_params,
        }
    }
}

/// Executes tools by name
///
/// An unrecognized name returns [`AgentError::UnknownTool`]; the recursion
/// engine absorbs it into a textual tool result so the model can react.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute the named tool with the given input
    async fn execute(&self, name: &str, input: Value, ctx: &ToolContext) -> AgentResult<Value>;
}

/// Boxed async tool handler stored in a [`ToolTable`]
pub type ToolHandler =
    Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, AgentResult<Value>> + Send + Sync>;

/// Table-driven [`ToolExecutor`] keyed by tool name
///
/// Registering a handler under an existing name replaces the previous one.
#[derive(Default)]
pub struct ToolTable {
    specs: Vec<ToolSpec>,
    handlers: HashMap<String, ToolHandler>,
}

impl ToolTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool spec together with its handler
    pub fn register<F>(mut self, spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(Value, ToolContext) -> BoxFuture<'static, AgentResult<Value>>
            + Send
            + Sync
            + 'static,
    {
        if let Some(existing) = self.specs.iter_mut().find(|s| s.name == spec.name) {
            *existing = spec.clone();
        } else {
            self.specs.push(spec.clone());
        }
        self.handlers.insert(spec.name, Arc::new(handler));
        self
    }

    /// Specs of every registered tool, in registration order
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    /// Whether a tool with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolTable {
    async fn execute(&self, name: &str, input: Value, ctx: &ToolContext) -> AgentResult<Value> {
        match self.handlers.get(name) {
            Some(handler) => handler(input, ctx.clone()).await,
            None => Err(AgentError::UnknownTool(name.to_string())),
        }
    }
}

/// Instance-owned, immutable tool configuration for one agent
///
/// Carries the specs offered to the model, the executor that runs them, and
/// the recursion budget bounding the model/tool loop.
#[derive(Clone)]
pub struct Toolbox {
    specs: Vec<ToolSpec>,
    executor: Arc<dyn ToolExecutor>,
    max_recursions: u32,
}

impl Toolbox {
    /// Start building a toolbox
    pub fn builder() -> ToolboxBuilder {
        ToolboxBuilder::default()
    }

    /// Build a toolbox straight from a table, with the default budget
    pub fn from_table(table: ToolTable) -> AgentResult<Self> {
        Self::builder().table(table).build()
    }

    /// Specs offered to the model
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    /// Maximum model/tool rounds for one logical agent call
    pub fn max_recursions(&self) -> u32 {
        self.max_recursions
    }

    /// Execute one tool call through the configured executor
    pub async fn execute(&self, name: &str, input: Value, ctx: &ToolContext) -> AgentResult<Value> {
        self.executor.execute(name, input, ctx).await
    }
}

/// Builder for [`Toolbox`]
#[derive(Default)]
pub struct ToolboxBuilder {
    specs: Vec<ToolSpec>,
    executor: Option<Arc<dyn ToolExecutor>>,
    max_recursions: Option<u32>,
}

impl ToolboxBuilder {
    /// Set the specs offered to the model
    pub fn specs(mut self, specs: Vec<ToolSpec>) -> Self {
        self.specs = specs;
        self
    }

    /// Set the executor that runs requested tools
    pub fn executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Use a table as both the spec list and the executor
    pub fn table(mut self, table: ToolTable) -> Self {
        self.specs = table.specs().to_vec();
        self.executor = Some(Arc::new(table));
        self
    }

    /// Override the recursion budget
    pub fn max_recursions(mut self, max_recursions: u32) -> Self {
        self.max_recursions = Some(max_recursions);
        self
    }

    /// Validate and build
    pub fn build(self) -> AgentResult<Toolbox> {
        let executor = self.executor.ok_or_else(|| {
            AgentError::Construction("toolbox requires an executor".to_string())
        })?;
        if self.specs.is_empty() {
            return Err(AgentError::Construction(
                "toolbox requires at least one tool spec".to_string(),
            ));
        }
        let max_recursions = self.max_recursions.unwrap_or(DEFAULT_MAX_RECURSIONS);
        if max_recursions == 0 {
            return Err(AgentError::Construction(
                "toolbox recursion budget must be at least 1".to_string(),
            ));
        }
        Ok(Toolbox {
            specs: self.specs,
            executor,
            max_recursions,
        })
    }
}
