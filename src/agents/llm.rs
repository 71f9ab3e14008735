//! Model-backed agent running the tool-recursion engine

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tera::{Context, Tera};
use tokio::sync::RwLock;

use crate::domain::{AgentOutput, ConversationMessage, ParamMap, ResponseStream};
use crate::error::{AgentError, AgentResult};
use crate::model::{InferenceConfig, ModelClient, ModelRequest};
use crate::tools::{ToolContext, Toolbox};

use super::tool_loop::{converse_with_tools, converse_with_tools_streaming, LoopOutcome};
use super::{Agent, AgentMeta};

const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are a {{name}}.
{{description}}
You will engage in an open-ended conversation, providing helpful and accurate
responses based on your expertise. Maintain the conversation's context across
turns, be concise, and say so plainly when something is outside what you know.";

#[derive(Debug)]
struct PromptState {
    template: String,
    variables: HashMap<String, String>,
}

impl PromptState {
    fn render(&self) -> String {
        let mut context = Context::new();
        for (key, value) in &self.variables {
            context.insert(key, value);
        }
        match Tera::one_off(&self.template, &context, false) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!("Failed to render system prompt template: {}", e);
                self.template.clone()
            }
        }
    }
}

/// An agent whose responses come from an opaque model, with optional tools
///
/// The streaming flag is chosen once at construction; it selects which
/// model-call variant every `process_request` uses.
pub struct LlmAgent {
    meta: AgentMeta,
    model: Arc<dyn ModelClient>,
    toolbox: Option<Toolbox>,
    inference: InferenceConfig,
    streaming: bool,
    prompt: RwLock<PromptState>,
}

impl LlmAgent {
    /// Start building an agent
    pub fn builder() -> LlmAgentBuilder {
        LlmAgentBuilder::default()
    }

    /// Whether a toolbox is attached
    pub fn has_toolbox(&self) -> bool {
        self.toolbox.is_some()
    }

    /// Attach a toolbox, replacing any previous one
    pub fn with_toolbox(mut self, toolbox: Toolbox) -> Self {
        self.toolbox = Some(toolbox);
        self
    }

    /// Replace the prompt template and/or merge template variables
    ///
    /// `None` leaves the respective part unchanged; supplied variables are
    /// merged over existing ones, so identity variables set at construction
    /// survive partial updates.
    pub async fn set_system_prompt(
        &self,
        template: Option<String>,
        variables: Option<HashMap<String, String>>,
    ) {
        let mut prompt = self.prompt.write().await;
        if let Some(template) = template {
            prompt.template = template;
        }
        if let Some(variables) = variables {
            prompt.variables.extend(variables);
        }
    }

    /// Render the current system prompt
    pub async fn render_system_prompt(&self) -> String {
        self.prompt.read().await.render()
    }

    fn build_request(
        &self,
        system_prompt: String,
        history: &[ConversationMessage],
        input_text: &str,
    ) -> ModelRequest {
        let mut messages = history.to_vec();
        messages.push(ConversationMessage::user_text(input_text));
        let request = ModelRequest::new(system_prompt, messages)
            .with_inference(self.inference.clone());
        match &self.toolbox {
            Some(toolbox) => request.with_tools(toolbox.specs().to_vec()),
            None => request,
        }
    }

    fn warn_if_exhausted(&self, outcome: &LoopOutcome) {
        if outcome.is_exhausted() {
            tracing::warn!(
                "Agent '{}' hit its tool recursion budget; returning the last reply",
                self.meta.name
            );
        }
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn meta(&self) -> &AgentMeta {
        &self.meta
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    async fn process_request(
        &self,
        input_text: &str,
        user_id: &str,
        session_id: &str,
        history: &[ConversationMessage],
        additional_params: &ParamMap,
    ) -> AgentResult<AgentOutput> {
        let system_prompt = self.render_system_prompt().await;
        let request = self.build_request(system_prompt, history, input_text);
        let ctx = ToolContext::new(user_id, session_id, additional_params.clone());

        if self.streaming {
            let (tx, stream) = ResponseStream::channel(64);
            let model = Arc::clone(&self.model);
            let toolbox = self.toolbox.clone();
            let agent_name = self.meta.name.clone();
            tokio::spawn(async move {
                let result = converse_with_tools_streaming(
                    model.as_ref(),
                    request,
                    toolbox.as_ref(),
                    &ctx,
                    &tx,
                )
                .await;
                match result {
                    Ok(outcome) => {
                        if outcome.is_exhausted() {
                            tracing::warn!(
                                "Agent '{}' hit its tool recursion budget; returning the last reply",
                                agent_name
                            );
                        }
                        let _ = tx.send_final(outcome.into_message()).await;
                    }
                    Err(err) => {
                        let _ = tx.send_error(err).await;
                    }
                }
            });
            Ok(AgentOutput::Stream(stream))
        } else {
            let outcome = converse_with_tools(
                self.model.as_ref(),
                request,
                self.toolbox.as_ref(),
                &ctx,
            )
            .await?;
            self.warn_if_exhausted(&outcome);
            Ok(AgentOutput::Message(outcome.into_message()))
        }
    }
}

/// Builder for [`LlmAgent`]
#[derive(Default)]
pub struct LlmAgentBuilder {
    name: Option<String>,
    description: Option<String>,
    model: Option<Arc<dyn ModelClient>>,
    save_chat: Option<bool>,
    streaming: bool,
    toolbox: Option<Toolbox>,
    inference: Option<InferenceConfig>,
    prompt_template: Option<String>,
}

impl LlmAgentBuilder {
    /// Display name (the id is derived from it)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Capability description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The model back-end
    pub fn model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    /// Whether the orchestrator persists this agent's turns (default true)
    pub fn save_chat(mut self, save_chat: bool) -> Self {
        self.save_chat = Some(save_chat);
        self
    }

    /// Select the streaming model-call variant (default single-response)
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Attach a toolbox
    pub fn toolbox(mut self, toolbox: Toolbox) -> Self {
        self.toolbox = Some(toolbox);
        self
    }

    /// Override inference parameters
    pub fn inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = Some(inference);
        self
    }

    /// Override the system prompt template
    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    /// Validate and build
    pub fn build(self) -> AgentResult<LlmAgent> {
        let name = self
            .name
            .ok_or_else(|| AgentError::Construction("agent name is required".to_string()))?;
        let model = self
            .model
            .ok_or_else(|| AgentError::Construction("agent model is required".to_string()))?;
        let description = self.description.unwrap_or_default();
        let mut meta = AgentMeta::new(name, description)?;
        if let Some(save_chat) = self.save_chat {
            meta = meta.with_save_chat(save_chat);
        }

        let mut variables = HashMap::new();
        variables.insert("name".to_string(), meta.name.clone());
        variables.insert("description".to_string(), meta.description.clone());

        Ok(LlmAgent {
            meta,
            model,
            toolbox: self.toolbox,
            inference: self.inference.unwrap_or_default(),
            streaming: self.streaming,
            prompt: RwLock::new(PromptState {
                template: self
                    .prompt_template
                    .unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE.to_string()),
                variables,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParticipantRole;
    use crate::error::ModelResult;
    use std::sync::Mutex;

    /// Replies with fixed text and records the last request.
    struct CaptureModel {
        reply: String,
        last_request: Mutex<Option<ModelRequest>>,
    }

    impl CaptureModel {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                last_request: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl ModelClient for CaptureModel {
        fn model_id(&self) -> &str {
            "capture"
        }

        async fn converse(&self, request: ModelRequest) -> ModelResult<ConversationMessage> {
            *self.last_request.lock().unwrap() = Some(request);
            Ok(ConversationMessage::assistant_text(self.reply.clone()))
        }
    }

    #[test]
    fn builder_requires_name_and_model() {
        let err = LlmAgent::builder().model(CaptureModel::new("x")).build();
        assert!(matches!(err, Err(AgentError::Construction(_))));

        let err = LlmAgent::builder().name("Nameless Model").build();
        assert!(matches!(err, Err(AgentError::Construction(_))));
    }

    #[tokio::test]
    async fn default_prompt_carries_identity() {
        let agent = LlmAgent::builder()
            .name("Tech Agent")
            .description("Handles technical questions.")
            .model(CaptureModel::new("ok"))
            .build()
            .unwrap();

        let prompt = agent.render_system_prompt().await;
        assert!(prompt.contains("You are a Tech Agent."));
        assert!(prompt.contains("Handles technical questions."));
    }

    #[tokio::test]
    async fn set_system_prompt_merges_variables() {
        let agent = LlmAgent::builder()
            .name("Lead")
            .model(CaptureModel::new("ok"))
            .prompt_template("{{name}} remembers: {{agents_memory}}")
            .build()
            .unwrap();

        agent
            .set_system_prompt(
                None,
                Some(HashMap::from([(
                    "agents_memory".to_string(),
                    "user:hi\nassistant:hello\n".to_string(),
                )])),
            )
            .await;

        let prompt = agent.render_system_prompt().await;
        assert!(prompt.starts_with("Lead remembers:"));
        assert!(prompt.contains("assistant:hello"));
    }

    #[tokio::test]
    async fn malformed_template_renders_as_its_raw_text() {
        let agent = LlmAgent::builder()
            .name("Lead")
            .model(CaptureModel::new("ok"))
            .build()
            .unwrap();

        agent
            .set_system_prompt(Some("{{ unclosed".to_string()), None)
            .await;

        assert_eq!(agent.render_system_prompt().await, "{{ unclosed");
    }

    #[tokio::test]
    async fn process_request_appends_the_user_turn() {
        let model = CaptureModel::new("answer");
        let agent = LlmAgent::builder()
            .name("Echo Agent")
            .model(Arc::clone(&model) as Arc<dyn ModelClient>)
            .build()
            .unwrap();

        let history = vec![
            ConversationMessage::user_text("earlier question"),
            ConversationMessage::assistant_text("earlier answer"),
        ];
        let output = agent
            .process_request("new question", "u1", "s1", &history, &ParamMap::new())
            .await
            .unwrap();

        let message = output.as_message().unwrap();
        assert_eq!(message.role, ParticipantRole::Assistant);
        assert_eq!(message.first_text(), Some("answer"));

        let request = model.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[2].first_text(), Some("new question"));
        assert_eq!(request.messages[2].role, ParticipantRole::User);
        assert!(request.system_prompt.contains("Echo Agent"));
    }

    #[tokio::test]
    async fn streaming_agents_deliver_a_final_message() {
        struct OneShotStream;

        #[async_trait]
        impl ModelClient for OneShotStream {
            fn model_id(&self) -> &str {
                "one-shot"
            }

            async fn converse(&self, _request: ModelRequest) -> ModelResult<ConversationMessage> {
                panic!("streaming agent must use converse_stream")
            }

            fn converse_stream(&self, _request: ModelRequest) -> crate::model::ModelStream {
                let (tx, stream) = crate::model::ModelStream::channel(8);
                tokio::spawn(async move {
                    tx.send_text("str").await;
                    tx.send_text("eamed").await;
                    tx.send(crate::model::ModelEvent::BlockStop).await;
                });
                stream
            }
        }

        let agent = LlmAgent::builder()
            .name("Streamer")
            .model(Arc::new(OneShotStream))
            .streaming(true)
            .build()
            .unwrap();
        assert!(agent.is_streaming());

        let output = agent
            .process_request("go", "u1", "s1", &[], &ParamMap::new())
            .await
            .unwrap();
        match output {
            AgentOutput::Stream(stream) => {
                let message = stream.collect_final().await.unwrap();
                assert_eq!(message.first_text(), Some("streamed"));
            }
            AgentOutput::Message(_) => panic!("expected the streaming variant"),
        }
    }
}
