#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use hermes::agents::AgentMeta;
use hermes::domain::{AgentOutput, ContentBlock, ConversationMessage, ParamMap, ResponseStream};
use hermes::error::{AgentError, AgentResult, ModelResult};
use hermes::model::{ModelClient, ModelRequest};
use hermes::storage::SessionTurn;
use hermes::tools::{ToolSpec, ToolTable};
use hermes::{Agent, Classifier, ClassifierResult, ParticipantRole};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Assistant message carrying a single tool-use block.
pub fn tool_use_reply(id: &str, name: &str, input: Value) -> ConversationMessage {
    ConversationMessage::new(
        ParticipantRole::Assistant,
        vec![ContentBlock::tool_use(id, name, input)],
    )
}

/// Table with one tool that counts its invocations.
pub fn counting_tool(name: &str, counter: Arc<AtomicU32>) -> ToolTable {
    ToolTable::new().register(
        ToolSpec::new(name, "Counts invocations.", json!({"type": "object"})),
        move |_input, _ctx| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!("ok"))
            })
        },
    )
}

/// Model that plays queued replies in order and records every request.
///
/// Once the queue runs dry it repeats its fallback reply, which makes an
/// always-tool-requesting model a one-liner.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ConversationMessage>>,
    fallback: ConversationMessage,
    requests: Mutex<Vec<ModelRequest>>,
    calls: AtomicU32,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ConversationMessage>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: ConversationMessage::assistant_text("done"),
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn repeating(reply: ConversationMessage) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: reply,
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn request(&self, index: usize) -> ModelRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn converse(&self, request: ModelRequest) -> ModelResult<ConversationMessage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

enum FixedMode {
    Reply,
    Fail,
    Stream,
}

/// Agent with a canned behavior: fixed reply (optionally delayed),
/// guaranteed failure, or a short stream ending in a final message.
pub struct FixedAgent {
    meta: AgentMeta,
    reply: String,
    mode: FixedMode,
    delay_ms: u64,
}

impl FixedAgent {
    pub fn new(name: &str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            meta: AgentMeta::new(name, "canned test agent").unwrap(),
            reply: reply.to_string(),
            mode: FixedMode::Reply,
            delay_ms: 0,
        })
    }

    pub fn delayed(name: &str, reply: &str, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            meta: AgentMeta::new(name, "canned test agent").unwrap(),
            reply: reply.to_string(),
            mode: FixedMode::Reply,
            delay_ms,
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            meta: AgentMeta::new(name, "always fails").unwrap(),
            reply: String::new(),
            mode: FixedMode::Fail,
            delay_ms: 0,
        })
    }

    pub fn streaming(name: &str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            meta: AgentMeta::new(name, "streams a canned reply").unwrap(),
            reply: reply.to_string(),
            mode: FixedMode::Stream,
            delay_ms: 0,
        })
    }

    pub fn quiet(name: &str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            meta: AgentMeta::new(name, "never persisted")
                .unwrap()
                .with_save_chat(false),
            reply: reply.to_string(),
            mode: FixedMode::Reply,
            delay_ms: 0,
        })
    }
}

#[async_trait]
impl Agent for FixedAgent {
    fn meta(&self) -> &AgentMeta {
        &self.meta
    }

    fn is_streaming(&self) -> bool {
        matches!(self.mode, FixedMode::Stream)
    }

    async fn process_request(
        &self,
        _input_text: &str,
        _user_id: &str,
        _session_id: &str,
        _history: &[ConversationMessage],
        _additional_params: &ParamMap,
    ) -> AgentResult<AgentOutput> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.mode {
            FixedMode::Reply => Ok(AgentOutput::Message(ConversationMessage::assistant_text(
                self.reply.clone(),
            ))),
            FixedMode::Fail => Err(AgentError::Execution("agent exploded".to_string())),
            FixedMode::Stream => {
                let (tx, stream) = ResponseStream::channel(8);
                let reply = self.reply.clone();
                tokio::spawn(async move {
                    tx.send_text(reply.clone()).await;
                    tx.send_final(ConversationMessage::assistant_text(reply)).await;
                });
                Ok(AgentOutput::Stream(stream))
            }
        }
    }
}

/// What the stub classifier should do for one classify call.
#[derive(Clone, Copy)]
pub enum Routing {
    Select(&'static str),
    Abstain,
    Fail,
}

/// Classifier driven by a script, falling back to a default action.
pub struct StubClassifier {
    agents: tokio::sync::Mutex<Vec<Arc<dyn Agent>>>,
    script: tokio::sync::Mutex<VecDeque<Routing>>,
    default: Routing,
}

impl StubClassifier {
    pub fn new(script: Vec<Routing>) -> Arc<Self> {
        Arc::new(Self {
            agents: tokio::sync::Mutex::new(Vec::new()),
            script: tokio::sync::Mutex::new(script.into()),
            default: Routing::Abstain,
        })
    }

    pub fn selecting(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            agents: tokio::sync::Mutex::new(Vec::new()),
            script: tokio::sync::Mutex::new(VecDeque::new()),
            default: Routing::Select(name),
        })
    }

    pub async fn candidate_count(&self) -> usize {
        self.agents.lock().await.len()
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn set_agents(&self, agents: Vec<Arc<dyn Agent>>) {
        *self.agents.lock().await = agents;
    }

    async fn classify(
        &self,
        _input_text: &str,
        _history: &[SessionTurn],
    ) -> AgentResult<ClassifierResult> {
        let action = self.script.lock().await.pop_front().unwrap_or(self.default);
        match action {
            Routing::Select(name) => {
                let agents = self.agents.lock().await;
                Ok(agents
                    .iter()
                    .find(|a| a.name() == name)
                    .map(|agent| ClassifierResult::selected(Arc::clone(agent), 0.9))
                    .unwrap_or_else(ClassifierResult::abstained))
            }
            Routing::Abstain => Ok(ClassifierResult::abstained()),
            Routing::Fail => Err(AgentError::Execution("classifier offline".to_string())),
        }
    }
}
