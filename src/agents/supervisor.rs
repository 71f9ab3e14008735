//! Supervisor agent: one lead model fanning work out to a team
//!
//! The supervisor wraps a lead [`LlmAgent`] and installs two synthetic tools
//! on it: `send_messages`, which dispatches to named team members in
//! parallel, and `get_current_date`. Each turn it rebuilds a digest of every
//! team member's conversation history and substitutes it into the lead's
//! system prompt, so the lead model sees what its team has already said
//! without those turns appearing in its own chat history.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::{AgentOutput, ConversationMessage, ParamMap, ParticipantRole};
use crate::error::{AgentError, AgentResult};
use crate::storage::{ConversationStore, SessionTurn};
use crate::tools::{ToolContext, ToolExecutor, ToolSpec, ToolTable, Toolbox};

use super::llm::LlmAgent;
use super::{Agent, AgentMeta};

/// Round budget for the lead model's tool loop
pub const SUPERVISOR_MAX_RECURSIONS: u32 = 40;

const SEND_MESSAGES_TOOL: &str = "send_messages";
const GET_CURRENT_DATE_TOOL: &str = "get_current_date";
const MEMORY_PLACEHOLDER: &str = "{{agents_memory}}";

const DEFAULT_SUPERVISOR_TEMPLATE: &str = "\
You are a {{name}}.
{{description}}

You can interact with the following agents in this environment using the
send_messages tool:
<agents>
{{team_roster}}
</agents>

When communicating with other agents, including the User, follow these
guidelines:
<guidelines>
- Provide a final answer to the User when you have a response from all agents.
- Do not mention the name of any agent in your response.
- Contact multiple agents at the same time whenever possible.
- Keep your communications with other agents concise and terse; do not engage
  in any chit-chat.
- Agents are not aware of each other's existence. You act as the sole
  intermediary between them.
- Provide full context and details when necessary, as some agents will not
  have the full conversation history.
- Only communicate with the agents that are necessary to help with the
  User's query.
- If the User asks a question already answered in <agents_memory>, reuse
  that response.
- Never summarize an agent's response when giving a final answer to the User.
</guidelines>

<agents_memory>
{{agents_memory}}
</agents_memory>";

fn send_messages_spec() -> ToolSpec {
    ToolSpec::new(
        SEND_MESSAGES_TOOL,
        "Send a message to one or multiple agents in parallel.",
        json!({
            "type": "object",
            "properties": {
                "messages": {
                    "type": "array",
                    "description": "Array of messages to send to different agents.",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "recipient": {
                                "type": "string",
                                "description": "The name of the agent to send the message to."
                            },
                            "content": {
                                "type": "string",
                                "description": "The content of the message to send."
                            }
                        },
                        "required": ["recipient", "content"]
                    }
                }
            },
            "required": ["messages"]
        }),
    )
}

fn get_current_date_spec() -> ToolSpec {
    ToolSpec::new(
        GET_CURRENT_DATE_TOOL,
        "Get the date of today in US format.",
        json!({"type": "object", "properties": {}}),
    )
}

fn current_date_us() -> String {
    Utc::now().format("%m/%d/%Y").to_string()
}

#[derive(Deserialize)]
struct FanOutRequest {
    messages: Vec<FanOutMessage>,
}

#[derive(Deserialize)]
struct FanOutMessage {
    recipient: String,
    content: String,
}

/// Executor behind the lead agent's toolbox
///
/// Dispatches the two built-in tools itself and falls through to the extra
/// table, whose miss path reports the unknown name.
struct SupervisorToolSet {
    team: Vec<Arc<dyn Agent>>,
    storage: Arc<dyn ConversationStore>,
    member_max_pairs: Option<usize>,
    extra: ToolTable,
}

impl SupervisorToolSet {
    /// Fan one tool call out to every addressed team member
    ///
    /// Sub-dispatches run concurrently; the result lines keep the order the
    /// entries appear in the tool input, not completion order. Unknown
    /// recipients are skipped, and a member failure becomes an error note in
    /// that member's slot without touching its siblings.
    async fn send_messages(&self, input: Value, ctx: &ToolContext) -> AgentResult<Value> {
        let request: FanOutRequest = serde_json::from_value(input).map_err(|e| {
            AgentError::ToolExecution(format!("invalid send_messages input: {}", e))
        })?;

        let mut dispatches = Vec::new();
        for entry in request.messages {
            match self.team.iter().find(|m| m.name() == entry.recipient) {
                Some(member) => {
                    dispatches.push(self.dispatch_to_member(
                        Arc::clone(member),
                        entry.content,
                        ctx.clone(),
                    ));
                }
                None => {
                    tracing::warn!(
                        "send_messages addressed unknown recipient '{}'",
                        entry.recipient
                    );
                }
            }
        }

        let lines = join_all(dispatches).await;
        Ok(Value::String(lines.join("\n")))
    }

    async fn dispatch_to_member(
        &self,
        member: Arc<dyn Agent>,
        content: String,
        ctx: ToolContext,
    ) -> String {
        tracing::debug!("Supervisor sending to '{}': {}", member.name(), content);

        let history = if member.save_chat() {
            self.storage
                .fetch(&ctx.user_id, &ctx.session_id, member.id())
                .await
        } else {
            Vec::new()
        };

        let result = member
            .process_request(
                &content,
                &ctx.user_id,
                &ctx.session_id,
                &history,
                &ctx.additional_params,
            )
            .await;
        let message = match result {
            Ok(output) => match output.into_final_message().await {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!("Team member '{}' stream failed: {}", member.name(), err);
                    return format!("{}: request failed ({})", member.name(), err);
                }
            },
            Err(err) => {
                tracing::warn!("Team member '{}' failed: {}", member.name(), err);
                return format!("{}: request failed ({})", member.name(), err);
            }
        };
        let text = message.first_text().unwrap_or_default().to_string();

        if member.save_chat() {
            for turn in [
                ConversationMessage::user_text(&content),
                ConversationMessage::assistant_text(&text),
            ] {
                if let Err(err) = self
                    .storage
                    .append(
                        &ctx.user_id,
                        &ctx.session_id,
                        member.id(),
                        turn,
                        self.member_max_pairs,
                    )
                    .await
                {
                    tracing::warn!(
                        "Failed to persist turn for team member '{}': {}",
                        member.name(),
                        err
                    );
                }
            }
        }

        tracing::debug!("Supervisor received from '{}': {}", member.name(), text);
        format!("{}: {}", member.name(), text)
    }
}

#[async_trait]
impl ToolExecutor for SupervisorToolSet {
    async fn execute(&self, name: &str, input: Value, ctx: &ToolContext) -> AgentResult<Value> {
        match name {
            SEND_MESSAGES_TOOL => self.send_messages(input, ctx).await,
            GET_CURRENT_DATE_TOOL => {
                tracing::debug!("Using tool get_current_date");
                Ok(Value::String(current_date_us()))
            }
            _ => self.extra.execute(name, input, ctx).await,
        }
    }
}

/// An agent that coordinates a team of subordinate agents via a fan-out tool
///
/// Takes its name and description from the lead agent unless overridden, so
/// a classifier sees the supervisor exactly as it would see the lead.
pub struct SupervisorAgent {
    meta: AgentMeta,
    lead: LlmAgent,
    storage: Arc<dyn ConversationStore>,
    prompt_template: String,
    team_roster: String,
}

// The lead agent and store are not Debug, so Debug is written by hand over
// the identifying state.
impl fmt::Debug for SupervisorAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorAgent")
            .field("meta", &self.meta)
            .field("team_roster", &self.team_roster)
            .finish_non_exhaustive()
    }
}

impl SupervisorAgent {
    /// Start building a supervisor
    pub fn builder() -> SupervisorAgentBuilder {
        SupervisorAgentBuilder::default()
    }

    /// Pair up every team member's persisted turns, excluding the
    /// supervisor's own (those already reach the lead as explicit history)
    ///
    /// A pair is a member's user turn followed by that same member's next
    /// assistant turn; a pair lands in the digest where its assistant turn
    /// falls in the merged feed. Rebuilt in full every turn, nothing
    /// incremental is kept.
    fn build_memory_digest(&self, turns: &[SessionTurn]) -> String {
        let mut pending: HashMap<&str, &str> = HashMap::new();
        let mut digest = String::new();
        for turn in turns {
            if turn.agent_id == self.meta.id {
                continue;
            }
            let text = turn.message.first_text().unwrap_or_default();
            match turn.message.role {
                ParticipantRole::User => {
                    pending.insert(turn.agent_id.as_str(), text);
                }
                ParticipantRole::Assistant => {
                    if let Some(user_text) = pending.remove(turn.agent_id.as_str()) {
                        digest.push_str(&format!("user:{}\nassistant:{}\n", user_text, text));
                    }
                }
            }
        }
        digest
    }
}

#[async_trait]
impl Agent for SupervisorAgent {
    fn meta(&self) -> &AgentMeta {
        &self.meta
    }

    fn is_streaming(&self) -> bool {
        self.lead.is_streaming()
    }

    async fn process_request(
        &self,
        input_text: &str,
        user_id: &str,
        session_id: &str,
        history: &[ConversationMessage],
        additional_params: &ParamMap,
    ) -> AgentResult<AgentOutput> {
        let turns = self.storage.fetch_all(user_id, session_id).await;
        let digest = self.build_memory_digest(&turns);

        let variables = HashMap::from([
            ("agents_memory".to_string(), digest),
            ("team_roster".to_string(), self.team_roster.clone()),
        ]);
        self.lead
            .set_system_prompt(Some(self.prompt_template.clone()), Some(variables))
            .await;

        self.lead
            .process_request(input_text, user_id, session_id, history, additional_params)
            .await
    }
}

/// Builder for [`SupervisorAgent`]
#[derive(Default)]
pub struct SupervisorAgentBuilder {
    name: Option<String>,
    description: Option<String>,
    lead_agent: Option<LlmAgent>,
    team: Vec<Arc<dyn Agent>>,
    storage: Option<Arc<dyn ConversationStore>>,
    prompt_template: Option<String>,
    extra_tools: Option<ToolTable>,
    member_max_pairs: Option<usize>,
    save_chat: Option<bool>,
}

impl SupervisorAgentBuilder {
    /// Override the display name (defaults to the lead agent's)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the description (defaults to the lead agent's)
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The model-backed agent the supervisor speaks through; it must not
    /// have a toolbox of its own
    pub fn lead_agent(mut self, lead: LlmAgent) -> Self {
        self.lead_agent = Some(lead);
        self
    }

    /// Set the whole team at once
    pub fn team(mut self, team: Vec<Arc<dyn Agent>>) -> Self {
        self.team = team;
        self
    }

    /// Add one team member
    pub fn member(mut self, member: Arc<dyn Agent>) -> Self {
        self.team.push(member);
        self
    }

    /// Store used for member history and the per-turn memory digest
    pub fn storage(mut self, storage: Arc<dyn ConversationStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Override the lead's prompt template; it should carry the
    /// agents_memory placeholder
    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    /// Additional tools offered to the lead model alongside the built-ins
    pub fn extra_tools(mut self, extra_tools: ToolTable) -> Self {
        self.extra_tools = Some(extra_tools);
        self
    }

    /// Pair cap applied when persisting team members' turns
    pub fn member_max_pairs(mut self, member_max_pairs: usize) -> Self {
        self.member_max_pairs = Some(member_max_pairs);
        self
    }

    /// Whether the orchestrator persists the supervisor's own turns
    pub fn save_chat(mut self, save_chat: bool) -> Self {
        self.save_chat = Some(save_chat);
        self
    }

    /// Validate and build, installing the fan-out toolbox on the lead
    pub fn build(self) -> AgentResult<SupervisorAgent> {
        let lead = self.lead_agent.ok_or_else(|| {
            AgentError::Construction("supervisor requires a lead agent".to_string())
        })?;
        if lead.has_toolbox() {
            return Err(AgentError::Construction(
                "lead agent tool configuration must be owned by the supervisor; do not set it manually"
                    .to_string(),
            ));
        }
        let storage = self.storage.ok_or_else(|| {
            AgentError::Construction("supervisor requires a conversation store".to_string())
        })?;
        if self.team.is_empty() {
            return Err(AgentError::Construction(
                "supervisor requires a non-empty team".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for member in &self.team {
            if !seen.insert(member.name()) {
                return Err(AgentError::Construction(format!(
                    "duplicate team member name '{}'",
                    member.name()
                )));
            }
        }
        let extra = self.extra_tools.unwrap_or_default();
        for builtin in [SEND_MESSAGES_TOOL, GET_CURRENT_DATE_TOOL] {
            if extra.contains(builtin) {
                return Err(AgentError::Construction(format!(
                    "extra tool '{}' collides with a built-in supervisor tool",
                    builtin
                )));
            }
        }

        let prompt_template = self
            .prompt_template
            .unwrap_or_else(|| DEFAULT_SUPERVISOR_TEMPLATE.to_string());
        if !prompt_template.contains(MEMORY_PLACEHOLDER) {
            tracing::warn!(
                "Supervisor prompt template has no agents_memory placeholder; team history will not reach the lead model"
            );
        }

        let mut meta = AgentMeta::new(
            self.name.unwrap_or_else(|| lead.name().to_string()),
            self.description
                .unwrap_or_else(|| lead.description().to_string()),
        )?;
        if let Some(save_chat) = self.save_chat {
            meta = meta.with_save_chat(save_chat);
        }

        let team_roster = self
            .team
            .iter()
            .map(|m| format!("{}: {}", m.name(), m.description()))
            .collect::<Vec<_>>()
            .join("\n");

        let mut specs = vec![send_messages_spec(), get_current_date_spec()];
        specs.extend(extra.specs().to_vec());
        let tool_set = SupervisorToolSet {
            team: self.team,
            storage: Arc::clone(&storage),
            member_max_pairs: self.member_max_pairs,
            extra,
        };
        let toolbox = Toolbox::builder()
            .specs(specs)
            .executor(Arc::new(tool_set))
            .max_recursions(SUPERVISOR_MAX_RECURSIONS)
            .build()?;

        Ok(SupervisorAgent {
            meta,
            lead: lead.with_toolbox(toolbox),
            storage,
            prompt_template,
            team_roster,
        })
    }
}
