//! Bounded model/tool recursion engine
//!
//! Generic machinery for any tool-using agent: call the model, execute the
//! tools it requests, feed the results back, repeat until the model stops
//! asking or the round budget runs out. The budget is a plain local
//! counter, decremented once per completed round; there is no shared
//! mutable loop state, so each round is a pure function of the running
//! conversation.

use futures::StreamExt;
use serde_json::Value;

use crate::domain::{ContentBlock, ConversationMessage, ResponseStreamSender};
use crate::error::{AgentError, AgentResult};
use crate::model::{BlockAccumulator, ModelClient, ModelEvent, ModelRequest};
use crate::tools::{ToolContext, Toolbox};

/// How a tool-recursion loop ended
///
/// Both variants carry the last model reply; `BudgetExhausted` means the
/// reply still requested tools when the round budget hit zero, so callers
/// can tell a natural finish from a forced one without inspecting blocks.
#[derive(Debug)]
pub enum LoopOutcome {
    /// The model produced a tool-free reply within budget
    Completed(ConversationMessage),
    /// The budget ran out with tools still being requested
    BudgetExhausted(ConversationMessage),
}

impl LoopOutcome {
    /// The final reply, whichever way the loop ended
    pub fn into_message(self) -> ConversationMessage {
        match self {
            LoopOutcome::Completed(message) | LoopOutcome::BudgetExhausted(message) => message,
        }
    }

    /// Whether the loop was cut off by the budget
    pub fn is_exhausted(&self) -> bool {
        matches!(self, LoopOutcome::BudgetExhausted(_))
    }
}

/// Run the single-response recursion loop
///
/// `request` holds the system prompt, the conversation so far (ending with
/// the current user turn), the offered tool specs, and inference
/// parameters. Without a toolbox the model is called exactly once.
pub async fn converse_with_tools(
    model: &dyn ModelClient,
    mut request: ModelRequest,
    toolbox: Option<&Toolbox>,
    ctx: &ToolContext,
) -> AgentResult<LoopOutcome> {
    let mut rounds_remaining = toolbox.map_or(1, Toolbox::max_recursions);

    loop {
        let reply = model
            .converse(request.clone())
            .await
            .map_err(AgentError::from)?;
        request.messages.push(reply.clone());

        let toolbox = match toolbox {
            Some(toolbox) if reply.has_tool_use() => toolbox,
            _ => return Ok(LoopOutcome::Completed(reply)),
        };

        let results = execute_tool_round(toolbox, &reply, ctx).await;
        request.messages.push(results);

        rounds_remaining -= 1;
        if rounds_remaining == 0 {
            return Ok(LoopOutcome::BudgetExhausted(reply));
        }
    }
}

/// Run the streaming recursion loop
///
/// Same algorithm as [`converse_with_tools`], except each round consumes
/// the model's event stream: text deltas are forwarded to `out` as they
/// arrive (for every round, not just the last) while the reply message is
/// reassembled from the buffered blocks. The final message is returned,
/// not sent; the caller owns the end of its stream.
pub async fn converse_with_tools_streaming(
    model: &dyn ModelClient,
    mut request: ModelRequest,
    toolbox: Option<&Toolbox>,
    ctx: &ToolContext,
    out: &ResponseStreamSender,
) -> AgentResult<LoopOutcome> {
    let mut rounds_remaining = toolbox.map_or(1, Toolbox::max_recursions);

    loop {
        let mut events = model.converse_stream(request.clone());
        let mut accumulator = BlockAccumulator::new();
        while let Some(event) = events.next().await {
            let event = event.map_err(AgentError::from)?;
            if let ModelEvent::TextDelta { text } = &event {
                let _ = out.send_text(text.clone()).await;
            }
            accumulator.apply(&event);
        }
        let reply = accumulator.finish();
        request.messages.push(reply.clone());

        let toolbox = match toolbox {
            Some(toolbox) if reply.has_tool_use() => toolbox,
            _ => return Ok(LoopOutcome::Completed(reply)),
        };

        let results = execute_tool_round(toolbox, &reply, ctx).await;
        request.messages.push(results);

        rounds_remaining -= 1;
        if rounds_remaining == 0 {
            return Ok(LoopOutcome::BudgetExhausted(reply));
        }
    }
}

/// Execute every tool use in a reply and aggregate the results
///
/// Handler failures and unknown names are absorbed here: the error text
/// becomes that tool's result so the model can react conversationally,
/// and siblings in the same round still run.
async fn execute_tool_round(
    toolbox: &Toolbox,
    reply: &ConversationMessage,
    ctx: &ToolContext,
) -> ConversationMessage {
    let mut results = Vec::new();
    for block in &reply.content {
        if let ContentBlock::ToolUse { id, name, input } = block {
            let value = match toolbox.execute(name, input.clone(), ctx).await {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!("Tool '{}' failed: {}", name, err);
                    Value::String(err.to_string())
                }
            };
            results.push(ContentBlock::tool_result(id.clone(), value));
        }
    }
    ConversationMessage::tool_results(results)
}
