//! Sequential composition of agents

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{AgentOutput, ConversationMessage, ParamMap};
use crate::error::{AgentError, AgentResult};

use super::{Agent, AgentMeta};

const DEFAULT_CHAIN_OUTPUT: &str = "No output generated from the chain.";

/// Runs a fixed sequence of agents, feeding each member's final text to
/// the next member as its input
///
/// Only the last member may stream; an intermediate member that streams,
/// fails, or produces no text ends the chain with the default output.
pub struct ChainAgent {
    meta: AgentMeta,
    agents: Vec<Arc<dyn Agent>>,
    default_output: String,
}

impl ChainAgent {
    /// Create a chain over a non-empty list of members
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        agents: Vec<Arc<dyn Agent>>,
    ) -> AgentResult<Self> {
        if agents.is_empty() {
            return Err(AgentError::Construction(
                "chain requires at least one agent".to_string(),
            ));
        }
        Ok(Self {
            meta: AgentMeta::new(name, description)?,
            agents,
            default_output: DEFAULT_CHAIN_OUTPUT.to_string(),
        })
    }

    /// Override the text returned when the chain cannot produce output
    pub fn with_default_output(mut self, text: impl Into<String>) -> Self {
        self.default_output = text.into();
        self
    }

    fn default_response(&self) -> AgentOutput {
        AgentOutput::Message(ConversationMessage::assistant_text(&self.default_output))
    }
}

#[async_trait]
impl Agent for ChainAgent {
    fn meta(&self) -> &AgentMeta {
        &self.meta
    }

    fn is_streaming(&self) -> bool {
        self.agents.last().map(|a| a.is_streaming()).unwrap_or(false)
    }

    async fn process_request(
        &self,
        input_text: &str,
        user_id: &str,
        session_id: &str,
        history: &[ConversationMessage],
        additional_params: &ParamMap,
    ) -> AgentResult<AgentOutput> {
        let mut current_input = input_text.to_string();
        let last = self.agents.len() - 1;

        for (index, agent) in self.agents.iter().enumerate() {
            let result = agent
                .process_request(&current_input, user_id, session_id, history, additional_params)
                .await;

            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    tracing::warn!("Chain member '{}' failed: {}", agent.name(), err);
                    return Ok(self.default_response());
                }
            };

            if index == last {
                return Ok(output);
            }

            match output {
                AgentOutput::Message(message) => match message.first_text() {
                    Some(text) if !text.is_empty() => current_input = text.to_string(),
                    _ => {
                        tracing::warn!(
                            "Chain member '{}' produced no text to pass on",
                            agent.name()
                        );
                        return Ok(self.default_response());
                    }
                },
                AgentOutput::Stream(_) => {
                    tracing::warn!(
                        "Chain member '{}' returned a stream mid-chain",
                        agent.name()
                    );
                    return Ok(self.default_response());
                }
            }
        }

        Ok(self.default_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResponseStream;

    /// Replies with a fixed text, prefixed by the input it received.
    struct EchoingAgent {
        meta: AgentMeta,
    }

    impl EchoingAgent {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                meta: AgentMeta::new(name, "echoes").unwrap(),
            })
        }
    }

    #[async_trait]
    impl Agent for EchoingAgent {
        fn meta(&self) -> &AgentMeta {
            &self.meta
        }

        async fn process_request(
            &self,
            input_text: &str,
            _user_id: &str,
            _session_id: &str,
            _history: &[ConversationMessage],
            _additional_params: &ParamMap,
        ) -> AgentResult<AgentOutput> {
            Ok(AgentOutput::Message(ConversationMessage::assistant_text(
                format!("{}+{}", self.meta.name, input_text),
            )))
        }
    }

    struct FailingAgent {
        meta: AgentMeta,
    }

    #[async_trait]
    impl Agent for FailingAgent {
        fn meta(&self) -> &AgentMeta {
            &self.meta
        }

        async fn process_request(
            &self,
            _input_text: &str,
            _user_id: &str,
            _session_id: &str,
            _history: &[ConversationMessage],
            _additional_params: &ParamMap,
        ) -> AgentResult<AgentOutput> {
            Err(AgentError::Execution("boom".to_string()))
        }
    }

    struct StreamingAgent {
        meta: AgentMeta,
    }

    #[async_trait]
    impl Agent for StreamingAgent {
        fn meta(&self) -> &AgentMeta {
            &self.meta
        }

        fn is_streaming(&self) -> bool {
            true
        }

        async fn process_request(
            &self,
            _input_text: &str,
            _user_id: &str,
            _session_id: &str,
            _history: &[ConversationMessage],
            _additional_params: &ParamMap,
        ) -> AgentResult<AgentOutput> {
            let (tx, stream) = ResponseStream::channel(4);
            tokio::spawn(async move {
                tx.send_final(ConversationMessage::assistant_text("streamed end"))
                    .await;
            });
            Ok(AgentOutput::Stream(stream))
        }
    }

    #[test]
    fn an_empty_chain_is_rejected() {
        assert!(ChainAgent::new("Pipeline", "", Vec::new()).is_err());
    }

    #[tokio::test]
    async fn text_flows_through_the_chain() {
        let chain = ChainAgent::new(
            "Pipeline",
            "two stages",
            vec![
                EchoingAgent::new("First") as Arc<dyn Agent>,
                EchoingAgent::new("Second"),
            ],
        )
        .unwrap();

        let output = chain
            .process_request("seed", "u", "s", &[], &ParamMap::new())
            .await
            .unwrap();
        assert_eq!(
            output.as_message().unwrap().first_text(),
            Some("Second+First+seed")
        );
    }

    #[tokio::test]
    async fn a_failing_member_yields_the_default_output() {
        let chain = ChainAgent::new(
            "Pipeline",
            "",
            vec![
                Arc::new(FailingAgent {
                    meta: AgentMeta::new("Broken", "").unwrap(),
                }) as Arc<dyn Agent>,
                EchoingAgent::new("Unreached"),
            ],
        )
        .unwrap();

        let output = chain
            .process_request("seed", "u", "s", &[], &ParamMap::new())
            .await
            .unwrap();
        assert_eq!(
            output.as_message().unwrap().first_text(),
            Some(DEFAULT_CHAIN_OUTPUT)
        );
    }

    #[tokio::test]
    async fn an_intermediate_stream_ends_the_chain() {
        let chain = ChainAgent::new(
            "Pipeline",
            "",
            vec![
                Arc::new(StreamingAgent {
                    meta: AgentMeta::new("Streamy", "").unwrap(),
                }) as Arc<dyn Agent>,
                EchoingAgent::new("Unreached"),
            ],
        )
        .unwrap()
        .with_default_output("chain broke");

        let output = chain
            .process_request("seed", "u", "s", &[], &ParamMap::new())
            .await
            .unwrap();
        assert_eq!(output.as_message().unwrap().first_text(), Some("chain broke"));
    }

    #[tokio::test]
    async fn the_last_member_may_stream() {
        let chain = ChainAgent::new(
            "Pipeline",
            "",
            vec![
                EchoingAgent::new("First") as Arc<dyn Agent>,
                Arc::new(StreamingAgent {
                    meta: AgentMeta::new("Streamy", "").unwrap(),
                }),
            ],
        )
        .unwrap();
        assert!(chain.is_streaming());

        let output = chain
            .process_request("seed", "u", "s", &[], &ParamMap::new())
            .await
            .unwrap();
        let message = output.into_final_message().await.unwrap();
        assert_eq!(message.first_text(), Some("streamed end"));
    }
}
