//! Adapts a `cloudllm::client_wrapper::ClientWrapper` (the teacher's actual
//! vendor clients — OpenAI, etc.) onto this crate's narrower
//! [`LlmProvider`] contract, so the CLI binary has a real provider to run
//! against without this crate owning any vendor wire protocol itself
//! (spec §1 Non-goals: "the LLM HTTP transport and its retry layer").

use crate::cloudllm::client_wrapper::{
    ClientWrapper, Message as ClientMessage, NativeToolCall, Role as ClientRole, ToolDefinition,
};
use crate::swarm::llm::{LlmProvider, LlmResponse, LlmTransportError};
use crate::swarm::message::{Content, Message, Role, TokenUsage, ToolCall};
use crate::swarm::tool_protocol::ToolMetadata;
use async_trait::async_trait;
use std::sync::Arc;

/// Wraps a boxed [`ClientWrapper`] as an [`LlmProvider`].
pub struct ClientWrapperProvider {
    model: String,
    client: Arc<dyn ClientWrapper>,
}

impl ClientWrapperProvider {
    /// Build a provider that forwards every round-trip to `client`,
    /// reporting `model` as its own identifier.
    #[must_use]
    pub fn new(model: impl Into<String>, client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            model: model.into(),
            client,
        }
    }
}

fn to_client_message(message: &Message) -> ClientMessage {
    let role = match message.role {
        Role::System => ClientRole::System,
        Role::User => ClientRole::User,
        Role::Assistant => ClientRole::Assistant,
        Role::Tool => ClientRole::Tool {
            call_id: message.tool_call_id.clone().unwrap_or_default(),
        },
    };
    let tool_calls = message
        .tool_calls
        .iter()
        .map(|tc| NativeToolCall {
            id: tc.id.clone(),
            name: tc.name.clone(),
            arguments: tc.arguments.clone(),
        })
        .collect();
    ClientMessage {
        role,
        content: Arc::from(message.content.as_text()),
        tool_calls,
    }
}

fn to_tool_definition(metadata: &ToolMetadata) -> ToolDefinition {
    ToolDefinition {
        name: metadata.name.clone(),
        description: metadata.description.clone(),
        parameters_schema: metadata.params_schema(),
    }
}

fn from_client_message(message: ClientMessage, model: &str) -> Message {
    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            name: tc.name,
            arguments: tc.arguments,
        })
        .collect();
    Message {
        role: Role::Assistant,
        content: Content::text(message.content.to_string()),
        tool_calls,
        tool_call_id: None,
        usage: None,
        model: Some(model.to_string()),
    }
}

#[async_trait]
impl LlmProvider for ClientWrapperProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolMetadata]) -> Result<LlmResponse, LlmTransportError> {
        let client_messages: Vec<ClientMessage> = messages.iter().map(to_client_message).collect();
        let tool_defs = if tools.is_empty() {
            None
        } else {
            Some(tools.iter().map(to_tool_definition).collect())
        };

        let reply = self
            .client
            .send_message(&client_messages, tool_defs)
            .await
            .map_err(|e| LlmTransportError(e.to_string()))?;

        let usage = self.client.get_last_usage().await.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            cached_tokens: 0,
            cache_creation_tokens: 0,
        });

        let mut message = from_client_message(reply, &self.model);
        message.usage = usage.clone();
        Ok(LlmResponse { message, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::client_wrapper::TokenUsage as ClientTokenUsage;
    use async_trait::async_trait;
    use std::error::Error;
    use std::sync::Mutex;

    struct FakeClient {
        reply: Mutex<Option<ClientMessage>>,
    }

    #[async_trait]
    impl ClientWrapper for FakeClient {
        async fn send_message(
            &self,
            _messages: &[ClientMessage],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<ClientMessage, Box<dyn Error>> {
            Ok(self.reply.lock().unwrap().take().expect("reply already consumed"))
        }

        fn model_name(&self) -> &str {
            "fake-model"
        }

        async fn get_last_usage(&self) -> Option<ClientTokenUsage> {
            Some(ClientTokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            })
        }
    }

    #[tokio::test]
    async fn forwards_a_round_trip_and_translates_the_reply() {
        let client = Arc::new(FakeClient {
            reply: Mutex::new(Some(ClientMessage {
                role: ClientRole::Assistant,
                content: Arc::from("hello back"),
                tool_calls: vec![],
            })),
        });
        let provider = ClientWrapperProvider::new("fake-model", client);
        let response = provider.complete(&[Message::user("hi")], &[]).await.unwrap();
        assert_eq!(response.message.content.as_text(), "hello back");
        assert_eq!(response.usage.unwrap().input_tokens, 10);
    }
}
