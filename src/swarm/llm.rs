//! LLM provider contract (spec §1 Non-goals: "the LLM HTTP transport and
//! its retry layer" is external). This narrows `cloudllm::client_wrapper`'s
//! `ClientWrapper::send_message` trait to the single round-trip contract
//! the engine actually needs, leaving vendor wire protocols out of scope.

use crate::swarm::message::{Message, TokenUsage};
use crate::swarm::tool_protocol::ToolMetadata;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;

/// A single LLM round-trip result: the assistant's reply plus usage.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The assistant's reply message (may carry tool calls).
    pub message: Message,
    /// Token accounting for this round-trip, if the provider reports it.
    pub usage: Option<TokenUsage>,
}

/// Opaque transport failure, surfaced to the engine as a user-visible
/// error with no partial tool results appended (spec §4.6).
#[derive(Debug)]
pub struct LlmTransportError(pub String);

impl fmt::Display for LlmTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "llm transport error: {}", self.0)
    }
}

impl Error for LlmTransportError {}

/// The narrow contract the conversation engine depends on: one request,
/// one response, given the full message history and the agent's declared
/// tool schemas.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier this provider serves, echoed back on [`Message`].
    fn model(&self) -> &str;

    /// Issue one chat-completion round-trip.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolMetadata],
    ) -> Result<LlmResponse, LlmTransportError>;
}

/// A deterministic, scriptable provider for tests: returns a fixed queue
/// of responses in order, one per call to `complete`.
pub struct ScriptedProvider {
    model: String,
    responses: tokio::sync::Mutex<std::collections::VecDeque<Result<LlmResponse, String>>>,
}

impl ScriptedProvider {
    /// Build a provider that yields `responses` in order, then errors if
    /// called more times than scripted.
    pub fn new(model: impl Into<String>, responses: Vec<Result<LlmResponse, String>>) -> Self {
        Self {
            model: model.into(),
            responses: tokio::sync::Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[ToolMetadata],
    ) -> Result<LlmResponse, LlmTransportError> {
        let mut queue = self.responses.lock().await;
        match queue.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(LlmTransportError(message)),
            None => Err(LlmTransportError("scripted provider exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::message::Message;

    #[tokio::test]
    async fn scripted_provider_replays_in_order() {
        let provider = ScriptedProvider::new(
            "test-model",
            vec![
                Ok(LlmResponse {
                    message: Message::assistant("first"),
                    usage: None,
                }),
                Ok(LlmResponse {
                    message: Message::assistant("second"),
                    usage: None,
                }),
            ],
        );
        let first = provider.complete(&[], &[]).await.unwrap();
        assert_eq!(first.message.content.as_text(), "first");
        let second = provider.complete(&[], &[]).await.unwrap();
        assert_eq!(second.message.content.as_text(), "second");
    }

    #[tokio::test]
    async fn exhausted_provider_errors() {
        let provider = ScriptedProvider::new("test-model", vec![]);
        assert!(provider.complete(&[], &[]).await.is_err());
    }
}
