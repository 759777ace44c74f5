//! Conversation data model: messages, roles, and tool calls.
//!
//! Grounded in `cloudllm::client_wrapper`'s `Message`/`Role`/`NativeToolCall`
//! shape, extended with the token-accounting and structured-content fields
//! spec §3 requires of a `Message`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The role a [`Message`] was authored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Primes or constrains assistant behavior.
    System,
    /// A human (or delegator) turn.
    User,
    /// A model turn, possibly carrying tool calls.
    Assistant,
    /// A tool result correlated to a prior assistant tool call.
    Tool,
}

/// A tool call requested by the LLM inside an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque id assigned by the model; correlates with the tool-result
    /// message's `tool_call_id`.
    pub id: String,
    /// Name of the tool being invoked.
    pub name: String,
    /// Parsed JSON arguments.
    pub arguments: serde_json::Value,
}

/// Message content: either plain text or a multi-part structured body
/// (e.g. text plus image attachments, per the Tool ABI in spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain UTF-8 text.
    Text(Arc<str>),
    /// Ordered multi-part content.
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Construct text content from anything that converts into a `String`.
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(Arc::from(s.into()))
    }

    /// Best-effort flattening to a single string, joining multi-part text
    /// segments and summarizing non-text parts.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(t) => t.to_string(),
            Content::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::Image { .. } => "[image]".to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Approximate token count (one token per four characters), used by the
    /// context manager for threshold checks. Not a billing-accurate count.
    #[must_use]
    pub fn approx_tokens(&self) -> usize {
        (self.as_text().len() / 4).max(1)
    }
}

/// A single part of a structured, multi-part message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A text segment.
    Text {
        /// The text.
        text: String,
    },
    /// An image attachment, base64-encoded.
    Image {
        /// MIME type, e.g. `"image/png"`.
        media_type: String,
        /// Base64-encoded bytes.
        data: String,
    },
}

/// Token accounting for a single LLM round-trip.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input/prompt tokens.
    pub input_tokens: usize,
    /// Output/completion tokens.
    pub output_tokens: usize,
    /// Tokens served from a prompt cache, if the provider reports it.
    pub cached_tokens: usize,
    /// Tokens spent writing to a prompt cache, if the provider reports it.
    pub cache_creation_tokens: usize,
}

impl TokenUsage {
    /// Total billed tokens for this round-trip.
    #[must_use]
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

/// A single turn in an agent's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Author role.
    pub role: Role,
    /// Message body.
    pub content: Content,
    /// Tool calls requested by the assistant, if any. Empty for all other
    /// roles.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// For `Role::Tool` messages, the id of the assistant tool call this
    /// result answers. Invariant (spec §3): must match a prior assistant
    /// tool call id in the same conversation.
    #[serde(default)]
    pub tool_call_id: Option<String>,
    /// Token accounting for the LLM call that produced this message, if
    /// applicable.
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    /// Model id that produced this message, if applicable.
    #[serde(default)]
    pub model: Option<String>,
}

impl Message {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Content::text(content))
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Content::text(content))
    }

    /// Build an assistant message with no tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::text(content))
    }

    /// Build an assistant message carrying tool calls.
    #[must_use]
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut m = Self::new(Role::Assistant, Content::text(content));
        m.tool_calls = tool_calls;
        m
    }

    /// Build a tool-result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut m = Self::new(Role::Tool, Content::text(content));
        m.tool_call_id = Some(tool_call_id.into());
        m
    }

    fn new(role: Role, content: Content) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            usage: None,
            model: None,
        }
    }

    /// Approximate token count for this message, including a small
    /// per-message role overhead.
    #[must_use]
    pub fn approx_tokens(&self) -> usize {
        1 + self.content.approx_tokens()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_carries_call_id() {
        let m = Message::tool_result("call_1", "42");
        assert_eq!(m.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(m.role, Role::Tool);
    }

    #[test]
    fn content_as_text_joins_parts() {
        let c = Content::Parts(vec![
            ContentPart::Text {
                text: "hello".into(),
            },
            ContentPart::Image {
                media_type: "image/png".into(),
                data: "AAAA".into(),
            },
        ]);
        assert_eq!(c.as_text(), "hello\n[image]");
    }
}
