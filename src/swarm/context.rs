//! Context Manager (C8): tracks token usage and fires 60/80/90% warning
//! thresholds, applying progressive tool-result compression on the first
//! threshold when no user handler already acted.
//!
//! Grounded in `cloudllm::context_strategy`'s `should_compact`/`compact`
//! split and its `TrimStrategy` default, adapted from the teacher's single
//! configurable ratio to spec's fixed 60/80/90 semantics tracked per
//! [`AgentContext`] rather than per strategy instance.

use crate::swarm::agent::AgentContext;
use crate::swarm::event::{EventBus, EventKind};
use crate::swarm::message::{Content, Message, Role};
use tracing::{info, warn};

/// Warning thresholds fired in ascending order, each at most once per
/// conversation (spec §8 property 3).
const THRESHOLDS: [u8; 3] = [60, 80, 90];

/// Number of most-recent tool messages progressive compression leaves
/// untouched.
pub const DEFAULT_KEEP_RECENT: usize = 10;

/// Truncated tool messages carry this sentinel so a reader can tell
/// compression ran (spec §4.8).
pub const TRUNCATION_SENTINEL: &str = "… [truncated for context management]";

/// Byte length above which an older tool message is replaced during
/// progressive compression.
const COMPRESS_ABOVE_BYTES: usize = 2_000;

/// Handler-facing view of a crossed threshold, letting a registered
/// callback mutate the conversation before automatic compression decides
/// whether to run (spec §4.8 "Handler-facing API").
pub struct ThresholdContext<'a> {
    /// Percentage of the context budget currently in use.
    pub usage_percentage: f32,
    /// The threshold that was just crossed.
    pub threshold: u8,
    /// Tokens consumed so far.
    pub tokens_used: usize,
    /// Tokens remaining in the budget.
    pub tokens_remaining: usize,
    /// The agent's total context budget.
    pub context_limit: usize,
    /// Name of the agent whose conversation this is.
    pub agent_name: &'a str,
    messages: &'a mut Vec<Message>,
    context: &'a mut AgentContext,
    bus: &'a EventBus,
}

impl<'a> ThresholdContext<'a> {
    /// Read-only view of the current message list.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.messages
    }

    /// Replace the entire message list wholesale.
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        *self.messages = messages;
    }

    /// Apply progressive tool-result compression: keep the most recent
    /// `keep_recent` tool messages untouched, truncate the content of
    /// older ones whose length exceeds `truncate_to` bytes, preserving
    /// `tool_call_id` so the tool-DAG invariant holds.
    pub fn compress_tool_results(&mut self, keep_recent: usize, truncate_to: usize) -> usize {
        let tool_indices: Vec<usize> = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::Tool)
            .map(|(i, _)| i)
            .collect();
        let to_compress = tool_indices.len().saturating_sub(keep_recent);
        let mut compressed = 0;
        for &idx in tool_indices.iter().take(to_compress) {
            let message = &mut self.messages[idx];
            let text = message.content.as_text();
            if text.len() > truncate_to {
                let mut truncated = text.chars().take(truncate_to).collect::<String>();
                truncated.push_str("\n\n");
                truncated.push_str(TRUNCATION_SENTINEL);
                message.content = Content::text(truncated);
                compressed += 1;
            }
        }
        compressed
    }

    /// Drop the oldest non-system messages beyond `keep_recent`, always
    /// preserving a leading system message at index 0 if one exists.
    pub fn prune_old_messages(&mut self, keep_recent: usize) {
        if self.messages.len() <= keep_recent {
            return;
        }
        let has_system = self.messages.first().map(|m| m.role == Role::System).unwrap_or(false);
        let head = if has_system { 1 } else { 0 };
        let keep_from = self.messages.len().saturating_sub(keep_recent).max(head);
        let mut retained = Vec::with_capacity(keep_recent + head);
        if has_system {
            retained.push(self.messages[0].clone());
        }
        retained.extend(self.messages[keep_from..].iter().cloned());
        *self.messages = retained;
    }

    /// Apply an arbitrary transform to the message list.
    pub fn transform_messages(&mut self, f: impl FnOnce(Vec<Message>) -> Vec<Message>) {
        let taken = std::mem::take(self.messages);
        *self.messages = f(taken);
    }

    /// Record that this handler already applied compression, suppressing
    /// the automatic 60% compression pass that would otherwise follow.
    pub fn mark_compression_applied(&mut self) {
        self.context.compression_applied = true;
    }

    /// Emit a `context_management_action` event describing a handler's
    /// action, for observability.
    pub fn log_action(&self, action: &str, details: serde_json::Value) {
        self.bus.emit(
            self.agent_name.to_string(),
            EventKind::ContextManagementAction {
                action: action.to_string(),
                details,
            },
        );
    }
}

/// A user-registered callback invoked when a threshold is crossed.
pub type ThresholdHandler = std::sync::Arc<dyn Fn(&mut ThresholdContext<'_>) + Send + Sync>;

/// Stateless/shared manager: all per-conversation state lives on
/// [`AgentContext`], matching `ContextStrategy` being `Send + Sync` and
/// reusable across agents.
#[derive(Default)]
pub struct ContextManager {
    handlers: std::collections::HashMap<u8, Vec<ThresholdHandler>>,
}

impl ContextManager {
    /// Create a manager with no registered handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler to run when `threshold` is crossed.
    pub fn on_threshold(&mut self, threshold: u8, handler: ThresholdHandler) {
        self.handlers.entry(threshold).or_default().push(handler);
    }

    /// Check usage against the 60/80/90 thresholds, firing any newly
    /// crossed ones in ascending order and running automatic compression
    /// at 60% if no handler already marked compression applied.
    pub fn check_context_warnings(
        &self,
        bus: &EventBus,
        context: &mut AgentContext,
        messages: &mut Vec<Message>,
        tokens_used: usize,
        context_limit: usize,
    ) {
        if context_limit == 0 {
            return;
        }
        let usage_percentage = (tokens_used as f32 / context_limit as f32) * 100.0;
        for &threshold in &THRESHOLDS {
            if (usage_percentage as u32) < threshold as u32 {
                continue;
            }
            if !context.mark_threshold_hit(threshold) {
                continue;
            }
            bus.emit(
                context.agent_name.clone(),
                EventKind::ContextThresholdHit {
                    threshold,
                    current_usage_percentage: usage_percentage,
                },
            );
            info!(agent = %context.agent_name, threshold, usage_percentage, "context threshold crossed");

            let agent_name = context.agent_name.clone();

            {
                let mut ctx = ThresholdContext {
                    usage_percentage,
                    threshold,
                    tokens_used,
                    tokens_remaining: context_limit.saturating_sub(tokens_used),
                    context_limit,
                    agent_name: &agent_name,
                    messages: &mut *messages,
                    context: &mut *context,
                    bus,
                };
                if let Some(handlers) = self.handlers.get(&threshold) {
                    for handler in handlers {
                        handler(&mut ctx);
                    }
                }
            }

            let mut compression_triggered = false;
            if threshold == 60 && !context.compression_applied {
                let tokens_before = messages.iter().map(Message::approx_tokens).sum();
                let compressed = {
                    let mut ctx = ThresholdContext {
                        usage_percentage,
                        threshold,
                        tokens_used,
                        tokens_remaining: context_limit.saturating_sub(tokens_used),
                        context_limit,
                        agent_name: &agent_name,
                        messages: &mut *messages,
                        context: &mut *context,
                        bus,
                    };
                    ctx.compress_tool_results(DEFAULT_KEEP_RECENT, COMPRESS_ABOVE_BYTES)
                };
                context.compression_applied = true;
                compression_triggered = true;
                bus.emit(
                    context.agent_name.clone(),
                    EventKind::ContextCompression {
                        messages_compressed: compressed,
                        tokens_before,
                        strategy: "progressive_tool_result_truncation".to_string(),
                        keep_recent: DEFAULT_KEEP_RECENT,
                    },
                );
                warn!(agent = %context.agent_name, compressed, "applied progressive tool-result compression");
            }

            bus.emit(
                context.agent_name.clone(),
                EventKind::ContextLimitWarning {
                    threshold: format!("{threshold}%"),
                    compression_triggered,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::agent::AgentMetadata;
    use crate::swarm::event::{EventFilter, TaskContext};

    fn meta() -> AgentMetadata {
        AgentMetadata {
            swarm_id: "s1".into(),
            parent_swarm_id: None,
            execution_id: "e1".into(),
        }
    }

    fn tool_message(id: &str, body: &str) -> Message {
        Message::tool_result(id, body)
    }

    #[tokio::test]
    async fn threshold_fires_once_and_is_monotonic() {
        let bus = EventBus::new();
        let manager = ContextManager::new();
        let mut ctx = AgentContext::new("lead", meta());
        let mut messages = vec![Message::user("hi")];

        let task_ctx = TaskContext {
            swarm_id: "s1".into(),
            parent_swarm_id: None,
            execution_id: "e1".into(),
        };
        task_ctx
            .scope(async {
                manager.check_context_warnings(&bus, &mut ctx, &mut messages, 65, 100);
                manager.check_context_warnings(&bus, &mut ctx, &mut messages, 65, 100);
            })
            .await;

        assert_eq!(ctx.warning_thresholds_hit.len(), 1);
        assert!(ctx.warning_thresholds_hit.contains(&60));
    }

    #[tokio::test]
    async fn compression_applies_once_at_sixty_percent() {
        let bus = EventBus::new();
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count2 = count.clone();
        bus.subscribe(
            EventFilter {
                event_type: Some("context_compression".to_string()),
                agent: None,
            },
            move |_| {
                count2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            },
        );

        let manager = ContextManager::new();
        let mut ctx = AgentContext::new("lead", meta());
        let long_body = "x".repeat(3000);
        let mut messages: Vec<Message> = (0..25).map(|i| tool_message(&format!("c{i}"), &long_body)).collect();

        let task_ctx = TaskContext {
            swarm_id: "s1".into(),
            parent_swarm_id: None,
            execution_id: "e1".into(),
        };
        task_ctx
            .scope(async {
                manager.check_context_warnings(&bus, &mut ctx, &mut messages, 65, 100);
            })
            .await;

        assert!(ctx.compression_applied);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
        let compressed_count = messages
            .iter()
            .filter(|m| m.content.as_text().contains(TRUNCATION_SENTINEL))
            .count();
        assert_eq!(compressed_count, 15);
    }

    #[test]
    fn prune_preserves_leading_system_message() {
        let mut messages = vec![
            Message::system("sys"),
            Message::user("1"),
            Message::user("2"),
            Message::user("3"),
        ];
        let bus = EventBus::new();
        let mut ctx = AgentContext::new("lead", meta());
        let agent_name = ctx.agent_name.clone();
        let mut threshold_ctx = ThresholdContext {
            usage_percentage: 0.0,
            threshold: 60,
            tokens_used: 0,
            tokens_remaining: 0,
            context_limit: 0,
            agent_name: &agent_name,
            messages: &mut messages,
            context: &mut ctx,
            bus: &bus,
        };
        threshold_ctx.prune_old_messages(2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages.len(), 3);
    }
}
