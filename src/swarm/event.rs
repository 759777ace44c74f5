//! Event Log & Subscription Bus (C1).
//!
//! A single-writer, multi-subscriber stream of structured events carrying
//! task-local lineage (`swarm_id`, `parent_swarm_id`, `execution_id`),
//! grounded in `cloudllm::event`'s flat-enum-per-lifecycle-moment shape but
//! generalized to spec §4.1's filterable `subscribe(filter, handler)`
//! contract instead of one hardcoded `EventHandler` trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

tokio::task_local! {
    static TASK_CONTEXT: TaskContext;
}

/// Lineage carried by every event, set by the orchestrator before a swarm
/// execution begins and inherited by child tasks (tool execution,
/// delegation) so events carry correct ids even when a swarm instance is
/// reused across concurrent executions (spec §4.1).
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Identifier of the swarm instance handling this execution.
    pub swarm_id: String,
    /// Identifier of the parent swarm, for nested swarms.
    pub parent_swarm_id: Option<String>,
    /// Identifier of this particular `execute()` invocation.
    pub execution_id: String,
}

impl TaskContext {
    /// Run `f` with this context installed as the ambient task-local
    /// context, inherited by any task spawned within `f`.
    pub async fn scope<F, T>(self, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        TASK_CONTEXT.scope(self, f).await
    }

    /// Read the currently installed context, if any.
    #[must_use]
    pub fn current() -> Option<TaskContext> {
        TASK_CONTEXT.try_with(Clone::clone).ok()
    }
}

/// The event type taxonomy from spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// An agent conversation started processing a prompt.
    AgentStart {
        /// First ~120 characters of the prompt.
        prompt_preview: String,
    },
    /// An assistant turn produced tool calls and the loop continues.
    AgentStep {
        /// 1-based turn counter.
        iteration: usize,
        /// Number of tool calls in this turn.
        tool_call_count: usize,
    },
    /// An agent conversation finished (normal stop or forced stop).
    AgentStop {
        /// Final content returned to the caller.
        content: String,
        /// Set when the stop was forced by a finish-agent/finish-swarm tool.
        override_reason: Option<String>,
    },
    /// A tool call was dispatched.
    ToolCall {
        /// Opaque call id.
        call_id: String,
        /// Tool name.
        tool: String,
        /// JSON arguments.
        arguments: Value,
    },
    /// A tool call completed (successfully or not).
    ToolResult {
        /// Opaque call id.
        call_id: String,
        /// Tool name.
        tool: String,
        /// Whether execution succeeded.
        success: bool,
    },
    /// A delegation tool call was recognized and routed.
    AgentDelegation {
        /// Opaque call id on the delegator's open tool call.
        call_id: String,
        /// Target agent name.
        delegate_to: String,
    },
    /// A delegated sub-conversation completed.
    DelegationResult {
        /// Opaque call id this answers.
        call_id: String,
        /// Target agent name.
        delegate_to: String,
        /// Final content from the child conversation.
        content: String,
    },
    /// A warning threshold (60/80/90) was crossed for the first time.
    ContextThresholdHit {
        /// Threshold percentage, one of 60, 80, 90.
        threshold: u8,
        /// Current usage percentage at the time of the check.
        current_usage_percentage: f32,
    },
    /// Legacy-compatible context limit warning, emitted alongside
    /// `ContextThresholdHit`/`ContextCompression`.
    ContextLimitWarning {
        /// Threshold formatted as e.g. `"60%"`.
        threshold: String,
        /// Whether automatic compression fired as a result.
        compression_triggered: bool,
    },
    /// Automatic progressive tool-result compression ran.
    ContextCompression {
        /// Number of tool messages replaced with truncated placeholders.
        messages_compressed: usize,
        /// Estimated token count before compression.
        tokens_before: usize,
        /// Strategy name.
        strategy: String,
        /// Number of most-recent tool messages preserved untouched.
        keep_recent: usize,
    },
    /// A user-defined context-warning handler took a logged action.
    ContextManagementAction {
        /// Handler-supplied action name.
        action: String,
        /// Handler-supplied details.
        details: Value,
    },
    /// A tool invocation raised an error.
    ToolError {
        /// Opaque call id.
        call_id: String,
        /// Tool name.
        tool: String,
        /// Error message.
        message: String,
    },
    /// A subscriber or hook handler raised, caught so other subscribers
    /// are unaffected.
    InternalError {
        /// Where the error originated, e.g. `"subscriber"` or `"hook"`.
        source: String,
        /// Error message.
        message: String,
    },
    /// An outbound LLM request was issued.
    OpenaiRequest {
        /// Number of messages in the request.
        message_count: usize,
        /// Model id.
        model: String,
    },
    /// An LLM response was received.
    OpenaiResponse {
        /// Model id.
        model: String,
        /// Token usage, if reported.
        usage: Option<Value>,
    },
    /// A configured model id could not be resolved/validated.
    ModelLookupWarning {
        /// The model id that failed lookup.
        model: String,
        /// Explanation.
        message: String,
    },
}

/// A fully addressed event: lineage plus the tagged payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event payload and discriminant.
    #[serde(flatten)]
    pub kind: EventKind,
    /// Wall-clock time the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Swarm instance id.
    pub swarm_id: String,
    /// Parent swarm id, for nested swarms.
    pub parent_swarm_id: Option<String>,
    /// Execution id for this `execute()` invocation.
    pub execution_id: String,
    /// Name of the agent this event concerns.
    pub agent: String,
}

impl Event {
    /// The discriminator string used by [`EventFilter`] and serialization,
    /// e.g. `"agent_step"`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match &self.kind {
            EventKind::AgentStart { .. } => "agent_start",
            EventKind::AgentStep { .. } => "agent_step",
            EventKind::AgentStop { .. } => "agent_stop",
            EventKind::ToolCall { .. } => "tool_call",
            EventKind::ToolResult { .. } => "tool_result",
            EventKind::AgentDelegation { .. } => "agent_delegation",
            EventKind::DelegationResult { .. } => "delegation_result",
            EventKind::ContextThresholdHit { .. } => "context_threshold_hit",
            EventKind::ContextLimitWarning { .. } => "context_limit_warning",
            EventKind::ContextCompression { .. } => "context_compression",
            EventKind::ContextManagementAction { .. } => "context_management_action",
            EventKind::ToolError { .. } => "tool_error",
            EventKind::InternalError { .. } => "internal_error",
            EventKind::OpenaiRequest { .. } => "openai_request",
            EventKind::OpenaiResponse { .. } => "openai_response",
            EventKind::ModelLookupWarning { .. } => "model_lookup_warning",
        }
    }
}

/// Predicate used by [`EventBus::subscribe`]. Every key that is `Some`
/// must equal the corresponding event field for a match; `None` matches
/// anything (spec §4.1: "missing field -> no match" means a filter key
/// absent from the filter does not constrain that field).
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Restrict to this event type discriminator, if set.
    pub event_type: Option<String>,
    /// Restrict to this agent name, if set.
    pub agent: Option<String>,
}

impl EventFilter {
    fn matches(&self, event: &Event) -> bool {
        if let Some(t) = &self.event_type {
            if t != event.event_type() {
                return false;
            }
        }
        if let Some(a) = &self.agent {
            if a != &event.agent {
                return false;
            }
        }
        true
    }
}

/// Handle returned by [`EventBus::subscribe`], used with
/// [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    filter: EventFilter,
    handler: Handler,
}

/// Single-writer, multi-subscriber event stream.
///
/// Cloning an `EventBus` shares the same subscriber list and task-local
/// context inheritance (it is an `Arc`-backed handle).
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<u64, Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a handler that fires synchronously for every event matching
    /// `filter`. Returns a handle for [`EventBus::unsubscribe`].
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subscribers.write().expect("subscriber lock poisoned");
        subs.insert(
            id,
            Subscriber {
                filter,
                handler: Arc::new(handler),
            },
        );
        SubscriptionId(id)
    }

    /// Remove a previously registered subscription. No-op if already
    /// removed.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscribers.write().expect("subscriber lock poisoned");
        subs.remove(&id.0);
    }

    /// Emit an event, auto-injecting lineage and timestamp from the
    /// ambient [`TaskContext`] when not already present. Non-blocking:
    /// subscribers are invoked inline but a panicking/erroring subscriber
    /// never stops delivery to the others (spec §4.1 Failure).
    pub fn emit(&self, agent: impl Into<String>, kind: EventKind) {
        let ctx = TaskContext::current();
        let (swarm_id, parent_swarm_id, execution_id) = match &ctx {
            Some(c) => (
                c.swarm_id.clone(),
                c.parent_swarm_id.clone(),
                c.execution_id.clone(),
            ),
            None => {
                warn!("emitting event with no task-local context installed");
                (String::new(), None, String::new())
            }
        };
        let event = Event {
            kind,
            timestamp: Utc::now(),
            swarm_id,
            parent_swarm_id,
            execution_id,
            agent: agent.into(),
        };
        self.dispatch(event);
    }

    fn dispatch(&self, event: Event) {
        debug!(event_type = event.event_type(), agent = %event.agent, "event emitted");
        let handlers: Vec<(EventFilter, Handler)> = {
            let subs = self.subscribers.read().expect("subscriber lock poisoned");
            subs.values()
                .map(|s| (s.filter.clone(), Arc::clone(&s.handler)))
                .collect()
        };
        for (filter, handler) in handlers {
            if !filter.matches(&event) {
                continue;
            }
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(&event);
            }));
            if let Err(panic) = result {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "subscriber panicked".to_string());
                warn!(%message, "event subscriber panicked");
                let internal = Event {
                    kind: EventKind::InternalError {
                        source: "subscriber".to_string(),
                        message,
                    },
                    timestamp: Utc::now(),
                    swarm_id: event.swarm_id.clone(),
                    parent_swarm_id: event.parent_swarm_id.clone(),
                    execution_id: event.execution_id.clone(),
                    agent: event.agent.clone(),
                };
                // Re-dispatch out-of-line to avoid recursive panics cascading
                // through the same handler that just failed.
                let handlers: Vec<(EventFilter, Handler)> = {
                    let subs = self.subscribers.read().expect("subscriber lock poisoned");
                    subs.values()
                        .map(|s| (s.filter.clone(), Arc::clone(&s.handler)))
                        .collect()
                };
                for (filter, handler) in handlers {
                    if filter.matches(&internal) {
                        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            handler(&internal);
                        }));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn ctx() -> TaskContext {
        TaskContext {
            swarm_id: "swarm-1".into(),
            parent_swarm_id: None,
            execution_id: "exec-1".into(),
        }
    }

    #[tokio::test]
    async fn emit_injects_lineage_from_task_context() {
        let bus = EventBus::new();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        bus.subscribe(EventFilter::default(), move |e| {
            *seen2.lock().unwrap() = Some(e.clone());
        });

        ctx()
            .scope(async {
                bus.emit(
                    "lead",
                    EventKind::AgentStart {
                        prompt_preview: "hi".into(),
                    },
                );
            })
            .await;

        let seen = seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.swarm_id, "swarm-1");
        assert_eq!(seen.execution_id, "exec-1");
        assert_eq!(seen.event_type(), "agent_start");
    }

    #[tokio::test]
    async fn filter_restricts_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        bus.subscribe(
            EventFilter {
                event_type: Some("agent_stop".to_string()),
                agent: None,
            },
            move |_| {
                count2.fetch_add(1, Ordering::SeqCst);
            },
        );

        ctx()
            .scope(async {
                bus.emit(
                    "lead",
                    EventKind::AgentStart {
                        prompt_preview: "hi".into(),
                    },
                );
                bus.emit(
                    "lead",
                    EventKind::AgentStop {
                        content: "done".into(),
                        override_reason: None,
                    },
                );
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let id = bus.subscribe(EventFilter::default(), move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.unsubscribe(id);

        ctx()
            .scope(async {
                bus.emit(
                    "lead",
                    EventKind::AgentStop {
                        content: "done".into(),
                        override_reason: None,
                    },
                );
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        bus.subscribe(EventFilter::default(), |_| panic!("boom"));
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        bus.subscribe(EventFilter::default(), move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        ctx()
            .scope(async {
                bus.emit(
                    "lead",
                    EventKind::AgentStop {
                        content: "done".into(),
                        override_reason: None,
                    },
                );
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
