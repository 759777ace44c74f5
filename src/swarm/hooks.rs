//! Hook Dispatch (C11): named extension points invoked synchronously around
//! agent turns and tool calls.
//!
//! No direct teacher analogue exists — `cloudllm`'s `EventHandler` is
//! emit-only, with no priority ordering or matcher concept. Grounded
//! instead on `unicity-astrid-astrid`'s `astrid-hooks::hook` module:
//! named hook points, an optional `matcher`, ascending-priority ordering,
//! and synchronous invocation with captured failures re-emitted rather than
//! propagated. The teacher's out-of-process handler kinds (`Command`,
//! `Http`, `Wasm`) don't apply to this in-process engine, so a
//! [`RegisteredHook`] wraps a plain Rust closure instead.

use crate::swarm::event::{EventBus, EventKind};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// The four named hook points spec §4.11 defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Fires after each assistant turn that produced tool calls.
    AgentStep,
    /// Fires when an agent conversation finishes.
    AgentStop,
    /// Fires when a context usage warning threshold is crossed.
    ContextWarning,
    /// Fires immediately before a tool call is dispatched.
    PreTool,
    /// Fires immediately after a tool call completes.
    PostTool,
}

/// Arguments passed to a hook handler. Fields not relevant to a given
/// [`HookPoint`] are left at their defaults.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    /// Name of the agent this invocation concerns.
    pub agent: String,
    /// Tool name, for `pre_tool`/`post_tool`.
    pub tool: Option<String>,
    /// Tool call arguments, for `pre_tool`.
    pub arguments: Option<serde_json::Value>,
    /// Whether the tool call succeeded, for `post_tool`.
    pub success: Option<bool>,
    /// Context usage percentage, for `context_warning`.
    pub usage_percentage: Option<f32>,
}

type HookFn = Arc<dyn Fn(&HookContext) + Send + Sync>;

/// A registered hook: a handler gated by an optional tool-name matcher and
/// ordered against its siblings by `priority` (lower runs first).
struct RegisteredHook {
    matcher: Option<String>,
    priority: i32,
    handler: HookFn,
}

impl RegisteredHook {
    fn matches(&self, ctx: &HookContext) -> bool {
        match (&self.matcher, &ctx.tool) {
            (Some(m), Some(tool)) => m == tool,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Registry of hooks by point, invoked synchronously in priority order.
///
/// Registration is infrequent relative to dispatch, so insertion keeps each
/// point's `Vec` sorted rather than sorting at dispatch time.
#[derive(Default)]
pub struct HookManager {
    hooks: RwLock<HashMap<HookPoint, Vec<RegisteredHook>>>,
}

impl HookManager {
    /// An empty manager with no registered hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` at `point`, optionally narrowed to tool name
    /// `matcher` (only meaningful for `pre_tool`/`post_tool`), at `priority`
    /// (lower runs first; ties keep insertion order).
    pub fn register<F>(&self, point: HookPoint, matcher: Option<String>, priority: i32, handler: F)
    where
        F: Fn(&HookContext) + Send + Sync + 'static,
    {
        let mut hooks = self.hooks.write().expect("hook registry lock poisoned");
        let entries = hooks.entry(point).or_default();
        let hook = RegisteredHook {
            matcher,
            priority,
            handler: Arc::new(handler),
        };
        let position = entries.iter().position(|h| h.priority > priority).unwrap_or(entries.len());
        entries.insert(position, hook);
    }

    /// Invoke every hook registered at `point` whose matcher (if any)
    /// matches `ctx`, in ascending-priority order. A panicking handler is
    /// caught and re-emitted on `bus` as `internal_error` rather than
    /// aborting the remaining hooks or the caller.
    pub fn dispatch(&self, point: HookPoint, ctx: &HookContext, bus: &EventBus) {
        let handlers: Vec<HookFn> = {
            let hooks = self.hooks.read().expect("hook registry lock poisoned");
            match hooks.get(&point) {
                Some(entries) => entries.iter().filter(|h| h.matches(ctx)).map(|h| Arc::clone(&h.handler)).collect(),
                None => return,
            }
        };
        for handler in handlers {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(ctx);
            }));
            if let Err(panic) = result {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "hook handler panicked".to_string());
                bus.emit(
                    ctx.agent.clone(),
                    EventKind::InternalError {
                        source: "hook".to_string(),
                        message,
                    },
                );
            }
        }
    }

    /// Whether any hook is registered at `point`, used to skip building a
    /// [`HookContext`] on the common empty-registry path.
    #[must_use]
    pub fn has_hooks(&self, point: HookPoint) -> bool {
        self.hooks.read().expect("hook registry lock poisoned").get(&point).is_some_and(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::event::{EventFilter, TaskContext};

    fn ctx() -> TaskContext {
        TaskContext {
            swarm_id: "swarm-1".into(),
            parent_swarm_id: None,
            execution_id: "exec-1".into(),
        }
    }

    #[test]
    fn hooks_run_in_ascending_priority_order() {
        let manager = HookManager::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = Arc::clone(&order);
        manager.register(HookPoint::AgentStep, None, 10, move |_| o1.lock().unwrap().push("b"));
        let o2 = Arc::clone(&order);
        manager.register(HookPoint::AgentStep, None, 1, move |_| o2.lock().unwrap().push("a"));

        let bus = EventBus::new();
        manager.dispatch(HookPoint::AgentStep, &HookContext::default(), &bus);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn matcher_narrows_pre_tool_hooks_to_one_tool_name() {
        let manager = HookManager::new();
        let seen = Arc::new(std::sync::Mutex::new(0));
        let seen2 = Arc::clone(&seen);
        manager.register(HookPoint::PreTool, Some("Bash".to_string()), 100, move |_| {
            *seen2.lock().unwrap() += 1;
        });

        let bus = EventBus::new();
        let ctx_other = HookContext {
            tool: Some("Read".to_string()),
            ..Default::default()
        };
        manager.dispatch(HookPoint::PreTool, &ctx_other, &bus);
        assert_eq!(*seen.lock().unwrap(), 0);

        let ctx_bash = HookContext {
            tool: Some("Bash".to_string()),
            ..Default::default()
        };
        manager.dispatch(HookPoint::PreTool, &ctx_bash, &bus);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn a_panicking_hook_is_captured_and_reported_as_an_internal_error() {
        let manager = HookManager::new();
        manager.register(HookPoint::AgentStop, None, 100, |_| panic!("boom"));

        let bus = EventBus::new();
        let reported = Arc::new(std::sync::Mutex::new(false));
        let reported2 = Arc::clone(&reported);
        bus.subscribe(EventFilter::default(), move |event| {
            if matches!(event.kind, EventKind::InternalError { .. }) {
                *reported2.lock().unwrap() = true;
            }
        });

        ctx()
            .scope(async {
                manager.dispatch(
                    HookPoint::AgentStop,
                    &HookContext {
                        agent: "lead".to_string(),
                        ..Default::default()
                    },
                    &bus,
                );
            })
            .await;

        assert!(*reported.lock().unwrap());
    }

    #[test]
    fn has_hooks_reflects_registration_state() {
        let manager = HookManager::new();
        assert!(!manager.has_hooks(HookPoint::AgentStep));
        manager.register(HookPoint::AgentStep, None, 0, |_| {});
        assert!(manager.has_hooks(HookPoint::AgentStep));
    }
}
