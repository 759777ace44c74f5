//! Delegation Router (C7): turns `WorkWith<Agent>` tool calls into
//! sub-conversations on independently-stateful engine instances.
//!
//! Grounded in `cloudllm::Agent::fork`/`fork_with_context` (spinning up an
//! independent conversation that shares static configuration) and
//! `cloudllm::council`'s cross-agent hand-off, narrowed to spec §4.7's
//! single delegation prefix and `target@delegator` instance-reuse model.

use crate::swarm::engine::AgentEngine;
use crate::swarm::error::{ConfigurationError, SwarmError, SwarmResult};
use crate::swarm::event::{EventBus, EventKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Prefix recognized on a tool-call name as a delegation request, e.g.
/// `WorkWithCoder` delegates to the agent named `coder`.
pub const DELEGATION_PREFIX: &str = "WorkWith";

/// Strip [`DELEGATION_PREFIX`] and lower-case the first letter of the
/// remainder, or `None` if `tool_name` isn't a delegation call.
#[must_use]
pub fn parse_delegation_target(tool_name: &str) -> Option<String> {
    let rest = tool_name.strip_prefix(DELEGATION_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    let mut chars = rest.chars();
    let first = chars.next()?;
    let mut target = first.to_lowercase().collect::<String>();
    target.push_str(chars.as_str());
    Some(target)
}

/// What an [`AgentEngine`] calls into when it dispatches a delegation tool
/// call, kept as a trait object so the engine doesn't need to know how
/// instances are built or reused.
#[async_trait]
pub trait DelegationHandler: Send + Sync {
    /// Run `prompt` to completion on the `target` agent, on behalf of
    /// `delegator`'s open tool call `call_id`, returning the child's final
    /// content.
    async fn delegate(&self, delegator: &str, call_id: &str, target: &str, prompt: &str) -> SwarmResult<String>;
}

/// Builds a fresh, unbound [`AgentEngine`] for a named agent, supplied by
/// the orchestrator (which owns tool factories, scratchpad, and
/// read-tracker wiring that the router itself has no business knowing
/// about).
pub type EngineFactory = Arc<dyn Fn(&str) -> SwarmResult<AgentEngine> + Send + Sync>;

/// Routes delegation calls to `target@delegator` engine instances, built
/// lazily and reused for the lifetime of the swarm execution (spec §4.7
/// step 3: "obtain (or create)").
pub struct DelegationRouter {
    agent_names: HashMap<String, ()>,
    instances: Mutex<HashMap<String, AgentEngine>>,
    build_engine: EngineFactory,
    bus: EventBus,
}

impl DelegationRouter {
    /// Build a router that knows about `declared_agents` and constructs
    /// new instances via `build_engine`.
    #[must_use]
    pub fn new(declared_agents: Vec<String>, build_engine: EngineFactory, bus: EventBus) -> Self {
        Self {
            agent_names: declared_agents.into_iter().map(|n| (n, ())).collect(),
            instances: Mutex::new(HashMap::new()),
            build_engine,
            bus,
        }
    }

    /// Number of delegation instances created so far, for the
    /// orchestrator's `agents_involved` accounting.
    pub async fn instance_count(&self) -> usize {
        self.instances.lock().await.len()
    }

    /// Snapshot instance keys (`target@delegator`), for the snapshot
    /// engine.
    pub async fn instance_keys(&self) -> Vec<String> {
        self.instances.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl DelegationHandler for DelegationRouter {
    async fn delegate(&self, delegator: &str, call_id: &str, target: &str, prompt: &str) -> SwarmResult<String> {
        if !self.agent_names.contains_key(target) {
            return Err(SwarmError::Configuration(ConfigurationError::UnknownDelegationTarget(
                target.to_string(),
            )));
        }

        self.bus.emit(
            delegator.to_string(),
            EventKind::AgentDelegation {
                call_id: call_id.to_string(),
                delegate_to: target.to_string(),
            },
        );

        let instance_key = format!("{target}@{delegator}");
        let mut instances = self.instances.lock().await;
        if !instances.contains_key(&instance_key) {
            let engine = (self.build_engine)(target)?;
            instances.insert(instance_key.clone(), engine);
        }
        let engine = instances.get_mut(&instance_key).expect("just inserted if missing");
        let content = engine.execute(prompt.to_string()).await?;
        drop(instances);

        self.bus.emit(
            delegator.to_string(),
            EventKind::DelegationResult {
                call_id: call_id.to_string(),
                delegate_to: target.to_string(),
                content: content.clone(),
            },
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::agent::{AgentDefinition, AgentMetadata};
    use crate::swarm::context::ContextManager;
    use crate::swarm::event::{EventFilter, TaskContext};
    use crate::swarm::llm::{LlmResponse, ScriptedProvider};
    use crate::swarm::message::Message;
    use crate::swarm::tool_protocol::ToolRegistry;

    #[test]
    fn strips_prefix_and_lowercases_first_letter() {
        assert_eq!(parse_delegation_target("WorkWithCoder").as_deref(), Some("coder"));
        assert_eq!(parse_delegation_target("WorkWithQAReviewer").as_deref(), Some("qAReviewer"));
        assert_eq!(parse_delegation_target("Bash"), None);
        assert_eq!(parse_delegation_target("WorkWith"), None);
    }

    fn meta() -> AgentMetadata {
        AgentMetadata {
            swarm_id: "s1".into(),
            parent_swarm_id: None,
            execution_id: "e1".into(),
        }
    }

    #[tokio::test]
    async fn delegates_and_reuses_the_same_instance() {
        let bus = EventBus::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls2 = calls.clone();
        bus.subscribe(
            EventFilter {
                event_type: Some("agent_delegation".to_string()),
                agent: None,
            },
            move |_| {
                calls2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            },
        );

        let build_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let build_count2 = build_count.clone();
        let bus_for_factory = bus.clone();
        let factory: EngineFactory = Arc::new(move |name: &str| {
            build_count2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let provider = Arc::new(ScriptedProvider::new(
                "test-model",
                vec![Ok(LlmResponse {
                    message: Message::assistant("child done"),
                    usage: None,
                })],
            ));
            Ok(AgentEngine::new(
                Arc::new(AgentDefinition::new(name, "child", "test-model")),
                meta(),
                ToolRegistry::empty(),
                provider,
                Arc::new(ContextManager::new()),
                bus_for_factory.clone(),
            ))
        });

        let router = DelegationRouter::new(vec!["coder".to_string()], factory, bus);
        let task_ctx = TaskContext {
            swarm_id: "s1".into(),
            parent_swarm_id: None,
            execution_id: "e1".into(),
        };
        let content = task_ctx
            .scope(router.delegate("orchestrator", "c1", "coder", "write foo"))
            .await
            .unwrap();
        assert_eq!(content, "child done");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(build_count.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(router.instance_keys().await, vec!["coder@orchestrator".to_string()]);
    }

    #[tokio::test]
    async fn undeclared_target_is_a_configuration_error() {
        let bus = EventBus::new();
        let factory: EngineFactory = Arc::new(|_| unreachable!("should never be built"));
        let router = DelegationRouter::new(vec![], factory, bus);
        let err = router.delegate("orchestrator", "c1", "ghost", "hi").await.unwrap_err();
        assert!(matches!(
            err,
            SwarmError::Configuration(ConfigurationError::UnknownDelegationTarget(_))
        ));
    }
}
