//! Swarm Orchestrator (C9): owns every agent definition in a swarm and
//! drives top-level executions against a lazily-built, reused set of
//! engine instances.
//!
//! Grounded in `cloudllm::council::Council`'s top-level "run the lead
//! participant, fan out to others on demand" shape and
//! `cloudllm::Agent::fork`'s lazy per-name instance construction
//! (mirrored here by [`DelegationRouter`]'s `target@delegator` cache and
//! this module's own `primary_agents` cache), combined with
//! `tokio_util::sync::CancellationToken` for the cooperative cancellation
//! spec §4.9/§5 require (the teacher has no cancellation primitive of its
//! own to ground this on).

use crate::swarm::agent::{AgentDefinition, AgentMetadata};
use crate::swarm::config::SwarmConfig;
use crate::swarm::context::ContextManager;
use crate::swarm::delegation::{DelegationHandler, DelegationRouter, EngineFactory};
use crate::swarm::engine::AgentEngine;
use crate::swarm::error::{ConfigurationError, SwarmError, SwarmResult};
use crate::swarm::event::{Event, EventBus, EventFilter, TaskContext};
use crate::swarm::llm::LlmProvider;
use crate::swarm::read_tracker::ReadTracker;
use crate::swarm::skill::LoadSkillTool;
use crate::swarm::storage::{MemoryStore, ScopedStore, Scratchpad, MAX_ENTRY_BYTES};
use crate::swarm::tool_factory::{ToolBuildContext, ToolFactoryRegistry};
use crate::swarm::tool_protocol::ToolRegistry;
use crate::swarm::tools::PluginToolRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Resolves a model id to an LLM provider instance, e.g. by vendor routing.
/// Kept as a trait so the orchestrator doesn't depend on any one vendor's
/// wire protocol (explicitly external, per spec §1 Non-goals).
pub trait LlmProviderFactory: Send + Sync {
    /// Build (or look up) a provider for `model`.
    fn provider_for(&self, model: &str) -> SwarmResult<Arc<dyn LlmProvider>>;
}

/// Aggregate outcome of one `execute()` invocation (spec §4.9 step 5).
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Final content from the lead agent's conversation.
    pub content: String,
    /// Whether the execution completed without error.
    pub success: bool,
    /// Wall-clock duration of the execution.
    pub duration: std::time::Duration,
    /// Total input+output tokens billed across every LLM round-trip seen
    /// during this execution.
    pub tokens_used: usize,
    /// Number of LLM requests issued.
    pub llm_requests: usize,
    /// Number of tool calls dispatched.
    pub tool_calls_count: usize,
    /// Names of every agent that participated (lead plus any delegated-to).
    pub agents_involved: Vec<String>,
    /// Structured error, set only when `success` is false.
    pub error: Option<String>,
}

/// Callback invoked with every event emitted during one execution, the
/// orchestrator's tee of the Event Log to the caller (spec §4.9 step 4).
pub type LogCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Everything needed to build a fresh [`AgentEngine`] for a named agent,
/// cloned cheaply (every field is `Arc`-backed or `Copy`) into the
/// delegation router's build closure without borrowing the owning
/// [`Swarm`].
#[derive(Clone)]
struct EngineParts {
    agent_definitions: HashMap<String, Arc<AgentDefinition>>,
    tool_factories: Arc<ToolFactoryRegistry>,
    plugin_tools: Arc<PluginToolRegistry>,
    scratchpad: Arc<Scratchpad>,
    read_tracker: Arc<ReadTracker>,
    llm_factory: Arc<dyn LlmProviderFactory>,
    context_manager: Arc<ContextManager>,
    bus: EventBus,
    max_turn_depth: Option<usize>,
    context_limit: Option<usize>,
}

impl EngineParts {
    fn metadata(&self, swarm_id: &str, parent_swarm_id: Option<&str>, execution_id: &str) -> AgentMetadata {
        AgentMetadata {
            swarm_id: swarm_id.to_string(),
            parent_swarm_id: parent_swarm_id.map(str::to_string),
            execution_id: execution_id.to_string(),
        }
    }

    fn build_tool_registry(&self, definition: &AgentDefinition) -> SwarmResult<ToolRegistry> {
        let ctx = ToolBuildContext {
            agent: definition,
            scratchpad: Arc::clone(&self.scratchpad),
            read_tracker: Arc::clone(&self.read_tracker),
        };
        let mut registry = ToolRegistry::empty();
        for name in &definition.tools {
            let tool = self
                .tool_factories
                .create(name, &ctx, definition.permissions.clone())
                .map_err(SwarmError::Configuration)?;
            registry.insert(name.clone(), tool);
        }
        if let Some(memory) = self.plugin_tools.get(&definition.name) {
            registry.insert("Memory", memory);
        }
        registry.insert(
            "LoadSkill",
            Arc::new(LoadSkillTool::new(Arc::clone(&self.scratchpad) as Arc<dyn ScopedStore>)),
        );
        Ok(registry)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_engine(
        &self,
        name: &str,
        swarm_id: &str,
        parent_swarm_id: Option<&str>,
        execution_id: &str,
        cancellation: CancellationToken,
        delegation: Option<Arc<dyn DelegationHandler>>,
    ) -> SwarmResult<AgentEngine> {
        let definition = self
            .agent_definitions
            .get(name)
            .cloned()
            .ok_or_else(|| SwarmError::AgentNotFound(name.to_string()))?;
        let tools = self.build_tool_registry(&definition)?;
        let llm = self.llm_factory.provider_for(&definition.model)?;
        let mut engine = AgentEngine::new(
            definition,
            self.metadata(swarm_id, parent_swarm_id, execution_id),
            tools,
            llm,
            Arc::clone(&self.context_manager),
            self.bus.clone(),
        )
        .with_cancellation_token(cancellation);
        if let Some(depth) = self.max_turn_depth {
            engine = engine.with_max_turn_depth(depth);
        }
        if let Some(limit) = self.context_limit {
            engine = engine.with_context_limit(limit);
        }
        if let Some(handler) = delegation {
            engine = engine.with_delegation_handler(handler);
        }
        Ok(engine)
    }
}

/// Owns a swarm's static configuration and live state: agent definitions,
/// the lead agent's reused engine instance, and the delegation router's
/// lazily-built instances (rebuilt fresh every `execute()`, since
/// delegation caching is scoped to one execution per spec §4.7, while the
/// lead agent's own conversation persists across calls on the same
/// `Swarm`).
pub struct Swarm {
    name: String,
    lead_agent: String,
    parts: EngineParts,
    primary_agents: Mutex<HashMap<String, AgentEngine>>,
    swarm_id: String,
    parent_swarm_id: Option<String>,
}

impl Swarm {
    /// Build a swarm from a parsed configuration, validating every
    /// declared tool name up front so a missing factory surfaces before
    /// any agent runs.
    pub fn from_config(
        config: SwarmConfig,
        tool_factories: ToolFactoryRegistry,
        llm_factory: Arc<dyn LlmProviderFactory>,
    ) -> SwarmResult<Self> {
        let mut agent_definitions = HashMap::new();
        for agent in &config.agents {
            let unknown = tool_factories.validate(&agent.tools);
            if !unknown.is_empty() {
                return Err(SwarmError::Configuration(ConfigurationError::UnknownTool(
                    unknown.join(", "),
                )));
            }
            agent_definitions.insert(agent.name.clone(), Arc::new(agent.clone().into_definition()));
        }

        let parts = EngineParts {
            agent_definitions,
            tool_factories: Arc::new(tool_factories),
            plugin_tools: Arc::new(PluginToolRegistry::empty()),
            scratchpad: Arc::new(Scratchpad::new(MAX_ENTRY_BYTES * 64)),
            read_tracker: Arc::new(ReadTracker::new()),
            llm_factory,
            context_manager: Arc::new(ContextManager::new()),
            bus: EventBus::new(),
            max_turn_depth: config.max_turn_depth,
            context_limit: config.context_limit,
        };

        Ok(Self {
            name: config.name,
            lead_agent: config.lead_agent,
            parts,
            primary_agents: Mutex::new(HashMap::new()),
            swarm_id: Uuid::new_v4().to_string(),
            parent_swarm_id: None,
        })
    }

    /// Mark this swarm as a child of `parent_id`, for nested-swarm lineage.
    #[must_use]
    pub fn with_parent_swarm_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_swarm_id = Some(parent_id.into());
        self
    }

    /// Provision a persistent memory tool for `agent_name`, rooted at
    /// `root`, registered through the plugin registry rather than the main
    /// tool factory table (spec §4.4). Must be called before the swarm's
    /// first `execute()` — the registry is shared read-only afterwards.
    pub fn with_agent_memory(
        mut self,
        agent_name: impl Into<String>,
        root: impl Into<std::path::PathBuf>,
    ) -> SwarmResult<Self> {
        let store: Arc<dyn ScopedStore> = Arc::new(MemoryStore::new(root, MAX_ENTRY_BYTES * 64)?);
        Arc::get_mut(&mut self.parts.plugin_tools)
            .expect("plugin_tools is not yet shared before the first execute()")
            .register_memory(agent_name, store);
        Ok(self)
    }

    /// The event bus agents in this swarm emit to; subscribe directly for
    /// long-lived observability independent of any one `execute()` call.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.parts.bus
    }

    /// Run `prompt` to completion on the lead agent, tee-ing every emitted
    /// event to `log_callback` for the duration of this call (spec §4.9).
    #[instrument(skip(self, prompt, log_callback, cancellation), fields(swarm = %self.name))]
    pub async fn execute(
        &self,
        prompt: impl Into<String>,
        log_callback: LogCallback,
        cancellation: CancellationToken,
    ) -> ExecutionResult {
        let execution_id = Uuid::new_v4().to_string();
        let started = std::time::Instant::now();

        let llm_requests = Arc::new(AtomicUsize::new(0));
        let tool_calls_count = Arc::new(AtomicUsize::new(0));
        let tokens_used = Arc::new(AtomicUsize::new(0));
        let agents_involved: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));

        let subscription = {
            let llm_requests = Arc::clone(&llm_requests);
            let tool_calls_count = Arc::clone(&tool_calls_count);
            let tokens_used = Arc::clone(&tokens_used);
            let agents_involved = Arc::clone(&agents_involved);
            self.parts.bus.subscribe(EventFilter::default(), move |event: &Event| {
                log_callback(event);
                match &event.kind {
                    crate::swarm::event::EventKind::OpenaiRequest { .. } => {
                        llm_requests.fetch_add(1, Ordering::Relaxed);
                    }
                    crate::swarm::event::EventKind::OpenaiResponse { usage: Some(usage), .. } => {
                        if let Some(v) = usage.get("input_tokens").and_then(|v| v.as_u64()) {
                            tokens_used.fetch_add(v as usize, Ordering::Relaxed);
                        }
                        if let Some(v) = usage.get("output_tokens").and_then(|v| v.as_u64()) {
                            tokens_used.fetch_add(v as usize, Ordering::Relaxed);
                        }
                    }
                    crate::swarm::event::EventKind::ToolCall { .. } => {
                        tool_calls_count.fetch_add(1, Ordering::Relaxed);
                    }
                    crate::swarm::event::EventKind::AgentStart { .. } => {
                        let mut guard = agents_involved.lock().expect("agents_involved lock poisoned");
                        if !guard.contains(&event.agent) {
                            guard.push(event.agent.clone());
                        }
                    }
                    _ => {}
                }
            })
        };

        let task_ctx = TaskContext {
            swarm_id: self.swarm_id.clone(),
            parent_swarm_id: self.parent_swarm_id.clone(),
            execution_id: execution_id.clone(),
        };

        let result = task_ctx
            .scope(self.run_lead(prompt, &execution_id, cancellation))
            .await;

        self.parts.bus.unsubscribe(subscription);

        let duration = started.elapsed();
        let agents_involved = agents_involved.lock().expect("agents_involved lock poisoned").clone();
        match result {
            Ok(content) => ExecutionResult {
                content,
                success: true,
                duration,
                tokens_used: tokens_used.load(Ordering::Relaxed),
                llm_requests: llm_requests.load(Ordering::Relaxed),
                tool_calls_count: tool_calls_count.load(Ordering::Relaxed),
                agents_involved,
                error: None,
            },
            Err(e) => {
                if matches!(e, SwarmError::Cancelled) {
                    info!(swarm = %self.name, "execution cancelled");
                } else {
                    warn!(swarm = %self.name, error = %e, "execution failed");
                }
                ExecutionResult {
                    content: String::new(),
                    success: false,
                    duration,
                    tokens_used: tokens_used.load(Ordering::Relaxed),
                    llm_requests: llm_requests.load(Ordering::Relaxed),
                    tool_calls_count: tool_calls_count.load(Ordering::Relaxed),
                    agents_involved,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn run_lead(
        &self,
        prompt: impl Into<String>,
        execution_id: &str,
        cancellation: CancellationToken,
    ) -> SwarmResult<String> {
        if !self.parts.agent_definitions.contains_key(&self.lead_agent) {
            return Err(SwarmError::AgentNotFound(self.lead_agent.clone()));
        }

        let declared_agents: Vec<String> = self.parts.agent_definitions.keys().cloned().collect();
        let parts = self.parts.clone();
        let swarm_id = self.swarm_id.clone();
        let parent_swarm_id = self.parent_swarm_id.clone();
        let execution_id_owned = execution_id.to_string();
        let cancellation_for_factory = cancellation.clone();
        let factory: EngineFactory = Arc::new(move |name: &str| {
            parts.build_engine(
                name,
                &swarm_id,
                parent_swarm_id.as_deref(),
                &execution_id_owned,
                cancellation_for_factory.clone(),
                None,
            )
        });
        let router = Arc::new(DelegationRouter::new(declared_agents, factory, self.parts.bus.clone()));

        let mut primary = self.primary_agents.lock().await;
        let mut engine = match primary.remove(&self.lead_agent) {
            Some(engine) => engine
                .with_cancellation_token(cancellation)
                .with_delegation_handler(router as Arc<dyn DelegationHandler>),
            None => self.parts.build_engine(
                &self.lead_agent,
                &self.swarm_id,
                self.parent_swarm_id.as_deref(),
                execution_id,
                cancellation,
                Some(router as Arc<dyn DelegationHandler>),
            )?,
        };

        let result = engine.execute(prompt).await;
        primary.insert(self.lead_agent.clone(), engine);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::config::AgentConfig;
    use crate::swarm::llm::{LlmResponse, ScriptedProvider};
    use crate::swarm::message::Message;
    use crate::swarm::permissions::PermissionPolicy;
    use crate::swarm::tools::builtin_factory_registry;

    struct SingleResponseFactory;

    impl LlmProviderFactory for SingleResponseFactory {
        fn provider_for(&self, model: &str) -> SwarmResult<Arc<dyn LlmProvider>> {
            Ok(Arc::new(ScriptedProvider::new(
                model,
                vec![Ok(LlmResponse {
                    message: Message::assistant("swarm done"),
                    usage: None,
                })],
            )))
        }
    }

    fn config() -> SwarmConfig {
        SwarmConfig {
            name: "demo".to_string(),
            lead_agent: "lead".to_string(),
            agents: vec![AgentConfig {
                name: "lead".to_string(),
                description: "Lead agent".to_string(),
                model: "test-model".to_string(),
                directory: ".".to_string(),
                tools: vec![],
                delegation_targets: vec![],
                permissions: PermissionPolicy::unrestricted(),
                plugin_config: HashMap::new(),
                system_prompt: String::new(),
            }],
            max_turn_depth: None,
            context_limit: None,
        }
    }

    fn swarm() -> Swarm {
        Swarm::from_config(config(), builtin_factory_registry(), Arc::new(SingleResponseFactory)).unwrap()
    }

    #[tokio::test]
    async fn executes_the_lead_agent_and_reports_counters() {
        let swarm = swarm();
        let result = swarm.execute("hello swarm", Arc::new(|_| {}), CancellationToken::new()).await;
        assert!(result.success);
        assert_eq!(result.content, "swarm done");
        assert_eq!(result.llm_requests, 1);
        assert_eq!(result.agents_involved, vec!["lead".to_string()]);
    }

    #[tokio::test]
    async fn unknown_lead_agent_is_reported_as_a_failed_execution() {
        let mut cfg = config();
        cfg.agents[0].name = "someone-else".to_string();
        cfg.agents[0].delegation_targets = vec![];
        // `SwarmConfig::validate` would already reject a lead agent name
        // with no matching declared agent, so build the pieces directly to
        // exercise the orchestrator's own defensive check instead.
        let mut agent_definitions = HashMap::new();
        agent_definitions.insert(
            "someone-else".to_string(),
            Arc::new(cfg.agents[0].clone().into_definition()),
        );
        let parts = EngineParts {
            agent_definitions,
            tool_factories: Arc::new(builtin_factory_registry()),
            plugin_tools: Arc::new(PluginToolRegistry::empty()),
            scratchpad: Arc::new(Scratchpad::default()),
            read_tracker: Arc::new(ReadTracker::new()),
            llm_factory: Arc::new(SingleResponseFactory),
            context_manager: Arc::new(ContextManager::new()),
            bus: EventBus::new(),
            max_turn_depth: None,
            context_limit: None,
        };
        let swarm = Swarm {
            name: "demo".to_string(),
            lead_agent: "lead".to_string(),
            parts,
            primary_agents: Mutex::new(HashMap::new()),
            swarm_id: "s1".to_string(),
            parent_swarm_id: None,
        };

        let result = swarm.execute("hi", Arc::new(|_| {}), CancellationToken::new()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("lead"));
    }

    #[tokio::test]
    async fn cancelled_execution_is_reported_as_failure_with_cancelled_error() {
        let swarm = swarm();
        let token = CancellationToken::new();
        token.cancel();

        let result = swarm.execute("hi", Arc::new(|_| {}), token).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn lead_agent_conversation_persists_across_executions() {
        let swarm = swarm();

        let first = swarm.execute("first prompt", Arc::new(|_| {}), CancellationToken::new()).await;
        assert!(first.success);
        let primary = swarm.primary_agents.lock().await;
        assert_eq!(primary.get("lead").unwrap().messages().len(), 2);
    }
}
