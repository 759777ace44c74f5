//! Agent Definition and Agent Context (spec §3).
//!
//! Grounded in `cloudllm::Agent`'s identity fields (`id`, `name`,
//! `expertise`, `metadata`) and builder (`with_*`) construction style, but
//! split into two types per spec §3: an immutable `AgentDefinition` (built
//! once, shared read-only across an execution) and a mutable
//! `AgentContext` (per-conversation state that accumulates warnings,
//! delegation mappings, and the active skill pointer, and is what the
//! snapshot engine serializes).

use crate::swarm::permissions::PermissionPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Immutable configuration for one agent in a swarm, built once and shared
/// by `Arc` across the lifetime of an execution.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    /// Stable identifier used in delegation tool names and lookups.
    pub name: String,
    /// Human-readable description embedded into prompts.
    pub description: String,
    /// Model identifier passed to the LLM provider.
    pub model: String,
    /// Root directory this agent's filesystem tools are scoped to.
    pub directory: String,
    /// Declared tool names this agent may use.
    pub tools: Vec<String>,
    /// Permission policy applied to every tool instance built for this
    /// agent, before any skill override.
    pub permissions: PermissionPolicy,
    /// Per-plugin configuration, e.g. a memory tool's root directory.
    pub plugin_config: HashMap<String, Value>,
    /// Names of agents this agent is allowed to delegate to via
    /// `WorkWith<Agent>` tool calls.
    pub delegation_targets: Vec<String>,
    /// System prompt injected on the first turn of a fresh conversation.
    pub system_prompt: String,
}

impl AgentDefinition {
    /// Start building a definition with the mandatory identity fields.
    pub fn new(name: impl Into<String>, description: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            model: model.into(),
            directory: ".".to_string(),
            tools: Vec::new(),
            permissions: PermissionPolicy::unrestricted(),
            plugin_config: HashMap::new(),
            delegation_targets: Vec::new(),
            system_prompt: String::new(),
        }
    }

    /// Set the directory root this agent's filesystem tools are scoped to.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Declare the set of tool names this agent may use.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Attach a permission policy.
    #[must_use]
    pub fn with_permissions(mut self, permissions: PermissionPolicy) -> Self {
        self.permissions = permissions;
        self
    }

    /// Add a per-plugin configuration entry (e.g. a memory directory).
    #[must_use]
    pub fn with_plugin_config(mut self, plugin: impl Into<String>, config: Value) -> Self {
        self.plugin_config.insert(plugin.into(), config);
        self
    }

    /// Declare delegation targets this agent may route `WorkWith<Agent>`
    /// calls to.
    #[must_use]
    pub fn with_delegation_targets(mut self, targets: Vec<String>) -> Self {
        self.delegation_targets = targets;
        self
    }

    /// Set the system prompt injected on the first turn.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Whether `target` is a declared delegation target of this agent.
    #[must_use]
    pub fn allows_delegation_to(&self, target: &str) -> bool {
        self.delegation_targets.iter().any(|t| t == target)
    }
}

/// Lineage identifiers carried alongside an [`AgentContext`], mirroring the
/// fields injected into every [`crate::swarm::event::Event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    /// Swarm instance id.
    pub swarm_id: String,
    /// Parent swarm id, for nested swarms.
    pub parent_swarm_id: Option<String>,
    /// Execution id for the current `execute()` invocation.
    pub execution_id: String,
}

/// Mutable per-agent conversation state (spec §3 "Agent Context").
///
/// Created with the agent, persists across turns within an execution, and
/// is captured verbatim by the snapshot engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    /// Name of the agent this context belongs to.
    pub agent_name: String,
    /// Lineage metadata.
    pub metadata: AgentMetadata,
    /// Warning thresholds (subset of {60, 80, 90}) already fired for this
    /// conversation. Monotonically non-decreasing (spec §8 property 3).
    pub warning_thresholds_hit: HashSet<u8>,
    /// Whether automatic progressive compression has already been applied
    /// (spec §8 property 4: false→true at most once).
    pub compression_applied: bool,
    /// Maps an open delegation tool-call id to the target agent name,
    /// cleared once the delegation result is appended.
    pub call_id_delegations: HashMap<String, String>,
    /// Path of the currently loaded skill, if any.
    pub active_skill_path: Option<String>,
    /// Index of the most recent `TodoWrite` tool message, used by context
    /// pruning to avoid discarding the latest todo state.
    pub last_todowrite_message_index: Option<usize>,
}

impl AgentContext {
    /// Create a fresh context for `agent_name` under the given lineage.
    #[must_use]
    pub fn new(agent_name: impl Into<String>, metadata: AgentMetadata) -> Self {
        Self {
            agent_name: agent_name.into(),
            metadata,
            warning_thresholds_hit: HashSet::new(),
            compression_applied: false,
            call_id_delegations: HashMap::new(),
            active_skill_path: None,
            last_todowrite_message_index: None,
        }
    }

    /// Record that `threshold` has fired, returning `true` if this is the
    /// first time (callers use this to decide whether to run handlers).
    pub fn mark_threshold_hit(&mut self, threshold: u8) -> bool {
        self.warning_thresholds_hit.insert(threshold)
    }

    /// Record an open delegation, keyed by the delegator's tool-call id.
    pub fn record_delegation(&mut self, call_id: impl Into<String>, target: impl Into<String>) {
        self.call_id_delegations.insert(call_id.into(), target.into());
    }

    /// Clear a resolved delegation mapping.
    pub fn clear_delegation(&mut self, call_id: &str) {
        self.call_id_delegations.remove(call_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> AgentMetadata {
        AgentMetadata {
            swarm_id: "s1".into(),
            parent_swarm_id: None,
            execution_id: "e1".into(),
        }
    }

    #[test]
    fn threshold_fires_once() {
        let mut ctx = AgentContext::new("lead", meta());
        assert!(ctx.mark_threshold_hit(60));
        assert!(!ctx.mark_threshold_hit(60));
        assert!(ctx.warning_thresholds_hit.contains(&60));
    }

    #[test]
    fn delegation_targets_declared_explicitly() {
        let def = AgentDefinition::new("lead", "Lead agent", "gpt-4o")
            .with_delegation_targets(vec!["coder".to_string()]);
        assert!(def.allows_delegation_to("coder"));
        assert!(!def.allows_delegation_to("reviewer"));
    }

    #[test]
    fn delegation_mapping_round_trips() {
        let mut ctx = AgentContext::new("orchestrator", meta());
        ctx.record_delegation("c1", "coder");
        assert_eq!(ctx.call_id_delegations.get("c1").map(String::as_str), Some("coder"));
        ctx.clear_delegation("c1");
        assert!(ctx.call_id_delegations.get("c1").is_none());
    }
}
