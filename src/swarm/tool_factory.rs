//! Tool Factory (C4): declares per-tool construction requirements and
//! builds instances bound to an agent's context, wrapped in the
//! permission gate.
//!
//! Grounded in `cloudllm::tool_protocols`' multi-protocol registration
//! pattern (`CustomToolProtocol`, `McpClientProtocol`, `MemoryProtocol`
//! each built from different construction inputs), generalized into a
//! declarative `creation_requirements()` contract so the registry can
//! validate an agent definition before attempting to build anything.

use crate::swarm::agent::AgentDefinition;
use crate::swarm::error::ConfigurationError;
use crate::swarm::permissions::PermissionPolicy;
use crate::swarm::read_tracker::ReadTracker;
use crate::swarm::storage::Scratchpad;
use crate::swarm::tool_protocol::Tool;
use std::collections::HashSet;
use std::sync::Arc;

/// A named input a [`ToolFactory`] needs at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreationRequirement {
    /// The owning agent's name.
    AgentName,
    /// The owning agent's filesystem root.
    Directory,
    /// Access to the shared scratchpad.
    ScratchpadStorage,
    /// Access to the process-wide read-tracker.
    ReadTracker,
}

/// Everything a [`ToolFactory`] might need, gathered once per agent build.
pub struct ToolBuildContext<'a> {
    /// Definition of the agent the tool is being built for.
    pub agent: &'a AgentDefinition,
    /// Shared scratchpad instance.
    pub scratchpad: Arc<Scratchpad>,
    /// Shared read-tracker instance.
    pub read_tracker: Arc<ReadTracker>,
}

/// Constructs a bound [`Tool`] instance, declaring what it needs up front
/// so the registry can validate before building.
pub trait ToolFactory: Send + Sync {
    /// Name this factory builds, matching the name agents declare in
    /// `AgentDefinition::tools`.
    fn name(&self) -> &'static str;

    /// Inputs this tool needs from the [`ToolBuildContext`].
    fn creation_requirements(&self) -> &'static [CreationRequirement];

    /// Whether the built tool may be dropped on a skill swap.
    fn removable(&self) -> bool {
        true
    }

    /// Build a bound instance for `ctx`, validating requirements first.
    fn create(&self, ctx: &ToolBuildContext<'_>) -> Result<Arc<dyn Tool>, ConfigurationError>;
}

/// Looks up and builds tool factories by name, validating an agent's
/// declared tool set before construction and wrapping every built
/// instance in a [`PermissionGuard`].
#[derive(Default)]
pub struct ToolFactoryRegistry {
    factories: std::collections::HashMap<&'static str, Arc<dyn ToolFactory>>,
}

impl ToolFactoryRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: std::collections::HashMap::new(),
        }
    }

    /// Register a factory, keyed by its declared name.
    pub fn register(&mut self, factory: Arc<dyn ToolFactory>) {
        self.factories.insert(factory.name(), factory);
    }

    /// Return the subset of `names` that have no registered factory.
    #[must_use]
    pub fn validate(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|n| !self.factories.contains_key(n.as_str()))
            .cloned()
            .collect()
    }

    /// Build a tool instance by name, validating requirements against
    /// `ctx` and wrapping the result with `permissions`.
    pub fn create(
        &self,
        name: &str,
        ctx: &ToolBuildContext<'_>,
        permissions: PermissionPolicy,
    ) -> Result<Arc<dyn Tool>, ConfigurationError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownTool(name.to_string()))?;
        for requirement in factory.creation_requirements() {
            let satisfied = match requirement {
                CreationRequirement::AgentName => !ctx.agent.name.is_empty(),
                CreationRequirement::Directory => !ctx.agent.directory.is_empty(),
                CreationRequirement::ScratchpadStorage => true,
                CreationRequirement::ReadTracker => true,
            };
            if !satisfied {
                return Err(ConfigurationError::MissingRequirement {
                    tool: name.to_string(),
                    requirement: format!("{requirement:?}"),
                });
            }
        }
        let inner = factory.create(ctx)?;
        Ok(Arc::new(PermissionGuard::new(inner, permissions)))
    }

    /// Names of every registered factory whose tool is not removable,
    /// i.e. must survive a skill load (spec §4.4).
    #[must_use]
    pub fn non_removable_names(&self) -> HashSet<&'static str> {
        self.factories
            .values()
            .filter(|f| !f.removable())
            .map(|f| f.name())
            .collect()
    }
}

/// Wraps a tool instance, checking its arguments against a
/// [`PermissionPolicy`] before dispatch (spec §6 Permissions).
///
/// Grounded in `cloudllm::tools::bash::BashTool`'s allow/deny command
/// gate, generalized to any tool whose primary argument names a command
/// or path.
pub struct PermissionGuard {
    inner: Arc<dyn Tool>,
    policy: PermissionPolicy,
}

impl PermissionGuard {
    /// Wrap `inner` with `policy`.
    #[must_use]
    pub fn new(inner: Arc<dyn Tool>, policy: PermissionPolicy) -> Self {
        Self { inner, policy }
    }

    /// Extract the subject string (command or path) to check against the
    /// policy, preferring `command`, falling back to `path`/`file_path`.
    fn subject(args: &serde_json::Value) -> Option<String> {
        for key in ["command", "path", "file_path"] {
            if let Some(s) = args.get(key).and_then(|v| v.as_str()) {
                return Some(s.to_string());
            }
        }
        None
    }
}

#[async_trait::async_trait]
impl Tool for PermissionGuard {
    async fn metadata(&self) -> crate::swarm::tool_protocol::ToolMetadata {
        self.inner.metadata().await
    }

    fn removable(&self) -> bool {
        self.inner.removable()
    }

    async fn execute(&self, args: serde_json::Value) -> crate::swarm::tool_protocol::ToolResult {
        if let Some(subject) = Self::subject(&args) {
            let name = self.inner.metadata().await.name;
            if let Err(e) = self.policy.check(&name, &subject) {
                return crate::swarm::tool_protocol::ToolResult::failure(e.to_string());
            }
        }
        self.inner.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::tool_protocol::{ToolMetadata, ToolResult};

    struct Noop(ToolMetadata);

    #[async_trait::async_trait]
    impl Tool for Noop {
        async fn metadata(&self) -> ToolMetadata {
            self.0.clone()
        }

        async fn execute(&self, _args: serde_json::Value) -> ToolResult {
            ToolResult::success(serde_json::json!("ok"))
        }
    }

    struct NoopFactory;

    impl ToolFactory for NoopFactory {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn creation_requirements(&self) -> &'static [CreationRequirement] {
            &[CreationRequirement::AgentName]
        }

        fn create(&self, _ctx: &ToolBuildContext<'_>) -> Result<Arc<dyn Tool>, ConfigurationError> {
            Ok(Arc::new(Noop(ToolMetadata {
                name: "noop".into(),
                description: "does nothing".into(),
                parameters: vec![],
            })))
        }
    }

    #[test]
    fn validate_flags_unknown_tools() {
        let mut registry = ToolFactoryRegistry::empty();
        registry.register(Arc::new(NoopFactory));
        let unknown = registry.validate(&["noop".to_string(), "ghost".to_string()]);
        assert_eq!(unknown, vec!["ghost".to_string()]);
    }

    #[tokio::test]
    async fn missing_requirement_is_a_configuration_error() {
        let registry_arc_def = AgentDefinition::new("", "d", "m");
        let ctx = ToolBuildContext {
            agent: &registry_arc_def,
            scratchpad: Arc::new(Scratchpad::default()),
            read_tracker: Arc::new(ReadTracker::new()),
        };
        let mut registry = ToolFactoryRegistry::empty();
        registry.register(Arc::new(NoopFactory));
        let err = registry
            .create("noop", &ctx, PermissionPolicy::unrestricted())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingRequirement { .. }));
    }

    #[tokio::test]
    async fn permission_guard_denies_matching_commands() {
        let policy = PermissionPolicy {
            allowed: vec![],
            denied: vec!["rm -rf".to_string()],
        };
        let inner: Arc<dyn Tool> = Arc::new(Noop(ToolMetadata {
            name: "bash".into(),
            description: "runs a command".into(),
            parameters: vec![],
        }));
        let guarded = PermissionGuard::new(inner, policy);
        let result = guarded.execute(serde_json::json!({"command": "rm -rf /"})).await;
        assert!(!result.success);
    }
}
