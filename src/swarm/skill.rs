//! Skills / `LoadSkill` (spec §9 design note): a named bundle of tool
//! access and permissions an agent can swap into for the rest of a
//! conversation, stored as an ordinary (non-virtual) entry in a
//! [`ScopedStore`] rather than as a dedicated component.
//!
//! Named explicitly in spec §9 with no dedicated component section; built
//! here as part of the Tool Registry & Factory (C4) and Agent Conversation
//! Engine (C6), per `SPEC_FULL.md`'s grounding note. The `LoadSkill` tool
//! itself is grounded in the same always-present `Tool` shape as
//! [`crate::swarm::tools::think::ThinkTool`]; the active-tool-set swap it
//! triggers is grounded in `cloudllm::tool_protocols`' per-instance
//! protocol registration, adapted onto [`crate::swarm::tool_protocol::ToolRegistry`]'s
//! active-subset filter instead of rebuilding tool instances.
//!
//! Per-skill permission overrides are recorded on the loaded [`Skill`] but,
//! since tool instances here are bound once and wrapped in a
//! [`crate::swarm::tool_factory::PermissionGuard`] at build time, applying
//! them requires tools to have been built with override support in mind;
//! this implementation surfaces the skill's policy on the result for a
//! caller (or a future tool-rebuild pass) to apply, rather than mutating an
//! already-constructed guard. See `DESIGN.md`.

use crate::swarm::permissions::PermissionPolicy;
use crate::swarm::storage::ScopedStore;
use crate::swarm::tool_protocol::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Prefix under which skill definitions are stored in a [`ScopedStore`].
pub const SKILL_STORE_PREFIX: &str = "skills/";

/// A named bundle of tool access and permissions, loadable via `LoadSkill`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Skill name, matching the entry path's final segment.
    pub name: String,
    /// Tool names this skill grants access to, unioned with the agent's
    /// non-removable built-ins when activated.
    pub tools: Vec<String>,
    /// Permission policy that overrides the agent's own for the duration
    /// this skill is loaded.
    #[serde(default)]
    pub permissions: PermissionPolicy,
    /// Optional addendum appended to the agent's system prompt while this
    /// skill is active.
    #[serde(default)]
    pub system_prompt_addendum: Option<String>,
}

impl Skill {
    /// The store path this skill is expected to live at.
    #[must_use]
    pub fn store_path(name: &str) -> String {
        format!("{SKILL_STORE_PREFIX}{name}")
    }
}

/// Loads a [`Skill`] by name from a [`ScopedStore`] and returns it as
/// structured output. The engine applies the returned tool list to its
/// [`crate::swarm::tool_protocol::ToolRegistry`] and records
/// `active_skill_path` on [`crate::swarm::agent::AgentContext`].
pub struct LoadSkillTool {
    store: Arc<dyn ScopedStore>,
}

impl LoadSkillTool {
    /// Build a tool that resolves skill definitions against `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ScopedStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for LoadSkillTool {
    async fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "LoadSkill".to_string(),
            description: "Load a named skill, swapping the active tool set and permissions.".to_string(),
            parameters: vec![ToolParameter::new("name", ToolParameterType::String)
                .with_description("Skill name")
                .required()],
        }
    }

    fn removable(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(name) = args.get("name").and_then(Value::as_str) else {
            return ToolResult::failure("missing required argument `name`");
        };
        let path = Skill::store_path(name);
        let bytes = match self.store.read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => return ToolResult::failure(e.to_string()),
        };
        let skill: Skill = match serde_json::from_slice(&bytes) {
            Ok(skill) => skill,
            Err(e) => return ToolResult::failure(format!("malformed skill definition: {e}")),
        };
        let output = serde_json::json!({
            "path": path,
            "skill": skill,
        });
        ToolResult::success(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::storage::Scratchpad;

    async fn store_with_skill() -> Arc<Scratchpad> {
        let store = Arc::new(Scratchpad::default());
        let skill = Skill {
            name: "reviewer".to_string(),
            tools: vec!["Read".to_string(), "Bash".to_string()],
            permissions: PermissionPolicy::unrestricted(),
            system_prompt_addendum: Some("Review code for correctness.".to_string()),
        };
        store
            .write(
                &Skill::store_path("reviewer"),
                serde_json::to_vec(&skill).unwrap().as_slice(),
                "reviewer",
                Default::default(),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn loads_a_stored_skill_by_name() {
        let store = store_with_skill().await;
        let tool = LoadSkillTool::new(store);
        let result = tool.execute(serde_json::json!({"name": "reviewer"})).await;
        assert!(result.success);
        assert_eq!(result.output["skill"]["name"], "reviewer");
        assert_eq!(result.output["path"], "skills/reviewer");
    }

    #[tokio::test]
    async fn missing_skill_is_a_failure_result() {
        let store: Arc<dyn ScopedStore> = Arc::new(Scratchpad::default());
        let tool = LoadSkillTool::new(store);
        let result = tool.execute(serde_json::json!({"name": "ghost"})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn is_not_removable() {
        let store: Arc<dyn ScopedStore> = Arc::new(Scratchpad::default());
        assert!(!LoadSkillTool::new(store).removable());
    }
}
