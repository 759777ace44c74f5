//! Tool Registry & Factory, base protocol (C4).
//!
//! Grounded in `cloudllm::tool_protocol`'s `ToolResult`/`ToolParameter`/
//! `ToolMetadata` shape and the `ToolProtocol` trait's `execute`/
//! `list_tools`/`get_tool_metadata` split, narrowed to a single in-process
//! `Tool` trait (the teacher's multi-protocol routing is superseded here by
//! the factory/permission layer in [`crate::swarm::tool_factory`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// JSON-schema-ish parameter type tags for generated tool schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    /// A UTF-8 string.
    String,
    /// A floating point number.
    Number,
    /// A whole number.
    Integer,
    /// `true`/`false`.
    Boolean,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
}

/// A single declared tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    /// Human-readable description, surfaced in the generated schema.
    pub description: Option<String>,
    /// Whether the LLM must supply this argument.
    pub required: bool,
}

impl ToolParameter {
    /// Declare a new parameter.
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the parameter required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Identity and schema for a tool, independent of any particular bound
/// instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Tool name, as referenced by agent definitions and LLM tool calls.
    pub name: String,
    /// Description embedded into the LLM's tool list.
    pub description: String,
    /// Declared parameters.
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    /// Build JSON Schema for this tool's parameters, in the shape most
    /// LLM providers expect for function-calling tool declarations.
    #[must_use]
    pub fn params_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                serde_json::json!({
                    "type": p.param_type,
                    "description": p.description,
                }),
            );
            if p.required {
                required.push(p.name.clone());
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Outcome of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether execution succeeded.
    pub success: bool,
    /// Output payload on success.
    pub output: serde_json::Value,
    /// Error message on failure.
    pub error: Option<String>,
    /// Execution metadata (timing, cost, provenance).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    /// Build a successful result.
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Build a failed result carrying `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    /// Serialize this result the way tool messages encode their body
    /// (spec §4.6): a JSON string, with a failed result reduced to
    /// `{"error": "<message>"}`.
    #[must_use]
    pub fn to_message_body(&self) -> String {
        if self.success {
            serde_json::to_string(&self.output).unwrap_or_else(|_| "null".to_string())
        } else {
            serde_json::json!({ "error": self.error.clone().unwrap_or_default() }).to_string()
        }
    }
}

/// A runtime tool instance bound to one agent's context.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Identity and schema. Async and by-value (rather than `&ToolMetadata`)
    /// so tools whose description loads lazily, like
    /// [`crate::swarm::mcp::McpToolStub`], can refresh it under a lock
    /// without leaking a reference out of the guard.
    async fn metadata(&self) -> ToolMetadata;

    /// Whether this tool may be dropped from the active set on a skill
    /// swap (spec §4.4: `Think`, `Clock`, `TodoWrite`, memory tools are
    /// `removable = false`).
    fn removable(&self) -> bool {
        true
    }

    /// Execute the tool with the given JSON arguments.
    async fn execute(&self, args: serde_json::Value) -> ToolResult;
}

/// Aggregates bound tool instances for one agent, looked up by name at
/// dispatch time. Every declared tool stays bound for the life of the
/// engine; a loaded skill narrows which subset is *active* (visible to the
/// LLM and dispatchable) without rebuilding any instance, per spec §9's
/// `LoadSkill` design note.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    active: Option<std::collections::HashSet<String>>,
}

impl ToolRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
            active: None,
        }
    }

    /// Register (or replace) a bound tool instance under `name`.
    pub fn insert(&mut self, name: impl Into<String>, tool: Arc<dyn Tool>) {
        self.tools.insert(name.into(), tool);
    }

    /// Remove a tool by name, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    /// Fetch a bound tool instance by name, honoring the active subset if
    /// one is set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if !self.is_active(name) {
            return None;
        }
        self.tools.get(name).cloned()
    }

    fn is_active(&self, name: &str) -> bool {
        self.active.as_ref().map(|set| set.contains(name)).unwrap_or(true)
    }

    /// Names of every non-removable bound tool, computed from each
    /// instance's [`Tool::removable`].
    #[must_use]
    pub fn non_removable_names(&self) -> std::collections::HashSet<String> {
        self.tools
            .iter()
            .filter(|(_, tool)| !tool.removable())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Narrow the active tool set to `names` union every non-removable
    /// tool (spec §9: "skill's declared tools ∪ non-removable built-ins").
    /// Names not currently bound are silently ignored.
    pub fn set_active_subset(&mut self, names: impl IntoIterator<Item = String>) {
        let mut active: std::collections::HashSet<String> = names.into_iter().collect();
        active.extend(self.non_removable_names());
        active.retain(|n| self.tools.contains_key(n));
        self.active = Some(active);
    }

    /// Restore full visibility over every bound tool.
    pub fn clear_active_subset(&mut self) {
        self.active = None;
    }

    /// List metadata for every currently active tool, e.g. for building the
    /// LLM request's tool declarations.
    pub async fn list_metadata(&self) -> Vec<ToolMetadata> {
        let mut out = Vec::new();
        for (name, tool) in &self.tools {
            if self.is_active(name) {
                out.push(tool.metadata().await);
            }
        }
        out
    }

    /// Names of every currently active tool.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().filter(|n| self.is_active(n)).cloned().collect()
    }

    /// Execute `name` with `args`, returning a failure result (not an
    /// error) if the tool is unknown or inactive — dispatch errors become
    /// tool messages, per spec §7.
    pub async fn execute(&self, name: &str, args: serde_json::Value) -> ToolResult {
        match self.get(name) {
            Some(tool) => tool.execute(args).await,
            None => ToolResult::failure(format!("unknown tool: {name}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(ToolMetadata);

    #[async_trait]
    impl Tool for Echo {
        async fn metadata(&self) -> ToolMetadata {
            self.0.clone()
        }

        async fn execute(&self, args: serde_json::Value) -> ToolResult {
            ToolResult::success(args)
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let mut registry = ToolRegistry::empty();
        registry.insert(
            "echo",
            Arc::new(Echo(ToolMetadata {
                name: "echo".into(),
                description: "echoes input".into(),
                parameters: vec![],
            })),
        );
        let result = registry.execute("echo", serde_json::json!({"x": 1})).await;
        assert!(result.success);
        assert_eq!(result.output, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure_result_not_an_error() {
        let registry = ToolRegistry::empty();
        let result = registry.execute("missing", serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unknown tool"));
    }

    #[test]
    fn failure_result_serializes_to_error_object() {
        let result = ToolResult::failure("boom");
        assert_eq!(result.to_message_body(), r#"{"error":"boom"}"#);
    }

    struct NonRemovable(ToolMetadata);

    #[async_trait]
    impl Tool for NonRemovable {
        async fn metadata(&self) -> ToolMetadata {
            self.0.clone()
        }

        fn removable(&self) -> bool {
            false
        }

        async fn execute(&self, args: serde_json::Value) -> ToolResult {
            ToolResult::success(args)
        }
    }

    fn meta(name: &str) -> ToolMetadata {
        ToolMetadata {
            name: name.into(),
            description: String::new(),
            parameters: vec![],
        }
    }

    #[tokio::test]
    async fn active_subset_hides_tools_not_in_the_skill_or_non_removable() {
        let mut registry = ToolRegistry::empty();
        registry.insert("echo", Arc::new(Echo(meta("echo"))));
        registry.insert("Think", Arc::new(NonRemovable(meta("Think"))));
        registry.insert("other", Arc::new(Echo(meta("other"))));

        registry.set_active_subset(["echo".to_string()]);
        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["Think".to_string(), "echo".to_string()]);
        assert!(registry.get("other").is_none());
    }

    #[tokio::test]
    async fn clearing_the_active_subset_restores_full_visibility() {
        let mut registry = ToolRegistry::empty();
        registry.insert("echo", Arc::new(Echo(meta("echo"))));
        registry.set_active_subset([]);
        assert!(registry.get("echo").is_none());
        registry.clear_active_subset();
        assert!(registry.get("echo").is_some());
    }
}
