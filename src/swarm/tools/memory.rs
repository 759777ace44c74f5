//! `Memory` tool: a single tool exposing `put`/`get`/`delete`/`list`/
//! `glob`/`grep` operations over a [`ScopedStore`], wrapped as one tool
//! rather than six so the LLM's tool list stays short.
//!
//! Grounded in `cloudllm::tools::memory::Memory`'s `put`/`get`/`delete`/
//! `list_keys` API, adapted onto the already-built [`ScopedStore`] trait
//! (shared with the filesystem-backed store) instead of the teacher's
//! standalone TTL map. Per spec §4.4, memory tools are excluded from the
//! main [`crate::swarm::tool_factory::ToolFactoryRegistry`] and
//! registered through [`PluginToolRegistry`] at swarm-build time instead.

use crate::swarm::storage::{GrepMode, GrepResult, ScopedStore};
use crate::swarm::tool_protocol::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Wraps a [`ScopedStore`] as a single multi-operation tool.
pub struct MemoryTool {
    store: Arc<dyn ScopedStore>,
}

impl MemoryTool {
    /// Build a tool backed by `store` (a [`crate::swarm::storage::Scratchpad`]
    /// or [`crate::swarm::storage::MemoryStore`]).
    #[must_use]
    pub fn new(store: Arc<dyn ScopedStore>) -> Self {
        Self { store }
    }
}

fn grep_result_to_json(result: GrepResult) -> Value {
    match result {
        GrepResult::Paths(paths) => serde_json::json!({ "paths": paths }),
        GrepResult::Content(matches) => serde_json::json!({
            "matches": matches.into_iter().map(|(path, lines)| {
                serde_json::json!({ "path": path, "lines": lines })
            }).collect::<Vec<_>>()
        }),
        GrepResult::Count(counts) => serde_json::json!({
            "counts": counts.into_iter().map(|(path, count)| {
                serde_json::json!({ "path": path, "count": count })
            }).collect::<Vec<_>>()
        }),
    }
}

#[async_trait]
impl Tool for MemoryTool {
    async fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "Memory".to_string(),
            description: "Read, write, list, and search persistent key-value entries.".to_string(),
            parameters: vec![
                ToolParameter::new("operation", ToolParameterType::String)
                    .with_description("One of put, get, delete, list, glob, grep")
                    .required(),
                ToolParameter::new("path", ToolParameterType::String).with_description("Entry path"),
                ToolParameter::new("content", ToolParameterType::String).with_description("Content for `put`"),
                ToolParameter::new("title", ToolParameterType::String).with_description("Display title for `put`"),
                ToolParameter::new("pattern", ToolParameterType::String)
                    .with_description("Glob or regex pattern for `glob`/`grep`"),
                ToolParameter::new("case_insensitive", ToolParameterType::Boolean)
                    .with_description("Case-insensitive flag for `grep`"),
                ToolParameter::new("mode", ToolParameterType::String)
                    .with_description("`grep` result shape: files_with_matches, content, or count"),
            ],
        }
    }

    fn removable(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(operation) = args.get("operation").and_then(Value::as_str) else {
            return ToolResult::failure("missing required argument `operation`");
        };

        match operation {
            "put" => {
                let Some(path) = args.get("path").and_then(Value::as_str) else {
                    return ToolResult::failure("missing required argument `path`");
                };
                let Some(content) = args.get("content").and_then(Value::as_str) else {
                    return ToolResult::failure("missing required argument `content`");
                };
                let title = args.get("title").and_then(Value::as_str).unwrap_or(path);
                match self
                    .store
                    .write(path, content.as_bytes(), title, HashMap::new())
                    .await
                {
                    Ok(()) => ToolResult::success(serde_json::json!({ "written": true })),
                    Err(e) => ToolResult::failure(e.to_string()),
                }
            }
            "get" => {
                let Some(path) = args.get("path").and_then(Value::as_str) else {
                    return ToolResult::failure("missing required argument `path`");
                };
                match self.store.read(path).await {
                    Ok(bytes) => {
                        ToolResult::success(serde_json::json!({ "content": String::from_utf8_lossy(&bytes) }))
                    }
                    Err(e) => ToolResult::failure(e.to_string()),
                }
            }
            "delete" => {
                let Some(path) = args.get("path").and_then(Value::as_str) else {
                    return ToolResult::failure("missing required argument `path`");
                };
                match self.store.delete(path).await {
                    Ok(()) => ToolResult::success(serde_json::json!({ "deleted": true })),
                    Err(e) => ToolResult::failure(e.to_string()),
                }
            }
            "list" => {
                let prefix = args.get("path").and_then(Value::as_str);
                match self.store.list(prefix).await {
                    Ok(entries) => ToolResult::success(serde_json::json!({ "entries": entries })),
                    Err(e) => ToolResult::failure(e.to_string()),
                }
            }
            "glob" => {
                let Some(pattern) = args.get("pattern").and_then(Value::as_str) else {
                    return ToolResult::failure("missing required argument `pattern`");
                };
                match self.store.glob(pattern).await {
                    Ok(paths) => ToolResult::success(serde_json::json!({ "paths": paths })),
                    Err(e) => ToolResult::failure(e.to_string()),
                }
            }
            "grep" => {
                let Some(pattern) = args.get("pattern").and_then(Value::as_str) else {
                    return ToolResult::failure("missing required argument `pattern`");
                };
                let case_insensitive = args.get("case_insensitive").and_then(Value::as_bool).unwrap_or(false);
                let mode = match args.get("mode").and_then(Value::as_str).unwrap_or("files_with_matches") {
                    "content" => GrepMode::Content,
                    "count" => GrepMode::Count,
                    _ => GrepMode::FilesWithMatches,
                };
                match self.store.grep(pattern, case_insensitive, mode).await {
                    Ok(result) => ToolResult::success(grep_result_to_json(result)),
                    Err(e) => ToolResult::failure(e.to_string()),
                }
            }
            other => ToolResult::failure(format!("unknown memory operation `{other}`")),
        }
    }
}

/// Registers per-agent [`MemoryTool`] instances, kept separate from
/// [`crate::swarm::tool_factory::ToolFactoryRegistry`] since memory
/// storage is provisioned by the orchestrator rather than constructed
/// from a [`crate::swarm::tool_factory::ToolBuildContext`].
#[derive(Default)]
pub struct PluginToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    stores: HashMap<String, Arc<dyn ScopedStore>>,
}

impl PluginToolRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
            stores: HashMap::new(),
        }
    }

    /// Bind a [`MemoryTool`] for `agent_name` backed by `store`.
    pub fn register_memory(&mut self, agent_name: impl Into<String>, store: Arc<dyn ScopedStore>) {
        let agent_name = agent_name.into();
        self.tools.insert(agent_name.clone(), Arc::new(MemoryTool::new(Arc::clone(&store))));
        self.stores.insert(agent_name, store);
    }

    /// Fetch the memory tool bound to `agent_name`, if any.
    #[must_use]
    pub fn get(&self, agent_name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(agent_name).cloned()
    }

    /// Every registered agent's backing store, for the snapshot engine to
    /// dump and restore plugin state without reaching through the `Tool`
    /// trait.
    #[must_use]
    pub fn stores(&self) -> &HashMap<String, Arc<dyn ScopedStore>> {
        &self.stores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::storage::Scratchpad;

    fn tool() -> MemoryTool {
        MemoryTool::new(Arc::new(Scratchpad::default()))
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let tool = tool();
        let result = tool
            .execute(serde_json::json!({"operation": "put", "path": "notes/a", "content": "hello"}))
            .await;
        assert!(result.success);

        let result = tool.execute(serde_json::json!({"operation": "get", "path": "notes/a"})).await;
        assert!(result.success);
        assert_eq!(result.output["content"], "hello");
    }

    #[tokio::test]
    async fn get_missing_path_is_a_failure_result() {
        let tool = tool();
        let result = tool.execute(serde_json::json!({"operation": "get", "path": "nope"})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn unknown_operation_is_a_failure_result() {
        let tool = tool();
        let result = tool.execute(serde_json::json!({"operation": "frobnicate"})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn is_not_removable() {
        assert!(!tool().removable());
    }
}
