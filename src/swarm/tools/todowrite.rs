//! `TodoWrite` tool: lets an agent publish its current task list as
//! structured state rather than free text, so the conversation carries
//! an explicit, prunable todo snapshot.
//!
//! Grounded in `lanegrid-agtrace`'s `ClaudeTodoWriteArgs`/`ClaudeTodoItem`
//! wire shape (`content`, `activeForm`, `status`), adopted here under
//! `snake_case` field names to match the rest of this tool set's
//! argument naming. `removable = false` per spec §4.4; the engine tracks
//! the most recent call's message index on [`crate::swarm::agent::AgentContext`]
//! so pruning never discards the latest todo state.

use crate::swarm::error::ConfigurationError;
use crate::swarm::tool_factory::{CreationRequirement, ToolBuildContext, ToolFactory};
use crate::swarm::tool_protocol::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// One item in a `TodoWrite` call's task list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    /// Task description.
    pub content: String,
    /// Present-continuous form shown while the task is in progress.
    pub active_form: String,
    /// One of `pending`, `in_progress`, `completed`, `cancelled`.
    pub status: String,
}

const VALID_STATUSES: [&str; 4] = ["pending", "in_progress", "completed", "cancelled"];

/// Replaces the agent's visible todo list wholesale with the supplied
/// items, validating each item's `status`.
pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    async fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "TodoWrite".to_string(),
            description: "Replace the current task list with the given items.".to_string(),
            parameters: vec![ToolParameter::new("todos", ToolParameterType::Array)
                .with_description("The full task list, replacing any previous one")
                .required()],
        }
    }

    fn removable(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(todos_value) = args.get("todos") else {
            return ToolResult::failure("missing required argument `todos`");
        };
        let todos: Vec<TodoItem> = match serde_json::from_value(todos_value.clone()) {
            Ok(todos) => todos,
            Err(e) => return ToolResult::failure(format!("malformed todos: {e}")),
        };
        for item in &todos {
            if !VALID_STATUSES.contains(&item.status.as_str()) {
                return ToolResult::failure(format!(
                    "invalid status `{}`, expected one of {VALID_STATUSES:?}",
                    item.status
                ));
            }
        }
        ToolResult::success(serde_json::json!({ "todos": todos }))
    }
}

/// Builds a stateless [`TodoWriteTool`] instance.
pub struct TodoWriteToolFactory;

impl ToolFactory for TodoWriteToolFactory {
    fn name(&self) -> &'static str {
        "TodoWrite"
    }

    fn creation_requirements(&self) -> &'static [CreationRequirement] {
        &[]
    }

    fn removable(&self) -> bool {
        false
    }

    fn create(&self, _ctx: &ToolBuildContext<'_>) -> Result<Arc<dyn Tool>, ConfigurationError> {
        Ok(Arc::new(TodoWriteTool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_a_well_formed_todo_list() {
        let tool = TodoWriteTool;
        let result = tool
            .execute(serde_json::json!({
                "todos": [
                    {"content": "write tests", "active_form": "Writing tests", "status": "in_progress"}
                ]
            }))
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn rejects_an_unknown_status() {
        let tool = TodoWriteTool;
        let result = tool
            .execute(serde_json::json!({
                "todos": [
                    {"content": "x", "active_form": "X-ing", "status": "bogus"}
                ]
            }))
            .await;
        assert!(!result.success);
    }
}
