//! `Think` tool: a no-op scratch-reasoning sink. The model calls it to
//! externalize a reasoning step; the tool does nothing but echo it back,
//! giving the agent a place to "think out loud" without side effects.
//!
//! Grounded in the `ThinkTool` registered in `phoenix-ide`'s tool
//! registry (`examples/other_examples/.../src-tools.rs.rs`): a
//! zero-dependency, always-present tool with no construction
//! requirements, `removable = false` here per spec §4.4.

use crate::swarm::error::ConfigurationError;
use crate::swarm::tool_factory::{CreationRequirement, ToolBuildContext, ToolFactory};
use crate::swarm::tool_protocol::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Records a reasoning step without altering any state; the call itself
/// is the payoff, giving the model a place to think before acting.
pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    async fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "Think".to_string(),
            description: "Record a reasoning step without taking any action.".to_string(),
            parameters: vec![ToolParameter::new("thought", ToolParameterType::String)
                .with_description("The reasoning to record")
                .required()],
        }
    }

    fn removable(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(thought) = args.get("thought").and_then(Value::as_str) else {
            return ToolResult::failure("missing required argument `thought`");
        };
        ToolResult::success(serde_json::json!({ "recorded": thought }))
    }
}

/// Builds a stateless [`ThinkTool`] instance.
pub struct ThinkToolFactory;

impl ToolFactory for ThinkToolFactory {
    fn name(&self) -> &'static str {
        "Think"
    }

    fn creation_requirements(&self) -> &'static [CreationRequirement] {
        &[]
    }

    fn removable(&self) -> bool {
        false
    }

    fn create(&self, _ctx: &ToolBuildContext<'_>) -> Result<Arc<dyn Tool>, ConfigurationError> {
        Ok(Arc::new(ThinkTool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_the_recorded_thought() {
        let tool = ThinkTool;
        let result = tool.execute(serde_json::json!({"thought": "consider the edge case"})).await;
        assert!(result.success);
        assert_eq!(result.output["recorded"], "consider the edge case");
    }

    #[tokio::test]
    async fn is_not_removable() {
        assert!(!ThinkTool.removable());
    }
}
