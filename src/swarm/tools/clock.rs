//! `Clock` tool: reports the current time in UTC and the agent's
//! configured timezone offset isn't tracked here, so UTC is the only
//! format offered — a model that needs a wall-clock anchor without
//! depending on its own (often stale) training-time sense of "now".
//!
//! No teacher or pack analogue implements this directly; grounded in the
//! same always-present, zero-construction-requirement `Tool` shape as
//! [`crate::swarm::tools::think::ThinkTool`], kept minimal since the
//! rest of the pack has nothing more specific to learn from here.

use crate::swarm::error::ConfigurationError;
use crate::swarm::tool_factory::{CreationRequirement, ToolBuildContext, ToolFactory};
use crate::swarm::tool_protocol::{Tool, ToolMetadata, ToolResult};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

/// Reports the current UTC time in RFC 3339 form.
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    async fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "Clock".to_string(),
            description: "Report the current UTC time.".to_string(),
            parameters: vec![],
        }
    }

    fn removable(&self) -> bool {
        false
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        ToolResult::success(serde_json::json!({ "utc": Utc::now().to_rfc3339() }))
    }
}

/// Builds a stateless [`ClockTool`] instance.
pub struct ClockToolFactory;

impl ToolFactory for ClockToolFactory {
    fn name(&self) -> &'static str {
        "Clock"
    }

    fn creation_requirements(&self) -> &'static [CreationRequirement] {
        &[]
    }

    fn removable(&self) -> bool {
        false
    }

    fn create(&self, _ctx: &ToolBuildContext<'_>) -> Result<Arc<dyn Tool>, ConfigurationError> {
        Ok(Arc::new(ClockTool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_a_parseable_rfc3339_timestamp() {
        let tool = ClockTool;
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.success);
        let utc = result.output["utc"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(utc).is_ok());
    }
}
