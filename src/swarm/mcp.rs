//! MCP Tool Stub (C5): a lazy-schema proxy for a remote tool exposed by a
//! Model Context Protocol server.
//!
//! Grounded in `cloudllm::tool_protocols::McpClientProtocol` (an HTTP
//! client bound to a single remote server), narrowed from a full
//! multi-tool protocol adapter to a single-tool stub that fetches its
//! schema lazily and caches it, per spec §4.5.

use crate::swarm::error::McpError;
use crate::swarm::tool_protocol::{Tool, ToolMetadata, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Abstracts the transport an [`McpToolStub`] talks over, so the stub
/// itself stays transport-agnostic (the transport's HTTP/stdio/socket
/// implementation is explicitly out of scope, per spec §1 Non-goals).
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Fetch the schema and description for `tool`, or `Ok(None)` if the
    /// server doesn't know it.
    async fn tool_info(&self, tool: &str) -> Result<Option<(Value, String)>, McpError>;

    /// Invoke `tool` with `args`, returning its raw JSON result.
    async fn call_tool(&self, tool: &str, args: Value) -> Result<Value, McpError>;
}

/// A lazy-loaded proxy for one remote tool.
pub struct McpToolStub {
    server: String,
    metadata: tokio::sync::Mutex<ToolMetadata>,
    client: Arc<dyn McpTransport>,
    schema_loaded: OnceCell<Option<Value>>,
}

impl McpToolStub {
    /// Construct a stub for `tool` on `server`, with a placeholder
    /// description until the schema is fetched.
    pub fn new(server: impl Into<String>, tool: impl Into<String>, client: Arc<dyn McpTransport>) -> Self {
        let tool = tool.into();
        Self {
            server: server.into(),
            metadata: tokio::sync::Mutex::new(ToolMetadata {
                name: tool,
                description: "(schema not yet loaded)".to_string(),
                parameters: vec![],
            }),
            client,
            schema_loaded: OnceCell::new(),
        }
    }

    /// Server this stub proxies to, defaulting to `"unknown"` if never
    /// set explicitly (spec §4.5).
    #[must_use]
    pub fn server_name(&self) -> &str {
        if self.server.is_empty() {
            "unknown"
        } else {
            &self.server
        }
    }

    /// Fetch and cache the parameter schema on first access. A
    /// server-side "tool not found" is not an error: the schema becomes
    /// `None` and the stub remains usable.
    pub async fn params_schema(&self) -> Result<Option<Value>, McpError> {
        self.schema_loaded
            .get_or_try_init(|| async {
                let tool_name = self.metadata.lock().await.name.clone();
                match self.client.tool_info(&tool_name).await? {
                    Some((schema, description)) => {
                        let mut meta = self.metadata.lock().await;
                        meta.description = description;
                        Ok(Some(schema))
                    }
                    None => Ok(None),
                }
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl Tool for McpToolStub {
    async fn metadata(&self) -> ToolMetadata {
        self.metadata.lock().await.clone()
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let tool_name = self.metadata.lock().await.name.clone();
        match self.client.call_tool(&tool_name, args).await {
            Ok(value) => ToolResult::success(value),
            Err(e) => ToolResult::failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTransport {
        calls: AtomicUsize,
        fail_with: Option<McpError>,
    }

    #[async_trait]
    impl McpTransport for FakeTransport {
        async fn tool_info(&self, tool: &str) -> Result<Option<(Value, String)>, McpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.fail_with {
                return Err(clone_err(err));
            }
            Ok(Some((serde_json::json!({"type": "object"}), format!("desc for {tool}"))))
        }

        async fn call_tool(&self, _tool: &str, args: Value) -> Result<Value, McpError> {
            Ok(args)
        }
    }

    fn clone_err(e: &McpError) -> McpError {
        match e {
            McpError::Timeout { server, tool, request_id, code, message } => McpError::Timeout {
                server: server.clone(),
                tool: tool.clone(),
                request_id: request_id.clone(),
                code: *code,
                message: message.clone(),
            },
            McpError::Transport { server, tool, request_id, code, message } => McpError::Transport {
                server: server.clone(),
                tool: tool.clone(),
                request_id: request_id.clone(),
                code: *code,
                message: message.clone(),
            },
            McpError::Protocol { server, tool, request_id, code, message } => McpError::Protocol {
                server: server.clone(),
                tool: tool.clone(),
                request_id: request_id.clone(),
                code: *code,
                message: message.clone(),
            },
        }
    }

    #[tokio::test]
    async fn schema_fetched_once_and_cached() {
        let transport = Arc::new(FakeTransport {
            calls: AtomicUsize::new(0),
            fail_with: None,
        });
        let stub = McpToolStub::new("s1", "search", transport.clone());
        let _ = stub.params_schema().await.unwrap();
        let _ = stub.params_schema().await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_error_carries_server_tool_request_id() {
        let transport = Arc::new(FakeTransport {
            calls: AtomicUsize::new(0),
            fail_with: Some(McpError::Timeout {
                server: "s1".to_string(),
                tool: "search".to_string(),
                request_id: Some("r1".to_string()),
                code: None,
                message: "timed out".to_string(),
            }),
        });
        let stub = McpToolStub::new("s1", "search", transport);
        let err = stub.params_schema().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("[server: s1]"));
        assert!(message.contains("[tool: search]"));
        assert!(message.contains("[request_id: r1]"));
        assert!(message.contains("timed out"));
    }
}
