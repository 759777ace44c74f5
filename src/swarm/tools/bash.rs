//! `Bash` tool: executes a shell command scoped to the owning agent's
//! directory root.
//!
//! Grounded directly in `cloudllm::tools::bash::BashTool`'s
//! spawn-with-timeout/piped-capture shape, trimmed of the teacher's own
//! internal allow/deny lists since that gate is now the job of
//! [`crate::swarm::tool_factory::PermissionGuard`], applied uniformly to
//! every tool rather than duplicated inside this one.

use crate::swarm::error::ConfigurationError;
use crate::swarm::tool_factory::{CreationRequirement, ToolBuildContext, ToolFactory};
use crate::swarm::tool_protocol::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

async fn read_capped<R: AsyncReadExt + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if buf.len() + n > MAX_OUTPUT_BYTES {
                    buf.extend_from_slice(&chunk[..n.min(MAX_OUTPUT_BYTES - buf.len())]);
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Runs `command` under `/bin/bash -c`, capturing stdout/stderr separately
/// and enforcing a per-call timeout.
pub struct BashTool {
    cwd: PathBuf,
    timeout_secs: u64,
}

impl BashTool {
    /// Bind this tool to `cwd`.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    async fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "Bash".to_string(),
            description: "Execute a shell command and capture its stdout/stderr.".to_string(),
            parameters: vec![ToolParameter::new("command", ToolParameterType::String)
                .with_description("The shell command to run")
                .required()],
        }
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(command) = args.get("command").and_then(Value::as_str) else {
            return ToolResult::failure("missing required argument `command`");
        };

        let start = Instant::now();
        let timeout = std::time::Duration::from_secs(self.timeout_secs);
        let cwd = self.cwd.clone();
        let command = command.to_string();

        let run = async move {
            let mut child = TokioCommand::new("/bin/bash")
                .arg("-c")
                .arg(&command)
                .current_dir(&cwd)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()
                .map_err(|e| format!("failed to spawn command: {e}"))?;

            let stdout_pipe = child.stdout.take().expect("stdout was piped");
            let stderr_pipe = child.stderr.take().expect("stderr was piped");
            let (stdout, stderr) = tokio::join!(read_capped(stdout_pipe), read_capped(stderr_pipe));
            let status = child.wait().await.map_err(|e| format!("command wait failed: {e}"))?;
            Ok::<_, String>((stdout, stderr, status.success(), status.code().unwrap_or(-1)))
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok((stdout, stderr, success, exit_code))) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                let output = serde_json::json!({
                    "stdout": stdout,
                    "stderr": stderr,
                    "exit_code": exit_code,
                    "duration_ms": duration_ms,
                });
                if success {
                    ToolResult::success(output)
                } else {
                    ToolResult {
                        success: false,
                        output,
                        error: Some(format!("command exited with status {exit_code}")),
                        metadata: Default::default(),
                    }
                }
            }
            Ok(Err(message)) => ToolResult::failure(message),
            Err(_) => ToolResult::failure(format!("command exceeded {} second timeout", self.timeout_secs)),
        }
    }
}

/// Builds a [`BashTool`] scoped to the owning agent's directory.
pub struct BashToolFactory;

impl ToolFactory for BashToolFactory {
    fn name(&self) -> &'static str {
        "Bash"
    }

    fn creation_requirements(&self) -> &'static [CreationRequirement] {
        &[CreationRequirement::Directory]
    }

    fn create(&self, ctx: &ToolBuildContext<'_>) -> Result<Arc<dyn Tool>, ConfigurationError> {
        Ok(Arc::new(BashTool::new(PathBuf::from(&ctx.agent.directory))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_command_and_captures_stdout() {
        let tool = BashTool::new(std::env::temp_dir());
        let result = tool.execute(serde_json::json!({"command": "echo hello"})).await;
        assert!(result.success);
        assert_eq!(result.output["stdout"].as_str().unwrap().trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure_result() {
        let tool = BashTool::new(std::env::temp_dir());
        let result = tool.execute(serde_json::json!({"command": "exit 7"})).await;
        assert!(!result.success);
        assert_eq!(result.output["exit_code"], 7);
    }

    #[tokio::test]
    async fn missing_command_argument_is_a_failure_result() {
        let tool = BashTool::new(std::env::temp_dir());
        let result = tool.execute(serde_json::json!({})).await;
        assert!(!result.success);
    }
}
