//! `Read`, `Write`, and `Edit` tools: filesystem access scoped to the
//! owning agent's directory root, gated by the read-before-write
//! invariant.
//!
//! Grounded in `cloudllm::tools::filesystem::FileSystemTool`'s
//! `validate_path` traversal-safe canonicalization (spec §4.2's
//! "no `.`/`..`, no leading `/`" normalization, applied here to a
//! filesystem root rather than the scoped store). Read-before-write
//! enforcement is new: spec §4.3/§7/§8 property 6, backed by
//! [`crate::swarm::read_tracker::ReadTracker`].

use crate::swarm::error::{ConfigurationError, SwarmError};
use crate::swarm::read_tracker::ReadTracker;
use crate::swarm::storage::MAX_ENTRY_BYTES;
use crate::swarm::tool_factory::{CreationRequirement, ToolBuildContext, ToolFactory};
use crate::swarm::tool_protocol::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolve `requested` against `root`, rejecting any path that would
/// escape it once normalized. Mirrors the teacher's traversal check but
/// works lexically rather than via `canonicalize`, so a path that
/// doesn't exist yet (a `Write` target) can still be validated.
fn validate_path(root: &Path, requested: &str) -> Result<PathBuf, String> {
    let requested = requested.trim_start_matches('/');
    let mut resolved = PathBuf::from(root);
    for component in Path::new(requested).components() {
        use std::path::Component;
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() || !resolved.starts_with(root) {
                    return Err(format!("path `{requested}` escapes the agent's root directory"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("path `{requested}` must be relative to the agent's root directory"));
            }
        }
    }
    if !resolved.starts_with(root) {
        return Err(format!("path `{requested}` escapes the agent's root directory"));
    }
    Ok(resolved)
}

/// Reads a file's contents and registers its digest with the
/// [`ReadTracker`], the only way a later `Write`/`Edit` on that path can
/// satisfy the read-before-write check.
pub struct ReadTool {
    root: PathBuf,
    agent_name: String,
    read_tracker: Arc<ReadTracker>,
}

impl ReadTool {
    /// Bind this tool to `agent_name`'s `root` directory.
    #[must_use]
    pub fn new(root: PathBuf, agent_name: String, read_tracker: Arc<ReadTracker>) -> Self {
        Self {
            root,
            agent_name,
            read_tracker,
        }
    }
}

#[async_trait]
impl Tool for ReadTool {
    async fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "Read".to_string(),
            description: "Read a file's contents.".to_string(),
            parameters: vec![
                ToolParameter::new("file_path", ToolParameterType::String)
                    .with_description("Path to read, relative to the agent's root directory")
                    .required(),
                ToolParameter::new("offset", ToolParameterType::Integer).with_description(
                    "Byte offset to start reading from; required once the file exceeds the read cap",
                ),
                ToolParameter::new("limit", ToolParameterType::Integer).with_description(
                    "Maximum number of bytes to return; required once the file exceeds the read cap",
                ),
            ],
        }
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(file_path) = args.get("file_path").and_then(Value::as_str) else {
            return ToolResult::failure("missing required argument `file_path`");
        };
        let offset = args.get("offset").and_then(Value::as_u64).map(|v| v as usize);
        let limit = args.get("limit").and_then(Value::as_u64).map(|v| v as usize);
        let resolved = match validate_path(&self.root, file_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e),
        };
        let bytes = match tokio::fs::read(&resolved).await {
            Ok(bytes) => bytes,
            Err(e) => return ToolResult::failure(format!("failed to read `{file_path}`: {e}")),
        };

        if bytes.len() > MAX_ENTRY_BYTES && offset.is_none() && limit.is_none() {
            return ToolResult::failure(
                SwarmError::ContextOverflow {
                    message: format!(
                        "`{file_path}` is {} bytes, exceeding the {MAX_ENTRY_BYTES} byte single-read cap; retry with `offset`/`limit`",
                        bytes.len()
                    ),
                    offset: 0,
                    limit: MAX_ENTRY_BYTES,
                }
                .to_string(),
            );
        }

        self.read_tracker.register_read(&self.agent_name, &resolved, &bytes);

        let start = offset.unwrap_or(0).min(bytes.len());
        let end = start.saturating_add(limit.unwrap_or(MAX_ENTRY_BYTES).min(MAX_ENTRY_BYTES)).min(bytes.len());
        let content = String::from_utf8_lossy(&bytes[start..end]).to_string();
        ToolResult::success(serde_json::json!({ "content": content }))
    }
}

/// Writes (creates or overwrites) a file. Overwriting an existing file
/// requires that the agent has read it since its last modification;
/// creating a brand-new file needs no prior read, since there is
/// nothing yet to have read.
pub struct WriteTool {
    root: PathBuf,
    agent_name: String,
    read_tracker: Arc<ReadTracker>,
}

impl WriteTool {
    /// Bind this tool to `agent_name`'s `root` directory.
    #[must_use]
    pub fn new(root: PathBuf, agent_name: String, read_tracker: Arc<ReadTracker>) -> Self {
        Self {
            root,
            agent_name,
            read_tracker,
        }
    }
}

#[async_trait]
impl Tool for WriteTool {
    async fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "Write".to_string(),
            description: "Create or overwrite a file with new content.".to_string(),
            parameters: vec![
                ToolParameter::new("file_path", ToolParameterType::String)
                    .with_description("Path to write, relative to the agent's root directory")
                    .required(),
                ToolParameter::new("content", ToolParameterType::String)
                    .with_description("New file content")
                    .required(),
            ],
        }
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(file_path) = args.get("file_path").and_then(Value::as_str) else {
            return ToolResult::failure("missing required argument `file_path`");
        };
        let Some(content) = args.get("content").and_then(Value::as_str) else {
            return ToolResult::failure("missing required argument `content`");
        };
        let resolved = match validate_path(&self.root, file_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e),
        };

        if resolved.exists() && !self.read_tracker.file_read(&self.agent_name, &resolved) {
            return ToolResult::failure(
                SwarmError::ReadBeforeWriteViolation {
                    path: format!("`{file_path}` must be read before it can be overwritten"),
                }
                .to_string(),
            );
        }

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::failure(format!("failed to create parent directories: {e}"));
            }
        }
        match tokio::fs::write(&resolved, content.as_bytes()).await {
            Ok(()) => {
                self.read_tracker.register_read(&self.agent_name, &resolved, content.as_bytes());
                ToolResult::success(serde_json::json!({ "bytes_written": content.len() }))
            }
            Err(e) => ToolResult::failure(format!("failed to write `{file_path}`: {e}")),
        }
    }
}

/// Replaces one occurrence of `old_string` with `new_string` in an
/// existing file. Always requires a prior read, since an edit is
/// meaningless without already having the content it patches.
pub struct EditTool {
    root: PathBuf,
    agent_name: String,
    read_tracker: Arc<ReadTracker>,
}

impl EditTool {
    /// Bind this tool to `agent_name`'s `root` directory.
    #[must_use]
    pub fn new(root: PathBuf, agent_name: String, read_tracker: Arc<ReadTracker>) -> Self {
        Self {
            root,
            agent_name,
            read_tracker,
        }
    }
}

#[async_trait]
impl Tool for EditTool {
    async fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "Edit".to_string(),
            description: "Replace one occurrence of a string in a file.".to_string(),
            parameters: vec![
                ToolParameter::new("file_path", ToolParameterType::String)
                    .with_description("Path to edit, relative to the agent's root directory")
                    .required(),
                ToolParameter::new("old_string", ToolParameterType::String)
                    .with_description("Exact text to replace")
                    .required(),
                ToolParameter::new("new_string", ToolParameterType::String)
                    .with_description("Replacement text")
                    .required(),
            ],
        }
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(file_path) = args.get("file_path").and_then(Value::as_str) else {
            return ToolResult::failure("missing required argument `file_path`");
        };
        let Some(old_string) = args.get("old_string").and_then(Value::as_str) else {
            return ToolResult::failure("missing required argument `old_string`");
        };
        let Some(new_string) = args.get("new_string").and_then(Value::as_str) else {
            return ToolResult::failure("missing required argument `new_string`");
        };
        let resolved = match validate_path(&self.root, file_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e),
        };

        if !self.read_tracker.file_read(&self.agent_name, &resolved) {
            return ToolResult::failure(
                SwarmError::ReadBeforeWriteViolation {
                    path: format!("`{file_path}` must be read before it can be edited"),
                }
                .to_string(),
            );
        }

        let current = match tokio::fs::read_to_string(&resolved).await {
            Ok(text) => text,
            Err(e) => return ToolResult::failure(format!("failed to read `{file_path}`: {e}")),
        };
        let occurrences = current.matches(old_string).count();
        if occurrences == 0 {
            return ToolResult::failure(format!("`{old_string}` was not found in `{file_path}`"));
        }
        if occurrences > 1 {
            return ToolResult::failure(format!(
                "`{old_string}` is not unique in `{file_path}` ({occurrences} occurrences)"
            ));
        }
        let updated = current.replacen(old_string, new_string, 1);
        match tokio::fs::write(&resolved, updated.as_bytes()).await {
            Ok(()) => {
                self.read_tracker.register_read(&self.agent_name, &resolved, updated.as_bytes());
                ToolResult::success(serde_json::json!({ "replaced": true }))
            }
            Err(e) => ToolResult::failure(format!("failed to write `{file_path}`: {e}")),
        }
    }
}

macro_rules! filesystem_factory {
    ($factory:ident, $tool:ident, $name:literal) => {
        #[doc = concat!("Builds a [`", stringify!($tool), "`] scoped to the owning agent.")]
        pub struct $factory;

        impl ToolFactory for $factory {
            fn name(&self) -> &'static str {
                $name
            }

            fn creation_requirements(&self) -> &'static [CreationRequirement] {
                &[CreationRequirement::Directory, CreationRequirement::AgentName, CreationRequirement::ReadTracker]
            }

            fn create(&self, ctx: &ToolBuildContext<'_>) -> Result<Arc<dyn Tool>, ConfigurationError> {
                Ok(Arc::new($tool::new(
                    PathBuf::from(&ctx.agent.directory),
                    ctx.agent.name.clone(),
                    ctx.read_tracker.clone(),
                )))
            }
        }
    };
}

filesystem_factory!(ReadToolFactory, ReadTool, "Read");
filesystem_factory!(WriteToolFactory, WriteTool, "Write");
filesystem_factory!(EditToolFactory, EditTool, "Edit");

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> Arc<ReadTracker> {
        Arc::new(ReadTracker::new())
    }

    #[tokio::test]
    async fn read_then_write_succeeds_scenario_s2() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x"), b"original").unwrap();
        let tracker = tracker();

        let read = ReadTool::new(dir.path().to_path_buf(), "agent".to_string(), tracker.clone());
        let result = read.execute(serde_json::json!({"file_path": "x"})).await;
        assert!(result.success);

        let write = WriteTool::new(dir.path().to_path_buf(), "agent".to_string(), tracker);
        let result = write.execute(serde_json::json!({"file_path": "x", "content": "a"})).await;
        assert!(result.success);
        assert_eq!(std::fs::read_to_string(dir.path().join("x")).unwrap(), "a");
    }

    #[tokio::test]
    async fn write_without_prior_read_on_existing_file_is_a_violation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x"), b"original").unwrap();
        let write = WriteTool::new(dir.path().to_path_buf(), "agent".to_string(), tracker());
        let result = write.execute(serde_json::json!({"file_path": "x", "content": "a"})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("read-before-write"));
    }

    #[tokio::test]
    async fn write_creating_a_new_file_needs_no_prior_read() {
        let dir = tempfile::tempdir().unwrap();
        let write = WriteTool::new(dir.path().to_path_buf(), "agent".to_string(), tracker());
        let result = write.execute(serde_json::json!({"file_path": "new.txt", "content": "hi"})).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn edit_without_prior_read_is_a_violation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x"), b"original").unwrap();
        let edit = EditTool::new(dir.path().to_path_buf(), "agent".to_string(), tracker());
        let result = edit.execute(serde_json::json!({"file_path": "x", "old_string": "original", "new_string": "new"})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn edit_after_read_replaces_unique_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x"), b"hello world").unwrap();
        let tracker = tracker();
        let read = ReadTool::new(dir.path().to_path_buf(), "agent".to_string(), tracker.clone());
        read.execute(serde_json::json!({"file_path": "x"})).await;

        let edit = EditTool::new(dir.path().to_path_buf(), "agent".to_string(), tracker);
        let result = edit.execute(serde_json::json!({"file_path": "x", "old_string": "world", "new_string": "rust"})).await;
        assert!(result.success);
        assert_eq!(std::fs::read_to_string(dir.path().join("x")).unwrap(), "hello rust");
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let read = ReadTool::new(dir.path().to_path_buf(), "agent".to_string(), tracker());
        let result = read.execute(serde_json::json!({"file_path": "../../etc/passwd"})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("escapes"));
    }

    #[tokio::test]
    async fn oversized_read_without_offset_or_limit_returns_context_overflow() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big"), vec![b'a'; MAX_ENTRY_BYTES + 1]).unwrap();
        let read = ReadTool::new(dir.path().to_path_buf(), "agent".to_string(), tracker());

        let result = read.execute(serde_json::json!({"file_path": "big"})).await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("context overflow"));
        assert!(error.contains(&format!("offset={}", 0)));
        assert!(error.contains(&format!("limit={MAX_ENTRY_BYTES}")));
    }

    #[tokio::test]
    async fn oversized_read_with_offset_and_limit_returns_the_requested_slice() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big"), vec![b'a'; MAX_ENTRY_BYTES + 1]).unwrap();
        let read = ReadTool::new(dir.path().to_path_buf(), "agent".to_string(), tracker());

        let result = read.execute(serde_json::json!({"file_path": "big", "offset": 0, "limit": 10})).await;
        assert!(result.success);
        assert_eq!(result.output["content"].as_str().unwrap().len(), 10);
    }
}
