//! Error taxonomy for the swarm engine.
//!
//! Mirrors the error-handling design of spec §7: configuration errors abort
//! before execution, tool errors are converted into tool-result messages so
//! the model can recover, and transport-level failures become user-visible
//! failures surfaced through the orchestrator's result.

use thiserror::Error;

/// Top-level error type returned by fallible swarm operations.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Malformed or missing configuration, unknown tools, missing creation
    /// requirements.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// CLI-level surface for user-visible failures.
    #[error("execution error: {0}")]
    Execution(String),

    /// Delegation to an agent that was never declared.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// An MCP tool invocation failed.
    #[error(transparent)]
    Mcp(#[from] McpError),

    /// A permission policy rejected a tool invocation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A single tool result alone would exceed the model's context window.
    #[error("context overflow: {message} (offset={offset}, limit={limit})")]
    ContextOverflow {
        /// Human-readable explanation.
        message: String,
        /// Suggested offset to retry from.
        offset: usize,
        /// Suggested read limit.
        limit: usize,
    },

    /// A write/edit was attempted on a file the agent hasn't read, or whose
    /// digest has changed since it was last read.
    #[error("read-before-write violation: {path}")]
    ReadBeforeWriteViolation {
        /// The offending path.
        path: String,
    },

    /// The user or a parent execution cancelled this operation.
    #[error("cancelled")]
    Cancelled,

    /// Failure inside the scoped storage substrate.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Failure inside the tool-call dispatch loop that doesn't fit another
    /// variant (e.g. malformed tool-call from the LLM).
    #[error("engine error: {0}")]
    Engine(String),
}

/// Result alias used throughout the crate.
pub type SwarmResult<T> = Result<T, SwarmError>;

/// Configuration-time failures.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A tool name referenced in an agent definition is not registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A tool factory's creation requirement was not satisfied.
    #[error("missing creation requirement `{requirement}` for tool `{tool}`")]
    MissingRequirement {
        /// The tool that could not be constructed.
        tool: String,
        /// The unmet requirement, e.g. `"agent_name"` or `"directory"`.
        requirement: String,
    },

    /// A delegation target was not declared in the swarm's agent set.
    #[error("delegation target `{0}` is not a declared agent")]
    UnknownDelegationTarget(String),

    /// A config file failed to parse or deserialize.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors wrapping a remote MCP tool invocation, per spec §4.5 / §7.
#[derive(Debug, Error)]
pub enum McpError {
    /// The remote call exceeded its deadline.
    #[error("{}", format_mcp("timed out", .server, .tool, .request_id, .code, .message))]
    Timeout {
        /// MCP server name.
        server: String,
        /// Tool name within that server.
        tool: String,
        /// Request id, if the transport supplied one.
        request_id: Option<String>,
        /// Protocol error code, if any.
        code: Option<i64>,
        /// Underlying transport message.
        message: String,
    },

    /// The underlying transport (socket, process, HTTP) failed.
    #[error("{}", format_mcp("transport error", .server, .tool, .request_id, .code, .message))]
    Transport {
        /// MCP server name.
        server: String,
        /// Tool name within that server.
        tool: String,
        /// Request id, if the transport supplied one.
        request_id: Option<String>,
        /// Protocol error code, if any.
        code: Option<i64>,
        /// Underlying transport message.
        message: String,
    },

    /// The server responded but violated the MCP protocol contract.
    #[error("{}", format_mcp("protocol error", .server, .tool, .request_id, .code, .message))]
    Protocol {
        /// MCP server name.
        server: String,
        /// Tool name within that server.
        tool: String,
        /// Request id, if the transport supplied one.
        request_id: Option<String>,
        /// Protocol error code, if any.
        code: Option<i64>,
        /// Underlying transport message.
        message: String,
    },
}

fn format_mcp(
    kind: &str,
    server: &str,
    tool: &str,
    request_id: &Option<String>,
    code: &Option<i64>,
    message: &str,
) -> String {
    let mut out = format!("{kind} [server: {server}] [tool: {tool}]");
    if let Some(id) = request_id {
        out.push_str(&format!(" [request_id: {id}]"));
    }
    if let Some(code) = code {
        out.push_str(&format!(" [code: {code}]"));
    }
    out.push_str(": ");
    out.push_str(message);
    out
}

/// Errors from the scoped storage substrate (scratchpad / memory).
#[derive(Debug, Error, Clone)]
pub enum StorageError {
    /// The supplied key was empty or whitespace-only.
    #[error("key must not be empty or whitespace")]
    EmptyKey,

    /// No entry exists at the given path.
    #[error("not found: {0}")]
    NotFound(String),

    /// A single entry exceeded the per-entry size cap.
    #[error("entry `{path}` is {size} bytes, exceeding the {limit} byte cap")]
    EntryTooLarge {
        /// The offending path.
        path: String,
        /// Attempted size in bytes.
        size: usize,
        /// Configured per-entry cap.
        limit: usize,
    },

    /// Writing the entry would exceed the aggregate size cap for the store.
    #[error("writing `{path}` would exceed the total storage cap of {limit} bytes")]
    TotalSizeExceeded {
        /// The offending path.
        path: String,
        /// Configured aggregate cap.
        limit: usize,
    },

    /// An attempt was made to overwrite or delete a virtual, read-only entry.
    #[error("`{0}` is a virtual entry and cannot be modified")]
    VirtualEntryImmutable(String),

    /// An invalid glob or regex pattern was supplied.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// An underlying filesystem operation failed (persistent store only).
    #[error("io error: {0}")]
    Io(String),

    /// A loaded snapshot's `version` field doesn't match what this crate
    /// can restore.
    #[error("unsupported snapshot version: {0}")]
    UnsupportedSnapshotVersion(String),
}
