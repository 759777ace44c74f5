//! Agent-orchestration swarm engine.
//!
//! A `Swarm` loads a declarative [`config::SwarmConfig`], builds one
//! [`engine::AgentEngine`] per declared agent on demand, and drives the lead
//! agent's conversation through [`orchestrator::Swarm::execute`], delegating
//! to other agents via [`delegation::DelegationRouter`] and recording every
//! observable step on an [`event::EventBus`].
//!
//! Module layout mirrors the component boundaries this crate was designed
//! around: an event bus agents and tools publish onto
//! ([`event`]), a scoped storage substrate tools read and write through
//! ([`storage`]), a registry that turns declared tool names into bound,
//! permission-checked instances ([`tool_factory`], [`tool_protocol`],
//! [`tools`]), the conversation loop itself ([`engine`], [`agent`],
//! [`message`], [`llm`]), cross-agent delegation ([`delegation`]), context
//! budget tracking ([`context`]), snapshotting ([`snapshot`]), lifecycle
//! hooks ([`hooks`]), and the orchestrator that ties a whole swarm together
//! ([`orchestrator`]).

pub mod agent;
pub mod config;
pub mod context;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod event;
pub mod hooks;
pub mod llm;
pub mod llm_adapter;
pub mod mcp;
pub mod message;
pub mod orchestrator;
pub mod permissions;
pub mod read_tracker;
pub mod skill;
pub mod snapshot;
pub mod storage;
pub mod tool_factory;
pub mod tool_protocol;
pub mod tools;

pub use agent::{AgentContext, AgentDefinition, AgentMetadata};
pub use config::{AgentConfig, SwarmConfig};
pub use context::ContextManager;
pub use delegation::{DelegationHandler, DelegationRouter, EngineFactory};
pub use engine::AgentEngine;
pub use error::{ConfigurationError, McpError, StorageError, SwarmError, SwarmResult};
pub use event::{Event, EventBus, EventFilter, EventKind, SubscriptionId, TaskContext};
pub use hooks::{HookManager, HookPoint};
pub use llm::{LlmProvider, LlmResponse, LlmTransportError, ScriptedProvider};
pub use llm_adapter::ClientWrapperProvider;
pub use mcp::{McpToolStub, McpTransport};
pub use message::{Content, Message, Role, TokenUsage, ToolCall};
pub use orchestrator::{ExecutionResult, LlmProviderFactory, LogCallback, Swarm};
pub use permissions::PermissionPolicy;
pub use read_tracker::ReadTracker;
pub use skill::{LoadSkillTool, Skill};
pub use snapshot::Snapshot;
pub use storage::{MemoryStore, ScopedStore, Scratchpad};
pub use tool_factory::{ToolBuildContext, ToolFactory, ToolFactoryRegistry};
pub use tool_protocol::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry, ToolResult};
pub use tools::{builtin_factory_registry, PluginToolRegistry};
