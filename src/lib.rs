// src/lib.rs

//! An agent-orchestration engine for cooperating LLM-backed agent swarms:
//! conversation state machines, inter-agent delegation, context-window
//! management, scoped storage, and a structured event/snapshot pipeline.

pub mod swarm;

// Vendor LLM wire client, kept from the teacher repo this crate grew out of.
// `swarm::llm_adapter::ClientWrapperProvider` adapts it onto `swarm::LlmProvider`
// so the CLI binary has a real provider to run against.
pub mod cloudllm;

pub use swarm::{
    builtin_factory_registry, AgentConfig, AgentContext, AgentDefinition, AgentEngine, AgentMetadata,
    ClientWrapperProvider, ConfigurationError, Content, ContextManager, DelegationHandler, DelegationRouter, Event,
    EventBus, EventFilter, EventKind, ExecutionResult, HookManager, HookPoint, LlmProvider, LlmProviderFactory,
    LlmResponse, LoadSkillTool, LogCallback, McpError, McpToolStub, Message, PermissionPolicy, PluginToolRegistry,
    Role, ScopedStore, ScriptedProvider, Skill, Snapshot, StorageError, SubscriptionId, Swarm, SwarmConfig,
    SwarmError, SwarmResult, TaskContext, Tool, ToolBuildContext, ToolCall, ToolFactory, ToolFactoryRegistry,
    ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry, ToolResult, TokenUsage,
};
