//! Agent Conversation Engine (C6): the iterative per-turn state machine
//! that drives one agent's conversation to a stop.
//!
//! Grounded in `cloudllm::Agent::send`/`generate_with_tokens` (the
//! iteration loop, tool-call detection, and event emission around each LLM
//! round-trip), reshaped from the teacher's recursive call chain into an
//! explicit iterative loop with a depth counter, per the REDESIGN FLAGS.

use crate::swarm::agent::{AgentContext, AgentDefinition, AgentMetadata};
use crate::swarm::context::ContextManager;
use crate::swarm::delegation::{parse_delegation_target, DelegationHandler};
use crate::swarm::error::{SwarmError, SwarmResult};
use crate::swarm::event::{EventBus, EventKind};
use crate::swarm::llm::LlmProvider;
use crate::swarm::message::{Message, ToolCall};
use crate::swarm::tool_protocol::{ToolRegistry, ToolResult};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Soft ceiling on consecutive tool-calling turns (spec §4.6): a
/// pathological loop returns an error instead of exhausting the stack.
pub const DEFAULT_MAX_TURN_DEPTH: usize = 100_000;

/// Default context budget used when the caller doesn't override it.
pub const DEFAULT_CONTEXT_LIMIT: usize = 128_000;

/// Tool name recognized as a forced per-agent stop.
pub const FINISH_AGENT_TOOL: &str = "FinishAgent";
/// Tool name recognized as a forced swarm-wide stop.
pub const FINISH_SWARM_TOOL: &str = "FinishSwarm";

fn preview(prompt: &str) -> String {
    prompt.chars().take(120).collect()
}

fn is_finish_tool(name: &str) -> bool {
    name == FINISH_AGENT_TOOL || name == FINISH_SWARM_TOOL
}

/// Drives one agent's conversation: builds requests, dispatches tool
/// calls (local, delegated, or MCP — the latter two are just differently
/// backed [`crate::swarm::tool_protocol::Tool`] instances from the
/// engine's point of view), and applies context management between turns.
pub struct AgentEngine {
    definition: Arc<AgentDefinition>,
    context: AgentContext,
    tools: ToolRegistry,
    llm: Arc<dyn LlmProvider>,
    context_manager: Arc<ContextManager>,
    bus: EventBus,
    messages: Vec<Message>,
    max_turn_depth: usize,
    context_limit: usize,
    delegation: Option<Arc<dyn DelegationHandler>>,
    cancellation: CancellationToken,
}

impl AgentEngine {
    /// Build a fresh engine for `definition` with an empty conversation.
    #[must_use]
    pub fn new(
        definition: Arc<AgentDefinition>,
        metadata: AgentMetadata,
        tools: ToolRegistry,
        llm: Arc<dyn LlmProvider>,
        context_manager: Arc<ContextManager>,
        bus: EventBus,
    ) -> Self {
        let context = AgentContext::new(definition.name.clone(), metadata);
        Self {
            definition,
            context,
            tools,
            llm,
            context_manager,
            bus,
            messages: Vec::new(),
            max_turn_depth: DEFAULT_MAX_TURN_DEPTH,
            context_limit: DEFAULT_CONTEXT_LIMIT,
            delegation: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Override the turn-depth ceiling.
    #[must_use]
    pub fn with_max_turn_depth(mut self, max_turn_depth: usize) -> Self {
        self.max_turn_depth = max_turn_depth;
        self
    }

    /// Override the context budget used for threshold checks.
    #[must_use]
    pub fn with_context_limit(mut self, context_limit: usize) -> Self {
        self.context_limit = context_limit;
        self
    }

    /// Attach the handler consulted for `WorkWith<Agent>` tool calls.
    #[must_use]
    pub fn with_delegation_handler(mut self, handler: Arc<dyn DelegationHandler>) -> Self {
        self.delegation = Some(handler);
        self
    }

    /// Attach the token the orchestrator cancels to stop this engine
    /// cooperatively at its next suspension point (spec §5).
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Per-conversation mutable state, exposed so the orchestrator and
    /// snapshot engine can read or restore it.
    #[must_use]
    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    /// Restore per-conversation state, e.g. from a loaded snapshot.
    pub fn restore_context(&mut self, context: AgentContext) {
        self.context = context;
    }

    /// The conversation's message history so far.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Restore the conversation's message history, e.g. from a loaded
    /// snapshot.
    pub fn restore_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Run the conversation forward with `prompt` until it stops, returning
    /// the final assistant content.
    #[instrument(skip(self, prompt), fields(agent = %self.definition.name))]
    pub async fn execute(&mut self, prompt: impl Into<String>) -> SwarmResult<String> {
        let prompt = prompt.into();
        self.bus.emit(
            self.definition.name.clone(),
            EventKind::AgentStart {
                prompt_preview: preview(&prompt),
            },
        );

        if self.messages.is_empty() && !self.definition.system_prompt.is_empty() {
            self.messages.push(Message::system(self.definition.system_prompt.clone()));
        }
        self.messages.push(Message::user(prompt));

        let mut depth = 0usize;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(SwarmError::Cancelled);
            }
            depth += 1;
            if depth > self.max_turn_depth {
                return Err(SwarmError::Engine(format!(
                    "exceeded max turn depth of {} without reaching a stop",
                    self.max_turn_depth
                )));
            }

            let tool_metadata = self.tools.list_metadata().await;
            self.bus.emit(
                self.definition.name.clone(),
                EventKind::OpenaiRequest {
                    message_count: self.messages.len(),
                    model: self.definition.model.clone(),
                },
            );

            let response = tokio::select! {
                biased;
                () = self.cancellation.cancelled() => return Err(SwarmError::Cancelled),
                result = self.llm.complete(&self.messages, &tool_metadata) => match result {
                    Ok(response) => response,
                    Err(e) => {
                        // No partial tool results are appended on transport failure.
                        return Err(SwarmError::Engine(format!("llm transport failure: {e}")));
                    }
                },
            };

            self.bus.emit(
                self.definition.name.clone(),
                EventKind::OpenaiResponse {
                    model: self.definition.model.clone(),
                    usage: response.usage.map(|u| serde_json::json!(u)),
                },
            );

            let assistant = response.message;
            self.messages.push(assistant.clone());

            if assistant.tool_calls.is_empty() {
                let content = assistant.content.as_text();
                self.bus.emit(
                    self.definition.name.clone(),
                    EventKind::AgentStop {
                        content: content.clone(),
                        override_reason: None,
                    },
                );
                return Ok(content);
            }

            if let Some(finish) = assistant.tool_calls.iter().find(|c| is_finish_tool(&c.name)) {
                let content = finish
                    .arguments
                    .get("content")
                    .or_else(|| finish.arguments.get("reason"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.bus.emit(
                    self.definition.name.clone(),
                    EventKind::AgentStop {
                        content: content.clone(),
                        override_reason: Some(finish.name.clone()),
                    },
                );
                return Ok(content);
            }

            self.bus.emit(
                self.definition.name.clone(),
                EventKind::AgentStep {
                    iteration: depth,
                    tool_call_count: assistant.tool_calls.len(),
                },
            );

            if self.cancellation.is_cancelled() {
                return Err(SwarmError::Cancelled);
            }

            let mut seen_ids = HashSet::new();
            for call in &assistant.tool_calls {
                if call.id.is_empty() {
                    return Err(SwarmError::Engine(
                        "assistant tool call is missing a call_id".to_string(),
                    ));
                }
                if !seen_ids.insert(call.id.clone()) {
                    warn!(call_id = %call.id, agent = %self.definition.name, "duplicate call id within one assistant turn");
                }
            }

            for call in &assistant.tool_calls {
                let result = self.dispatch_tool_call(call).await?;
                self.messages.push(Message::tool_result(call.id.clone(), result.to_message_body()));
                if call.name == "TodoWrite" && result.success {
                    self.context.last_todowrite_message_index = Some(self.messages.len() - 1);
                }
                if call.name == "LoadSkill" && result.success {
                    self.apply_loaded_skill(&result.output);
                }
            }

            let tokens_used: usize = self.messages.iter().map(Message::approx_tokens).sum();
            self.context_manager.check_context_warnings(
                &self.bus,
                &mut self.context,
                &mut self.messages,
                tokens_used,
                self.context_limit,
            );
        }
    }

    async fn dispatch_tool_call(&mut self, call: &ToolCall) -> SwarmResult<ToolResult> {
        self.bus.emit(
            self.definition.name.clone(),
            EventKind::ToolCall {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        );

        let result = if let Some(target) = parse_delegation_target(&call.name) {
            self.dispatch_delegation(call, &target).await?
        } else {
            self.tools.execute(&call.name, call.arguments.clone()).await
        };

        if !result.success {
            self.bus.emit(
                self.definition.name.clone(),
                EventKind::ToolError {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    message: result.error.clone().unwrap_or_default(),
                },
            );
        }
        self.bus.emit(
            self.definition.name.clone(),
            EventKind::ToolResult {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                success: result.success,
            },
        );
        info!(tool = %call.name, success = result.success, agent = %self.definition.name, "tool dispatched");
        Ok(result)
    }

    /// Narrow the active tool set to the loaded skill's declared tools
    /// (union non-removable built-ins) and record `active_skill_path`
    /// (spec §9, implemented as part of C4/C6).
    fn apply_loaded_skill(&mut self, load_skill_output: &Value) {
        let Some(path) = load_skill_output.get("path").and_then(Value::as_str) else {
            return;
        };
        let tools = load_skill_output
            .get("skill")
            .and_then(|s| s.get("tools"))
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default();
        self.tools.set_active_subset(tools);
        self.context.active_skill_path = Some(path.to_string());
    }

    async fn dispatch_delegation(&mut self, call: &ToolCall, target: &str) -> SwarmResult<ToolResult> {
        if !self.definition.allows_delegation_to(target) {
            return Ok(ToolResult::failure(format!(
                "delegation target `{target}` is not declared for agent `{}`",
                self.definition.name
            )));
        }
        let handler = self
            .delegation
            .clone()
            .ok_or_else(|| SwarmError::Engine("no delegation handler configured for this agent".to_string()))?;
        let prompt = call
            .arguments
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        self.context.record_delegation(call.id.clone(), target.to_string());
        let outcome = handler.delegate(&self.definition.name, &call.id, target, &prompt).await;
        self.context.clear_delegation(&call.id);

        Ok(match outcome {
            Ok(content) => ToolResult::success(Value::String(content)),
            Err(e) => ToolResult::failure(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::event::TaskContext;
    use crate::swarm::llm::{LlmResponse, ScriptedProvider};
    use crate::swarm::tool_protocol::{Tool, ToolMetadata};

    fn meta() -> AgentMetadata {
        AgentMetadata {
            swarm_id: "s1".into(),
            parent_swarm_id: None,
            execution_id: "e1".into(),
        }
    }

    fn task_ctx() -> TaskContext {
        TaskContext {
            swarm_id: "s1".into(),
            parent_swarm_id: None,
            execution_id: "e1".into(),
        }
    }

    fn definition() -> Arc<AgentDefinition> {
        Arc::new(AgentDefinition::new("lead", "Lead agent", "test-model"))
    }

    #[tokio::test]
    async fn cancelling_before_execute_returns_cancelled() {
        let provider = Arc::new(ScriptedProvider::new("test-model", vec![]));
        let token = CancellationToken::new();
        token.cancel();
        let mut engine = AgentEngine::new(
            definition(),
            meta(),
            ToolRegistry::empty(),
            provider,
            Arc::new(ContextManager::new()),
            EventBus::new(),
        )
        .with_cancellation_token(token);

        let err = task_ctx().scope(engine.execute("go")).await.unwrap_err();
        assert!(matches!(err, SwarmError::Cancelled));
    }

    #[tokio::test]
    async fn single_turn_stop_returns_assistant_content() {
        let provider = Arc::new(ScriptedProvider::new(
            "test-model",
            vec![Ok(LlmResponse {
                message: Message::assistant("all done"),
                usage: None,
            })],
        ));
        let mut engine = AgentEngine::new(
            definition(),
            meta(),
            ToolRegistry::empty(),
            provider,
            Arc::new(ContextManager::new()),
            EventBus::new(),
        );

        let content = task_ctx().scope(engine.execute("hello")).await.unwrap();
        assert_eq!(content, "all done");
    }

    struct Echo;

    #[async_trait::async_trait]
    impl Tool for Echo {
        async fn metadata(&self) -> ToolMetadata {
            ToolMetadata {
                name: "echo".into(),
                description: "echoes input".into(),
                parameters: vec![],
            }
        }

        async fn execute(&self, args: Value) -> ToolResult {
            ToolResult::success(args)
        }
    }

    #[tokio::test]
    async fn two_sequential_tool_calls_append_results_in_order() {
        let provider = Arc::new(ScriptedProvider::new(
            "test-model",
            vec![
                Ok(LlmResponse {
                    message: Message::assistant_tool_calls(
                        "",
                        vec![
                            ToolCall {
                                id: "c1".into(),
                                name: "echo".into(),
                                arguments: serde_json::json!({"n": 1}),
                            },
                            ToolCall {
                                id: "c2".into(),
                                name: "echo".into(),
                                arguments: serde_json::json!({"n": 2}),
                            },
                        ],
                    ),
                    usage: None,
                }),
                Ok(LlmResponse {
                    message: Message::assistant("finished"),
                    usage: None,
                }),
            ],
        ));
        let mut tools = ToolRegistry::empty();
        tools.insert("echo", Arc::new(Echo));
        let mut engine = AgentEngine::new(
            definition(),
            meta(),
            tools,
            provider,
            Arc::new(ContextManager::new()),
            EventBus::new(),
        );

        let content = task_ctx().scope(engine.execute("go")).await.unwrap();
        assert_eq!(content, "finished");
        let tool_messages: Vec<_> = engine
            .messages()
            .iter()
            .filter(|m| m.role == crate::swarm::message::Role::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 2);
        assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn missing_call_id_is_a_hard_error() {
        let provider = Arc::new(ScriptedProvider::new(
            "test-model",
            vec![Ok(LlmResponse {
                message: Message::assistant_tool_calls(
                    "",
                    vec![ToolCall {
                        id: String::new(),
                        name: "echo".into(),
                        arguments: serde_json::json!({}),
                    }],
                ),
                usage: None,
            })],
        ));
        let mut engine = AgentEngine::new(
            definition(),
            meta(),
            ToolRegistry::empty(),
            provider,
            Arc::new(ContextManager::new()),
            EventBus::new(),
        );

        let err = task_ctx().scope(engine.execute("go")).await.unwrap_err();
        assert!(matches!(err, SwarmError::Engine(_)));
    }

    #[tokio::test]
    async fn transport_failure_appends_no_partial_tool_results() {
        let provider = Arc::new(ScriptedProvider::new("test-model", vec![Err("boom".to_string())]));
        let mut engine = AgentEngine::new(
            definition(),
            meta(),
            ToolRegistry::empty(),
            provider,
            Arc::new(ContextManager::new()),
            EventBus::new(),
        );

        let err = task_ctx().scope(engine.execute("go")).await.unwrap_err();
        assert!(matches!(err, SwarmError::Engine(_)));
        assert!(engine.messages().iter().all(|m| m.role != crate::swarm::message::Role::Tool));
    }

    struct LoadSkillStub;

    #[async_trait::async_trait]
    impl Tool for LoadSkillStub {
        async fn metadata(&self) -> ToolMetadata {
            ToolMetadata {
                name: "LoadSkill".into(),
                description: "stub".into(),
                parameters: vec![],
            }
        }

        fn removable(&self) -> bool {
            false
        }

        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::success(serde_json::json!({
                "path": "skills/reviewer",
                "skill": {"name": "reviewer", "tools": ["echo"]},
            }))
        }
    }

    #[tokio::test]
    async fn loading_a_skill_narrows_the_active_tool_set_and_records_the_path() {
        let provider = Arc::new(ScriptedProvider::new(
            "test-model",
            vec![
                Ok(LlmResponse {
                    message: Message::assistant_tool_calls(
                        "",
                        vec![ToolCall {
                            id: "c1".into(),
                            name: "LoadSkill".into(),
                            arguments: serde_json::json!({"name": "reviewer"}),
                        }],
                    ),
                    usage: None,
                }),
                Ok(LlmResponse {
                    message: Message::assistant("done"),
                    usage: None,
                }),
            ],
        ));
        let mut tools = ToolRegistry::empty();
        tools.insert("echo", Arc::new(Echo));
        tools.insert("LoadSkill", Arc::new(LoadSkillStub));
        tools.insert("other", Arc::new(Echo));
        let mut engine = AgentEngine::new(
            definition(),
            meta(),
            tools,
            provider,
            Arc::new(ContextManager::new()),
            EventBus::new(),
        );

        task_ctx().scope(engine.execute("go")).await.unwrap();
        assert_eq!(engine.context().active_skill_path.as_deref(), Some("skills/reviewer"));
    }

    #[tokio::test]
    async fn depth_ceiling_returns_error_instead_of_looping_forever() {
        let responses: Vec<_> = (0..3)
            .map(|i| {
                Ok(LlmResponse {
                    message: Message::assistant_tool_calls(
                        "",
                        vec![ToolCall {
                            id: format!("c{i}"),
                            name: "echo".into(),
                            arguments: serde_json::json!({}),
                        }],
                    ),
                    usage: None,
                })
            })
            .collect();
        let provider = Arc::new(ScriptedProvider::new("test-model", responses));
        let mut tools = ToolRegistry::empty();
        tools.insert("echo", Arc::new(Echo));
        let mut engine = AgentEngine::new(
            definition(),
            meta(),
            tools,
            provider,
            Arc::new(ContextManager::new()),
            EventBus::new(),
        )
        .with_max_turn_depth(2);

        let err = task_ctx().scope(engine.execute("go")).await.unwrap_err();
        assert!(matches!(err, SwarmError::Engine(_)));
    }
}
