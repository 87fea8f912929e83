//! The agent event loop: the state machine that ties the model, tools,
//! hooks, interrupts, and conversation manager together (spec.md §4.1).

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use log::{debug, warn};
use serde_json::Value;

use crate::conversation::{ConversationManager, NullConversationManager};
use crate::error::{Error, Result};
use crate::hooks::{
    AfterInvocationEvent, AfterModelCallEvent, AfterToolCallEvent, BeforeInvocationEvent,
    BeforeModelCallEvent, BeforeToolCallEvent, HookRegistry, MessageAddedEvent,
    ModelStreamEventHook,
};
use crate::interrupt::{looks_like_resume_input, Interrupt, InterruptState};
use crate::model::{Model, ModelCallOptions, SystemPrompt, ToolChoice};
use crate::reassembler::Reassembler;
use crate::session::SessionRepository;
use crate::structured_output::{StructuredOutputSlot, StructuredOutputTool};
use crate::tools::{Tool, ToolContext, ToolRegistry};
use crate::types::{AgentState, AgentStreamEvent, ContentBlock, Message, StopReason, ToolUseBlock};

/// A fresh prompt (text or content blocks) or a resume submission for a
/// paused invocation. Constructed implicitly by [`Agent::invoke`]/
/// [`Agent::stream`] from whatever the caller passes; see
/// [`crate::interrupt::looks_like_resume_input`] for the detection rule.
#[derive(Debug, Clone)]
pub enum AgentInput {
    Prompt(Vec<ContentBlock>),
    Resume(Value),
}

impl From<&str> for AgentInput {
    fn from(s: &str) -> Self {
        AgentInput::Prompt(vec![ContentBlock::text(s)])
    }
}

impl From<String> for AgentInput {
    fn from(s: String) -> Self {
        AgentInput::Prompt(vec![ContentBlock::text(s)])
    }
}

impl From<Vec<ContentBlock>> for AgentInput {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        AgentInput::Prompt(blocks)
    }
}

impl From<Value> for AgentInput {
    fn from(value: Value) -> Self {
        if looks_like_resume_input(&value) {
            AgentInput::Resume(value)
        } else {
            match &value {
                Value::String(s) => AgentInput::Prompt(vec![ContentBlock::text(s.clone())]),
                other => AgentInput::Prompt(vec![ContentBlock::Json(crate::types::JsonBlock::new(
                    other.clone(),
                ))]),
            }
        }
    }
}

/// Terminal outcome of one `invoke`/`stream` call.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub stop_reason: StopReason,
    pub last_message: Option<Message>,
    pub interrupts: Vec<Interrupt>,
    pub structured_output: Option<Value>,
}

/// Configuration for an [`Agent`], built with [`AgentOptionsBuilder`].
/// Required fields: `model`. Everything else has a sensible default.
pub struct AgentOptions {
    pub agent_id: String,
    pub system_prompt: Option<SystemPrompt>,
    pub model: Arc<dyn Model>,
    pub tools: ToolRegistry,
    pub structured_output_schema: Option<(String, Value)>,
    pub force_structured_output: bool,
    pub conversation_manager: Arc<dyn ConversationManager>,
}

impl AgentOptions {
    pub fn builder(model: Arc<dyn Model>) -> AgentOptionsBuilder {
        AgentOptionsBuilder::new(model)
    }
}

/// Builder for [`AgentOptions`]. `model` is required at construction;
/// everything else defaults the way the base agent's options do: no system
/// prompt, an empty tool registry, no structured-output schema, a
/// [`NullConversationManager`].
pub struct AgentOptionsBuilder {
    agent_id: Option<String>,
    system_prompt: Option<SystemPrompt>,
    model: Arc<dyn Model>,
    tools: ToolRegistry,
    structured_output_schema: Option<(String, Value)>,
    force_structured_output: bool,
    conversation_manager: Arc<dyn ConversationManager>,
}

impl AgentOptionsBuilder {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            agent_id: None,
            system_prompt: None,
            model,
            tools: ToolRegistry::new(),
            structured_output_schema: None,
            force_structured_output: false,
            conversation_manager: Arc::new(NullConversationManager),
        }
    }

    pub fn agent_id(mut self, id: impl Into<String>) -> Self {
        self.agent_id = Some(id.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<SystemPrompt>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Declares a structured-output schema: the agent registers a
    /// [`StructuredOutputTool`] under `name` validating against `schema`,
    /// and populates `InvocationResult::structured_output` on normal
    /// termination.
    pub fn structured_output(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.structured_output_schema = Some((name.into(), schema));
        self
    }

    /// If set alongside `structured_output`, forces `tool_choice` to the
    /// structured-output tool rather than leaving tool selection to the
    /// model.
    pub fn force_structured_output(mut self, force: bool) -> Self {
        self.force_structured_output = force;
        self
    }

    pub fn conversation_manager(mut self, manager: Arc<dyn ConversationManager>) -> Self {
        self.conversation_manager = manager;
        self
    }

    pub fn build(self) -> Result<AgentOptions> {
        Ok(AgentOptions {
            agent_id: self
                .agent_id
                .unwrap_or_else(|| format!("agent-{}", crate::utils::generate_id())),
            system_prompt: self.system_prompt,
            model: self.model,
            tools: self.tools,
            structured_output_schema: self.structured_output_schema,
            force_structured_output: self.force_structured_output,
            conversation_manager: self.conversation_manager,
        })
    }
}

/// The view of an agent passed to tools and (indirectly) hooks: an id and
/// the JSON-kv `state` store. Constructed fresh per tool invocation from the
/// owning [`Agent`]'s own fields, rather than borrowed directly, so a tool
/// can't hold a live reference back into the agent across an `.await`.
pub struct AgentData {
    pub agent_id: String,
    pub state: AgentState,
}

impl AgentData {
    pub fn new(agent_id: String) -> Self {
        Self {
            agent_id,
            state: AgentState::new(),
        }
    }
}

/// Releases the agent's busy flag when dropped, including on an early
/// `?`-return from [`Agent::run_invocation`].
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The agent event loop (spec.md §4.1). Owns its message history, its
/// `AgentState` kv store, its `HookRegistry`, and its `InterruptState`.
/// Exactly one invocation may run at a time; a second concurrent attempt
/// fails fast with [`Error::ConcurrentInvocation`].
pub struct Agent {
    agent_id: String,
    model: Arc<dyn Model>,
    system_prompt: Option<SystemPrompt>,
    tools: ToolRegistry,
    structured_output_schema: Option<(String, Value)>,
    force_structured_output: bool,
    hooks: HookRegistry,
    messages: Arc<tokio::sync::Mutex<Vec<Message>>>,
    state: std::sync::Mutex<AgentState>,
    interrupt_state: std::sync::Mutex<InterruptState>,
    busy: AtomicBool,
}

impl Agent {
    pub fn new(options: AgentOptions) -> Self {
        let messages = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let mut hooks = HookRegistry::new();
        options.conversation_manager.clone().install_hooks(&mut hooks);

        Self {
            agent_id: options.agent_id,
            model: options.model,
            system_prompt: options.system_prompt,
            tools: options.tools,
            structured_output_schema: options.structured_output_schema,
            force_structured_output: options.force_structured_output,
            hooks,
            messages,
            state: std::sync::Mutex::new(AgentState::new()),
            interrupt_state: std::sync::Mutex::new(InterruptState::new()),
            busy: AtomicBool::new(false),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    /// A handle to this agent's live message list, shared with e.g. a
    /// [`crate::conversation::SummarizingConversationManager`] constructed
    /// for this agent.
    pub fn messages_handle(&self) -> Arc<tokio::sync::Mutex<Vec<Message>>> {
        self.messages.clone()
    }

    /// Snapshot of the current message history (for inspection, persistence,
    /// or tests). Cloned, not a live view.
    pub async fn messages(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    /// Replace the message history wholesale, e.g. when restoring from a
    /// session. Callers should run
    /// [`crate::conversation::repair_orphan_tool_uses`] first if the
    /// history may have been interrupted mid-tool-call.
    pub async fn restore_messages(&self, messages: Vec<Message>) {
        *self.messages.lock().await = messages;
    }

    /// Persists every message not yet recorded in `repo` for this agent's
    /// session (spec.md §6, expanded at SPEC_FULL.md §4.7). Determines the
    /// already-persisted count from `repo` itself, so calling this
    /// repeatedly after each turn only ever appends.
    pub async fn sync_session(&self, repo: &dyn SessionRepository, session_id: &str) -> Result<()> {
        let already_persisted = repo
            .list_messages(session_id, &self.agent_id, None, None)
            .await
            .map(|records| records.len())
            .unwrap_or(0);
        let snapshot = self.messages.lock().await.clone();
        for message in snapshot.into_iter().skip(already_persisted) {
            repo.create_message(session_id, &self.agent_id, message).await?;
        }
        Ok(())
    }

    /// Restores this agent's message history from `repo`: lists every
    /// persisted message in order, repairs any orphaned tool use left by an
    /// invocation that was interrupted before its result was recorded
    /// (spec.md §8 scenario 6), and installs the result as the live
    /// history. Does not consult a conversation manager's own restoration
    /// state — callers that use [`crate::conversation::SummarizingConversationManager`]
    /// should prepend what its `restore_from_session` returns themselves.
    pub async fn restore_session(&self, repo: &dyn SessionRepository, session_id: &str) -> Result<()> {
        let records = repo
            .list_messages(session_id, &self.agent_id, None, None)
            .await?;
        let mut messages: Vec<Message> = records.into_iter().map(|r| r.message).collect();
        crate::conversation::repair_orphan_tool_uses(&mut messages);
        self.restore_messages(messages).await;
        Ok(())
    }

    /// Drive one full invocation and return only the terminal result,
    /// discarding the intermediate stream items (the ergonomic entry point
    /// most callers want; [`Self::stream`] is the primitive underneath it).
    pub async fn invoke(&self, input: impl Into<AgentInput>) -> Result<InvocationResult> {
        let (_events, result) = self.run_invocation(input.into()).await;
        result
    }

    /// Drive the invocation and return every [`AgentStreamEvent`] it
    /// produced, in order. The whole invocation runs to completion before
    /// this returns; the result is a `Stream` for API symmetry with the
    /// raw model stream, not because events are delivered incrementally to
    /// the caller.
    pub async fn stream(
        &self,
        input: impl Into<AgentInput>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<AgentStreamEvent>> + Send>>> {
        let (events, result) = self.run_invocation(input.into()).await;
        result?;
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn run_invocation(
        &self,
        input: AgentInput,
    ) -> (Vec<AgentStreamEvent>, Result<InvocationResult>) {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return (Vec::new(), Err(Error::ConcurrentInvocation));
        }
        let _guard = BusyGuard(&self.busy);

        let mut events = Vec::new();
        let result = self.run_turns(input, &mut events).await;
        (events, result)
    }

    async fn prepare_input(&self, input: AgentInput) -> Result<()> {
        match input {
            AgentInput::Resume(value) => {
                let mut interrupt_state = self.interrupt_state.lock().unwrap();
                if interrupt_state.activated {
                    interrupt_state.resume(&value)?;
                    interrupt_state.deactivate();
                } else {
                    // Not actually paused: per spec.md §4.1 step 2's "else"
                    // branch, a resume-shaped input with nothing pending is
                    // just discarded rather than treated as a fresh prompt.
                    interrupt_state.deactivate();
                }
                Ok(())
            }
            AgentInput::Prompt(blocks) => {
                self.interrupt_state.lock().unwrap().deactivate();
                self.messages.lock().await.push(Message::user(blocks));
                Ok(())
            }
        }
    }

    fn call_options(&self) -> ModelCallOptions {
        let mut tool_specs = self.tools.specs();
        let mut tool_choice = ToolChoice::Auto;

        if let Some((name, schema)) = &self.structured_output_schema {
            tool_specs.push(crate::tools::ToolSpec {
                name: name.clone(),
                description: "Record the final structured output for this task.".to_string(),
                input_schema: schema.clone(),
            });
            if self.force_structured_output {
                tool_choice = ToolChoice::Tool { name: name.clone() };
            }
        }

        ModelCallOptions {
            system_prompt: self.system_prompt.clone(),
            tool_specs,
            tool_choice,
        }
    }

    /// The outer loop from spec.md §4.1: the before/after-invocation
    /// bracket around [`Self::turn_loop`], plus structured-output
    /// extraction on normal termination.
    async fn run_turns(
        &self,
        input: AgentInput,
        events: &mut Vec<AgentStreamEvent>,
    ) -> Result<InvocationResult> {
        self.prepare_input(input).await?;

        let structured_slot: StructuredOutputSlot = Arc::new(std::sync::Mutex::new(None));
        let structured_tool: Option<Arc<dyn Tool>> =
            self.structured_output_schema.as_ref().map(|(name, schema)| {
                Arc::new(StructuredOutputTool::new(
                    name.clone(),
                    schema.clone(),
                    structured_slot.clone(),
                )) as Arc<dyn Tool>
            });

        let mut before_inv = BeforeInvocationEvent {
            agent_id: self.agent_id.clone(),
        };
        self.hooks.invoke_before_invocation(&mut before_inv).await?;
        events.push(AgentStreamEvent::BeforeInvocation);

        let result = self.turn_loop(events, structured_tool.as_ref()).await;

        let mut after_inv = AfterInvocationEvent {
            agent_id: self.agent_id.clone(),
        };
        self.hooks.invoke_after_invocation(&mut after_inv).await?;
        events.push(AgentStreamEvent::AfterInvocation);

        let mut result = result?;
        if result.stop_reason != StopReason::Interrupt {
            result.structured_output = structured_slot.lock().unwrap().clone();
        }
        Ok(result)
    }

    async fn turn_loop(
        &self,
        events: &mut Vec<AgentStreamEvent>,
        structured_tool: Option<&Arc<dyn Tool>>,
    ) -> Result<InvocationResult> {
        loop {
            let mut before_model = BeforeModelCallEvent {
                agent_id: self.agent_id.clone(),
            };
            self.hooks.invoke_before_model_call(&mut before_model).await?;
            events.push(AgentStreamEvent::BeforeModelCall);

            let options = self.call_options();
            let history = self.messages.lock().await.clone();

            let call_result = self.call_model_once(&history, &options, events).await;

            let mut after_model = AfterModelCallEvent {
                agent_id: self.agent_id.clone(),
                message: None,
                stop_reason: None,
                error: None,
                retry: false,
            };

            let (assembled, stop_reason) = match call_result {
                Ok((blocks, stop_reason)) => {
                    let message = Message::assistant(blocks);
                    after_model.message = Some(message.clone());
                    after_model.stop_reason = Some(stop_reason);
                    (Some(message), Some(stop_reason))
                }
                Err(Error::MaxTokens { partial_message }) => {
                    self.hooks.invoke_after_model_call(&mut after_model).await?;
                    events.push(AgentStreamEvent::AfterModelCall);
                    return Err(Error::MaxTokens { partial_message });
                }
                Err(e) => {
                    after_model.error = Some(e);
                    (None, None)
                }
            };

            self.hooks.invoke_after_model_call(&mut after_model).await?;
            events.push(AgentStreamEvent::AfterModelCall);

            if after_model.retry {
                debug!("retrying turn for agent {} after recoverable error", self.agent_id);
                continue;
            }

            if let Some(error) = after_model.error {
                return Err(error);
            }

            let message = assembled.expect("assembled message present when no error and no retry");
            let mut stop_reason = stop_reason.expect("stop reason present alongside message");

            self.messages.lock().await.push(message.clone());
            let mut message_added = MessageAddedEvent {
                message: message.clone(),
            };
            self.hooks.invoke_message_added(&mut message_added).await?;
            for block in &message.content {
                events.push(AgentStreamEvent::ContentBlock(block.clone()));
            }

            let tool_uses: Vec<ToolUseBlock> = message.tool_uses().cloned().collect();
            if tool_uses.is_empty() {
                // Tie-break (spec.md §4.1): stopReason=toolUse with zero
                // toolUse blocks is treated as endTurn.
                if stop_reason == StopReason::ToolUse {
                    stop_reason = StopReason::EndTurn;
                }
                return Ok(InvocationResult {
                    stop_reason,
                    last_message: Some(message),
                    interrupts: Vec::new(),
                    structured_output: None,
                });
            }

            events.push(AgentStreamEvent::BeforeTools {
                message: message.clone(),
            });

            let (tool_results, new_interrupts) =
                self.run_tools(&tool_uses, structured_tool, events).await?;

            events.push(AgentStreamEvent::AfterTools {
                message: message.clone(),
            });

            if !new_interrupts.is_empty() {
                let executed: std::collections::HashSet<String> =
                    tool_results.iter().map(|r| r.tool_use_id.clone()).collect();
                let mut all_results = tool_results;
                for tu in &tool_uses {
                    if !executed.contains(tu.tool_use_id.as_str()) {
                        all_results.push(crate::types::ToolResultBlock::error(
                            tu.tool_use_id.clone(),
                            "Tool was interrupted.",
                        ));
                    }
                }
                let result_message = Message::user(
                    all_results.into_iter().map(ContentBlock::ToolResult).collect(),
                );
                self.messages.lock().await.push(result_message);
                self.interrupt_state.lock().unwrap().activate();

                return Ok(InvocationResult {
                    stop_reason: StopReason::Interrupt,
                    last_message: None,
                    interrupts: new_interrupts,
                    structured_output: None,
                });
            }

            let result_message =
                Message::user(tool_results.into_iter().map(ContentBlock::ToolResult).collect());
            self.messages.lock().await.push(result_message);
        }
    }

    async fn call_model_once(
        &self,
        history: &[Message],
        options: &ModelCallOptions,
        events: &mut Vec<AgentStreamEvent>,
    ) -> Result<(Vec<ContentBlock>, StopReason)> {
        let mut model_stream = self.model.stream(history, options).await?;
        let mut reassembler = Reassembler::new();
        let mut partial_text = String::new();

        while let Some(event) = model_stream.next().await {
            let event = event?;
            events.push(AgentStreamEvent::Model(event.clone()));

            let mut stream_hook = ModelStreamEventHook {
                agent_id: self.agent_id.clone(),
            };
            self.hooks.invoke_model_stream_event(&mut stream_hook).await?;

            if let crate::types::ModelStreamEvent::ContentBlockDelta {
                delta: crate::types::ContentBlockDelta::TextDelta { text },
                ..
            } = &event
            {
                partial_text.push_str(text);
            }

            reassembler.feed(&event);
        }

        reassembler.finish().map_err(|e| {
            if partial_text.is_empty() {
                e
            } else {
                Error::MaxTokens {
                    partial_message: Box::new(Message::assistant(vec![ContentBlock::text(
                        partial_text,
                    )])),
                }
            }
        })
    }

    /// Runs every tool use in `tool_uses`, strictly in array order (spec.md
    /// §5: sequential, never parallel). Returns the tool results produced
    /// and any interrupts raised by BeforeToolCall callbacks; an interrupted
    /// tool use is skipped (not executed) and left for the caller to fill
    /// in with a synthetic "Tool was interrupted." result.
    async fn run_tools(
        &self,
        tool_uses: &[ToolUseBlock],
        structured_tool: Option<&Arc<dyn Tool>>,
        events: &mut Vec<AgentStreamEvent>,
    ) -> Result<(Vec<crate::types::ToolResultBlock>, Vec<Interrupt>)> {
        let mut results = Vec::with_capacity(tool_uses.len());
        let mut interrupts = Vec::new();

        for tool_use in tool_uses {
            let mut before = BeforeToolCallEvent::new(self.agent_id.clone(), tool_use);
            self.hooks.invoke_before_tool_call(&mut before).await?;

            let cancel_tool = before.cancel_tool.take();
            let requests = std::mem::take(&mut before.interrupt_requests);

            let mut raised_here = false;
            for request in requests {
                let interrupt = Interrupt::new(
                    crate::utils::generate_id(),
                    request.name,
                    request.reason,
                );
                self.interrupt_state
                    .lock()
                    .unwrap()
                    .register(interrupt.clone())?;
                interrupts.push(interrupt);
                raised_here = true;
            }

            let result = if let Some(cancel_reason) = cancel_tool {
                crate::types::ToolResultBlock::error(tool_use.tool_use_id.clone(), cancel_reason)
            } else if raised_here {
                // Not executed this round; the caller synthesizes an
                // interrupted result for it (spec.md §4.1 steps g/h).
                let mut after = AfterToolCallEvent {
                    agent_id: self.agent_id.clone(),
                    tool_use_id: tool_use.tool_use_id.clone(),
                };
                self.hooks.invoke_after_tool_call(&mut after).await?;
                continue;
            } else {
                self.execute_tool(tool_use, structured_tool, events).await
            };

            let mut after = AfterToolCallEvent {
                agent_id: self.agent_id.clone(),
                tool_use_id: tool_use.tool_use_id.clone(),
            };
            self.hooks.invoke_after_tool_call(&mut after).await?;

            results.push(result);
        }

        Ok((results, interrupts))
    }

    /// Drives `tool.stream(ctx)` to completion (spec.md §4.1 step g),
    /// forwarding every `Progress`/`Log` event onto `events` and returning
    /// the terminal `ToolResultBlock`.
    async fn execute_tool(
        &self,
        tool_use: &ToolUseBlock,
        structured_tool: Option<&Arc<dyn Tool>>,
        events: &mut Vec<AgentStreamEvent>,
    ) -> crate::types::ToolResultBlock {
        let resolved: Option<Arc<dyn Tool>> = self
            .tools
            .get(&tool_use.name)
            .cloned()
            .or_else(|| structured_tool.filter(|t| t.name() == tool_use.name).cloned());

        let Some(tool) = resolved else {
            warn!("tool not found: {}", tool_use.name);
            return crate::types::ToolResultBlock::error(
                tool_use.tool_use_id.clone(),
                "tool not found",
            );
        };

        let agent_data = AgentData {
            agent_id: self.agent_id.clone(),
            state: self.state.lock().unwrap().clone(),
        };
        let ctx = ToolContext {
            agent: &agent_data,
            tool_use,
            invocation_state: std::collections::HashMap::new(),
        };

        let mut stream = tool.stream(ctx).await;
        let mut result = None;
        while let Some(event) = stream.next().await {
            match event {
                crate::tools::ToolStreamEvent::Result(r) => result = Some(r),
                other => events.push(AgentStreamEvent::ToolStream(other)),
            }
        }
        result.unwrap_or_else(|| {
            warn!("tool {} produced no terminal result", tool_use.name);
            crate::types::ToolResultBlock::error(
                tool_use.tool_use_id.clone(),
                "tool produced no result",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelCallOptions;
    use crate::types::{ContentBlockDelta, ContentBlockStart, MessageRole, ModelStreamEvent, ToolUseStart};
    use async_trait::async_trait;
    use serde_json::json;

    /// Replays a fixed program of turns: each turn is a `Vec<ModelStreamEvent>`
    /// terminated implicitly by its own `MessageStop`. Directly realizes
    /// spec.md §8's "Model program" notation.
    struct MockModel {
        turns: std::sync::Mutex<std::collections::VecDeque<Vec<ModelStreamEvent>>>,
    }

    impl MockModel {
        fn new(turns: Vec<Vec<ModelStreamEvent>>) -> Self {
            Self {
                turns: std::sync::Mutex::new(turns.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl Model for MockModel {
        async fn stream(
            &self,
            _messages: &[Message],
            _options: &ModelCallOptions,
        ) -> Result<futures::stream::BoxStream<'static, Result<ModelStreamEvent>>> {
            let turn = self
                .turns
                .lock()
                .unwrap()
                .pop_front()
                .expect("MockModel ran out of programmed turns");
            Ok(Box::pin(stream::iter(turn.into_iter().map(Ok))))
        }
    }

    fn text_turn(text: &str, stop: StopReason) -> Vec<ModelStreamEvent> {
        vec![
            ModelStreamEvent::MessageStart {
                role: MessageRole::Assistant,
            },
            ModelStreamEvent::ContentBlockStart {
                content_block_index: 0,
                start: None,
            },
            ModelStreamEvent::ContentBlockDelta {
                content_block_index: 0,
                delta: ContentBlockDelta::TextDelta {
                    text: text.to_string(),
                },
            },
            ModelStreamEvent::ContentBlockStop {
                content_block_index: 0,
            },
            ModelStreamEvent::MessageStop { stop_reason: stop },
        ]
    }

    fn tool_use_turn(name: &str, id: &str, input: Value) -> Vec<ModelStreamEvent> {
        vec![
            ModelStreamEvent::MessageStart {
                role: MessageRole::Assistant,
            },
            ModelStreamEvent::ContentBlockStart {
                content_block_index: 0,
                start: Some(ContentBlockStart::ToolUseStart(ToolUseStart {
                    name: name.to_string(),
                    tool_use_id: id.to_string(),
                })),
            },
            ModelStreamEvent::ContentBlockDelta {
                content_block_index: 0,
                delta: ContentBlockDelta::ToolUseInputDelta {
                    input: input.to_string(),
                },
            },
            ModelStreamEvent::ContentBlockStop {
                content_block_index: 0,
            },
            ModelStreamEvent::MessageStop {
                stop_reason: StopReason::ToolUse,
            },
        ]
    }

    #[tokio::test]
    async fn single_text_turn_yields_end_turn_result() {
        let model = MockModel::new(vec![text_turn("Hello", StopReason::EndTurn)]);
        let options = AgentOptions::builder(Arc::new(model)).build().unwrap();
        let agent = Agent::new(options);

        let result = agent.invoke("Hi").await.unwrap();
        assert_eq!(result.stop_reason, StopReason::EndTurn);
        assert_eq!(result.last_message.unwrap().text(), "Hello");
        assert_eq!(agent.messages().await.len(), 2);
    }

    #[tokio::test]
    async fn one_tool_call_then_end_turn() {
        let model = MockModel::new(vec![
            tool_use_turn("calc", "t1", json!({"a": 1, "b": 2})),
            text_turn("3", StopReason::EndTurn),
        ]);
        let calc = crate::tools::tool("calc", "adds two numbers")
            .handler(|ctx: ToolContext<'_>| async move {
                let a = ctx.tool_use.input["a"].as_f64().unwrap_or(0.0);
                let b = ctx.tool_use.input["b"].as_f64().unwrap_or(0.0);
                Ok(json!(a + b))
            })
            .build();
        let tools = ToolRegistry::from_tools(vec![Arc::new(calc) as Arc<dyn Tool>]).unwrap();
        let options = AgentOptions::builder(Arc::new(model))
            .tools(tools)
            .build()
            .unwrap();
        let agent = Agent::new(options);

        let result = agent.invoke("add").await.unwrap();
        assert_eq!(result.stop_reason, StopReason::EndTurn);

        let messages = agent.messages().await;
        assert_eq!(messages.len(), 4);
        let tool_result = messages[2].tool_results().next().unwrap();
        assert_eq!(tool_result.tool_use_id, "t1");
        assert!(!tool_result.is_error());
    }

    #[tokio::test]
    async fn concurrent_invocation_fails_fast() {
        let model = MockModel::new(vec![text_turn("Hello", StopReason::EndTurn)]);
        let options = AgentOptions::builder(Arc::new(model)).build().unwrap();
        let agent = Arc::new(Agent::new(options));

        agent.busy.store(true, Ordering::SeqCst);
        let err = agent.invoke("Hi").await.unwrap_err();
        assert!(matches!(err, Error::ConcurrentInvocation));
        agent.busy.store(false, Ordering::SeqCst);

        let result = agent.invoke("Hi").await.unwrap();
        assert_eq!(result.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn tool_not_found_produces_error_result_without_terminating() {
        let model = MockModel::new(vec![
            tool_use_turn("missing", "t1", json!({})),
            text_turn("done", StopReason::EndTurn),
        ]);
        let options = AgentOptions::builder(Arc::new(model)).build().unwrap();
        let agent = Agent::new(options);

        let result = agent.invoke("go").await.unwrap();
        assert_eq!(result.stop_reason, StopReason::EndTurn);
        let messages = agent.messages().await;
        let tool_result = messages[2].tool_results().next().unwrap();
        assert!(tool_result.is_error());
    }

    #[tokio::test]
    async fn interrupt_then_resume_completes_normally() {
        let model = MockModel::new(vec![
            tool_use_turn("approve_needed", "t1", json!({})),
            text_turn("ok", StopReason::EndTurn),
        ]);
        let tool = crate::tools::tool("approve_needed", "needs approval")
            .handler(|_ctx: ToolContext<'_>| async move { Ok(json!("done")) })
            .build();
        let tools = ToolRegistry::from_tools(vec![Arc::new(tool) as Arc<dyn Tool>]).unwrap();
        let options = AgentOptions::builder(Arc::new(model))
            .tools(tools)
            .build()
            .unwrap();
        let mut agent = Agent::new(options);
        agent.hooks_mut().on_before_tool_call(|event| {
            event.interrupt("approve", Some(json!("why")));
            Ok(())
        });

        let first = agent.invoke("go").await.unwrap();
        assert_eq!(first.stop_reason, StopReason::Interrupt);
        assert_eq!(first.interrupts.len(), 1);
        let id = first.interrupts[0].id.clone();

        let resume_input = json!([{"interrupt_response": {"interrupt_id": id, "response": "ok"}}]);
        let second = agent.invoke(resume_input).await.unwrap();
        assert_eq!(second.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn stream_yields_lifecycle_and_content_events() {
        let model = MockModel::new(vec![text_turn("hi", StopReason::EndTurn)]);
        let options = AgentOptions::builder(Arc::new(model)).build().unwrap();
        let agent = Agent::new(options);

        let events: Vec<AgentStreamEvent> = agent
            .stream("hello")
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert!(matches!(events.first(), Some(AgentStreamEvent::BeforeInvocation)));
        assert!(matches!(events.last(), Some(AgentStreamEvent::AfterInvocation)));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentStreamEvent::ContentBlock(ContentBlock::Text(_)))));
    }
}
