//! # Agent Loop Core
//!
//! A production-ready, streaming-first Rust core for building agent event
//! loops: the cooperative state machine that drives a conversation between a
//! model and a set of tools, with lifecycle hooks, cooperative interrupts,
//! and context-overflow recovery.
//!
//! ## Scope
//!
//! This crate is the *core*: the agent loop, hook registry, interrupt state
//! machine, summarizing conversation manager, and a session-persistence
//! contract. It does not ship a concrete model-provider wire adapter (no
//! OpenAI/Bedrock/Anthropic/Gemini client) — callers bring their own
//! [`Model`](model::Model) implementation. The only `Model` in this crate is
//! the mock used by the test suite.
//!
//! ## Key Features
//!
//! - **Streaming-first**: raw model events, reassembled content blocks, and
//!   lifecycle markers are all exposed through one [`agent::AgentStreamEvent`]
//!   stream via [`agent::Agent::stream`].
//! - **Lifecycle hooks**: intercept and control execution before/after every
//!   model call, tool call, and the invocation as a whole.
//! - **Cooperative interrupts**: a tool-call hook can pause an invocation
//!   pending an external response, resumed with a typed payload.
//! - **Context management**: manual token estimation and history truncation,
//!   plus automatic overflow recovery via
//!   [`conversation::SummarizingConversationManager`].
//! - **Structured output**: declare a JSON-Schema-shaped result and have the
//!   agent populate it on normal termination.
//! - **Session persistence**: a [`session::SessionRepository`] contract plus
//!   a file-backed reference implementation.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use agent_loop_core::{Agent, AgentOptions};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn example(model: Arc<dyn agent_loop_core::model::Model>) -> Result<(), Box<dyn std::error::Error>> {
//! let options = AgentOptions::builder(model)
//!     .system_prompt("You are a helpful assistant")
//!     .build()?;
//! let agent = Agent::new(options);
//!
//! let result = agent.invoke("What's the capital of France?").await?;
//! println!("{:?}", result.last_message);
//!
//! // Or drive the loop and inspect every event it produced:
//! let mut events = agent.stream("And of Germany?").await?;
//! while let Some(event) = events.next().await {
//!     let _ = event?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **agent**: the event loop itself — [`agent::Agent`], its
//!   options/builder, [`agent::AgentData`]/[`crate::types::AgentState`].
//! - **types**: content blocks, messages, stream events, agent state.
//! - **model**: the model adapter contract ([`model::Model`]).
//! - **reassembler**: raw stream events → content blocks + stop reason.
//! - **tools**: the tool protocol, registry, and function-backed builder.
//! - **hooks**: the lifecycle event/callback system.
//! - **interrupt**: the cooperative pause/resume state machine.
//! - **conversation**: pluggable history restoration and overflow recovery.
//! - **structured_output**: the structured-output validation tool.
//! - **context**: manual token estimation and truncation.
//! - **session**: the session-persistence contract and file-backed reference.
//! - **config**: endpoint/model selection helpers for a caller's own adapter.
//! - **retry**: exponential backoff with jitter for adapter authors.
//! - **error**: the crate's unified error type.
//! - **utils**: internal helpers (id generation).

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// The agent event loop: [`Agent`], its options/builder, and per-invocation
/// state. The central module everything else serves.
pub mod agent;

/// Provider-agnostic endpoint/model selection helpers for a caller's own
/// `Model` adapter.
pub mod config;

/// Context window management: token estimation and history truncation.
pub mod context;

/// Pluggable conversation-history strategies: restoration and
/// context-overflow recovery.
pub mod conversation;

/// The crate's unified error type and `Result` alias.
pub mod error;

/// Lifecycle hook system for intercepting and controlling execution at key
/// points in the agent loop.
pub mod hooks;

/// Cooperative interrupt lifecycle: raising, pausing, and resuming.
pub mod interrupt;

/// The model adapter contract.
pub mod model;

/// Reassembles raw model-stream events into content blocks and a stop
/// reason.
pub mod reassembler;

/// Exponential backoff with jitter, for adapter authors.
pub mod retry;

/// Session persistence contract plus a file-backed reference
/// implementation.
pub mod session;

/// The structured-output validation tool.
pub mod structured_output;

/// Tool definition, registry, and execution.
pub mod tools;

/// Core type definitions: content blocks, messages, stream events, agent
/// state.
pub mod types;

/// Internal helpers shared across modules.
mod utils;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Agent ---

// Agent: the event loop itself. Owns message history, a JSON-kv state
// store, a hook registry, and interrupt state — construct with
// `AgentOptions::builder`.
// AgentInput: a fresh prompt or an interrupt-resume submission, built
// implicitly by `Agent::invoke`/`Agent::stream` from whatever the caller
// passes in.
// AgentData: the view of an agent passed to a running tool — its id and
// state store.
// AgentOptions/AgentOptionsBuilder: configuration for an `Agent`; `model` is
// the only required field.
// InvocationResult: the terminal outcome of one `invoke`/`stream` call —
// stop reason, last message, any interrupts raised, and structured output
// if configured.
pub use agent::{Agent, AgentData, AgentInput, AgentOptions, AgentOptionsBuilder, InvocationResult};

// --- Core Types ---

pub use types::{
    AgentState, AgentStreamEvent, CachePointBlock, CacheType, ContentBlock, ContentBlockDelta,
    ContentBlockStart, DocumentBlock, DocumentFormat, ImageBlock, ImageFormat, JsonBlock, Message,
    MessageRole, Metrics, ModelStreamEvent, ReasoningBlock, StopReason, TextBlock, ToolResultBlock,
    ToolResultContent, ToolResultStatus, ToolUseBlock, ToolUseStart, Usage, VideoBlock,
};

// --- Model adapter contract ---

pub use model::{Model, ModelCallOptions, SystemPrompt, SystemPromptBlock, ToolChoice};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Lifecycle Hooks ---

pub use hooks::{
    AfterInvocationEvent, AfterModelCallEvent, AfterToolCallEvent, BeforeInvocationEvent,
    BeforeModelCallEvent, BeforeToolCallEvent, HookCallback, HookProvider, HookRegistry,
    InterruptRequest, MessageAddedEvent, ModelStreamEventHook, RemoveFn,
};

// --- Interrupts ---

pub use interrupt::{Interrupt, InterruptState};

// --- Conversation management ---

pub use conversation::{ConversationManager, NullConversationManager, SummarizingConversationManager};

// --- Context Management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Tool System ---

pub use tools::{tool, FunctionTool, Tool, ToolBuilder, ToolContext, ToolRegistry, ToolSpec, ToolStreamEvent};

// --- Structured output ---

pub use structured_output::{StructuredOutputSlot, StructuredOutputTool};

// --- Session persistence ---

pub use session::{
    AgentRecord, FileSessionRepository, MessageRecord, SessionRecord, SessionRepository,
};

// --- Endpoint/model configuration ---

pub use config::{get_base_url, get_model, Provider};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module containing the most commonly used types and
/// functions. Import with `use agent_loop_core::prelude::*;`.
pub mod prelude {
    pub use crate::{
        tool, Agent, AgentInput, AgentOptions, AgentOptionsBuilder, ContentBlock, Error, HookRegistry,
        InvocationResult, Message, Model, Result, Tool, ToolRegistry,
    };
}
