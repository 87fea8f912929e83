//! Core type definitions for messages, content blocks, and stream events.
//!
//! Everything in this module is immutable once constructed: a [`ContentBlock`]
//! is built once (by the model reassembler, by a tool, or by the caller) and
//! never mutated in place afterwards. Builders return new values rather than
//! exposing `&mut` setters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// CONTENT BLOCKS
// ============================================================================

/// A single unit of content inside a [`Message`].
///
/// Content blocks are tagged by variant; the agent loop, tools, and the
/// reassembler all pattern-match on this enum rather than on a free-form
/// JSON value, so a malformed block is a compile error rather than a
/// runtime surprise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    Reasoning(ReasoningBlock),
    CachePoint(CachePointBlock),
    Json(JsonBlock),
    Image(ImageBlock),
    Document(DocumentBlock),
    Video(VideoBlock),
}

impl ContentBlock {
    /// Convenience constructor for a plain text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextBlock::new(text))
    }

    /// Returns the `toolUseId` this block carries, if it is a tool-use or
    /// tool-result block.
    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolUse(b) => Some(&b.tool_use_id),
            ContentBlock::ToolResult(b) => Some(&b.tool_use_id),
            _ => None,
        }
    }
}

/// Plain text generated by the model or supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A request from the model to invoke a named tool with a JSON input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub name: String,
    pub tool_use_id: String,
    pub input: Value,
}

impl ToolUseBlock {
    pub fn new(name: impl Into<String>, tool_use_id: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            tool_use_id: tool_use_id.into(),
            input,
        }
    }
}

/// Outcome of executing a tool, always carried in a `user`-role message.
///
/// Invariant (spec.md §3): a `ToolResultBlock` always references an earlier
/// `ToolUseBlock.tool_use_id` from an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub status: ToolResultStatus,
    pub content: Vec<ToolResultContent>,
}

impl ToolResultBlock {
    pub fn success(tool_use_id: impl Into<String>, content: Vec<ToolResultContent>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            status: ToolResultStatus::Success,
            content,
        }
    }

    pub fn error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            status: ToolResultStatus::Error,
            content: vec![ToolResultContent::Text(TextBlock::new(message))],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, ToolResultStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// A tool result may carry text or arbitrary structured JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultContent {
    Text(TextBlock),
    Json(JsonBlock),
}

/// Model "thinking" content, optionally accompanied by a provider signature
/// used to verify the reasoning wasn't tampered with across turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningBlock {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Marks a point in the message history the provider should cache up to,
/// as a prompt-caching hint. Carries no content of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePointBlock {
    pub cache_type: CacheType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    Default,
    Ephemeral,
}

/// Arbitrary structured JSON content, used inside tool results and as a
/// standalone block when a model or tool needs to emit non-text data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonBlock {
    pub json: Value,
}

impl JsonBlock {
    pub fn new(json: Value) -> Self {
        Self { json }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

/// An image attachment. Holds raw bytes plus a format tag; converting this
/// to a specific provider's wire representation (data URI, `image_url`
/// object, etc.) is the adapter's job, not the core's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl ImageBlock {
    pub fn new(format: ImageFormat, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Txt,
    Html,
    Csv,
    Docx,
}

/// A document attachment (PDF, plain text, etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBlock {
    pub name: String,
    pub format: DocumentFormat,
    pub bytes: Vec<u8>,
}

/// A video attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoBlock {
    pub format: String,
    pub bytes: Vec<u8>,
}

// ============================================================================
// MESSAGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single turn in a conversation: a role plus an ordered sequence of
/// content blocks.
///
/// Invariant (spec.md §3): every `ToolUseBlock` in an assistant message is
/// eventually followed by a user message containing a matching
/// `ToolResultBlock`, or by a synthetic interrupted/error result inserted
/// during recovery. The agent loop is responsible for maintaining this
/// invariant; `Message` itself does not enforce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn new(role: MessageRole, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// All `ToolUseBlock`s in this message, in order.
    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUseBlock> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse(t) => Some(t),
            _ => None,
        })
    }

    /// All `ToolResultBlock`s in this message, in order.
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResultBlock> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolResult(t) => Some(t),
            _ => None,
        })
    }

    /// True if this message contains at least one tool result.
    pub fn has_tool_result(&self) -> bool {
        self.tool_results().next().is_some()
    }

    /// Concatenated text of all `TextBlock`s in the message, joined with
    /// newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// STOP REASON
// ============================================================================

/// Why the model (or the agent, for `Interrupt`) stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    GuardrailIntervened,
    ContentFiltered,
    /// Synthesized by the agent when an invocation terminates pending an
    /// interrupt resume; never produced by a model adapter.
    Interrupt,
}

// ============================================================================
// MODEL STREAM EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseStart {
    pub name: String,
    pub tool_use_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentBlockStart {
    ToolUseStart(ToolUseStart),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockDelta {
    TextDelta { text: String },
    ToolUseInputDelta { input: String },
    ReasoningContentDelta { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub latency_ms: u64,
}

/// Raw events yielded by a [`crate::model::Model`] adapter, before
/// reassembly into [`ContentBlock`]s. This is the wire-agnostic shape every
/// provider adapter must map its own stream format onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelStreamEvent {
    MessageStart {
        role: MessageRole,
    },
    ContentBlockStart {
        content_block_index: usize,
        start: Option<ContentBlockStart>,
    },
    ContentBlockDelta {
        content_block_index: usize,
        delta: ContentBlockDelta,
    },
    ContentBlockStop {
        content_block_index: usize,
    },
    MessageStop {
        stop_reason: StopReason,
    },
    Metadata {
        usage: Option<Usage>,
        metrics: Option<Metrics>,
    },
}

// ============================================================================
// AGENT STREAM EVENTS
// ============================================================================

/// Everything the agent loop can yield on its public stream: raw model
/// events (forwarded verbatim), fully reassembled content blocks, forwarded
/// tool progress/log events, and the six lifecycle markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Model(ModelStreamEvent),
    ContentBlock(ContentBlock),
    BeforeInvocation,
    AfterInvocation,
    BeforeModelCall,
    AfterModelCall,
    BeforeTools { message: Message },
    AfterTools { message: Message },
    ToolStream(crate::tools::ToolStreamEvent),
}

// ============================================================================
// AGENT STATE
// ============================================================================

/// JSON-serializable key/value store owned exclusively by the agent.
/// `get`/`set` both deep-copy (via `Value::clone`, which is a structural
/// copy for `serde_json::Value`), so a caller mutating a retrieved value
/// never affects the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    data: HashMap<String, Value>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a deep copy of the value stored under `key`, or `Value::Null`
    /// if absent.
    ///
    /// `key` must be `Some`: per spec, a `None` key throws rather than
    /// returning the whole store.
    pub fn get(&self, key: Option<&str>) -> Result<Value> {
        match key {
            None => Err(Error::invalid_input("AgentState.get requires a key")),
            Some(k) => Ok(self.data.get(k).cloned().unwrap_or(Value::Null)),
        }
    }

    /// Stores a deep copy of `value` under `key`.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        self.data.insert(key.into(), value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }
}
