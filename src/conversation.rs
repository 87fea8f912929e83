//! Conversation managers: pluggable history-restoration and overflow
//! recovery strategies an [`crate::agent::Agent`] installs into its
//! [`HookRegistry`] at construction time (spec.md §4.4).

use async_trait::async_trait;
use log::debug;

use crate::error::Result;
use crate::hooks::{AfterModelCallEvent, HookRegistry};
use crate::model::{Model, ModelCallOptions};
use crate::types::{ContentBlock, Message, MessageRole};

/// Restoration/pruning strategy for an agent's message history. Implemented
/// by [`NullConversationManager`] (no-op) and
/// [`SummarizingConversationManager`] (context-overflow recovery). Holds no
/// back-pointer to the owning `Agent` (spec.md §9) — it receives whatever it
/// needs through hook event payloads and explicit method arguments.
///
/// `install_hooks` takes `self: Arc<Self>` rather than `&self` since the
/// summarizing variant's recovery callback is asynchronous and needs shared
/// ownership of the manager across turns, not just a borrow.
pub trait ConversationManager: Send + Sync {
    fn install_hooks(self: std::sync::Arc<Self>, registry: &mut HookRegistry);

    /// Opaque restoration state to persist alongside a session, e.g. the
    /// summary message and how many original messages it replaced.
    fn get_state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Given previously persisted state, the messages to prepend when
    /// restoring an agent (e.g. `[summaryMessage]`), or `None` if there is
    /// nothing to restore.
    fn restore_from_session(&self, _state: &serde_json::Value) -> Option<Vec<Message>> {
        None
    }
}

/// Does nothing: no restoration, no overflow recovery. The default for an
/// agent that hasn't opted into summarization.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConversationManager;

impl ConversationManager for NullConversationManager {
    fn install_hooks(self: std::sync::Arc<Self>, _registry: &mut HookRegistry) {}
}

/// Recovers from context-window overflow by summarizing a prefix of the
/// message history into a single message and asking the agent loop to retry
/// the current turn (spec.md §4.4).
///
/// Registers one `AfterModelCall` callback. When `event.error` indicates
/// `ContextOverflow`, it computes a split point, summarizes the prefix
/// (via either a dedicated summarization `Model` or a fixed system prompt
/// against the parent's own model — exactly one of the two, never both),
/// replaces the prefix in `messages` with a single summary message, and
/// sets `event.retry = true`.
pub struct SummarizingConversationManager {
    summary_ratio: f64,
    preserve_recent_messages: usize,
    summarizer: Box<dyn Model>,
    messages: std::sync::Arc<tokio::sync::Mutex<Vec<Message>>>,
    last_state: std::sync::Mutex<Option<(String, usize)>>,
}

impl SummarizingConversationManager {
    /// `summary_ratio` is clamped to `[0.1, 0.8]` (default `0.3` if
    /// `None`). `messages` is a shared handle to the agent's own message
    /// list — the manager mutates it in place when it prunes.
    pub fn new(
        summarizer: Box<dyn Model>,
        messages: std::sync::Arc<tokio::sync::Mutex<Vec<Message>>>,
        summary_ratio: Option<f64>,
        preserve_recent_messages: Option<usize>,
    ) -> Self {
        Self {
            summary_ratio: summary_ratio.unwrap_or(0.3).clamp(0.1, 0.8),
            preserve_recent_messages: preserve_recent_messages.unwrap_or(10),
            summarizer,
            messages,
            last_state: std::sync::Mutex::new(None),
        }
    }

    /// Computes the split point per spec.md §4.4 steps 1-3, walking forward
    /// to avoid breaking a ToolUse/ToolResult pair. Returns `None` if no
    /// valid split point exists (caller should re-throw the original
    /// error).
    fn split_point(&self, messages: &[Message]) -> Option<usize> {
        let total = messages.len();
        let proposed = ((total as f64) * self.summary_ratio).floor() as usize;
        let capped = proposed.min(total.saturating_sub(self.preserve_recent_messages));
        if capped == 0 {
            return None;
        }

        let mut split = capped;
        while split < total {
            let breaks_pair = messages[split].has_tool_result()
                || (messages[split].tool_uses().next().is_some()
                    && messages
                        .get(split + 1)
                        .map(|next| !next.has_tool_result())
                        .unwrap_or(true));
            if !breaks_pair {
                break;
            }
            split += 1;
        }
        if split >= total {
            None
        } else {
            Some(split)
        }
    }

    async fn summarize(&self, prefix: &[Message]) -> Result<String> {
        use futures::StreamExt;

        let mut history = prefix.to_vec();
        history.push(Message::user(vec![ContentBlock::text(
            "Please summarize this conversation.",
        )]));

        let options = ModelCallOptions {
            system_prompt: Some(
                "Summarize the conversation so far concisely, preserving any \
                 decisions, facts, or tool results a continuation would need."
                    .into(),
            ),
            ..Default::default()
        };

        let mut stream = self.summarizer.stream(&history, &options).await?;
        let mut reassembler = crate::reassembler::Reassembler::new();
        while let Some(event) = stream.next().await {
            reassembler.feed(&event?);
        }
        let (blocks, _) = reassembler.finish()?;
        Ok(blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// The `AfterModelCall` callback itself, holding a shared reference to the
/// owning manager. Registered directly (not through the sync-closure
/// blanket impl of [`crate::hooks::HookCallback`]) because recovery needs
/// to `.await` the summarization sub-call.
struct OverflowRecoveryCallback(std::sync::Arc<SummarizingConversationManager>);

#[async_trait]
impl crate::hooks::HookCallback<AfterModelCallEvent> for OverflowRecoveryCallback {
    async fn call(&self, event: &mut AfterModelCallEvent) -> Result<()> {
        let manager = &self.0;
        let is_overflow = event
            .error
            .as_ref()
            .map(crate::error::Error::is_context_overflow)
            .unwrap_or(false);
        if !is_overflow {
            return Ok(());
        }

        let mut messages = manager.messages.lock().await;
        let split = manager
            .split_point(&messages)
            .ok_or(crate::error::Error::ContextOverflow)?;
        let prefix = messages[..split].to_vec();
        let summary_text = manager.summarize(&prefix).await?;
        let removed = split;
        let mut new_messages = vec![Message::user(vec![ContentBlock::text(summary_text.clone())])];
        new_messages.extend_from_slice(&messages[split..]);
        *messages = new_messages;
        *manager.last_state.lock().unwrap() = Some((summary_text, removed));
        debug!("summarized {removed} messages into 1 after context overflow");

        event.retry = true;
        Ok(())
    }
}

impl ConversationManager for SummarizingConversationManager {
    fn install_hooks(self: std::sync::Arc<Self>, registry: &mut HookRegistry) {
        registry.on_after_model_call(OverflowRecoveryCallback(self));
    }

    fn get_state(&self) -> serde_json::Value {
        match &*self.last_state.lock().unwrap() {
            Some((summary, removed)) => serde_json::json!({
                "summary_message": summary,
                "removed_message_count": removed,
            }),
            None => serde_json::Value::Null,
        }
    }

    fn restore_from_session(&self, state: &serde_json::Value) -> Option<Vec<Message>> {
        let summary = state.get("summary_message")?.as_str()?;
        if summary.is_empty() {
            return None;
        }
        Some(vec![Message::user(vec![ContentBlock::text(summary)])])
    }
}

/// Repairs the ToolUse/ToolResult invariant after restoring a persisted
/// message history that was interrupted before a tool result was recorded
/// (spec.md §8 scenario 6): inserts a synthesized error tool result for any
/// `ToolUseBlock` in the final assistant message that has no matching
/// result in the following message.
pub fn repair_orphan_tool_uses(messages: &mut Vec<Message>) {
    let Some(last_assistant_idx) = messages
        .iter()
        .rposition(|m| m.role == MessageRole::Assistant)
    else {
        return;
    };
    let orphaned: Vec<String> = {
        let assistant = &messages[last_assistant_idx];
        let has_result_after = messages
            .get(last_assistant_idx + 1)
            .map(|next| next.has_tool_result())
            .unwrap_or(false);
        if has_result_after {
            return;
        }
        assistant
            .tool_uses()
            .map(|t| t.tool_use_id.clone())
            .collect()
    };
    if orphaned.is_empty() {
        return;
    }
    let repair = Message::user(
        orphaned
            .into_iter()
            .map(|id| {
                ContentBlock::ToolResult(crate::types::ToolResultBlock::error(
                    id,
                    "Tool was interrupted.",
                ))
            })
            .collect(),
    );
    messages.insert(last_assistant_idx + 1, repair);
}
