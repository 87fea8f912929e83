//! Context window management: token estimation and history truncation.
//!
//! These are manual, caller-invoked utilities, not something the agent loop
//! runs automatically — automatic overflow recovery is
//! [`crate::conversation::SummarizingConversationManager`]'s job. This
//! module exists for callers who want to proactively trim history before an
//! overflow ever happens.

use crate::types::{ContentBlock, Message};

/// Characters per token used by the approximation below. This is a rough
/// average across common tokenizers (70-85% accurate per model family), not
/// a provider-specific count.
const CHARS_PER_TOKEN: f64 = 4.0;

/// Estimate the number of tokens a message history would consume, using a
/// character-based approximation (~1 token per 4 characters of serialized
/// text content). Only text-bearing blocks are counted; binary attachments
/// (image/document/video) are ignored since their token cost is
/// provider-specific.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let chars: usize = messages
        .iter()
        .flat_map(|m| &m.content)
        .map(content_block_chars)
        .sum();
    ((chars as f64) / CHARS_PER_TOKEN).ceil() as usize
}

fn content_block_chars(block: &ContentBlock) -> usize {
    match block {
        ContentBlock::Text(t) => t.text.len(),
        ContentBlock::Reasoning(r) => r.text.len(),
        ContentBlock::Json(j) => j.json.to_string().len(),
        ContentBlock::ToolUse(t) => t.input.to_string().len() + t.name.len(),
        ContentBlock::ToolResult(t) => t
            .content
            .iter()
            .map(|c| match c {
                crate::types::ToolResultContent::Text(tb) => tb.text.len(),
                crate::types::ToolResultContent::Json(jb) => jb.json.to_string().len(),
            })
            .sum(),
        ContentBlock::CachePoint(_) | ContentBlock::Image(_) | ContentBlock::Document(_) | ContentBlock::Video(_) => 0,
    }
}

/// True if `estimate_tokens(messages)` meets or exceeds `limit`.
pub fn is_approaching_limit(messages: &[Message], limit: usize) -> bool {
    estimate_tokens(messages) >= limit
}

/// Keep only the most recent `keep_turns` messages, optionally preserving a
/// leading system-role message regardless of the turn count. `keep_turns`
/// of `0` drops everything except the preserved system message, if any.
pub fn truncate_messages(
    messages: &[Message],
    keep_turns: usize,
    preserve_system: bool,
) -> Vec<Message> {
    let mut result = Vec::new();
    let mut rest: &[Message] = messages;

    if preserve_system {
        if let Some((first, tail)) = messages.split_first() {
            result.push(first.clone());
            rest = tail;
        }
    }

    let start = rest.len().saturating_sub(keep_turns);
    result.extend_from_slice(&rest[start..]);
    result
}
