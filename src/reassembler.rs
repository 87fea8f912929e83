//! Reassembles a raw [`ModelStreamEvent`] sequence into an ordered list of
//! [`ContentBlock`]s plus a terminal [`StopReason`].
//!
//! Providers interleave deltas for different content-block indices in
//! whatever order is convenient for them; this type buffers per-index state
//! and emits blocks in ascending index order once each is closed, regardless
//! of the arrival order of its deltas.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{
    ContentBlock, ContentBlockDelta, ContentBlockStart, MessageRole, ModelStreamEvent,
    ReasoningBlock, StopReason, TextBlock, ToolUseBlock,
};

#[derive(Debug)]
enum PartialBlock {
    Text(String),
    Reasoning(String),
    ToolUse {
        name: String,
        tool_use_id: String,
        buffer: String,
    },
}

/// Accumulates one model turn's worth of stream events. Not reusable across
/// turns: construct a fresh `Reassembler` for each `model.stream(...)` call.
#[derive(Default)]
pub struct Reassembler {
    role: Option<MessageRole>,
    blocks: BTreeMap<usize, PartialBlock>,
    closed: Vec<usize>,
    stop_reason: Option<StopReason>,
    message_start_synthesized: bool,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw stream event. Events that close or finalize state are
    /// reflected in subsequent calls to [`Self::finish`]; this method itself
    /// never fails — a malformed stream surfaces as a missing or empty
    /// result from `finish`, which the agent loop treats as `EndTurn` with
    /// no content per spec.md §4.1's tie-break.
    pub fn feed(&mut self, event: &ModelStreamEvent) {
        match event {
            ModelStreamEvent::MessageStart { role } => {
                self.role = Some(*role);
                self.message_start_synthesized = true;
            }
            ModelStreamEvent::ContentBlockStart {
                content_block_index,
                start,
            } => {
                if !self.message_start_synthesized {
                    self.role = Some(MessageRole::Assistant);
                    self.message_start_synthesized = true;
                }
                let partial = match start {
                    Some(ContentBlockStart::ToolUseStart(s)) => PartialBlock::ToolUse {
                        name: s.name.clone(),
                        tool_use_id: s.tool_use_id.clone(),
                        buffer: String::new(),
                    },
                    None => PartialBlock::Text(String::new()),
                };
                self.blocks.insert(*content_block_index, partial);
            }
            ModelStreamEvent::ContentBlockDelta {
                content_block_index,
                delta,
            } => {
                let entry = self
                    .blocks
                    .entry(*content_block_index)
                    .or_insert_with(|| match delta {
                        ContentBlockDelta::ReasoningContentDelta { .. } => {
                            PartialBlock::Reasoning(String::new())
                        }
                        _ => PartialBlock::Text(String::new()),
                    });
                match (entry, delta) {
                    (PartialBlock::Text(buf), ContentBlockDelta::TextDelta { text }) => {
                        buf.push_str(text)
                    }
                    (
                        PartialBlock::ToolUse { buffer, .. },
                        ContentBlockDelta::ToolUseInputDelta { input },
                    ) => buffer.push_str(input),
                    (
                        PartialBlock::Reasoning(buf),
                        ContentBlockDelta::ReasoningContentDelta { text },
                    ) => buf.push_str(text),
                    _ => {}
                }
            }
            ModelStreamEvent::ContentBlockStop {
                content_block_index,
            } => {
                self.closed.push(*content_block_index);
            }
            ModelStreamEvent::MessageStop { stop_reason } => {
                self.stop_reason = Some(*stop_reason);
            }
            ModelStreamEvent::Metadata { .. } => {}
        }
    }

    /// Consume the reassembler and produce the finished content blocks (in
    /// ascending index order) plus the terminal stop reason. A missing
    /// `MessageStop` defaults to `EndTurn`.
    pub fn finish(self) -> Result<(Vec<ContentBlock>, StopReason)> {
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for (_, partial) in self.blocks.into_iter() {
            blocks.push(match partial {
                PartialBlock::Text(text) => ContentBlock::Text(TextBlock::new(text)),
                PartialBlock::Reasoning(text) => {
                    ContentBlock::Reasoning(ReasoningBlock { text, signature: None })
                }
                PartialBlock::ToolUse {
                    name,
                    tool_use_id,
                    buffer,
                } => {
                    let input = if buffer.trim().is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&buffer).map_err(|e| {
                            Error::model(format!("malformed tool-use input JSON: {e}"))
                        })?
                    };
                    ContentBlock::ToolUse(ToolUseBlock::new(name, tool_use_id, input))
                }
            });
        }
        Ok((blocks, self.stop_reason.unwrap_or(StopReason::EndTurn)))
    }
}
