//! Shared test helpers: a `Model` implementation that replays a fixed
//! program of turns, plus builders for the two turn shapes every scenario
//! needs (plain text, a single tool call).

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use agent_loop_core::{
    ContentBlockDelta, ContentBlockStart, Message, MessageRole, Model, ModelCallOptions,
    ModelStreamEvent, Result, StopReason, ToolUseStart,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde_json::Value;

/// Replays one `Vec<ModelStreamEvent>` per call to `stream`, in order.
/// Panics if asked for more turns than it was programmed with — a test bug,
/// not a runtime condition worth a `Result`.
pub struct MockModel {
    turns: Mutex<VecDeque<Vec<ModelStreamEvent>>>,
}

impl MockModel {
    pub fn new(turns: Vec<Vec<ModelStreamEvent>>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Model for MockModel {
    async fn stream(
        &self,
        _messages: &[Message],
        _options: &ModelCallOptions,
    ) -> Result<BoxStream<'static, Result<ModelStreamEvent>>> {
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockModel ran out of programmed turns");
        Ok(Box::pin(stream::iter(turn.into_iter().map(Ok))))
    }
}

/// A turn where the model just speaks.
pub fn text_turn(text: &str, stop: StopReason) -> Vec<ModelStreamEvent> {
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

/// A turn where the model calls exactly one tool.
pub fn tool_use_turn(name: &str, id: &str, input: Value) -> Vec<ModelStreamEvent> {
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

/// Like [`MockModel`], but sleeps before handing back each turn's stream —
/// long enough that a second `invoke`/`stream` on the same agent, issued
/// while the first is still running, is guaranteed to observe the busy flag.
pub struct DelayedMockModel {
    inner: MockModel,
    delay: std::time::Duration,
}

impl DelayedMockModel {
    pub fn new(turns: Vec<Vec<ModelStreamEvent>>, delay: std::time::Duration) -> Self {
        Self {
            inner: MockModel::new(turns),
            delay,
        }
    }
}

#[async_trait]
impl Model for DelayedMockModel {
    async fn stream(
        &self,
        messages: &[Message],
        options: &ModelCallOptions,
    ) -> Result<BoxStream<'static, Result<ModelStreamEvent>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.stream(messages, options).await
    }
}

/// A turn where the model calls two tools back to back, both in the same
/// assistant message (content-block indices 0 and 1).
pub fn two_tool_use_turn(calls: [(&str, &str, Value); 2]) -> Vec<ModelStreamEvent> {
    let [(name0, id0, input0), (name1, id1, input1)] = calls;
    vec![
        ModelStreamEvent::MessageStart {
            role: MessageRole::Assistant,
        },
        ModelStreamEvent::ContentBlockStart {
            content_block_index: 0,
            start: Some(ContentBlockStart::ToolUseStart(ToolUseStart {
                name: name0.to_string(),
                tool_use_id: id0.to_string(),
            })),
        },
        ModelStreamEvent::ContentBlockDelta {
            content_block_index: 0,
            delta: ContentBlockDelta::ToolUseInputDelta {
                input: input0.to_string(),
            },
        },
        ModelStreamEvent::ContentBlockStop {
            content_block_index: 0,
        },
        ModelStreamEvent::ContentBlockStart {
            content_block_index: 1,
            start: Some(ContentBlockStart::ToolUseStart(ToolUseStart {
                name: name1.to_string(),
                tool_use_id: id1.to_string(),
            })),
        },
        ModelStreamEvent::ContentBlockDelta {
            content_block_index: 1,
            delta: ContentBlockDelta::ToolUseInputDelta {
                input: input1.to_string(),
            },
        },
        ModelStreamEvent::ContentBlockStop {
            content_block_index: 1,
        },
        ModelStreamEvent::MessageStop {
            stop_reason: StopReason::ToolUse,
        },
    ]
}
