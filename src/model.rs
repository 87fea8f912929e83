//! The model adapter contract (spec.md §6).
//!
//! A [`Model`] is anything that can turn a message history plus a set of
//! call options into a stream of [`ModelStreamEvent`]s. No concrete provider
//! (OpenAI/Bedrock/Anthropic/Gemini wire format) lives in this crate; the
//! only implementation here is the `MockModel` used by the test suite.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::{CachePointBlock, Message, ModelStreamEvent, TextBlock};

/// A system prompt may be a plain string or a sequence of blocks (allowing a
/// cache-point hint to be interleaved with static instruction text).
#[derive(Debug, Clone, PartialEq)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemPromptBlock>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemPromptBlock {
    Text(TextBlock),
    CachePoint(CachePointBlock),
}

impl From<&str> for SystemPrompt {
    fn from(s: &str) -> Self {
        SystemPrompt::Text(s.to_string())
    }
}

impl From<String> for SystemPrompt {
    fn from(s: String) -> Self {
        SystemPrompt::Text(s)
    }
}

/// Which tool, if any, the model is required to call on its next turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    Any,
    Tool {
        name: String,
    },
}

/// Call-level options passed to every `Model::stream` invocation. Adapter
/// authors are free to carry additional provider-specific parameters on
/// their own concrete options type and bridge them in here; this struct
/// holds only the fields the core agent loop itself sets.
#[derive(Debug, Clone, Default)]
pub struct ModelCallOptions {
    pub system_prompt: Option<SystemPrompt>,
    pub tool_specs: Vec<crate::tools::ToolSpec>,
    pub tool_choice: ToolChoice,
}

/// The abstract streaming contract every provider adapter must implement.
///
/// `stream` yields raw [`ModelStreamEvent`]s; reassembly into
/// [`crate::types::ContentBlock`]s and a terminal
/// [`crate::types::StopReason`] is the agent loop's job (via
/// [`crate::reassembler::Reassembler`]), not the adapter's. Adapters must
/// convert a context-window-overflow condition from the underlying provider
/// into [`crate::error::Error::ContextOverflow`]; every other failure is an
/// ordinary [`crate::error::Error::Model`].
#[async_trait]
pub trait Model: Send + Sync {
    async fn stream(
        &self,
        messages: &[Message],
        options: &ModelCallOptions,
    ) -> Result<BoxStream<'static, Result<ModelStreamEvent>>>;
}
