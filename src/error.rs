//! # Error Types for the Agent Loop Core
//!
//! This module defines all error types used throughout the crate, providing
//! comprehensive error handling with detailed context for different failure
//! scenarios.
//!
//! ## Design Philosophy
//!
//! - **Explicit Error Handling**: Uses Rust's `Result<T>` type for all fallible operations
//! - **No Silent Failures**: All errors are propagated explicitly to the caller
//! - **Rich Context**: Each error variant provides specific information about what went wrong
//! - **Easy Conversion**: Automatic conversion from common error types (serde_json)
//!
//! ## Usage
//!
//! ```ignore
//! use agent_loop_core::{Error, Result};
//!
//! fn example() -> Result<()> {
//!     if some_condition {
//!         return Err(Error::config("Invalid model name"));
//!     }
//!
//!     let json = serde_json::from_str(data)?; // Auto-converts to Error::Json
//!
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::types::Message;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Type alias for `Result<T, Error>` used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// ERROR ENUM
// ============================================================================

/// Comprehensive error type covering all failure modes described in the
/// spec's error taxonomy (§7).
///
/// This enum uses the `thiserror` crate to automatically implement
/// `std::error::Error` and provide well-formatted error messages.
#[derive(Error, Debug)]
pub enum Error {
    /// The model rejected the input as too long. Recoverable: a
    /// [`crate::conversation::ConversationManager`] may summarize the
    /// history and signal `retry = true` on the `AfterModelCall` hook.
    #[error("context window overflow")]
    ContextOverflow,

    /// The model ran out of output budget mid-message. The partial
    /// assistant message produced so far is attached and surfaced to the
    /// caller; the core never auto-retries this.
    #[error("max tokens exceeded")]
    MaxTokens { partial_message: Box<Message> },

    /// A second `invoke`/`stream` was attempted while one was already in
    /// flight on the same agent.
    #[error("an invocation is already in progress on this agent")]
    ConcurrentInvocation,

    /// The interrupt-resume input failed structural validation.
    #[error("invalid interrupt resume input: {0}")]
    InvalidInterruptResume(String),

    /// A resume response referenced an interrupt id that isn't pending.
    #[error("unknown interrupt id: {0}")]
    UnknownInterruptId(String),

    /// Two hook callbacks raised interrupts with the same name within one
    /// event.
    #[error("duplicate interrupt name: {0}")]
    DuplicateInterruptName(String),

    /// A structured-output tool's schema rejected the model's input. Not
    /// surfaced to the caller by the agent loop — converted to an
    /// error-status tool result so the model can self-repair.
    #[error("structured output validation failed: {0}")]
    ToolValidation(String),

    /// A tool's handler returned an error. Caught by the agent loop and
    /// converted to an error-status tool result; the loop continues.
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// A session-repository operation failed for reasons other than
    /// identifier validation or not-found.
    #[error("session error: {0}")]
    Session(String),

    /// An identifier passed to a session-repository operation was invalid
    /// (e.g. contained a path separator).
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A session-repository lookup found nothing for the given identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid configuration provided when building `AgentOptions`.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An unclassified error from a [`crate::model::Model`] adapter.
    #[error("model error: {0}")]
    Model(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Miscellaneous error that doesn't fit other categories.
    #[error("error: {0}")]
    Other(String),
}

// ============================================================================
// CONVENIENCE CONSTRUCTORS
// ============================================================================

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Error::Model(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Error::Session(msg.into())
    }

    pub fn invalid_identifier(msg: impl Into<String>) -> Self {
        Error::InvalidIdentifier(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Error::ToolExecution(msg.into())
    }

    pub fn tool_validation(msg: impl Into<String>) -> Self {
        Error::ToolValidation(msg.into())
    }

    pub fn invalid_interrupt_resume(msg: impl Into<String>) -> Self {
        Error::InvalidInterruptResume(msg.into())
    }

    pub fn unknown_interrupt_id(id: impl Into<String>) -> Self {
        Error::UnknownInterruptId(id.into())
    }

    pub fn duplicate_interrupt_name(name: impl Into<String>) -> Self {
        Error::DuplicateInterruptName(name.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// True if this is the recoverable context-overflow condition a
    /// conversation manager can act on.
    pub fn is_context_overflow(&self) -> bool {
        matches!(self, Error::ContextOverflow)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("Invalid model");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "invalid configuration: Invalid model");
    }

    #[test]
    fn test_error_context_overflow() {
        let err = Error::ContextOverflow;
        assert!(err.is_context_overflow());
        assert_eq!(err.to_string(), "context window overflow");
    }

    #[test]
    fn test_error_concurrent_invocation() {
        let err = Error::ConcurrentInvocation;
        assert_eq!(
            err.to_string(),
            "an invocation is already in progress on this agent"
        );
    }

    #[test]
    fn test_error_unknown_interrupt_id() {
        let err = Error::unknown_interrupt_id("abc");
        assert_eq!(err.to_string(), "unknown interrupt id: abc");
    }

    #[test]
    fn test_error_duplicate_interrupt_name() {
        let err = Error::duplicate_interrupt_name("approve");
        assert_eq!(err.to_string(), "duplicate interrupt name: approve");
    }

    #[test]
    fn test_error_tool_execution() {
        let err = Error::tool_execution("boom");
        assert!(matches!(err, Error::ToolExecution(_)));
        assert_eq!(err.to_string(), "tool execution error: boom");
    }

    #[test]
    fn test_error_tool_validation() {
        let err = Error::tool_validation("missing field 'x'");
        assert_eq!(
            err.to_string(),
            "structured output validation failed: missing field 'x'"
        );
    }

    #[test]
    fn test_error_not_found() {
        let err = Error::not_found("session s1");
        assert_eq!(err.to_string(), "not found: session s1");
    }

    #[test]
    fn test_error_invalid_identifier() {
        let err = Error::invalid_identifier("../etc/passwd");
        assert_eq!(err.to_string(), "invalid identifier: ../etc/passwd");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn _returns_result() -> Result<i32> {
            Ok(42)
        }

        fn _returns_error() -> Result<i32> {
            Err(Error::other("x"))
        }
    }
}
