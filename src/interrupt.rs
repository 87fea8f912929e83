//! Interrupt lifecycle: raising, pausing, and resuming a cooperative
//! human-in-the-loop pause in the agent loop.
//!
//! An [`Interrupt`] is created by a hook callback during a `BeforeToolCall`
//! event, stored on the owning agent's [`InterruptState`], and surfaced to
//! the caller when the invocation terminates with `StopReason::Interrupt`.
//! The caller resumes by submitting an array of `{interrupt_id, response}`
//! pairs, which `InterruptState::resume` validates and applies.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A single cooperative pause point, keyed by a caller-assigned name that
/// must be unique within one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub id: String,
    pub name: String,
    pub reason: Option<Value>,
    pub response: Option<Value>,
}

impl Interrupt {
    pub fn new(id: impl Into<String>, name: impl Into<String>, reason: Option<Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            reason,
            response: None,
        }
    }
}

/// One element of a resume payload: `{ interrupt_response: { interrupt_id, response } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptResponseEnvelope {
    pub interrupt_response: InterruptResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptResponse {
    pub interrupt_id: String,
    pub response: Value,
}

/// True if `value` structurally matches a non-empty resume-input array, per
/// spec.md §4.1's input-detection rule. Used by the agent to decide whether
/// an `invoke`/`stream` call is a fresh prompt or a resume.
pub fn looks_like_resume_input(value: &Value) -> bool {
    match value.as_array() {
        Some(arr) if !arr.is_empty() => arr
            .iter()
            .all(|el| serde_json::from_value::<InterruptResponseEnvelope>(el.clone()).is_ok()),
        _ => false,
    }
}

/// Owns pending interrupts for one invocation, plus the `activated` flag
/// that tracks whether the agent is currently paused awaiting a resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterruptState {
    pub interrupts: HashMap<String, Interrupt>,
    pub context: HashMap<String, Value>,
    pub activated: bool,
}

impl InterruptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if any interrupt is pending without a response yet.
    pub fn has_pending(&self) -> bool {
        self.interrupts.values().any(|i| i.response.is_none())
    }

    /// Register a new interrupt. Errors if the name collides with another
    /// interrupt already registered in this invocation (spec.md §3: "Names
    /// must be unique within one invocation").
    pub fn register(&mut self, interrupt: Interrupt) -> Result<()> {
        if self.interrupts.values().any(|i| i.name == interrupt.name) {
            return Err(Error::duplicate_interrupt_name(interrupt.name));
        }
        self.interrupts.insert(interrupt.id.clone(), interrupt);
        Ok(())
    }

    /// Marks the state live; called when the agent is about to terminate
    /// the invocation with `StopReason::Interrupt`.
    pub fn activate(&mut self) {
        self.activated = true;
    }

    /// Clears interrupts and context. Called both on successful resume
    /// completion and at the start of a fresh (non-resume) invocation.
    pub fn deactivate(&mut self) {
        self.interrupts.clear();
        self.context.clear();
        self.activated = false;
    }

    /// Validates and applies a resume payload.
    ///
    /// - No-op if the state was never activated.
    /// - `input` must be a non-empty array of
    ///   `{interrupt_response: {interrupt_id, response}}` objects; any
    ///   deviation is [`Error::InvalidInterruptResume`].
    /// - Each referenced `interrupt_id` must be pending; otherwise
    ///   [`Error::UnknownInterruptId`].
    /// - The raw input is stashed in `context["responses"]` for downstream
    ///   inspection.
    pub fn resume(&mut self, input: &Value) -> Result<()> {
        if !self.activated {
            return Ok(());
        }

        let arr = input
            .as_array()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                Error::invalid_interrupt_resume(
                    "resume input must be a non-empty array of interrupt responses",
                )
            })?;

        let mut envelopes = Vec::with_capacity(arr.len());
        for el in arr {
            let envelope: InterruptResponseEnvelope =
                serde_json::from_value(el.clone()).map_err(|e| {
                    Error::invalid_interrupt_resume(format!(
                        "each element must be {{interrupt_response: {{interrupt_id, response}}}}: {e}"
                    ))
                })?;
            envelopes.push(envelope);
        }

        for envelope in &envelopes {
            let id = &envelope.interrupt_response.interrupt_id;
            let interrupt = self
                .interrupts
                .get_mut(id)
                .ok_or_else(|| Error::unknown_interrupt_id(id.clone()))?;
            interrupt.response = Some(envelope.interrupt_response.response.clone());
        }

        self.context
            .insert("responses".to_string(), input.clone());
        Ok(())
    }

    /// Serialize to the on-the-wire dict shape used by session persistence.
    pub fn to_dict(&self) -> Value {
        serde_json::to_value(self).expect("InterruptState is always serializable")
    }

    /// Reconstruct from the dict shape produced by [`Self::to_dict`].
    pub fn from_dict(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(Error::from)
    }
}
