//! Lifecycle hook system for intercepting and controlling execution at key
//! points in the agent loop.
//!
//! Enables security gates, audit logging, input/output modification,
//! retry-on-overflow, and interrupt raising. Hooks are registered against a
//! typed event kind and fire in a deterministic order: registration order
//! for "before" events, reverse registration order for "after" events,
//! mirroring scope-exit semantics.

use async_trait::async_trait;
use log::trace;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{Message, StopReason, ToolUseBlock};

// ============================================================================
// HOOK EVENT TYPES
// ============================================================================

/// Fired once per invocation, before the first model call.
#[derive(Debug, Clone)]
pub struct BeforeInvocationEvent {
    pub agent_id: String,
}

/// Fired once per invocation, after the loop has terminated (normally or
/// with an interrupt), before the invocation lock is released.
#[derive(Debug, Clone)]
pub struct AfterInvocationEvent {
    pub agent_id: String,
}

/// Fired before each model call (each turn).
#[derive(Debug, Clone)]
pub struct BeforeModelCallEvent {
    pub agent_id: String,
}

/// Fired after each model call completes (successfully or with an error).
/// `retry` and `error` are mutable: a conversation manager's callback may
/// prune history and set `retry = true` to have the loop reissue the same
/// turn. `error` carries the original typed [`Error`] the model call
/// failed with, not a stringified copy — a callback that doesn't set
/// `retry` lets the agent loop re-raise it unchanged.
#[derive(Debug)]
pub struct AfterModelCallEvent {
    pub agent_id: String,
    pub message: Option<Message>,
    pub stop_reason: Option<StopReason>,
    pub error: Option<Error>,
    pub retry: bool,
}

/// Fired once per assistant message appended to history.
#[derive(Debug, Clone)]
pub struct MessageAddedEvent {
    pub message: Message,
}

/// Fired for every raw model-stream event, before reassembly.
#[derive(Debug, Clone)]
pub struct ModelStreamEventHook {
    pub agent_id: String,
}

/// One interrupt-raise request accumulated on a [`BeforeToolCallEvent`].
/// The agent loop applies these to the owning agent's `InterruptState`
/// after all callbacks for the event have run, which is what lets a
/// duplicate name across two callbacks surface as
/// [`crate::error::Error::DuplicateInterruptName`] rather than a silent
/// overwrite.
#[derive(Debug, Clone)]
pub struct InterruptRequest {
    pub name: String,
    pub reason: Option<Value>,
}

/// Fired before each tool call within a turn.
///
/// `cancel_tool`, when set by a callback, causes the agent to skip
/// execution and synthesize an error-status tool result with the given
/// message instead. A callback may also call
/// [`BeforeToolCallEvent::interrupt`] to request a cooperative pause;
/// unlike `cancel_tool` this does not stop later callbacks from running —
/// it only queues a request the agent loop resolves once every callback
/// for this event has had a chance to run.
#[derive(Debug)]
pub struct BeforeToolCallEvent<'a> {
    pub agent_id: String,
    pub tool_use: &'a ToolUseBlock,
    pub cancel_tool: Option<String>,
    pub interrupt_requests: Vec<InterruptRequest>,
}

impl<'a> BeforeToolCallEvent<'a> {
    pub fn new(agent_id: String, tool_use: &'a ToolUseBlock) -> Self {
        Self {
            agent_id,
            tool_use,
            cancel_tool: None,
            interrupt_requests: Vec::new(),
        }
    }

    /// Queue an interrupt-raise request under `name` (which must be unique
    /// within this invocation; the agent loop enforces this when applying
    /// the request to its `InterruptState`).
    pub fn interrupt(&mut self, name: impl Into<String>, reason: Option<Value>) {
        self.interrupt_requests.push(InterruptRequest {
            name: name.into(),
            reason,
        });
    }
}

/// Fired after each tool call completes (or is cancelled).
#[derive(Debug, Clone)]
pub struct AfterToolCallEvent {
    pub agent_id: String,
    pub tool_use_id: String,
}

// ============================================================================
// CALLBACK TRAITS
// ============================================================================

/// A callback registered against a specific event type. Implementations may
/// be sync logic wrapped in an async fn, or genuinely async (e.g. calling
/// out to an audit-logging service); both compose identically since the
/// registry awaits each callback before running the next.
#[async_trait]
pub trait HookCallback<E>: Send + Sync {
    async fn call(&self, event: &mut E) -> Result<()>;
}

#[async_trait]
impl<E, F> HookCallback<E> for F
where
    F: for<'a> Fn(&'a mut E) -> Result<()> + Send + Sync,
    E: Send,
{
    async fn call(&self, event: &mut E) -> Result<()> {
        (self)(event)
    }
}

/// `BeforeToolCallEvent` borrows the tool-use block, so it cannot be stored
/// behind the same `HookCallback<E>` object-safe trait as the other events
/// without a higher-ranked lifetime bound; it gets its own callback alias.
pub type BeforeToolCallFn =
    Box<dyn for<'a> Fn(&mut BeforeToolCallEvent<'a>) -> Result<()> + Send + Sync>;

/// A hook provider groups a related set of callbacks (e.g. a conversation
/// manager, a security gate) so they can be registered and removed as a
/// unit via [`HookRegistry::add_hook`] / [`HookRegistry::remove_hook`].
pub trait HookProvider {
    fn register_callbacks(&self, registry: &mut HookRegistry);
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Returned by every `on_*` registration method. Calling it removes that
/// one callback; calling it again (or after the event type was purged) is
/// a safe no-op.
pub type RemoveFn = Box<dyn Fn(&mut HookRegistry) + Send + Sync>;

/// Maps each hook-event kind to an ordered list of callbacks.
///
/// Ordering: callbacks for "before" events fire in registration order;
/// callbacks for "after" events fire in reverse registration order (LIFO),
/// mirroring scope-exit semantics. Each callback is fully awaited before the
/// next runs.
#[derive(Default)]
pub struct HookRegistry {
    before_invocation: Vec<(u64, Box<dyn HookCallback<BeforeInvocationEvent>>)>,
    after_invocation: Vec<(u64, Box<dyn HookCallback<AfterInvocationEvent>>)>,
    before_model_call: Vec<(u64, Box<dyn HookCallback<BeforeModelCallEvent>>)>,
    after_model_call: Vec<(u64, Box<dyn HookCallback<AfterModelCallEvent>>)>,
    message_added: Vec<(u64, Box<dyn HookCallback<MessageAddedEvent>>)>,
    model_stream_event: Vec<(u64, Box<dyn HookCallback<ModelStreamEventHook>>)>,
    before_tool_call: Vec<(u64, BeforeToolCallFn)>,
    after_tool_call: Vec<(u64, Box<dyn HookCallback<AfterToolCallEvent>>)>,
    next_id: u64,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn on_before_invocation(
        &mut self,
        cb: impl HookCallback<BeforeInvocationEvent> + 'static,
    ) -> RemoveFn {
        let id = self.next_id();
        self.before_invocation.push((id, Box::new(cb)));
        Box::new(move |registry: &mut HookRegistry| {
            registry.before_invocation.retain(|(i, _)| *i != id);
        })
    }

    pub fn on_after_invocation(
        &mut self,
        cb: impl HookCallback<AfterInvocationEvent> + 'static,
    ) -> RemoveFn {
        let id = self.next_id();
        self.after_invocation.push((id, Box::new(cb)));
        Box::new(move |registry: &mut HookRegistry| {
            registry.after_invocation.retain(|(i, _)| *i != id);
        })
    }

    pub fn on_before_model_call(
        &mut self,
        cb: impl HookCallback<BeforeModelCallEvent> + 'static,
    ) -> RemoveFn {
        let id = self.next_id();
        self.before_model_call.push((id, Box::new(cb)));
        Box::new(move |registry: &mut HookRegistry| {
            registry.before_model_call.retain(|(i, _)| *i != id);
        })
    }

    pub fn on_after_model_call(
        &mut self,
        cb: impl HookCallback<AfterModelCallEvent> + 'static,
    ) -> RemoveFn {
        let id = self.next_id();
        self.after_model_call.push((id, Box::new(cb)));
        Box::new(move |registry: &mut HookRegistry| {
            registry.after_model_call.retain(|(i, _)| *i != id);
        })
    }

    pub fn on_message_added(
        &mut self,
        cb: impl HookCallback<MessageAddedEvent> + 'static,
    ) -> RemoveFn {
        let id = self.next_id();
        self.message_added.push((id, Box::new(cb)));
        Box::new(move |registry: &mut HookRegistry| {
            registry.message_added.retain(|(i, _)| *i != id);
        })
    }

    pub fn on_model_stream_event(
        &mut self,
        cb: impl HookCallback<ModelStreamEventHook> + 'static,
    ) -> RemoveFn {
        let id = self.next_id();
        self.model_stream_event.push((id, Box::new(cb)));
        Box::new(move |registry: &mut HookRegistry| {
            registry.model_stream_event.retain(|(i, _)| *i != id);
        })
    }

    pub fn on_before_tool_call(
        &mut self,
        cb: impl for<'a> Fn(&mut BeforeToolCallEvent<'a>) -> Result<()> + Send + Sync + 'static,
    ) -> RemoveFn {
        let id = self.next_id();
        self.before_tool_call.push((id, Box::new(cb)));
        Box::new(move |registry: &mut HookRegistry| {
            registry.before_tool_call.retain(|(i, _)| *i != id);
        })
    }

    pub fn on_after_tool_call(
        &mut self,
        cb: impl HookCallback<AfterToolCallEvent> + 'static,
    ) -> RemoveFn {
        let id = self.next_id();
        self.after_tool_call.push((id, Box::new(cb)));
        Box::new(move |registry: &mut HookRegistry| {
            registry.after_tool_call.retain(|(i, _)| *i != id);
        })
    }

    /// Register all of `provider`'s callbacks.
    pub fn add_hook(&mut self, provider: &impl HookProvider) {
        provider.register_callbacks(self);
    }

    pub async fn invoke_before_invocation(&self, event: &mut BeforeInvocationEvent) -> Result<()> {
        trace!("dispatching BeforeInvocation for agent {}", event.agent_id);
        for (_, cb) in &self.before_invocation {
            cb.call(event).await?;
        }
        Ok(())
    }

    pub async fn invoke_after_invocation(&self, event: &mut AfterInvocationEvent) -> Result<()> {
        trace!("dispatching AfterInvocation for agent {}", event.agent_id);
        for (_, cb) in self.after_invocation.iter().rev() {
            cb.call(event).await?;
        }
        Ok(())
    }

    pub async fn invoke_before_model_call(&self, event: &mut BeforeModelCallEvent) -> Result<()> {
        trace!("dispatching BeforeModelCall for agent {}", event.agent_id);
        for (_, cb) in &self.before_model_call {
            cb.call(event).await?;
        }
        Ok(())
    }

    /// Run every `AfterModelCallEvent` callback in reverse registration
    /// order. A callback may set `event.retry = true`; later callbacks
    /// still run.
    pub async fn invoke_after_model_call(&self, event: &mut AfterModelCallEvent) -> Result<()> {
        trace!("dispatching AfterModelCall for agent {}", event.agent_id);
        for (_, cb) in self.after_model_call.iter().rev() {
            cb.call(event).await?;
        }
        Ok(())
    }

    pub async fn invoke_message_added(&self, event: &mut MessageAddedEvent) -> Result<()> {
        for (_, cb) in &self.message_added {
            cb.call(event).await?;
        }
        Ok(())
    }

    pub async fn invoke_model_stream_event(&self, event: &mut ModelStreamEventHook) -> Result<()> {
        for (_, cb) in &self.model_stream_event {
            cb.call(event).await?;
        }
        Ok(())
    }

    /// Run every `BeforeToolCallEvent` callback in registration order.
    /// Interrupt requests queued by any callback (via
    /// [`BeforeToolCallEvent::interrupt`]) are left on `event` for the
    /// agent loop to apply to its `InterruptState` after this returns.
    pub async fn invoke_before_tool_call<'a>(
        &self,
        event: &mut BeforeToolCallEvent<'a>,
    ) -> Result<()> {
        for (_, cb) in &self.before_tool_call {
            cb(event)?;
        }
        Ok(())
    }

    pub async fn invoke_after_tool_call(&self, event: &mut AfterToolCallEvent) -> Result<()> {
        for (_, cb) in self.after_tool_call.iter().rev() {
            cb.call(event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn before_events_fire_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();

        let o1 = order.clone();
        registry.on_before_invocation(move |_: &mut BeforeInvocationEvent| {
            o1.lock().unwrap().push(1);
            Ok(())
        });
        let o2 = order.clone();
        registry.on_before_invocation(move |_: &mut BeforeInvocationEvent| {
            o2.lock().unwrap().push(2);
            Ok(())
        });

        let mut event = BeforeInvocationEvent {
            agent_id: "a1".into(),
        };
        registry.invoke_before_invocation(&mut event).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn after_events_fire_in_reverse_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();

        let o1 = order.clone();
        registry.on_after_invocation(move |_: &mut AfterInvocationEvent| {
            o1.lock().unwrap().push(1);
            Ok(())
        });
        let o2 = order.clone();
        registry.on_after_invocation(move |_: &mut AfterInvocationEvent| {
            o2.lock().unwrap().push(2);
            Ok(())
        });

        let mut event = AfterInvocationEvent {
            agent_id: "a1".into(),
        };
        registry.invoke_after_invocation(&mut event).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn remove_fn_is_idempotent_and_stops_future_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::new();
        let c = calls.clone();
        let remove = registry.on_before_invocation(move |_: &mut BeforeInvocationEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut event = BeforeInvocationEvent {
            agent_id: "a1".into(),
        };
        registry.invoke_before_invocation(&mut event).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        remove(&mut registry);
        remove(&mut registry); // idempotent
        registry.invoke_before_invocation(&mut event).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn after_model_call_retry_flag_is_mutable() {
        let mut registry = HookRegistry::new();
        registry.on_after_model_call(|event: &mut AfterModelCallEvent| {
            if event.error.is_some() {
                event.retry = true;
            }
            Ok(())
        });

        let mut event = AfterModelCallEvent {
            agent_id: "a1".into(),
            message: None,
            stop_reason: None,
            error: Some(Error::ContextOverflow),
            retry: false,
        };
        registry.invoke_after_model_call(&mut event).await.unwrap();
        assert!(event.retry);
    }

    #[tokio::test]
    async fn before_tool_call_interrupt_requests_accumulate() {
        let mut registry = HookRegistry::new();
        registry.on_before_tool_call(|event| {
            event.interrupt("approve", None);
            Ok(())
        });

        let tool_use = ToolUseBlock::new("calc", "t1", serde_json::json!({}));
        let mut event = BeforeToolCallEvent::new("a1".into(), &tool_use);
        registry.invoke_before_tool_call(&mut event).await.unwrap();
        assert_eq!(event.interrupt_requests.len(), 1);
        assert_eq!(event.interrupt_requests[0].name, "approve");
    }

    #[tokio::test]
    async fn before_tool_call_cancel_is_visible_to_agent() {
        let mut registry = HookRegistry::new();
        registry.on_before_tool_call(|event| {
            event.cancel_tool = Some("not allowed".into());
            Ok(())
        });

        let tool_use = ToolUseBlock::new("calc", "t1", serde_json::json!({}));
        let mut event = BeforeToolCallEvent::new("a1".into(), &tool_use);
        registry.invoke_before_tool_call(&mut event).await.unwrap();
        assert_eq!(event.cancel_tool.as_deref(), Some("not allowed"));
    }
}
