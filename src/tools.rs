//! Tool definition and execution system.
//!
//! A [`Tool`] is anything polymorphic over a name, an input schema, and a
//! streamed invocation that terminates in a [`ToolResultBlock`]. Tools may
//! be function-backed (the common case, built with [`ToolBuilder`] or
//! [`tool`]), or implement [`Tool`] directly for schema-backed, external
//! (MCP), or structured-output tools.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde_json::Value;

use crate::agent::AgentData;
use crate::error::{Error, Result};
use crate::types::{ToolResultBlock, ToolUseBlock};

/// One item from a [`Tool::stream`] call. `Progress`/`Log` are purely
/// informational and may be emitted any number of times; the stream always
/// ends in exactly one `Result`, which carries the authoritative
/// [`ToolResultBlock`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolStreamEvent {
    Progress(String),
    Log(String),
    Result(ToolResultBlock),
}

/// Per-invocation context passed to a running tool.
pub struct ToolContext<'a> {
    pub agent: &'a AgentData,
    pub tool_use: &'a ToolUseBlock,
    pub invocation_state: HashMap<String, Value>,
}

/// The JSON Schema + metadata a tool advertises to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Anything that can be invoked by name with a JSON input and stream back
/// to a terminal result.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn tool_spec(&self) -> ToolSpec;

    /// Drive the tool to completion: a lazy sequence of `Progress`/`Log`
    /// events terminating in exactly one `ToolStreamEvent::Result`. Callers
    /// must drain the stream to completion to obtain the result; a
    /// non-streaming tool simply yields the one `Result` item.
    async fn stream<'a>(&'a self, ctx: ToolContext<'a>) -> BoxStream<'a, ToolStreamEvent>;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A function-backed tool built from an async closure over a validated
/// JSON input, the common case exposed through [`tool`]/[`ToolBuilder`].
pub struct FunctionTool {
    name: String,
    description: String,
    input_schema: Value,
    handler: Arc<dyn for<'a> Fn(ToolContext<'a>) -> BoxFuture<'a, Result<Value>> + Send + Sync>,
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn tool_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }

    async fn stream<'a>(&'a self, ctx: ToolContext<'a>) -> BoxStream<'a, ToolStreamEvent> {
        let tool_use_id = ctx.tool_use.tool_use_id.clone();
        let result = match (self.handler)(ctx).await {
            Ok(value) => ToolResultBlock::success(
                tool_use_id,
                vec![crate::types::ToolResultContent::Json(
                    crate::types::JsonBlock::new(value),
                )],
            ),
            Err(e) => ToolResultBlock::error(tool_use_id, e.to_string()),
        };
        Box::pin(stream::once(async move { ToolStreamEvent::Result(result) }))
    }
}

/// Builder for constructing a [`FunctionTool`] with a fluent API.
///
/// ```
/// use agent_loop_core::tools::ToolBuilder;
/// use serde_json::json;
///
/// let _calc = ToolBuilder::new("calc", "Adds two numbers")
///     .input_schema(json!({"type": "object", "properties": {"a": {"type": "number"}}}))
///     .handler(|ctx| async move {
///         let a = ctx.tool_use.input["a"].as_f64().unwrap_or(0.0);
///         let b = ctx.tool_use.input["b"].as_f64().unwrap_or(0.0);
///         Ok(json!(a + b))
///     })
///     .build();
/// ```
pub struct ToolBuilder {
    name: String,
    description: String,
    input_schema: Value,
    handler: Option<
        Arc<dyn for<'a> Fn(ToolContext<'a>) -> BoxFuture<'a, Result<Value>> + Send + Sync>,
    >,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
            handler: None,
        }
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(ToolContext<'a>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |ctx| Box::pin(f(ctx)) as BoxFuture<'_, _>));
        self
    }

    pub fn build(self) -> FunctionTool {
        FunctionTool {
            name: self.name,
            description: self.description,
            input_schema: self.input_schema,
            handler: self
                .handler
                .unwrap_or_else(|| Arc::new(|_ctx| Box::pin(async { Ok(Value::Null) }))),
        }
    }
}

/// Convenience function to start building a tool: `tool("name", "desc")`.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Name → tool mapping with O(1) lookup. Rejects duplicate names at
/// construction time (spec.md §4.6), including across flattened nested
/// groups of tools a caller assembled from multiple sources.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a flattened collection of tools, erroring on
    /// the first duplicate name encountered.
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<Self> {
        let mut registry = Self::new();
        for t in tools {
            registry.register(t)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(Error::tool_execution(format!(
                "duplicate tool name: {name}"
            )));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.tool_spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
