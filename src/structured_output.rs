//! Structured-output tool: a validation tool that stores a typed result
//! into an invocation-scoped slot.
//!
//! When an agent is configured with a structured-output schema, it
//! registers one of these as an ordinary tool, may force its selection via
//! tool choice, and on normal termination reads `Result::structured_output`
//! from the slot this tool populated.
//!
//! Validation here is deliberately lightweight structural JSON Schema
//! checking (object-ness, `required`, top-level property `type`), not a
//! full JSON Schema implementation — this catches the input shapes a model
//! actually gets wrong without pulling in a schema-validation dependency
//! the rest of the crate has no other use for.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use futures::stream::{self, BoxStream};

use crate::tools::{Tool, ToolContext, ToolSpec, ToolStreamEvent};
use crate::types::ToolResultBlock;

/// Per-invocation mutable cell the structured-output tool writes into on a
/// successful validation. Owned by the agent for the duration of one
/// invocation, not a global.
pub type StructuredOutputSlot = Arc<Mutex<Option<Value>>>;

/// A single schema-validation failure, reported with a dotted field path so
/// the model can self-repair its next attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field '{}': {}", self.field, self.message)
    }
}

/// Lightweight structural validation of `input` against `schema`: checks
/// object-ness when `schema.type == "object"`, every name in
/// `schema.required`, and the top-level `properties[*].type` declarations.
/// Nested schemas are not recursed into.
fn validate(input: &Value, schema: &Value) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let Some(schema_obj) = schema.as_object() else {
        return errors;
    };

    if let Some(Value::String(ty)) = schema_obj.get("type") {
        if ty == "object" && !input.is_object() {
            errors.push(ValidationError {
                field: "$".to_string(),
                message: "expected an object".to_string(),
            });
            return errors;
        }
    }

    let Some(input_obj) = input.as_object() else {
        return errors;
    };

    if let Some(Value::Array(required)) = schema_obj.get("required") {
        for field in required {
            if let Some(name) = field.as_str() {
                if !input_obj.contains_key(name) {
                    errors.push(ValidationError {
                        field: name.to_string(),
                        message: "required field is missing".to_string(),
                    });
                }
            }
        }
    }

    if let Some(Value::Object(properties)) = schema_obj.get("properties") {
        for (name, prop_schema) in properties {
            let (Some(value), Some(Value::String(expected))) =
                (input_obj.get(name), prop_schema.get("type"))
            else {
                continue;
            };
            if !json_type_matches(value, expected) {
                errors.push(ValidationError {
                    field: name.clone(),
                    message: format!(
                        "expected type '{expected}', got {}",
                        json_type_name(value)
                    ),
                });
            }
        }
    }

    errors
}

fn json_type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A tool whose input schema is a caller-supplied JSON Schema document.
/// Validates the raw input on invocation; on success stores it into `slot`
/// and returns a success result; on failure returns an error-status result
/// listing every field-level violation so the model can self-repair.
pub struct StructuredOutputTool {
    name: String,
    schema: Value,
    slot: StructuredOutputSlot,
}

impl StructuredOutputTool {
    pub fn new(name: impl Into<String>, schema: Value, slot: StructuredOutputSlot) -> Self {
        Self {
            name: name.into(),
            schema,
            slot,
        }
    }
}

#[async_trait]
impl Tool for StructuredOutputTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn tool_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: "Record the final structured output for this task.".to_string(),
            input_schema: self.schema.clone(),
        }
    }

    async fn stream<'a>(&'a self, ctx: ToolContext<'a>) -> BoxStream<'a, ToolStreamEvent> {
        let tool_use_id = ctx.tool_use.tool_use_id.clone();
        let input = &ctx.tool_use.input;
        let errors = validate(input, &self.schema);

        let result = if errors.is_empty() {
            *self.slot.lock().expect("structured output slot poisoned") = Some(input.clone());
            ToolResultBlock::success(tool_use_id, vec![])
        } else {
            let detail = errors
                .iter()
                .map(ValidationError::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            ToolResultBlock::error(
                tool_use_id,
                format!("Validation failed for '{}' - {detail}", self.name),
            )
        };
        Box::pin(stream::once(async move { ToolStreamEvent::Result(result) }))
    }
}
