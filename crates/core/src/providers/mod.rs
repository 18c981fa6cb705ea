//! Tool provider capability set (SPEC_FULL §4.4).
//!
//! A [`ToolProvider`] is anything the Tool Router can aggregate: an
//! in-process callable registry, an MCP child-process, or the WebSocket
//! bridge reaching browser-resident tools. The Router doesn't care which;
//! it only needs a tool list and a dispatch call.

pub mod inprocess;
pub mod websocket;

use async_trait::async_trait;
use sa_domain::error::Result;
use sa_domain::message::ToolDefinition;
use serde_json::Value;

/// A source of callable tools.
///
/// Implementations own whatever transport they need (in-process function
/// pointers, a child process's stdio, a WebSocket connection) and expose it
/// uniformly. `provider_id` becomes the Router's `<provider_id>__` prefix.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Stable identifier for this provider, used as the Router's name prefix.
    fn provider_id(&self) -> &str;

    /// List the tools this provider currently exposes.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Invoke a tool by its unprefixed name with the given JSON arguments.
    ///
    /// Returns the tool's raw JSON result. Execution failures should be
    /// surfaced as `Error::ToolExecutionFailed`/`Error::TransportFailure`,
    /// not folded into the success payload, so the Router and Agent Loop can
    /// tell a genuine tool error apart from a tool returning an error-shaped
    /// value on purpose.
    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value>;
}

/// Validates a dynamically-registered tool schema against the same rules
/// the WebSocket bridge's registration handler enforces (SPEC_FULL §4.4(c)):
/// non-empty name and description, an object-typed root schema whose
/// properties are each typed and described, and `items` present on any
/// array-typed property.
pub fn validate_tool_schema(name: &str, description: &str, schema: &Value) -> Result<()> {
    use sa_domain::error::Error;

    if name.trim().is_empty() {
        return Err(Error::Validation("tool name must not be empty".into()));
    }
    if description.trim().is_empty() {
        return Err(Error::Validation(format!(
            "tool '{name}' must have a non-empty description"
        )));
    }

    let obj = schema.as_object().ok_or_else(|| {
        Error::Validation(format!("tool '{name}' schema must be a JSON object"))
    })?;

    if obj.get("type").and_then(Value::as_str) != Some("object") {
        return Err(Error::Validation(format!(
            "tool '{name}' schema must have type: \"object\""
        )));
    }

    let properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            Error::Validation(format!("tool '{name}' schema must have a properties map"))
        })?;

    for (prop_name, prop_schema) in properties {
        let prop_obj = prop_schema.as_object().ok_or_else(|| {
            Error::Validation(format!(
                "tool '{name}' property '{prop_name}' must be a JSON object"
            ))
        })?;

        let prop_type = prop_obj.get("type").and_then(Value::as_str).ok_or_else(|| {
            Error::Validation(format!(
                "tool '{name}' property '{prop_name}' must declare a type"
            ))
        })?;

        if prop_obj
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
        {
            return Err(Error::Validation(format!(
                "tool '{name}' property '{prop_name}' must have a non-empty description"
            )));
        }

        if prop_type == "array" && !prop_obj.contains_key("items") {
            return Err(Error::Validation(format!(
                "tool '{name}' property '{prop_name}' is an array and must declare 'items'"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "file path" },
                "tags": {
                    "type": "array",
                    "description": "tags",
                    "items": { "type": "string" }
                }
            }
        })
    }

    #[test]
    fn accepts_well_formed_schema() {
        assert!(validate_tool_schema("read_file", "reads a file", &valid_schema()).is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(validate_tool_schema("", "desc", &valid_schema()).is_err());
    }

    #[test]
    fn rejects_empty_description() {
        assert!(validate_tool_schema("tool", "  ", &valid_schema()).is_err());
    }

    #[test]
    fn rejects_non_object_schema() {
        let schema = serde_json::json!({ "type": "string" });
        assert!(validate_tool_schema("tool", "desc", &schema).is_err());
    }

    #[test]
    fn rejects_array_property_missing_items() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "tags": { "type": "array", "description": "tags" }
            }
        });
        assert!(validate_tool_schema("tool", "desc", &schema).is_err());
    }

    #[test]
    fn rejects_property_missing_description() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" }
            }
        });
        assert!(validate_tool_schema("tool", "desc", &schema).is_err());
    }
}
