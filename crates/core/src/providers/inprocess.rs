//! In-process tool provider (SPEC_FULL §4.4(a)).
//!
//! Rust has no runtime signature introspection, so unlike a dynamically
//! typed host that can derive a JSON Schema from a function's parameters,
//! registration here takes the schema explicitly and validates it with the
//! same rules the WebSocket bridge applies to dynamic registrations.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::error::{Error, Result};
use sa_domain::message::ToolDefinition;
use serde_json::Value;

use super::{validate_tool_schema, ToolProvider};

/// A boxed async tool callable.
pub type ToolFn =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: ToolFn,
}

/// A provider backed by in-process Rust callables.
///
/// Tools are registered once at startup (or dynamically, if the embedding
/// application wants runtime extensibility) and dispatched by name.
pub struct InProcessProvider {
    provider_id: String,
    tools: HashMap<String, RegisteredTool>,
}

impl InProcessProvider {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            tools: HashMap::new(),
        }
    }

    /// Register a tool with an explicit JSON Schema and handler.
    ///
    /// Fails validation per the same rules as dynamic WebSocket registration:
    /// non-empty name/description, object-typed schema, typed+described
    /// properties, `items` required on array properties.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, description: impl Into<String>, parameters: Value, handler: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let name = name.into();
        let description = description.into();
        validate_tool_schema(&name, &description, &parameters)?;

        let handler: ToolFn = Arc::new(move |args| Box::pin(handler(args)));
        self.tools.insert(
            name.clone(),
            RegisteredTool {
                definition: ToolDefinition {
                    name,
                    description,
                    parameters,
                },
                handler,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ToolProvider for InProcessProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        Ok(self.tools.values().map(|t| t.definition.clone()).collect())
    }

    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        let tool = self.tools.get(tool_name).ok_or_else(|| {
            Error::NotFound(format!("unknown tool '{tool_name}' on provider '{}'", self.provider_id))
        })?;
        (tool.handler)(arguments).await.map_err(|e| match e {
            Error::ToolExecutionFailed { .. } | Error::TransportFailure { .. } => e,
            other => Error::ToolExecutionFailed {
                tool_name: tool_name.to_string(),
                detail: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "text to echo" }
            }
        })
    }

    #[tokio::test]
    async fn registers_and_calls_a_tool() {
        let mut provider = InProcessProvider::new("local");
        provider
            .register("echo", "echoes its input", echo_schema(), |args| async move {
                Ok(args)
            })
            .unwrap();

        let tools = provider.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let result = provider
            .call_tool("echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let provider = InProcessProvider::new("local");
        let err = provider.call_tool("nope", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn rejects_invalid_schema_at_registration() {
        let mut provider = InProcessProvider::new("local");
        let bad_schema = serde_json::json!({ "type": "string" });
        let result = provider.register("broken", "desc", bad_schema, |args| async move { Ok(args) });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn handler_failure_becomes_tool_execution_failed() {
        let mut provider = InProcessProvider::new("local");
        provider
            .register("boom", "always fails", echo_schema(), |_args| async move {
                Err(Error::Other("kaboom".into()))
            })
            .unwrap();

        let err = provider.call_tool("boom", serde_json::json!({})).await.unwrap_err();
        match err {
            Error::ToolExecutionFailed { tool_name, detail } => {
                assert_eq!(tool_name, "boom");
                assert!(detail.contains("kaboom"));
            }
            other => panic!("expected ToolExecutionFailed, got {other:?}"),
        }
    }
}
