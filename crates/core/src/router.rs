//! Tool Router (SPEC_FULL §4.5).
//!
//! Aggregates every registered [`ToolProvider`] behind one interface the
//! Agent Loop talks to. Tool names presented to the model are prefixed
//! `<provider_id>__<tool_name>`; dispatch splits on the first `__` and
//! forwards to the owning provider.

use std::collections::HashMap;
use std::sync::Arc;

use sa_domain::error::{Error, Result};
use sa_domain::message::ToolDefinition;
use serde_json::Value;

use crate::providers::ToolProvider;

pub struct ToolRouter {
    providers: HashMap<String, Arc<dyn ToolProvider>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its own `provider_id`. A later registration
    /// with the same id replaces the earlier one.
    pub fn add_provider(&mut self, provider: Arc<dyn ToolProvider>) {
        self.providers.insert(provider.provider_id().to_string(), provider);
    }

    /// List every tool across every provider, with names prefixed
    /// `<provider_id>__<tool_name>`.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let mut out = Vec::new();
        for (provider_id, provider) in &self.providers {
            let tools = provider.list_tools().await?;
            for tool in tools {
                out.push(ToolDefinition {
                    name: format!("{provider_id}__{}", tool.name),
                    description: tool.description,
                    parameters: tool.parameters,
                });
            }
        }
        Ok(out)
    }

    /// Dispatch a prefixed tool name to its owning provider.
    pub async fn call_tool(&self, prefixed_name: &str, arguments: Value) -> Result<Value> {
        if prefixed_name.is_empty() {
            return Err(Error::Validation("tool name must not be empty".into()));
        }

        let (provider_id, tool_name) = prefixed_name.split_once("__").ok_or_else(|| {
            Error::NotFound(format!(
                "tool '{prefixed_name}' is not prefixed with a provider id"
            ))
        })?;

        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| Error::NotFound(format!("unknown provider '{provider_id}'")))?;

        provider.call_tool(tool_name, arguments).await
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::inprocess::InProcessProvider;

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "x": { "type": "integer", "description": "a number" } }
        })
    }

    async fn router_with_one_echo_tool() -> ToolRouter {
        let mut provider = InProcessProvider::new("calc");
        provider
            .register("add_one", "adds one", schema(), |args| async move {
                let x = args.get("x").and_then(Value::as_i64).unwrap_or(0);
                Ok(serde_json::json!({ "result": x + 1 }))
            })
            .unwrap();

        let mut router = ToolRouter::new();
        router.add_provider(Arc::new(provider));
        router
    }

    #[tokio::test]
    async fn lists_tools_with_provider_prefix() {
        let router = router_with_one_echo_tool().await;
        let tools = router.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "calc__add_one");
    }

    #[tokio::test]
    async fn dispatches_to_owning_provider() {
        let router = router_with_one_echo_tool().await;
        let result = router
            .call_tool("calc__add_one", serde_json::json!({"x": 41}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"result": 42}));
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let router = router_with_one_echo_tool().await;
        let err = router.call_tool("", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let router = router_with_one_echo_tool().await;
        let err = router
            .call_tool("nope__add_one", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn name_without_provider_separator_is_not_found() {
        let router = router_with_one_echo_tool().await;
        let err = router.call_tool("add_one", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
