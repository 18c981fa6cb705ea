//! WebSocket-bridge tool provider (SPEC_FULL §4.4(c)).
//!
//! Reaches browser-resident tools: a `{event: "tool_call", ...}` message is
//! broadcast to connected sockets and the call suspends on a per-call-id
//! oneshot slot until a `{event: "tool_result", ...}` message arrives and
//! resolves it. The raw socket transport (upgrade, framing, auth) is out of
//! scope here; this type only owns the pending-call bookkeeping and the
//! dynamically-registered tool table, mirroring the pending-request map in
//! a node-oriented tool router.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sa_domain::error::{Error, Result};
use sa_domain::message::ToolDefinition;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use super::{validate_tool_schema, ToolProvider};

/// Outbound message shape sent to connected sockets to request a tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallMessage {
    pub event: &'static str,
    pub tool: String,
    pub args: Value,
    pub call_id: String,
}

struct DynamicTool {
    description: String,
    parameters: Value,
}

/// A sink used to broadcast outbound messages to connected sockets.
///
/// Kept as a trait so the bridge doesn't depend on a concrete transport
/// crate; a real deployment wires this to its own socket fan-out.
#[async_trait]
pub trait BrowserSink: Send + Sync {
    async fn broadcast(&self, message: &ToolCallMessage) -> Result<()>;
}

pub struct WebSocketProvider {
    provider_id: String,
    sink: Box<dyn BrowserSink>,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    dynamic_tools: Mutex<HashMap<String, DynamicTool>>,
    next_call_id: std::sync::atomic::AtomicU64,
}

impl WebSocketProvider {
    pub fn new(provider_id: impl Into<String>, sink: Box<dyn BrowserSink>) -> Self {
        Self {
            provider_id: provider_id.into(),
            sink,
            pending: Mutex::new(HashMap::new()),
            dynamic_tools: Mutex::new(HashMap::new()),
            next_call_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Register a browser-resident tool. Re-registering an existing name is
    /// a no-op, matching the bridge's "already registered, skipping" policy.
    pub fn register_tool(&self, name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Result<()> {
        let name = name.into();
        let description = description.into();

        let mut tools = self.dynamic_tools.lock().unwrap();
        if tools.contains_key(&name) {
            tracing::debug!(tool = %name, "tool already registered, skipping");
            return Ok(());
        }
        validate_tool_schema(&name, &description, &parameters)?;
        tools.insert(name, DynamicTool { description, parameters });
        Ok(())
    }

    /// Called by the socket handler when a `{event: "tool_result", ...}`
    /// message arrives. Resolves the waiting call, if any is still pending.
    pub fn receive_tool_result(&self, call_id: &str, result: Value) {
        let sender = self.pending.lock().unwrap().remove(call_id);
        match sender {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => {
                tracing::warn!(call_id = %call_id, "received tool_result for unknown or already-resolved call");
            }
        }
    }

    fn next_call_id(&self) -> String {
        let n = self.next_call_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("{}-{n}", self.provider_id)
    }
}

#[async_trait]
impl ToolProvider for WebSocketProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let tools = self.dynamic_tools.lock().unwrap();
        Ok(tools
            .iter()
            .map(|(name, tool)| ToolDefinition {
                name: name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            })
            .collect())
    }

    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        if !self.dynamic_tools.lock().unwrap().contains_key(tool_name) {
            return Err(Error::NotFound(format!("tool '{tool_name}' not registered on bridge")));
        }

        let call_id = self.next_call_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(call_id.clone(), tx);

        let message = ToolCallMessage {
            event: "tool_call",
            tool: tool_name.to_string(),
            args: arguments,
            call_id: call_id.clone(),
        };

        if let Err(e) = self.sink.broadcast(&message).await {
            self.pending.lock().unwrap().remove(&call_id);
            return Err(Error::TransportFailure {
                tool_name: tool_name.to_string(),
                detail: e.to_string(),
            });
        }

        match rx.await {
            Ok(result) => Ok(result),
            Err(_) => {
                self.pending.lock().unwrap().remove(&call_id);
                Err(Error::TransportFailure {
                    tool_name: tool_name.to_string(),
                    detail: "bridge closed before returning a result".into(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingSink {
        calls: std::sync::Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserSink for RecordingSink {
        async fn broadcast(&self, _message: &ToolCallMessage) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn query_schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "search text" }
            }
        })
    }

    #[tokio::test]
    async fn call_tool_suspends_until_result_arrives() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let sink = RecordingSink { calls: calls.clone() };
        let provider = std::sync::Arc::new(WebSocketProvider::new("browser", Box::new(sink)));
        provider.register_tool("search", "search the page", query_schema()).unwrap();

        let provider2 = provider.clone();
        let handle = tokio::spawn(async move {
            provider2.call_tool("search", serde_json::json!({"query": "rust"})).await
        });

        // Give the call a chance to register before resolving it.
        tokio::task::yield_now().await;
        let pending_id = {
            let pending = provider.pending.lock().unwrap();
            pending.keys().next().cloned().unwrap()
        };
        provider.receive_tool_result(&pending_id, serde_json::json!({"found": true}));

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, serde_json::json!({"found": true}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn call_tool_on_unregistered_tool_is_not_found() {
        let sink = RecordingSink { calls: std::sync::Arc::new(AtomicUsize::new(0)) };
        let provider = WebSocketProvider::new("browser", Box::new(sink));
        let err = provider.call_tool("missing", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn register_tool_rejects_invalid_schema() {
        let sink = RecordingSink { calls: std::sync::Arc::new(AtomicUsize::new(0)) };
        let provider = WebSocketProvider::new("browser", Box::new(sink));
        let bad = serde_json::json!({"type": "object", "properties": {"tags": {"type": "array"}}});
        assert!(provider.register_tool("bad", "desc", bad).is_err());
    }

    #[test]
    fn register_tool_is_idempotent_for_same_name() {
        let sink = RecordingSink { calls: std::sync::Arc::new(AtomicUsize::new(0)) };
        let provider = WebSocketProvider::new("browser", Box::new(sink));
        provider.register_tool("search", "first", query_schema()).unwrap();
        // Re-registering the same name is a no-op, not an error.
        provider.register_tool("search", "second", query_schema()).unwrap();
    }

    #[test]
    fn receive_tool_result_for_unknown_call_id_does_not_panic() {
        let sink = RecordingSink { calls: std::sync::Arc::new(AtomicUsize::new(0)) };
        let provider = WebSocketProvider::new("browser", Box::new(sink));
        provider.receive_tool_result("nonexistent", serde_json::json!(null));
    }
}
