use serde::Serialize;

/// Structured trace events emitted across the runtime (SPEC_FULL §10.1).
///
/// Emitted via `tracing::info!` as a JSON-encoded field rather than ad hoc
/// `println!`, so a subscriber can filter/index on `event`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    ToolDispatched {
        call_id: String,
        provider_id: String,
        tool_name: String,
        duration_ms: u64,
        ok: bool,
    },
    TurnCompleted {
        session_id: String,
        cycle: u32,
        tool_calls: usize,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "core_event");
    }
}
