//! Agent Loop (SPEC_FULL §4.6): the turn state machine that drives the LLM,
//! reassembles streamed tool calls, routes them through the Tool Router, and
//! writes results back into the Message Store.
//!
//! Bounded by `max_tool_loop` (SPEC_FULL §4.6); exceeding it raises
//! `Error::LoopExhausted` with the partial turn already persisted in the
//! Store. Non-streaming and streaming paths converge on the same
//! `RawResponse` shape so the loop body above them is shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use sa_domain::config::AgentLoopConfig;
use sa_domain::error::{Error, Result};
use sa_domain::message::{Message, ToolCall, ToolCallFunction};
use sa_domain::stream::StreamEvent;
use sa_domain::trace::TraceEvent;
use sa_providers::{ChatRequest, LlmProvider};

use crate::message_store::MessageStore;
use crate::refiner::refine;
use crate::router::ToolRouter;
use crate::session_gate::SessionGate;
use crate::temporal::TemporalStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cancellation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cooperative cancellation flag checked at the loop's suspension points
/// (SPEC_FULL §5). Cheap to clone; all clones share one underlying flag.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status/event sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Generating,
    Tool,
    Done,
    Error,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    PartialAssistant,
    ToolResult,
    ToolError,
    Completed,
    Idle,
}

/// A status record emitted at the points named in SPEC_FULL §4.6.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub state: LoopState,
    pub phase: Phase,
    /// Running token estimate divided by elapsed wall time, floored to a
    /// small epsilon so a caller never divides by zero downstream.
    pub tokens_per_second: f64,
    pub detail: Option<String>,
}

/// Caller-provided sink for status events. `Send + Sync` so it can be held
/// across `.await` points in a multi-threaded runtime.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

impl<F: Fn(StatusEvent) + Send + Sync> StatusSink for F {
    fn emit(&self, event: StatusEvent) {
        self(event)
    }
}

/// A sink that discards every event, for callers that don't need progress
/// reporting.
pub struct NullSink;

impl StatusSink for NullSink {
    fn emit(&self, _event: StatusEvent) {}
}

struct RateTracker {
    started_at: Instant,
    tokens_seen: usize,
}

impl RateTracker {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            tokens_seen: 0,
        }
    }

    fn record_chars(&mut self, chars: usize) {
        self.tokens_seen += (chars / 4).max(1);
    }

    fn tokens_per_second(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64().max(1e-6);
        self.tokens_seen as f64 / elapsed
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Raw response: the shape both streaming and non-streaming paths produce
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct RawResponse {
    content: Option<String>,
    tool_calls: Vec<ToolCall>,
}

/// One in-flight tool-call reassembly slot (SPEC_FULL §4.6).
///
/// Keyed by whatever identifier the current delta carries: the real
/// `call_id` once `ToolCallStarted` has been seen, or the provider's
/// delta-index string before that. A slot is *ready* once both an id and a
/// tool name are known and the accumulated argument buffer is balanced,
/// brace-delimited JSON that parses.
struct ToolCallSlot {
    key: String,
    call_id: Option<String>,
    tool_name: Option<String>,
    args_buf: String,
}

impl ToolCallSlot {
    fn is_ready(&self) -> bool {
        if self.call_id.is_none() || self.tool_name.is_none() {
            return false;
        }
        args_look_complete(&self.args_buf)
    }

    fn finish(self) -> ToolCall {
        ToolCall {
            id: self.call_id.unwrap(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: self.tool_name.unwrap(),
                arguments: self.args_buf,
            },
        }
    }
}

fn args_look_complete(buf: &str) -> bool {
    let trimmed = buf.trim();
    if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
        return false;
    }
    serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent Loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AgentLoop {
    store: Arc<MessageStore>,
    router: Arc<ToolRouter>,
    temporal: Arc<TemporalStore>,
    provider: Arc<dyn LlmProvider>,
    config: AgentLoopConfig,
    gate: SessionGate,
    session_id: String,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<MessageStore>,
        router: Arc<ToolRouter>,
        temporal: Arc<TemporalStore>,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            store,
            router,
            temporal,
            provider,
            config,
            gate: SessionGate::new(),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Append `prompt` as a user message and run the tool-call chain to
    /// completion, returning the final assistant reply.
    ///
    /// `streaming` selects between the non-streaming (one full response per
    /// iteration) and streaming (incremental reassembly) provider path; both
    /// converge on the same loop body and Store mutations. At most one `ask`
    /// runs at a time (SPEC_FULL §4.7): a concurrent call fails immediately
    /// with `Error::Busy` rather than queuing behind the running one.
    pub async fn ask(
        &self,
        prompt: impl Into<String>,
        streaming: bool,
        cancel: &CancelToken,
        sink: &dyn StatusSink,
    ) -> Result<String> {
        let _guard = self.gate.start()?;
        let cycle = self.store.len() as u32;
        let span = tracing::info_span!("turn", session_id = %self.session_id, cycle);
        let _enter = span.enter();
        let turn_started = Instant::now();
        let mut turn_tool_calls = 0usize;

        self.store.add_user_message(prompt.into());
        sink.emit(StatusEvent {
            state: LoopState::Generating,
            phase: Phase::Start,
            tokens_per_second: 0.0,
            detail: None,
        });

        for _ in 0..self.config.max_tool_loop {
            if cancel.is_cancelled() {
                sink.emit(StatusEvent {
                    state: LoopState::Stopped,
                    phase: Phase::Idle,
                    tokens_per_second: 0.0,
                    detail: None,
                });
                return Err(Error::Cancelled);
            }

            let refined = refine(
                &self.store.get_all(),
                &self.temporal,
                self.config.token_budget_chars,
                self.config.trim_cap_chars,
            );
            let tools = self.router.list_tools().await?;
            let req = ChatRequest {
                messages: refined,
                tools,
                ..Default::default()
            };

            let raw = if streaming {
                self.stream_once(req, cancel, sink).await?
            } else {
                self.chat_once(req).await?
            };

            if raw.tool_calls.is_empty() {
                let content = raw.content.unwrap_or_default();
                if !content.is_empty() {
                    self.store.add_assistant_message(content.clone());
                }
                sink.emit(StatusEvent {
                    state: LoopState::Done,
                    phase: Phase::Completed,
                    tokens_per_second: 0.0,
                    detail: None,
                });
                TraceEvent::TurnCompleted {
                    session_id: self.session_id.clone(),
                    cycle,
                    tool_calls: turn_tool_calls,
                    duration_ms: turn_started.elapsed().as_millis() as u64,
                }
                .emit();
                return Ok(content);
            }

            turn_tool_calls += raw.tool_calls.len();

            sink.emit(StatusEvent {
                state: LoopState::Tool,
                phase: Phase::PartialAssistant,
                tokens_per_second: 0.0,
                detail: raw.content.clone(),
            });

            let results = futures_util::future::join_all(
                raw.tool_calls.iter().map(|call| self.dispatch_tool_call(call)),
            )
            .await;

            let mut tool_results = Vec::with_capacity(raw.tool_calls.len());
            for (call, result) in raw.tool_calls.iter().zip(results) {
                let (payload, phase) = match result {
                    Ok(value) => (value.to_string(), Phase::ToolResult),
                    Err(e) => (e.to_tool_result_json().to_string(), Phase::ToolError),
                };
                sink.emit(StatusEvent {
                    state: LoopState::Tool,
                    phase,
                    tokens_per_second: 0.0,
                    detail: Some(call.function.name.clone()),
                });
                // Stored full; the Refiner trims per-view against the current
                // budget/cap each time it builds a view (SPEC_FULL §4.2).
                tool_results.push((call.id.clone(), payload));
            }

            self.store.append_turn(raw.tool_calls, tool_results)?;
        }

        sink.emit(StatusEvent {
            state: LoopState::Error,
            phase: Phase::Completed,
            tokens_per_second: 0.0,
            detail: Some("loop exhausted".into()),
        });
        TraceEvent::TurnCompleted {
            session_id: self.session_id.clone(),
            cycle,
            tool_calls: turn_tool_calls,
            duration_ms: turn_started.elapsed().as_millis() as u64,
        }
        .emit();
        Err(Error::LoopExhausted {
            iterations: self.config.max_tool_loop,
        })
    }

    async fn dispatch_tool_call(&self, call: &ToolCall) -> Result<serde_json::Value> {
        let span = tracing::debug_span!("tool_call", call_id = %call.id, tool_name = %call.function.name);
        let _enter = span.enter();

        let arguments = if serde_json::from_str::<serde_json::Value>(&call.function.arguments).is_err() {
            tracing::warn!(call_id = %call.id, tool_name = %call.function.name, "malformed tool-call arguments, using empty object");
            serde_json::Value::Object(Default::default())
        } else {
            call.parsed_arguments()
        };

        let provider_id = call.function.name.split("__").next().unwrap_or_default().to_string();
        let started = Instant::now();
        let result = self.router.call_tool(&call.function.name, arguments).await;
        TraceEvent::ToolDispatched {
            call_id: call.id.clone(),
            provider_id,
            tool_name: call.function.name.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            ok: result.is_ok(),
        }
        .emit();
        result
    }

    async fn chat_once(&self, req: ChatRequest) -> Result<RawResponse> {
        let started = Instant::now();
        let resp = self.provider.chat(req).await?;
        TraceEvent::LlmRequest {
            provider: self.provider.provider_id().to_string(),
            model: resp.model.clone(),
            streaming: false,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
        }
        .emit();
        Ok(RawResponse {
            content: if resp.content.is_empty() { None } else { Some(resp.content) },
            tool_calls: resp.tool_calls,
        })
    }

    async fn stream_once(
        &self,
        req: ChatRequest,
        cancel: &CancelToken,
        sink: &dyn StatusSink,
    ) -> Result<RawResponse> {
        let requested_model = req.model.clone().unwrap_or_default();
        let started = Instant::now();
        let mut stream = self.provider.chat_stream(req).await?;
        let mut content = String::new();
        let mut slots: Vec<ToolCallSlot> = Vec::new();
        let mut ready: Vec<ToolCall> = Vec::new();
        let mut rate = RateTracker::new();
        let mut usage = None;

        while let Some(event) = stream.next().await {
            if cancel.is_cancelled() {
                sink.emit(StatusEvent {
                    state: LoopState::Stopped,
                    phase: Phase::Idle,
                    tokens_per_second: rate.tokens_per_second(),
                    detail: None,
                });
                return Err(Error::Cancelled);
            }

            match event? {
                StreamEvent::Token { text } => {
                    rate.record_chars(text.len());
                    content.push_str(&text);
                    sink.emit(StatusEvent {
                        state: LoopState::Generating,
                        phase: Phase::PartialAssistant,
                        tokens_per_second: rate.tokens_per_second(),
                        detail: Some(text),
                    });
                }
                StreamEvent::Thinking { .. } => {}
                StreamEvent::ToolCallStarted { call_id, tool_name } => {
                    if let Some(slot) = slots.iter_mut().find(|s| s.key == call_id) {
                        slot.call_id = Some(call_id.clone());
                        slot.tool_name = Some(tool_name);
                    } else {
                        slots.push(ToolCallSlot {
                            key: call_id.clone(),
                            call_id: Some(call_id),
                            tool_name: Some(tool_name),
                            args_buf: String::new(),
                        });
                    }
                }
                StreamEvent::ToolCallDelta { call_id, delta } => {
                    if let Some(slot) = slots.iter_mut().find(|s| s.key == call_id) {
                        slot.args_buf.push_str(&delta);
                    } else if slots.len() == 1 {
                        // Single in-flight call; the provider's delta index
                        // doesn't line up with the id we already captured.
                        slots[0].args_buf.push_str(&delta);
                    } else {
                        slots.push(ToolCallSlot {
                            key: call_id,
                            call_id: None,
                            tool_name: None,
                            args_buf: delta,
                        });
                    }
                }
                StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                    ready.push(ToolCall {
                        id: call_id,
                        kind: "function".to_string(),
                        function: ToolCallFunction {
                            name: tool_name,
                            arguments: arguments.to_string(),
                        },
                    });
                }
                StreamEvent::Done { usage: u, .. } => {
                    usage = u;
                    break;
                }
                StreamEvent::Error { message } => {
                    return Err(Error::Provider {
                        provider: self.provider.provider_id().to_string(),
                        message,
                    });
                }
            }

            // Move any slots that became ready into `ready`, dropping them
            // from the pending table.
            let mut i = 0;
            while i < slots.len() {
                if slots[i].is_ready() {
                    let slot = slots.remove(i);
                    ready.push(slot.finish());
                } else {
                    i += 1;
                }
            }
        }

        if !slots.is_empty() {
            tracing::warn!(count = slots.len(), "discarding unfinished tool-call slots at stream end");
        }

        TraceEvent::LlmRequest {
            provider: self.provider.provider_id().to_string(),
            model: requested_model,
            streaming: true,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: usage.as_ref().map(|u| u.completion_tokens),
        }
        .emit();

        Ok(RawResponse {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls: ready,
        })
    }
}
