//! Shared error taxonomy used across all crates in the workspace.
//!
//! The variants map directly onto the kinds the runtime distinguishes at
//! the propagation boundary: `ToolExecutionFailed`/`TransportFailure` are
//! converted into structured tool results and fed back to the model,
//! everything else propagates to the caller.

/// Shared error type used across all crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("assistant reply has neither content nor tool calls")]
    EmptyReply,

    #[error("tool '{tool_name}' execution failed: {detail}")]
    ToolExecutionFailed { tool_name: String, detail: String },

    #[error("transport failure ({tool_name}): {detail}")]
    TransportFailure { tool_name: String, detail: String },

    #[error("tool loop exhausted after {iterations} iterations")]
    LoopExhausted { iterations: u32 },

    #[error("cancelled")]
    Cancelled,

    #[error("session busy: a job is already running")]
    Busy,

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Encode this error as the structured tool-result payload the Agent Loop
    /// feeds back to the model when a tool call fails (SPEC_FULL §4.6, §7).
    ///
    /// Callers decide whether an error belongs on the wire this way; not every
    /// variant is meant to reach a tool result (e.g. `Busy`, `LoopExhausted`
    /// propagate to the caller instead).
    pub fn to_tool_result_json(&self) -> serde_json::Value {
        let detail = match self {
            Error::ToolExecutionFailed { detail, .. } => detail.clone(),
            Error::TransportFailure { detail, .. } => detail.clone(),
            other => other.to_string(),
        };
        serde_json::json!({
            "error": "TOOL EXECUTION FAILED",
            "detail": detail,
        })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
