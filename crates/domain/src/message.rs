//! The conversation message model (SPEC_FULL §3).
//!
//! Deliberately flatter than a multimodal content-part union: a message
//! carries plain text content, or tool calls, or both (an assistant message
//! may emit commentary alongside a tool call batch), matching the shape the
//! chat-completion wire format (§6) already uses.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool-call request emitted by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Raw JSON text, not a parsed `Value` — the wire format transmits
    /// arguments as a string and streaming reassembly appends to it
    /// char-by-char before it is valid JSON.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Parse `arguments` as JSON. Malformed arguments are treated as an
    /// empty object per SPEC_FULL §4.6's "malformed JSON" failure mode; the
    /// caller is responsible for emitting the accompanying warning event.
    pub fn parsed_arguments(&self) -> serde_json::Value {
        serde_json::from_str(&self.function.arguments)
            .unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
    }
}

/// A tool specification advertised to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters; must be `type: object` with a
    /// `properties` map per SPEC_FULL §6.
    pub parameters: serde_json::Value,
}

/// Bookkeeping metadata carried by every message (SPEC_FULL §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMeta {
    pub id: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub cycle: u32,
}

/// A message in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub meta: MessageMeta,
}

impl Message {
    /// Character length used by the Refiner's `len(content)/4` token-budget
    /// proxy (SPEC_FULL §4.2). `content = None` counts as zero.
    pub fn content_chars(&self) -> usize {
        self.content.as_deref().map(str::len).unwrap_or(0)
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_tool(&self) -> bool {
        self.role == Role::Tool
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }
}
