//! Configuration types shared by the core runtime and its LLM/tool adapters.
//!
//! Trimmed from the gateway's much larger config surface down to what
//! SPEC_FULL actually names: agent-loop bounds, the one concrete LLM
//! provider adapter this crate ships, and MCP server wiring. Config loading
//! itself (layering defaults → file → env) lives with the demo binary; this
//! module only defines the validated shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent Loop / Refiner bounds (SPEC_FULL §10.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    /// Bound on tool-call round trips per turn (SPEC_FULL §4.6). Typical: 10.
    #[serde(default = "d_max_tool_loop")]
    pub max_tool_loop: u32,
    /// Per tool-response character cap before trimming to a temporal-memory
    /// marker (SPEC_FULL §4.2 trimming overlay).
    #[serde(default = "d_trim_cap_chars")]
    pub trim_cap_chars: usize,
    /// Approximate token budget for the Refiner's `len(content)/4` proxy.
    #[serde(default = "d_token_budget_chars")]
    pub token_budget_chars: usize,
    /// Wall-clock bound for child-process tool calls (SPEC_FULL §5).
    #[serde(default = "d_child_process_timeout_secs")]
    pub child_process_timeout_secs: u64,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_tool_loop: d_max_tool_loop(),
            trim_cap_chars: d_trim_cap_chars(),
            token_budget_chars: d_token_budget_chars(),
            child_process_timeout_secs: d_child_process_timeout_secs(),
        }
    }
}

fn d_max_tool_loop() -> u32 {
    10
}
fn d_trim_cap_chars() -> usize {
    2_000
}
fn d_token_budget_chars() -> usize {
    48_000 // ~12k tokens at the len/4 proxy
}
fn d_child_process_timeout_secs() -> u64 {
    120
}

impl AgentLoopConfig {
    /// Fail fast on an invalid config rather than silently clamping
    /// (SPEC_FULL §10.3).
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tool_loop == 0 {
            return Err("max_tool_loop must be >= 1".into());
        }
        if self.trim_cap_chars == 0 {
            return Err("trim_cap_chars must be >= 1".into());
        }
        if self.token_budget_chars == 0 {
            return Err("token_budget_chars must be >= 1".into());
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider wiring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompat,
    AzureOpenai,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Header name (e.g. "Authorization", "x-api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env or keychain).
    #[serde(default)]
    pub key: Option<String>,
    /// Keychain service name (e.g., "serialagent").
    #[serde(default)]
    pub service: Option<String>,
    /// Keychain account name (e.g., "openai-api-key").
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    Keychain,
    None,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MCP (child-process tool provider) wiring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for a single MCP server connection (SPEC_FULL §4.4(b)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique identifier for this server; becomes the Router's provider id
    /// prefix (`<id>__<tool_name>`).
    pub id: String,
    /// The command to spawn (e.g. `"npx"`).
    #[serde(default)]
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional environment variables to set on the spawned process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level aggregate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    #[serde(default)]
    pub agent_loop: AgentLoopConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.agent_loop.validate()
    }
}
