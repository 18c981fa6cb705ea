//! Thin driver that wires the core crate end-to-end: loads `CoreConfig`,
//! stands up a Message Store / Tool Router / Temporal Store / Agent Loop,
//! registers a couple of in-process demo tools, and drives them from a
//! line-oriented REPL. Carries none of the core's invariants itself — it's
//! the "CLI surface" the core crate explicitly leaves out of scope.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sa_core::agent_loop::{AgentLoop, CancelToken, LoopState, Phase, StatusEvent, StatusSink};
use sa_core::message_store::MessageStore;
use sa_core::providers::inprocess::InProcessProvider;
use sa_core::router::ToolRouter;
use sa_core::temporal::{TemporalMemoryProvider, TemporalStore};
use sa_domain::capability::LlmCapabilities;
use sa_domain::config::CoreConfig;
use sa_domain::error::Result as DResult;
use sa_domain::stream::{BoxStream, StreamEvent};
use sa_mcp_client::McpManager;
use sa_providers::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider, OpenAiCompatProvider};

#[derive(Parser)]
#[command(name = "sa-core-demo", about = "REPL driver for the agent orchestration core")]
struct Cli {
    /// Path to a CoreConfig TOML file. Falls back to `SA_CONFIG` then to defaults.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid config: {e}"))?;

    let store = Arc::new(MessageStore::new());
    store.set_system_message(
        "You are a terse demo assistant. Use tools when they help answer the question.",
    );

    let temporal = Arc::new(TemporalStore::new());

    let mut router = ToolRouter::new();
    router.add_provider(Arc::new(demo_tools_provider()));
    router.add_provider(Arc::new(TemporalMemoryProvider::new(temporal.clone())));

    if !config.mcp_servers.is_empty() {
        let mcp = McpManager::from_config(&config.mcp_servers, config.agent_loop.child_process_timeout_secs).await;
        tracing::info!(servers = mcp.server_count(), tools = mcp.tool_count(), "MCP tools ready");
        router.add_provider(Arc::new(mcp));
    }

    let provider: Arc<dyn LlmProvider> = match config.providers.first() {
        Some(provider_cfg) => {
            tracing::info!(provider_id = %provider_cfg.id, "using configured LLM provider");
            Arc::new(OpenAiCompatProvider::from_config(provider_cfg).context("initializing LLM provider")?)
        }
        None => {
            tracing::warn!("no LLM provider configured — using the echo demo provider");
            Arc::new(EchoProvider::default())
        }
    };

    let agent = AgentLoop::new(provider, store, Arc::new(router), temporal, config.agent_loop);

    run_repl(&agent).await
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Load `CoreConfig` from `--config`, then `SA_CONFIG`, then a local
/// `core.toml`, falling back to defaults if none exist — the same
/// env-var-then-file-then-default layering the gateway's CLI uses.
fn load_config(explicit_path: Option<String>) -> anyhow::Result<CoreConfig> {
    let path = explicit_path
        .or_else(|| std::env::var("SA_CONFIG").ok())
        .unwrap_or_else(|| "core.toml".into());

    if std::path::Path::new(&path).exists() {
        let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {path}"))
    } else {
        Ok(CoreConfig::default())
    }
}

fn demo_tools_provider() -> InProcessProvider {
    let mut provider = InProcessProvider::new("demo");
    provider
        .register(
            "now",
            "returns the current UTC time as an ISO-8601 string",
            serde_json::json!({"type": "object", "properties": {}}),
            |_args| async move {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                Ok(serde_json::json!({ "unix_time": now }))
            },
        )
        .expect("well-formed schema");
    provider
        .register(
            "add",
            "adds two numbers",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "a": { "type": "number", "description": "first addend" },
                    "b": { "type": "number", "description": "second addend" }
                }
            }),
            |args| async move {
                let a = args.get("a").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
                let b = args.get("b").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
                Ok(serde_json::json!({ "sum": a + b }))
            },
        )
        .expect("well-formed schema");
    provider
}

/// Sink that prints a short line per status event, for a human watching the REPL.
struct ReplSink;

impl StatusSink for ReplSink {
    fn emit(&self, event: StatusEvent) {
        match (event.state, event.phase) {
            (LoopState::Tool, Phase::PartialAssistant) => {
                if let Some(detail) = &event.detail {
                    println!("  [assistant] {detail}");
                }
            }
            (LoopState::Tool, Phase::ToolResult) => {
                println!("  [tool ok] {}", event.detail.unwrap_or_default());
            }
            (LoopState::Tool, Phase::ToolError) => {
                println!("  [tool error] {}", event.detail.unwrap_or_default());
            }
            (LoopState::Stopped, _) => println!("  [stopped]"),
            (LoopState::Error, _) => println!("  [error] {}", event.detail.unwrap_or_default()),
            _ => {}
        }
    }
}

async fn run_repl(agent: &AgentLoop) -> anyhow::Result<()> {
    let mut rl = rustyline::DefaultEditor::new().context("initializing line editor")?;
    println!("sa-core-demo ready. Type a message, or :quit to exit.");

    loop {
        let line = match rl.readline("> ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(e) => return Err(e).context("reading input"),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == ":quit" || trimmed == ":q" {
            break;
        }
        let _ = rl.add_history_entry(trimmed);

        let cancel = CancelToken::new();
        match agent.ask(trimmed, false, &cancel, &ReplSink).await {
            Ok(answer) => println!("{answer}"),
            Err(e) => println!("error: {e}"),
        }
    }

    Ok(())
}

/// A provider that echoes the last user message back, used when no real LLM
/// provider is configured. Never calls a tool; exists so the REPL is usable
/// without network access or an API key.
#[derive(Default)]
struct EchoProvider {
    capabilities: LlmCapabilities,
}

#[async_trait]
impl LlmProvider for EchoProvider {
    async fn chat(&self, req: ChatRequest) -> DResult<ChatResponse> {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatResponse {
            content: format!("echo: {last_user}"),
            tool_calls: vec![],
            usage: None,
            model: "echo".into(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(&self, _req: ChatRequest) -> DResult<BoxStream<'static, DResult<StreamEvent>>> {
        Err(sa_domain::error::Error::Other(
            "EchoProvider does not support streaming".into(),
        ))
    }

    async fn embeddings(&self, _req: EmbeddingsRequest) -> DResult<EmbeddingsResponse> {
        Err(sa_domain::error::Error::Other(
            "EchoProvider does not support embeddings".into(),
        ))
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        "echo"
    }
}
