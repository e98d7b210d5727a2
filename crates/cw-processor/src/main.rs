//! cmdweave: resolve natural-language operator commands from stdin.
//!
//! One input line in, one JSON object (resolution + execution) out.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use cw_protocol::Intent;
use cw_providers::{ProviderProxy, build_providers};
use cw_reasoning::{Reasoner, ReasoningEngine};
use cw_rules::RuleExtractor;

use cw_processor::{AppConfig, AskHandler, CommandProcessor, HandlerRegistry, HistoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cmdweave starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    tracing::info!(
        mode = ?config.ai.mode,
        use_ai = config.nlp.use_ai,
        max_history = config.nlp.max_history,
        "config loaded"
    );

    // ── Providers ───────────────────────────────────────────────
    let providers = build_providers(&config.ai).await;
    let proxy = Arc::new(ProviderProxy::connect(providers, config.ai.proxy_settings()).await);
    let available = proxy
        .list_providers()
        .iter()
        .filter(|p| p.available)
        .count();
    tracing::info!(available, "provider proxy ready");

    let reasoner: Option<Arc<dyn Reasoner>> = if config.nlp.use_ai || available > 0 {
        Some(Arc::new(ReasoningEngine::new(proxy.clone())))
    } else {
        tracing::info!("no AI provider available, rule-based resolution only");
        None
    };

    // ── History ─────────────────────────────────────────────────
    let history = match config.nlp.resolved_history_path() {
        Some(path) => HistoryStore::open(path, config.nlp.max_history),
        None => {
            tracing::warn!("no home directory, history kept in memory");
            HistoryStore::in_memory(config.nlp.max_history)
        }
    };

    // ── Handlers ────────────────────────────────────────────────
    let ask = Arc::new(AskHandler::new(proxy.clone()));
    let mut handlers = HandlerRegistry::new();
    handlers.register_prefix("query", ask.clone());
    handlers.register_intent(Intent::Query, ask);

    let processor = CommandProcessor::new(
        Box::new(RuleExtractor::new()),
        reasoner,
        history,
        config.nlp.processor_settings(),
    )
    .with_handlers(handlers);

    tracing::info!("cmdweave ready");

    // ── Input loop ──────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let (resolution, execution) = processor
            .process_and_execute(&line, config.nlp.use_ai)
            .await;
        println!(
            "{}",
            json!({"resolution": resolution, "execution": execution})
        );
        if resolution.success && resolution.command == "exit" {
            break;
        }
    }

    tracing::info!("cmdweave stopped");
    Ok(())
}
