//! Shared test harness for E2E integration tests.
//!
//! Wires the real extractor, proxy, reasoning engine and processor
//! together, with scripted or wiremock-backed providers and a history
//! file in a temporary directory.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use cw_processor::{
    AskHandler, CommandHandler, CommandProcessor, HandlerRegistry, HandlerResult, HistoryStore,
    ProcessorSettings,
};
use cw_protocol::{AiMode, EntityBag, Intent, ParsedCommand, ResolutionResult};
use cw_providers::{Provider, ProviderProxy, ProxySettings};
use cw_reasoning::{Reasoner, ReasoningEngine};
use cw_rules::{Extractor, RuleExtractor};

/// Rule extractor that counts every call.
pub struct CountingExtractor {
    inner: RuleExtractor,
    pub calls: Arc<AtomicUsize>,
}

impl Extractor for CountingExtractor {
    fn parse(&self, text: &str) -> ParsedCommand {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.parse(text)
    }

    fn classify(&self, text: &str, parsed: &ParsedCommand) -> Intent {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.classify(text, parsed)
    }

    fn extract_entities(&self, text: &str, intent: Intent, parsed: &ParsedCommand) -> EntityBag {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.extract_entities(text, intent, parsed)
    }
}

/// Handler standing in for an external scanner module.
#[derive(Default)]
pub struct RecordingHandler {
    pub commands: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandHandler for RecordingHandler {
    fn name(&self) -> &str {
        "scanner"
    }

    fn description(&self) -> &str {
        "Records scan commands"
    }

    async fn handle(&self, resolution: &ResolutionResult) -> HandlerResult<Value> {
        self.commands.lock().unwrap().push(resolution.command.clone());
        Ok(json!({"accepted": resolution.command}))
    }
}

/// End-to-end harness: real pipeline, scripted providers, temp history.
pub struct Pipeline {
    pub processor: CommandProcessor,
    pub proxy: Arc<ProviderProxy>,
    pub extractor_calls: Arc<AtomicUsize>,
    pub scanner: Arc<RecordingHandler>,
    pub history_path: PathBuf,
    /// Keeps the history directory alive for the test's duration.
    pub dir: TempDir,
}

impl Pipeline {
    /// Build with the given providers, mode and history capacity.
    pub async fn new(providers: Vec<Arc<dyn Provider>>, mode: AiMode, max_history: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("history.json");
        Self::with_history(providers, mode, dir, history_path, max_history).await
    }

    /// Build around an existing history directory (for restart tests).
    pub async fn with_history(
        providers: Vec<Arc<dyn Provider>>,
        mode: AiMode,
        dir: TempDir,
        history_path: PathBuf,
        max_history: usize,
    ) -> Self {
        let settings = ProxySettings {
            mode,
            ..ProxySettings::default()
        };
        let proxy = Arc::new(ProviderProxy::connect(providers, settings).await);
        let reasoner: Arc<dyn Reasoner> = Arc::new(ReasoningEngine::new(proxy.clone()));

        let extractor_calls = Arc::new(AtomicUsize::new(0));
        let extractor = CountingExtractor {
            inner: RuleExtractor::new(),
            calls: extractor_calls.clone(),
        };

        let scanner = Arc::new(RecordingHandler::default());
        let ask = Arc::new(AskHandler::new(proxy.clone()));
        let mut handlers = HandlerRegistry::new();
        handlers.register_prefix("scan", scanner.clone());
        handlers.register_intent(Intent::Scan, scanner.clone());
        handlers.register_prefix("query", ask);

        let processor = CommandProcessor::new(
            Box::new(extractor),
            Some(reasoner),
            HistoryStore::open(&history_path, max_history),
            ProcessorSettings::default(),
        )
        .with_handlers(handlers);

        Self {
            processor,
            proxy,
            extractor_calls,
            scanner,
            history_path,
            dir,
        }
    }

    pub fn extractor_calls(&self) -> usize {
        self.extractor_calls.load(Ordering::SeqCst)
    }

    /// History as stored on disk.
    pub fn stored_inputs(&self) -> Vec<String> {
        let contents = std::fs::read_to_string(&self.history_path).unwrap();
        let entries: Vec<Value> = serde_json::from_str(&contents).unwrap();
        entries
            .into_iter()
            .map(|e| e["input"].as_str().unwrap().to_string())
            .collect()
    }
}

/// Ollama `/api/chat` response body.
pub fn ollama_chat(content: &str) -> Value {
    json!({
        "model": "llama3.2",
        "message": {"role": "assistant", "content": content},
        "done": true
    })
}

/// OpenAI-compatible `/chat/completions` response body.
pub fn chat_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-e2e",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}
