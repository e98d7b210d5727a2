//! Command handlers: the narrow interface to the modules that actually act
//! on a resolved command.
//!
//! Handlers are registered either by command prefix (`scan`, `query`, …) or
//! by intent. Lookup tries the prefix first, then the intent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

use cw_protocol::{Intent, ResolutionResult};
use cw_providers::ProviderProxy;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("handler failed: {0}")]
    Failed(String),

    #[error("handler unavailable: {0}")]
    Unavailable(String),
}

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Something that can run a resolved command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handler name (e.g., "ask").
    fn name(&self) -> &str;

    /// Human-readable description, shown by `tools`.
    fn description(&self) -> &str;

    /// Run the command and return structured output.
    async fn handle(&self, resolution: &ResolutionResult) -> HandlerResult<Value>;
}

/// Metadata about a registered handler (used by `tools`).
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerInfo {
    pub name: String,
    pub description: String,
    /// Prefixes and intents the handler is registered under.
    pub routes: Vec<String>,
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn CommandHandler>>,
    by_prefix: HashMap<String, usize>,
    by_intent: HashMap<Intent, usize>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, handler: Arc<dyn CommandHandler>) -> usize {
        if let Some(i) = self.handlers.iter().position(|h| Arc::ptr_eq(h, &handler)) {
            return i;
        }
        self.handlers.push(handler);
        self.handlers.len() - 1
    }

    /// Route commands whose first word is `prefix` (case-insensitive).
    pub fn register_prefix(&mut self, prefix: &str, handler: Arc<dyn CommandHandler>) {
        let index = self.slot(handler);
        self.by_prefix.insert(prefix.to_lowercase(), index);
    }

    /// Route NLP resolutions with this final intent.
    pub fn register_intent(&mut self, intent: Intent, handler: Arc<dyn CommandHandler>) {
        let index = self.slot(handler);
        self.by_intent.insert(intent, index);
    }

    pub fn lookup(&self, prefix: Option<&str>, intent: Option<Intent>) -> Option<Arc<dyn CommandHandler>> {
        let by_prefix = prefix.and_then(|p| self.by_prefix.get(&p.to_lowercase()));
        let by_intent = || intent.and_then(|i| self.by_intent.get(&i));
        by_prefix
            .or_else(by_intent)
            .map(|&index| Arc::clone(&self.handlers[index]))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered handlers in registration order, routes sorted.
    pub fn list(&self) -> Vec<HandlerInfo> {
        self.handlers
            .iter()
            .enumerate()
            .map(|(index, handler)| {
                let mut routes: Vec<String> = self
                    .by_prefix
                    .iter()
                    .filter(|(_, i)| **i == index)
                    .map(|(prefix, _)| prefix.clone())
                    .chain(
                        self.by_intent
                            .iter()
                            .filter(|(_, i)| **i == index)
                            .map(|(intent, _)| format!("intent:{intent}")),
                    )
                    .collect();
                routes.sort();
                HandlerInfo {
                    name: handler.name().to_string(),
                    description: handler.description().to_string(),
                    routes,
                }
            })
            .collect()
    }
}

// ── Ask handler ─────────────────────────────────────────────────

const ASK_SYSTEM_PROMPT: &str =
    "You are a concise assistant for a network operations console. Answer in plain text.";

/// Answers `query …` commands with the best available provider.
pub struct AskHandler {
    proxy: Arc<ProviderProxy>,
}

impl AskHandler {
    pub fn new(proxy: Arc<ProviderProxy>) -> Self {
        Self { proxy }
    }

    fn question_of(resolution: &ResolutionResult) -> Option<String> {
        let from_entities = resolution
            .entities()
            .and_then(|e| e.get("query"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let from_command = || {
            let rest = resolution.command.trim().strip_prefix("query")?.trim();
            (!rest.is_empty()).then(|| rest.to_string())
        };
        from_entities
            .filter(|q| !q.trim().is_empty())
            .or_else(from_command)
    }
}

#[async_trait]
impl CommandHandler for AskHandler {
    fn name(&self) -> &str {
        "ask"
    }

    fn description(&self) -> &str {
        "Answer a free-form question with the configured AI providers"
    }

    async fn handle(&self, resolution: &ResolutionResult) -> HandlerResult<Value> {
        let question = Self::question_of(resolution)
            .ok_or_else(|| HandlerError::InvalidArguments("query text is empty".into()))?;

        let outcome = self.proxy.query_best(&question, ASK_SYSTEM_PROMPT).await;
        if outcome.is_none() {
            return Err(HandlerError::Unavailable(
                outcome.error.unwrap_or_else(|| "no AI provider available".into()),
            ));
        }
        Ok(json!({
            "question": question,
            "answer": outcome.response.unwrap_or_default(),
            "provider": outcome.provider,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_protocol::{AiMode, DirectRule};
    use cw_providers::mock::MockProvider;
    use cw_providers::{Provider, ProxySettings};
    use std::sync::Mutex;

    /// Records every resolution it is asked to handle.
    struct Recording {
        name: &'static str,
        seen: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandHandler for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "records calls"
        }

        async fn handle(&self, resolution: &ResolutionResult) -> HandlerResult<Value> {
            self.seen.lock().unwrap().push(resolution.command.clone());
            Ok(json!({"handled_by": self.name}))
        }
    }

    async fn proxy_with(mock: MockProvider) -> Arc<ProviderProxy> {
        let providers: Vec<Arc<dyn Provider>> = vec![Arc::new(mock)];
        let settings = ProxySettings {
            mode: AiMode::Auto,
            ..ProxySettings::default()
        };
        Arc::new(ProviderProxy::connect(providers, settings).await)
    }

    #[test]
    fn prefix_lookup_wins_over_intent() {
        let scanner = Recording::new("scanner");
        let fallback = Recording::new("fallback");
        let mut registry = HandlerRegistry::new();
        registry.register_prefix("scan", scanner);
        registry.register_intent(Intent::Scan, fallback);

        let found = registry.lookup(Some("SCAN"), Some(Intent::Scan)).unwrap();
        assert_eq!(found.name(), "scanner");

        let found = registry.lookup(Some("portscan"), Some(Intent::Scan)).unwrap();
        assert_eq!(found.name(), "fallback");

        assert!(registry.lookup(Some("recon"), Some(Intent::Recon)).is_none());
        assert!(registry.lookup(None, None).is_none());
    }

    #[test]
    fn same_handler_registered_twice_listed_once() {
        let scanner = Recording::new("scanner");
        let mut registry = HandlerRegistry::new();
        registry.register_prefix("scan", scanner.clone());
        registry.register_prefix("vulnscan", scanner.clone());
        registry.register_intent(Intent::VulnScan, scanner);

        assert_eq!(registry.len(), 1);
        let info = &registry.list()[0];
        assert_eq!(info.name, "scanner");
        assert_eq!(info.routes, vec!["intent:vuln_scan", "scan", "vulnscan"]);
    }

    #[tokio::test]
    async fn recording_handler_sees_command() {
        let scanner = Recording::new("scanner");
        let mut registry = HandlerRegistry::new();
        registry.register_prefix("scan", scanner.clone());

        let resolution = ResolutionResult::direct("scan example.com", "scan example.com", DirectRule::Pattern);
        let handler = registry.lookup(resolution.command_prefix(), resolution.intent()).unwrap();
        let output = handler.handle(&resolution).await.unwrap();

        assert_eq!(output["handled_by"], "scanner");
        assert_eq!(*scanner.seen.lock().unwrap(), vec!["scan example.com"]);
    }

    #[tokio::test]
    async fn ask_handler_answers_from_command_text() {
        let mock = MockProvider::cloud("anthropic").with_response("A SYN scan sends SYN packets.");
        let handler = AskHandler::new(proxy_with(mock).await);

        let resolution = ResolutionResult::direct(
            "query what is a syn scan",
            "query what is a syn scan",
            DirectRule::Pattern,
        );
        let output = handler.handle(&resolution).await.unwrap();
        assert_eq!(output["question"], "what is a syn scan");
        assert_eq!(output["answer"], "A SYN scan sends SYN packets.");
        assert_eq!(output["provider"], "anthropic");
    }

    #[tokio::test]
    async fn ask_handler_without_provider_is_unavailable() {
        let handler = AskHandler::new(proxy_with(MockProvider::local("ollama").unavailable()).await);
        let resolution = ResolutionResult::direct("query hi", "query hi", DirectRule::Pattern);
        let err = handler.handle(&resolution).await.unwrap_err();
        assert!(matches!(err, HandlerError::Unavailable(_)));
    }

    #[tokio::test]
    async fn ask_handler_rejects_empty_query() {
        let handler = AskHandler::new(proxy_with(MockProvider::cloud("openai")).await);
        let resolution = ResolutionResult::direct("query", "query", DirectRule::Simple);
        let err = handler.handle(&resolution).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArguments(_)));
    }
}
