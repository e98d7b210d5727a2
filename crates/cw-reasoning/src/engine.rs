//! Reasoning engine: fills a template, queries the proxy, interprets the
//! response through the repair cascade.
//!
//! Every operation returns a structurally valid record. Provider outages and
//! uninterpretable output end up in the record's `reasoning` text.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use cw_protocol::{
    ActionPlan, AmbiguityResolution, EntityBag, EntityResolution, Intent, ParsedCommand,
    PlannedAction, UnderstandingResult,
};
use cw_providers::ProviderProxy;

use crate::prompts::{
    PLAN_ACTIONS, PromptStore, RESOLVE_AMBIGUITY, RESOLVE_ENTITIES, SYSTEM_PROMPT,
    UNDERSTAND_COMMAND,
};
use crate::repair::{RepairCascade, fallback_diagnostic};

/// Confidence assumed when a recovered object omits it.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// The model-backed half of command understanding.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn understand_command(&self, text: &str, parsed: &ParsedCommand) -> UnderstandingResult;

    async fn resolve_entities(
        &self,
        text: &str,
        intent: Intent,
        entities: &EntityBag,
        missing: &[String],
    ) -> EntityResolution;

    async fn resolve_ambiguity(&self, text: &str, candidates: &[String]) -> AmbiguityResolution;

    async fn plan_actions(&self, text: &str, intent: Intent, entities: &EntityBag) -> ActionPlan;
}

/// Outcome of one templated query.
enum Reply {
    /// Object recovered and required keys present.
    Object { value: Map<String, Value>, provider: String },
    /// Provider answered but nothing usable came back.
    Uninterpretable { diagnostic: String, provider: String },
    /// No provider answered.
    NoProvider(String),
}

pub struct ReasoningEngine {
    proxy: Arc<ProviderProxy>,
    prompts: PromptStore,
    cascade: RepairCascade,
}

impl ReasoningEngine {
    pub fn new(proxy: Arc<ProviderProxy>) -> Self {
        Self::with_prompts(proxy, PromptStore::new())
    }

    pub fn with_prompts(proxy: Arc<ProviderProxy>, prompts: PromptStore) -> Self {
        let mut defaults = Map::new();
        defaults.insert("confidence".into(), json!(DEFAULT_CONFIDENCE));
        defaults.insert("entities".into(), json!({}));
        Self {
            proxy,
            prompts,
            cascade: RepairCascade::standard(defaults),
        }
    }

    /// Replace the cascade, e.g. to append a custom strategy.
    pub fn with_cascade(mut self, cascade: RepairCascade) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn proxy(&self) -> &Arc<ProviderProxy> {
        &self.proxy
    }

    async fn ask(&self, template: &str, vars: &[(&str, &str)], required: &[&str]) -> Reply {
        let Some(prompt) = self.prompts.render(template, vars) else {
            return Reply::NoProvider(format!("missing prompt template: {template}"));
        };

        let outcome = self.proxy.query_with_reasoning(&prompt, SYSTEM_PROMPT).await;
        let Some(raw) = outcome.response else {
            let error = outcome
                .error
                .unwrap_or_else(|| "no AI provider available".to_string());
            return Reply::NoProvider(error);
        };
        let provider = outcome.provider;

        match self.cascade.run(&raw) {
            Some(repaired) if required.iter().all(|k| repaired.value.contains_key(*k)) => {
                tracing::debug!(
                    template,
                    provider = %provider,
                    stage = repaired.stage,
                    "model output interpreted"
                );
                Reply::Object {
                    value: repaired.value,
                    provider,
                }
            }
            Some(repaired) => {
                tracing::warn!(
                    template,
                    provider = %provider,
                    stage = repaired.stage,
                    "recovered object lacks required keys"
                );
                Reply::Uninterpretable {
                    diagnostic: fallback_diagnostic(&raw),
                    provider,
                }
            }
            None => {
                tracing::warn!(template, provider = %provider, "model output not interpretable");
                Reply::Uninterpretable {
                    diagnostic: fallback_diagnostic(&raw),
                    provider,
                }
            }
        }
    }
}

// ── Field coercion ───────────────────────────────────────────

/// Number or numeric string, clamped to [0, 1].
fn confidence_of(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok().map(|v| {
            if s.contains('%') { v / 100.0 } else { v }
        }),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIDENCE)
}

fn string_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn object_of(value: Option<&Value>) -> EntityBag {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => EntityBag::new(),
    }
}

fn index_of(value: Option<&Value>) -> Option<usize> {
    match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| usize::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn action_of(value: &Value) -> Option<PlannedAction> {
    match value {
        Value::String(command) if !command.trim().is_empty() => Some(PlannedAction {
            command: command.trim().to_string(),
            description: String::new(),
        }),
        Value::Object(map) => {
            let command = string_of(map.get("command"));
            if command.trim().is_empty() {
                return None;
            }
            Some(PlannedAction {
                command: command.trim().to_string(),
                description: string_of(map.get("description")),
            })
        }
        _ => None,
    }
}

fn json_list<T: serde::Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[async_trait]
impl Reasoner for ReasoningEngine {
    async fn understand_command(&self, text: &str, parsed: &ParsedCommand) -> UnderstandingResult {
        let tokens = parsed.tokens.join(" ");
        let ips = json_list(&parsed.ip_addresses);
        let hostnames = json_list(&parsed.hostnames);
        let urls = json_list(&parsed.urls);
        let ports = json_list(&parsed.ports);
        let options = serde_json::to_string(&parsed.options).unwrap_or_else(|_| "{}".into());

        let reply = self
            .ask(
                UNDERSTAND_COMMAND,
                &[
                    ("text", text),
                    ("tokens", tokens.as_str()),
                    ("ips", ips.as_str()),
                    ("hostnames", hostnames.as_str()),
                    ("urls", urls.as_str()),
                    ("ports", ports.as_str()),
                    ("options", options.as_str()),
                ],
                &["intent"],
            )
            .await;

        match reply {
            Reply::Object { value, provider } => {
                let label = string_of(value.get("intent"));
                let intent = Intent::from_label(&label);
                if intent.is_unknown() && !label.is_empty() && label != "unknown" {
                    tracing::debug!(label = %label, "model returned an unrecognized intent");
                }
                UnderstandingResult {
                    intent,
                    confidence: if intent.is_unknown() {
                        0.0
                    } else {
                        confidence_of(value.get("confidence"))
                    },
                    entities: object_of(value.get("entities")),
                    reasoning: string_of(value.get("reasoning")),
                    source: provider,
                }
            }
            Reply::Uninterpretable {
                diagnostic,
                provider,
            } => UnderstandingResult::fallback(diagnostic, provider),
            Reply::NoProvider(message) => UnderstandingResult::unavailable(message),
        }
    }

    async fn resolve_entities(
        &self,
        text: &str,
        intent: Intent,
        entities: &EntityBag,
        missing: &[String],
    ) -> EntityResolution {
        if missing.is_empty() {
            return EntityResolution {
                resolved: EntityBag::new(),
                confidence: 1.0,
                reasoning: "nothing missing".into(),
            };
        }

        let known = serde_json::to_string(entities).unwrap_or_else(|_| "{}".into());
        let missing_list = missing.join(", ");
        let reply = self
            .ask(
                RESOLVE_ENTITIES,
                &[
                    ("text", text),
                    ("intent", intent.as_str()),
                    ("entities", known.as_str()),
                    ("missing", missing_list.as_str()),
                ],
                &[],
            )
            .await;

        match reply {
            Reply::Object { value, .. } => {
                let resolved = match value.get("resolved") {
                    Some(v @ Value::Object(_)) => object_of(Some(v)),
                    _ => object_of(value.get("entities")),
                };
                EntityResolution {
                    resolved,
                    confidence: confidence_of(value.get("confidence")),
                    reasoning: string_of(value.get("reasoning")),
                }
            }
            Reply::Uninterpretable { diagnostic, .. } | Reply::NoProvider(diagnostic) => {
                EntityResolution {
                    resolved: EntityBag::new(),
                    confidence: 0.0,
                    reasoning: diagnostic,
                }
            }
        }
    }

    async fn resolve_ambiguity(&self, text: &str, candidates: &[String]) -> AmbiguityResolution {
        if candidates.is_empty() {
            return AmbiguityResolution {
                selected_index: None,
                confidence: 0.0,
                reasoning: "no candidates".into(),
            };
        }

        let listing = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{i}. {c}"))
            .collect::<Vec<_>>()
            .join("\n");
        let reply = self
            .ask(
                RESOLVE_AMBIGUITY,
                &[("text", text), ("candidates", listing.as_str())],
                &["selected_index"],
            )
            .await;

        match reply {
            Reply::Object { value, .. } => {
                let selected_index =
                    index_of(value.get("selected_index")).filter(|i| *i < candidates.len());
                AmbiguityResolution {
                    selected_index,
                    confidence: if selected_index.is_some() {
                        confidence_of(value.get("confidence"))
                    } else {
                        0.0
                    },
                    reasoning: string_of(value.get("reasoning")),
                }
            }
            Reply::Uninterpretable { diagnostic, .. } | Reply::NoProvider(diagnostic) => {
                AmbiguityResolution {
                    selected_index: None,
                    confidence: 0.0,
                    reasoning: diagnostic,
                }
            }
        }
    }

    async fn plan_actions(&self, text: &str, intent: Intent, entities: &EntityBag) -> ActionPlan {
        let known = serde_json::to_string(entities).unwrap_or_else(|_| "{}".into());
        let reply = self
            .ask(
                PLAN_ACTIONS,
                &[("text", text), ("intent", intent.as_str()), ("entities", known.as_str())],
                &["actions"],
            )
            .await;

        match reply {
            Reply::Object { value, .. } => ActionPlan {
                actions: value
                    .get("actions")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(action_of).collect())
                    .unwrap_or_default(),
                reasoning: string_of(value.get("reasoning")),
            },
            Reply::Uninterpretable { diagnostic, .. } | Reply::NoProvider(diagnostic) => {
                ActionPlan {
                    actions: Vec::new(),
                    reasoning: diagnostic,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_protocol::AiMode;
    use cw_providers::{MockProvider, Provider, ProxySettings};

    async fn engine_with(mock: Arc<MockProvider>) -> ReasoningEngine {
        let proxy = ProviderProxy::connect(
            vec![mock as Arc<dyn Provider>],
            ProxySettings {
                mode: AiMode::Auto,
                ..ProxySettings::default()
            },
        )
        .await;
        ReasoningEngine::new(Arc::new(proxy))
    }

    fn parsed(text: &str) -> ParsedCommand {
        ParsedCommand {
            text: text.into(),
            tokens: text.split_whitespace().map(String::from).collect(),
            ..ParsedCommand::default()
        }
    }

    #[tokio::test]
    async fn understand_braceless_response() {
        let mock = Arc::new(MockProvider::local("ollama").with_response(r#""intent": "scan", "confidence": 0.9"#));
        let engine = engine_with(mock).await;

        let result = engine
            .understand_command("sweep the box", &parsed("sweep the box"))
            .await;
        assert_eq!(result.intent, Intent::Scan);
        assert!((result.confidence - 0.9).abs() < 1e-9);
        assert!(result.entities.is_empty());
        assert_eq!(result.source, "ollama");
    }

    #[tokio::test]
    async fn understand_prose_wrapped_response() {
        let mock = Arc::new(MockProvider::cloud("anthropic").with_response(
            r#"I think the answer is {"intent":"recon","confidence":0.85,"entities":{"target":"acme.org"},"reasoning":"subdomain listing"} thanks"#,
        ));
        let engine = engine_with(mock).await;

        let result = engine
            .understand_command("what lives under acme.org", &parsed("what lives under acme.org"))
            .await;
        assert_eq!(result.intent, Intent::Recon);
        assert_eq!(result.entities["target"], "acme.org");
        assert_eq!(result.reasoning, "subdomain listing");
    }

    #[tokio::test]
    async fn understand_missing_confidence_defaults() {
        let mock = Arc::new(MockProvider::local("ollama").with_response(r#"{"intent": "help"}"#));
        let result = engine_with(mock)
            .await
            .understand_command("help", &parsed("help"))
            .await;
        assert_eq!(result.intent, Intent::Help);
        assert!((result.confidence - DEFAULT_CONFIDENCE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn understand_garbage_falls_back() {
        let mock = Arc::new(MockProvider::local("ollama").with_response("Sorry, I can't do that."));
        let result = engine_with(mock)
            .await
            .understand_command("x", &parsed("x"))
            .await;
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.entities.is_empty());
        assert!(result.reasoning.contains("Sorry, I can't do that."));
        assert_eq!(result.source, "ollama");
    }

    #[tokio::test]
    async fn understand_object_without_intent_falls_back() {
        let mock = Arc::new(MockProvider::local("ollama").with_response(r#"{"target": "10.0.0.1"}"#));
        let result = engine_with(mock)
            .await
            .understand_command("x", &parsed("x"))
            .await;
        assert_eq!(result.intent, Intent::Unknown);
        assert!(result.reasoning.starts_with("could not interpret model output"));
    }

    #[tokio::test]
    async fn understand_unrecognized_label_is_unknown() {
        let mock = Arc::new(
            MockProvider::local("ollama").with_response(r#"{"intent": "make_coffee", "confidence": 0.99}"#),
        );
        let result = engine_with(mock)
            .await
            .understand_command("x", &parsed("x"))
            .await;
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn understand_without_providers_is_unavailable() {
        let proxy = ProviderProxy::connect(vec![], ProxySettings::default()).await;
        let engine = ReasoningEngine::new(Arc::new(proxy));
        let result = engine.understand_command("scan", &parsed("scan")).await;
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.source, "none");
        assert_eq!(result.reasoning, "no AI provider available");
    }

    #[tokio::test]
    async fn understand_prompt_carries_extracted_entities() {
        let mock = Arc::new(MockProvider::local("ollama").with_response(r#"{"intent":"scan"}"#));
        let engine = engine_with(mock.clone()).await;
        let mut p = parsed("scan 10.0.0.5");
        p.ip_addresses = vec!["10.0.0.5".into()];
        p.ports = vec![22, 80];
        engine.understand_command("scan 10.0.0.5", &p).await;

        let call = &mock.calls()[0];
        assert!(call.prompt.contains("Request: scan 10.0.0.5"));
        assert!(call.prompt.contains(r#"Addresses: ["10.0.0.5"]"#));
        assert!(call.prompt.contains("Ports: [22,80]"));
        assert_eq!(call.system, SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn resolve_entities_reads_resolved_map() {
        let mock = Arc::new(MockProvider::local("ollama").with_response(
            r#"{"resolved": {"target": {"value": "10.0.0.9", "confidence": 0.8}}, "confidence": 0.7, "reasoning": "only host mentioned"}"#,
        ));
        let engine = engine_with(mock).await;
        let resolution = engine
            .resolve_entities(
                "scan the web box",
                Intent::Scan,
                &EntityBag::new(),
                &["target".to_string()],
            )
            .await;
        assert_eq!(resolution.resolved["target"]["value"], "10.0.0.9");
        assert!((resolution.confidence - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn resolve_entities_nothing_missing_skips_query() {
        let mock = Arc::new(MockProvider::local("ollama").always("{}"));
        let engine = engine_with(mock.clone()).await;
        let resolution = engine
            .resolve_entities("scan x", Intent::Scan, &EntityBag::new(), &[])
            .await;
        assert!(resolution.resolved.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn resolve_ambiguity_validates_index() {
        let mock = Arc::new(
            MockProvider::local("ollama")
                .with_response(r#"{"selected_index": 1, "confidence": 0.9, "reasoning": "ports"}"#)
                .with_response(r#"{"selected_index": 7, "confidence": 0.9}"#),
        );
        let engine = engine_with(mock).await;
        let candidates = vec!["recon example.com".to_string(), "scan example.com".to_string()];

        let picked = engine.resolve_ambiguity("look at example.com", &candidates).await;
        assert_eq!(picked.selected_index, Some(1));
        assert!((picked.confidence - 0.9).abs() < 1e-9);

        let out_of_range = engine.resolve_ambiguity("look at example.com", &candidates).await;
        assert_eq!(out_of_range.selected_index, None);
        assert_eq!(out_of_range.confidence, 0.0);
    }

    #[tokio::test]
    async fn resolve_ambiguity_empty_candidates() {
        let mock = Arc::new(MockProvider::local("ollama").always("{}"));
        let engine = engine_with(mock.clone()).await;
        let result = engine.resolve_ambiguity("x", &[]).await;
        assert!(result.selected_index.is_none());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn plan_actions_accepts_objects_and_strings() {
        let mock = Arc::new(MockProvider::local("ollama").with_response(
            r#"```json
{"actions": [{"command": "recon acme.org", "description": "map hosts"}, "scan acme.org", {"description": "no command"}], "reasoning": "map then scan"}
```"#,
        ));
        let engine = engine_with(mock).await;
        let plan = engine
            .plan_actions("assess acme.org", Intent::VulnScan, &EntityBag::new())
            .await;
        assert_eq!(plan.actions.len(), 2);
        assert_eq!(plan.actions[0].command, "recon acme.org");
        assert_eq!(plan.actions[0].description, "map hosts");
        assert_eq!(plan.actions[1].command, "scan acme.org");
        assert_eq!(plan.reasoning, "map then scan");
    }

    #[test]
    fn confidence_coercion() {
        assert_eq!(confidence_of(Some(&json!(1.7))), 1.0);
        assert_eq!(confidence_of(Some(&json!(-1))), 0.0);
        assert!((confidence_of(Some(&json!("0.8"))) - 0.8).abs() < 1e-9);
        assert!((confidence_of(Some(&json!("85%"))) - 0.85).abs() < 1e-9);
        assert_eq!(confidence_of(None), DEFAULT_CONFIDENCE);
        assert_eq!(confidence_of(Some(&json!("high"))), DEFAULT_CONFIDENCE);
    }
}
