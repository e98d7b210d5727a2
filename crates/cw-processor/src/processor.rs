//! Command processor, the top-level resolution pipeline.
//!
//! ```text
//! RECEIVED ─► DIRECT_MATCHED
//!    └─► PARSED ─► INTENT_DETERMINED ─► [AI_ATTEMPTED] ─► INTENT_FINAL
//!          ─► ENTITIES_CHECKED ─► [ENTITIES_RESOLVED] ─► TRANSLATED ─► DONE
//! ```
//!
//! Bracketed stages consult the reasoner and keep the prior value when it
//! has nothing better. `process` never returns an error: failures end up in
//! the `success` flag and `message` of the result.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Value, json};

use cw_protocol::{
    EntityBag, EntityResolution, ExecutionResult, HistoryEntry, Intent, ParsedCommand, Resolution,
    ResolutionResult, UnderstandingResult,
};
use cw_reasoning::Reasoner;
use cw_rules::Extractor;

use crate::direct::{DirectMatch, DirectMatcher};
use crate::handlers::HandlerRegistry;
use crate::history::{HistoryResult, HistoryStore};
use crate::translate::{
    is_present, is_renderable, missing_entities, normalize_entities, translate, unwrap_singleton,
};

/// Arbitration thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorSettings {
    /// Minimum AI confidence to override a known rule-based intent.
    pub confidence_threshold: f64,
    /// Minimum confidence to accept an AI-resolved entity.
    pub entity_confidence_threshold: f64,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            entity_confidence_threshold: 0.6,
        }
    }
}

/// Pipeline stage, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    DirectMatched,
    Parsed,
    IntentDetermined,
    AiAttempted,
    IntentFinal,
    EntitiesChecked,
    EntitiesResolved,
    Translated,
    Done,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::DirectMatched => "direct_matched",
            Self::Parsed => "parsed",
            Self::IntentDetermined => "intent_determined",
            Self::AiAttempted => "ai_attempted",
            Self::IntentFinal => "intent_final",
            Self::EntitiesChecked => "entities_checked",
            Self::EntitiesResolved => "entities_resolved",
            Self::Translated => "translated",
            Self::Done => "done",
        }
    }
}

/// Static command templates offered by `get_suggestions`.
const SUGGESTION_TEMPLATES: &[&str] = &[
    "scan <target>",
    "scan <target> --ports <ports>",
    "recon <target>",
    "recon <target> --mode passive",
    "vulnscan <target>",
    "vulnscan <target> --severity high",
    "query <question>",
    "generate shell --lhost <ip> --lport <port>",
    "help",
    "tools",
    "history",
    "history clear",
    "exit",
];

/// Built-in command reference returned by `help`.
const HELP_TOPICS: &[(&str, &str)] = &[
    ("scan", "scan <target> [--ports <list|range>] [--type <scan type>]"),
    ("recon", "recon <target> [--mode passive|active]"),
    ("vulnscan", "vulnscan <target> [--ports <list>] [--severity <level>]"),
    ("query", "query <question>"),
    (
        "generate",
        "generate shell --lhost <ip> --lport <port> [--type reverse|bind] [--format <fmt>] [--platform <os>]",
    ),
    ("tools", "tools: list registered command handlers"),
    ("history", "history [N|clear]: show or clear recent commands"),
    ("help", "help [topic]"),
    ("exit", "exit: end the session"),
];

/// Intent and entities after arbitration.
struct Decision {
    intent: Intent,
    entities: EntityBag,
    confidence: f64,
    /// AI reasoning, only when the AI intent won.
    reasoning: Option<String>,
    /// Diagnostic from a reasoner that did not help.
    note: Option<String>,
}

pub struct CommandProcessor {
    extractor: Box<dyn Extractor>,
    reasoner: Option<Arc<dyn Reasoner>>,
    direct: DirectMatcher,
    handlers: HandlerRegistry,
    history: Mutex<HistoryStore>,
    settings: ProcessorSettings,
}

impl CommandProcessor {
    pub fn new(
        extractor: Box<dyn Extractor>,
        reasoner: Option<Arc<dyn Reasoner>>,
        history: HistoryStore,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            extractor,
            reasoner,
            direct: DirectMatcher::new(),
            handlers: HandlerRegistry::new(),
            history: Mutex::new(history),
            settings,
        }
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    pub fn settings(&self) -> ProcessorSettings {
        self.settings
    }

    pub fn has_reasoner(&self) -> bool {
        self.reasoner.is_some()
    }

    fn history(&self) -> MutexGuard<'_, HistoryStore> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, text: &str, result: &ResolutionResult) {
        let entry = HistoryEntry::new(text.trim(), result.clone());
        if let Err(e) = self.history().append(entry) {
            tracing::warn!(error = %e, "failed to persist history");
        }
    }

    // ── Resolution ──────────────────────────────────────────────

    /// Resolve operator text into a canonical command.
    pub async fn process(&self, text: &str, use_ai: bool) -> ResolutionResult {
        tracing::debug!(stage = Stage::Received.as_str(), use_ai, "resolving input");

        if text.trim().is_empty() {
            return Self::rejected(text, ParsedCommand::default(), "empty input");
        }

        match self.direct.match_input(text) {
            Some(DirectMatch::Command { command, rule }) => {
                tracing::debug!(
                    stage = Stage::DirectMatched.as_str(),
                    command = %command,
                    rule = ?rule,
                    "direct command"
                );
                let result = ResolutionResult::direct(text, command, rule);
                self.record(text, &result);
                return result;
            }
            Some(DirectMatch::LeakedOutput) => {
                let parsed = ParsedCommand {
                    text: text.to_string(),
                    ..ParsedCommand::default()
                };
                return Self::rejected(
                    text,
                    parsed,
                    "input looks like structured model output and was not interpreted",
                );
            }
            None => {}
        }

        let parsed = self.extractor.parse(text);
        tracing::debug!(
            stage = Stage::Parsed.as_str(),
            tokens = parsed.tokens.len(),
            ports = parsed.ports.len(),
            "input parsed"
        );

        let rule_intent = self.extractor.classify(text, &parsed);
        let rule_entities = self.extractor.extract_entities(text, rule_intent, &parsed);
        tracing::debug!(
            stage = Stage::IntentDetermined.as_str(),
            intent = %rule_intent,
            "rule-based intent"
        );

        let rules = UnderstandingResult::from_rules(rule_intent, rule_entities);
        let mut decision = self.decide(text, &parsed, rules, use_ai).await;
        tracing::debug!(
            stage = Stage::IntentFinal.as_str(),
            intent = %decision.intent,
            confidence = decision.confidence,
            "intent settled"
        );

        normalize_entities(&mut decision.entities);
        let mut missing = missing_entities(decision.intent, &decision.entities);
        tracing::debug!(
            stage = Stage::EntitiesChecked.as_str(),
            missing = ?missing,
            "required entities checked"
        );

        if !missing.is_empty() {
            if let Some(reasoner) = &self.reasoner {
                let resolution = reasoner
                    .resolve_entities(text, decision.intent, &decision.entities, &missing)
                    .await;
                let merged = self.merge_resolved(&mut decision.entities, &missing, &resolution);
                normalize_entities(&mut decision.entities);
                missing = missing_entities(decision.intent, &decision.entities);
                tracing::debug!(
                    stage = Stage::EntitiesResolved.as_str(),
                    merged = ?merged,
                    still_missing = ?missing,
                    "missing entities resolved"
                );
            }
        }

        let command = translate(decision.intent, &decision.entities);
        tracing::debug!(stage = Stage::Translated.as_str(), command = %command, "translated");

        let success = !decision.intent.is_unknown();
        let message = Self::message_for(&decision, &command, &missing);
        let result = ResolutionResult {
            original: text.to_string(),
            command,
            success,
            message,
            detail: Resolution::Nlp {
                parsed,
                intent: decision.intent,
                entities: decision.entities,
                confidence: decision.confidence,
                reasoning: decision.reasoning,
                missing,
            },
        };
        self.record(text, &result);
        tracing::debug!(stage = Stage::Done.as_str(), success, "resolution complete");
        result
    }

    /// Consult the reasoner when the rules found nothing or AI was
    /// requested, and arbitrate between the two answers.
    async fn decide(
        &self,
        text: &str,
        parsed: &ParsedCommand,
        rules: UnderstandingResult,
        use_ai: bool,
    ) -> Decision {
        let keep_rules = |rules: UnderstandingResult, note: Option<String>| Decision {
            intent: rules.intent,
            entities: rules.entities,
            confidence: rules.confidence,
            reasoning: None,
            note,
        };

        if !(rules.intent.is_unknown() || use_ai) {
            return keep_rules(rules, None);
        }
        let Some(reasoner) = &self.reasoner else {
            if use_ai {
                tracing::debug!("AI requested but no reasoner is configured");
            }
            return keep_rules(rules, None);
        };

        let ai = reasoner.understand_command(text, parsed).await;
        tracing::debug!(
            stage = Stage::AiAttempted.as_str(),
            intent = %ai.intent,
            confidence = ai.confidence,
            source = %ai.source,
            "AI understanding"
        );

        if ai.intent.is_unknown() {
            let note = (!ai.reasoning.trim().is_empty()).then(|| ai.reasoning.clone());
            return keep_rules(rules, note);
        }
        if !rules.intent.is_unknown() && ai.confidence < self.settings.confidence_threshold {
            tracing::debug!(
                rule_intent = %rules.intent,
                ai_intent = %ai.intent,
                confidence = ai.confidence,
                "AI confidence below threshold; keeping rule intent"
            );
            return keep_rules(rules, None);
        }

        // Rule extraction for the winning intent, gaps filled from the AI.
        let mut entities = self.extractor.extract_entities(text, ai.intent, parsed);
        for (key, value) in ai.entities {
            if !is_present(entities.get(&key)) && is_present(Some(&value)) {
                entities.insert(key, value);
            }
        }
        Decision {
            intent: ai.intent,
            entities,
            confidence: ai.confidence,
            reasoning: (!ai.reasoning.trim().is_empty()).then_some(ai.reasoning),
            note: None,
        }
    }

    /// Merge resolved values for keys that are still missing and clear the
    /// confidence bar. Returns the merged keys.
    fn merge_resolved(
        &self,
        entities: &mut EntityBag,
        missing: &[String],
        resolution: &EntityResolution,
    ) -> Vec<String> {
        let threshold = self.settings.entity_confidence_threshold;
        let mut merged = Vec::new();
        for key in missing {
            let Some(raw) = resolution.resolved.get(key) else {
                continue;
            };
            let (value, confidence) = match raw {
                Value::Object(map) if map.contains_key("value") => (
                    map.get("value").cloned().unwrap_or(Value::Null),
                    map.get("confidence")
                        .and_then(Value::as_f64)
                        .unwrap_or(resolution.confidence),
                ),
                other => (other.clone(), resolution.confidence),
            };
            let value = unwrap_singleton(value);
            if confidence >= threshold && is_renderable(Some(&value)) && !is_renderable(entities.get(key)) {
                entities.insert(key.clone(), value);
                merged.push(key.clone());
            } else {
                tracing::debug!(key = %key, confidence, threshold, "resolved entity rejected");
            }
        }
        merged
    }

    fn message_for(decision: &Decision, command: &str, missing: &[String]) -> String {
        if decision.intent.is_unknown() {
            return match &decision.note {
                Some(note) => format!("could not determine intent ({note})"),
                None => "could not determine intent".to_string(),
            };
        }
        if missing.is_empty() {
            format!("resolved {}: {command}", decision.intent)
        } else {
            format!(
                "resolved {}: {command} (missing: {})",
                decision.intent,
                missing.join(", ")
            )
        }
    }

    fn rejected(text: &str, parsed: ParsedCommand, message: &str) -> ResolutionResult {
        ResolutionResult {
            original: text.to_string(),
            command: String::new(),
            success: false,
            message: message.to_string(),
            detail: Resolution::Nlp {
                parsed,
                intent: Intent::Unknown,
                entities: EntityBag::new(),
                confidence: 0.0,
                reasoning: None,
                missing: Vec::new(),
            },
        }
    }

    // ── Execution ───────────────────────────────────────────────

    /// Dispatch a resolved command: registered handlers first, then the
    /// built-in commands.
    pub async fn execute(&self, result: &ResolutionResult) -> ExecutionResult {
        let command = result.command.trim();
        if !result.success || command.is_empty() {
            return ExecutionResult::failed(command, format!("nothing to execute: {}", result.message));
        }

        let prefix = result.command_prefix();
        let intent = result
            .intent()
            .or_else(|| prefix.map(Intent::from_label))
            .filter(|i| !i.is_unknown());

        if let Some(handler) = self.handlers.lookup(prefix, intent) {
            let name = handler.name().to_string();
            tracing::info!(handler = %name, command = %command, "dispatching command");
            return match handler.handle(result).await {
                Ok(output) => ExecutionResult {
                    command: command.to_string(),
                    success: true,
                    handler: Some(name.clone()),
                    output: Some(output),
                    message: format!("handled by {name}"),
                },
                Err(e) => {
                    tracing::warn!(handler = %name, error = %e, "handler failed");
                    ExecutionResult {
                        command: command.to_string(),
                        success: false,
                        handler: Some(name),
                        output: None,
                        message: e.to_string(),
                    }
                }
            };
        }

        match self.builtin(command) {
            Some(output) => ExecutionResult {
                command: command.to_string(),
                success: true,
                handler: Some("builtin".into()),
                output: Some(output),
                message: format!("builtin {}", prefix.unwrap_or_default()),
            },
            None => ExecutionResult::failed(
                command,
                format!("no handler registered for '{}'", prefix.unwrap_or_default()),
            ),
        }
    }

    fn builtin(&self, command: &str) -> Option<Value> {
        let mut words = command.split_whitespace();
        let head = words.next()?.to_lowercase();
        let arg = words.next();
        match head.as_str() {
            "help" => {
                let topics: Vec<Value> = HELP_TOPICS
                    .iter()
                    .filter(|(name, _)| arg.is_none_or(|a| a.eq_ignore_ascii_case(name)))
                    .map(|(name, usage)| json!({"command": name, "usage": usage}))
                    .collect();
                Some(json!({"commands": topics}))
            }
            "tools" => {
                let handlers: Vec<Value> = self
                    .handlers
                    .list()
                    .into_iter()
                    .map(|h| json!({"name": h.name, "description": h.description, "routes": h.routes}))
                    .collect();
                Some(json!({"handlers": handlers}))
            }
            "history" => match arg {
                Some(a) if a.eq_ignore_ascii_case("clear") => match self.clear_history() {
                    Ok(()) => Some(json!({"cleared": true})),
                    Err(e) => Some(json!({"cleared": false, "error": e.to_string()})),
                },
                _ => {
                    let limit = arg.and_then(|a| a.parse::<usize>().ok()).unwrap_or(usize::MAX);
                    let entries: Vec<Value> = self
                        .history()
                        .recent(limit)
                        .into_iter()
                        .map(|e| {
                            json!({
                                "input": e.input,
                                "command": e.result.command,
                                "success": e.result.success,
                                "timestamp": e.timestamp,
                            })
                        })
                        .collect();
                    Some(json!({"entries": entries}))
                }
            },
            "exit" => Some(json!({"exit": true})),
            _ => None,
        }
    }

    /// Resolve, then execute.
    pub async fn process_and_execute(
        &self,
        text: &str,
        use_ai: bool,
    ) -> (ResolutionResult, ExecutionResult) {
        let resolution = self.process(text, use_ai).await;
        let execution = self.execute(&resolution).await;
        (resolution, execution)
    }

    // ── History ─────────────────────────────────────────────────

    /// Stored history, oldest first.
    pub fn get_history(&self) -> Vec<HistoryEntry> {
        self.history().entries()
    }

    pub fn clear_history(&self) -> HistoryResult<()> {
        tracing::info!("clearing history");
        self.history().clear()
    }

    /// Completions for `prefix`: recent inputs (newest first, no
    /// duplicates), then command templates.
    pub fn get_suggestions(&self, prefix: &str, max_count: usize) -> Vec<String> {
        let needle = prefix.trim_start().to_lowercase();
        let matches = |candidate: &str| candidate.to_lowercase().starts_with(&needle);

        let recent: Vec<String> = self
            .history()
            .recent(usize::MAX)
            .into_iter()
            .map(|e| e.input)
            .collect();

        let mut suggestions: Vec<String> = Vec::new();
        let candidates = recent
            .into_iter()
            .chain(SUGGESTION_TEMPLATES.iter().map(|t| t.to_string()));
        for candidate in candidates {
            if suggestions.len() >= max_count {
                break;
            }
            if matches(&candidate) && !suggestions.contains(&candidate) {
                suggestions.push(candidate);
            }
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{CommandHandler, HandlerResult};
    use async_trait::async_trait;
    use cw_protocol::DirectRule;
    use cw_reasoning::MockReasoner;
    use cw_reasoning::mock::ReasonerCall;
    use cw_rules::RuleExtractor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Rule extractor that counts how often it is consulted.
    struct CountingExtractor {
        inner: RuleExtractor,
        calls: Arc<AtomicUsize>,
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

    fn bag(value: Value) -> EntityBag {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn processor(reasoner: Option<Arc<MockReasoner>>) -> CommandProcessor {
        let reasoner = reasoner.map(|r| r as Arc<dyn Reasoner>);
        CommandProcessor::new(
            Box::new(RuleExtractor::new()),
            reasoner,
            HistoryStore::in_memory(100),
            ProcessorSettings::default(),
        )
    }

    fn counting(reasoner: Arc<MockReasoner>) -> (CommandProcessor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let extractor = CountingExtractor {
            inner: RuleExtractor::new(),
            calls: calls.clone(),
        };
        let processor = CommandProcessor::new(
            Box::new(extractor),
            Some(reasoner as Arc<dyn Reasoner>),
            HistoryStore::in_memory(100),
            ProcessorSettings::default(),
        );
        (processor, calls)
    }

    // ── Direct path ─────────────────────────────────────────────

    #[tokio::test]
    async fn direct_command_bypasses_pipeline() {
        let reasoner = Arc::new(MockReasoner::new());
        let (processor, extractor_calls) = counting(reasoner.clone());

        for input in ["scan example.com", "list tools", "help", "\"quit\""] {
            let result = processor.process(input, true).await;
            assert!(result.is_direct(), "{input} should be direct");
            assert!(result.success);
        }
        assert_eq!(extractor_calls.load(Ordering::SeqCst), 0);
        assert_eq!(reasoner.call_count(), 0);
        assert_eq!(processor.get_history().len(), 4);
    }

    #[tokio::test]
    async fn direct_scan_result_shape() {
        let result = processor(None).process("scan example.com", false).await;
        assert_eq!(result.command, "scan example.com");
        assert!(result.success);
        assert_eq!(result.detail, Resolution::Direct { rule: DirectRule::Pattern });
        assert!(!result.message.is_empty());
    }

    #[tokio::test]
    async fn leaked_output_rejected_without_ai() {
        let reasoner = Arc::new(MockReasoner::new());
        let (processor, extractor_calls) = counting(reasoner.clone());

        let result = processor
            .process(r#"{"intent": "scan", "confidence": 0.9}"#, true)
            .await;
        assert!(!result.success);
        assert!(result.command.is_empty());
        assert!(!result.message.is_empty());
        assert_eq!(reasoner.call_count(), 0);
        assert_eq!(extractor_calls.load(Ordering::SeqCst), 0);
        assert!(processor.get_history().is_empty());
    }

    #[tokio::test]
    async fn empty_input_fails_quietly() {
        let processor = processor(None);
        let result = processor.process("   ", true).await;
        assert!(!result.success);
        assert_eq!(result.message, "empty input");
        assert!(processor.get_history().is_empty());
    }

    // ── Rule path ───────────────────────────────────────────────

    #[tokio::test]
    async fn rule_path_port_range() {
        let processor = processor(None);
        let result = processor.process("check ports 1-3 on 10.0.0.5", false).await;
        assert!(result.success);
        assert_eq!(result.intent(), Some(Intent::Scan));
        let entities = result.entities().unwrap();
        assert_eq!(entities["target"], "10.0.0.5");
        assert_eq!(entities["ports"], json!([1, 2, 3]));
        assert_eq!(result.command, "scan 10.0.0.5 --ports 1-3");
    }

    #[tokio::test]
    async fn known_rule_intent_skips_ai_unless_requested() {
        let reasoner = Arc::new(MockReasoner::new());
        let processor = processor(Some(reasoner.clone()));
        let result = processor.process("check ports 1-3 on 10.0.0.5", false).await;
        assert_eq!(result.intent(), Some(Intent::Scan));
        assert_eq!(reasoner.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_without_reasoner() {
        let processor = processor(None);
        let result = processor.process("make me a sandwich", true).await;
        assert!(!result.success);
        assert_eq!(result.intent(), Some(Intent::Unknown));
        assert_eq!(result.command, "");
        assert_eq!(result.message, "could not determine intent");
        // Failed resolutions are still part of the history.
        assert_eq!(processor.get_history().len(), 1);
    }

    // ── Arbitration ─────────────────────────────────────────────

    #[tokio::test]
    async fn ai_resolves_unknown_rule_intent() {
        let reasoner = Arc::new(MockReasoner::new().understands(
            Intent::Recon,
            0.4,
            bag(json!({"target": "acme.org", "mode": "passive"})),
        ));
        let processor = processor(Some(reasoner.clone()));

        let result = processor.process("map out everything about acme", false).await;
        assert!(result.success);
        assert_eq!(result.intent(), Some(Intent::Recon));
        assert_eq!(result.command, "recon acme.org --mode passive");
        match &result.detail {
            Resolution::Nlp { reasoning, .. } => {
                assert_eq!(reasoning.as_deref(), Some("mock chose recon"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            reasoner.calls()[0],
            ReasonerCall::Understand {
                text: "map out everything about acme".into()
            }
        );
    }

    #[tokio::test]
    async fn low_confidence_ai_does_not_override_rules() {
        let reasoner = Arc::new(MockReasoner::new().understands(Intent::Recon, 0.6, EntityBag::new()));
        let processor = processor(Some(reasoner.clone()));

        let result = processor.process("check ports 1-3 on 10.0.0.5", true).await;
        assert_eq!(result.intent(), Some(Intent::Scan));
        assert_eq!(result.command, "scan 10.0.0.5 --ports 1-3");
        match &result.detail {
            Resolution::Nlp { reasoning, confidence, .. } => {
                assert!(reasoning.is_none());
                assert_eq!(*confidence, 0.5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(reasoner.call_count(), 1);
    }

    #[tokio::test]
    async fn confident_ai_overrides_rules_with_rule_entities() {
        let reasoner = Arc::new(MockReasoner::new().understands(
            Intent::VulnScan,
            0.9,
            bag(json!({"target": "ignored.example", "severity": "high"})),
        ));
        let processor = processor(Some(reasoner));

        let result = processor.process("check ports 1-3 on 10.0.0.5", true).await;
        assert_eq!(result.intent(), Some(Intent::VulnScan));
        // Rule-extracted target wins; severity is filled from the AI.
        assert_eq!(result.command, "vulnscan 10.0.0.5 --ports 1-3 --severity high");
    }

    #[tokio::test]
    async fn ai_unknown_keeps_rule_intent() {
        let reasoner = Arc::new(MockReasoner::new().with_understanding(UnderstandingResult {
            intent: Intent::Unknown,
            confidence: 1.0,
            entities: EntityBag::new(),
            reasoning: String::new(),
            source: "mock".into(),
        }));
        let processor = processor(Some(reasoner));
        let result = processor.process("check ports 1-3 on 10.0.0.5", true).await;
        assert_eq!(result.intent(), Some(Intent::Scan));
    }

    #[tokio::test]
    async fn unavailable_ai_message_carries_diagnostic() {
        let processor = processor(Some(Arc::new(MockReasoner::new())));
        let result = processor.process("make me a sandwich", false).await;
        assert!(!result.success);
        assert!(result.message.starts_with("could not determine intent ("));
        assert!(result.message.contains("no scripted answer"));
    }

    // ── Missing entities ────────────────────────────────────────

    #[tokio::test]
    async fn missing_target_resolved_above_threshold() {
        let reasoner = Arc::new(MockReasoner::new().with_resolution(EntityResolution {
            resolved: bag(json!({"target": "web01.internal.net"})),
            confidence: 0.8,
            reasoning: "the web server".into(),
        }));
        let processor = processor(Some(reasoner.clone()));

        let result = processor.process("scan the web server please", false).await;
        assert_eq!(result.command, "scan web01.internal.net");
        assert!(result.success);
        assert_eq!(
            reasoner.calls(),
            vec![ReasonerCall::ResolveEntities {
                text: "scan the web server please".into(),
                intent: Intent::Scan,
                missing: vec!["target".into()],
            }]
        );
    }

    #[tokio::test]
    async fn ai_list_target_is_unwrapped() {
        let reasoner = Arc::new(MockReasoner::new().understands(
            Intent::Recon,
            0.9,
            bag(json!({"target": ["acme.org"]})),
        ));
        let processor = processor(Some(reasoner));

        let result = processor.process("map out everything about acme", false).await;
        assert_eq!(result.command, "recon acme.org");
        assert_eq!(result.entities().unwrap()["target"], "acme.org");
        assert_eq!(result.message, "resolved recon: recon acme.org");
    }

    #[tokio::test]
    async fn ai_multi_value_target_is_resolved() {
        let reasoner = Arc::new(
            MockReasoner::new()
                .understands(
                    Intent::Recon,
                    0.9,
                    bag(json!({"target": ["a.example.com", "b.example.com"]})),
                )
                .with_resolution(EntityResolution {
                    resolved: bag(json!({"target": "a.example.com"})),
                    confidence: 0.8,
                    reasoning: String::new(),
                }),
        );
        let processor = processor(Some(reasoner.clone()));

        let result = processor.process("map out everything about acme", false).await;
        assert_eq!(result.command, "recon a.example.com");
        assert!(matches!(
            reasoner.calls().last(),
            Some(ReasonerCall::ResolveEntities { missing, .. }) if missing == &vec!["target".to_string()]
        ));
    }

    #[tokio::test]
    async fn missing_target_below_threshold_still_translates() {
        let reasoner = Arc::new(MockReasoner::new().with_resolution(EntityResolution {
            resolved: bag(json!({"target": "guess.example"})),
            confidence: 0.3,
            reasoning: String::new(),
        }));
        let processor = processor(Some(reasoner));

        let result = processor.process("scan the web server please", false).await;
        assert_eq!(result.command, "scan");
        assert!(result.success);
        assert!(result.message.contains("missing: target"));
        match &result.detail {
            Resolution::Nlp { missing, .. } => assert_eq!(missing, &vec!["target".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn per_key_confidence_overrides_overall() {
        let reasoner = Arc::new(MockReasoner::new().with_resolution(EntityResolution {
            resolved: bag(json!({
                "lhost": {"value": "10.0.0.1", "confidence": 0.9},
                "lport": {"value": 4444, "confidence": 0.2}
            })),
            confidence: 0.1,
            reasoning: String::new(),
        }));
        let processor = processor(Some(reasoner));

        let result = processor.process("build me a reverse shell", false).await;
        assert_eq!(result.intent(), Some(Intent::GenerateShell));
        assert_eq!(result.command, "generate shell --type reverse --lhost 10.0.0.1");
    }

    // ── Execution ───────────────────────────────────────────────

    struct Echo;

    #[async_trait]
    impl CommandHandler for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes the command"
        }

        async fn handle(&self, resolution: &ResolutionResult) -> HandlerResult<Value> {
            Ok(json!({"command": resolution.command}))
        }
    }

    #[tokio::test]
    async fn execute_prefers_registered_handler() {
        let mut processor = processor(None);
        processor.handlers_mut().register_prefix("scan", Arc::new(Echo));

        let (resolution, execution) = processor.process_and_execute("scan example.com", false).await;
        assert!(resolution.success);
        assert!(execution.success);
        assert_eq!(execution.handler.as_deref(), Some("echo"));
        assert_eq!(execution.output.unwrap()["command"], "scan example.com");
    }

    #[tokio::test]
    async fn execute_by_intent_for_nlp_result() {
        let mut processor = processor(None);
        processor.handlers_mut().register_intent(Intent::Scan, Arc::new(Echo));

        let (_, execution) = processor
            .process_and_execute("check ports 1-3 on 10.0.0.5", false)
            .await;
        assert_eq!(execution.handler.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn execute_without_handler_fails() {
        let processor = processor(None);
        let (_, execution) = processor.process_and_execute("recon example.com", false).await;
        assert!(!execution.success);
        assert!(execution.message.contains("recon"));
    }

    #[tokio::test]
    async fn execute_failed_resolution_is_noop() {
        let processor = processor(None);
        let (_, execution) = processor.process_and_execute("make me a sandwich", false).await;
        assert!(!execution.success);
        assert!(execution.message.starts_with("nothing to execute"));
    }

    #[tokio::test]
    async fn builtins() {
        let mut processor = processor(None);
        processor.handlers_mut().register_prefix("scan", Arc::new(Echo));

        let (_, help) = processor.process_and_execute("help", false).await;
        assert!(help.success);
        assert_eq!(help.handler.as_deref(), Some("builtin"));
        assert!(help.output.unwrap()["commands"].as_array().unwrap().len() > 3);

        let (_, tools) = processor.process_and_execute("tools", false).await;
        assert_eq!(tools.output.unwrap()["handlers"][0]["name"], "echo");

        let (_, history) = processor.process_and_execute("history", false).await;
        let entries = history.output.unwrap()["entries"].as_array().unwrap().clone();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["input"], "history");

        let (_, exit) = processor.process_and_execute("bye", false).await;
        assert_eq!(exit.output.unwrap()["exit"], true);
    }

    #[tokio::test]
    async fn history_clear_builtin() {
        let processor = processor(None);
        processor.process("scan example.com", false).await;
        let (_, cleared) = processor.process_and_execute("history clear", false).await;
        assert_eq!(cleared.output.unwrap()["cleared"], true);
        assert!(processor.get_history().is_empty());
    }

    // ── Suggestions ─────────────────────────────────────────────

    #[tokio::test]
    async fn suggestions_recent_first_then_templates() {
        let processor = processor(None);
        processor.process("scan example.com", false).await;
        processor.process("scan 10.0.0.1", false).await;
        processor.process("scan example.com", false).await;

        let suggestions = processor.get_suggestions("sc", 4);
        assert_eq!(
            suggestions,
            vec![
                "scan example.com",
                "scan 10.0.0.1",
                "scan <target>",
                "scan <target> --ports <ports>",
            ]
        );
        assert_eq!(processor.get_suggestions("", 2).len(), 2);
        assert!(processor.get_suggestions("zzz", 5).is_empty());
    }
}
