//! Model-output repair cascade.
//!
//! Providers are asked for one JSON object and frequently return something
//! else: prose around the object, a fenced block, a truncated object, or
//! bare `"key": value` pairs. Each [`RepairStrategy`] tries one way of
//! recovering an object; [`RepairCascade`] runs them in order and stops at
//! the first hit. Nothing here returns an error.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Maximum number of characters of raw output quoted in a fallback diagnostic.
pub const DIAGNOSTIC_EXCERPT_CHARS: usize = 120;

/// One way of turning raw model output into a JSON object.
pub trait RepairStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn repair(&self, raw: &str) -> Option<Map<String, Value>>;
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

// ── Stage 1 ──────────────────────────────────────────────────

/// The whole response is already a JSON object.
pub struct DirectParse;

impl RepairStrategy for DirectParse {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn repair(&self, raw: &str) -> Option<Map<String, Value>> {
        parse_object(raw)
    }
}

// ── Stage 2 ──────────────────────────────────────────────────

/// The object sits inside a markdown code fence.
pub struct FencedBlock;

impl FencedBlock {
    fn fenced(text: &str) -> Option<&str> {
        let start = text.find("```")?;
        let after_fence = &text[start + 3..];
        // Skip an info string such as `json` up to the end of the line.
        let body_start = after_fence
            .find('\n')
            .filter(|nl| {
                after_fence[..*nl]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            })
            .map(|nl| nl + 1)
            .unwrap_or(0);
        let body = &after_fence[body_start..];
        let end = body.find("```")?;
        Some(body[..end].trim())
    }
}

impl RepairStrategy for FencedBlock {
    fn name(&self) -> &'static str {
        "fenced_block"
    }

    fn repair(&self, raw: &str) -> Option<Map<String, Value>> {
        let inner = Self::fenced(raw)?;
        // `json{...}` on one line: drop the label.
        let inner = inner.trim_start_matches("json").trim();
        parse_object(inner)
    }
}

// ── Stage 3 ──────────────────────────────────────────────────

/// The first balanced `{...}` span that parses.
///
/// Brace counting ignores braces inside string literals. Each opening brace
/// is tried as a start position in turn.
pub struct BalancedBraces;

impl BalancedBraces {
    fn span_from(text: &str, start: usize) -> Option<&str> {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, c) in text[start..].char_indices() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(&text[start..start + offset + 1]);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl RepairStrategy for BalancedBraces {
    fn name(&self) -> &'static str {
        "balanced_braces"
    }

    fn repair(&self, raw: &str) -> Option<Map<String, Value>> {
        raw.match_indices('{')
            .filter_map(|(start, _)| Self::span_from(raw, start))
            .find_map(parse_object)
    }
}

// ── Stage 4 ──────────────────────────────────────────────────

/// An object missing its leading `{` or its closing braces.
pub struct MissingBraces;

impl MissingBraces {
    fn reconstruct(raw: &str) -> Option<String> {
        let trimmed = raw.trim().trim_end_matches(',').trim_end();
        if trimmed.is_empty() {
            return None;
        }

        let mut text = String::with_capacity(trimmed.len() + 4);
        if !trimmed.starts_with('{') {
            // Only rebuild things that look like `"key": ...`.
            if !trimmed.starts_with('"') || !trimmed.contains(':') {
                return None;
            }
            text.push('{');
        }
        text.push_str(trimmed);

        let mut in_string = false;
        let mut escaped = false;
        let mut depth: i64 = 0;
        for c in text.chars() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        if in_string {
            text.push('"');
        }
        if depth < 0 {
            return None;
        }
        for _ in 0..depth {
            text.push('}');
        }
        Some(text)
    }
}

impl RepairStrategy for MissingBraces {
    fn name(&self) -> &'static str {
        "missing_braces"
    }

    fn repair(&self, raw: &str) -> Option<Map<String, Value>> {
        parse_object(&Self::reconstruct(raw)?)
    }
}

// ── Stage 5 ──────────────────────────────────────────────────

static RE_LABELED_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)"?([A-Za-z_][A-Za-z0-9_]*)"?\s*:\s*("(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?|true|false|null|[A-Za-z_][A-Za-z0-9_.-]*)\s*(?:[,}\n]|$)"#,
    )
    .unwrap()
});

static RE_ENTITIES_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"?\bentities"?\s*:\s*\{"#).unwrap());

/// Individually labeled fields, assembled into a minimal object.
///
/// Scalars are taken as they are. A labeled `entities` object is recovered
/// whole, balanced or truncated, and its pairs are not lifted to the top
/// level. Keys are lowercased. Absent keys are filled from `defaults`.
pub struct LabeledFields {
    defaults: Map<String, Value>,
}

impl LabeledFields {
    pub fn new(defaults: Map<String, Value>) -> Self {
        Self { defaults }
    }

    /// The `entities` object and the byte range it occupies in `raw`.
    fn entities(raw: &str) -> Option<(Map<String, Value>, std::ops::Range<usize>)> {
        let label = RE_ENTITIES_LABEL.find(raw)?;
        let open = label.end() - 1;
        if let Some(span) = BalancedBraces::span_from(raw, open) {
            let range = open..open + span.len();
            // An unparseable but closed span still belongs to `entities`.
            return Some((parse_object(span).unwrap_or_default(), range));
        }
        let rest = &raw[open..];
        let line_end = rest.find('\n').unwrap_or(rest.len());
        [rest.len(), line_end].into_iter().find_map(|end| {
            let object = parse_object(&MissingBraces::reconstruct(&rest[..end])?)?;
            Some((object, open..open + end))
        })
    }
}

impl RepairStrategy for LabeledFields {
    fn name(&self) -> &'static str {
        "labeled_fields"
    }

    fn repair(&self, raw: &str) -> Option<Map<String, Value>> {
        let mut found = Map::new();
        let mut nested = 0..0;
        if let Some((entities, range)) = Self::entities(raw) {
            found.insert("entities".into(), Value::Object(entities));
            nested = range;
        }
        for caps in RE_LABELED_FIELD.captures_iter(raw) {
            if caps.get(0).is_some_and(|m| nested.contains(&m.start())) {
                continue;
            }
            let key = caps[1].to_ascii_lowercase();
            if found.contains_key(&key) {
                continue;
            }
            let literal = &caps[2];
            let value = serde_json::from_str::<Value>(literal)
                .unwrap_or_else(|_| Value::String(literal.to_string()));
            found.insert(key, value);
        }
        if found.is_empty() {
            return None;
        }
        for (key, value) in &self.defaults {
            found.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Some(found)
    }
}

// ── Stage 6 ──────────────────────────────────────────────────

/// First `max` characters of `raw`, on a char boundary.
pub fn excerpt(raw: &str, max: usize) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Diagnostic used when no stage recovered a usable object.
pub fn fallback_diagnostic(raw: &str) -> String {
    format!(
        "could not interpret model output: {}",
        excerpt(raw, DIAGNOSTIC_EXCERPT_CHARS)
    )
}

// ── Cascade ──────────────────────────────────────────────────

/// A recovered object and the stage that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub value: Map<String, Value>,
    pub stage: &'static str,
}

/// Ordered list of strategies.
pub struct RepairCascade {
    strategies: Vec<Box<dyn RepairStrategy>>,
}

impl RepairCascade {
    /// A cascade with no strategies.
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Stages 1–5, with `defaults` filling absent labeled fields.
    pub fn standard(defaults: Map<String, Value>) -> Self {
        let mut cascade = Self::empty();
        cascade.push(Box::new(DirectParse));
        cascade.push(Box::new(FencedBlock));
        cascade.push(Box::new(BalancedBraces));
        cascade.push(Box::new(MissingBraces));
        cascade.push(Box::new(LabeledFields::new(defaults)));
        cascade
    }

    /// Append a strategy after the existing ones.
    pub fn push(&mut self, strategy: Box<dyn RepairStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn stages(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, raw: &str) -> Option<Repaired> {
        self.strategies.iter().find_map(|strategy| {
            strategy.repair(raw).map(|value| Repaired {
                value,
                stage: strategy.name(),
            })
        })
    }
}
