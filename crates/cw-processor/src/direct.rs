//! Direct-command short-circuit.
//!
//! Input that already is (or plainly names) a canonical command bypasses the
//! extractor and the reasoning engine. Rules are tried in order and the
//! first match wins: literal phrase table, fuzzy match against the same
//! table, bare command words, command-with-argument patterns.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use cw_protocol::DirectRule;

/// Minimum token-set overlap (Jaccard) for a fuzzy phrase match.
pub const FUZZY_THRESHOLD: f64 = 0.6;

/// Natural-language phrase → canonical command.
const PHRASE_TABLE: &[(&str, &str)] = &[
    ("show help", "help"),
    ("show me the help", "help"),
    ("what can you do", "help"),
    ("list commands", "help"),
    ("show commands", "help"),
    ("list tools", "tools"),
    ("show tools", "tools"),
    ("list all tools", "tools"),
    ("list available tools", "tools"),
    ("what tools are available", "tools"),
    ("show history", "history"),
    ("show command history", "history"),
    ("show my history", "history"),
    ("show previous commands", "history"),
    ("clear history", "history clear"),
    ("clear the history", "history clear"),
    ("exit the program", "exit"),
    ("quit the program", "exit"),
    ("close the session", "exit"),
    ("end the session", "exit"),
];

/// Bare command word → canonical command.
const SIMPLE_COMMANDS: &[(&str, &str)] = &[
    ("help", "help"),
    ("?", "help"),
    ("tools", "tools"),
    ("history", "history"),
    ("exit", "exit"),
    ("quit", "exit"),
    ("bye", "exit"),
];

const TARGET: &str = r"(?:\d{1,3}(?:\.\d{1,3}){3}(?:/\d{1,2})?|[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?)*\.[a-z]{2,})";
const OPTION: &str = r"(?:\s+--?[a-z][a-z0-9_-]*(?:[=\s][^\s-][^\s]*)?)";

static COMMAND_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(&format!(r"(?i)^(?:scan|recon|vulnscan)\s+{TARGET}{OPTION}*$")).unwrap(),
        Regex::new(r"(?i)^query\s+\S.*$").unwrap(),
        Regex::new(r"(?i)^help\s+[a-z_-]+$").unwrap(),
        Regex::new(r"(?i)^history\s+(?:clear|\d+)$").unwrap(),
        Regex::new(r"(?i)^generate\s+shell(?:\s+--?[a-z][a-z0-9_-]*(?:[=\s][^\s-][^\s]*)?)+$")
            .unwrap(),
    ]
});

/// Keys that mark leaked structured model output.
static RE_LEAKED_KEYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?:intent|confidence|entities|selected_index|resolved)"\s*:"#).unwrap());

/// Result of the direct-command check.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectMatch {
    Command { command: String, rule: DirectRule },
    /// The input is a structured model response, not operator text.
    LeakedOutput,
}

/// Trim, strip matching surrounding quotes, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut current = text.trim();
    loop {
        let stripped = ['"', '\'', '`'].iter().find_map(|q| {
            current
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        });
        match stripped {
            Some(inner) if current.len() >= 2 => current = inner.trim(),
            _ => break,
        }
    }
    current.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Structured model output pasted or echoed back as input.
pub fn looks_like_model_output(normalized: &str) -> bool {
    let trimmed = normalized.trim_start_matches("```json").trim_start_matches("```").trim();
    let keys = RE_LEAKED_KEYS.find_iter(trimmed).count();
    (trimmed.starts_with('{') && keys >= 1) || keys >= 2
}

fn phrase_key(text: &str) -> String {
    text.to_lowercase()
        .trim_end_matches(['?', '.', '!'])
        .trim()
        .to_string()
}

fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// |A ∩ B| / |A ∪ B|
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[derive(Debug, Default)]
pub struct DirectMatcher;

impl DirectMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Check normalized input against every rule, in order.
    pub fn match_input(&self, text: &str) -> Option<DirectMatch> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return None;
        }
        if looks_like_model_output(&normalized) {
            tracing::warn!("input looks like leaked model output");
            return Some(DirectMatch::LeakedOutput);
        }

        let key = phrase_key(&normalized);
        if let Some((_, command)) = PHRASE_TABLE.iter().find(|(phrase, _)| *phrase == key) {
            return Some(Self::command(command, DirectRule::Literal));
        }

        if let Some(command) = Self::fuzzy(&key) {
            return Some(Self::command(command, DirectRule::Fuzzy));
        }

        if let Some((_, command)) = SIMPLE_COMMANDS.iter().find(|(word, _)| *word == key) {
            return Some(Self::command(command, DirectRule::Simple));
        }

        if COMMAND_PATTERNS.iter().any(|re| re.is_match(&normalized)) {
            return Some(Self::command(&normalized, DirectRule::Pattern));
        }

        None
    }

    fn command(command: &str, rule: DirectRule) -> DirectMatch {
        DirectMatch::Command {
            command: command.to_string(),
            rule,
        }
    }

    fn fuzzy(key: &str) -> Option<&'static str> {
        let input = token_set(key);
        if input.len() < 2 {
            return None;
        }
        let mut best: Option<(&'static str, f64)> = None;
        for &(phrase, command) in PHRASE_TABLE {
            let score = jaccard(&input, &token_set(phrase));
            if score > FUZZY_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
                best = Some((command, score));
            }
        }
        best.map(|(command, _)| command)
    }
}
