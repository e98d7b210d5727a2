//! Named prompt templates with `{placeholder}` substitution.
//!
//! Only placeholders supplied at render time are replaced, so literal JSON
//! examples inside a template survive untouched.
//!
//! Template text must not contain any of the proxy's reasoning keywords,
//! otherwise every request would be routed to the high-capability tier
//! regardless of what the operator typed.

use std::collections::HashMap;

pub const UNDERSTAND_COMMAND: &str = "understand_command";
pub const RESOLVE_ENTITIES: &str = "resolve_entities";
pub const RESOLVE_AMBIGUITY: &str = "resolve_ambiguity";
pub const PLAN_ACTIONS: &str = "plan_actions";

/// System instruction sent with every template.
pub const SYSTEM_PROMPT: &str = "You translate operator requests for a security \
assessment console into structured data. Respond with exactly one compact JSON \
object and nothing else: no markdown, no code fences, no commentary.";

const UNDERSTAND_TEMPLATE: &str = r#"Classify the operator request below.

Request: {text}
Tokens: {tokens}
Addresses: {ips}
Host names: {hostnames}
URLs: {urls}
Ports: {ports}
Options: {options}

Allowed intents: scan, recon, vuln_scan, query, generate_shell, tools, help, history, exit, unknown.

Reply with:
{"intent": "<intent>", "confidence": <0.0-1.0>, "entities": {"target": "...", "ports": [..]}, "reasoning": "<one sentence>"}

Entity keys by intent: scan (target, ports, scan_type), recon (target, mode), vuln_scan (target, ports, severity), query (query), generate_shell (shell_type, lhost, lport, format, platform), help (topic)."#;

const RESOLVE_ENTITIES_TEMPLATE: &str = r#"The operator request below was classified as "{intent}" but some values are missing.

Request: {text}
Known values: {entities}
Missing keys: {missing}

Infer only the missing keys from the request. Reply with:
{"resolved": {"<key>": {"value": <value>, "confidence": <0.0-1.0>}}, "confidence": <0.0-1.0>, "reasoning": "<one sentence>"}

Leave out any key you cannot infer."#;

const RESOLVE_AMBIGUITY_TEMPLATE: &str = r#"Several interpretations fit the operator request below. Pick the best one.

Request: {text}
Candidates:
{candidates}

Reply with:
{"selected_index": <zero-based index or null>, "confidence": <0.0-1.0>, "reasoning": "<one sentence>"}"#;

const PLAN_ACTIONS_TEMPLATE: &str = r#"Propose the console commands that fulfil the operator request below, in order.

Request: {text}
Intent: {intent}
Known values: {entities}

Reply with:
{"actions": [{"command": "<console command>", "description": "<what it does>"}], "reasoning": "<one sentence>"}

Use at most five actions."#;

/// Store of named templates, pre-populated with the built-in set.
#[derive(Debug, Clone)]
pub struct PromptStore {
    templates: HashMap<String, String>,
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptStore {
    pub fn new() -> Self {
        let templates = [
            (UNDERSTAND_COMMAND, UNDERSTAND_TEMPLATE),
            (RESOLVE_ENTITIES, RESOLVE_ENTITIES_TEMPLATE),
            (RESOLVE_AMBIGUITY, RESOLVE_AMBIGUITY_TEMPLATE),
            (PLAN_ACTIONS, PLAN_ACTIONS_TEMPLATE),
        ]
        .into_iter()
        .map(|(name, body)| (name.to_string(), body.to_string()))
        .collect();
        Self { templates }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Add or replace a template.
    pub fn set(&mut self, name: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(name.into(), template.into());
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Fill a template in one pass, so substituted text is never expanded
    /// again. Returns `None` for an unknown template name.
    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Option<String> {
        let mut rest = self.get(name)?;
        let mut out = String::with_capacity(rest.len());
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open + 1..];
            let value = tail.find('}').and_then(|close| {
                let key = &tail[..close];
                vars.iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| (*v, close))
            });
            match value {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = tail;
                }
            }
        }
        out.push_str(rest);
        Some(out)
    }
}
