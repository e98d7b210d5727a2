//! Rule-based extractor: pattern matching for known command shapes.
//!
//! Handles the common case at zero cost and sub-millisecond latency. Input
//! it cannot classify comes back as `Intent::Unknown` and is left for the
//! reasoning engine.

use serde_json::{Value, json};

use cw_protocol::{EntityBag, Intent, ParsedCommand};

use crate::Extractor;
use crate::entities::{self, find_keyword};
use crate::patterns;

const SCAN_TYPES: &[&str] = &[
    "syn", "tcp", "udp", "stealth", "connect", "full", "quick", "fast", "service", "version",
];
const SEVERITIES: &[&str] = &["critical", "high", "medium", "low"];
const SHELL_TYPES: &[&str] = &["reverse", "bind"];
const SHELL_FORMATS: &[&str] = &[
    "bash", "sh", "python", "python3", "powershell", "php", "perl", "ruby", "netcat", "nc",
];
const PLATFORMS: &[&str] = &["linux", "windows", "macos", "android"];
const QUERY_PREFIXES: &[&str] = &["query", "ask", "question"];

/// Pattern-table classifier and entity extractor.
pub struct RuleExtractor;

impl RuleExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RuleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for RuleExtractor {
    fn parse(&self, text: &str) -> ParsedCommand {
        let tokens = entities::tokenize(text);
        let key_phrases = entities::key_phrases(&tokens);
        ParsedCommand {
            text: text.to_string(),
            ip_addresses: entities::extract_ips(text),
            hostnames: entities::extract_hostnames(text),
            urls: entities::extract_urls(text),
            ports: entities::extract_ports(text),
            options: entities::extract_options(text),
            key_phrases,
            tokens,
        }
    }

    fn classify(&self, text: &str, _parsed: &ParsedCommand) -> Intent {
        let intent = patterns::classify_text(text);
        tracing::debug!(intent = %intent, "rule-based classification");
        intent
    }

    fn extract_entities(&self, text: &str, intent: Intent, parsed: &ParsedCommand) -> EntityBag {
        let lower = text.to_lowercase();
        let mut bag = EntityBag::new();

        match intent {
            Intent::Scan => {
                insert_target(&mut bag, parsed);
                insert_ports(&mut bag, "ports", &parsed.ports);
                let scan_type = parsed
                    .options
                    .get("type")
                    .map(String::as_str)
                    .or_else(|| find_keyword(&lower, SCAN_TYPES));
                if let Some(scan_type) = scan_type {
                    bag.insert("scan_type".into(), json!(scan_type));
                }
            }
            Intent::Recon => {
                insert_target(&mut bag, parsed);
                if let Some(mode) = find_keyword(&lower, &["passive", "active"]) {
                    bag.insert("mode".into(), json!(mode));
                }
            }
            Intent::VulnScan => {
                insert_target(&mut bag, parsed);
                insert_ports(&mut bag, "ports", &parsed.ports);
                if let Some(severity) = find_keyword(&lower, SEVERITIES) {
                    bag.insert("severity".into(), json!(severity));
                }
            }
            Intent::Query => {
                let query = strip_query_prefix(text);
                if !query.is_empty() {
                    bag.insert("query".into(), json!(query));
                }
            }
            Intent::GenerateShell => {
                if let Some(shell_type) = find_keyword(&lower, SHELL_TYPES) {
                    bag.insert("shell_type".into(), json!(shell_type));
                }
                let lhost = entities::extract_lhost(text)
                    .or_else(|| parsed.ip_addresses.first().cloned());
                if let Some(lhost) = lhost {
                    bag.insert("lhost".into(), json!(lhost));
                }
                let lport = entities::extract_lport(text).or_else(|| parsed.ports.first().copied());
                if let Some(lport) = lport {
                    bag.insert("lport".into(), json!(lport));
                }
                if let Some(format) = find_keyword(&lower, SHELL_FORMATS) {
                    bag.insert("format".into(), json!(format));
                }
                if let Some(platform) = find_keyword(&lower, PLATFORMS) {
                    bag.insert("platform".into(), json!(platform));
                }
            }
            Intent::Help => {
                // "help scan" → topic "scan"
                let topic = parsed
                    .tokens
                    .iter()
                    .skip_while(|t| !t.eq_ignore_ascii_case("help"))
                    .nth(1)
                    .map(|t| Intent::from_label(t))
                    .filter(|i| !i.is_unknown());
                if let Some(topic) = topic {
                    bag.insert("topic".into(), json!(topic.as_str()));
                }
            }
            Intent::Tools | Intent::History | Intent::Exit | Intent::Unknown => {}
        }

        bag
    }
}

/// Target precedence: IP address, then host name, then URL.
fn insert_target(bag: &mut EntityBag, parsed: &ParsedCommand) {
    if let Some(target) = parsed.primary_target() {
        bag.insert("target".into(), json!(target));
    }
}

fn insert_ports(bag: &mut EntityBag, key: &str, ports: &[u16]) {
    if !ports.is_empty() {
        bag.insert(key.into(), Value::from(ports.to_vec()));
    }
}

fn strip_query_prefix(text: &str) -> String {
    let trimmed = text.trim();
    for prefix in QUERY_PREFIXES {
        let matches = trimmed
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if !matches {
            continue;
        }
        let rest = &trimmed[prefix.len()..];
        if rest.starts_with([' ', ':']) {
            return rest.trim_start_matches([' ', ':']).trim().to_string();
        }
    }
    trimmed.to_string()
}
