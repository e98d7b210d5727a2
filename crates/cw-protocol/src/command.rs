use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named parameter values extracted from operator input.
///
/// Values are strings, numbers or lists. Keys are intent-specific; consumers
/// ignore keys they do not know. Backed by a sorted map so serialization
/// and iteration order are deterministic.
pub type EntityBag = serde_json::Map<String, serde_json::Value>;

/// Operator text broken into tokens and typed entity buckets.
///
/// Produced once by the rule-based extractor and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Original input text.
    pub text: String,
    /// Whitespace tokens with surrounding punctuation stripped.
    pub tokens: Vec<String>,
    /// IPv4 addresses (optionally with a CIDR suffix), in order of appearance.
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    /// Domain / host names, in order of appearance.
    #[serde(default)]
    pub hostnames: Vec<String>,
    /// `http(s)://` URLs, in order of appearance.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Validated ports (1–65535), de-duplicated and sorted.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// `-x` / `--name[=value]` options. Bare flags map to `"true"`.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Runs of non-stopword tokens.
    #[serde(default)]
    pub key_phrases: Vec<String>,
}

impl ParsedCommand {
    /// First target-like value by precedence: IP, then host name, then URL.
    pub fn primary_target(&self) -> Option<&str> {
        self.ip_addresses
            .first()
            .or_else(|| self.hostnames.first())
            .or_else(|| self.urls.first())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_target_prefers_ip() {
        let parsed = ParsedCommand {
            ip_addresses: vec!["10.0.0.5".into()],
            hostnames: vec!["example.com".into()],
            urls: vec!["https://acme.org".into()],
            ..Default::default()
        };
        assert_eq!(parsed.primary_target(), Some("10.0.0.5"));
    }

    #[test]
    fn primary_target_falls_back_to_url() {
        let parsed = ParsedCommand {
            urls: vec!["https://acme.org/login".into()],
            ..Default::default()
        };
        assert_eq!(parsed.primary_target(), Some("https://acme.org/login"));
    }

    #[test]
    fn parsed_command_missing_buckets_default() {
        let json = r#"{"text": "help", "tokens": ["help"]}"#;
        let parsed: ParsedCommand = serde_json::from_str(json).unwrap();
        assert!(parsed.ports.is_empty());
        assert!(parsed.options.is_empty());
        assert!(parsed.primary_target().is_none());
    }
}
