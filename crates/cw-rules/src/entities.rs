//! Entity extractors: targets, ports, options and key phrases.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static RE_IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(?:/(?:3[0-2]|[12]?\d))?\b",
    )
    .unwrap()
});

static RE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhttps?://[^\s"'<>]+"#).unwrap());

static RE_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}\b").unwrap()
});

/// `ports 80,443`, `port 22`, `-p 1-1024`, `--ports=8080`.
static RE_PORTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bports?\b|(?:^|\s)-p)\s*[:=]?\s*(\d{1,5}(?:\s*[-,]\s*\d{1,5})*)").unwrap()
});

static RE_LPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blport\s*[:=]?\s*(\d{1,5})\b").unwrap());

static RE_LHOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blhost\s*[:=]?\s*((?:\d{1,3}\.){3}\d{1,3}|[a-z0-9.-]+\.[a-z]{2,63})\b")
        .unwrap()
});

static RE_LONG_OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--([A-Za-z][\w-]*)(?:=(.+))?$").unwrap());

static RE_SHORT_OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-([A-Za-z]\w*)$").unwrap());

/// Filename extensions the domain pattern would otherwise accept as TLDs.
const FILE_EXTENSIONS: &[&str] = &[
    "exe", "php", "py", "sh", "ps1", "txt", "json", "xml", "html", "htm", "js", "bat", "dll",
    "elf", "bin", "so", "log", "csv", "jsp", "asp", "aspx", "pl", "rb", "war", "jar", "zip",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "on", "in", "at", "to", "for", "of", "and", "or", "with", "from", "by",
    "is", "are", "be", "me", "my", "please", "can", "you", "could", "would", "it", "this",
    "that", "some", "any", "all", "i", "we", "do", "does", "what", "how", "which", "against",
];

const PUNCTUATION: &[char] = &[',', ';', '!', '?', '"', '\'', '(', ')', '[', ']', '{', '}', '.', ':'];

// ── Tokens ────────────────────────────────────────────────────

/// Split on whitespace and strip surrounding punctuation.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| word.trim_matches(PUNCTUATION).to_string())
        .filter(|word| !word.is_empty())
        .collect()
}

/// Runs of consecutive non-stopword, non-option tokens, lower-cased.
pub fn key_phrases(tokens: &[String]) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for token in tokens {
        let lower = token.to_lowercase();
        if STOPWORDS.contains(&lower.as_str()) || token.starts_with('-') {
            if !current.is_empty() {
                phrases.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(lower);
        }
    }
    if !current.is_empty() {
        phrases.push(current.join(" "));
    }
    phrases
}

// ── Targets ───────────────────────────────────────────────────

pub fn extract_ips(text: &str) -> Vec<String> {
    dedup_in_order(RE_IPV4.find_iter(text).map(|m| m.as_str().to_string()))
}

pub fn extract_urls(text: &str) -> Vec<String> {
    dedup_in_order(RE_URL.find_iter(text).map(|m| {
        m.as_str()
            .trim_end_matches(['.', ',', ';', ')', ']'])
            .to_string()
    }))
}

pub fn extract_hostnames(text: &str) -> Vec<String> {
    dedup_in_order(
        RE_DOMAIN
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|host| {
                let tld = host.rsplit('.').next().unwrap_or_default();
                !FILE_EXTENSIONS.contains(&tld)
            }),
    )
}

// ── Ports ─────────────────────────────────────────────────────

/// Parse a port spec: single values, comma lists and dash ranges.
///
/// Values outside 1–65535 and malformed pieces are dropped. A reversed range
/// (`90-80`) is read low-to-high. The result is sorted and de-duplicated.
pub fn parse_port_spec(spec: &str) -> Vec<u16> {
    let mut ports = BTreeSet::new();

    for piece in spec.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        match piece.split_once('-') {
            Some((start, end)) => {
                let (Some(start), Some(end)) = (valid_port(start), valid_port(end)) else {
                    tracing::debug!(piece, "dropping invalid port range");
                    continue;
                };
                let (low, high) = if start <= end { (start, end) } else { (end, start) };
                ports.extend(low..=high);
            }
            None => {
                if let Some(port) = valid_port(piece) {
                    ports.insert(port);
                }
            }
        }
    }

    ports.into_iter().collect()
}

fn valid_port(s: &str) -> Option<u16> {
    match s.trim().parse::<u32>() {
        Ok(n) if (1..=65535).contains(&n) => Some(n as u16),
        _ => None,
    }
}

/// Every port mentioned with a port keyword or `-p` flag.
pub fn extract_ports(text: &str) -> Vec<u16> {
    let mut all = BTreeSet::new();
    for caps in RE_PORTS.captures_iter(text) {
        all.extend(parse_port_spec(&caps[1]));
    }
    all.into_iter().collect()
}

/// Render ports for a command line: runs of three or more consecutive
/// ports collapse to `a-b`, everything else is comma-separated.
pub fn compress_ports(ports: &[u16]) -> String {
    let mut sorted: Vec<u16> = ports.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let start = sorted[i];
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1] == sorted[j] + 1 {
            j += 1;
        }
        if j - i >= 2 {
            parts.push(format!("{start}-{}", sorted[j]));
        } else {
            for port in &sorted[i..=j] {
                parts.push(port.to_string());
            }
        }
        i = j + 1;
    }
    parts.join(",")
}

pub fn extract_lport(text: &str) -> Option<u16> {
    RE_LPORT
        .captures(text)
        .and_then(|caps| valid_port(&caps[1]))
}

pub fn extract_lhost(text: &str) -> Option<String> {
    RE_LHOST.captures(text).map(|caps| caps[1].to_lowercase())
}

// ── Options ───────────────────────────────────────────────────

/// Collect `-x` and `--name[=value]` options from tokens.
pub fn extract_options(text: &str) -> BTreeMap<String, String> {
    let mut options = BTreeMap::new();
    for word in text.split_whitespace() {
        if let Some(caps) = RE_LONG_OPTION.captures(word) {
            let value = caps
                .get(2)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "true".to_string());
            options.insert(caps[1].to_lowercase(), value);
        } else if let Some(caps) = RE_SHORT_OPTION.captures(word) {
            options.insert(caps[1].to_string(), "true".to_string());
        }
    }
    options
}

// ── Keyword lookups ───────────────────────────────────────────

/// First keyword from `choices` that appears as a whole word in `lower`.
pub fn find_keyword<'a>(lower: &str, choices: &[&'a str]) -> Option<&'a str> {
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    choices.iter().copied().find(|choice| words.contains(choice))
}

fn dedup_in_order(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}
