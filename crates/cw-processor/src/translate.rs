//! Intent + entities → canonical command string.

use serde_json::Value;

use cw_protocol::{EntityBag, Intent};
use cw_rules::{compress_ports, parse_port_spec};

/// Entities an intent cannot be executed without.
pub fn required_entities(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Scan | Intent::Recon | Intent::VulnScan => &["target"],
        Intent::Query => &["query"],
        Intent::GenerateShell => &["lhost", "lport"],
        Intent::Tools | Intent::Help | Intent::History | Intent::Exit | Intent::Unknown => &[],
    }
}

/// Absent, null, blank and empty-list values all count as missing.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Present and renderable as a single command-line argument.
pub fn is_renderable(value: Option<&Value>) -> bool {
    value.and_then(scalar_text).is_some()
}

/// Required keys that cannot be rendered, so a list or object target counts
/// as missing.
pub fn missing_entities(intent: Intent, entities: &EntityBag) -> Vec<String> {
    required_entities(intent)
        .iter()
        .filter(|key| !is_renderable(entities.get(**key)))
        .map(|key| key.to_string())
        .collect()
}

/// Ports from a list of numbers/strings, a spec string, or a single number.
pub fn ports_of(value: &Value) -> Vec<u16> {
    let spec = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    parse_port_spec(&spec)
}

/// Rewrite a `ports` entry into a sorted, de-duplicated list of numbers.
/// Unparseable values are removed.
pub fn normalize_ports(entities: &mut EntityBag) {
    if let Some(value) = entities.get("ports") {
        let ports = ports_of(value);
        if ports.is_empty() {
            entities.remove("ports");
        } else {
            entities.insert("ports".into(), Value::from(ports));
        }
    }
}

/// A one-element list holding a scalar becomes that scalar.
pub fn unwrap_singleton(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.len() == 1 && !items[0].is_array() && !items[0].is_object() => {
            items.remove(0)
        }
        other => other,
    }
}

/// Normalize ports, then unwrap one-element lists everywhere else.
pub fn normalize_entities(entities: &mut EntityBag) {
    normalize_ports(entities);
    for (key, value) in entities.iter_mut() {
        if key != "ports" {
            *value = unwrap_singleton(std::mem::take(value));
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Scalar entity as command-line text.
fn text_of(entities: &EntityBag, key: &str) -> Option<String> {
    scalar_text(entities.get(key)?)
}

struct CommandLine(Vec<String>);

impl CommandLine {
    fn new(head: &str) -> Self {
        Self(vec![head.to_string()])
    }

    fn arg(mut self, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.0.push(value);
        }
        self
    }

    fn flag(mut self, name: &str, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.0.push(format!("--{name}"));
            self.0.push(value);
        }
        self
    }

    fn ports(self, entities: &EntityBag) -> Self {
        let ports = entities.get("ports").map(ports_of).unwrap_or_default();
        let rendered = (!ports.is_empty()).then(|| compress_ports(&ports));
        self.flag("ports", rendered)
    }

    fn finish(self) -> String {
        self.0.join(" ")
    }
}

/// Format the canonical command for an intent.
///
/// Missing required entities are simply left out; `Unknown` yields an empty
/// string.
pub fn translate(intent: Intent, entities: &EntityBag) -> String {
    match intent {
        Intent::Scan => CommandLine::new("scan")
            .arg(text_of(entities, "target"))
            .ports(entities)
            .flag("type", text_of(entities, "scan_type"))
            .finish(),
        Intent::Recon => CommandLine::new("recon")
            .arg(text_of(entities, "target"))
            .flag("mode", text_of(entities, "mode"))
            .finish(),
        Intent::VulnScan => CommandLine::new("vulnscan")
            .arg(text_of(entities, "target"))
            .ports(entities)
            .flag("severity", text_of(entities, "severity"))
            .finish(),
        Intent::Query => CommandLine::new("query")
            .arg(text_of(entities, "query"))
            .finish(),
        Intent::GenerateShell => CommandLine::new("generate shell")
            .flag("type", text_of(entities, "shell_type"))
            .flag("lhost", text_of(entities, "lhost"))
            .flag("lport", text_of(entities, "lport"))
            .flag("format", text_of(entities, "format"))
            .flag("platform", text_of(entities, "platform"))
            .finish(),
        Intent::Help => CommandLine::new("help")
            .arg(text_of(entities, "topic"))
            .finish(),
        Intent::Tools => "tools".to_string(),
        Intent::History => "history".to_string(),
        Intent::Exit => "exit".to_string(),
        Intent::Unknown => String::new(),
    }
}
