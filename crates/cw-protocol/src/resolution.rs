use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::{EntityBag, ParsedCommand};
use crate::intent::Intent;

/// Which direct-command rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectRule {
    /// Exact natural-language phrase from the phrase table.
    Literal,
    /// Token-set overlap against the phrase table.
    Fuzzy,
    /// Bare command word ("help", "tools", …).
    Simple,
    /// Command-with-argument pattern ("scan example.com").
    Pattern,
}

/// How a resolution was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Matched a canonical command without interpretation.
    Direct { rule: DirectRule },
    /// Went through parsing, classification and translation.
    Nlp {
        parsed: ParsedCommand,
        intent: Intent,
        #[serde(default)]
        entities: EntityBag,
        #[serde(default)]
        confidence: f64,
        /// AI reasoning, kept only when the AI intent won arbitration.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
        /// Required entities still absent after resolution.
        #[serde(default)]
        missing: Vec<String>,
    },
}

/// The externally visible unit of work: operator text resolved to a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Input as received.
    pub original: String,
    /// Canonical command string (empty when nothing could be resolved).
    pub command: String,
    pub success: bool,
    /// Human-readable outcome. Never empty.
    pub message: String,
    #[serde(flatten)]
    pub detail: Resolution,
}

impl ResolutionResult {
    pub fn direct(original: impl Into<String>, command: impl Into<String>, rule: DirectRule) -> Self {
        let command = command.into();
        Self {
            original: original.into(),
            message: format!("direct command: {command}"),
            command,
            success: true,
            detail: Resolution::Direct { rule },
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.detail, Resolution::Direct { .. })
    }

    /// Final intent for NLP resolutions.
    pub fn intent(&self) -> Option<Intent> {
        match &self.detail {
            Resolution::Nlp { intent, .. } => Some(*intent),
            Resolution::Direct { .. } => None,
        }
    }

    pub fn entities(&self) -> Option<&EntityBag> {
        match &self.detail {
            Resolution::Nlp { entities, .. } => Some(entities),
            Resolution::Direct { .. } => None,
        }
    }

    /// First word of the command, used for handler dispatch.
    pub fn command_prefix(&self) -> Option<&str> {
        self.command.split_whitespace().next()
    }
}

/// Result of dispatching a resolved command to a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: String,
    pub success: bool,
    /// Handler that ran the command, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// Structured handler output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    pub message: String,
}

impl ExecutionResult {
    pub fn failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: false,
            handler: None,
            output: None,
            message: message.into(),
        }
    }
}

/// One persisted resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// UUIDv7 for time-sortability. Older files without ids get a fresh one.
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    pub input: String,
    pub result: ResolutionResult,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(input: impl Into<String>, result: ResolutionResult) -> Self {
        Self {
            id: Uuid::now_v7(),
            input: input.into(),
            result,
            timestamp: Utc::now(),
        }
    }

    /// Check the fields that deserialization alone cannot guarantee.
    pub fn validate(&self) -> Result<(), String> {
        if self.input.trim().is_empty() {
            return Err("empty input".into());
        }
        if self.result.message.trim().is_empty() {
            return Err("empty result message".into());
        }
        Ok(())
    }
}
