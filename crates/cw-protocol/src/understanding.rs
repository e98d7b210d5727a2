use serde::{Deserialize, Serialize};

use crate::command::EntityBag;
use crate::intent::Intent;

/// Marker used for `source` / `provider` when no provider produced a result.
pub const NO_PROVIDER: &str = "none";

/// Source label for results produced by the rule-based extractor.
pub const RULES_SOURCE: &str = "rules";

/// Structured classification of operator text.
///
/// Produced by both the rule-based path and the AI path. `intent` is always
/// a member of the closed set; unparseable labels become `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderstandingResult {
    pub intent: Intent,
    /// Confidence in [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub entities: EntityBag,
    #[serde(default)]
    pub reasoning: String,
    /// What produced this result: `rules`, a provider id, or `none`.
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    NO_PROVIDER.to_string()
}

/// Confidence assigned to rule-based classifications, which carry no score
/// of their own.
pub const RULE_CONFIDENCE: f64 = 0.5;

impl UnderstandingResult {
    pub fn from_rules(intent: Intent, entities: EntityBag) -> Self {
        Self {
            intent,
            confidence: if intent.is_unknown() { 0.0 } else { RULE_CONFIDENCE },
            entities,
            reasoning: String::new(),
            source: RULES_SOURCE.to_string(),
        }
    }

    /// Terminal fallback when model output could not be interpreted.
    pub fn fallback(diagnostic: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            entities: EntityBag::new(),
            reasoning: diagnostic.into(),
            source: source.into(),
        }
    }

    /// No provider could be reached at all.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::fallback(message, NO_PROVIDER)
    }

    pub fn is_from_provider(&self) -> bool {
        self.source != NO_PROVIDER && self.source != RULES_SOURCE
    }
}

/// Outcome of asking a provider to fill in missing entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityResolution {
    /// Resolved values. A value may be a bare value, or an object
    /// `{"value": …, "confidence": …}` carrying a per-key confidence.
    #[serde(default)]
    pub resolved: EntityBag,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Outcome of asking a provider to pick between candidate interpretations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityResolution {
    /// Index into the candidate list, `None` when nothing was selected.
    pub selected_index: Option<usize>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// A single step of a multi-step plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub command: String,
    #[serde(default)]
    pub description: String,
}

/// Ordered actions proposed for an intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(default)]
    pub actions: Vec<PlannedAction>,
    #[serde(default)]
    pub reasoning: String,
}
