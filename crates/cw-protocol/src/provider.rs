use serde::{Deserialize, Serialize};

use crate::understanding::NO_PROVIDER;

/// Where a provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Networked API (Anthropic, OpenAI, Bedrock).
    Cloud,
    /// Engine on the operator's machine (Ollama, llama.cpp server).
    Local,
}

/// Which providers are eligible, and in what order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AiMode {
    /// Cloud providers first, then local engines.
    #[default]
    Auto,
    /// Cloud providers only.
    Cloud,
    /// Local engines only.
    Local,
    /// Local engines first, cloud as escalation.
    Hybrid,
}

impl AiMode {
    pub fn allows(&self, kind: ProviderKind) -> bool {
        match self {
            Self::Auto | Self::Hybrid => true,
            Self::Cloud => kind == ProviderKind::Cloud,
            Self::Local => kind == ProviderKind::Local,
        }
    }
}

impl std::str::FromStr for AiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cloud" => Ok(Self::Cloud),
            "local" => Ok(Self::Local),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown ai mode: {other}")),
        }
    }
}

/// Catalog entry for a text-generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub name: String,
    pub kind: ProviderKind,
    /// Availability as of the last probe.
    pub available: bool,
    /// Number of models the provider reports (1 for single-model APIs).
    pub capacity: u32,
}

/// Result of querying one specific provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.response.is_some()
    }
}

/// Result of querying through the fallback order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Provider that answered, or `none`.
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BestOutcome {
    pub fn answered(provider: impl Into<String>, response: String) -> Self {
        Self {
            response: Some(response),
            provider: provider.into(),
            error: None,
        }
    }

    pub fn none(error: impl Into<String>) -> Self {
        Self {
            response: None,
            provider: NO_PROVIDER.to_string(),
            error: Some(error.into()),
        }
    }

    pub fn is_none(&self) -> bool {
        self.provider == NO_PROVIDER
    }
}
