//! The provider trait every backend implements.

use async_trait::async_trait;
use serde::Serialize;

use cw_protocol::{ProviderDescriptor, ProviderKind};

use crate::error::ProviderResult;

/// One completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A text-generation backend, networked or local.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in preference lists ("anthropic", "ollama", …).
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Check reachability. Returns the number of models on success.
    async fn probe(&self) -> ProviderResult<u32>;

    /// Run one completion and return the raw response text.
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String>;

    fn descriptor(&self, available: bool, capacity: u32) -> ProviderDescriptor {
        ProviderDescriptor {
            id: self.id().to_string(),
            name: self.name().to_string(),
            kind: self.kind(),
            available,
            capacity,
        }
    }
}
