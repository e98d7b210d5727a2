//! `[ai]` configuration section and backend construction.

use std::sync::Arc;

use serde::Deserialize;

use cw_protocol::AiMode;

use crate::backends::{
    AnthropicBackend, AnthropicConfig, BedrockBackend, BedrockConfig, LlamaCppConfig,
    OllamaBackend, OllamaConfig, OpenAiCompatBackend, OpenAiConfig,
};
use crate::provider::Provider;
use crate::proxy::ProxySettings;

/// Provider selection and generation parameters.
///
/// Cloud backends and llama.cpp are registered only when their section is
/// present. Ollama is registered unless `ollama.enabled = false`.
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub mode: AiMode,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub anthropic: Option<AnthropicConfig>,
    #[serde(default)]
    pub openai: Option<OpenAiConfig>,
    #[serde(default)]
    pub bedrock: Option<BedrockConfig>,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub llamacpp: Option<LlamaCppConfig>,
}

fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.2
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            mode: AiMode::default(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            anthropic: None,
            openai: None,
            bedrock: None,
            ollama: OllamaConfig::default(),
            llamacpp: None,
        }
    }
}

impl AiConfig {
    pub fn proxy_settings(&self) -> ProxySettings {
        ProxySettings {
            mode: self.mode,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Instantiate every configured backend, in registration order.
///
/// A backend that fails to construct is logged and left out.
pub async fn build_providers(config: &AiConfig) -> Vec<Arc<dyn Provider>> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

    if let Some(cfg) = &config.anthropic {
        match AnthropicBackend::new(cfg.clone()) {
            Ok(backend) => providers.push(Arc::new(backend)),
            Err(e) => tracing::warn!(provider = "anthropic", error = %e, "skipping provider"),
        }
    }

    if let Some(cfg) = &config.openai {
        match OpenAiCompatBackend::openai(cfg.clone()) {
            Ok(backend) => providers.push(Arc::new(backend)),
            Err(e) => tracing::warn!(provider = "openai", error = %e, "skipping provider"),
        }
    }

    if let Some(cfg) = &config.bedrock {
        providers.push(Arc::new(BedrockBackend::from_env(cfg.clone()).await));
    }

    if config.ollama.enabled {
        match OllamaBackend::new(config.ollama.clone()) {
            Ok(backend) => providers.push(Arc::new(backend)),
            Err(e) => tracing::warn!(provider = "ollama", error = %e, "skipping provider"),
        }
    }

    if let Some(cfg) = config.llamacpp.as_ref().filter(|c| c.enabled) {
        match OpenAiCompatBackend::llamacpp(cfg.clone()) {
            Ok(backend) => providers.push(Arc::new(backend)),
            Err(e) => tracing::warn!(provider = "llamacpp", error = %e, "skipping provider"),
        }
    }

    tracing::info!(count = providers.len(), "providers configured");
    providers
}
