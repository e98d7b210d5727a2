//! OpenAI-compatible chat completions.
//!
//! Serves both the hosted OpenAI API and llama.cpp's `llama-server`, which
//! exposes the same `/chat/completions` and `/models` routes locally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cw_protocol::ProviderKind;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{CompletionRequest, Provider};

/// Hosted OpenAI settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_cloud_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".into()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_cloud_timeout_secs() -> u64 {
    30
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key_env: default_openai_key_env(),
            timeout_secs: default_cloud_timeout_secs(),
        }
    }
}

/// Local llama.cpp server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LlamaCppConfig {
    #[serde(default = "default_llamacpp_base_url")]
    pub base_url: String,
    #[serde(default = "default_llamacpp_model")]
    pub model: String,
    #[serde(default = "default_local_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_llamacpp_base_url() -> String {
    "http://localhost:8080/v1".into()
}
fn default_llamacpp_model() -> String {
    "local".into()
}
fn default_local_timeout_secs() -> u64 {
    60
}
fn default_enabled() -> bool {
    true
}

impl Default for LlamaCppConfig {
    fn default() -> Self {
        Self {
            base_url: default_llamacpp_base_url(),
            model: default_llamacpp_model(),
            timeout_secs: default_local_timeout_secs(),
            enabled: default_enabled(),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// Client for any endpoint speaking the OpenAI chat completions dialect.
pub struct OpenAiCompatBackend {
    id: &'static str,
    name: &'static str,
    kind: ProviderKind,
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl OpenAiCompatBackend {
    /// Hosted OpenAI. The key is read once, from `config.api_key_env`.
    pub fn openai(config: OpenAiConfig) -> ProviderResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::build(
            "openai",
            "OpenAI",
            ProviderKind::Cloud,
            config.base_url,
            config.model,
            api_key,
            config.timeout_secs,
        )
    }

    /// Same as [`openai`](Self::openai) with an explicit key.
    pub fn openai_with_key(config: OpenAiConfig, api_key: Option<String>) -> ProviderResult<Self> {
        Self::build(
            "openai",
            "OpenAI",
            ProviderKind::Cloud,
            config.base_url,
            config.model,
            api_key,
            config.timeout_secs,
        )
    }

    pub fn llamacpp(config: LlamaCppConfig) -> ProviderResult<Self> {
        Self::build(
            "llamacpp",
            "llama.cpp",
            ProviderKind::Local,
            config.base_url,
            config.model,
            None,
            config.timeout_secs,
        )
    }

    fn build(
        id: &'static str,
        name: &'static str,
        kind: ProviderKind,
        base_url: String,
        model: String,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            id,
            name,
            kind,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            timeout_secs,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatBackend {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn probe(&self) -> ProviderResult<u32> {
        match self.kind {
            // Cloud reachability is not probed over the network; a key is enough.
            ProviderKind::Cloud => {
                if self.api_key.is_some() {
                    Ok(1)
                } else {
                    Err(ProviderError::Config(format!("{} API key not set", self.name)))
                }
            }
            ProviderKind::Local => {
                let url = format!("{}/models", self.base_url);
                let response = self
                    .authorize(self.client.get(&url))
                    .send()
                    .await
                    .map_err(|e| ProviderError::from_reqwest(e, self.timeout_secs))?;
                if !response.status().is_success() {
                    return Err(ProviderError::Status {
                        status: response.status().as_u16(),
                        body: String::new(),
                    });
                }
                let models: ModelsResponse = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::Decode(e.to_string()))?;
                // llama-server always serves exactly one model, even if it omits the list.
                Ok(models.data.len().max(1) as u32)
            }
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String> {
        if self.kind == ProviderKind::Cloud && self.api_key.is_none() {
            return Err(ProviderError::Config(format!("{} API key not set", self.name)));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(content)
    }
}
