//! Ollama local engine: `/api/chat` for completions, `/api/tags` for probing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cw_protocol::ProviderKind;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{CompletionRequest, Provider};

/// Configuration for the local Ollama endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    /// Ollama HTTP API base URL.
    #[serde(default = "default_host")]
    pub host: String,
    /// Model to use for inference.
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether local inference is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_host() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "llama3.2".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_enabled() -> bool {
    true
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            enabled: default_enabled(),
        }
    }
}

/// Ollama chat API request body.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama chat API response (only fields we need).
#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<serde_json::Value>,
}

/// Client for a local Ollama server.
pub struct OllamaBackend {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Provider for OllamaBackend {
    fn id(&self) -> &str {
        "ollama"
    }

    fn name(&self) -> &str {
        "Ollama"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn probe(&self) -> ProviderResult<u32> {
        let url = format!("{}/api/tags", self.config.host);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout_secs))?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        if tags.models.is_empty() {
            return Err(ProviderError::Unavailable("no models pulled".into()));
        }
        Ok(tags.models.len() as u32)
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String> {
        let url = format!("{}/api/chat", self.config.host);

        let body = ChatRequest {
            model: &self.config.model,
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
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let content = chat.message.map(|m| m.content).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Helper: build an Ollama chat response body.
    fn ollama_response(content: &str) -> serde_json::Value {
        serde_json::json!({
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": content
            },
            "done": true
        })
    }

    fn backend_for(server: &MockServer) -> OllamaBackend {
        OllamaBackend::new(OllamaConfig {
            host: server.uri(),
            model: "llama3.2".into(),
            timeout_secs: 2,
            enabled: true,
        })
        .unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            prompt: "scan example.com".into(),
            system: "respond with JSON".into(),
            max_tokens: 128,
            temperature: 0.1,
        }
    }

    #[tokio::test]
    async fn complete_returns_content_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ollama_response(r#""intent": "scan", "confidence": 0.9"#)),
            )
            .mount(&server)
            .await;

        let text = backend_for(&server).complete(&request()).await.unwrap();
        // Malformed content is passed through; repair happens upstream.
        assert_eq!(text, r#""intent": "scan", "confidence": 0.9"#);
    }

    #[tokio::test]
    async fn complete_empty_content_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ollama_response("  ")))
            .mount(&server)
            .await;

        let err = backend_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[tokio::test]
    async fn complete_non_200_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let err = backend_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn complete_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(10)))
            .mount(&server)
            .await;

        // Client timeout is 2s, mock delays 10s → timeout
        let err = backend_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(2)));
    }

    #[tokio::test]
    async fn probe_counts_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "llama3.2"}, {"name": "phi3:mini"}]
            })))
            .mount(&server)
            .await;

        assert_eq!(backend_for(&server).probe().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn probe_without_models_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"models": []})))
            .mount(&server)
            .await;

        assert!(backend_for(&server).probe().await.is_err());
    }

    #[test]
    fn config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost:11434");
        assert_eq!(config.model, "llama3.2");
        assert!(config.enabled);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
host = "http://192.168.1.50:11434"
model = "gemma:2b"
timeout_secs = 10
enabled = false
"#;
        let config: OllamaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "http://192.168.1.50:11434");
        assert_eq!(config.model, "gemma:2b");
        assert_eq!(config.timeout_secs, 10);
        assert!(!config.enabled);
    }
}
