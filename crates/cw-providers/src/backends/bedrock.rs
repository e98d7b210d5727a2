//! AWS Bedrock backend using the model-agnostic Converse API.

use async_trait::async_trait;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, ConverseOutput, InferenceConfiguration, Message,
    SystemContentBlock,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;

use cw_protocol::ProviderKind;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{CompletionRequest, Provider};

/// Configuration for the Bedrock backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BedrockConfig {
    /// Bedrock model ID (e.g., "us.amazon.nova-lite-v1:0").
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// AWS region override. Falls back to the default provider chain.
    #[serde(default)]
    pub region: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model_id() -> String {
    "us.amazon.nova-lite-v1:0".into()
}
fn default_timeout_secs() -> u64 {
    15
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            region: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

pub struct BedrockBackend {
    client: BedrockClient,
    config: BedrockConfig,
    region_configured: bool,
}

impl BedrockBackend {
    /// Create a backend with a pre-built Bedrock client.
    pub fn new(client: BedrockClient, config: BedrockConfig) -> Self {
        let region_configured = client.config().region().is_some();
        Self {
            client,
            config,
            region_configured,
        }
    }

    /// Resolve credentials and region from the standard AWS provider chain.
    pub async fn from_env(config: BedrockConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;
        Self::new(BedrockClient::new(&sdk_config), config)
    }

    async fn call_converse(&self, request: &CompletionRequest) -> ProviderResult<String> {
        let user_message = Message::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Text(request.prompt.clone()))
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build message: {e}")))?;

        let inference = InferenceConfiguration::builder()
            .max_tokens(i32::try_from(request.max_tokens).unwrap_or(i32::MAX))
            .temperature(request.temperature)
            .build();

        let response = self
            .client
            .converse()
            .model_id(&self.config.model_id)
            .system(SystemContentBlock::Text(request.system.clone()))
            .messages(user_message)
            .inference_config(inference)
            .send()
            .await
            .map_err(|e| ProviderError::Http(format!("bedrock converse error: {e}")))?;

        let output = response
            .output()
            .ok_or_else(|| ProviderError::Decode("no output in bedrock response".into()))?;

        let text = match output {
            ConverseOutput::Message(msg) => msg.content().iter().find_map(|block| {
                if let ContentBlock::Text(t) = block {
                    Some(t.clone())
                } else {
                    None
                }
            }),
            _ => None,
        };

        match text {
            Some(t) if !t.trim().is_empty() => Ok(t),
            _ => Err(ProviderError::EmptyResponse),
        }
    }
}

#[async_trait]
impl Provider for BedrockBackend {
    fn id(&self) -> &str {
        "bedrock"
    }

    fn name(&self) -> &str {
        "AWS Bedrock"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    async fn probe(&self) -> ProviderResult<u32> {
        if self.region_configured {
            Ok(1)
        } else {
            Err(ProviderError::Config("no AWS region configured".into()))
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String> {
        match timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.call_converse(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.config.timeout_secs,
                    "bedrock inference timed out"
                );
                Err(ProviderError::Timeout(self.config.timeout_secs))
            }
        }
    }
}
