//! Concrete provider backends.

pub mod anthropic;
pub mod bedrock;
pub mod ollama;
pub mod openai;

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use bedrock::{BedrockBackend, BedrockConfig};
pub use ollama::{OllamaBackend, OllamaConfig};
pub use openai::{LlamaCppConfig, OpenAiCompatBackend, OpenAiConfig};
