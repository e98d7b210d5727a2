//! Text-generation providers and the fallback proxy in front of them.
//!
//! - [`Provider`]: one backend (cloud API or local engine).
//! - [`backends`]: Anthropic, OpenAI-compatible, Bedrock and Ollama clients.
//! - [`ProviderProxy`]: availability snapshot, per-mode preference order,
//!   sequential fallback. Never returns an error, only result records
//!   carrying an error field.
//! - [`MockProvider`]: scripted provider for tests.

pub mod backends;
pub mod config;
pub mod error;
pub mod mock;
pub mod provider;
pub mod proxy;

pub use config::{AiConfig, build_providers};
pub use error::{ProviderError, ProviderResult};
pub use mock::MockProvider;
pub use provider::{CompletionRequest, Provider};
pub use proxy::{ProviderProxy, ProxySettings, needs_reasoning};
