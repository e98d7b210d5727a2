//! Provider error types.

use thiserror::Error;

/// Errors a single provider call can produce.
///
/// These never leave the proxy: it logs them, moves on to the next
/// provider, and embeds the last one as text in its outcome record.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    Config(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("malformed provider response: {0}")]
    Decode(String),

    #[error("provider returned an empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// Map a reqwest error, distinguishing timeouts.
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Convenience alias for provider results.
pub type ProviderResult<T> = Result<T, ProviderError>;
