use async_trait::async_trait;

use courier_core::types::PromptMessage;

/// Common interface to the language-completion service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send the ordered context, wait for the full reply text.
    /// A blank reply is reported as [`ProviderError::Empty`].
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("empty completion")]
    Empty,
}
