use async_trait::async_trait;

use courier_core::types::MediaKind;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport asked us to slow down. The only retried signal.
    #[error("rate limited by transport")]
    RateLimited,

    #[error("transport failure: {0}")]
    Failed(String),
}

/// Outbound messaging transport. One delivery attempt per call; pacing,
/// timeouts and retry live in the [`Dispatcher`](crate::Dispatcher).
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, correspondent_id: &str, text: &str) -> Result<(), TransportError>;

    async fn send_media(
        &self,
        correspondent_id: &str,
        url: &str,
        kind: MediaKind,
        caption: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn send_voice(
        &self,
        correspondent_id: &str,
        audio: &[u8],
    ) -> Result<(), TransportError>;
}

/// Optional voice-reply collaborator. A `None` result means "reply as
/// text"; both the decision and the synthesis live behind this trait.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Option<Vec<u8>>;
}
