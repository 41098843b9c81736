//! Paced outbound delivery with bounded rate-limit retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use courier_core::config::DispatchConfig;
use courier_core::types::MediaDescriptor;

use crate::transport::{Outbound, TransportError};

/// Wraps the raw transport with send pacing, per-call timeouts and a
/// linear backoff on rate limiting. Errors never escape: callers get a
/// bool and delivery problems end up in the log.
pub struct Dispatcher {
    transport: Arc<dyn Outbound>,
    pre_send_delay: Duration,
    inter_media_delay: Duration,
    send_timeout: Duration,
    max_retries: u32,
    retry_base: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Outbound>, config: &DispatchConfig) -> Self {
        Self {
            transport,
            pre_send_delay: Duration::from_millis(config.pre_send_delay_ms),
            inter_media_delay: Duration::from_millis(config.inter_media_delay_ms),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            max_retries: config.max_retries,
            retry_base: Duration::from_millis(config.retry_base_ms),
        }
    }

    pub async fn send_text(&self, correspondent_id: &str, text: &str) -> bool {
        self.deliver("text", correspondent_id, || {
            self.transport.send_text(correspondent_id, text)
        })
        .await
    }

    pub async fn send_voice(&self, correspondent_id: &str, audio: &[u8]) -> bool {
        self.deliver("voice", correspondent_id, || {
            self.transport.send_voice(correspondent_id, audio)
        })
        .await
    }

    pub async fn send_media(
        &self,
        correspondent_id: &str,
        item: &MediaDescriptor,
        caption: Option<&str>,
    ) -> bool {
        self.deliver("media", correspondent_id, || {
            self.transport
                .send_media(correspondent_id, &item.url, item.kind, caption)
        })
        .await
    }

    /// Send a set of media items strictly in the given order, pausing
    /// between items. Returns how many were delivered; a failed item does
    /// not stop the rest of the set.
    pub async fn send_media_set(
        &self,
        correspondent_id: &str,
        items: &[(MediaDescriptor, Option<String>)],
    ) -> usize {
        let mut delivered = 0;
        for (i, (item, caption)) in items.iter().enumerate() {
            if i > 0 {
                sleep(self.inter_media_delay).await;
            }
            if self.send_media(correspondent_id, item, caption.as_deref()).await {
                delivered += 1;
            }
        }
        delivered
    }

    async fn deliver<F, Fut>(&self, what: &'static str, correspondent_id: &str, attempt: F) -> bool
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(), TransportError>>,
    {
        // Pacing before the first attempt keeps replies from landing
        // instantly after the inbound burst.
        sleep(self.pre_send_delay).await;

        let mut retries = 0u32;
        loop {
            match timeout(self.send_timeout, attempt()).await {
                Ok(Ok(())) => {
                    debug!(kind = what, correspondent = %correspondent_id, "delivered");
                    return true;
                }
                Ok(Err(TransportError::RateLimited)) if retries < self.max_retries => {
                    retries += 1;
                    let backoff = self.retry_base * retries;
                    debug!(
                        kind = what,
                        correspondent = %correspondent_id,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    sleep(backoff).await;
                }
                Ok(Err(e)) => {
                    warn!(kind = what, correspondent = %correspondent_id, error = %e, "dispatch failed");
                    return false;
                }
                Err(_) => {
                    warn!(kind = what, correspondent = %correspondent_id, "dispatch timed out");
                    return false;
                }
            }
        }
    }
}
