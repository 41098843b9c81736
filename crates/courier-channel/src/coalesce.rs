//! Per-correspondent batching behind a fixed debounce window.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use courier_core::types::InboundMessage;

use crate::error::ChannelError;

/// Downstream consumer of a captured batch.
#[async_trait]
pub trait FlushHandler: Send + Sync {
    async fn flush(
        &self,
        correspondent_id: &str,
        batch: Vec<InboundMessage>,
    ) -> Result<(), ChannelError>;
}

/// Accumulates inbound messages per correspondent and hands each burst to
/// the flush handler after a quiet period.
///
/// The window is fixed, not sliding: only the first message of a burst arms
/// the timer, later arrivals just join the batch. When the timer fires the
/// batch is captured and cleared synchronously, so anything arriving during
/// the flush starts a fresh batch; a per-correspondent lock keeps
/// consecutive flushes for the same correspondent from overlapping.
pub struct BatchCoalescer {
    window: Duration,
    handler: Arc<dyn FlushHandler>,
    pending: DashMap<String, Vec<InboundMessage>>,
    flush_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BatchCoalescer {
    pub fn new(window: Duration, handler: Arc<dyn FlushHandler>) -> Arc<Self> {
        Arc::new(Self {
            window,
            handler,
            pending: DashMap::new(),
            flush_locks: DashMap::new(),
        })
    }

    /// Append a message to its correspondent's pending batch. The first
    /// message of a burst schedules the debounce timer.
    pub fn on_incoming(self: &Arc<Self>, message: InboundMessage) {
        let correspondent_id = message.correspondent_id.clone();
        let armed = match self.pending.entry(correspondent_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                entry.get_mut().push(message);
                false
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(vec![message]);
                true
            }
        };

        if armed {
            debug!(
                correspondent = %correspondent_id,
                window_secs = self.window.as_secs(),
                "burst started, debounce timer armed"
            );
            let coalescer = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(coalescer.window).await;
                coalescer.fire(&correspondent_id).await;
            });
        }
    }

    /// Messages currently waiting for this correspondent.
    pub fn pending_len(&self, correspondent_id: &str) -> usize {
        self.pending
            .get(correspondent_id)
            .map(|batch| batch.len())
            .unwrap_or(0)
    }

    async fn fire(&self, correspondent_id: &str) {
        // Capture and clear before any await: messages arriving from here
        // on belong to the next batch.
        let Some((_, batch)) = self.pending.remove(correspondent_id) else {
            return;
        };

        let lock = {
            let entry = self
                .flush_locks
                .entry(correspondent_id.to_string())
                .or_default();
            Arc::clone(entry.value())
        };
        let _serialized = lock.lock().await;

        let count = batch.len();
        if let Err(e) = self.handler.flush(correspondent_id, batch).await {
            // The batch is consumed either way; the correspondent's next
            // message starts a clean burst.
            warn!(correspondent = %correspondent_id, count, error = %e, "flush failed, batch dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::InboundKind;
    use std::sync::Mutex as StdMutex;

    struct RecordingHandler {
        flushes: StdMutex<Vec<(String, Vec<String>)>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                flushes: StdMutex::new(Vec::new()),
            })
        }

        fn flushes(&self) -> Vec<(String, Vec<String>)> {
            self.flushes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FlushHandler for RecordingHandler {
        async fn flush(
            &self,
            correspondent_id: &str,
            batch: Vec<InboundMessage>,
        ) -> Result<(), ChannelError> {
            let texts = batch.into_iter().map(|m| m.text).collect();
            self.flushes
                .lock()
                .unwrap()
                .push((correspondent_id.to_string(), texts));
            Ok(())
        }
    }

    fn msg(id: &str, text: &str) -> InboundMessage {
        InboundMessage {
            correspondent_id: id.to_string(),
            kind: InboundKind::Text,
            text: text.to_string(),
            media_url: None,
            sender_name: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_ordered_flush() {
        let handler = RecordingHandler::new();
        let coalescer = BatchCoalescer::new(Duration::from_secs(8), handler.clone());

        coalescer.on_incoming(msg("a", "one"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        coalescer.on_incoming(msg("a", "two"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        coalescer.on_incoming(msg("a", "three"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            handler.flushes(),
            vec![(
                "a".to_string(),
                vec!["one".to_string(), "two".to_string(), "three".to_string()]
            )]
        );
        assert_eq!(coalescer.pending_len("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_window_is_fixed_not_sliding() {
        let handler = RecordingHandler::new();
        let coalescer = BatchCoalescer::new(Duration::from_secs(8), handler.clone());

        coalescer.on_incoming(msg("a", "one"));
        tokio::time::sleep(Duration::from_secs(7)).await;
        // A sliding window would postpone the flush to t=15.
        coalescer.on_incoming(msg("a", "two"));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let flushes = handler.flushes();
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].1, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn message_after_flush_starts_new_batch() {
        let handler = RecordingHandler::new();
        let coalescer = BatchCoalescer::new(Duration::from_secs(8), handler.clone());

        coalescer.on_incoming(msg("a", "one"));
        tokio::time::sleep(Duration::from_secs(9)).await;
        coalescer.on_incoming(msg("a", "two"));
        tokio::time::sleep(Duration::from_secs(9)).await;

        let flushes = handler.flushes();
        assert_eq!(flushes.len(), 2);
        assert_eq!(flushes[0].1, vec!["one".to_string()]);
        assert_eq!(flushes[1].1, vec!["two".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn correspondents_batch_independently() {
        let handler = RecordingHandler::new();
        let coalescer = BatchCoalescer::new(Duration::from_secs(8), handler.clone());

        coalescer.on_incoming(msg("a", "from a"));
        tokio::time::sleep(Duration::from_secs(3)).await;
        coalescer.on_incoming(msg("b", "from b"));
        tokio::time::sleep(Duration::from_secs(10)).await;

        let mut flushes = handler.flushes();
        flushes.sort();
        assert_eq!(
            flushes,
            vec![
                ("a".to_string(), vec!["from a".to_string()]),
                ("b".to_string(), vec!["from b".to_string()]),
            ]
        );
    }
}
