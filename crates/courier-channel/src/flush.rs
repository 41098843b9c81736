//! The flush pipeline: one linear pass over a captured batch, from state
//! read through completion to persistence and outbound dispatch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_agent::catalog::{self, MediaCatalog};
use courier_agent::context;
use courier_agent::directive;
use courier_agent::profile::resolve_profile;
use courier_agent::provider::CompletionProvider;
use courier_agent::retrieval::Retrieval;
use courier_core::types::{CorrespondentProfile, InboundMessage, MediaDescriptor, Turn};
use courier_store::ConversationStore;

use crate::coalesce::FlushHandler;
use crate::dispatch::Dispatcher;
use crate::error::ChannelError;
use crate::transport::SpeechSynthesizer;

pub struct PipelineConfig {
    pub instructions: String,
    /// Canned reply when the completion service fails or times out.
    pub apology: String,
    pub completion_timeout: Duration,
    pub retrieval_timeout: Duration,
}

pub struct FlushPipeline {
    store: Arc<ConversationStore>,
    provider: Arc<dyn CompletionProvider>,
    retrieval: Arc<dyn Retrieval>,
    catalog: Arc<MediaCatalog>,
    dispatcher: Dispatcher,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    config: PipelineConfig,
}

impl FlushPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<ConversationStore>,
        provider: Arc<dyn CompletionProvider>,
        retrieval: Arc<dyn Retrieval>,
        catalog: Arc<MediaCatalog>,
        dispatcher: Dispatcher,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            provider,
            retrieval,
            catalog,
            dispatcher,
            speech,
            config,
        }
    }

    async fn run(
        &self,
        correspondent_id: &str,
        batch: Vec<InboundMessage>,
    ) -> Result<(), ChannelError> {
        let flush_id = Uuid::new_v4();
        info!(
            correspondent = %correspondent_id,
            count = batch.len(),
            flush = %flush_id,
            "flush started"
        );

        let record = self.store.record(correspondent_id);
        let first_contact = record.turns.is_empty();
        let sender_name = batch.iter().find_map(|m| m.sender_name.as_deref());
        let profile = resolve_profile(
            self.store.as_ref(),
            self.provider.as_ref(),
            correspondent_id,
            sender_name,
            first_contact,
        )
        .await;

        let catalog_entries = self.catalog.entries().await;
        let snippets = self.retrieve(&batch, flush_id).await;

        let profile_ref =
            (profile != CorrespondentProfile::default()).then_some(&profile);
        let messages = context::build_context(
            &self.config.instructions,
            &catalog_entries,
            &snippets,
            &record.turns,
            &batch,
            profile_ref,
        );

        let reply = match timeout(
            self.config.completion_timeout,
            self.provider.complete(&messages),
        )
        .await
        {
            Ok(Ok(text)) if !text.trim().is_empty() => text,
            Ok(Ok(_)) => {
                warn!(flush = %flush_id, "completion returned an empty reply");
                return self.apologize(correspondent_id).await;
            }
            Ok(Err(e)) => {
                warn!(flush = %flush_id, error = %e, "completion failed");
                return self.apologize(correspondent_id).await;
            }
            Err(_) => {
                warn!(flush = %flush_id, "completion timed out");
                return self.apologize(correspondent_id).await;
            }
        };

        let parsed = directive::parse_response(&reply);
        let mut outgoing: Vec<(MediaDescriptor, Option<String>)> = Vec::new();
        let mut outgoing_ids: Vec<u32> = Vec::new();
        for d in &parsed.directives {
            let Ok(id) = d.reference.parse::<u32>() else {
                warn!(flush = %flush_id, reference = %d.reference, "unresolvable media reference dropped");
                continue;
            };
            if record.sent_media.contains(&id) {
                debug!(flush = %flush_id, id, "media already delivered, skipping");
                continue;
            }
            if outgoing_ids.contains(&id) {
                continue;
            }
            match catalog::resolve(&catalog_entries, id) {
                Some(item) => {
                    outgoing_ids.push(id);
                    outgoing.push((item.clone(), d.caption.clone()));
                }
                None => warn!(flush = %flush_id, id, "media id not in catalog, dropped"),
            }
        }

        // Persist before dispatching: once an id is in the ledger it will
        // never be attempted again, even if the physical send fails below.
        for message in &batch {
            self.store.append_turn(
                correspondent_id,
                Turn::correspondent(context::render_entry(message), message.timestamp),
            );
        }
        let mut agent_content = parsed.prose.trim().to_string();
        for id in &outgoing_ids {
            if !agent_content.is_empty() {
                agent_content.push('\n');
            }
            agent_content.push_str(&format!("[sent media #{id}]"));
        }
        self.store.append_agent_turn(
            correspondent_id,
            Turn::agent(agent_content, chrono::Utc::now()),
            &outgoing_ids,
        );

        // Media goes out first, strictly in directive order, then the reply.
        let delivered = self
            .dispatcher
            .send_media_set(correspondent_id, &outgoing)
            .await;
        if delivered < outgoing.len() {
            warn!(
                flush = %flush_id,
                delivered,
                requested = outgoing.len(),
                "some media items were not delivered"
            );
        }

        let prose = parsed.prose.trim();
        let mut text_ok = true;
        if !prose.is_empty() {
            text_ok = match self.synthesize(prose).await {
                Some(audio) => self.dispatcher.send_voice(correspondent_id, &audio).await,
                None => self.dispatcher.send_text(correspondent_id, prose).await,
            };
        }

        info!(
            correspondent = %correspondent_id,
            flush = %flush_id,
            media = delivered,
            "flush complete"
        );
        if text_ok {
            Ok(())
        } else {
            Err(ChannelError::Dispatch("reply delivery failed".to_string()))
        }
    }

    async fn retrieve(&self, batch: &[InboundMessage], flush_id: Uuid) -> Vec<String> {
        let Some(query) = context::batch_query(batch) else {
            return Vec::new();
        };
        match timeout(self.config.retrieval_timeout, self.retrieval.search(&query)).await {
            Ok(snippets) => snippets,
            Err(_) => {
                warn!(flush = %flush_id, "retrieval timed out");
                Vec::new()
            }
        }
    }

    async fn apologize(&self, correspondent_id: &str) -> Result<(), ChannelError> {
        if self
            .dispatcher
            .send_text(correspondent_id, &self.config.apology)
            .await
        {
            Ok(())
        } else {
            Err(ChannelError::Dispatch("apology delivery failed".to_string()))
        }
    }

    async fn synthesize(&self, text: &str) -> Option<Vec<u8>> {
        match &self.speech {
            Some(synth) => synth.synthesize(text).await,
            None => None,
        }
    }
}

#[async_trait]
impl FlushHandler for FlushPipeline {
    async fn flush(
        &self,
        correspondent_id: &str,
        batch: Vec<InboundMessage>,
    ) -> Result<(), ChannelError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.run(correspondent_id, batch).await
    }
}
