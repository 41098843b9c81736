//! End-to-end pipeline tests over mocked transport and completion service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use courier_agent::catalog::{MediaCatalog, StaticCatalog};
use courier_agent::provider::{CompletionProvider, ProviderError};
use courier_agent::retrieval::NoRetrieval;
use courier_channel::{
    BatchCoalescer, Dispatcher, FlushHandler, FlushPipeline, Outbound, PipelineConfig,
    SpeechSynthesizer, TransportError,
};
use courier_core::config::DispatchConfig;
use courier_core::types::{
    InboundKind, InboundMessage, MediaDescriptor, MediaKind, PromptMessage,
};
use courier_store::{ConversationStore, SqliteKv};

const APOLOGY: &str = "Sorry, try again in a moment.";

struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, u16>>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<&str, u16>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
        })
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _messages: &[PromptMessage]) -> Result<String, ProviderError> {
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(status)) => Err(ProviderError::Api {
                status,
                message: "scripted failure".to_string(),
            }),
            None => Err(ProviderError::Empty),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Text { to: String, body: String },
    Media { to: String, url: String, caption: Option<String> },
    Voice { to: String, bytes: usize },
}

struct RecordingTransport {
    events: Mutex<Vec<Event>>,
    media_attempts: AtomicUsize,
    fail_media: bool,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Self::with_media_failures(false)
    }

    fn with_media_failures(fail_media: bool) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            media_attempts: AtomicUsize::new(0),
            fail_media,
        })
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Outbound for RecordingTransport {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), TransportError> {
        self.events.lock().unwrap().push(Event::Text {
            to: to.to_string(),
            body: text.to_string(),
        });
        Ok(())
    }

    async fn send_media(
        &self,
        to: &str,
        url: &str,
        _kind: MediaKind,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        self.media_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_media {
            return Err(TransportError::Failed("scripted media failure".to_string()));
        }
        self.events.lock().unwrap().push(Event::Media {
            to: to.to_string(),
            url: url.to_string(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    async fn send_voice(&self, to: &str, audio: &[u8]) -> Result<(), TransportError> {
        self.events.lock().unwrap().push(Event::Voice {
            to: to.to_string(),
            bytes: audio.len(),
        });
        Ok(())
    }
}

struct FixedVoice;

#[async_trait]
impl SpeechSynthesizer for FixedVoice {
    async fn synthesize(&self, text: &str) -> Option<Vec<u8>> {
        Some(text.as_bytes().to_vec())
    }
}

fn store() -> Arc<ConversationStore> {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    courier_store::db::init_db(&conn).unwrap();
    Arc::new(ConversationStore::new(
        Arc::new(SqliteKv::new(conn)),
        30,
        14,
        365,
    ))
}

fn media_item(id: u32) -> MediaDescriptor {
    MediaDescriptor {
        id,
        url: format!("https://media.example/{id}.jpg"),
        kind: MediaKind::Image,
        caption: None,
        description: format!("item {id}"),
    }
}

fn pipeline(
    provider: Arc<ScriptedProvider>,
    transport: Arc<RecordingTransport>,
    store: Arc<ConversationStore>,
    catalog_items: Vec<MediaDescriptor>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
) -> FlushPipeline {
    FlushPipeline::new(
        store,
        provider,
        Arc::new(NoRetrieval),
        Arc::new(MediaCatalog::new(
            Arc::new(StaticCatalog(catalog_items)),
            300,
        )),
        Dispatcher::new(transport, &DispatchConfig::default()),
        speech,
        PipelineConfig {
            instructions: "You are a helpful correspondent.".to_string(),
            apology: APOLOGY.to_string(),
            completion_timeout: Duration::from_secs(60),
            retrieval_timeout: Duration::from_secs(10),
        },
    )
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
async fn reply_is_persisted_and_dispatched() {
    let store = store();
    let transport = RecordingTransport::new();
    let provider = ScriptedProvider::new(vec![Ok("Sounds good!")]);
    let pipeline = pipeline(provider, transport.clone(), store.clone(), vec![], None);

    pipeline
        .flush("a", vec![msg("a", "hey"), msg("a", "are you free later?")])
        .await
        .unwrap();

    assert_eq!(
        transport.events(),
        vec![Event::Text {
            to: "a".to_string(),
            body: "Sounds good!".to_string()
        }]
    );

    let record = store.record("a");
    assert_eq!(record.turns.len(), 3);
    assert_eq!(record.turns[0].content, "hey");
    assert_eq!(record.turns[1].content, "are you free later?");
    assert_eq!(record.turns[2].content, "Sounds good!");
}

#[tokio::test(start_paused = true)]
async fn media_goes_out_in_directive_order_before_text() {
    let store = store();
    let transport = RecordingTransport::new();
    let provider =
        ScriptedProvider::new(vec![Ok("Take a look!\n[MEDIA: 2]\nsunset\n[MEDIA: 1]")]);
    let pipeline = pipeline(
        provider,
        transport.clone(),
        store.clone(),
        vec![media_item(1), media_item(2)],
        None,
    );

    pipeline.flush("a", vec![msg("a", "show me")]).await.unwrap();

    assert_eq!(
        transport.events(),
        vec![
            Event::Media {
                to: "a".to_string(),
                url: "https://media.example/2.jpg".to_string(),
                caption: Some("sunset".to_string()),
            },
            Event::Media {
                to: "a".to_string(),
                url: "https://media.example/1.jpg".to_string(),
                caption: None,
            },
            Event::Text {
                to: "a".to_string(),
                body: "Take a look!".to_string()
            },
        ]
    );

    let record = store.record("a");
    assert_eq!(record.sent_media, vec![2, 1]);
    let agent = &record.turns[1].content;
    assert!(agent.contains("[sent media #2]"));
    assert!(agent.contains("[sent media #1]"));
}

#[tokio::test(start_paused = true)]
async fn delivered_media_is_never_resent() {
    let store = store();
    let transport = RecordingTransport::new();
    let provider = ScriptedProvider::new(vec![
        Ok("Here you go\n[MEDIA: 3]"),
        Ok("Already showed you!\n[MEDIA: 3]"),
    ]);
    let pipeline = pipeline(
        provider,
        transport.clone(),
        store.clone(),
        vec![media_item(3)],
        None,
    );

    pipeline.flush("a", vec![msg("a", "pic?")]).await.unwrap();
    pipeline.flush("a", vec![msg("a", "again?")]).await.unwrap();

    let media_sends = transport
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Media { .. }))
        .count();
    assert_eq!(media_sends, 1);

    let record = store.record("a");
    assert_eq!(record.sent_media, vec![3]);
    // second agent turn carries no delivery marker
    assert!(!record.turns[3].content.contains("[sent media"));
}

#[tokio::test(start_paused = true)]
async fn unknown_and_malformed_references_are_dropped() {
    let store = store();
    let transport = RecordingTransport::new();
    let provider = ScriptedProvider::new(vec![Ok("hi\n[MEDIA: 99]\n[MEDIA: abc]")]);
    let pipeline = pipeline(
        provider,
        transport.clone(),
        store.clone(),
        vec![media_item(1)],
        None,
    );

    pipeline.flush("a", vec![msg("a", "hello")]).await.unwrap();

    assert_eq!(
        transport.events(),
        vec![Event::Text {
            to: "a".to_string(),
            body: "hi".to_string()
        }]
    );
    assert!(store.record("a").sent_media.is_empty());
}

#[tokio::test(start_paused = true)]
async fn completion_failure_sends_apology_and_persists_nothing() {
    let store = store();
    let transport = RecordingTransport::new();
    let provider = ScriptedProvider::new(vec![Err(500)]);
    let pipeline = pipeline(provider, transport.clone(), store.clone(), vec![], None);

    pipeline.flush("a", vec![msg("a", "hello?")]).await.unwrap();

    assert_eq!(
        transport.events(),
        vec![Event::Text {
            to: "a".to_string(),
            body: APOLOGY.to_string()
        }]
    );
    assert!(store.record("a").turns.is_empty());
}

#[tokio::test(start_paused = true)]
async fn ledger_survives_dispatch_failure() {
    let store = store();
    let transport = RecordingTransport::with_media_failures(true);
    let provider = ScriptedProvider::new(vec![
        Ok("Check this\n[MEDIA: 1]"),
        Ok("And this\n[MEDIA: 1]"),
    ]);
    let pipeline = pipeline(
        provider,
        transport.clone(),
        store.clone(),
        vec![media_item(1)],
        None,
    );

    pipeline.flush("a", vec![msg("a", "pic?")]).await.unwrap();
    assert_eq!(transport.media_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(store.record("a").sent_media, vec![1]);

    // the failed item is in the ledger, so it is never attempted again
    pipeline.flush("a", vec![msg("a", "pic??")]).await.unwrap();
    assert_eq!(transport.media_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn voice_synthesizer_takes_over_the_text_reply() {
    let store = store();
    let transport = RecordingTransport::new();
    let provider = ScriptedProvider::new(vec![Ok("Good morning!")]);
    let pipeline = pipeline(
        provider,
        transport.clone(),
        store.clone(),
        vec![],
        Some(Arc::new(FixedVoice)),
    );

    pipeline.flush("a", vec![msg("a", "morning")]).await.unwrap();

    assert_eq!(
        transport.events(),
        vec![Event::Voice {
            to: "a".to_string(),
            bytes: "Good morning!".len()
        }]
    );
    // the log keeps the text that was spoken
    assert_eq!(store.record("a").turns[1].content, "Good morning!");
}

#[tokio::test(start_paused = true)]
async fn correspondents_do_not_share_state() {
    let store = store();
    let transport = RecordingTransport::new();
    let provider = ScriptedProvider::new(vec![Ok("For a"), Ok("For b")]);
    let pipeline = pipeline(provider, transport.clone(), store.clone(), vec![], None);

    pipeline.flush("a", vec![msg("a", "hi from a")]).await.unwrap();
    pipeline.flush("b", vec![msg("b", "hi from b")]).await.unwrap();

    let a = store.record("a");
    let b = store.record("b");
    assert_eq!(a.turns.len(), 2);
    assert_eq!(b.turns.len(), 2);
    assert_eq!(a.turns[0].content, "hi from a");
    assert_eq!(b.turns[0].content, "hi from b");
    assert_eq!(a.turns[1].content, "For a");
    assert_eq!(b.turns[1].content, "For b");
}

#[tokio::test(start_paused = true)]
async fn coalescer_and_pipeline_relay_a_full_burst() {
    let store = store();
    let transport = RecordingTransport::new();
    let provider = ScriptedProvider::new(vec![Ok("On my way!")]);
    let pipeline: Arc<dyn FlushHandler> = Arc::new(pipeline(
        provider,
        transport.clone(),
        store.clone(),
        vec![],
        None,
    ));
    let coalescer = BatchCoalescer::new(Duration::from_secs(8), pipeline);

    coalescer.on_incoming(msg("a", "where are you"));
    tokio::time::sleep(Duration::from_secs(2)).await;
    coalescer.on_incoming(msg("a", "we're waiting"));
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(
        transport.events(),
        vec![Event::Text {
            to: "a".to_string(),
            body: "On my way!".to_string()
        }]
    );
    let record = store.record("a");
    assert_eq!(record.turns.len(), 3);
    assert_eq!(record.turns[0].content, "where are you");
    assert_eq!(record.turns[1].content, "we're waiting");
}
