use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

mod http;
mod outbound;

use courier_agent::anthropic::AnthropicProvider;
use courier_agent::catalog::{CatalogSource, HttpCatalogSource, MediaCatalog, StaticCatalog};
use courier_agent::provider::{CompletionProvider, ProviderError};
use courier_agent::retrieval::NoRetrieval;
use courier_channel::{BatchCoalescer, Dispatcher, FlushPipeline, PipelineConfig};
use courier_core::config::CourierConfig;
use courier_core::types::PromptMessage;
use courier_store::{ConversationStore, SqliteKv};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_gateway=info,courier_channel=info".into()),
        )
        .init();

    // load config: explicit path > COURIER_CONFIG env > ~/.courier/courier.toml
    let config_path = std::env::var("COURIER_CONFIG").ok();
    let config = CourierConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        CourierConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    courier_store::db::init_db(&db)?;

    let store = Arc::new(ConversationStore::new(
        Arc::new(SqliteKv::new(db)),
        config.conversation.max_turns,
        config.conversation.log_ttl_days,
        config.conversation.profile_ttl_days,
    ));

    let provider = build_provider(&config);
    let catalog = build_catalog(&config);
    let transport = Arc::new(outbound::HttpOutbound::new(&config.transport));
    let dispatcher = Dispatcher::new(transport, &config.dispatch);

    let pipeline = Arc::new(FlushPipeline::new(
        store.clone(),
        provider,
        Arc::new(NoRetrieval),
        catalog,
        dispatcher,
        None,
        PipelineConfig {
            instructions: config.persona.instructions.clone(),
            apology: config.persona.apology.clone(),
            completion_timeout: Duration::from_secs(config.completion.timeout_secs),
            retrieval_timeout: Duration::from_secs(config.conversation.retrieval_timeout_secs),
        },
    ));

    let coalescer = BatchCoalescer::new(
        Duration::from_secs(config.conversation.debounce_secs),
        pipeline,
    );
    info!(
        window_secs = config.conversation.debounce_secs,
        "batch coalescer ready"
    );

    let state = Arc::new(http::AppState { coalescer, store });
    let router = http::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!("Courier gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Completion provider from config, with an env var fallback for the key.
fn build_provider(config: &CourierConfig) -> Arc<dyn CompletionProvider> {
    let api_key = if config.completion.api_key.is_empty() {
        std::env::var("ANTHROPIC_API_KEY").unwrap_or_default()
    } else {
        config.completion.api_key.clone()
    };

    if api_key.is_empty() {
        tracing::warn!("No completion API key configured, every flush will apologize");
        return Arc::new(NullProvider);
    }

    info!(
        model = %config.completion.model,
        base_url = %config.completion.base_url,
        "completion provider: Anthropic"
    );
    Arc::new(AnthropicProvider::new(
        api_key,
        Some(config.completion.base_url.clone()),
        config.completion.model.clone(),
        config.completion.max_tokens,
    ))
}

fn build_catalog(config: &CourierConfig) -> Arc<MediaCatalog> {
    let source: Arc<dyn CatalogSource> = match &config.catalog.url {
        Some(url) => {
            info!(url = %url, "media catalog endpoint configured");
            Arc::new(HttpCatalogSource::new(
                url.clone(),
                Duration::from_secs(config.catalog.fetch_timeout_secs),
            ))
        }
        None => Arc::new(StaticCatalog(Vec::new())),
    };
    Arc::new(MediaCatalog::new(source, config.catalog.refresh_secs))
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

/// Placeholder provider when no API key is available.
struct NullProvider;

#[async_trait::async_trait]
impl CompletionProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    async fn complete(&self, _messages: &[PromptMessage]) -> Result<String, ProviderError> {
        Err(ProviderError::Api {
            status: 503,
            message: "no completion API key configured, set completion.api_key in courier.toml"
                .to_string(),
        })
    }
}
