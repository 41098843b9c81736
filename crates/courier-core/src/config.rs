use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Debounce window for coalescing a burst of inbound messages into one flush.
pub const DEFAULT_DEBOUNCE_SECS: u64 = 8;
/// Conversation log cap: oldest turns are evicted first past this length.
pub const DEFAULT_MAX_TURNS: usize = 30;

/// Top-level config (courier.toml + COURIER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourierConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Batching and durable-state tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Fixed debounce window. Only the first message of a burst arms the
    /// timer; later messages do not extend it.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Expiry of the persisted log (and its sent-media ledger), in days.
    #[serde(default = "default_log_ttl_days")]
    pub log_ttl_days: u64,
    /// Profiles live much longer than the log.
    #[serde(default = "default_profile_ttl_days")]
    pub profile_ttl_days: u64,
    #[serde(default = "default_retrieval_timeout_secs")]
    pub retrieval_timeout_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            max_turns: default_max_turns(),
            log_ttl_days: default_log_ttl_days(),
            profile_ttl_days: default_profile_ttl_days(),
            retrieval_timeout_secs: default_retrieval_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Longer than the transport/catalog timeouts on purpose.
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_completion_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

/// Outbound pacing and retry tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Pre-send delay simulating human response latency.
    #[serde(default = "default_pre_send_delay_ms")]
    pub pre_send_delay_ms: u64,
    /// Delay between consecutive media items in one flush.
    #[serde(default = "default_inter_media_delay_ms")]
    pub inter_media_delay_ms: u64,
    /// Retry ceiling for rate-limited sends.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step: attempt n sleeps n * retry_base_ms.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pre_send_delay_ms: default_pre_send_delay_ms(),
            inter_media_delay_ms: default_inter_media_delay_ms(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    /// Endpoint returning the full media catalog as JSON. When unset the
    /// relay runs with an empty catalog.
    pub url: Option<String>,
    #[serde(default = "default_catalog_refresh_secs")]
    pub refresh_secs: u64,
    #[serde(default = "default_catalog_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

/// Outbound transport bridge (the messaging gateway Courier posts sends to).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_transport_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_transport_base_url(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Static system instructions prepended to every context.
    #[serde(default = "default_instructions")]
    pub instructions: String,
    /// Fixed user-facing text sent when the completion call fails.
    #[serde(default = "default_apology")]
    pub apology: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            instructions: default_instructions(),
            apology: default_apology(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    18790
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.courier/courier.db", home)
}
fn default_debounce_secs() -> u64 {
    DEFAULT_DEBOUNCE_SECS
}
fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}
fn default_log_ttl_days() -> u64 {
    14
}
fn default_profile_ttl_days() -> u64 {
    365
}
fn default_retrieval_timeout_secs() -> u64 {
    10
}
fn default_completion_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_completion_timeout_secs() -> u64 {
    60
}
fn default_pre_send_delay_ms() -> u64 {
    1500
}
fn default_inter_media_delay_ms() -> u64 {
    2500
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    2000
}
fn default_send_timeout_secs() -> u64 {
    15
}
fn default_catalog_refresh_secs() -> u64 {
    300
}
fn default_catalog_timeout_secs() -> u64 {
    10
}
fn default_transport_base_url() -> String {
    "http://127.0.0.1:18791".to_string()
}
fn default_instructions() -> String {
    "You are a friendly, concise assistant chatting over a messaging app. \
     Reply in the correspondent's language. When an item from the media \
     catalog fits the conversation, reference it on its own line as \
     [MEDIA: <id>] optionally followed by a single caption line."
        .to_string()
}
fn default_apology() -> String {
    "Sorry, I couldn't put a reply together just now. Please try again in a moment.".to_string()
}

impl CourierConfig {
    /// Load config from a TOML file with COURIER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.courier/courier.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: CourierConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("COURIER_").split("_"))
            .extract()
            .map_err(|e| crate::error::CourierError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.courier/courier.toml", home)
}
