//! Inbound HTTP surface: one webhook the transport posts messages to.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tracing::{debug, info};

use courier_channel::BatchCoalescer;
use courier_core::types::InboundMessage;
use courier_store::ConversationStore;

pub struct AppState {
    pub coalescer: Arc<BatchCoalescer>,
    pub store: Arc<ConversationStore>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/inbound", post(inbound))
        .route("/conversations/{id}", delete(clear_conversation))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Accepts a message and returns immediately; the reply happens out of
/// band after the debounce window closes.
async fn inbound(
    State(state): State<Arc<AppState>>,
    Json(message): Json<InboundMessage>,
) -> StatusCode {
    debug!(correspondent = %message.correspondent_id, kind = ?message.kind, "inbound message");
    state.coalescer.on_incoming(message);
    StatusCode::ACCEPTED
}

/// Opt-out endpoint: drops the stored log and delivered-media ledger.
async fn clear_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    info!(correspondent = %id, "clearing conversation state");
    state.store.clear_log(&id);
    StatusCode::NO_CONTENT
}

async fn healthz() -> &'static str {
    "ok"
}
