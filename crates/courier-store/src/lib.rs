//! Durable per-correspondent conversation state.
//!
//! A small key-value contract ([`kv::KvStore`]) backs the tiered
//! [`convo::ConversationStore`]: SQLite when healthy, a sticky in-process
//! fallback per correspondent once the store misbehaves.

pub mod convo;
pub mod db;
pub mod error;
pub mod kv;

pub use convo::{ConversationRecord, ConversationStore};
pub use error::StoreError;
pub use kv::{KvStore, SqliteKv};
