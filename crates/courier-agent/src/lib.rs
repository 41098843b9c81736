//! Completion-side components of the relay: the provider client, the
//! TTL-cached media catalog, context assembly, response-directive parsing,
//! and first-contact profile resolution.

pub mod anthropic;
pub mod catalog;
pub mod context;
pub mod directive;
pub mod profile;
pub mod provider;
pub mod retrieval;
