//! Shared types, configuration, and errors for the Courier relay.

pub mod config;
pub mod error;
pub mod types;
