use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("outbound dispatch failed: {0}")]
    Dispatch(String),
}
