//! Error types for AgentForge.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] crate::providers::ProviderError),

    #[error("Load error: {0}")]
    Load(#[from] crate::agent::LoadError),

    #[error("Agent {0} is already bound to a runtime")]
    AlreadyBound(String),

    #[error("{0}")]
    Other(String),
}
