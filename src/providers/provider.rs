//! Reply-generation provider trait for AgentForge.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not available: {0}")]
    NotAvailable(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Produces a reply for a prompt. Agents and the Creator only see this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name.
    fn name(&self) -> &str;

    /// Check if the provider is reachable / configured.
    async fn is_available(&self) -> bool;

    /// Complete a prompt under the given system message.
    async fn complete(
        &self,
        system_message: &str,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<String>;

    /// Get the default model.
    fn default_model(&self) -> Option<&str>;
}
