//! Reply-generation providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub mod ollama;
pub mod openai;
pub mod provider;
pub mod scripted;

pub use provider::{Provider, ProviderError, Result};
pub use scripted::ScriptedProvider;

use crate::agent::definition::{self, AgentDefinition};
use crate::config::Models;

/// Provider factory.
pub fn create_provider(models: &Models) -> Arc<dyn Provider> {
    match models.provider.as_str() {
        "ollama" => {
            let mut provider = match &models.base_url {
                Some(url) => ollama::OllamaProvider::with_base_url(url.clone()),
                None => ollama::OllamaProvider::new(),
            };
            if let Some(model) = &models.model {
                provider = provider.with_model(model.clone());
            }
            Arc::new(provider)
        }
        "scripted" | "offline" => Arc::new(offline_provider()),
        other => {
            if other != "openai" {
                tracing::warn!("Unknown provider '{}', falling back to openai", other);
            }
            let mut provider = openai::OpenAiProvider::new();
            if let Some(key) = &models.api_key {
                provider = provider.with_api_key(key.clone());
            }
            if let Some(url) = &models.base_url {
                provider = provider.with_base_url(url.clone());
            }
            if let Some(model) = &models.model {
                provider = provider.with_model(model.clone());
            }
            if let Some(temperature) = models.temperature {
                provider = provider.with_temperature(temperature);
            }
            Arc::new(provider)
        }
    }
}

/// Offline provider for runs without a model backend.
///
/// Definition requests get a rotating built-in persona; everything else is
/// answered with a short canned idea.
pub fn offline_provider() -> ScriptedProvider {
    let counter = AtomicUsize::new(0);
    ScriptedProvider::with_fallback(move |system, prompt| {
        if prompt.contains(definition::TEMPLATE_MARKER) {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            let generated = AgentDefinition::offline_variant(n);
            return serde_json::to_string_pretty(&generated)
                .map_err(|e| ProviderError::ParseError(e.to_string()));
        }
        let persona = system.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("agent");
        let topic: String = prompt.chars().take(60).collect();
        Ok(format!("[{}] An idea about: {}", persona, topic))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_provider_generates_definitions() {
        let provider = offline_provider();
        let prompt = format!("{}\n{{}}", definition::TEMPLATE_MARKER);

        let first = provider.complete("", &prompt, None).await.unwrap();
        let second = provider.complete("", &prompt, None).await.unwrap();

        let a: AgentDefinition = serde_json::from_str(&first).unwrap();
        let b: AgentDefinition = serde_json::from_str(&second).unwrap();
        assert_ne!(a.agent_type, b.agent_type);
    }

    #[test]
    fn test_factory_selects_by_name() {
        let mut models = Models::default();
        models.provider = "ollama".to_string();
        assert_eq!(create_provider(&models).name(), "ollama");

        models.provider = "scripted".to_string();
        assert_eq!(create_provider(&models).name(), "scripted");

        models.provider = "whatever".to_string();
        assert_eq!(create_provider(&models).name(), "openai");
    }
}
