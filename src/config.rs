//! Configuration loading for AgentForge.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the AgentForge home directory (~/.agentforge).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".agentforge"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.agentforge/settings.json
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

/// Load settings from an explicit path.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;

    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Load settings or return default if not found.
pub fn load_settings_or_default(path: Option<&Path>) -> Settings {
    let loaded = match path {
        Some(path) => load_settings_from(path),
        None => load_settings(),
    };

    loaded.unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    let p = settings.worker.bounce_probability;
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::Config(format!(
            "worker.bounce_probability must be within [0, 1], got {}",
            p
        )));
    }
    if settings.runtime.agent_count == 0 {
        return Err(Error::Config(
            "runtime.agent_count must be at least 1".to_string(),
        ));
    }
    if settings.creator.name.trim().is_empty() {
        return Err(Error::Config("creator.name must not be empty".to_string()));
    }
    Ok(())
}

/// Runtime configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RuntimeConfig {
    #[serde(default = "default_host_address")]
    pub host_address: String,
    /// Number of agents the world run asks the Creator for.
    #[serde(default = "default_agent_count")]
    pub agent_count: usize,
}

fn default_host_address() -> String {
    "localhost:50051".to_string()
}

fn default_agent_count() -> usize {
    20
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host_address: default_host_address(),
            agent_count: default_agent_count(),
        }
    }
}

/// Models configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Models {
    /// Provider name: openai, ollama, scripted
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Sampling temperature for chat-completion providers.
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_provider() -> String {
    "openai".to_string()
}

impl Default for Models {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            api_key: None,
            temperature: None,
        }
    }
}

/// Creator configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreatorConfig {
    #[serde(default = "default_creator_name")]
    pub name: String,
    /// Overrides the built-in agent definition template.
    pub template_path: Option<PathBuf>,
    /// Where generated agent definitions are persisted.
    #[serde(default = "default_agents_dir")]
    pub agents_dir: PathBuf,
    #[serde(default = "default_smoke_test_prompt")]
    pub smoke_test_prompt: String,
}

fn default_creator_name() -> String {
    "Creator".to_string()
}

fn default_agents_dir() -> PathBuf {
    PathBuf::from("generated_agents")
}

fn default_smoke_test_prompt() -> String {
    "Give me an idea".to_string()
}

impl Default for CreatorConfig {
    fn default() -> Self {
        Self {
            name: default_creator_name(),
            template_path: None,
            agents_dir: default_agents_dir(),
            smoke_test_prompt: default_smoke_test_prompt(),
        }
    }
}

/// Worker behavior defaults, used when a definition leaves them out.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WorkerConfig {
    #[serde(default = "default_bounce_probability")]
    pub bounce_probability: f64,
    #[serde(default = "default_bounce_prompt")]
    pub bounce_prompt: String,
}

fn default_bounce_probability() -> f64 {
    0.5
}

fn default_bounce_prompt() -> String {
    "Here is my idea. It may not be your speciality, but please refine it and make it better: {reply}"
        .to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bounce_probability: default_bounce_probability(),
            bounce_prompt: default_bounce_prompt(),
        }
    }
}

/// Tracker configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TrackerConfig {
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("message_exchanges.jsonl")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            export_dir: default_export_dir(),
        }
    }
}

/// Timeout and retry policy for provider calls.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExecutionConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    600
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// AgentForge settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub models: Models,

    #[serde(default)]
    pub creator: CreatorConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.runtime.agent_count, 20);
        assert_eq!(settings.creator.name, "Creator");
        assert_eq!(settings.models.provider, "openai");
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"worker": {"bounce_probability": 0.0}}"#).unwrap();
        assert_eq!(settings.worker.bounce_probability, 0.0);
        assert!(settings.worker.bounce_prompt.contains("{reply}"));

        let settings: Settings =
            serde_json::from_str(r#"{"models": {"provider": "openai", "temperature": 0.2}}"#).unwrap();
        assert_eq!(settings.models.temperature, Some(0.2));
        assert!(settings.models.model.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_probability() {
        let mut settings = Settings::default();
        settings.worker.bounce_probability = 1.5;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_load_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"runtime": {"agent_count": 3}}"#).unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.runtime.agent_count, 3);
        assert_eq!(settings.runtime.host_address, "localhost:50051");

        let missing = dir.path().join("missing.json");
        assert!(load_settings_from(&missing).is_err());
        assert_eq!(load_settings_or_default(Some(&missing)).runtime.agent_count, 20);
    }
}
