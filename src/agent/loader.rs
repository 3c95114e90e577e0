//! Dynamic loading of generated agent definitions.
//!
//! Loading is an explicit install step: read the persisted definition, check
//! it against the agent contract, and only then hand back a module that can
//! construct agents. Nothing is registered here, so a rejected definition
//! never reaches the runtime.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::definition::{strip_code_fence, AgentDefinition, ContractItem, REPLY_PLACEHOLDER};
use super::worker::{WorkerAgent, WorkerEnv};
use super::Agent;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("invalid module name '{0}'")]
    InvalidName(String),

    #[error("module {0} not found")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed definition: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("module {module} does not satisfy the agent contract, missing: {missing}")]
    ContractMismatch { module: String, missing: String },

    #[error("invalid definition for {module}: {reason}")]
    InvalidDefinition { module: String, reason: String },
}

/// A loaded, validated module that can construct agents by name.
pub trait AgentModule: Send + Sync {
    fn module_name(&self) -> &str;

    fn construct(&self, name: &str) -> Arc<dyn Agent>;
}

/// Stores generated agent sources and resolves them back into modules.
#[async_trait]
pub trait AgentLoader: Send + Sync {
    /// Store generated source for `module`, replacing any earlier version.
    async fn persist(&self, module: &str, source: &str) -> Result<(), LoadError>;

    async fn load(&self, module: &str) -> Result<Box<dyn AgentModule>, LoadError>;
}

struct DefinitionModule {
    module: String,
    definition: AgentDefinition,
    env: WorkerEnv,
}

impl AgentModule for DefinitionModule {
    fn module_name(&self) -> &str {
        &self.module
    }

    fn construct(&self, name: &str) -> Arc<dyn Agent> {
        Arc::new(WorkerAgent::from_definition(name, &self.definition, &self.env))
    }
}

/// Loads `<dir>/<module>.json` definitions into worker modules.
pub struct DefinitionLoader {
    dir: PathBuf,
    env: WorkerEnv,
}

impl DefinitionLoader {
    pub fn new(dir: impl Into<PathBuf>, env: WorkerEnv) -> Self {
        Self {
            dir: dir.into(),
            env,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, module: &str) -> Result<PathBuf, LoadError> {
        let valid = Regex::new(r"^\w+$")
            .map(|re| re.is_match(module))
            .unwrap_or(false);
        if !valid {
            return Err(LoadError::InvalidName(module.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", module)))
    }
}

#[async_trait]
impl AgentLoader for DefinitionLoader {
    async fn persist(&self, module: &str, source: &str) -> Result<(), LoadError> {
        let path = self.path_for(module)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, strip_code_fence(source)).await?;
        tracing::info!("Persisted definition for {} at {}", module, path.display());
        Ok(())
    }

    async fn load(&self, module: &str) -> Result<Box<dyn AgentModule>, LoadError> {
        let path = self.path_for(module)?;
        if !path.exists() {
            return Err(LoadError::NotFound(module.to_string()));
        }

        let text = tokio::fs::read_to_string(&path).await?;
        let definition = AgentDefinition::parse(&text)?;
        validate_contract(module, &definition)?;

        tracing::info!("Loaded module {} ({})", module, definition.agent_type);
        Ok(Box::new(DefinitionModule {
            module: module.to_string(),
            definition,
            env: self.env.clone(),
        }))
    }
}

/// Reject definitions that cannot behave as a worker agent.
pub fn validate_contract(module: &str, definition: &AgentDefinition) -> Result<(), LoadError> {
    let missing = definition.missing_contract();
    if !missing.is_empty() {
        let missing = missing
            .iter()
            .map(|item| contract_name(*item))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(LoadError::ContractMismatch {
            module: module.to_string(),
            missing,
        });
    }

    let invalid = |reason: &str| LoadError::InvalidDefinition {
        module: module.to_string(),
        reason: reason.to_string(),
    };

    if definition.agent_type.trim().is_empty() {
        return Err(invalid("agent_type is empty"));
    }
    if definition.system_message.trim().is_empty() {
        return Err(invalid("system_message is empty"));
    }
    if let Some(p) = definition.bounce_probability {
        if !(0.0..=1.0).contains(&p) {
            return Err(invalid(&format!("bounce_probability {} outside [0, 1]", p)));
        }
    }
    if let Some(prompt) = &definition.bounce_prompt {
        if !prompt.contains(REPLY_PLACEHOLDER) {
            return Err(invalid(&format!("bounce_prompt has no {} placeholder", REPLY_PLACEHOLDER)));
        }
    }
    Ok(())
}

fn contract_name(item: ContractItem) -> &'static str {
    match item {
        ContractItem::Construct => "construct",
        ContractItem::Register => "register",
        ContractItem::Send => "send",
        ContractItem::Handle => "handle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> DefinitionLoader {
        DefinitionLoader::new(dir, WorkerEnv::new(Arc::new(ScriptedProvider::echo())))
    }

    #[tokio::test]
    async fn test_persist_then_load_constructs_named_worker() {
        let dir = tempdir().unwrap();
        let loader = loader(dir.path());
        let text = AgentDefinition::marketing_strategist().to_json().unwrap();

        loader.persist("agent3", &format!("```json\n{}\n```", text)).await.unwrap();
        assert!(dir.path().join("agent3.json").exists());

        let module = loader.load("agent3").await.unwrap();
        assert_eq!(module.module_name(), "agent3");
        let agent = module.construct("agent3");
        assert_eq!(agent.name(), "agent3");
        assert_eq!(agent.agent_type(), "marketing_strategist");
    }

    #[tokio::test]
    async fn test_missing_contract_items_rejected() {
        let dir = tempdir().unwrap();
        let loader = loader(dir.path());
        loader
            .persist(
                "agent4",
                r#"{"agent_type": "x", "system_message": "persona", "contract": ["construct", "handle"]}"#,
            )
            .await
            .unwrap();

        match loader.load("agent4").await {
            Err(LoadError::ContractMismatch { module, missing }) => {
                assert_eq!(module, "agent4");
                assert_eq!(missing, "register, send");
            }
            _ => panic!("expected contract mismatch"),
        }
    }

    #[tokio::test]
    async fn test_malformed_and_missing_modules() {
        let dir = tempdir().unwrap();
        let loader = loader(dir.path());
        loader.persist("agent5", "class Agent5: pass").await.unwrap();

        assert!(matches!(loader.load("agent5").await, Err(LoadError::Malformed(_))));
        assert!(matches!(loader.load("agent6").await, Err(LoadError::NotFound(_))));
        assert!(matches!(loader.load("../etc").await, Err(LoadError::InvalidName(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut def = AgentDefinition::canonical();
        def.bounce_probability = Some(1.5);
        assert!(matches!(
            validate_contract("a", &def),
            Err(LoadError::InvalidDefinition { .. })
        ));

        let mut def = AgentDefinition::canonical();
        def.system_message = "  ".to_string();
        assert!(validate_contract("a", &def).is_err());

        assert!(validate_contract("a", &AgentDefinition::canonical()).is_ok());
    }

    #[tokio::test]
    async fn test_bounce_prompt_without_draft_placeholder_rejected() {
        let dir = tempdir().unwrap();
        let loader = loader(dir.path());
        let mut def = AgentDefinition::canonical();
        def.bounce_prompt = Some("Please refine my idea".to_string());
        loader.persist("agent7", &def.to_json().unwrap()).await.unwrap();

        match loader.load("agent7").await {
            Err(LoadError::InvalidDefinition { module, reason }) => {
                assert_eq!(module, "agent7");
                assert!(reason.contains("{reply}"), "{}", reason);
            }
            _ => panic!("expected invalid definition"),
        }

        def.bounce_prompt = None;
        assert!(validate_contract("agent7", &def).is_ok());
    }
}
