//! The Creator: synthesizes, installs and smoke-tests new worker agents.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;
use crate::core::{AgentId, Message, MessageContext};
use crate::error::{Error, Result};
use crate::providers::Provider;

use super::contract::{execute_with_contract, ExecutionContract};
use super::definition::{AgentDefinition, TEMPLATE_MARKER};
use super::loader::AgentLoader;
use super::{send_tracked, Agent, AgentRole, Capability, RuntimeBinding, NO_RUNTIME};

/// Exchange type recorded for the first message a new agent receives.
pub const SMOKE_TEST_MESSAGE_TYPE: &str = "smoke_test";

const CAPABILITIES: &[Capability] = &[Capability::CreationHandler];

const SYSTEM_MESSAGE: &str = "You are an Agent that is able to create new AI Agents.
You receive a template in the form of a JSON agent definition.
You should use this template to create a new Agent with a unique system message that is different from the template,
and reflects their unique characteristics, interests and goals.
You can choose to keep their overall goal the same, or change it.
You can choose to take this Agent in a completely different direction. The only requirement is that the definition
keeps every field of the template and declares the same contract.
Also avoid environmental interests - try to mix up the business verticals so that every agent is different.
Respond only with the JSON definition, no other text, and no markdown code blocks.";

const USER_PROMPT: &str = "Please generate a new Agent based strictly on this template. Stick to the structure.

IMPORTANT REQUIREMENTS:
1. Keep the fields agent_type, description, system_message, bounce_probability, bounce_prompt and contract
2. The contract must list construct, register, send and handle
3. Use a new snake_case agent_type that describes the persona
4. bounce_probability must be between 0 and 1, and bounce_prompt must contain {reply}
5. Be creative about the system message and business focus, but keep the structure identical

Respond only with the JSON definition, no other text, and no markdown code blocks.

";

pub struct Creator {
    name: String,
    provider: Arc<dyn Provider>,
    model: Option<String>,
    contract: ExecutionContract,
    loader: Arc<dyn AgentLoader>,
    template: Option<String>,
    smoke_test_prompt: String,
    binding: RuntimeBinding,
}

impl Creator {
    pub fn new(name: impl Into<String>, provider: Arc<dyn Provider>, loader: Arc<dyn AgentLoader>) -> Self {
        let name = name.into();
        tracing::info!("Created creator agent: {}", name);
        Self {
            name,
            provider,
            model: None,
            contract: ExecutionContract::default(),
            loader,
            template: None,
            smoke_test_prompt: "Give me an idea".to_string(),
            binding: RuntimeBinding::new(),
        }
    }

    /// Build from settings, reading the template override if one is configured.
    pub fn from_settings(
        settings: &Settings,
        provider: Arc<dyn Provider>,
        loader: Arc<dyn AgentLoader>,
    ) -> Result<Self> {
        let mut creator = Self::new(settings.creator.name.clone(), provider, loader)
            .with_contract(ExecutionContract::from(&settings.execution))
            .with_smoke_test_prompt(settings.creator.smoke_test_prompt.clone());
        creator.model = settings.models.model.clone();
        if let Some(path) = &settings.creator.template_path {
            creator = creator.with_template(read_template(path)?);
        }
        Ok(creator)
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_contract(mut self, contract: ExecutionContract) -> Self {
        self.contract = contract;
        self
    }

    pub fn with_smoke_test_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.smoke_test_prompt = prompt.into();
        self
    }

    /// Prompt asking the model for a new definition shaped like the template.
    pub fn user_prompt(&self) -> Result<String> {
        let template = match &self.template {
            Some(template) => template.clone(),
            None => AgentDefinition::canonical().to_json()?,
        };
        Ok(format!("{}{}\n\n{}", USER_PROMPT, TEMPLATE_MARKER, template))
    }

    /// Generate, install and register `target`, then return its answer to
    /// the smoke-test prompt. Every failure comes back as a message naming
    /// the target.
    pub async fn create_agent(&self, target: &str, ctx: &MessageContext) -> Message {
        tracing::info!("Creator received request to create agent: {}", target);

        if let Err(e) = self.install(target).await {
            tracing::error!("Failed to create agent {}: {}", target, e);
            return Message::failure(format!("Failed to create agent {}: {}", target, e));
        }
        tracing::info!("Agent {} is live and registered", target);

        let reply = send_tracked(
            self,
            Message::new(self.smoke_test_prompt.clone()),
            &AgentId::default_key(target),
            SMOKE_TEST_MESSAGE_TYPE,
            ctx,
        )
        .await;
        tracing::info!("Tested new agent {}, received response", target);
        reply
    }

    async fn install(&self, target: &str) -> Result<()> {
        let runtime = self
            .runtime()
            .ok_or_else(|| Error::Other(NO_RUNTIME.to_string()))?;

        let is_creator = target == self.name
            || runtime
                .agent_at(target)
                .is_some_and(|existing| existing.role() == AgentRole::Creator);
        if is_creator {
            return Err(Error::Other(format!(
                "{} is a creator address and cannot be replaced",
                target
            )));
        }

        let prompt = self.user_prompt()?;
        let generated = execute_with_contract(
            Arc::clone(&self.provider),
            SYSTEM_MESSAGE,
            &prompt,
            self.model.as_deref(),
            &self.contract,
        )
        .await
        .map_err(|e| Error::Other(format!("generation failed: {}", e)))?;

        self.loader.persist(target, &generated).await?;
        tracing::info!("Creator has written a definition for agent {}", target);

        let module = self.loader.load(target).await?;
        runtime.register_agent(target, module.construct(target))?;
        Ok(())
    }
}

fn read_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Cannot read template {}: {}", path.display(), e))
    })
}

/// Agent name from a creation request such as `agent3.json`.
pub fn target_name(request: &str) -> &str {
    request.trim().split('.').next().unwrap_or_default().trim()
}

#[async_trait]
impl Agent for Creator {
    fn name(&self) -> &str {
        &self.name
    }

    fn agent_type(&self) -> &str {
        "creator"
    }

    fn role(&self) -> AgentRole {
        AgentRole::Creator
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn binding(&self) -> &RuntimeBinding {
        &self.binding
    }

    async fn handle_creation(&self, message: Message, ctx: MessageContext) -> Message {
        let target = target_name(&message.content);
        if target.is_empty() {
            return Message::failure("Failed to create agent: no agent name given");
        }
        self.create_agent(target, &ctx).await
    }
}
