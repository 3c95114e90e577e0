//! Worker agents: reply through the provider, optionally bounce the draft to a peer.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Settings, WorkerConfig};
use crate::core::{AgentId, Message, MessageContext, PeerSelector, UniformPeerSelector};
use crate::providers::Provider;

use super::contract::{execute_with_contract, ExecutionContract};
use super::definition::{AgentDefinition, REPLY_PLACEHOLDER};
use super::{exchange_tracked, send_tracked, Agent, AgentRole, Capability, RuntimeBinding};
use crate::tracker::ExchangeOutcome;

/// Bounces stop once a chain is this many hops deep.
pub const MAX_BOUNCE_DEPTH: u8 = 3;

/// Exchange type recorded for bounce requests.
pub const REFINEMENT_MESSAGE_TYPE: &str = "idea_refinement";

const CAPABILITIES: &[Capability] = &[Capability::MessageHandler];

/// Everything a worker needs besides its own definition.
#[derive(Clone)]
pub struct WorkerEnv {
    pub provider: Arc<dyn Provider>,
    pub model: Option<String>,
    pub contract: ExecutionContract,
    pub selector: Arc<dyn PeerSelector>,
    pub defaults: WorkerConfig,
}

impl WorkerEnv {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            model: None,
            contract: ExecutionContract::default(),
            selector: Arc::new(UniformPeerSelector),
            defaults: WorkerConfig::default(),
        }
    }

    pub fn from_settings(settings: &Settings, provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            model: settings.models.model.clone(),
            contract: ExecutionContract::from(&settings.execution),
            selector: Arc::new(UniformPeerSelector),
            defaults: settings.worker.clone(),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn PeerSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_contract(mut self, contract: ExecutionContract) -> Self {
        self.contract = contract;
        self
    }
}

pub struct WorkerAgent {
    name: String,
    agent_type: String,
    system_message: String,
    bounce_probability: f64,
    bounce_prompt: String,
    env: WorkerEnv,
    binding: RuntimeBinding,
}

impl WorkerAgent {
    pub fn from_definition(name: impl Into<String>, definition: &AgentDefinition, env: &WorkerEnv) -> Self {
        let name = name.into();
        tracing::info!("Created agent: {} ({})", name, definition.agent_type);
        Self {
            name,
            agent_type: definition.agent_type.clone(),
            system_message: definition.system_message.clone(),
            bounce_probability: definition
                .bounce_probability
                .unwrap_or(env.defaults.bounce_probability)
                .clamp(0.0, 1.0),
            bounce_prompt: definition
                .bounce_prompt
                .clone()
                .unwrap_or_else(|| env.defaults.bounce_prompt.clone()),
            env: env.clone(),
            binding: RuntimeBinding::new(),
        }
    }

    pub fn with_bounce_probability(mut self, probability: f64) -> Self {
        self.bounce_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn bounce_probability(&self) -> f64 {
        self.bounce_probability
    }

    /// Send to another agent through the bound runtime.
    pub async fn send(&self, message: Message, target: &AgentId, ctx: &MessageContext) -> Message {
        send_tracked(self, message, target, REFINEMENT_MESSAGE_TYPE, ctx).await
    }

    /// Reply to `message`, possibly after a peer refines the draft.
    pub async fn handle(&self, message: Message, ctx: MessageContext) -> Message {
        tracing::info!("{} received message: {}", self.name, message.preview(50));

        let draft = match execute_with_contract(
            Arc::clone(&self.env.provider),
            &self.system_message,
            &message.content,
            self.env.model.as_deref(),
            &self.env.contract,
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("{} failed to generate a reply: {}", self.name, e);
                return Message::failure(format!("{} could not generate a reply: {}", self.name, e));
            }
        };
        tracing::info!("{} generated idea: {}", self.name, crate::core::message::preview(&draft, 50));

        let Some(peer) = self.choose_peer(&ctx) else {
            return Message::new(draft);
        };

        tracing::info!("{} bouncing idea off {}", self.name, peer);
        let request = Message::new(self.bounce_request(&draft));
        let (refined, outcome) = exchange_tracked(
            self,
            request,
            &AgentId::for_address(&peer),
            REFINEMENT_MESSAGE_TYPE,
            &ctx,
        )
        .await;

        if outcome == ExchangeOutcome::Failed {
            tracing::warn!(
                "{} keeping its own draft, refinement by {} failed: {}",
                self.name,
                peer,
                refined.preview(80)
            );
            return Message::new(draft);
        }
        tracing::info!("{} received refined idea: {}", self.name, refined.preview(50));
        refined
    }

    /// Bounce prompt carrying `draft`; appended when the prompt has no placeholder.
    fn bounce_request(&self, draft: &str) -> String {
        if self.bounce_prompt.contains(REPLY_PLACEHOLDER) {
            self.bounce_prompt.replace(REPLY_PLACEHOLDER, draft)
        } else {
            format!("{}\n\n{}", self.bounce_prompt.trim_end(), draft)
        }
    }

    fn choose_peer(&self, ctx: &MessageContext) -> Option<String> {
        if ctx.depth >= MAX_BOUNCE_DEPTH {
            tracing::debug!("{} at bounce depth {}, replying directly", self.name, ctx.depth);
            return None;
        }
        let runtime = self.runtime()?;
        let peers = runtime.peers_of(&self.name);
        if peers.is_empty() {
            tracing::debug!("{} has no peers to bounce to", self.name);
            return None;
        }
        if !self.env.selector.should_bounce(self.bounce_probability) {
            return None;
        }
        self.env.selector.select(&peers)
    }
}

#[async_trait]
impl Agent for WorkerAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    fn role(&self) -> AgentRole {
        AgentRole::Worker
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn binding(&self) -> &RuntimeBinding {
        &self.binding
    }

    async fn handle_message(&self, message: Message, ctx: MessageContext) -> Message {
        self.handle(message, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FixedPeerSelector, Runtime};
    use crate::providers::ScriptedProvider;
    use crate::tracker::{ExchangeStatus, MessageTracker};

    fn setup(provider: Arc<ScriptedProvider>, selector: Arc<dyn PeerSelector>) -> (Runtime, WorkerEnv) {
        crate::logging::init_test();
        let runtime = Runtime::new("localhost:50051", Arc::new(MessageTracker::in_memory()));
        runtime.start();
        let env = WorkerEnv::new(provider)
            .with_selector(selector)
            .with_contract(ExecutionContract::once());
        (runtime, env)
    }

    fn register(runtime: &Runtime, env: &WorkerEnv, name: &str, probability: f64) {
        let agent = WorkerAgent::from_definition(name, &AgentDefinition::canonical(), env)
            .with_bounce_probability(probability);
        runtime.register_agent(name, Arc::new(agent)).unwrap();
    }

    #[tokio::test]
    async fn test_no_bounce_replies_from_own_provider() {
        let provider = Arc::new(ScriptedProvider::echo());
        provider.push_reply("agent1 idea");
        let (runtime, env) = setup(Arc::clone(&provider), Arc::new(UniformPeerSelector));
        register(&runtime, &env, "agent1", 0.0);
        register(&runtime, &env, "agent2", 0.0);

        let reply = runtime
            .send(Message::new("hello"), &AgentId::new("agent1", "default"))
            .await;

        assert_eq!(reply.content, "agent1 idea");
        assert_eq!(provider.prompts(), vec!["hello"]);
        assert!(runtime.tracker().exchanges().is_empty());
    }

    #[tokio::test]
    async fn test_forced_bounce_without_peers_replies_directly() {
        let provider = Arc::new(ScriptedProvider::echo());
        let (runtime, env) = setup(Arc::clone(&provider), Arc::new(UniformPeerSelector));
        register(&runtime, &env, "agent1", 1.0);

        let reply = runtime
            .send(Message::new("hello"), &AgentId::default_key("agent1"))
            .await;

        assert_eq!(reply.content, "echo: hello");
        assert!(runtime.tracker().exchanges().is_empty());
    }

    #[tokio::test]
    async fn test_bounce_adopts_peer_reply_and_is_tracked() {
        let provider = Arc::new(ScriptedProvider::echo());
        provider.push_reply("draft").push_reply("refined");
        let (runtime, env) = setup(Arc::clone(&provider), Arc::new(FixedPeerSelector::always()));
        register(&runtime, &env, "agent1", 1.0);
        register(&runtime, &env, "agent2", 0.0);

        let reply = runtime
            .send(Message::new("hello"), &AgentId::default_key("agent1"))
            .await;
        assert_eq!(reply.content, "refined");

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("draft"));

        let exchanges = runtime.tracker().exchanges();
        assert_eq!(exchanges.len(), 1);
        let exchange = &exchanges[0];
        assert_eq!(exchange.originator.id, "agent1");
        assert_eq!(exchange.target.id, "agent2");
        assert_eq!(exchange.message_type, REFINEMENT_MESSAGE_TYPE);
        assert_eq!(exchange.status, ExchangeStatus::Processed);
    }

    #[tokio::test]
    async fn test_bounce_reaches_peer_registered_under_other_address() {
        let provider = Arc::new(ScriptedProvider::echo());
        provider.push_reply("draft").push_reply("refined by bob");
        let (runtime, env) = setup(Arc::clone(&provider), Arc::new(FixedPeerSelector::always()));
        register(&runtime, &env, "agent1", 1.0);
        let bob = WorkerAgent::from_definition("bob", &AgentDefinition::canonical(), &env)
            .with_bounce_probability(0.0);
        runtime.register_agent("worker_b", Arc::new(bob)).unwrap();

        let reply = runtime
            .send(Message::new("hello"), &AgentId::default_key("agent1"))
            .await;
        assert_eq!(reply.content, "refined by bob");

        let exchanges = runtime.tracker().exchanges();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].target.id, "bob");
        assert_eq!(exchanges[0].status, ExchangeStatus::Processed);
    }

    #[tokio::test]
    async fn test_bounce_prompt_without_placeholder_still_carries_draft() {
        let provider = Arc::new(ScriptedProvider::echo());
        provider.push_reply("SECRET_DRAFT").push_reply("refined");
        let (runtime, env) = setup(Arc::clone(&provider), Arc::new(FixedPeerSelector::always()));
        let mut definition = AgentDefinition::canonical();
        definition.bounce_prompt = Some("Please refine my idea".to_string());
        let agent = WorkerAgent::from_definition("agent1", &definition, &env).with_bounce_probability(1.0);
        runtime.register_agent("agent1", Arc::new(agent)).unwrap();
        register(&runtime, &env, "agent2", 0.0);

        runtime
            .send(Message::new("Give me an idea"), &AgentId::default_key("agent1"))
            .await;

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].starts_with("Please refine my idea"));
        assert!(prompts[1].contains("SECRET_DRAFT"));
    }

    #[tokio::test]
    async fn test_failed_refinement_keeps_draft() {
        let provider = Arc::new(ScriptedProvider::echo());
        provider.push_reply("my draft").push_failure("rate limit");
        let (runtime, env) = setup(Arc::clone(&provider), Arc::new(FixedPeerSelector::always()));
        register(&runtime, &env, "agent1", 1.0);
        register(&runtime, &env, "agent2", 0.0);

        let reply = runtime
            .send(Message::new("hello"), &AgentId::default_key("agent1"))
            .await;
        assert_eq!(reply.content, "my draft");

        let exchanges = runtime.tracker().exchanges();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].status, ExchangeStatus::Failed);
        assert_eq!(runtime.tracker().statistics().failed_exchanges, 1);
    }

    #[tokio::test]
    async fn test_bounce_chain_stays_in_one_conversation_and_terminates() {
        let provider = Arc::new(ScriptedProvider::echo());
        let (runtime, env) = setup(Arc::clone(&provider), Arc::new(FixedPeerSelector::always()));
        register(&runtime, &env, "agent1", 1.0);
        register(&runtime, &env, "agent2", 1.0);

        let reply = runtime
            .send(Message::new("hello"), &AgentId::default_key("agent1"))
            .await;
        assert!(!reply.content.is_empty());

        let exchanges = runtime.tracker().exchanges();
        assert_eq!(exchanges.len(), MAX_BOUNCE_DEPTH as usize);
        let conversation = &exchanges[0].conversation_id;
        assert!(exchanges.iter().all(|e| &e.conversation_id == conversation));
        assert_eq!(
            runtime.tracker().conversation_flow(conversation).len(),
            MAX_BOUNCE_DEPTH as usize
        );
        assert!(exchanges.iter().all(|e| e.status == ExchangeStatus::Processed));
    }

    #[tokio::test]
    async fn test_generation_failure_degrades_to_message() {
        let provider = Arc::new(ScriptedProvider::echo());
        provider.push_failure("rate limit");
        let (runtime, env) = setup(Arc::clone(&provider), Arc::new(UniformPeerSelector));
        register(&runtime, &env, "agent1", 0.0);

        let reply = runtime
            .send(Message::new("hello"), &AgentId::default_key("agent1"))
            .await;
        assert!(reply.content.contains("agent1 could not generate a reply"));
    }

    #[tokio::test]
    async fn test_unbound_worker_cannot_send() {
        let env = WorkerEnv::new(Arc::new(ScriptedProvider::echo()));
        let agent = WorkerAgent::from_definition("loner", &AgentDefinition::canonical(), &env);

        let reply = agent
            .send(Message::new("hi"), &AgentId::default_key("agent1"), &MessageContext::new())
            .await;
        assert_eq!(reply.content, crate::agent::NO_RUNTIME);

        let reply = agent.handle(Message::new("hi"), MessageContext::new()).await;
        assert_eq!(reply.content, "echo: hi");
    }

    #[test]
    fn test_definition_defaults_fill_gaps() {
        let env = WorkerEnv::new(Arc::new(ScriptedProvider::echo()));
        let mut definition = AgentDefinition::canonical();
        definition.bounce_probability = None;
        definition.bounce_prompt = None;

        let agent = WorkerAgent::from_definition("a", &definition, &env);
        assert_eq!(agent.bounce_probability(), env.defaults.bounce_probability);
        assert_eq!(agent.agent_type(), "fintech_strategist");
    }
}
