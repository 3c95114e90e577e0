//! Agents: the addressable actors the runtime dispatches to.
//!
//! - `worker`: reply + optional bounce to a peer
//! - `creator`: synthesizes and installs new workers
//! - `definition` / `loader`: the installable form of a worker
//! - `contract`: timeout and retry policy around provider calls

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::core::{AgentId, Message, MessageContext, Runtime, RuntimeHandle};
use crate::error::{Error, Result};
use crate::tracker::ExchangeOutcome;

pub mod contract;
pub mod creator;
pub mod definition;
pub mod loader;
pub mod worker;

pub use contract::ExecutionContract;
pub use creator::Creator;
pub use definition::{AgentDefinition, ContractItem};
pub use loader::{AgentLoader, AgentModule, DefinitionLoader, LoadError};
pub use worker::WorkerAgent;

/// Handlers an agent declares. The runtime dispatches on this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CreationHandler,
    MessageHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Worker,
    Creator,
}

/// Set-once slot for an agent's runtime back-reference.
#[derive(Default)]
pub struct RuntimeBinding {
    handle: OnceLock<RuntimeHandle>,
}

impl RuntimeBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to `handle`. Binding again to the same runtime is a no-op; any
    /// other runtime is rejected.
    pub fn bind(&self, agent: &str, handle: RuntimeHandle) -> Result<()> {
        match self.handle.get() {
            Some(existing) => match handle.upgrade() {
                Some(rt) if existing.points_to(&rt) => Ok(()),
                _ => Err(Error::AlreadyBound(agent.to_string())),
            },
            None => self
                .handle
                .set(handle)
                .map_err(|_| Error::AlreadyBound(agent.to_string())),
        }
    }

    pub fn runtime(&self) -> Option<Runtime> {
        self.handle.get().and_then(RuntimeHandle::upgrade)
    }
}

/// The agent contract every registered actor satisfies.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Identity, also the tracker id.
    fn name(&self) -> &str;

    /// Descriptive type recorded by the tracker.
    fn agent_type(&self) -> &str;

    fn role(&self) -> AgentRole;

    fn capabilities(&self) -> &[Capability];

    fn binding(&self) -> &RuntimeBinding;

    fn bind(&self, handle: RuntimeHandle) -> Result<()> {
        self.binding().bind(self.name(), handle)
    }

    fn runtime(&self) -> Option<Runtime> {
        self.binding().runtime()
    }

    async fn handle_creation(&self, message: Message, _ctx: MessageContext) -> Message {
        Message::new(format!("{} cannot create agents: {}", self.name(), message.content))
    }

    async fn handle_message(&self, message: Message, _ctx: MessageContext) -> Message {
        Message::new(format!("Worker agent {} received: {}", self.name(), message.content))
    }
}

/// Reply when an agent has no runtime to send through.
pub const NO_RUNTIME: &str = "❌ No runtime available";

/// Send from `agent` to `target`, recording the hop as one exchange.
///
/// The exchange joins `ctx`'s conversation when there is one and starts a new
/// conversation otherwise. Dispatch failures mark the exchange failed and come
/// back as message content.
pub async fn send_tracked(
    agent: &dyn Agent,
    message: Message,
    target: &AgentId,
    message_type: &str,
    ctx: &MessageContext,
) -> Message {
    exchange_tracked(agent, message, target, message_type, ctx).await.0
}

/// Like [`send_tracked`], also returning how the exchange ended.
///
/// A reply that is itself a failure message marks the exchange failed.
pub async fn exchange_tracked(
    agent: &dyn Agent,
    message: Message,
    target: &AgentId,
    message_type: &str,
    ctx: &MessageContext,
) -> (Message, ExchangeOutcome) {
    let Some(runtime) = agent.runtime() else {
        tracing::error!("Agent {} has no runtime access", agent.name());
        return (Message::new(NO_RUNTIME), ExchangeOutcome::Failed);
    };

    let tracker = runtime.tracker();
    let target_name = runtime
        .resolve(target)
        .map(|a| a.name().to_string())
        .unwrap_or_else(|| target.to_string());

    let exchange_id = tracker.start_linked_exchange(
        agent.name(),
        &target_name,
        message_type,
        &message.content,
        ctx.conversation_id.as_deref(),
        ctx.parent_exchange_id.as_deref(),
    );
    let conversation_id = tracker
        .conversation_of(&exchange_id)
        .unwrap_or_default();

    tracing::info!("{} sending message to {}", agent.name(), target);

    let child = ctx
        .child(conversation_id, exchange_id.clone())
        .with_sender(AgentId::default_key(agent.name()));

    let (reply, outcome) = match runtime.try_send(message, target, child).await {
        Ok(reply) if reply.is_failure() => {
            tracing::warn!("{} replied with a failure: {}", target_name, reply.preview(80));
            (reply, ExchangeOutcome::Failed)
        }
        Ok(reply) => (reply, ExchangeOutcome::Processed),
        Err(e) => {
            tracing::error!("Message exchange failed: {}", e);
            (e.into_message(), ExchangeOutcome::Failed)
        }
    };
    tracker.complete_exchange(&exchange_id, outcome, Some(&reply.content));
    (reply, outcome)
}
