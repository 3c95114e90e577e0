//! Worker runtime: registration, addressed dispatch, lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use thiserror::Error;

use crate::agent::{Agent, AgentRole, Capability};
use crate::error::Result;
use crate::tracker::MessageTracker;

use super::host::RuntimeHost;
use super::message::{AgentId, Message, MessageContext};
use super::registry::AddressRegistry;

/// Why a dispatch did not reach a handler.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("runtime not started")]
    NotStarted(Message),

    #[error("Agent {0} not found")]
    AddressNotFound(AgentId),
}

impl DispatchError {
    /// The reply a caller sees for this failure.
    pub fn into_message(self) -> Message {
        match self {
            DispatchError::NotStarted(original) => original,
            DispatchError::AddressNotFound(id) => Message::not_found(&id),
        }
    }
}

struct RuntimeInner {
    host_address: String,
    registry: AddressRegistry,
    running: AtomicBool,
    tracker: Arc<MessageTracker>,
    host: OnceLock<Arc<RuntimeHost>>,
}

/// In-process worker runtime. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning reference from an agent back to its runtime.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Weak<RuntimeInner>,
}

impl RuntimeHandle {
    /// The runtime, if it is still alive.
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }

    pub fn points_to(&self, runtime: &Runtime) -> bool {
        Weak::as_ptr(&self.inner) == Arc::as_ptr(&runtime.inner)
    }
}

impl Runtime {
    /// Create a stopped runtime that records exchanges into `tracker`.
    pub fn new(host_address: impl Into<String>, tracker: Arc<MessageTracker>) -> Self {
        let host_address = host_address.into();
        tracing::info!("Created worker runtime connecting to {}", host_address);
        Self {
            inner: Arc::new(RuntimeInner {
                host_address,
                registry: AddressRegistry::new(),
                running: AtomicBool::new(false),
                tracker,
                host: OnceLock::new(),
            }),
        }
    }

    /// Mirror every future registration into `host`. Returns false if a host
    /// was already connected.
    pub fn connect_host(&self, host: Arc<RuntimeHost>) -> bool {
        let connected = self.inner.host.set(host).is_ok();
        if !connected {
            tracing::warn!("Worker runtime already connected to a host");
        }
        connected
    }

    pub fn host_address(&self) -> &str {
        &self.inner.host_address
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn tracker(&self) -> &Arc<MessageTracker> {
        &self.inner.tracker
    }

    pub fn start(&self) {
        self.inner.running.store(true, Ordering::SeqCst);
        tracing::info!("Worker runtime started, connected to {}", self.inner.host_address);
    }

    /// Stop dispatching. Sends already past dispatch run to completion.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        tracing::info!("Worker runtime stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Construct an agent with `factory` and register it under `address`.
    pub fn register<F>(&self, address: impl Into<String>, factory: F) -> Result<Arc<dyn Agent>>
    where
        F: FnOnce() -> Arc<dyn Agent>,
    {
        self.register_agent(address, factory())
    }

    /// Bind `agent` to this runtime and insert it under `address`.
    ///
    /// Re-registering an address replaces the previous binding.
    pub fn register_agent(
        &self,
        address: impl Into<String>,
        agent: Arc<dyn Agent>,
    ) -> Result<Arc<dyn Agent>> {
        let address = address.into();
        agent.bind(self.handle())?;

        self.inner
            .tracker
            .register_agent(agent.name(), agent.name(), agent.agent_type());

        if let Some(previous) = self.inner.registry.insert(address.clone(), Arc::clone(&agent)) {
            tracing::info!(
                "Replaced agent {} previously bound to {}",
                previous.name(),
                address
            );
        }
        if let Some(host) = self.inner.host.get() {
            host.register_from_worker(address.clone(), Arc::clone(&agent));
        }

        tracing::info!("Worker registered agent: {}", address);
        Ok(agent)
    }

    /// Registered addresses, sorted.
    pub fn addresses(&self) -> Vec<String> {
        self.inner.registry.keys()
    }

    pub fn resolve(&self, id: &AgentId) -> Option<Arc<dyn Agent>> {
        self.inner.registry.resolve(id)
    }

    /// Agent registered under exactly `address`, without fallback.
    pub fn agent_at(&self, address: &str) -> Option<Arc<dyn Agent>> {
        self.inner.registry.get(address)
    }

    /// Addresses `name` may bounce to: every address holding a worker other
    /// than `name` itself, sorted.
    pub fn peers_of(&self, name: &str) -> Vec<String> {
        let mut peers: Vec<String> = self
            .inner
            .registry
            .snapshot()
            .into_iter()
            .filter(|(_, agent)| agent.role() != AgentRole::Creator && agent.name() != name)
            .map(|(address, _)| address)
            .collect();
        peers.sort();
        peers
    }

    /// Send a message; failures come back as message content.
    pub async fn send(&self, message: Message, target: &AgentId) -> Message {
        self.send_with_context(message, target, MessageContext::new())
            .await
    }

    pub async fn send_with_context(
        &self,
        message: Message,
        target: &AgentId,
        ctx: MessageContext,
    ) -> Message {
        match self.try_send(message, target, ctx).await {
            Ok(reply) => reply,
            Err(e) => e.into_message(),
        }
    }

    /// Resolve `target` and run its handler.
    pub async fn try_send(
        &self,
        message: Message,
        target: &AgentId,
        ctx: MessageContext,
    ) -> std::result::Result<Message, DispatchError> {
        if !self.is_running() {
            tracing::warn!("Worker runtime not started, returning message to {} unchanged", target);
            return Err(DispatchError::NotStarted(message));
        }

        let agent = match self.inner.registry.resolve(target) {
            Some(agent) => agent,
            None => {
                tracing::error!("Agent {} not found in worker runtime", target);
                tracing::debug!(
                    "Available agents: {:?}; looking for type='{}', key='{}'",
                    self.addresses(),
                    target.agent_type,
                    target.key
                );
                return Err(DispatchError::AddressNotFound(target.clone()));
            }
        };

        tracing::info!("Worker message sent to {}: {}", target, message.preview(50));
        let reply = dispatch(agent.as_ref(), message, ctx).await;
        tracing::info!("Worker response from {}: {}", target, reply.preview(50));

        Ok(reply)
    }
}

/// Call the handler the agent declares, preferring creation over messages.
pub(crate) async fn dispatch(agent: &dyn Agent, message: Message, ctx: MessageContext) -> Message {
    let capabilities = agent.capabilities();
    if capabilities.contains(&Capability::CreationHandler) {
        agent.handle_creation(message, ctx).await
    } else if capabilities.contains(&Capability::MessageHandler) {
        agent.handle_message(message, ctx).await
    } else {
        Message::new(format!(
            "Worker agent {} received: {}",
            agent.name(),
            message.content
        ))
    }
}
