//! Host side of the simulated host/worker split.
//!
//! Worker runtimes mirror their registrations here. The host only resolves
//! composite addresses and exists for inspection and top-level sends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::agent::Agent;

use super::message::{AgentId, Message, MessageContext};
use super::registry::AddressRegistry;
use super::runtime::dispatch;

pub struct RuntimeHost {
    address: String,
    registry: AddressRegistry,
    running: AtomicBool,
}

impl RuntimeHost {
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        tracing::info!("Created distributed runtime host at {}", address);
        Self {
            address,
            registry: AddressRegistry::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Distributed runtime host started at {}", self.address);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Distributed runtime host stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Record an agent a worker runtime registered.
    pub fn register_from_worker(&self, key: impl Into<String>, agent: Arc<dyn Agent>) {
        let key = key.into();
        self.registry.insert(key.clone(), agent);
        tracing::info!("Host registered agent from worker: {}", key);
    }

    pub fn addresses(&self) -> Vec<String> {
        self.registry.keys()
    }

    /// Send to the agent registered under the composite form of `target`.
    pub async fn send(&self, message: Message, target: &AgentId) -> Message {
        if !self.is_running() {
            tracing::warn!("Distributed runtime not started");
            return message;
        }

        let key = target.to_string();
        let Some(agent) = self.registry.get(&key) else {
            tracing::error!("Agent {} not found in distributed runtime", key);
            return Message::not_found(target);
        };

        tracing::info!("Distributed message sent to {}: {}", key, message.preview(50));
        let reply = dispatch(agent.as_ref(), message, MessageContext::new()).await;
        tracing::info!("Distributed response from {}: {}", key, reply.preview(50));
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Runtime;
    use crate::agent::{AgentRole, Capability, RuntimeBinding};
    use crate::tracker::MessageTracker;
    use async_trait::async_trait;

    struct Silent {
        binding: RuntimeBinding,
    }

    #[async_trait]
    impl Agent for Silent {
        fn name(&self) -> &str {
            "silent"
        }
        fn agent_type(&self) -> &str {
            "test"
        }
        fn role(&self) -> AgentRole {
            AgentRole::Worker
        }
        fn capabilities(&self) -> &[Capability] {
            &[]
        }
        fn binding(&self) -> &RuntimeBinding {
            &self.binding
        }
    }

    #[tokio::test]
    async fn test_worker_registrations_are_mirrored() {
        let host = Arc::new(RuntimeHost::new("localhost:50051"));
        let worker = Runtime::new(host.address(), Arc::new(MessageTracker::in_memory()));
        assert!(worker.connect_host(Arc::clone(&host)));
        assert!(!worker.connect_host(Arc::clone(&host)));

        worker
            .register("silent_default", || -> Arc<dyn Agent> {
                Arc::new(Silent {
                    binding: RuntimeBinding::new(),
                })
            })
            .unwrap();
        assert_eq!(host.addresses(), vec!["silent_default".to_string()]);

        let target = AgentId::default_key("silent");
        assert_eq!(host.send(Message::new("x"), &target).await.content, "x");

        host.start();
        let reply = host.send(Message::new("x"), &target).await;
        assert_eq!(reply.content, "Worker agent silent received: x");

        let reply = host.send(Message::new("x"), &AgentId::new("silent", "other")).await;
        assert_eq!(reply.content, "Agent silent_other not found");
    }
}
