//! Address registry: maps registry keys to live agents.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::agent::Agent;

use super::message::AgentId;

/// Shared map from registry key to agent instance.
///
/// Keys are whatever the agent was registered under; resolution of an
/// [`AgentId`] tries the composite `type_key` form, then the bare type, then
/// the bare key.
#[derive(Default)]
pub struct AddressRegistry {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a binding. Returns the agent previously bound to the key.
    pub fn insert(&self, key: impl Into<String>, agent: Arc<dyn Agent>) -> Option<Arc<dyn Agent>> {
        self.agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), agent)
    }

    /// Exact key lookup.
    pub fn get(&self, key: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Resolve an address with fallback; the first hit wins.
    pub fn resolve(&self, id: &AgentId) -> Option<Arc<dyn Agent>> {
        let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
        id.lookup_keys()
            .iter()
            .find_map(|key| agents.get(key).cloned())
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Point-in-time copy of every binding.
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn Agent>)> {
        let mut entries: Vec<(String, Arc<dyn Agent>)> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, a)| (k.clone(), Arc::clone(a)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.agents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentRole, Capability, RuntimeBinding};
    use async_trait::async_trait;

    struct Named {
        name: String,
        binding: RuntimeBinding,
    }

    impl Named {
        fn arc(name: &str) -> Arc<dyn Agent> {
            Arc::new(Self {
                name: name.to_string(),
                binding: RuntimeBinding::new(),
            })
        }
    }

    #[async_trait]
    impl Agent for Named {
        fn name(&self) -> &str {
            &self.name
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

    #[test]
    fn test_resolution_fallback_order() {
        let registry = AddressRegistry::new();
        registry.insert("agent1", Named::arc("by-type"));
        registry.insert("agent1_default", Named::arc("by-composite"));
        registry.insert("special", Named::arc("by-key"));

        let hit = registry.resolve(&AgentId::new("agent1", "default")).unwrap();
        assert_eq!(hit.name(), "by-composite");

        let hit = registry.resolve(&AgentId::new("agent1", "other")).unwrap();
        assert_eq!(hit.name(), "by-type");

        let hit = registry.resolve(&AgentId::new("nobody", "special")).unwrap();
        assert_eq!(hit.name(), "by-key");

        assert!(registry.resolve(&AgentId::new("nobody", "none")).is_none());
    }

    #[test]
    fn test_insert_replaces_binding() {
        let registry = AddressRegistry::new();
        assert!(registry.insert("a", Named::arc("first")).is_none());
        let previous = registry.insert("a", Named::arc("second")).unwrap();
        assert_eq!(previous.name(), "first");
        assert_eq!(registry.get("a").unwrap().name(), "second");
        assert_eq!(registry.len(), 1);
    }
}
