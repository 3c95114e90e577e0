//! Addresses, messages, and per-dispatch context.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key used when an address has no meaningful instance key.
pub const DEFAULT_KEY: &str = "default";

/// Routing address of an agent. The string form is `type_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId {
    #[serde(rename = "type")]
    pub agent_type: String,
    pub key: String,
}

impl AgentId {
    pub fn new(agent_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            key: key.into(),
        }
    }

    /// Address `type_default`, the usual way to reach an agent registered by name.
    pub fn default_key(agent_type: impl Into<String>) -> Self {
        Self::new(agent_type, DEFAULT_KEY)
    }

    /// Address whose composite form is the registry key `address` when it
    /// has a `type_key` shape, falling back to `address_default`.
    pub fn for_address(address: &str) -> Self {
        match address.rsplit_once('_') {
            Some((agent_type, key)) if !agent_type.is_empty() && !key.is_empty() => {
                Self::new(agent_type, key)
            }
            _ => Self::default_key(address),
        }
    }

    /// Registry keys to try, in resolution order.
    pub fn lookup_keys(&self) -> [String; 3] {
        [self.to_string(), self.agent_type.clone(), self.key.clone()]
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.agent_type, self.key)
    }
}

/// Prefix of replies that stand in for a failed operation.
pub const FAILURE_PREFIX: &str = "❌";

/// An immutable text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
}

impl Message {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Sentinel reply for an address that did not resolve.
    pub fn not_found(address: &AgentId) -> Self {
        Self::new(format!("Agent {} not found", address))
    }

    /// Reply standing in for a failed operation.
    pub fn failure(description: impl fmt::Display) -> Self {
        Self::new(format!("{} {}", FAILURE_PREFIX, description))
    }

    pub fn is_failure(&self) -> bool {
        self.content.starts_with(FAILURE_PREFIX)
    }

    /// First `max` characters, for log lines.
    pub fn preview(&self, max: usize) -> String {
        preview(&self.content, max)
    }
}

/// Truncate on a character boundary, appending "..." when shortened.
pub fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Causal context travelling with a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContext {
    /// Conversation the current hop belongs to.
    pub conversation_id: Option<String>,
    /// Exchange that caused this dispatch.
    pub parent_exchange_id: Option<String>,
    /// Who sent the message, if it came from an agent.
    pub sender: Option<AgentId>,
    /// Number of agent-to-agent hops above this one.
    pub depth: u8,
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for the next hop, recorded as `exchange_id` inside `conversation_id`.
    pub fn child(&self, conversation_id: impl Into<String>, exchange_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            parent_exchange_id: Some(exchange_id.into()),
            sender: None,
            depth: self.depth.saturating_add(1),
        }
    }

    pub fn with_sender(mut self, sender: AgentId) -> Self {
        self.sender = Some(sender);
        self
    }
}
