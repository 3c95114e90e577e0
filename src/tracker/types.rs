//! Records kept by the message tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type given to agents first seen in an exchange rather than registered.
pub const UNKNOWN_AGENT_TYPE: &str = "unknown";

/// Tracking shadow of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Exchanges this agent has originated.
    pub message_count: u64,
}

impl AgentInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            agent_type: agent_type.into(),
            status: "active".to_string(),
            created_at: now,
            last_seen: now,
            message_count: 0,
        }
    }

    /// Shadow for an id the tracker has not been told about.
    pub fn unknown(id: &str) -> Self {
        Self::new(id, id, UNKNOWN_AGENT_TYPE)
    }

    pub fn is_unknown(&self) -> bool {
        self.agent_type == UNKNOWN_AGENT_TYPE
    }
}

/// Exchange lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    Sent,
    Delivered,
    Processed,
    Failed,
}

impl ExchangeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExchangeStatus::Processed | ExchangeStatus::Failed)
    }
}

impl std::fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeStatus::Sent => write!(f, "sent"),
            ExchangeStatus::Delivered => write!(f, "delivered"),
            ExchangeStatus::Processed => write!(f, "processed"),
            ExchangeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal state an exchange can be completed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Processed,
    Failed,
}

impl From<ExchangeOutcome> for ExchangeStatus {
    fn from(outcome: ExchangeOutcome) -> Self {
        match outcome {
            ExchangeOutcome::Processed => ExchangeStatus::Processed,
            ExchangeOutcome::Failed => ExchangeStatus::Failed,
        }
    }
}

/// One tracked hop from an originator to a target.
///
/// Also the shape of a line in the exchange log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageExchange {
    pub exchange_id: String,
    pub timestamp: DateTime<Utc>,
    /// Originator as it was when the exchange started.
    pub originator: AgentInfo,
    /// Target as it was when the exchange started.
    pub target: AgentInfo,
    pub message_type: String,
    pub content: String,
    pub content_length: usize,
    /// Zero until the exchange completes.
    pub response_time_ms: f64,
    pub status: ExchangeStatus,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_exchange_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MessageExchange {
    pub fn short_id(&self) -> &str {
        self.exchange_id.get(..8).unwrap_or(&self.exchange_id)
    }
}

/// Aggregate statistics over every exchange the tracker holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageStats {
    pub total_exchanges: usize,
    pub successful_exchanges: usize,
    pub failed_exchanges: usize,
    pub pending_exchanges: usize,
    /// Mean over completed exchanges, in milliseconds.
    pub average_response_time: f64,
    /// Name of the agent that originated the most exchanges.
    pub most_active_agent: String,
    pub longest_conversation: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentActivity {
    pub agent_info: AgentInfo,
    pub total_messages_sent: usize,
    pub total_messages_received: usize,
    /// Mean over exchanges this agent originated with a positive response time.
    pub average_response_time: f64,
    pub conversation_count: usize,
    pub last_activity: DateTime<Utc>,
}

/// Full tracker state as written by an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub export_timestamp: DateTime<Utc>,
    pub statistics: MessageStats,
    pub agents: BTreeMap<String, AgentInfo>,
    pub exchanges: Vec<MessageExchange>,
    pub conversations: BTreeMap<String, Vec<String>>,
}
