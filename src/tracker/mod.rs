//! Message exchange tracking.
//!
//! - `types`: agent shadows, exchange records, statistics, snapshots
//! - `log`: the append-only JSONL log and its replay
//! - `tracker`: the [`MessageTracker`] itself

pub mod log;
#[allow(clippy::module_inception)]
pub mod tracker;
pub mod types;

pub use log::{replay, ExchangeLog};
pub use tracker::{default_export_name, MessageTracker};
pub use types::{
    AgentActivity, AgentInfo, ExchangeOutcome, ExchangeStatus, MessageExchange, MessageStats,
    Snapshot,
};
