//! AgentForge library root.

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod providers;
pub mod tracker;
pub mod world;

pub use agent::{Agent, Creator, WorkerAgent};
pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use core::{AgentId, Message, Runtime, RuntimeHost};
pub use error::{Error, Result};
pub use providers::Provider;
pub use tracker::MessageTracker;
