//! Core module - addressing, registry, routing, and the runtime.
//!
//! This module contains the heart of AgentForge's message processing:
//! - Agent addresses and messages
//! - Address registry with fallback resolution
//! - Worker runtime and the host it mirrors into
//! - Peer selection for bounces

pub mod host;
pub mod message;
pub mod registry;
pub mod routing;
pub mod runtime;

pub use host::RuntimeHost;
pub use message::{AgentId, Message, MessageContext};
pub use registry::AddressRegistry;
pub use routing::{FixedPeerSelector, PeerSelector, UniformPeerSelector};
pub use runtime::{DispatchError, Runtime, RuntimeHandle};
