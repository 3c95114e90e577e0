//! Message routing helpers.
//!
//! Handles:
//! - `@agent` prefix parsing for CLI input
//! - Peer selection for bounces

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

/// Parse agent routing from message prefix.
///
/// Returns the agent name if the message starts with `@agent_name `.
///
/// # Examples
///
/// ```
/// use agentforge::core::routing::parse_agent_routing;
///
/// let (agent, message) = parse_agent_routing("@agent1 pitch me something").unwrap();
/// assert_eq!(agent, "agent1");
/// assert_eq!(message, "pitch me something");
/// ```
pub fn parse_agent_routing(message: &str) -> Option<(String, String)> {
    let re = Regex::new(r"^@(\w+)\s+([\s\S]+)$").ok()?;

    let caps = re.captures(message.trim())?;
    let agent = caps.get(1)?.as_str().to_string();
    let remaining = caps.get(2)?.as_str();

    Some((agent, remaining.to_string()))
}

/// Chooses whether and where an agent bounces a draft.
pub trait PeerSelector: Send + Sync {
    /// Roll against the agent's bounce probability.
    fn should_bounce(&self, probability: f64) -> bool;

    /// Pick one of `peers`. `None` only when `peers` is empty.
    fn select(&self, peers: &[String]) -> Option<String>;
}

/// Uniform random choice over the current peer set.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformPeerSelector;

impl PeerSelector for UniformPeerSelector {
    fn should_bounce(&self, probability: f64) -> bool {
        rand::thread_rng().gen::<f64>() < probability.clamp(0.0, 1.0)
    }

    fn select(&self, peers: &[String]) -> Option<String> {
        peers.choose(&mut rand::thread_rng()).cloned()
    }
}

/// Deterministic selector: a fixed bounce decision and the first peer in order.
#[derive(Debug, Clone, Copy)]
pub struct FixedPeerSelector {
    bounce: bool,
}

impl FixedPeerSelector {
    pub fn always() -> Self {
        Self { bounce: true }
    }

    pub fn never() -> Self {
        Self { bounce: false }
    }
}

impl PeerSelector for FixedPeerSelector {
    fn should_bounce(&self, probability: f64) -> bool {
        self.bounce && probability > 0.0
    }

    fn select(&self, peers: &[String]) -> Option<String> {
        peers.first().cloned()
    }
}
