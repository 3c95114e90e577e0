//! Installable agent definitions.
//!
//! A definition is what the Creator asks the model to write and what the
//! loader turns back into a live [`WorkerAgent`](super::WorkerAgent). The
//! structural contract travels with it: a definition is only installable if it
//! declares every item in [`ContractItem::REQUIRED`].

use serde::{Deserialize, Serialize};

/// Line that precedes the template in a creation prompt.
pub const TEMPLATE_MARKER: &str = "Here is the template:";

/// Placeholder in a bounce prompt that stands for the draft being refined.
pub const REPLY_PLACEHOLDER: &str = "{reply}";

/// Operations an installed agent must support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractItem {
    /// Can be constructed from a name.
    Construct,
    /// Can be bound into a runtime registry.
    Register,
    /// Can originate messages through its runtime.
    Send,
    /// Can handle incoming messages.
    Handle,
}

impl ContractItem {
    pub const REQUIRED: [ContractItem; 4] = [
        ContractItem::Construct,
        ContractItem::Register,
        ContractItem::Send,
        ContractItem::Handle,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Tracker type, e.g. `fintech_strategist`.
    pub agent_type: String,
    #[serde(default)]
    pub description: String,
    /// Persona the agent replies under.
    pub system_message: String,
    /// Chance of bouncing a draft to a peer; the worker default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounce_probability: Option<f64>,
    /// Request sent to the peer; `{reply}` is replaced by the draft.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounce_prompt: Option<String>,
    #[serde(default)]
    pub contract: Vec<ContractItem>,
}

impl AgentDefinition {
    fn new(agent_type: &str, description: &str, system_message: &str, bounce: f64, bounce_prompt: &str) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            description: description.to_string(),
            system_message: system_message.to_string(),
            bounce_probability: Some(bounce),
            bounce_prompt: Some(bounce_prompt.to_string()),
            contract: ContractItem::REQUIRED.to_vec(),
        }
    }

    /// The canonical worker, used as the Creator's template.
    pub fn canonical() -> Self {
        Self::fintech_strategist()
    }

    pub fn fintech_strategist() -> Self {
        Self::new(
            "fintech_strategist",
            "Innovative fintech strategist creating financial technology solutions",
            "You are an innovative fintech strategist. Your mission is to design novel financial \
             technology solutions that improve accessibility and security.\n\
             Your main interests lie in sectors: Banking, Insurance, and Cryptocurrency.\n\
             You favor ideas that emphasize user trust and seamless integration.\n\
             You are analytical, detail-oriented, and cautious in risk-taking.\n\
             Your weakness: sometimes overly conservative and slow to pivot.\n\
             Communicate your fintech ideas clearly and persuasively.",
            0.5,
            "Here is my fintech solution idea. It might benefit from your perspective. \
             Please refine and enhance it. {reply}",
        )
    }

    pub fn marketing_strategist() -> Self {
        Self::new(
            "marketing_strategist",
            "Data-driven marketing strategist focused on innovative campaign ideas",
            "You are a savvy marketing strategist specializing in data-driven decision making.\n\
             Your goal is to generate innovative marketing campaigns that leverage AI and analytics.\n\
             Your main business interest lies in Retail and Technology sectors.\n\
             You prioritize customer personalization and engagement over pure cost-cutting automation.\n\
             Weaknesses include occasionally overanalyzing and delayed decisions.\n\
             Provide clear, actionable, and creative marketing campaign concepts.",
            0.45,
            "Here is a marketing campaign idea. It may not be your specialty, \
             but please refine and enhance it: {reply}",
        )
    }

    /// Built-in personas handed out by the offline provider, in rotation.
    pub fn offline_variant(n: usize) -> Self {
        const VERTICALS: [(&str, &str); 5] = [
            ("healthcare_innovator", "Healthcare and MedTech"),
            ("logistics_optimizer", "Logistics and Supply Chain"),
            ("edtech_visionary", "Education and Learning"),
            ("gaming_producer", "Gaming and Entertainment"),
            ("agritech_builder", "Agriculture and Food"),
        ];
        let (agent_type, sector) = VERTICALS[n % VERTICALS.len()];
        let agent_type = if n < VERTICALS.len() {
            agent_type.to_string()
        } else {
            format!("{}_{}", agent_type, n / VERTICALS.len() + 1)
        };

        Self {
            agent_type,
            description: format!("Entrepreneur focused on {}", sector),
            system_message: format!(
                "You are a creative entrepreneur. Your interests lie in {}.\n\
                 You enjoy bold ideas that use AI to change how people work.\n\
                 Respond with one concrete business idea at a time.",
                sector
            ),
            bounce_probability: Some(0.5),
            bounce_prompt: None,
            contract: ContractItem::REQUIRED.to_vec(),
        }
    }

    /// Parse generated text, tolerating a surrounding markdown code fence.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(strip_code_fence(text))
    }

    /// Required contract items this definition does not declare.
    pub fn missing_contract(&self) -> Vec<ContractItem> {
        ContractItem::REQUIRED
            .into_iter()
            .filter(|item| !self.contract.contains(item))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Remove a leading ```lang line and trailing ``` if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
