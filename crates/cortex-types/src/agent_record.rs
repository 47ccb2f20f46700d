use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentAvailability {
    Available,
    Unavailable,
}

/// The registry-level record for an agent (spec.md §3.3): stable identity,
/// ordered capabilities, and a mutable availability flag. The queue name
/// is always derived, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub agent_id: String,
    pub capabilities: Vec<String>,
    pub availability: AgentAvailability,
}

impl AgentRecord {
    pub fn queue_name(&self) -> String {
        queue_name_for(&self.agent_id)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

pub fn queue_name_for(agent_id: &str) -> String {
    format!("agent.{agent_id}")
}
