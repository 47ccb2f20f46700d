use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authority::AuthorityClaim;
use crate::message::Message;
use crate::refcode::ReferenceCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_agent_id: Option<String>,
}

/// Immutable record carried over the bus. Handler code observes but never
/// mutates an envelope in place (§3.10) — derive helpers below build new
/// envelopes instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub message: Message,
    pub reference_code: ReferenceCode,
    #[serde(default)]
    pub authority_claims: Vec<AuthorityClaim>,
    #[serde(default)]
    pub context: EnvelopeContext,
    #[serde(default)]
    pub priority: Priority,
    /// Optional duration budget, in seconds (§3.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla: Option<i64>,
}

impl MessageEnvelope {
    pub fn message_id(&self) -> Option<Uuid> {
        self.message.message_id()
    }
}
