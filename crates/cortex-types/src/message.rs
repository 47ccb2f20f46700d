use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authority::AuthorityTier;
use crate::refcode::ReferenceCode;

/// One decomposed sub-task proposed by the triage/decomposition skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub capability: String,
    pub description: String,
    /// Further caps the dispatched envelope's authority tier (§4.7.2,
    /// "task's requested tier further caps").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_tier: Option<AuthorityTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompositionResult {
    pub tasks: Vec<TaskSpec>,
    pub summary: String,
    pub confidence: f64,
}

/// The concrete payload carried by a [`crate::envelope::MessageEnvelope`].
///
/// Tagged at the transport boundary by `type` (§6.1's `cortex-message-type`
/// header mirrors this tag). `Unknown` is never constructed by application
/// code — it is the landing arm for an unrecognised tag on decode, and a
/// permanent deserialisation failure at the bus (§4.2, §7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    TaskRequest {
        message_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
        content: String,
    },
    TaskReply {
        message_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
        capability: String,
        content: String,
    },
    PlanProposal {
        message_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
        tasks: Vec<TaskSpec>,
        summary: String,
        original_goal: String,
        pending_reference_code: ReferenceCode,
    },
    PlanApprovalResponse {
        message_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
        approved: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amendments: Option<String>,
        reference_code: ReferenceCode,
    },
    SupervisionAlert {
        message_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
        ref_code: ReferenceCode,
        delegated_agent_id: String,
        retry_count: u32,
        due_at: chrono::DateTime<chrono::Utc>,
        description: String,
        is_agent_running: bool,
    },
    EscalationAlert {
        message_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
        ref_code: ReferenceCode,
        delegated_agent_id: String,
        retry_count: u32,
        reason: String,
        original_description: String,
    },
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn message_id(&self) -> Option<Uuid> {
        match self {
            Message::TaskRequest { message_id, .. }
            | Message::TaskReply { message_id, .. }
            | Message::PlanProposal { message_id, .. }
            | Message::PlanApprovalResponse { message_id, .. }
            | Message::SupervisionAlert { message_id, .. }
            | Message::EscalationAlert { message_id, .. } => Some(*message_id),
            Message::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Message::Unknown)
    }
}
