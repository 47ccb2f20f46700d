use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::MessageEnvelope;
use crate::message::DecompositionResult;
use crate::refcode::ReferenceCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    pub reference_code: ReferenceCode,
    pub original_envelope: MessageEnvelope,
    pub subtask_reference_codes: Vec<ReferenceCode>,
    pub summary: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPlan {
    pub pending_reference_code: ReferenceCode,
    pub original_envelope: MessageEnvelope,
    pub decomposition_result: DecompositionResult,
    pub stored_at: DateTime<Utc>,
}
