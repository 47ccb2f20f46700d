use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::refcode::ReferenceCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DelegationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Escalated,
}

impl DelegationStatus {
    /// `Pending → InProgress → (Completed | Failed | Escalated)`; no
    /// transition goes backward (spec.md §5).
    pub fn can_transition_to(self, next: DelegationStatus) -> bool {
        use DelegationStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Escalated)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Escalated)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationRecord {
    pub reference_code: ReferenceCode,
    pub delegated_by: String,
    pub delegated_to: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    pub status: DelegationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_only_move_forward() {
        assert!(DelegationStatus::Pending.can_transition_to(DelegationStatus::InProgress));
        assert!(DelegationStatus::InProgress.can_transition_to(DelegationStatus::Completed));
        assert!(!DelegationStatus::Completed.can_transition_to(DelegationStatus::Pending));
        assert!(!DelegationStatus::Failed.can_transition_to(DelegationStatus::InProgress));
    }
}
