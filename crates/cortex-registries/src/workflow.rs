use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use cortex_types::{MessageEnvelope, ReferenceCode, WorkflowRecord, WorkflowStatus};
use tokio::sync::{Mutex, RwLock};

use crate::RegistryError;

struct WorkflowEntry {
    record: WorkflowRecord,
    results: HashMap<ReferenceCode, MessageEnvelope>,
}

/// C9: correlates sub-task replies to a parent workflow. The "is this the
/// final sub-task" decision and "store this result" are made atomic by
/// locking the whole entry (record + results) under one `Mutex`, so two
/// concurrent replies can never both observe "incomplete" (spec.md §9,
/// "Workflow aggregation race").
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    entries: Arc<RwLock<HashMap<ReferenceCode, Arc<Mutex<WorkflowEntry>>>>>,
    subtask_index: Arc<RwLock<HashMap<ReferenceCode, ReferenceCode>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, record: WorkflowRecord) {
        let parent = record.reference_code;
        let subtasks = record.subtask_reference_codes.clone();

        self.entries.write().await.insert(
            parent,
            Arc::new(Mutex::new(WorkflowEntry {
                record,
                results: HashMap::new(),
            })),
        );

        let mut index = self.subtask_index.write().await;
        for subtask in subtasks {
            index.insert(subtask, parent);
        }
    }

    pub async fn find_by_subtask(&self, subtask: ReferenceCode) -> Option<WorkflowRecord> {
        let parent = *self.subtask_index.read().await.get(&subtask)?;
        self.get(parent).await.ok()
    }

    pub async fn get(&self, parent: ReferenceCode) -> Result<WorkflowRecord, RegistryError> {
        let entry = self
            .entries
            .read()
            .await
            .get(&parent)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(parent.to_string()))?;
        Ok(entry.lock().await.record.clone())
    }

    /// Returns whether this call is the one that first moved the workflow
    /// into a terminal status, so a caller driving a terminal transition
    /// (e.g. the first of several failing sub-task replies) can tell
    /// whether it's the one responsible for assembling the final reply.
    pub async fn update_status(
        &self,
        parent: ReferenceCode,
        status: WorkflowStatus,
    ) -> Result<bool, RegistryError> {
        let entry = self
            .entries
            .read()
            .await
            .get(&parent)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(parent.to_string()))?;
        let mut guard = entry.lock().await;
        let was_terminal = matches!(guard.record.status, WorkflowStatus::Completed | WorkflowStatus::Failed);
        guard.record.status = status;
        if matches!(status, WorkflowStatus::Completed | WorkflowStatus::Failed) {
            guard.record.completed_at = Some(Utc::now());
        }
        Ok(!was_terminal)
    }

    /// Stores one sub-task's reply and atomically reports whether this
    /// call was the one that completed the workflow. The caller uses the
    /// returned bool to decide whether to assemble the final reply,
    /// guaranteeing at-most-once assembly.
    pub async fn store_subtask_result(
        &self,
        parent: ReferenceCode,
        subtask: ReferenceCode,
        envelope: MessageEnvelope,
    ) -> Result<bool, RegistryError> {
        let entry = self
            .entries
            .read()
            .await
            .get(&parent)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(parent.to_string()))?;
        let mut guard = entry.lock().await;
        guard.results.insert(subtask, envelope);
        let complete = guard.results.len() == guard.record.subtask_reference_codes.len();
        Ok(complete)
    }

    pub async fn all_subtasks_complete(&self, parent: ReferenceCode) -> bool {
        let Some(entry) = self.entries.read().await.get(&parent).cloned() else {
            return false;
        };
        let guard = entry.lock().await;
        guard.results.len() == guard.record.subtask_reference_codes.len()
    }

    /// Snapshot ordered to match `SubtaskReferenceCodes` (spec.md §4.9).
    pub async fn get_completed_results(
        &self,
        parent: ReferenceCode,
    ) -> Result<Vec<MessageEnvelope>, RegistryError> {
        let entry = self
            .entries
            .read()
            .await
            .get(&parent)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(parent.to_string()))?;
        let guard = entry.lock().await;
        Ok(guard
            .record
            .subtask_reference_codes
            .iter()
            .filter_map(|code| guard.results.get(code).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_types::envelope::{EnvelopeContext, Priority};
    use cortex_types::Message;
    use uuid::Uuid;

    fn envelope(code: ReferenceCode) -> MessageEnvelope {
        MessageEnvelope {
            message: Message::TaskReply {
                message_id: Uuid::new_v4(),
                correlation_id: None,
                timestamp: Utc::now(),
                capability: "research".into(),
                content: "done".into(),
            },
            reference_code: code,
            authority_claims: vec![],
            context: EnvelopeContext::default(),
            priority: Priority::Normal,
            sla: None,
        }
    }

    fn parent_record(parent: ReferenceCode, subtasks: Vec<ReferenceCode>) -> WorkflowRecord {
        WorkflowRecord {
            reference_code: parent,
            original_envelope: envelope(parent),
            subtask_reference_codes: subtasks,
            summary: "quarterly report".into(),
            status: WorkflowStatus::InProgress,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn completes_exactly_once_on_the_final_subtask() {
        let registry = WorkflowRegistry::new();
        let parent: ReferenceCode = "CTX-2026-0305-001".parse().unwrap();
        let a: ReferenceCode = "CTX-2026-0305-002".parse().unwrap();
        let b: ReferenceCode = "CTX-2026-0305-003".parse().unwrap();
        registry.create(parent_record(parent, vec![a, b])).await;

        assert!(!registry
            .store_subtask_result(parent, a, envelope(a))
            .await
            .unwrap());
        assert!(registry
            .store_subtask_result(parent, b, envelope(b))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn find_by_subtask_resolves_to_parent() {
        let registry = WorkflowRegistry::new();
        let parent: ReferenceCode = "CTX-2026-0305-001".parse().unwrap();
        let a: ReferenceCode = "CTX-2026-0305-002".parse().unwrap();
        registry.create(parent_record(parent, vec![a])).await;
        let found = registry.find_by_subtask(a).await.unwrap();
        assert_eq!(found.reference_code, parent);
    }

    #[tokio::test]
    async fn completed_results_preserve_subtask_order() {
        let registry = WorkflowRegistry::new();
        let parent: ReferenceCode = "CTX-2026-0305-001".parse().unwrap();
        let a: ReferenceCode = "CTX-2026-0305-002".parse().unwrap();
        let b: ReferenceCode = "CTX-2026-0305-003".parse().unwrap();
        registry.create(parent_record(parent, vec![a, b])).await;
        registry.store_subtask_result(parent, b, envelope(b)).await.unwrap();
        registry.store_subtask_result(parent, a, envelope(a)).await.unwrap();
        let results = registry.get_completed_results(parent).await.unwrap();
        assert_eq!(results[0].reference_code, a);
        assert_eq!(results[1].reference_code, b);
    }
}
