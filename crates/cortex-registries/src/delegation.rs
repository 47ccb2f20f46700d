use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use cortex_types::{DelegationRecord, DelegationStatus, ReferenceCode};
use tokio::sync::RwLock;

use crate::RegistryError;

#[derive(Clone, Default)]
pub struct DelegationRegistry {
    inner: Arc<RwLock<HashMap<ReferenceCode, DelegationRecord>>>,
}

impl DelegationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn delegate(&self, record: DelegationRecord) {
        self.inner
            .write()
            .await
            .insert(record.reference_code, record);
    }

    pub async fn get(&self, code: ReferenceCode) -> Result<DelegationRecord, RegistryError> {
        self.inner
            .read()
            .await
            .get(&code)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(code.to_string()))
    }

    /// Enforces the forward-only status machine (spec.md §5).
    pub async fn update_status(
        &self,
        code: ReferenceCode,
        status: DelegationStatus,
    ) -> Result<(), RegistryError> {
        let mut guard = self.inner.write().await;
        let record = guard
            .get_mut(&code)
            .ok_or_else(|| RegistryError::NotFound(code.to_string()))?;
        if !record.status.can_transition_to(status) {
            return Err(RegistryError::InvalidTransition {
                from: format!("{:?}", record.status),
                to: format!("{:?}", status),
            });
        }
        record.status = status;
        Ok(())
    }

    pub async fn find_by_assignee(&self, agent_id: &str) -> Vec<DelegationRecord> {
        self.inner
            .read()
            .await
            .values()
            .filter(|d| d.delegated_to == agent_id)
            .cloned()
            .collect()
    }

    /// `DueAt < now AND status ∈ {Pending, InProgress}` (spec.md §4.8).
    pub async fn find_overdue(&self) -> Vec<DelegationRecord> {
        let now = Utc::now();
        self.inner
            .read()
            .await
            .values()
            .filter(|d| {
                matches!(d.status, DelegationStatus::Pending | DelegationStatus::InProgress)
                    && d.due_at.is_some_and(|due| due < now)
            })
            .cloned()
            .collect()
    }
}
