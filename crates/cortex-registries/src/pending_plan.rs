use std::collections::HashMap;
use std::sync::Arc;

use cortex_types::{PendingPlan, ReferenceCode};
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct PendingPlanRegistry {
    inner: Arc<RwLock<HashMap<ReferenceCode, PendingPlan>>>,
}

impl PendingPlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(&self, plan: PendingPlan) {
        self.inner
            .write()
            .await
            .insert(plan.pending_reference_code, plan);
    }

    pub async fn get(&self, code: ReferenceCode) -> Option<PendingPlan> {
        self.inner.read().await.get(&code).cloned()
    }

    /// Idempotent: removing a plan that is already gone is not an error
    /// (spec.md §5, "remove-on-resume is idempotent").
    pub async fn remove(&self, code: ReferenceCode) -> Option<PendingPlan> {
        self.inner.write().await.remove(&code)
    }
}
