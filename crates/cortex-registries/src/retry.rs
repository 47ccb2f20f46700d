use std::collections::HashMap;
use std::sync::Arc;

use cortex_types::ReferenceCode;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct RetryCounterRegistry {
    inner: Arc<RwLock<HashMap<ReferenceCode, u32>>>,
}

impl RetryCounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn increment(&self, code: ReferenceCode) -> u32 {
        let mut guard = self.inner.write().await;
        let entry = guard.entry(code).or_insert(0);
        *entry += 1;
        *entry
    }

    pub async fn get(&self, code: ReferenceCode) -> u32 {
        self.inner.read().await.get(&code).copied().unwrap_or(0)
    }

    pub async fn reset(&self, code: ReferenceCode) {
        self.inner.write().await.remove(&code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn n_increments_then_get_yields_n() {
        let registry = RetryCounterRegistry::new();
        let code: ReferenceCode = "CTX-2026-0305-001".parse().unwrap();
        for _ in 0..5 {
            registry.increment(code).await;
        }
        assert_eq!(registry.get(code).await, 5);
    }
}
