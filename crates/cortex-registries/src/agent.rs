use std::collections::HashMap;
use std::sync::Arc;

use cortex_types::{AgentAvailability, AgentRecord};
use tokio::sync::RwLock;

use crate::RegistryError;

/// `AgentId -> AgentRecord` (spec.md §4.3). Grounded on
/// `tandem-core::agents::AgentRegistry`'s `Arc<RwLock<HashMap<...>>>` shape.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    inner: Arc<RwLock<HashMap<String, AgentRecord>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, record: AgentRecord) {
        self.inner.write().await.insert(record.agent_id.clone(), record);
    }

    pub async fn unregister(&self, agent_id: &str) {
        self.inner.write().await.remove(agent_id);
    }

    pub async fn find_by_id(&self, agent_id: &str) -> Option<AgentRecord> {
        self.inner.read().await.get(agent_id).cloned()
    }

    pub async fn all(&self) -> Vec<AgentRecord> {
        self.inner.read().await.values().cloned().collect()
    }

    /// First available agent declaring `capability`, matching the 1:1
    /// fast-path's "first available in registry" resolution rule (§4.7.2).
    pub async fn find_by_capability(&self, capability: &str) -> Vec<AgentRecord> {
        self.inner
            .read()
            .await
            .values()
            .filter(|a| a.has_capability(capability))
            .cloned()
            .collect()
    }

    pub async fn resolve_available(&self, capability: &str) -> Option<AgentRecord> {
        self.inner
            .read()
            .await
            .values()
            .find(|a| a.has_capability(capability) && a.availability == AgentAvailability::Available)
            .cloned()
    }

    /// Same as [`Self::resolve_available`] but skips `exclude_agent_id` —
    /// used by the supervision re-dispatch path (§4.7.5) so an agent just
    /// flagged as unresponsive is never handed the same work again.
    pub async fn resolve_available_excluding(
        &self,
        capability: &str,
        exclude_agent_id: &str,
    ) -> Option<AgentRecord> {
        self.inner
            .read()
            .await
            .values()
            .find(|a| {
                a.has_capability(capability)
                    && a.availability == AgentAvailability::Available
                    && a.agent_id != exclude_agent_id
            })
            .cloned()
    }

    pub async fn set_availability(
        &self,
        agent_id: &str,
        availability: AgentAvailability,
    ) -> Result<(), RegistryError> {
        let mut guard = self.inner.write().await;
        let record = guard
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.to_string()))?;
        record.availability = availability;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, caps: &[&str]) -> AgentRecord {
        AgentRecord {
            agent_id: id.into(),
            capabilities: caps.iter().map(|s| s.to_string()).collect(),
            availability: AgentAvailability::Available,
        }
    }

    #[tokio::test]
    async fn resolves_first_available_by_capability() {
        let registry = AgentRegistry::new();
        registry.register(agent("translator", &["translation"])).await;
        let found = registry.resolve_available("translation").await;
        assert_eq!(found.unwrap().agent_id, "translator");
    }

    #[tokio::test]
    async fn unavailable_agent_is_not_resolved() {
        let registry = AgentRegistry::new();
        registry.register(agent("translator", &["translation"])).await;
        registry
            .set_availability("translator", AgentAvailability::Unavailable)
            .await
            .unwrap();
        assert!(registry.resolve_available("translation").await.is_none());
    }

    #[tokio::test]
    async fn resolve_available_excluding_skips_the_named_agent() {
        let registry = AgentRegistry::new();
        registry.register(agent("translator-a", &["translation"])).await;
        registry.register(agent("translator-b", &["translation"])).await;

        let found = registry
            .resolve_available_excluding("translation", "translator-a")
            .await;
        assert_eq!(found.unwrap().agent_id, "translator-b");
    }

    #[tokio::test]
    async fn resolve_available_excluding_returns_none_with_no_alternate() {
        let registry = AgentRegistry::new();
        registry.register(agent("translator-a", &["translation"])).await;
        assert!(
            registry
                .resolve_available_excluding("translation", "translator-a")
                .await
                .is_none()
        );
    }
}
