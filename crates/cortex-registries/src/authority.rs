use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use cortex_types::{AuthorityClaim, AuthorityTier};
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct AuthorityRegistry {
    inner: Arc<RwLock<HashMap<(String, String), Vec<AuthorityClaim>>>>,
}

impl AuthorityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(agent_id: &str, action: &str) -> (String, String) {
        (agent_id.to_string(), action.to_string())
    }

    pub async fn grant(&self, action: &str, claim: AuthorityClaim) {
        let key = Self::key(&claim.granted_to, action);
        self.inner.write().await.entry(key).or_default().push(claim);
    }

    pub async fn revoke(&self, agent_id: &str, action: &str) {
        self.inner.write().await.remove(&Self::key(agent_id, action));
    }

    pub async fn get_claim(&self, agent_id: &str, action: &str) -> Option<AuthorityClaim> {
        self.inner
            .read()
            .await
            .get(&Self::key(agent_id, action))
            .and_then(|claims| claims.last().cloned())
    }

    /// `hasAuthority(agentId, action, minTier)` (spec.md §4.3): true iff a
    /// non-expired claim exists with matching agent and action and
    /// `Tier >= minTier`.
    pub async fn has_authority(
        &self,
        agent_id: &str,
        action: &str,
        min_tier: AuthorityTier,
    ) -> bool {
        let now = Utc::now();
        self.inner
            .read()
            .await
            .get(&Self::key(agent_id, action))
            .map(|claims| {
                claims.iter().any(|c| {
                    !c.is_expired(now)
                        && c.granted_to == agent_id
                        && c.permitted_actions.iter().any(|a| a == action)
                        && c.tier >= min_tier
                })
            })
            .unwrap_or(false)
    }
}
