use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Totally ordered by permissiveness: `AskMeFirst < DoItAndShowMe < JustDoIt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorityTier {
    AskMeFirst,
    DoItAndShowMe,
    JustDoIt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityClaim {
    pub granted_by: String,
    pub granted_to: String,
    pub tier: AuthorityTier,
    pub permitted_actions: Vec<String>,
    pub granted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthorityClaim {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Pure function keeping the outbound-narrowing invariant (spec.md §9)
/// locally testable: no outbound claim may carry a tier higher than the
/// highest valid (non-expired) inbound tier, further capped by `requested`.
pub fn narrow(
    inbound: &[AuthorityClaim],
    now: DateTime<Utc>,
    requested: AuthorityTier,
) -> Vec<AuthorityClaim> {
    let max_inbound = inbound
        .iter()
        .filter(|c| !c.is_expired(now))
        .map(|c| c.tier)
        .max();

    let Some(max_inbound) = max_inbound else {
        return Vec::new();
    };

    let ceiling = requested.min(max_inbound);

    inbound
        .iter()
        .filter(|c| !c.is_expired(now))
        .map(|c| {
            let mut narrowed = c.clone();
            narrowed.tier = c.tier.min(ceiling);
            narrowed
        })
        .collect()
}

/// Highest tier across a set of claims, ignoring expiry (used for pipeline
/// gating decisions, which look at what was claimed, not what's still live).
pub fn max_tier(claims: &[AuthorityClaim]) -> Option<AuthorityTier> {
    claims.iter().map(|c| c.tier).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(tier: AuthorityTier) -> AuthorityClaim {
        AuthorityClaim {
            granted_by: "founder".into(),
            granted_to: "agent.cos".into(),
            tier,
            permitted_actions: vec!["route".into()],
            granted_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn tier_ordering() {
        assert!(AuthorityTier::AskMeFirst < AuthorityTier::DoItAndShowMe);
        assert!(AuthorityTier::DoItAndShowMe < AuthorityTier::JustDoIt);
    }

    #[test]
    fn narrow_never_exceeds_inbound_max() {
        let inbound = vec![claim(AuthorityTier::DoItAndShowMe)];
        let out = narrow(&inbound, Utc::now(), AuthorityTier::JustDoIt);
        assert_eq!(out[0].tier, AuthorityTier::DoItAndShowMe);
    }

    #[test]
    fn narrow_respects_requested_cap() {
        let inbound = vec![claim(AuthorityTier::JustDoIt)];
        let out = narrow(&inbound, Utc::now(), AuthorityTier::AskMeFirst);
        assert_eq!(out[0].tier, AuthorityTier::AskMeFirst);
    }

    #[test]
    fn expired_claims_are_excluded() {
        let mut c = claim(AuthorityTier::JustDoIt);
        c.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let out = narrow(&[c], Utc::now(), AuthorityTier::JustDoIt);
        assert!(out.is_empty());
    }
}
