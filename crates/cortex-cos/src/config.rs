use cortex_registries::{AuthorityRegistry, ContextRegistry};

/// Dependency-injected configuration for a Chief-of-Staff instance
/// (spec.md §9, "optional dependency injection of providers"). Absent
/// providers are observed by capability checks at call sites, not by
/// null-pointer semantics.
#[derive(Clone)]
pub struct CosConfig {
    pub confidence_threshold: f64,
    pub max_retries: u32,
    pub context_registry: Option<ContextRegistry>,
    pub authority_registry: Option<AuthorityRegistry>,
}

impl Default for CosConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_retries: 3,
            context_registry: None,
            authority_registry: None,
        }
    }
}
