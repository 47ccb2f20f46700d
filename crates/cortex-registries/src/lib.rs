//! The registries (C3): process-local, thread-safe, keyed stores for
//! agents, skills, delegations, workflows, authority grants, pending plans,
//! retry counters, and context entries. Grounded on
//! `tandem-core::agents::AgentRegistry`'s `Arc<RwLock<HashMap<...>>>` shape.

mod agent;
mod authority;
mod context;
mod delegation;
mod error;
mod pending_plan;
mod retry;
mod skill;
mod workflow;

pub use agent::AgentRegistry;
pub use authority::AuthorityRegistry;
pub use context::{ContextQuery, ContextRegistry, ContextStore, FileContextStore, InMemoryContextStore};
pub use delegation::DelegationRegistry;
pub use error::RegistryError;
pub use pending_plan::PendingPlanRegistry;
pub use retry::RetryCounterRegistry;
pub use skill::SkillRegistry;
pub use workflow::WorkflowRegistry;
