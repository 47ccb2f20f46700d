pub mod agent_record;
pub mod authority;
pub mod context;
pub mod delegation;
pub mod envelope;
pub mod message;
pub mod refcode;
pub mod skill;
pub mod workflow;

pub use agent_record::{AgentAvailability, AgentRecord};
pub use authority::{AuthorityClaim, AuthorityTier};
pub use context::{Category, ContextEntry};
pub use delegation::{DelegationRecord, DelegationStatus};
pub use envelope::{EnvelopeContext, MessageEnvelope, Priority};
pub use message::{DecompositionResult, Message, TaskSpec};
pub use refcode::{ReferenceCode, ReferenceCodeError, SequenceState};
pub use skill::Skill;
pub use workflow::{PendingPlan, WorkflowRecord, WorkflowStatus};
