//! The Chief-of-Staff skill-driven agent (C7): the core business logic of
//! the orchestration runtime — triage, decomposition, AskMeFirst gating,
//! workflow aggregation, and supervision/escalation handling. Grounded on
//! `tandem-orchestrator/src/reducer.rs`'s reducer-style dispatch and
//! `src-tauri/src/orchestrator/types.rs`'s run/task data shapes.

mod chief_of_staff;
mod config;
mod decomposition;
mod error;
mod persona;

pub use chief_of_staff::ChiefOfStaff;
pub use config::CosConfig;
pub use decomposition::{DecompositionExecutor, DecompositionProvider, NaiveDecompositionProvider};
pub use error::CosError;
pub use persona::PersonaConfig;
