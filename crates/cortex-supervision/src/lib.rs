//! The supervision service (C8): a periodic sweep over overdue
//! delegations, publishing `SupervisionAlert`/`EscalationAlert` onto the
//! bus for the Chief of Staff to act on. Grounded on
//! `tandem-channels::discord`'s `tokio::time::interval` heartbeat loop.

mod config;
mod service;

pub use config::SupervisionConfig;
pub use service::SupervisionService;
