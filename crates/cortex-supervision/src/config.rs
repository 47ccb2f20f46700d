use std::time::Duration;

/// Tuning knobs for the overdue sweep (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct SupervisionConfig {
    pub tick_interval: Duration,
    pub max_retries: u32,
    /// Agent id the sweep consults for `SupervisionAlert` delivery — the
    /// Chief of Staff, addressed by its registry-derived queue name.
    pub cos_agent_id: String,
    pub escalation_target: String,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            max_retries: 3,
            cos_agent_id: "cos".to_string(),
            escalation_target: "agent.founder".to_string(),
        }
    }
}
