use cortex_types::Skill;

/// Configures one Chief-of-Staff instance (spec.md §4.7): identity,
/// declared capabilities, the skill pipeline run per inbound message, and
/// where gated plans and escalations go.
#[derive(Debug, Clone)]
pub struct PersonaConfig {
    pub agent_id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub pipeline: Vec<Skill>,
    pub escalation_target: String,
    #[allow(dead_code)]
    pub model_tier: Option<String>,
}
