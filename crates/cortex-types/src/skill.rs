use serde::{Deserialize, Serialize};

/// `(skillId, executorType)` (spec.md §4.4), registered in the Skill
/// registry (§4.3) and resolved by the pipeline runner (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub executor_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}
