use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::refcode::ReferenceCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    CustomerNote,
    MeetingNote,
    Decision,
    Lesson,
    Preference,
    Strategic,
    Operational,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::CustomerNote => "CustomerNote",
            Category::MeetingNote => "MeetingNote",
            Category::Decision => "Decision",
            Category::Lesson => "Lesson",
            Category::Preference => "Preference",
            Category::Strategic => "Strategic",
            Category::Operational => "Operational",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    pub entry_id: String,
    pub content: String,
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_code: Option<ReferenceCode>,
    pub created_at: DateTime<Utc>,
}
