use std::collections::HashMap;
use std::sync::Arc;

use cortex_types::Skill;
use tokio::sync::RwLock;

use crate::RegistryError;

#[derive(Clone, Default)]
pub struct SkillRegistry {
    inner: Arc<RwLock<HashMap<String, Skill>>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, skill: Skill) {
        self.inner.write().await.insert(skill.id.clone(), skill);
    }

    pub async fn get(&self, skill_id: &str) -> Result<Skill, RegistryError> {
        self.inner
            .read()
            .await
            .get(skill_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(skill_id.to_string()))
    }

    pub async fn list_by_category(&self, category: &str) -> Vec<Skill> {
        self.inner
            .read()
            .await
            .values()
            .filter(|s| s.category.as_deref() == Some(category))
            .cloned()
            .collect()
    }
}
