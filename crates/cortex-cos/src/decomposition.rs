use async_trait::async_trait;
use cortex_skills::{PipelineParams, SkillExecutor, SkillError};
use cortex_types::{DecompositionResult, Skill, TaskSpec};
use serde_json::Value;

/// The pluggable triage/decomposition step (spec.md §6.5: the concrete LLM
/// backend is an external collaborator, consumed here only by its method
/// shape — one-shot, stateless).
#[async_trait]
pub trait DecompositionProvider: Send + Sync {
    async fn decompose(
        &self,
        goal: &str,
        available_capabilities: &[String],
        business_context: Option<&str>,
    ) -> Result<DecompositionResult, String>;
}

/// Adapts a [`DecompositionProvider`] into the skill pipeline (§4.4):
/// reads `messageContent`/`availableCapabilities`/`businessContext` out of
/// the shared parameter map and deposits the resulting
/// [`DecompositionResult`] back in as JSON, matching
/// `PipelineRunner::run`'s "prior skill's result under its skill id"
/// contract.
pub struct DecompositionExecutor {
    provider: std::sync::Arc<dyn DecompositionProvider>,
}

impl DecompositionExecutor {
    pub fn new(provider: std::sync::Arc<dyn DecompositionProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl SkillExecutor for DecompositionExecutor {
    fn executor_type(&self) -> &str {
        "decomposition"
    }

    async fn execute(&self, _skill: &Skill, params: &mut PipelineParams) -> Result<Value, SkillError> {
        let goal = params.get_str("messageContent").unwrap_or_default();
        let capabilities = params.get_str_vec("availableCapabilities");
        let business_context = params.get_str("businessContext");

        let result = self
            .provider
            .decompose(&goal, &capabilities, business_context.as_deref())
            .await
            .map_err(|e| SkillError::ExecutionFailed("decomposition".to_string(), e))?;

        serde_json::to_value(&result)
            .map_err(|e| SkillError::ExecutionFailed("decomposition".to_string(), e.to_string()))
    }
}

/// A minimal provider used where no smarter backend is wired in: treats the
/// whole goal as one task for the first declared capability. Useful as the
/// default for tests and for a from-scratch `engine` run; real deployments
/// inject a provider backed by an LLM client.
pub struct NaiveDecompositionProvider;

#[async_trait]
impl DecompositionProvider for NaiveDecompositionProvider {
    async fn decompose(
        &self,
        goal: &str,
        available_capabilities: &[String],
        _business_context: Option<&str>,
    ) -> Result<DecompositionResult, String> {
        let capability = available_capabilities
            .first()
            .cloned()
            .unwrap_or_else(|| "general".to_string());
        Ok(DecompositionResult {
            tasks: vec![TaskSpec {
                capability,
                description: goal.to_string(),
                requested_tier: None,
            }],
            summary: goal.to_string(),
            confidence: 1.0,
        })
    }
}
