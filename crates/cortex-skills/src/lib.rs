//! The skill pipeline runner (C4): executes an ordered list of named
//! skills over a shared parameter context. Grounded on
//! `tandem-core::hooks::HookRegistry`'s priority-dispatch pattern and
//! `tandem-tools::ToolRegistry`'s by-name-with-type-match dispatch.

mod params;

pub use params::PipelineParams;

use std::sync::Arc;

use async_trait::async_trait;
use cortex_types::Skill;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkillError {
    #[error("no executor registered for type '{0}'")]
    UnresolvedExecutorType(String),
    #[error("empty pipeline")]
    EmptyPipeline,
    #[error("skill '{0}' failed: {1}")]
    ExecutionFailed(String, String),
}

#[async_trait]
pub trait SkillExecutor: Send + Sync {
    fn executor_type(&self) -> &str;
    async fn execute(&self, skill: &Skill, params: &mut PipelineParams) -> Result<Value, SkillError>;
}

/// Executes an ordered list of skill ids end to end. The first registered
/// executor whose `executor_type` matches the skill's is used, matching
/// `ToolRegistry::execute`'s first-found-or-error idiom; an unresolved
/// type fails the whole pipeline (spec.md §4.4).
#[derive(Default)]
pub struct PipelineRunner {
    executors: Vec<Arc<dyn SkillExecutor>>,
}

impl PipelineRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn SkillExecutor>) {
        self.executors.push(executor);
    }

    fn resolve(&self, executor_type: &str) -> Option<&Arc<dyn SkillExecutor>> {
        self.executors
            .iter()
            .find(|e| e.executor_type() == executor_type)
    }

    /// Runs `skills` in order, depositing each skill's result under its
    /// skill id into `params` so later skills can consume prior output.
    pub async fn run(
        &self,
        skills: &[Skill],
        mut params: PipelineParams,
    ) -> Result<PipelineParams, SkillError> {
        if skills.is_empty() {
            return Err(SkillError::EmptyPipeline);
        }

        for skill in skills {
            let executor = self
                .resolve(&skill.executor_type)
                .ok_or_else(|| SkillError::UnresolvedExecutorType(skill.executor_type.clone()))?;
            let result = executor.execute(skill, &mut params).await.map_err(|err| {
                tracing::warn!(skill = %skill.id, %err, "skill execution failed");
                err
            })?;
            params.insert(&skill.id, result);
        }

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoExecutor;

    #[async_trait]
    impl SkillExecutor for EchoExecutor {
        fn executor_type(&self) -> &str {
            "echo"
        }

        async fn execute(&self, skill: &Skill, params: &mut PipelineParams) -> Result<Value, SkillError> {
            Ok(Value::String(format!("{}:{}", skill.id, params.get_str("messageContent").unwrap_or_default())))
        }
    }

    fn skill(id: &str) -> Skill {
        Skill {
            id: id.into(),
            executor_type: "echo".into(),
            category: None,
        }
    }

    #[tokio::test]
    async fn runs_skills_in_order_and_deposits_results() {
        let mut runner = PipelineRunner::new();
        runner.register(Arc::new(EchoExecutor));
        let mut params = PipelineParams::new();
        params.set_str("messageContent", "hello");

        let result = runner
            .run(&[skill("triage"), skill("decompose")], params)
            .await
            .unwrap();

        assert_eq!(result.get("triage").unwrap(), &Value::String("triage:hello".into()));
        assert_eq!(result.get("decompose").unwrap(), &Value::String("decompose:hello".into()));
    }

    #[tokio::test]
    async fn empty_pipeline_fails() {
        let runner = PipelineRunner::new();
        assert!(matches!(
            runner.run(&[], PipelineParams::new()).await,
            Err(SkillError::EmptyPipeline)
        ));
    }

    #[tokio::test]
    async fn unresolved_executor_type_fails_the_pipeline() {
        let runner = PipelineRunner::new();
        let err = runner.run(&[skill("triage")], PipelineParams::new()).await;
        assert!(matches!(err, Err(SkillError::UnresolvedExecutorType(_))));
    }
}
