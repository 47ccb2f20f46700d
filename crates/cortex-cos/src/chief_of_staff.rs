use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use cortex_agent::{Agent, AgentError};
use cortex_bus::MessageBus;
use cortex_refcode::ReferenceCodeGenerator;
use cortex_registries::{AgentRegistry, DelegationRegistry, PendingPlanRegistry, RetryCounterRegistry, WorkflowRegistry};
use cortex_skills::{PipelineParams, PipelineRunner};
use cortex_types::agent_record::queue_name_for;
use cortex_types::authority::{max_tier, narrow};
use cortex_types::envelope::EnvelopeContext;
use cortex_types::{
    AuthorityTier, Category, ContextEntry, DecompositionResult, DelegationRecord, DelegationStatus,
    Message, MessageEnvelope, PendingPlan, ReferenceCode, TaskSpec, WorkflowRecord, WorkflowStatus,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::CosConfig;
use crate::error::CosError;
use crate::persona::PersonaConfig;

/// The Chief-of-Staff skill-driven agent (spec.md §4.7): triages new
/// requests, decomposes multi-task goals, gates high-risk plans behind
/// human approval, re-assembles workflow replies, and reacts to
/// supervision/escalation alerts. It always replies by publishing directly
/// through `bus` and returns `Ok(None)` from [`Agent::process`] — there is
/// never a single synchronous reply for the harness to forward.
///
/// Grounded on `tandem-orchestrator/src/reducer.rs`'s
/// `DefaultMissionReducer::reduce` state-machine style and
/// `src-tauri/src/orchestrator/types.rs`'s run/task/budget data shapes.
pub struct ChiefOfStaff {
    persona: PersonaConfig,
    config: CosConfig,
    bus: Arc<dyn MessageBus>,
    refcode_generator: Arc<ReferenceCodeGenerator>,
    agent_registry: AgentRegistry,
    delegation_registry: DelegationRegistry,
    workflow_registry: WorkflowRegistry,
    pending_plan_registry: PendingPlanRegistry,
    retry_registry: RetryCounterRegistry,
    skill_runner: PipelineRunner,
    /// The envelope most recently dispatched for a given reference code,
    /// kept so a supervision retry can re-publish the exact same payload
    /// (§4.7.5). Not part of the shared data model (§3) — an
    /// implementation-level bookkeeping map local to this agent.
    dispatched_envelopes: RwLock<HashMap<ReferenceCode, MessageEnvelope>>,
    /// The task (capability + description) a given reference code was
    /// dispatched for, needed to re-resolve a capability during
    /// supervision and to render aggregation headers (§4.7.6), neither of
    /// which `DelegationRecord`/`WorkflowRecord` carry on their own.
    task_specs: RwLock<HashMap<ReferenceCode, TaskSpec>>,
}

impl ChiefOfStaff {
    pub fn new(
        persona: PersonaConfig,
        config: CosConfig,
        bus: Arc<dyn MessageBus>,
        refcode_generator: Arc<ReferenceCodeGenerator>,
        agent_registry: AgentRegistry,
        delegation_registry: DelegationRegistry,
        workflow_registry: WorkflowRegistry,
        pending_plan_registry: PendingPlanRegistry,
        retry_registry: RetryCounterRegistry,
        skill_runner: PipelineRunner,
    ) -> Self {
        Self {
            persona,
            config,
            bus,
            refcode_generator,
            agent_registry,
            delegation_registry,
            workflow_registry,
            pending_plan_registry,
            retry_registry,
            skill_runner,
            dispatched_envelopes: RwLock::new(HashMap::new()),
            task_specs: RwLock::new(HashMap::new()),
        }
    }

    fn queue_name(&self) -> String {
        queue_name_for(&self.persona.agent_id)
    }

    async fn publish(&self, envelope: MessageEnvelope, queue: &str) -> Result<(), CosError> {
        self.bus.publish(envelope, queue).await.map_err(CosError::from)
    }

    /// A target agent must hold a standing grant for the capability at the
    /// requested tier before dispatch, when an authority registry is
    /// configured (spec.md §9). With no registry configured, dispatch
    /// relies solely on the narrowed envelope claims.
    async fn capability_authorized(&self, agent_id: &str, capability: &str, tier: AuthorityTier) -> bool {
        let Some(authority_registry) = &self.config.authority_registry else {
            return true;
        };
        authority_registry.has_authority(agent_id, capability, tier).await
    }

    async fn handle(&self, envelope: MessageEnvelope) -> Result<(), CosError> {
        match &envelope.message {
            Message::SupervisionAlert { .. } | Message::EscalationAlert { .. } => {
                self.handle_supervision_alert(envelope).await
            }
            Message::PlanApprovalResponse { .. } => self.handle_plan_approval(envelope).await,
            _ => {
                if let Some(workflow) = self
                    .workflow_registry
                    .find_by_subtask(envelope.reference_code)
                    .await
                {
                    self.handle_subtask_reply(envelope, workflow).await
                } else {
                    self.handle_new_request(envelope).await
                }
            }
        }
    }

    // ---- §4.7.2 new request ---------------------------------------------

    async fn handle_new_request(&self, envelope: MessageEnvelope) -> Result<(), CosError> {
        let goal = match &envelope.message {
            Message::TaskRequest { content, .. } => content.clone(),
            _ => {
                tracing::warn!(ref_code = %envelope.reference_code, "unrecognised message shape for a new request, dropping");
                return Ok(());
            }
        };

        let available_capabilities: Vec<String> = self
            .agent_registry
            .all()
            .await
            .into_iter()
            .flat_map(|a| a.capabilities)
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();

        let max_inbound_tier = max_tier(&envelope.authority_claims).unwrap_or(AuthorityTier::JustDoIt);

        let mut params = PipelineParams::new();
        params.set_str("messageContent", goal.clone());
        params.set_str_vec("availableCapabilities", &available_capabilities);

        if let Some(context_registry) = &self.config.context_registry {
            let entries = context_registry
                .query(cortex_registries::ContextQuery {
                    keywords: Some(goal.clone()),
                    max_results: Some(5),
                    ..Default::default()
                })
                .await?;
            if !entries.is_empty() {
                let business_context = entries
                    .iter()
                    .map(|e| format!("[{}] {}", e.category, e.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                params.set_str("businessContext", business_context);
            }
        }

        let decomposition = self.run_decomposition(params).await?;

        if decomposition.confidence < self.config.confidence_threshold
            || decomposition.tasks.is_empty()
            || decomposition
                .tasks
                .iter()
                .any(|t| !available_capabilities.iter().any(|c| c == &t.capability))
        {
            return self
                .escalate(
                    &envelope,
                    format!(
                        "low-confidence or unresolvable decomposition (confidence {:.2})",
                        decomposition.confidence
                    ),
                )
                .await;
        }

        if decomposition.tasks.len() == 1 {
            self.dispatch_single_task(&envelope, &decomposition.tasks[0], max_inbound_tier)
                .await
        } else if max_inbound_tier == AuthorityTier::AskMeFirst {
            self.gate_plan(&envelope, decomposition).await
        } else {
            self.dispatch_workflow_children(&envelope, &decomposition, max_inbound_tier)
                .await
        }
    }

    async fn run_decomposition(&self, params: PipelineParams) -> Result<DecompositionResult, CosError> {
        let Some(last_skill) = self.persona.pipeline.last() else {
            return Err(CosError::Skill(cortex_skills::SkillError::EmptyPipeline));
        };
        let result_params = self.skill_runner.run(&self.persona.pipeline, params).await?;
        let raw = result_params
            .get(&last_skill.id)
            .cloned()
            .ok_or_else(|| CosError::Skill(cortex_skills::SkillError::ExecutionFailed(
                last_skill.id.clone(),
                "pipeline produced no terminal result".to_string(),
            )))?;
        serde_json::from_value(raw).map_err(|e| {
            CosError::Skill(cortex_skills::SkillError::ExecutionFailed(
                last_skill.id.clone(),
                e.to_string(),
            ))
        })
    }

    async fn escalate(&self, envelope: &MessageEnvelope, reason: String) -> Result<(), CosError> {
        tracing::warn!(ref_code = %envelope.reference_code, %reason, "escalating");
        self.delegation_registry
            .delegate(DelegationRecord {
                reference_code: envelope.reference_code,
                delegated_by: self.persona.agent_id.clone(),
                delegated_to: self.persona.escalation_target.clone(),
                description: reason,
                due_at: envelope.sla.map(|s| Utc::now() + chrono::Duration::seconds(s)),
                status: DelegationStatus::Pending,
            })
            .await;
        self.publish(envelope.clone(), &self.persona.escalation_target).await
    }

    async fn dispatch_single_task(
        &self,
        envelope: &MessageEnvelope,
        task: &TaskSpec,
        max_inbound_tier: AuthorityTier,
    ) -> Result<(), CosError> {
        let Some(target) = self.agent_registry.resolve_available(&task.capability).await else {
            return self
                .escalate(envelope, format!("no available agent for capability '{}'", task.capability))
                .await;
        };

        let requested = task.requested_tier.unwrap_or(max_inbound_tier);
        if !self.capability_authorized(&target.agent_id, &task.capability, requested).await {
            return self
                .escalate(
                    envelope,
                    format!(
                        "agent '{}' lacks standing authority for capability '{}' at tier {:?}",
                        target.agent_id, task.capability, requested
                    ),
                )
                .await;
        }

        let child_code = self.refcode_generator.generate().await?;
        self.delegation_registry
            .delegate(DelegationRecord {
                reference_code: child_code,
                delegated_by: self.persona.agent_id.clone(),
                delegated_to: target.agent_id.clone(),
                description: task.description.clone(),
                due_at: envelope.sla.map(|s| Utc::now() + chrono::Duration::seconds(s)),
                status: DelegationStatus::Pending,
            })
            .await;

        let outbound = MessageEnvelope {
            message: envelope.message.clone(),
            reference_code: child_code,
            authority_claims: narrow(&envelope.authority_claims, Utc::now(), requested),
            context: EnvelopeContext {
                parent_message_id: envelope.message_id(),
                original_goal: Some(task.description.clone()),
                team_id: envelope.context.team_id.clone(),
                channel_id: envelope.context.channel_id.clone(),
                reply_to: envelope.context.reply_to.clone(),
                from_agent_id: None,
            },
            priority: envelope.priority,
            sla: envelope.sla,
        };

        self.task_specs.write().await.insert(child_code, task.clone());
        self.dispatched_envelopes.write().await.insert(child_code, outbound.clone());
        self.publish(outbound, &target.queue_name()).await
    }

    // ---- §4.7.3 workflow path --------------------------------------------

    async fn dispatch_workflow_children(
        &self,
        envelope: &MessageEnvelope,
        decomposition: &DecompositionResult,
        max_inbound_tier: AuthorityTier,
    ) -> Result<(), CosError> {
        let original_goal = match &envelope.message {
            Message::TaskRequest { content, .. } => content.clone(),
            _ => String::new(),
        };

        let mut resolved = Vec::with_capacity(decomposition.tasks.len());
        for task in &decomposition.tasks {
            let Some(target) = self.agent_registry.resolve_available(&task.capability).await else {
                return self
                    .escalate(envelope, format!("no available agent for capability '{}'", task.capability))
                    .await;
            };
            let requested = task.requested_tier.unwrap_or(max_inbound_tier);
            if !self.capability_authorized(&target.agent_id, &task.capability, requested).await {
                return self
                    .escalate(
                        envelope,
                        format!(
                            "agent '{}' lacks standing authority for capability '{}' at tier {:?}",
                            target.agent_id, task.capability, requested
                        ),
                    )
                    .await;
            }
            resolved.push((task.clone(), target));
        }

        let parent_code = self.refcode_generator.generate().await?;
        let mut child_codes = Vec::with_capacity(resolved.len());

        for (task, target) in &resolved {
            let child_code = self.refcode_generator.generate().await?;
            self.delegation_registry
                .delegate(DelegationRecord {
                    reference_code: child_code,
                    delegated_by: self.persona.agent_id.clone(),
                    delegated_to: target.agent_id.clone(),
                    description: task.description.clone(),
                    due_at: envelope.sla.map(|s| Utc::now() + chrono::Duration::seconds(s)),
                    status: DelegationStatus::Pending,
                })
                .await;

            let requested = task.requested_tier.unwrap_or(max_inbound_tier);
            // Narrowing only ever lowers a tier (§3.5), so this child can
            // never carry a higher tier than what already gated the parent
            // — no sub-task of a workflow can independently require
            // AskMeFirst gating (resolves the open question in spec.md §9).
            let child = MessageEnvelope {
                message: Message::TaskRequest {
                    message_id: Uuid::new_v4(),
                    correlation_id: envelope.message_id(),
                    timestamp: Utc::now(),
                    content: task.description.clone(),
                },
                reference_code: child_code,
                authority_claims: narrow(&envelope.authority_claims, Utc::now(), requested),
                context: EnvelopeContext {
                    parent_message_id: envelope.message_id(),
                    original_goal: Some(original_goal.clone()),
                    team_id: envelope.context.team_id.clone(),
                    channel_id: envelope.context.channel_id.clone(),
                    reply_to: Some(self.queue_name()),
                    from_agent_id: None,
                },
                priority: envelope.priority,
                sla: envelope.sla,
            };
            debug_assert!(max_tier(&child.authority_claims).unwrap_or(AuthorityTier::AskMeFirst) <= max_inbound_tier);

            self.task_specs.write().await.insert(child_code, task.clone());
            self.dispatched_envelopes.write().await.insert(child_code, child.clone());
            self.publish(child, &target.queue_name()).await?;
            child_codes.push(child_code);
        }

        self.workflow_registry
            .create(WorkflowRecord {
                reference_code: parent_code,
                original_envelope: envelope.clone(),
                subtask_reference_codes: child_codes,
                summary: decomposition.summary.clone(),
                status: WorkflowStatus::InProgress,
                created_at: Utc::now(),
                completed_at: None,
            })
            .await;

        Ok(())
    }

    // ---- §4.7.4 AskMeFirst gating -----------------------------------------

    async fn gate_plan(&self, envelope: &MessageEnvelope, decomposition: DecompositionResult) -> Result<(), CosError> {
        let pending_code = self.refcode_generator.generate().await?;

        self.pending_plan_registry
            .store(PendingPlan {
                pending_reference_code: pending_code,
                original_envelope: envelope.clone(),
                decomposition_result: decomposition.clone(),
                stored_at: Utc::now(),
            })
            .await;

        self.delegation_registry
            .delegate(DelegationRecord {
                reference_code: pending_code,
                delegated_by: self.persona.agent_id.clone(),
                delegated_to: self.persona.escalation_target.clone(),
                description: decomposition.summary.clone(),
                due_at: envelope.sla.map(|s| Utc::now() + chrono::Duration::seconds(s)),
                status: DelegationStatus::Pending,
            })
            .await;

        let proposal = MessageEnvelope {
            message: Message::PlanProposal {
                message_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                tasks: decomposition.tasks,
                summary: decomposition.summary,
                original_goal: envelope
                    .context
                    .original_goal
                    .clone()
                    .unwrap_or_else(|| match &envelope.message {
                        Message::TaskRequest { content, .. } => content.clone(),
                        _ => String::new(),
                    }),
                pending_reference_code: pending_code,
            },
            reference_code: pending_code,
            authority_claims: vec![],
            context: EnvelopeContext {
                parent_message_id: envelope.message_id(),
                reply_to: Some(self.queue_name()),
                ..Default::default()
            },
            priority: envelope.priority,
            sla: None,
        };

        self.publish(proposal, &self.persona.escalation_target).await
    }

    async fn handle_plan_approval(&self, envelope: MessageEnvelope) -> Result<(), CosError> {
        let Message::PlanApprovalResponse { approved, amendments, reference_code, .. } = &envelope.message else {
            return Ok(());
        };
        let pending_code = *reference_code;

        let Some(plan) = self.pending_plan_registry.get(pending_code).await else {
            tracing::warn!(%pending_code, "plan approval response for unknown pending plan, dropping");
            return Ok(());
        };
        self.pending_plan_registry.remove(pending_code).await;

        if *approved {
            let max_inbound_tier =
                max_tier(&plan.original_envelope.authority_claims).unwrap_or(AuthorityTier::JustDoIt);
            self.dispatch_workflow_children(&plan.original_envelope, &plan.decomposition_result, max_inbound_tier)
                .await
        } else {
            self.delegation_registry
                .update_status(pending_code, DelegationStatus::Completed)
                .await?;

            let reply_to = plan.original_envelope.context.reply_to.clone();
            let Some(reply_to) = reply_to else {
                tracing::warn!(%pending_code, "plan rejection has no ReplyTo, dropping");
                return Ok(());
            };

            let mut content = format!("Plan rejected: {}", plan.decomposition_result.summary);
            if let Some(notes) = amendments {
                content.push_str(&format!("\nAmendments: {notes}"));
            }
            let rejection = MessageEnvelope {
                message: Message::TaskReply {
                    message_id: Uuid::new_v4(),
                    correlation_id: plan.original_envelope.message_id(),
                    timestamp: Utc::now(),
                    capability: "plan_rejected".to_string(),
                    content,
                },
                reference_code: plan.original_envelope.reference_code,
                authority_claims: vec![],
                context: EnvelopeContext {
                    parent_message_id: plan.original_envelope.message_id(),
                    from_agent_id: Some(self.persona.agent_id.clone()),
                    ..Default::default()
                },
                priority: plan.original_envelope.priority,
                sla: None,
            };
            self.publish(rejection, &reply_to).await
        }
    }

    // ---- §4.7.6 sub-task aggregation --------------------------------------

    async fn handle_subtask_reply(
        &self,
        envelope: MessageEnvelope,
        workflow: WorkflowRecord,
    ) -> Result<(), CosError> {
        let subtask_code = envelope.reference_code;
        let parent_code = workflow.reference_code;
        let is_failure = matches!(&envelope.message, Message::TaskReply { capability, .. } if capability == "error");

        self.delegation_registry
            .update_status(
                subtask_code,
                if is_failure { DelegationStatus::Failed } else { DelegationStatus::Completed },
            )
            .await?;

        if is_failure {
            let first_failure = self.workflow_registry.update_status(parent_code, WorkflowStatus::Failed).await?;
            self.workflow_registry
                .store_subtask_result(parent_code, subtask_code, envelope)
                .await?;
            if !first_failure {
                return Ok(());
            }
            return self.assemble_and_publish(parent_code, &workflow, WorkflowStatus::Failed).await;
        }

        let complete = self
            .workflow_registry
            .store_subtask_result(parent_code, subtask_code, envelope)
            .await?;
        if !complete {
            return Ok(());
        }

        self.workflow_registry.update_status(parent_code, WorkflowStatus::Completed).await?;
        self.assemble_and_publish(parent_code, &workflow, WorkflowStatus::Completed).await
    }

    async fn assemble_and_publish(
        &self,
        parent_code: ReferenceCode,
        workflow: &WorkflowRecord,
        status: WorkflowStatus,
    ) -> Result<(), CosError> {
        let results = self.workflow_registry.get_completed_results(parent_code).await?;
        let task_specs = self.task_specs.read().await;

        let mut sections = Vec::with_capacity(results.len());
        for result in &results {
            let content = match &result.message {
                Message::TaskReply { content, .. } => content.clone(),
                _ => String::new(),
            };
            let spec = task_specs.get(&result.reference_code);
            let capability = spec.map(|s| s.capability.clone()).unwrap_or_else(|| "task".to_string());
            let description = spec.map(|s| s.description.clone()).unwrap_or_default();
            sections.push(format!("## {capability}: {description}\n{content}"));
        }
        drop(task_specs);

        let body = if status == WorkflowStatus::Failed {
            format!("{}\n\nOne or more sub-tasks failed.\n\n{}", workflow.summary, sections.join("\n\n"))
        } else {
            format!("{}\n\n{}", workflow.summary, sections.join("\n\n"))
        };

        for code in &workflow.subtask_reference_codes {
            self.task_specs.write().await.remove(code);
            self.dispatched_envelopes.write().await.remove(code);
        }

        let Some(reply_to) = workflow.original_envelope.context.reply_to.clone() else {
            tracing::warn!(%parent_code, "workflow has no original ReplyTo, dropping assembled reply");
            return Ok(());
        };

        let final_envelope = MessageEnvelope {
            message: Message::TaskReply {
                message_id: Uuid::new_v4(),
                correlation_id: workflow.original_envelope.message_id(),
                timestamp: Utc::now(),
                capability: "aggregate".to_string(),
                content: body,
            },
            reference_code: parent_code,
            authority_claims: workflow.original_envelope.authority_claims.clone(),
            context: EnvelopeContext {
                parent_message_id: workflow.original_envelope.message_id(),
                from_agent_id: Some(self.persona.agent_id.clone()),
                ..Default::default()
            },
            priority: workflow.original_envelope.priority,
            sla: None,
        };

        self.publish(final_envelope, &reply_to).await
    }

    // ---- §4.7.5 supervision alerts -----------------------------------------

    async fn handle_supervision_alert(&self, envelope: MessageEnvelope) -> Result<(), CosError> {
        match &envelope.message {
            Message::SupervisionAlert {
                ref_code,
                delegated_agent_id,
                retry_count,
                is_agent_running,
                description,
                ..
            } => {
                let threshold = self.config.max_retries.saturating_sub(1);
                if !*is_agent_running || *retry_count >= threshold {
                    self.redispatch_to_alternate(*ref_code, delegated_agent_id, description).await
                } else {
                    self.retry_same_target(*ref_code, delegated_agent_id).await
                }
            }
            Message::EscalationAlert { ref_code, .. } => {
                self.publish(envelope.clone(), &self.persona.escalation_target).await?;
                if let Some(workflow) = self.workflow_registry.find_by_subtask(*ref_code).await {
                    self.delegation_registry
                        .update_status(*ref_code, DelegationStatus::Failed)
                        .await?;
                    let first_failure = self
                        .workflow_registry
                        .update_status(workflow.reference_code, WorkflowStatus::Failed)
                        .await?;
                    if first_failure {
                        self.assemble_and_publish(workflow.reference_code, &workflow, WorkflowStatus::Failed)
                            .await?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn retry_same_target(&self, ref_code: ReferenceCode, delegated_agent_id: &str) -> Result<(), CosError> {
        if let Some(original) = self.dispatched_envelopes.read().await.get(&ref_code).cloned() {
            self.publish(original, &queue_name_for(delegated_agent_id)).await?;
        }
        self.retry_registry.increment(ref_code).await;
        Ok(())
    }

    async fn redispatch_to_alternate(
        &self,
        ref_code: ReferenceCode,
        failing_agent_id: &str,
        description: &str,
    ) -> Result<(), CosError> {
        let Some(task) = self.task_specs.read().await.get(&ref_code).cloned() else {
            return self.publish(
                self.escalation_alert_envelope(ref_code, description),
                &self.persona.escalation_target,
            ).await;
        };

        let Some(target) = self
            .agent_registry
            .resolve_available_excluding(&task.capability, failing_agent_id)
            .await
        else {
            return self.publish(
                self.escalation_alert_envelope(ref_code, description),
                &self.persona.escalation_target,
            ).await;
        };

        let Some(original) = self.dispatched_envelopes.read().await.get(&ref_code).cloned() else {
            return Ok(());
        };
        self.publish(original, &target.queue_name()).await?;

        if let Some(context_registry) = &self.config.context_registry {
            context_registry
                .store(ContextEntry {
                    entry_id: Uuid::new_v4().to_string(),
                    content: format!("alternate agent '{}' chosen after supervision: {}", target.agent_id, description),
                    category: Category::Lesson,
                    tags: vec!["supervision".to_string()],
                    reference_code: Some(ref_code),
                    created_at: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }

    fn escalation_alert_envelope(&self, ref_code: ReferenceCode, reason: &str) -> MessageEnvelope {
        MessageEnvelope {
            message: Message::EscalationAlert {
                message_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                ref_code,
                delegated_agent_id: self.persona.agent_id.clone(),
                retry_count: self.config.max_retries,
                reason: reason.to_string(),
                original_description: reason.to_string(),
            },
            reference_code: ref_code,
            authority_claims: vec![],
            context: EnvelopeContext::default(),
            priority: cortex_types::Priority::High,
            sla: None,
        }
    }
}

#[async_trait]
impl Agent for ChiefOfStaff {
    fn id(&self) -> &str {
        &self.persona.agent_id
    }

    fn capabilities(&self) -> &[String] {
        &self.persona.capabilities
    }

    async fn process(&self, envelope: MessageEnvelope) -> Result<Option<MessageEnvelope>, AgentError> {
        self.handle(envelope)
            .await
            .map_err(|e| AgentError::Handler(e.to_string()))?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_bus::{Handler, HandlerResult, InMemoryBus};
    use cortex_refcode::{InMemorySequenceStore, ReferenceCodeGenerator};
    use cortex_types::{AgentAvailability, AgentRecord, Skill};
    use std::sync::Mutex as StdMutex;

    struct RecordingHandler(Arc<StdMutex<Vec<MessageEnvelope>>>);

    #[async_trait]
    impl Handler for RecordingHandler {
        async fn handle(&self, envelope: MessageEnvelope) -> HandlerResult {
            self.0.lock().unwrap().push(envelope);
            Ok(())
        }
    }

    struct FixedProvider(DecompositionResult);

    #[async_trait]
    impl crate::DecompositionProvider for FixedProvider {
        async fn decompose(
            &self,
            _goal: &str,
            _available_capabilities: &[String],
            _business_context: Option<&str>,
        ) -> Result<DecompositionResult, String> {
            Ok(self.0.clone())
        }
    }

    fn skill_runner_for(result: DecompositionResult) -> PipelineRunner {
        let mut runner = PipelineRunner::new();
        runner.register(Arc::new(crate::DecompositionExecutor::new(Arc::new(FixedProvider(result)))));
        runner
    }

    fn pipeline() -> Vec<Skill> {
        vec![Skill {
            id: "decompose".to_string(),
            executor_type: "decomposition".to_string(),
            category: None,
        }]
    }

    async fn build_cos(
        bus: Arc<InMemoryBus>,
        result: DecompositionResult,
        agent_registry: AgentRegistry,
    ) -> ChiefOfStaff {
        let store = Arc::new(InMemorySequenceStore::new());
        ChiefOfStaff::new(
            PersonaConfig {
                agent_id: "cos".to_string(),
                name: "Chief of Staff".to_string(),
                capabilities: vec![],
                pipeline: pipeline(),
                escalation_target: "agent.founder".to_string(),
                model_tier: None,
            },
            CosConfig {
                confidence_threshold: 0.5,
                max_retries: 3,
                context_registry: None,
                authority_registry: None,
            },
            bus,
            Arc::new(ReferenceCodeGenerator::new(store)),
            agent_registry,
            DelegationRegistry::new(),
            WorkflowRegistry::new(),
            PendingPlanRegistry::new(),
            RetryCounterRegistry::new(),
            skill_runner_for(result),
        )
    }

    fn agent(id: &str, capability: &str) -> AgentRecord {
        AgentRecord {
            agent_id: id.to_string(),
            capabilities: vec![capability.to_string()],
            availability: AgentAvailability::Available,
        }
    }

    fn inbound(content: &str, reply_to: &str) -> MessageEnvelope {
        MessageEnvelope {
            message: Message::TaskRequest {
                message_id: Uuid::new_v4(),
                correlation_id: None,
                timestamp: Utc::now(),
                content: content.to_string(),
            },
            reference_code: "CTX-2026-0305-001".parse().unwrap(),
            authority_claims: vec![],
            context: EnvelopeContext {
                reply_to: Some(reply_to.to_string()),
                ..Default::default()
            },
            priority: cortex_types::Priority::Normal,
            sla: None,
        }
    }

    async fn recorder(bus: &InMemoryBus, queue: &str) -> Arc<StdMutex<Vec<MessageEnvelope>>> {
        let sink = Arc::new(StdMutex::new(Vec::new()));
        bus.start_consuming(queue, Arc::new(RecordingHandler(sink.clone())))
            .await
            .unwrap();
        sink
    }

    #[tokio::test]
    async fn simple_route_dispatches_to_single_capable_agent() {
        let bus = Arc::new(InMemoryBus::new());
        let agents = AgentRegistry::new();
        agents.register(agent("translator", "translation")).await;

        let result = DecompositionResult {
            tasks: vec![TaskSpec {
                capability: "translation".to_string(),
                description: "translate this".to_string(),
                requested_tier: None,
            }],
            summary: "translate this".to_string(),
            confidence: 0.9,
        };
        let cos = build_cos(bus.clone(), result, agents).await;

        let sink = recorder(&bus, "agent.translator").await;
        cos.process(inbound("translate this", "client.a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let received = sink.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].context.reply_to, Some("client.a".to_string()));
        assert_ne!(received[0].reference_code, "CTX-2026-0305-001".parse().unwrap());
    }

    #[tokio::test]
    async fn decomposition_creates_a_workflow_and_dispatches_every_child() {
        let bus = Arc::new(InMemoryBus::new());
        let agents = AgentRegistry::new();
        agents.register(agent("researcher", "research")).await;
        agents.register(agent("drafter", "draft")).await;
        agents.register(agent("formatter", "format")).await;

        let result = DecompositionResult {
            tasks: vec![
                TaskSpec { capability: "research".into(), description: "gather figures".into(), requested_tier: None },
                TaskSpec { capability: "draft".into(), description: "write the draft".into(), requested_tier: None },
                TaskSpec { capability: "format".into(), description: "format the report".into(), requested_tier: None },
            ],
            summary: "quarterly report".to_string(),
            confidence: 0.9,
        };
        let cos = build_cos(bus.clone(), result, agents).await;

        let research_sink = recorder(&bus, "agent.researcher").await;
        let draft_sink = recorder(&bus, "agent.drafter").await;
        let format_sink = recorder(&bus, "agent.formatter").await;

        cos.process(inbound("prepare quarterly report", "client.a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(research_sink.lock().unwrap().len(), 1);
        assert_eq!(draft_sink.lock().unwrap().len(), 1);
        assert_eq!(format_sink.lock().unwrap().len(), 1);
        assert_eq!(
            research_sink.lock().unwrap()[0].context.reply_to,
            Some("agent.cos".to_string())
        );
    }

    #[tokio::test]
    async fn aggregation_publishes_exactly_once_after_the_final_reply() {
        let bus = Arc::new(InMemoryBus::new());
        let agents = AgentRegistry::new();
        agents.register(agent("researcher", "research")).await;
        agents.register(agent("drafter", "draft")).await;
        agents.register(agent("formatter", "format")).await;

        let result = DecompositionResult {
            tasks: vec![
                TaskSpec { capability: "research".into(), description: "gather figures".into(), requested_tier: None },
                TaskSpec { capability: "draft".into(), description: "write the draft".into(), requested_tier: None },
                TaskSpec { capability: "format".into(), description: "format the report".into(), requested_tier: None },
            ],
            summary: "quarterly report".to_string(),
            confidence: 0.9,
        };
        let cos = Arc::new(build_cos(bus.clone(), result, agents).await);

        let research_sink = recorder(&bus, "agent.researcher").await;
        let client_sink = recorder(&bus, "client.a").await;

        cos.process(inbound("prepare quarterly report", "client.a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let children: Vec<ReferenceCode> = research_sink
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.reference_code)
            .collect();
        assert_eq!(children.len(), 1);

        // Reconstruct the three child codes via the workflow this created.
        let workflow_codes: Vec<ReferenceCode> = {
            let parent = cos
                .workflow_registry
                .find_by_subtask(children[0])
                .await
                .unwrap();
            parent.subtask_reference_codes
        };
        assert_eq!(workflow_codes.len(), 3);

        for (i, code) in workflow_codes.iter().enumerate() {
            let reply = MessageEnvelope {
                message: Message::TaskReply {
                    message_id: Uuid::new_v4(),
                    correlation_id: None,
                    timestamp: Utc::now(),
                    capability: "research".to_string(),
                    content: format!("result {i}"),
                },
                reference_code: *code,
                authority_claims: vec![],
                context: EnvelopeContext::default(),
                priority: cortex_types::Priority::Normal,
                sla: None,
            };
            cos.process(reply).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(client_sink.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ask_me_first_gates_then_resumes_on_approval() {
        let bus = Arc::new(InMemoryBus::new());
        let agents = AgentRegistry::new();
        agents.register(agent("researcher", "research")).await;
        agents.register(agent("drafter", "draft")).await;
        agents.register(agent("formatter", "format")).await;

        let result = DecompositionResult {
            tasks: vec![
                TaskSpec { capability: "research".into(), description: "gather figures".into(), requested_tier: None },
                TaskSpec { capability: "draft".into(), description: "write the draft".into(), requested_tier: None },
                TaskSpec { capability: "format".into(), description: "format the report".into(), requested_tier: None },
            ],
            summary: "quarterly report".to_string(),
            confidence: 0.9,
        };
        let cos = build_cos(bus.clone(), result, agents).await;

        let founder_sink = recorder(&bus, "agent.founder").await;
        let research_sink = recorder(&bus, "agent.researcher").await;

        let mut gated = inbound("prepare quarterly report", "client.a");
        gated.authority_claims.push(cortex_types::AuthorityClaim {
            granted_by: "founder".to_string(),
            granted_to: "cos".to_string(),
            tier: AuthorityTier::AskMeFirst,
            permitted_actions: vec!["route".to_string()],
            granted_at: Utc::now(),
            expires_at: None,
        });

        cos.process(gated).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(founder_sink.lock().unwrap().len(), 1);
        assert!(research_sink.lock().unwrap().is_empty());

        let pending_code = match &founder_sink.lock().unwrap()[0].message {
            Message::PlanProposal { pending_reference_code, .. } => *pending_reference_code,
            _ => panic!("expected a plan proposal"),
        };

        let approval = MessageEnvelope {
            message: Message::PlanApprovalResponse {
                message_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                approved: true,
                amendments: None,
                reference_code: pending_code,
            },
            reference_code: pending_code,
            authority_claims: vec![],
            context: EnvelopeContext::default(),
            priority: cortex_types::Priority::Normal,
            sla: None,
        };
        cos.process(approval).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(research_sink.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn supervision_alert_retries_same_target_before_threshold() {
        let bus = Arc::new(InMemoryBus::new());
        let agents = AgentRegistry::new();
        agents.register(agent("translator", "translation")).await;

        let result = DecompositionResult {
            tasks: vec![TaskSpec { capability: "translation".into(), description: "translate this".into(), requested_tier: None }],
            summary: "translate this".to_string(),
            confidence: 0.9,
        };
        let cos = build_cos(bus.clone(), result, agents).await;

        let sink = recorder(&bus, "agent.translator").await;
        cos.process(inbound("translate this", "client.a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let child_code = sink.lock().unwrap()[0].reference_code;

        let alert = MessageEnvelope {
            message: Message::SupervisionAlert {
                message_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                ref_code: child_code,
                delegated_agent_id: "translator".to_string(),
                retry_count: 1,
                due_at: Utc::now(),
                description: "overdue".to_string(),
                is_agent_running: true,
            },
            reference_code: child_code,
            authority_claims: vec![],
            context: EnvelopeContext::default(),
            priority: cortex_types::Priority::Normal,
            sla: None,
        };
        cos.process(alert).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(sink.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dispatch_escalates_when_target_lacks_a_standing_authority_grant() {
        use cortex_registries::AuthorityRegistry;
        use cortex_types::AuthorityClaim;

        let bus = Arc::new(InMemoryBus::new());
        let agents = AgentRegistry::new();
        agents.register(agent("translator", "translation")).await;

        let result = DecompositionResult {
            tasks: vec![TaskSpec { capability: "translation".into(), description: "translate this".into(), requested_tier: None }],
            summary: "translate this".to_string(),
            confidence: 0.9,
        };

        let store = Arc::new(InMemorySequenceStore::new());
        let cos = ChiefOfStaff::new(
            PersonaConfig {
                agent_id: "cos".to_string(),
                name: "Chief of Staff".to_string(),
                capabilities: vec![],
                pipeline: pipeline(),
                escalation_target: "agent.founder".to_string(),
                model_tier: None,
            },
            CosConfig {
                confidence_threshold: 0.5,
                max_retries: 3,
                context_registry: None,
                authority_registry: Some(AuthorityRegistry::new()),
            },
            bus.clone(),
            Arc::new(ReferenceCodeGenerator::new(store)),
            agents,
            DelegationRegistry::new(),
            WorkflowRegistry::new(),
            PendingPlanRegistry::new(),
            RetryCounterRegistry::new(),
            skill_runner_for(result),
        );

        let translator_sink = recorder(&bus, "agent.translator").await;
        let founder_sink = recorder(&bus, "agent.founder").await;

        let mut request = inbound("translate this", "client.a");
        request.authority_claims = vec![AuthorityClaim {
            granted_by: "client.a".to_string(),
            granted_to: "cos".to_string(),
            tier: AuthorityTier::JustDoIt,
            permitted_actions: vec!["translation".to_string()],
            granted_at: Utc::now(),
            expires_at: None,
        }];
        cos.process(request).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(translator_sink.lock().unwrap().is_empty());
        assert_eq!(founder_sink.lock().unwrap().len(), 1);
    }
}
