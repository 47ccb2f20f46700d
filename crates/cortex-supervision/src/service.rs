use std::sync::Arc;

use chrono::Utc;
use cortex_agent::AgentRuntime;
use cortex_bus::MessageBus;
use cortex_registries::{DelegationRegistry, RetryCounterRegistry};
use cortex_types::agent_record::queue_name_for;
use cortex_types::envelope::EnvelopeContext;
use cortex_types::{DelegationRecord, Message, MessageEnvelope, Priority};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::SupervisionConfig;

/// Background overdue-delegation sweep (§4.8). Runs its own periodic
/// task, independent of any agent harness's consumer loop. Grounded on
/// `tandem-channels::discord`'s heartbeat-interval `tokio::select!` loop,
/// generalized from a fixed heartbeat to a configurable sweep.
pub struct SupervisionService {
    bus: Arc<dyn MessageBus>,
    delegation_registry: DelegationRegistry,
    retry_registry: RetryCounterRegistry,
    agent_runtime: AgentRuntime,
    config: SupervisionConfig,
    handle: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SupervisionService {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        delegation_registry: DelegationRegistry,
        retry_registry: RetryCounterRegistry,
        agent_runtime: AgentRuntime,
        config: SupervisionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            delegation_registry,
            retry_registry,
            agent_runtime,
            config,
            handle: Mutex::new(None),
        })
    }

    pub async fn start(self: &Arc<Self>) {
        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let this = self.clone();
        let interval_dur = self.config.tick_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_dur);
            loop {
                tokio::select! {
                    _ = cancel_for_task.cancelled() => break,
                    _ = interval.tick() => {
                        this.check_overdue().await;
                    }
                }
            }
        });

        *self.handle.lock().await = Some((cancel, task));
        tracing::info!("supervision service started");
    }

    /// Cancels the periodic task and waits for the in-flight sweep (if
    /// any) to finish.
    pub async fn stop(&self) {
        if let Some((cancel, task)) = self.handle.lock().await.take() {
            cancel.cancel();
            let _ = task.await;
        }
        tracing::info!("supervision service stopped");
    }

    /// One sweep of the §4.8 algorithm, exposed for deterministic test
    /// invocation independent of the timer.
    pub async fn check_overdue(&self) {
        for delegation in self.delegation_registry.find_overdue().await {
            self.handle_overdue(delegation).await;
        }
    }

    async fn handle_overdue(&self, delegation: DelegationRecord) {
        let n = self
            .retry_registry
            .increment(delegation.reference_code)
            .await;
        let is_agent_running = self.agent_runtime.is_running(&delegation.delegated_to).await;

        if n < self.config.max_retries {
            let envelope = self.supervision_alert(&delegation, n, is_agent_running);
            let queue = queue_name_for(&self.config.cos_agent_id);
            if let Err(err) = self.bus.publish(envelope, &queue).await {
                tracing::error!(%err, ref_code = %delegation.reference_code, "failed to publish supervision alert");
            }
        } else {
            let envelope = self.escalation_alert(&delegation, n);
            if let Err(err) = self
                .bus
                .publish(envelope, &self.config.escalation_target)
                .await
            {
                tracing::error!(%err, ref_code = %delegation.reference_code, "failed to publish escalation alert");
            }
        }
    }

    fn supervision_alert(
        &self,
        delegation: &DelegationRecord,
        n: u32,
        is_agent_running: bool,
    ) -> MessageEnvelope {
        MessageEnvelope {
            message: Message::SupervisionAlert {
                message_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                ref_code: delegation.reference_code,
                delegated_agent_id: delegation.delegated_to.clone(),
                retry_count: n,
                due_at: delegation.due_at.unwrap_or_else(Utc::now),
                description: delegation.description.clone(),
                is_agent_running,
            },
            reference_code: delegation.reference_code,
            authority_claims: vec![],
            context: EnvelopeContext::default(),
            priority: Priority::High,
            sla: None,
        }
    }

    fn escalation_alert(&self, delegation: &DelegationRecord, n: u32) -> MessageEnvelope {
        MessageEnvelope {
            message: Message::EscalationAlert {
                message_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                ref_code: delegation.reference_code,
                delegated_agent_id: delegation.delegated_to.clone(),
                retry_count: n,
                reason: "retry threshold exceeded".to_string(),
                original_description: delegation.description.clone(),
            },
            reference_code: delegation.reference_code,
            authority_claims: vec![],
            context: EnvelopeContext::default(),
            priority: Priority::Critical,
            sla: None,
        }
    }
}
