use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use cortex_bus::{ConsumerHandle, Handler, HandlerResult, MessageBus};
use cortex_registries::AuthorityRegistry;
use cortex_types::{AgentAvailability, AgentRecord, AuthorityTier};
use cortex_types::agent_record::queue_name_for;

use crate::{Agent, AgentError};

/// Binds one agent to queue `agent.<AgentId>` (C5). Owns authority
/// enforcement and reply routing so `Agent` implementations stay focused
/// on business logic. Grounded on `tandem-server::agent_teams`'s
/// runtime-shape conventions.
pub struct AgentHarness {
    agent: Arc<dyn Agent>,
    bus: Arc<dyn MessageBus>,
    agent_registry: cortex_registries::AgentRegistry,
    authority_registry: Option<AuthorityRegistry>,
    team_ceiling: Option<AuthorityTier>,
    handle: tokio::sync::Mutex<Option<ConsumerHandle>>,
}

impl AgentHarness {
    pub fn new(
        agent: Arc<dyn Agent>,
        bus: Arc<dyn MessageBus>,
        agent_registry: cortex_registries::AgentRegistry,
        authority_registry: Option<AuthorityRegistry>,
        team_ceiling: Option<AuthorityTier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            agent,
            bus,
            agent_registry,
            authority_registry,
            team_ceiling,
            handle: tokio::sync::Mutex::new(None),
        })
    }

    pub fn agent_id(&self) -> &str {
        self.agent.id()
    }

    fn queue_name(&self) -> String {
        queue_name_for(self.agent.id())
    }

    pub async fn start(self: &Arc<Self>) {
        self.agent_registry
            .register(AgentRecord {
                agent_id: self.agent.id().to_string(),
                capabilities: self.agent.capabilities().to_vec(),
                availability: AgentAvailability::Available,
            })
            .await;

        let consumer: Arc<dyn Handler> = self.clone();
        let handle = self
            .bus
            .start_consuming(&self.queue_name(), consumer)
            .await
            .expect("failed to start consumer");
        *self.handle.lock().await = Some(handle);
        tracing::info!(agent = %self.agent.id(), "harness started");
    }

    /// Disposes the consumer handle, marks the agent unavailable, and lets
    /// the current in-flight handler invocation (if any) finish — the
    /// "drain" contract (§4.5).
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.stop().await;
        }
        let _ = self
            .agent_registry
            .set_availability(self.agent.id(), AgentAvailability::Unavailable)
            .await;
        tracing::info!(agent = %self.agent.id(), "harness stopped");
    }

    async fn authority_rejected(
        &self,
        envelope: &cortex_types::MessageEnvelope,
    ) -> Option<String> {
        let now = Utc::now();
        for claim in &envelope.authority_claims {
            if claim.is_expired(now) {
                return Some("authority claim expired".to_string());
            }
            if claim.granted_to != self.agent.id() {
                return Some(format!(
                    "authority claim granted to '{}', not '{}'",
                    claim.granted_to,
                    self.agent.id()
                ));
            }
            if let Some(registry) = &self.authority_registry {
                for action in &claim.permitted_actions {
                    if !registry
                        .has_authority(&claim.granted_to, action, claim.tier)
                        .await
                    {
                        return Some(format!("no stored grant backs action '{action}'"));
                    }
                }
            }
        }
        None
    }

    fn clamp_to_team_ceiling(&self, mut envelope: cortex_types::MessageEnvelope) -> cortex_types::MessageEnvelope {
        if let Some(ceiling) = self.team_ceiling {
            for claim in envelope.authority_claims.iter_mut() {
                claim.tier = claim.tier.min(ceiling);
            }
        }
        envelope
    }
}

#[async_trait]
impl Handler for AgentHarness {
    async fn handle(&self, envelope: cortex_types::MessageEnvelope) -> HandlerResult {
        if let Some(reason) = self.authority_rejected(&envelope).await {
            tracing::warn!(agent = %self.agent.id(), %reason, "authority rejected, not invoking agent");
            if let Some(reply_to) = envelope.context.reply_to.clone() {
                let error_reply = build_error_reply(&envelope, self.agent.id(), &reason);
                if let Err(err) = self.bus.publish(error_reply, &reply_to).await {
                    tracing::error!(%err, "failed to publish authority-rejection reply");
                }
            }
            return Ok(());
        }

        let inbound_message_id = envelope.message_id();
        let inbound_reference_code = envelope.reference_code;
        let reply_to = envelope.context.reply_to.clone();

        match self.agent.process(envelope).await {
            Ok(Some(reply)) => {
                let Some(reply_to) = reply_to else {
                    tracing::warn!(agent = %self.agent.id(), "reply dropped: no ReplyTo");
                    return Ok(());
                };
                let mut stamped = reply;
                stamped.context.from_agent_id = Some(self.agent.id().to_string());
                stamped.context.parent_message_id = inbound_message_id;
                stamped.reference_code = inbound_reference_code;
                let stamped = self.clamp_to_team_ceiling(stamped);
                self.bus
                    .publish(stamped, &reply_to)
                    .await
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(AgentError::Handler(msg)) => Err(msg.into()),
            Err(AgentError::AuthorityRejected(msg)) => Err(msg.into()),
        }
    }
}

fn build_error_reply(
    inbound: &cortex_types::MessageEnvelope,
    from_agent: &str,
    reason: &str,
) -> cortex_types::MessageEnvelope {
    use cortex_types::envelope::EnvelopeContext;
    use cortex_types::Message;
    use uuid::Uuid;

    cortex_types::MessageEnvelope {
        message: Message::TaskReply {
            message_id: Uuid::new_v4(),
            correlation_id: inbound.message_id(),
            timestamp: Utc::now(),
            capability: "error".to_string(),
            content: format!("authority rejected: {reason}"),
        },
        reference_code: inbound.reference_code,
        authority_claims: vec![],
        context: EnvelopeContext {
            parent_message_id: inbound.message_id(),
            from_agent_id: Some(from_agent.to_string()),
            ..Default::default()
        },
        priority: inbound.priority,
        sla: None,
    }
}
