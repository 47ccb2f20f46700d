use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_types::MessageEnvelope;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::{BusError, ConsumerHandle, Handler, MessageBus, Topology};

struct Queue {
    tx: mpsc::UnboundedSender<MessageEnvelope>,
    rx: Option<mpsc::UnboundedReceiver<MessageEnvelope>>,
}

/// The in-memory reference bus (§4.2): exactly-once, ordered per queue.
/// One `mpsc` channel per queue name; `start_consuming` spawns a dedicated
/// task draining it sequentially, which gives prefetch-1 semantics for
/// free since only one handler invocation per queue runs at a time.
#[derive(Default)]
pub struct InMemoryBus {
    queues: RwLock<HashMap<String, Queue>>,
    dead_letters: Arc<RwLock<Vec<MessageEnvelope>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn queue_sender(&self, queue_name: &str) -> mpsc::UnboundedSender<MessageEnvelope> {
        let mut queues = self.queues.write().await;
        queues
            .entry(queue_name.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                Queue { tx, rx: Some(rx) }
            })
            .tx
            .clone()
    }

    pub async fn dead_letters(&self) -> Vec<MessageEnvelope> {
        self.dead_letters.read().await.clone()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, envelope: MessageEnvelope, queue_name: &str) -> Result<(), BusError> {
        let tx = self.queue_sender(queue_name).await;
        tx.send(envelope).map_err(|_| BusError::Closed)?;
        Ok(())
    }

    async fn start_consuming(
        &self,
        queue_name: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<ConsumerHandle, BusError> {
        let mut rx = {
            let mut queues = self.queues.write().await;
            let queue = queues.entry(queue_name.to_string()).or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                Queue { tx, rx: Some(rx) }
            });
            queue
                .rx
                .take()
                .ok_or_else(|| BusError::NoSuchQueue(queue_name.to_string()))?
        };

        let cancel = CancellationToken::new();
        let dead_letters = self.dead_letters.clone();
        let queue_owned = queue_name.to_string();
        let cancel_for_task = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_for_task.cancelled() => break,
                    maybe_envelope = rx.recv() => {
                        let Some(envelope) = maybe_envelope else { break };
                        match handler.handle(envelope.clone()).await {
                            Ok(()) => {
                                tracing::debug!(queue = %queue_owned, "envelope acked");
                            }
                            Err(err) => {
                                tracing::error!(queue = %queue_owned, %err, "handler failed, dead-lettering");
                                dead_letters.write().await.push(envelope);
                            }
                        }
                    }
                }
            }
        });

        Ok(ConsumerHandle { cancel, task })
    }

    async fn stop_consuming(&self) {
        // The in-memory bus does not retain its own consumer tokens once a
        // `ConsumerHandle` is returned to the caller — per spec.md §9
        // ("Per-consumer handle returned from Start"), releasing a handle
        // is the only way to stop a consumer. This reference implementation
        // has no bus-wide consumers to stop beyond those handles, so this
        // is a no-op kept to satisfy the trait's full interface.
    }

    async fn topology(&self) -> Topology {
        Topology::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cortex_types::envelope::{EnvelopeContext, Priority};
    use cortex_types::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn sample_envelope() -> MessageEnvelope {
        MessageEnvelope {
            message: Message::TaskRequest {
                message_id: Uuid::new_v4(),
                correlation_id: None,
                timestamp: Utc::now(),
                content: "hello".into(),
            },
            reference_code: "CTX-2026-0305-001".parse().unwrap(),
            authority_claims: vec![],
            context: EnvelopeContext::default(),
            priority: Priority::Normal,
            sla: None,
        }
    }

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self, _envelope: MessageEnvelope) -> crate::HandlerResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl Handler for FailingHandler {
        async fn handle(&self, _envelope: MessageEnvelope) -> crate::HandlerResult {
            Err("boom".into())
        }
    }

    #[tokio::test]
    async fn delivers_published_envelope_to_its_consumer() {
        let bus = InMemoryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = bus
            .start_consuming("agent.a", Arc::new(CountingHandler(count.clone())))
            .await
            .unwrap();
        bus.publish(sample_envelope(), "agent.a").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn handler_failure_dead_letters_without_requeue() {
        let bus = InMemoryBus::new();
        let handle = bus
            .start_consuming("agent.a", Arc::new(FailingHandler))
            .await
            .unwrap();
        bus.publish(sample_envelope(), "agent.a").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.stop().await;
        assert_eq!(bus.dead_letters().await.len(), 1);
    }

    #[tokio::test]
    async fn stopping_one_consumer_leaves_others_running() {
        let bus = InMemoryBus::new();
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let handle_a = bus
            .start_consuming("agent.a", Arc::new(CountingHandler(count_a.clone())))
            .await
            .unwrap();
        let handle_b = bus
            .start_consuming("agent.b", Arc::new(CountingHandler(count_b.clone())))
            .await
            .unwrap();

        handle_a.stop().await;
        bus.publish(sample_envelope(), "agent.b").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(count_b.load(Ordering::SeqCst), 1);
        handle_b.stop().await;
    }
}
