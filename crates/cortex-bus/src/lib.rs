//! The message bus (C2): delivers envelopes to per-queue consumers and
//! dead-letters on failure. Grounded on `tandem-core::event_bus::EventBus`'s
//! minimal-wrapper shape, generalized from broadcast to per-queue FIFO
//! delivery, plus the ack/nack/dead-letter vocabulary from the flowcatalyst
//! `fc-common` crate (`other_examples`).

mod error;
mod handle;
mod memory;

#[cfg(feature = "amqp")]
mod amqp;

pub use error::BusError;
pub use handle::ConsumerHandle;
pub use memory::InMemoryBus;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpBus, AmqpConfig};

use async_trait::async_trait;
use cortex_types::MessageEnvelope;

/// Outcome of processing one envelope. Handler failure leads to a nack
/// without requeue (§4.2, §7); success leads to ack.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, envelope: MessageEnvelope) -> HandlerResult;
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub bindings: Vec<String>,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, envelope: MessageEnvelope, queue_name: &str) -> Result<(), BusError>;

    async fn start_consuming(
        &self,
        queue_name: &str,
        handler: std::sync::Arc<dyn Handler>,
    ) -> Result<ConsumerHandle, BusError>;

    /// Stops every consumer owned by this bus.
    async fn stop_consuming(&self);

    async fn topology(&self) -> Topology;
}
