use async_trait::async_trait;
use cortex_types::MessageEnvelope;

use crate::AgentError;

/// One autonomous worker (spec.md §3.3). Implementations are the business
/// logic behind a harness; the harness owns authority enforcement and
/// reply routing so implementations only decide what to do with a
/// validated envelope.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;
    fn capabilities(&self) -> &[String];

    async fn process(
        &self,
        envelope: MessageEnvelope,
    ) -> Result<Option<MessageEnvelope>, AgentError>;
}
