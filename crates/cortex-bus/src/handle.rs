use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Returned from `start_consuming`. Releasing one handle stops only its
/// own consumer — never a bus-wide toggle (spec.md §9).
pub struct ConsumerHandle {
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Cancels this consumer and waits for its current handler invocation
    /// (if any) to finish — the harness's "drain" contract (§4.5).
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}
