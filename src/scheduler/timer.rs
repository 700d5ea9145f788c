// Cancellable one-shot task used to arm each playback cycle
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A task that runs once after `delay`.
///
/// The scheduler holds at most one of these; re-arming replaces it.
#[derive(Debug)]
pub(crate) struct ScheduledTask {
    id: u64,
    delay: Duration,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub(crate) fn spawn<F>(runtime: &Handle, id: u64, delay: Duration, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        Self { id, delay, handle }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    /// Abort the task, whether it is still waiting or mid-cycle
    pub(crate) fn cancel(self) {
        self.handle.abort();
    }

    /// Let a task that is replacing itself run to completion
    pub(crate) fn detach(self) {
        drop(self.handle);
    }
}
