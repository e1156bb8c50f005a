//! Task group where the first failure cancels every sibling.

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error};

use crate::error::Error;
use crate::lifecycle::Shutdown;
use crate::Protocol;

/// Serving tasks sharing one lifetime.
///
/// The group's lifetime is a child of the caller's: it ends when the caller
/// cancels, or when any task fails or panics.
pub struct TaskGroup {
    lifetime: Shutdown,
    tasks: Vec<(Protocol, JoinHandle<Result<(), Error>>)>,
}

impl TaskGroup {
    pub fn new(parent: &Shutdown) -> Self {
        Self {
            lifetime: parent.child(),
            tasks: Vec::new(),
        }
    }

    /// The lifetime every task in this group should observe.
    pub fn shutdown(&self) -> &Shutdown {
        &self.lifetime
    }

    /// Spawn a task under the current log sink.
    pub fn spawn<F>(&mut self, protocol: Protocol, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let lifetime = self.lifetime.clone();
        let handle = tokio::spawn(
            async move {
                let guard = CancelOnDrop(Some(lifetime));
                let result = task.await;
                if let Err(e) = &result {
                    error!(protocol = %protocol, error = %e, "serving task failed");
                } else {
                    guard.disarm();
                }
                result
            }
            .with_current_subscriber(),
        );
        self.tasks.push((protocol, handle));
    }

    /// Wait for every task and join their errors.
    pub async fn wait(self) -> Result<(), Error> {
        let mut errors = Vec::new();
        for (protocol, handle) in self.tasks {
            match handle.await {
                Ok(Ok(())) => debug!(protocol = %protocol, "serving task finished"),
                Ok(Err(e)) => errors.push(e),
                Err(join_error) => {
                    error!(protocol = %protocol, error = %join_error, "serving task panicked");
                    errors.push(Error::TaskPanicked { protocol });
                }
            }
        }
        Error::join(errors)
    }
}

/// Ends the group's lifetime unless disarmed; covers panics as well as errors.
struct CancelOnDrop(Option<Shutdown>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(lifetime) = self.0.take() {
            lifetime.trigger();
        }
    }
}
