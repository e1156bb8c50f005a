//! Cancellable lifetimes.

use futures_util::future::select_all;
use std::sync::Arc;
use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// Cheap to clone; every clone observes the same signal. A [`child`]
/// lifetime ends when its parent does, and can also be ended on its own
/// without affecting the parent.
///
/// [`child`]: Shutdown::child
#[derive(Debug, Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tx: watch::Sender<bool>,
    parent: Option<Shutdown>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Shutdown>) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { tx, parent }),
        }
    }

    pub fn child(&self) -> Shutdown {
        Self::with_parent(Some(self.clone()))
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        self.inner.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        self.lineage().any(|s| *s.inner.tx.borrow())
    }

    /// Resolves once this lifetime or any ancestor has been triggered.
    pub async fn wait(&self) {
        let mut receivers: Vec<watch::Receiver<bool>> =
            self.lineage().map(|s| s.inner.tx.subscribe()).collect();
        let waits = receivers.iter_mut().map(|rx| {
            Box::pin(async move {
                let _ = rx.wait_for(|triggered| *triggered).await;
            })
        });
        select_all(waits).await;
    }

    fn lineage(&self) -> impl Iterator<Item = &Shutdown> {
        std::iter::successors(Some(self), |s| s.inner.parent.as_ref())
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
