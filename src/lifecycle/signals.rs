//! OS signal handling.
//!
//! SIGINT, SIGTERM and SIGHUP all end the lifetime. There is no reload.

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::lifecycle::Shutdown;

/// Trigger `lifetime` on the first termination signal.
///
/// The listener exits quietly if the lifetime ends some other way first.
pub fn spawn_signal_listener(lifetime: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            received = wait_for_signal() => match received {
                Ok(signal) => {
                    info!(signal, "shutdown signal received");
                    lifetime.trigger();
                }
                Err(e) => error!(error = %e, "failed to install signal handlers"),
            },
            _ = lifetime.wait() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = hangup.recv() => Ok("SIGHUP"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_listener_exits_with_lifetime() {
        let lifetime = Shutdown::new();
        let listener = spawn_signal_listener(lifetime.clone());
        lifetime.trigger();
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .unwrap()
            .unwrap();
    }
}
