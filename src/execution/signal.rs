//! Turns an interrupt into a cancellation of the running build

use crate::core::ExecutionContext;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Background task that cancels a context when a shutdown signal arrives
///
/// The task ends on its own once the context is cancelled for any other
/// reason. Dropping the bridge aborts it.
#[derive(Debug)]
pub struct SignalBridge {
    handle: JoinHandle<()>,
}

impl SignalBridge {
    pub fn spawn<S>(ctx: ExecutionContext, signal: S) -> Self
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = signal => {
                    if ctx.cancel() {
                        warn!("Received interrupt, cancelling build; cleanup may surface partial-failure errors");
                    }
                }
                _ = ctx.cancelled() => {
                    debug!("Build finished, signal bridge exiting");
                }
            }
        });

        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
