//! Signal-driven startup and shutdown.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tf_core::{Error, Result};

/// Run `run` until it finishes or the process is interrupted.
///
/// On Ctrl-C (or SIGTERM on unix) the token handed to `run` is cancelled and
/// `run` gets `grace` to wind down. If it does not, `start` returns `Ok(())`
/// regardless and the task is aborted. An error returned by `run` within the
/// window is passed through.
pub async fn start<F, Fut>(grace: Duration, run: F) -> Result<()>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    start_with(grace, shutdown_signal(), run).await
}

/// Like [`start`], with the interrupt supplied by the caller.
pub async fn start_with<S, F, Fut>(grace: Duration, interrupt: S, run: F) -> Result<()>
where
    S: Future<Output = ()>,
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let mut handle = tokio::spawn(run(cancel.clone()));

    tokio::select! {
        res = &mut handle => return joined(res),
        _ = interrupt => {}
    }

    tracing::info!("interrupt received, cancelling run");
    cancel.cancel();
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(res) => joined(res),
        Err(_) => {
            tracing::warn!(?grace, "run did not stop within the grace period");
            handle.abort();
            Ok(())
        }
    }
}

fn joined(res: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    res.map_err(|e| Error::action(format!("run task failed: {e}")))?
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
///
/// A signal that cannot be watched is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
