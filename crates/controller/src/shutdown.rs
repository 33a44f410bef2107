use tokio_util::sync::CancellationToken;

/// Blocks until SIGINT/SIGTERM, then cancels the root token so every worker
/// and reconciler winds down.
pub async fn wait_for_shutdown(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("ctrl-c handler");
    }

    tracing::info!("shutdown signal received");
    cancel.cancel();
}
