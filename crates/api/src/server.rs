//! Process lifecycle: restore, serve, and shut down in order.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use writeq_infra::config::AppConfig;
use writeq_infra::gateway::{HttpWriteGateway, WriteGateway};
use writeq_infra::jobs::{
    Dispatcher, JobQueue, JsonFileStore, SnapshotStore, persist_snapshot, restore_into,
    spawn_periodic_snapshots,
};

use crate::app::{AppState, build_app};

/// Bind, serve until SIGINT/SIGTERM, then shut down.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let gateway = Arc::new(
        HttpWriteGateway::new(config.target_url.clone(), config.target_timeout)
            .context("building write-target client")?,
    );
    let store: Arc<dyn SnapshotStore> = Arc::new(JsonFileStore::new(&config.state_path));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    serve(listener, config, gateway, store, shutdown_signal()).await
}

/// Run the whole service on `listener` until `shutdown` resolves.
///
/// Startup restores the snapshot and re-arms every restored job. Shutdown
/// stops HTTP first (bounded by `shutdown_grace`), then drains executors
/// (bounded by `drain_timeout`), then saves the queue once.
///
/// If the HTTP server stops without being asked, the same shutdown runs and
/// the HTTP failure is returned after the save.
pub async fn serve<G, F>(
    listener: TcpListener,
    config: AppConfig,
    gateway: Arc<G>,
    store: Arc<dyn SnapshotStore>,
    shutdown: F,
) -> anyhow::Result<()>
where
    G: WriteGateway + 'static,
    F: Future<Output = ()> + Send,
{
    let (queue, arrivals) = JobQueue::with_arrivals();
    let queue = Arc::new(queue);

    let restored = {
        let queue = queue.clone();
        let store = store.clone();
        let on_error = config.on_restore_error;
        tokio::task::spawn_blocking(move || restore_into(&queue, store.as_ref(), on_error))
            .await
            .context("restore task failed")?
            .with_context(|| format!("restoring pending jobs from {}", config.state_path.display()))?
    };

    let dispatcher = Dispatcher::new(queue.clone(), gateway, config.retry_policy()).spawn(arrivals);

    let snapshots_stop = CancellationToken::new();
    let periodic = config.persist_interval.map(|every| {
        spawn_periodic_snapshots(queue.clone(), store.clone(), every, snapshots_stop.clone())
    });

    let app = build_app(AppState::new(queue.clone(), Some(dispatcher.monitor())));
    info!(
        addr = %listener.local_addr().context("reading bound address")?,
        restored,
        "writeq listening"
    );

    let http_stop = CancellationToken::new();
    let mut http = tokio::spawn({
        let http_stop = http_stop.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { http_stop.cancelled().await })
                .await
        }
    });

    let http_failure = tokio::select! {
        _ = shutdown => {
            info!("shutdown signal received");
            None
        }
        res = &mut http => {
            let err = http_exit_error(res);
            error!(error = %err, "HTTP server stopped on its own; shutting down");
            Some(err)
        }
    };

    // 1. stop accepting work
    http_stop.cancel();
    if !http.is_finished() {
        match tokio::time::timeout(config.shutdown_grace, &mut http).await {
            Ok(Ok(Ok(()))) => info!("HTTP server stopped"),
            Ok(Ok(Err(e))) => error!(error = %e, "HTTP server failed during shutdown"),
            Ok(Err(e)) => error!(error = %e, "HTTP server task failed during shutdown"),
            Err(_) => {
                warn!(
                    grace_ms = config.shutdown_grace.as_millis() as u64,
                    "HTTP server did not stop within grace period; aborting"
                );
                http.abort();
            }
        }
    }

    // 2. stop executors
    snapshots_stop.cancel();
    if let Some(task) = periodic {
        if let Err(e) = task.await {
            warn!(error = %e, "periodic snapshot task failed");
        }
    }
    let stats = dispatcher.shutdown(config.drain_timeout).await;
    info!(
        written = stats.jobs_written,
        parked = stats.jobs_parked,
        cancelled = stats.jobs_cancelled,
        "dispatcher stopped"
    );

    // 3. save once
    let path = config.state_path.display().to_string();
    let saved = tokio::task::spawn_blocking(move || persist_snapshot(&queue, store.as_ref())).await;
    match saved {
        Ok(Ok(count)) => info!(jobs = count, path = %path, "pending jobs saved"),
        Ok(Err(e)) => error!(error = %e, "failed to save pending jobs"),
        Err(e) => error!(error = %e, "save task failed"),
    }

    match http_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Turn an HTTP task that finished before shutdown was requested into an error.
fn http_exit_error(res: Result<std::io::Result<()>, JoinError>) -> anyhow::Error {
    match res {
        Ok(Ok(())) => anyhow!("HTTP server exited unexpectedly"),
        Ok(Err(e)) => anyhow::Error::new(e).context("HTTP server failed"),
        Err(e) => anyhow::Error::new(e).context("HTTP server task failed"),
    }
}

/// Resolves on SIGINT (Ctrl-C) or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
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
                error!(error = %e, "failed to listen for SIGTERM");
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
