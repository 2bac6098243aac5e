//! Spawns one retry executor per queued job.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::RetryExecutor;
use super::queue::{Arrivals, JobQueue};
use super::types::{ExecutorOutcome, RetryPolicy};
use crate::gateway::WriteGateway;

/// Dispatcher runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub jobs_dispatched: u64,
    pub jobs_written: u64,
    pub jobs_parked: u64,
    pub jobs_cancelled: u64,
    pub executor_panics: u64,
    pub in_flight: usize,
    pub uptime_secs: u64,
}

/// Read-only view of a running dispatcher's statistics.
#[derive(Debug, Clone)]
pub struct DispatcherMonitor {
    stats: Arc<Mutex<DispatcherStats>>,
    started: Instant,
}

impl DispatcherMonitor {
    pub fn stats(&self) -> DispatcherStats {
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        stats.uptime_secs = self.started.elapsed().as_secs();
        stats
    }
}

/// Handle to control a running dispatcher.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
    monitor: DispatcherMonitor,
}

impl DispatcherHandle {
    pub fn stats(&self) -> DispatcherStats {
        self.monitor.stats()
    }

    pub fn monitor(&self) -> DispatcherMonitor {
        self.monitor.clone()
    }

    /// Cancel every executor and wait up to `drain` for them to stop.
    ///
    /// Executors still running after `drain` are aborted. Jobs that were not
    /// written stay in the queue either way.
    pub async fn shutdown(self, drain: Duration) -> DispatcherStats {
        self.shutdown.cancel();

        let mut join = self.join;
        match tokio::time::timeout(drain, &mut join).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "dispatcher task failed"),
            Err(_) => {
                warn!(drain_ms = drain.as_millis() as u64, "executors did not drain in time; aborting");
                join.abort();
            }
        }
        self.monitor.stats()
    }
}

/// Turns queue arrivals into running executors.
///
/// Concurrency is unbounded: every arrival gets its own task for its whole
/// retry lifetime.
pub struct Dispatcher<G: WriteGateway> {
    queue: Arc<JobQueue>,
    gateway: Arc<G>,
    policy: RetryPolicy,
}

impl<G: WriteGateway + 'static> Dispatcher<G> {
    pub fn new(queue: Arc<JobQueue>, gateway: Arc<G>, policy: RetryPolicy) -> Self {
        Self {
            queue,
            gateway,
            policy,
        }
    }

    /// Start the dispatch loop on the current tokio runtime.
    pub fn spawn(self, arrivals: Arrivals) -> DispatcherHandle {
        let shutdown = CancellationToken::new();
        let stats = Arc::new(Mutex::new(DispatcherStats::default()));
        let monitor = DispatcherMonitor {
            stats: stats.clone(),
            started: Instant::now(),
        };

        let join = tokio::spawn(self.dispatch_loop(arrivals, shutdown.clone(), stats));

        DispatcherHandle {
            shutdown,
            join,
            monitor,
        }
    }

    async fn dispatch_loop(
        self,
        mut arrivals: Arrivals,
        shutdown: CancellationToken,
        stats: Arc<Mutex<DispatcherStats>>,
    ) {
        info!(policy = ?self.policy, "dispatcher started");
        let mut executors: JoinSet<ExecutorOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(queued) = arrivals.recv() => {
                    debug!(uid = %queued.job.uid(), attempts = queued.job.attempts, "spawning executor");
                    let executor = RetryExecutor::new(
                        queued,
                        self.queue.clone(),
                        self.gateway.clone(),
                        self.policy,
                        shutdown.child_token(),
                    );
                    executors.spawn(executor.run());
                    let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
                    s.jobs_dispatched += 1;
                    s.in_flight += 1;
                }
                Some(finished) = executors.join_next(), if !executors.is_empty() => {
                    record(&stats, finished);
                }
            }
        }

        info!(in_flight = executors.len(), "dispatcher stopping; draining executors");
        while let Some(finished) = executors.join_next().await {
            record(&stats, finished);
        }
        info!("dispatcher stopped");
    }
}

fn record(stats: &Mutex<DispatcherStats>, finished: Result<ExecutorOutcome, JoinError>) {
    let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
    s.in_flight = s.in_flight.saturating_sub(1);
    match finished {
        Ok(ExecutorOutcome::Written) => s.jobs_written += 1,
        Ok(ExecutorOutcome::Parked) => s.jobs_parked += 1,
        Ok(ExecutorOutcome::Cancelled) => s.jobs_cancelled += 1,
        Err(e) => {
            s.executor_panics += 1;
            error!(error = %e, "executor task failed; its job stays queued until next start");
        }
    }
}
