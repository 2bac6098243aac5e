//! Per-job retry executor.
//!
//! One executor owns one pending job for the job's whole lifetime and drives
//! it through `Waiting → Probing → Writing → {Done | Waiting}` until a write
//! succeeds, the retry limit is hit, or shutdown is requested.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use writeq_core::{JobUid, PendingJob};

use super::error::AttemptError;
use super::queue::{EntryId, JobQueue, QueuedJob};
use super::types::{AttemptOutcome, AttemptTracking, ExecutorOutcome, ExecutorState, RetryPolicy};
use crate::gateway::WriteGateway;

/// Retry loop bound to a single job.
pub struct RetryExecutor<G: WriteGateway> {
    entry: EntryId,
    job: PendingJob,
    queue: Arc<JobQueue>,
    gateway: Arc<G>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
    state: ExecutorState,
}

impl<G: WriteGateway> RetryExecutor<G> {
    pub fn new(
        queued: QueuedJob,
        queue: Arc<JobQueue>,
        gateway: Arc<G>,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            entry: queued.id,
            job: queued.job,
            queue,
            gateway,
            policy,
            shutdown,
            state: ExecutorState::Waiting,
        }
    }

    pub fn uid(&self) -> &JobUid {
        self.job.uid()
    }

    /// Failed attempts so far, as seen by this executor.
    pub fn attempts(&self) -> u32 {
        self.job.attempts
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Run attempts until the job is written, parked, or cancelled.
    pub async fn run(mut self) -> ExecutorOutcome {
        debug!(uid = %self.uid(), attempts = self.attempts(), "executor started");

        loop {
            if !self.policy.limit.allows(self.job.attempts) {
                error!(
                    uid = %self.uid(),
                    attempts = self.attempts(),
                    "retry limit exhausted; job stays queued until next start"
                );
                return ExecutorOutcome::Parked;
            }

            match self.attempt_once().await {
                AttemptOutcome::Written => return ExecutorOutcome::Written,
                AttemptOutcome::Cancelled => {
                    debug!(uid = %self.uid(), state = %self.state, "executor cancelled");
                    return ExecutorOutcome::Cancelled;
                }
                AttemptOutcome::NotWritable | AttemptOutcome::Failed(_) => {}
            }
        }
    }

    /// One full Waiting → Probing → Writing cycle.
    pub async fn attempt_once(&mut self) -> AttemptOutcome {
        if self.state == ExecutorState::Done {
            return AttemptOutcome::Written;
        }

        self.state = ExecutorState::Waiting;
        let delay = self.policy.backoff.delay(self.job.attempts);
        debug!(
            uid = %self.uid(),
            attempts = self.attempts(),
            delay_ms = delay.as_millis() as u64,
            "waiting before next attempt"
        );
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return AttemptOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }

        self.state = ExecutorState::Probing;
        let writable = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return AttemptOutcome::Cancelled,
            res = self.gateway.write_check(self.job.uid()) => res,
        };
        match writable {
            Ok(true) => {}
            Ok(false) => {
                self.record_failure();
                debug!(uid = %self.uid(), attempts = self.attempts(), "target not writable");
                return AttemptOutcome::NotWritable;
            }
            Err(source) => {
                self.record_failure();
                let err = AttemptError::Probe {
                    uid: self.uid().clone(),
                    source,
                };
                warn!(uid = %self.uid(), attempts = self.attempts(), error = %err, "write check failed");
                return AttemptOutcome::Failed(err);
            }
        }

        self.state = ExecutorState::Writing;
        let written = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return AttemptOutcome::Cancelled,
            res = self.gateway.write_data(self.job.uid(), self.job.job.data()) => res,
        };
        match written {
            Ok(()) => {
                self.queue.remove(self.job.uid());
                self.state = ExecutorState::Done;
                info!(uid = %self.uid(), attempts = self.attempts(), "data written");
                AttemptOutcome::Written
            }
            Err(source) => {
                self.record_failure();
                let err = AttemptError::Write {
                    uid: self.uid().clone(),
                    source,
                };
                warn!(uid = %self.uid(), attempts = self.attempts(), error = %err, "write failed");
                AttemptOutcome::Failed(err)
            }
        }
    }

    fn record_failure(&mut self) {
        let attempts = self.job.record_failure();
        if self.policy.tracking == AttemptTracking::Shared {
            self.queue.record_attempts(self.entry, attempts);
        }
        self.state = ExecutorState::Waiting;
    }
}
