//! Job payloads and the pending-job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::JobUid;

/// An immutable unit of work: write `data` for `uid` on the external target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    uid: JobUid,
    data: Vec<u8>,
}

impl Job {
    pub fn new(uid: JobUid, data: impl Into<Vec<u8>>) -> Self {
        Self {
            uid,
            data: data.into(),
        }
    }

    pub fn uid(&self) -> &JobUid {
        &self.uid
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A queued job together with its failed-attempt counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingJob {
    /// The payload to write.
    pub job: Job,
    /// Number of failed attempts so far (starts at 0).
    pub attempts: u32,
    /// When the job first entered the queue.
    pub enqueued_at: DateTime<Utc>,
}

impl PendingJob {
    /// Wrap a freshly submitted job (no attempts yet).
    pub fn new(job: Job) -> Self {
        Self {
            job,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Rebuild a pending job from persisted state.
    pub fn restored(job: Job, attempts: u32, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            job,
            attempts,
            enqueued_at,
        }
    }

    pub fn uid(&self) -> &JobUid {
        self.job.uid()
    }

    /// Count one more failed attempt. Saturates instead of wrapping.
    pub fn record_failure(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }
}
