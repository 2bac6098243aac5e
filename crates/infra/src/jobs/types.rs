//! Retry policy knobs and executor outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::backoff::SineBackoff;
use super::error::AttemptError;

/// Upper bound on failed attempts before an executor gives up.
///
/// `Unbounded` is the default: a permanently failing target keeps its
/// executor alive forever. Operators who need to cap worst-case resource use
/// pick `MaxAttempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryLimit {
    #[default]
    Unbounded,
    MaxAttempts(u32),
}

impl RetryLimit {
    /// Whether another attempt is allowed after `attempts` failures.
    pub fn allows(&self, attempts: u32) -> bool {
        match self {
            RetryLimit::Unbounded => true,
            RetryLimit::MaxAttempts(max) => attempts < *max,
        }
    }
}

/// Where a failed attempt is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptTracking {
    /// Also write the count into the queue entry, so snapshots are accurate.
    #[default]
    Shared,
    /// Count only in the executor's private copy. The queue entry keeps the
    /// value it had when enqueued and snapshots under-report attempts.
    Local,
}

/// Everything an executor needs to decide when and whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub backoff: SineBackoff,
    pub limit: RetryLimit,
    pub tracking: AttemptTracking,
}

impl RetryPolicy {
    pub fn with_backoff(mut self, backoff: SineBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_limit(mut self, limit: RetryLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_tracking(mut self, tracking: AttemptTracking) -> Self {
        self.tracking = tracking;
        self
    }
}

/// Position of an executor in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    Waiting,
    Probing,
    Writing,
    Done,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutorState::Waiting => "waiting",
            ExecutorState::Probing => "probing",
            ExecutorState::Writing => "writing",
            ExecutorState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Result of one Waiting → Probing → Writing cycle.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The write succeeded and the job left the queue.
    Written,
    /// The target said "not now".
    NotWritable,
    /// A gateway call failed.
    Failed(AttemptError),
    /// Shutdown was requested mid-cycle.
    Cancelled,
}

/// How an executor's whole lifetime ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorOutcome {
    Written,
    /// Retry limit exhausted; the job stays queued for the next start.
    Parked,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_always_allows() {
        assert!(RetryLimit::Unbounded.allows(0));
        assert!(RetryLimit::Unbounded.allows(u32::MAX));
    }

    #[test]
    fn max_attempts_respects_ceiling() {
        let limit = RetryLimit::MaxAttempts(3);
        assert!(limit.allows(0));
        assert!(limit.allows(2));
        assert!(!limit.allows(3));
        assert!(!limit.allows(4));
    }

    #[test]
    fn defaults_are_unbounded_and_shared() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.limit, RetryLimit::Unbounded);
        assert_eq!(policy.tracking, AttemptTracking::Shared);
        assert_eq!(policy.backoff, SineBackoff::default());
    }
}
