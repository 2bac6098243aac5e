//! Shared in-memory queue of pending jobs.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use writeq_core::{JobUid, PendingJob};

/// Receiving end of the arrivals channel, consumed by the dispatcher.
pub type Arrivals = mpsc::UnboundedReceiver<QueuedJob>;

/// Identity of one queue entry, unique for the lifetime of its queue.
///
/// Uids may repeat; entry ids never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

/// A job as it was added, together with its entry id.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: EntryId,
    pub job: PendingJob,
}

#[derive(Debug, Default)]
struct Entries {
    next_id: u64,
    jobs: Vec<QueuedJob>,
}

/// Mutex-guarded collection of pending jobs.
///
/// Every operation takes the single lock for its whole duration, so `add`,
/// `remove` and `snapshot` never interleave partially. Uniqueness of uids is
/// assumed by callers but not enforced here.
#[derive(Debug, Default)]
pub struct JobQueue {
    entries: Mutex<Entries>,
    arrivals: Option<mpsc::UnboundedSender<QueuedJob>>,
}

impl JobQueue {
    /// A queue without a dispatcher attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that forwards a copy of every added job to the returned
    /// receiver.
    pub fn with_arrivals() -> (Self, Arrivals) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            entries: Mutex::new(Entries::default()),
            arrivals: Some(tx),
        };
        (queue, rx)
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panic while holding the lock cannot leave the Vec half-mutated by
        // any of the operations below, so the data is still usable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job and announce it to the dispatcher, if any.
    pub fn add(&self, job: PendingJob) -> EntryId {
        let mut entries = self.lock();
        let id = EntryId(entries.next_id);
        entries.next_id += 1;

        let queued = QueuedJob { id, job };
        if let Some(tx) = &self.arrivals {
            if tx.send(queued.clone()).is_err() {
                tracing::warn!(uid = %queued.job.uid(), "dispatcher is gone; job queued without an executor");
            }
        }
        entries.jobs.push(queued);
        id
    }

    /// Remove the first job with the given uid. Absent uids are a no-op.
    pub fn remove(&self, uid: &JobUid) -> Option<PendingJob> {
        let mut entries = self.lock();
        let index = entries.jobs.iter().position(|q| q.job.uid() == uid)?;
        Some(entries.jobs.remove(index).job)
    }

    /// Overwrite the attempt counter of entry `id`.
    ///
    /// Returns `false` if that entry is no longer queued.
    pub fn record_attempts(&self, id: EntryId, attempts: u32) -> bool {
        let mut entries = self.lock();
        match entries.jobs.iter_mut().find(|q| q.id == id) {
            Some(entry) => {
                entry.job.attempts = attempts;
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of all queued jobs.
    pub fn snapshot(&self) -> Vec<PendingJob> {
        self.lock().jobs.iter().map(|q| q.job.clone()).collect()
    }

    pub fn contains(&self, uid: &JobUid) -> bool {
        self.lock().jobs.iter().any(|q| q.job.uid() == uid)
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use writeq_core::Job;

    fn pending(uid: &str) -> PendingJob {
        PendingJob::new(Job::new(JobUid::new(uid).unwrap(), uid.as_bytes().to_vec()))
    }

    fn uid(s: &str) -> JobUid {
        JobUid::new(s).unwrap()
    }

    #[test]
    fn add_and_snapshot() {
        let queue = JobQueue::new();
        queue.add(pending("a"));
        queue.add(pending("b"));

        let snap = queue.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].uid(), "a");
        assert_eq!(snap[1].uid(), "b");
    }

    #[test]
    fn remove_missing_uid_is_noop() {
        let queue = JobQueue::new();
        queue.add(pending("a"));

        assert!(queue.remove(&uid("zzz")).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_takes_first_match_only() {
        let queue = JobQueue::new();
        let mut first = pending("dup");
        first.attempts = 1;
        let mut second = pending("dup");
        second.attempts = 2;
        queue.add(first);
        queue.add(second);

        let removed = queue.remove(&uid("dup")).unwrap();
        assert_eq!(removed.attempts, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.snapshot()[0].attempts, 2);
    }

    #[test]
    fn snapshot_does_not_alias() {
        let queue = JobQueue::new();
        queue.add(pending("a"));

        let snap = queue.snapshot();
        queue.remove(&uid("a"));
        queue.add(pending("b"));

        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].uid(), "a");
    }

    #[test]
    fn record_attempts_updates_queued_entry() {
        let queue = JobQueue::new();
        let a = queue.add(pending("a"));
        let b = queue.add(pending("b"));
        queue.remove(&uid("b"));

        assert!(queue.record_attempts(a, 4));
        assert!(!queue.record_attempts(b, 4));
        assert_eq!(queue.snapshot()[0].attempts, 4);
    }

    #[test]
    fn record_attempts_targets_one_of_duplicate_uids() {
        let queue = JobQueue::new();
        let first = queue.add(pending("dup"));
        let second = queue.add(pending("dup"));
        assert_ne!(first, second);

        assert!(queue.record_attempts(second, 5));

        let snap = queue.snapshot();
        assert_eq!(snap[0].attempts, 0);
        assert_eq!(snap[1].attempts, 5);
    }

    #[test]
    fn arrivals_see_every_add_in_order() {
        let (queue, mut arrivals) = JobQueue::with_arrivals();
        queue.add(pending("a"));
        queue.add(pending("b"));

        let a = arrivals.try_recv().unwrap();
        let b = arrivals.try_recv().unwrap();
        assert_eq!(a.job.uid(), "a");
        assert_eq!(b.job.uid(), "b");
        assert!(a.id < b.id);
        assert!(arrivals.try_recv().is_err());
    }

    #[test]
    fn add_survives_a_dropped_dispatcher() {
        let (queue, arrivals) = JobQueue::with_arrivals();
        drop(arrivals);
        queue.add(pending("a"));
        assert!(queue.contains(&uid("a")));
    }

    #[test]
    fn concurrent_add_and_remove() {
        const N: usize = 400;
        let queue = Arc::new(JobQueue::new());

        let adders: Vec<_> = (0..8)
            .map(|t| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in (t..N).step_by(8) {
                        queue.add(pending(&format!("job-{i}")));
                    }
                })
            })
            .collect();
        for h in adders {
            h.join().unwrap();
        }

        // Remove every third uid from several threads, each uid exactly once.
        let removed: HashSet<String> = (0..N).filter(|i| i % 3 == 0).map(|i| format!("job-{i}")).collect();
        let removers: Vec<_> = (0..4)
            .map(|t| {
                let queue = queue.clone();
                let mine: Vec<String> = removed.iter().skip(t).step_by(4).cloned().collect();
                thread::spawn(move || {
                    for id in mine {
                        assert!(queue.remove(&JobUid::new(id).unwrap()).is_some());
                    }
                })
            })
            .collect();
        for h in removers {
            h.join().unwrap();
        }

        let snap = queue.snapshot();
        assert_eq!(snap.len(), N - removed.len());

        let mut seen = HashSet::new();
        for job in &snap {
            assert!(!removed.contains(job.uid().as_str()));
            assert!(seen.insert(job.uid().clone()), "duplicate {}", job.uid());
        }
    }

    #[test]
    fn interleaved_add_remove_snapshot() {
        let queue = Arc::new(JobQueue::new());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let id = format!("w{t}-{i}");
                        queue.add(pending(&id));
                        if i % 2 == 0 {
                            queue.remove(&JobUid::new(id).unwrap());
                        }
                    }
                })
            })
            .collect();
        let reader = {
            let queue = queue.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let snap = queue.snapshot();
                    assert!(snap.len() <= 4 * 200);
                }
            })
        };
        for h in writers {
            h.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(queue.len(), 4 * 100);
    }
}
