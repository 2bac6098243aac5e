//! Durable snapshots of the pending-job queue.
//!
//! The queue lives in memory; this module writes it out on shutdown (and
//! optionally on an interval) and reads it back on startup.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use writeq_core::{Job, JobUid, PendingJob};

use super::error::PersistenceError;
use super::queue::JobQueue;

const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot storage abstraction.
pub trait SnapshotStore: Send + Sync {
    /// Read the last saved snapshot. A store that was never written restores
    /// as empty.
    fn restore(&self) -> Result<Vec<PendingJob>, PersistenceError>;

    /// Replace the stored snapshot with `jobs`.
    fn save(&self, jobs: &[PendingJob]) -> Result<(), PersistenceError>;

    /// Move unreadable state out of the way so a later `save` does not
    /// destroy it. Returns where it went, if anywhere.
    fn quarantine(&self) -> Result<Option<PathBuf>, PersistenceError> {
        Ok(None)
    }
}

/// What to do when the snapshot cannot be restored at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestoreFailure {
    /// Refuse to start.
    #[default]
    Abort,
    /// Quarantine the unreadable snapshot and start with an empty queue.
    StartEmpty,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    jobs: Vec<JobRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    uid: String,
    /// Base64 (standard alphabet).
    data: String,
    attempts: u32,
    #[serde(default = "Utc::now")]
    enqueued_at: DateTime<Utc>,
}

impl From<&PendingJob> for JobRecord {
    fn from(job: &PendingJob) -> Self {
        Self {
            uid: job.uid().to_string(),
            data: BASE64.encode(job.job.data()),
            attempts: job.attempts,
            enqueued_at: job.enqueued_at,
        }
    }
}

impl TryFrom<JobRecord> for PendingJob {
    type Error = PersistenceError;

    fn try_from(record: JobRecord) -> Result<Self, Self::Error> {
        let data = BASE64
            .decode(record.data.as_bytes())
            .map_err(|source| PersistenceError::Encoding {
                uid: record.uid.clone(),
                source,
            })?;
        let uid = JobUid::new(record.uid)?;
        Ok(PendingJob::restored(
            Job::new(uid, data),
            record.attempts,
            record.enqueued_at,
        ))
    }
}

/// Snapshot kept in a single JSON file.
///
/// Saves go to a sibling `.tmp` file that is synced and then renamed over the
/// target, so readers only ever see a complete snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    /// `<dir>/<file name><suffix>`, next to the snapshot.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for JsonFileStore {
    fn restore(&self) -> Result<Vec<PendingJob>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot found; starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(PersistenceError::io(&self.path, e)),
        };

        let file: SnapshotFile =
            serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        if file.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                path: self.path.clone(),
                version: file.version,
            });
        }

        file.jobs.into_iter().map(PendingJob::try_from).collect()
    }

    fn save(&self, jobs: &[PendingJob]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let doc = SnapshotFile {
            version: SNAPSHOT_VERSION,
            jobs: jobs.iter().map(JobRecord::from).collect(),
        };

        let tmp = self.tmp_path();
        let file = File::create(&tmp).map_err(|e| PersistenceError::io(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &doc)
            .map_err(|e| PersistenceError::io(&tmp, e.into()))?;
        writer.flush().map_err(|e| PersistenceError::io(&tmp, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| PersistenceError::io(&tmp, e.into_error()))?;
        file.sync_all().map_err(|e| PersistenceError::io(&tmp, e))?;

        fs::rename(&tmp, &self.path).map_err(|e| PersistenceError::io(&self.path, e))?;
        Ok(())
    }

    fn quarantine(&self) -> Result<Option<PathBuf>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let target = self.sibling(&format!(".corrupt-{}", Utc::now().timestamp()));
        fs::rename(&self.path, &target).map_err(|e| PersistenceError::io(&self.path, e))?;
        Ok(Some(target))
    }
}

/// In-memory snapshot store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    jobs: Mutex<Vec<PendingJob>>,
    saves: Mutex<usize>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn restore(&self) -> Result<Vec<PendingJob>, PersistenceError> {
        Ok(self.jobs.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, jobs: &[PendingJob]) -> Result<(), PersistenceError> {
        *self.jobs.lock().unwrap_or_else(PoisonError::into_inner) = jobs.to_vec();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for Arc<S> {
    fn restore(&self) -> Result<Vec<PendingJob>, PersistenceError> {
        (**self).restore()
    }

    fn save(&self, jobs: &[PendingJob]) -> Result<(), PersistenceError> {
        (**self).save(jobs)
    }

    fn quarantine(&self) -> Result<Option<PathBuf>, PersistenceError> {
        (**self).quarantine()
    }
}

/// Load the stored snapshot into `queue`, applying `on_error` if the snapshot
/// cannot be read. Returns the number of re-queued jobs.
pub fn restore_into(
    queue: &JobQueue,
    store: &dyn SnapshotStore,
    on_error: RestoreFailure,
) -> Result<usize, PersistenceError> {
    let jobs = match store.restore() {
        Ok(jobs) => jobs,
        Err(e) => match on_error {
            RestoreFailure::Abort => return Err(e),
            RestoreFailure::StartEmpty => {
                error!(error = %e, "snapshot unreadable; starting with an empty queue");
                match store.quarantine() {
                    Ok(Some(moved)) => warn!(path = %moved.display(), "unreadable snapshot quarantined"),
                    Ok(None) => {}
                    Err(qe) => error!(error = %qe, "failed to quarantine unreadable snapshot"),
                }
                Vec::new()
            }
        },
    };

    let count = jobs.len();
    for job in jobs {
        queue.add(job);
    }
    info!(jobs = count, "restored pending jobs");
    Ok(count)
}

/// Snapshot `queue` and save it. Returns the number of saved jobs.
pub fn persist_snapshot(queue: &JobQueue, store: &dyn SnapshotStore) -> Result<usize, PersistenceError> {
    let snapshot = queue.snapshot();
    store.save(&snapshot)?;
    debug!(jobs = snapshot.len(), "snapshot saved");
    Ok(snapshot.len())
}

/// Save the queue every `every` until `shutdown` fires.
pub fn spawn_periodic_snapshots(
    queue: Arc<JobQueue>,
    store: Arc<dyn SnapshotStore>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "periodic snapshots enabled");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let queue = queue.clone();
                    let store = store.clone();
                    let saved = tokio::task::spawn_blocking(move || persist_snapshot(&queue, store.as_ref())).await;
                    match saved {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(error = %e, "periodic snapshot failed"),
                        Err(e) => warn!(error = %e, "periodic snapshot task failed"),
                    }
                }
            }
        }
        debug!("periodic snapshots stopped");
    })
}
