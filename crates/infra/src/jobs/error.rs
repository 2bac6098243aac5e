//! Errors raised by the retry engine and its persistence.

use std::path::PathBuf;

use writeq_core::JobUid;

use crate::gateway::GatewayError;

/// A single failed attempt. Always recovered by the executor that hit it.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// The write-check call failed.
    #[error("write check failed for {uid}: {source}")]
    Probe {
        uid: JobUid,
        #[source]
        source: GatewayError,
    },
    /// The write call failed.
    #[error("write failed for {uid}: {source}")]
    Write {
        uid: JobUid,
        #[source]
        source: GatewayError,
    },
}

/// Restoring or saving the queue snapshot failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed snapshot {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported snapshot version {version} in {}", .path.display())]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[error("job {uid} has undecodable data: {source}")]
    Encoding {
        uid: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("job record has an invalid uid: {0}")]
    InvalidUid(#[from] writeq_core::DomainError),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
