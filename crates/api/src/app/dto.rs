use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use writeq_core::{Job, JobUid};
use writeq_infra::jobs::DispatcherStats;

use crate::app::errors::SubmitError;

// -------------------------
// Request DTOs
// -------------------------

/// How `data` in a submission is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataEncoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub uid: String,
    pub data: String,
    #[serde(default)]
    pub encoding: DataEncoding,
}

impl SubmitJobRequest {
    pub fn into_job(self) -> Result<Job, SubmitError> {
        let uid = JobUid::new(self.uid)?;
        let data = match self.encoding {
            DataEncoding::Utf8 => self.data.into_bytes(),
            DataEncoding::Base64 => BASE64.decode(self.data.as_bytes())?,
        };
        Ok(Job::new(uid, data))
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub uid: String,
    pub status: &'static str,
}

impl SubmitJobResponse {
    pub fn queued(uid: &JobUid) -> Self {
        Self {
            uid: uid.to_string(),
            status: "queued",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub queue_depth: usize,
    pub dispatcher: Option<DispatcherStats>,
}
