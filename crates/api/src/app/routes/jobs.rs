use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use writeq_core::PendingJob;

use crate::app::AppState;
use crate::app::dto::{SubmitJobRequest, SubmitJobResponse};
use crate::app::errors::SubmitError;

/// Queue a job and return immediately; the write happens in the background.
///
/// A uid that is already queued is accepted again and gets its own executor.
pub async fn submit_job(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, SubmitError> {
    let job = req.into_job()?;
    let response = SubmitJobResponse::queued(job.uid());

    tracing::info!(uid = %job.uid(), bytes = job.data().len(), "job accepted");
    state.queue.add(PendingJob::new(job));

    Ok((StatusCode::ACCEPTED, Json(response)))
}
