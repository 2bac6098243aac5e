use axum::{Router, routing::post};

pub mod jobs;
pub mod system;

/// Router for job ingestion.
pub fn router() -> Router {
    Router::new().route("/jobs", post(jobs::submit_job))
}
