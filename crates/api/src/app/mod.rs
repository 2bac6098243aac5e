//! HTTP API application wiring (Axum router + shared state).
//!
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use writeq_infra::jobs::{DispatcherMonitor, JobQueue};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    /// Absent when no dispatcher runs (router-only tests).
    pub dispatcher: Option<DispatcherMonitor>,
}

impl AppState {
    pub fn new(queue: Arc<JobQueue>, dispatcher: Option<DispatcherMonitor>) -> Self {
        Self { queue, dispatcher }
    }
}

/// Build the full HTTP router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .route("/stats", get(routes::system::stats))
        .merge(routes::router())
        .layer(Extension(Arc::new(state)))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::trace_middleware))
                .layer(axum::middleware::from_fn(middleware::cors_middleware)),
        )
}
