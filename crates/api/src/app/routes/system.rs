use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode};

use crate::app::AppState;
use crate::app::dto::StatsResponse;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn stats(Extension(state): Extension<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        queue_depth: state.queue.len(),
        dispatcher: state.dispatcher.as_ref().map(|d| d.stats()),
    })
}
