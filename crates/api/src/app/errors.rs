use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use writeq_core::DomainError;

/// A job submission that cannot be queued.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    InvalidUid(#[from] DomainError),
    #[error("data is not valid base64: {0}")]
    InvalidData(#[from] base64::DecodeError),
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let code = match &self {
            SubmitError::InvalidUid(_) => "invalid_uid",
            SubmitError::InvalidData(_) => "invalid_data",
        };
        json_error(StatusCode::BAD_REQUEST, code, self.to_string())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
