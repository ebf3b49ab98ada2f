use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use jobflow_core::ValidationError;
use jobflow_infra::{ErrorKind, ServiceError};

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err.kind() {
        ErrorKind::Client => match &err {
            ServiceError::Validation { field, message } => validation_error(field, message.clone()),
            _ => json_error(StatusCode::BAD_REQUEST, err.to_string()),
        },
        ErrorKind::NotFound => json_error(StatusCode::NOT_FOUND, "job not found"),
        ErrorKind::Conflict => json_error(StatusCode::CONFLICT, err.to_string()),
        ErrorKind::Internal => {
            error!(error = %err, "request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

pub fn validation_error_to_response(err: ValidationError) -> axum::response::Response {
    validation_error(err.field, err.message)
}

fn validation_error(field: &str, message: String) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "status": "error",
            "error": message,
            "field": field,
        })),
    )
        .into_response()
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "status": "error",
            "error": message.into(),
        })),
    )
        .into_response()
}
