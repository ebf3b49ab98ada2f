use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use jobflow_core::JobId;
use jobflow_infra::CreateJobRequest;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_job).get(list_jobs))
        .route("/:id", get(get_job))
        .route("/:id/cancel", post(cancel_job))
        .route("/:id/retry", post(retry_job))
}

pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match services.ingestion.submit(body).await {
        Ok(job) => dto::success(StatusCode::CREATED, job),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::ListParams>,
) -> axum::response::Response {
    match services.ingestion.list(params.to_query()).await {
        Ok(page) => dto::success(StatusCode::OK, page),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::validation_error_to_response(e),
    };

    match services.ingestion.get(id).await {
        Ok(job) => dto::success(StatusCode::OK, job),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn cancel_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::validation_error_to_response(e),
    };

    match services.control.cancel(id).await {
        Ok(job) => dto::success(StatusCode::OK, job),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn retry_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::validation_error_to_response(e),
    };

    match services.control.retry(id).await {
        Ok(job) => dto::success(StatusCode::OK, job),
        Err(e) => errors::service_error_to_response(e),
    }
}
