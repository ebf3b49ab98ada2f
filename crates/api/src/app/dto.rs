use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use jobflow_infra::ListQuery;

// -------------------------
// Request DTOs
// -------------------------

/// `GET /api/v1/jobs?page&limit`. Unparsable values fall back to the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListParams {
    pub fn to_query(&self) -> ListQuery {
        let parse = |v: &Option<String>| {
            v.as_deref()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(0)
        };
        ListQuery::new(parse(&self.page), parse(&self.limit))
    }
}

// -------------------------
// Response envelope
// -------------------------

#[derive(Debug, Serialize)]
struct Success<T> {
    status: &'static str,
    data: T,
}

pub fn success<T: Serialize>(status: StatusCode, data: T) -> axum::response::Response {
    (
        status,
        axum::Json(Success {
            status: "success",
            data,
        }),
    )
        .into_response()
}
