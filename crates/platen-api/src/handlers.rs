//! HTTP request handlers, each a thin wrapper over the render service.

use crate::errors::{ApiError, ApiResult};
use crate::models::{
    GeneratePdfRequest, HealthResponse, StatsResponse, SubmitResponse, TaskResponse,
};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tracing::info;

/// `POST /generate_pdf`: create a task, enqueue the render, return 202.
pub async fn generate_pdf(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<GeneratePdfRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let url = payload
        .ok()
        .and_then(|Json(request)| request.url)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing 'url' in request body"))?;

    info!(url = %url, "Received render request");

    let submission = state.service.submit(url, host_prefix(&headers)).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse::from(submission))))
}

/// `GET /pdf_status/{task_id}`.
pub async fn pdf_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state.service.status(&task_id).await?;
    Ok(Json(TaskResponse::from(task)))
}

/// `GET /health`.
pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    let health = state.service.health().await?;
    Ok(Json(HealthResponse::from(health)))
}

/// `GET /stats`.
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsResponse>> {
    let stats = state.service.stats().await?;
    Ok(Json(StatsResponse::from(stats)))
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

/// Artifact URLs are built against whatever host the client reached us on,
/// mirroring the Host header back.
fn host_prefix(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_prefix_reflects_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "pdf.example.com:8080".parse().unwrap());
        assert_eq!(host_prefix(&headers), "http://pdf.example.com:8080/");
    }

    #[test]
    fn host_prefix_defaults_to_localhost() {
        assert_eq!(host_prefix(&HeaderMap::new()), "http://localhost/");
    }
}
