//! HTTP handlers for the review API.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use smartscripts_core::{
    ErrorResponse, FeedbackUpdate, ReviewHistoryResponse, ReviewListResponse, ReviewRecord,
    SubmissionId,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::repository::RepositoryError;
use crate::store::MAX_HISTORY_EVENTS;
use crate::AppState;

fn not_found(submission_id: &SubmissionId) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::review_not_found(submission_id)),
    )
        .into_response()
}

/// Log a repository failure and turn it into a 500 without leaking details.
fn storage_failure(
    action: &str,
    submission_id: Option<&SubmissionId>,
    e: RepositoryError,
) -> Response {
    match submission_id {
        Some(id) => error!("Failed to {} for submission {}: {}", action, id, e),
        None => error!("Failed to {}: {}", action, e),
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(format!("Failed to {}", action))),
    )
        .into_response()
}

/// Handler: GET /reviews/:submission_id
pub async fn get_review(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> Result<Json<ReviewRecord>, Response> {
    let id = SubmissionId::from(submission_id);

    match state.store.get(&id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(not_found(&id)),
        Err(e) => Err(storage_failure("load review", Some(&id), e)),
    }
}

/// Handler: POST /reviews/:submission_id/feedback
///
/// The body is read as raw bytes and parsed leniently: fields of the wrong
/// type, and bodies that are not JSON objects, are ignored rather than
/// rejected. The review is created if it doesn't exist yet.
pub async fn post_feedback(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
    body: Bytes,
) -> Result<Json<ReviewRecord>, Response> {
    let id = SubmissionId::from(submission_id);
    let update = FeedbackUpdate::from_slice(&body);

    if update.is_empty() && !body.is_empty() {
        info!(
            "Feedback for submission {} carried no usable fields ({} bytes)",
            id,
            body.len()
        );
    }

    state
        .store
        .upsert(&id, &update)
        .await
        .map(Json)
        .map_err(|e| storage_failure("save feedback", Some(&id), e))
}

/// Handler: GET /reviews
pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReviewListResponse>, Response> {
    let reviews = state
        .store
        .summaries()
        .await
        .map_err(|e| storage_failure("list reviews", None, e))?;

    Ok(Json(ReviewListResponse {
        version: crate::get_service_version().to_string(),
        reviews,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// Handler: GET /reviews/:submission_id/history
///
/// Returns the audit trail, newest first. `?limit=` caps the number of
/// events (at most 100).
pub async fn get_review_history(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ReviewHistoryResponse>, Response> {
    let id = SubmissionId::from(submission_id);

    let exists = state
        .store
        .get(&id)
        .await
        .map_err(|e| storage_failure("load review", Some(&id), e))?
        .is_some();
    if !exists {
        return Err(not_found(&id));
    }

    let events = state
        .store
        .history(&id, params.limit.unwrap_or(MAX_HISTORY_EVENTS))
        .await
        .map_err(|e| storage_failure("load review history", Some(&id), e))?;

    Ok(Json(ReviewHistoryResponse {
        submission_id: id,
        events,
    }))
}

/// Handler: GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "smartscripts-reviews"
    }))
}

/// Handler: GET /help
pub async fn help_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "smartscripts-reviews",
        "version": crate::get_service_version(),
        "description": "Teacher review, feedback and score override store for SmartScripts",
        "endpoints": [
            {
                "path": "/reviews/:submissionId",
                "method": "GET",
                "description": "Fetch the review for a submission (404 if none exists)"
            },
            {
                "path": "/reviews/:submissionId/feedback",
                "method": "POST",
                "description": "Create or update a review; body {feedback?, comments?, overrides?}"
            },
            {
                "path": "/reviews",
                "method": "GET",
                "description": "List all reviews with score summaries"
            },
            {
                "path": "/reviews/:submissionId/history",
                "method": "GET",
                "description": "Audit trail of feedback and override changes, newest first"
            },
            {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint"
            },
            {
                "path": "/help",
                "method": "GET",
                "description": "API documentation and service information"
            }
        ],
        "configuration": {
            "optional_env_vars": [
                "PORT (default: 3000)",
                "BIND_ADDRESS (default: 0.0.0.0)",
                "REVIEW_DB_PATH (default: unset, reviews held in memory)"
            ]
        }
    }))
}
