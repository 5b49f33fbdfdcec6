//! End-to-end tests for the review API, driven through the full router.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use smartscripts_server::repository::SqliteRepository;
use smartscripts_server::store::MAX_HISTORY_EVENTS;
use smartscripts_server::{app_router, AppState, ReviewStore};
use tower::ServiceExt;

fn memory_app() -> Router {
    app_router(Arc::new(AppState::new(ReviewStore::new())))
}

fn sqlite_app() -> Router {
    let repo = SqliteRepository::new(":memory:").expect("in-memory SQLite should open");
    let store = ReviewStore::with_repository(Arc::new(repo));
    app_router(Arc::new(AppState::new(store)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn post_feedback(app: &Router, submission_id: &str, body: Value) -> (StatusCode, Value) {
    post_raw(app, submission_id, body.to_string()).await
}

async fn post_raw(app: &Router, submission_id: &str, body: String) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(format!("/reviews/{}/feedback", submission_id))
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn test_get_unknown_submission_is_404() {
    let app = memory_app();
    let (status, body) = get(&app, "/reviews/sub404").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"error": "Review not found for submissionId sub404"})
    );
}

#[tokio::test]
async fn test_post_then_get_returns_full_record() {
    for app in [memory_app(), sqlite_app()] {
        let (status, posted) = post_feedback(
            &app,
            "sub1",
            json!({"feedback": "Good job", "comments": ["nice"], "overrides": {"q2": 3}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, fetched) = get(&app, "/reviews/sub1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(posted, fetched);
        assert_eq!(
            fetched,
            json!({
                "studentName": "",
                "totalScore": 0,
                "maxScore": 0,
                "percentage": 0,
                "questions": [],
                "feedback": "Good job",
                "comments": ["nice"],
                "overrides": {"q2": 3}
            })
        );
    }
}

#[tokio::test]
async fn test_feedback_only_on_fresh_submission() {
    let app = memory_app();
    let (status, body) = post_feedback(&app, "fresh", json!({"feedback": "x"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feedback"], "x");
    assert_eq!(body["comments"], json!([]));
    assert_eq!(body["overrides"], json!({}));
    assert_eq!(body["studentName"], "");
    assert_eq!(body["totalScore"], 0);
}

#[tokio::test]
async fn test_non_string_feedback_is_ignored() {
    let app = memory_app();

    let (_, fresh) = post_feedback(&app, "sub1", json!({"feedback": 7})).await;
    assert_eq!(fresh["feedback"], "");

    post_feedback(&app, "sub1", json!({"feedback": "kept"})).await;
    let (status, body) = post_feedback(&app, "sub1", json!({"feedback": {"nested": true}})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feedback"], "kept");
}

#[tokio::test]
async fn test_second_post_replaces_comments_and_overrides() {
    let app = sqlite_app();

    post_feedback(
        &app,
        "sub1",
        json!({"comments": ["first", "second"], "overrides": {"q1": 1, "q2": 2}}),
    )
    .await;
    post_feedback(
        &app,
        "sub1",
        json!({"comments": ["third"], "overrides": {"q3": 4.5}}),
    )
    .await;

    let (_, body) = get(&app, "/reviews/sub1").await;
    assert_eq!(body["comments"], json!(["third"]));
    assert_eq!(body["overrides"], json!({"q3": 4.5}));
}

#[tokio::test]
async fn test_malformed_fields_leave_previous_values() {
    let app = memory_app();

    post_feedback(
        &app,
        "sub1",
        json!({"feedback": "f", "comments": ["c"], "overrides": {"q1": 1}}),
    )
    .await;
    let (status, body) = post_feedback(
        &app,
        "sub1",
        json!({"feedback": null, "comments": "c2", "overrides": null, "studentName": "Mallory"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feedback"], "f");
    assert_eq!(body["comments"], json!(["c"]));
    assert_eq!(body["overrides"], json!({"q1": 1}));
    assert_eq!(body["studentName"], "");
}

#[tokio::test]
async fn test_mixed_comments_and_string_scores_are_stored_as_posted() {
    for app in [memory_app(), sqlite_app()] {
        let (status, _) = post_feedback(
            &app,
            "sub1",
            json!({"comments": ["ok", 3], "overrides": {"q2": "3"}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = get(&app, "/reviews/sub1").await;
        assert_eq!(body["comments"], json!(["ok", 3]));
        assert_eq!(body["overrides"], json!({"q2": "3"}));
    }
}

#[tokio::test]
async fn test_unparseable_body_creates_default_review() {
    let app = memory_app();
    let (status, body) = post_raw(&app, "sub1", "{oops".to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feedback"], "");

    let (status, _) = get(&app, "/reviews/sub1").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_submission_ids_are_percent_decoded() {
    let app = memory_app();
    post_feedback(&app, "exam%201", json!({"feedback": "spaced"})).await;

    let (status, body) = get(&app, "/reviews/exam%201").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feedback"], "spaced");

    let (_, list) = get(&app, "/reviews").await;
    assert_eq!(list["reviews"][0]["submissionId"], "exam 1");
}

#[tokio::test]
async fn test_list_reviews() {
    let app = memory_app();
    post_feedback(&app, "b", json!({"comments": ["x", "y"]})).await;
    post_feedback(&app, "a", json!({"overrides": {"q1": 2}})).await;

    let (status, body) = get(&app, "/reviews").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], smartscripts_server::get_service_version());

    let reviews = body["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0]["submissionId"], "a");
    assert_eq!(reviews[0]["overrideCount"], 1);
    assert_eq!(reviews[1]["submissionId"], "b");
    assert_eq!(reviews[1]["commentCount"], 2);
}

#[tokio::test]
async fn test_history_tracks_override_changes() {
    let app = sqlite_app();
    post_feedback(&app, "sub1", json!({"overrides": {"q2": 3}})).await;
    post_feedback(&app, "sub1", json!({"overrides": {"q2": 4}})).await;

    let (status, body) = get(&app, "/reviews/sub1/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["submissionId"], "sub1");

    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 5);
    assert_eq!(
        events[0]["eventType"],
        json!({"type": "OverridesReplaced", "data": {"previous": {"q2": 3}, "current": {"q2": 4}}})
    );
    assert_eq!(events[4]["eventType"], json!({"type": "Created"}));

    let (_, limited) = get(&app, "/reviews/sub1/history?limit=1").await;
    assert_eq!(limited["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_limit_cannot_exceed_cap() {
    let app = sqlite_app();
    for i in 0..MAX_HISTORY_EVENTS {
        post_feedback(&app, "sub1", json!({ "feedback": format!("draft {}", i) })).await;
    }

    let (status, body) = get(&app, "/reviews/sub1/history?limit=500").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"].as_array().unwrap().len(), MAX_HISTORY_EVENTS);

    let (_, unlimited) = get(&app, "/reviews/sub1/history").await;
    assert_eq!(
        unlimited["events"].as_array().unwrap().len(),
        MAX_HISTORY_EVENTS
    );
}

#[tokio::test]
async fn test_history_unknown_submission_is_404() {
    let app = memory_app();
    let (status, body) = get(&app, "/reviews/ghost/history").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Review not found for submissionId ghost");
}

#[tokio::test]
async fn test_health_and_help() {
    let app = memory_app();

    let (status, health) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");

    let (status, help) = get(&app, "/help").await;
    assert_eq!(status, StatusCode::OK);
    assert!(help["endpoints"].as_array().unwrap().len() >= 4);
}

#[tokio::test]
async fn test_stores_are_isolated_between_apps() {
    let first = memory_app();
    let second = memory_app();

    post_feedback(&first, "sub1", json!({"feedback": "only here"})).await;

    let (status, _) = get(&second, "/reviews/sub1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
