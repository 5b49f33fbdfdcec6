pub mod config;
pub mod handlers;
pub mod repository;
pub mod store;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use store::ReviewStore;

pub fn get_service_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct AppState {
    pub store: Arc<ReviewStore>,
}

impl AppState {
    pub fn new(store: ReviewStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

/// Build the service router with request tracing.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/help", get(handlers::help_handler))
        .route("/reviews", get(handlers::list_reviews))
        .route("/reviews/:submission_id", get(handlers::get_review))
        .route(
            "/reviews/:submission_id/feedback",
            post(handlers::post_feedback),
        )
        .route(
            "/reviews/:submission_id/history",
            get(handlers::get_review_history),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
