use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::models::notification::Notification;
use crate::store::NotificationRepository;

pub mod handlers;

/// Capacity of the generated-batch feed. Slow stream subscribers that fall
/// further behind than this skip batches (they recover via polling).
const FEED_CAPACITY: usize = 64;

/// Shared state of the development store server.
pub struct StoreState {
    pub repo: Arc<dyn NotificationRepository>,
    /// Every generated batch is published here for `/notifications/stream`.
    pub feed: broadcast::Sender<Vec<Notification>>,
}

impl StoreState {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self { repo, feed }
    }
}

/// Build the store REST router.
/// All routes are relative — the caller mounts this under `/api`.
pub fn store_router(state: Arc<StoreState>) -> Router {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications/stream", get(handlers::stream_notifications))
        .route(
            "/notifications/generate",
            post(handlers::generate_notifications),
        )
        .route(
            "/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route("/notifications/:id", delete(handlers::delete_notification))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
        .with_state(state)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
