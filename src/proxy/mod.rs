//! Stream Gateway: relays the upstream store's event stream to dashboard
//! clients, with keep-alives and a placeholder event when the upstream is
//! down.

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub mod handler;
pub mod stream;
pub mod stream_bridge;
pub mod upstream;

pub use handler::GatewayState;

/// Interval between `: ping` keep-alive frames.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Build the gateway router.
pub fn gateway_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route(
            "/api/notifications/stream",
            get(handler::notification_stream),
        )
        .route("/healthz", get(handler::health))
        .route("/metrics", get(handler::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
