use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use super::stream::data_frame;
use super::stream_bridge::relay;
use super::upstream::{forwardable_headers, UpstreamClient};
use crate::models::notification::{Notification, NotificationPayload, Priority};

pub struct GatewayState {
    pub upstream: UpstreamClient,
    /// Upstream `/notifications/stream` URL.
    pub stream_url: String,
}

/// GET /api/notifications/stream
///
/// Always answers 200 with an event stream. Upstream trouble shows up in
/// the body (placeholder event, then keep-alives), never in the status.
pub async fn notification_stream(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    let forwarded = forwardable_headers(&headers);
    let connect = async move {
        state
            .upstream
            .open_stream(&state.stream_url, forwarded)
            .await
            .map(|resp| resp.bytes_stream())
    };

    sse_response(relay(connect, fallback_frame()))
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::encode_metrics(),
    )
}

/// Wrap a body in the event-stream response headers.
pub fn sse_response(body: Body) -> Response {
    let mut resp = body.into_response();
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    // Disable proxy buffering (nginx)
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    resp
}

/// Placeholder sent when the upstream stream cannot be opened.
///
/// Ids are negative (`-unix_millis`) so they never collide with the
/// store's positive ids.
pub fn fallback_notification() -> Notification {
    let now = Utc::now();
    Notification {
        id: -now.timestamp_millis(),
        title: "Coupons Expiring Soon".into(),
        message: "5 coupons will expire within 24 hours".into(),
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        read: false,
        priority: Priority::High,
        payload: NotificationPayload::from_parts("coupon_expiry", json!({ "count": 5 })),
        employee_id: None,
        department: None,
    }
}

fn fallback_frame() -> Bytes {
    match serde_json::to_string(&[fallback_notification()]) {
        Ok(json) => data_frame(&json),
        Err(e) => {
            tracing::error!("failed to encode placeholder notification: {}", e);
            data_frame("[]")
        }
    }
}
