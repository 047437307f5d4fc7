//! Stream gateway against a mock upstream store.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header as h, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use futures::StreamExt;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notify_gateway::models::notification::{Notification, Priority};
use notify_gateway::proxy::upstream::UpstreamClient;
use notify_gateway::proxy::{gateway_router, GatewayState};

const UPSTREAM_BODY: &str = concat!(
    "data: [{\"id\":7,\"type\":\"achievement\",\"title\":\"Perfect Performance!\",",
    "\"message\":\"m\",\"timestamp\":\"2024-05-01T11:00:00.000Z\",\"read\":false,",
    "\"priority\":\"low\",\"data\":{\"claim_rate\":100}}]\n\n",
    ": keep-alive\n\n",
);

fn gateway(stream_url: String) -> Router {
    gateway_router(Arc::new(GatewayState {
        upstream: UpstreamClient::new().unwrap(),
        stream_url,
    }))
}

/// Open the stream the way the dashboard does, with credentials attached.
async fn open(app: Router) -> Response {
    app.oneshot(
        Request::builder()
            .uri("/api/notifications/stream")
            .header(h::AUTHORIZATION, "Bearer abc")
            .header(h::COOKIE, "session=1")
            .header("x-dashboard-token", "dash")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

fn assert_sse_headers(resp: &Response) {
    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert_eq!(headers[h::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[h::CACHE_CONTROL], "no-cache, no-transform");
    assert_eq!(headers[h::CONNECTION], "keep-alive");
    assert_eq!(headers["x-accel-buffering"], "no");
}

#[tokio::test]
async fn test_relays_upstream_verbatim_with_forwarded_credentials() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications/stream"))
        .and(header("authorization", "Bearer abc"))
        .and(header("cookie", "session=1"))
        .and(header("x-dashboard-token", "dash"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(UPSTREAM_BODY, "text/event-stream"))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = gateway(format!("{}/api/notifications/stream", upstream.uri()));
    let resp = open(app).await;
    assert_sse_headers(&resp);

    // Upstream ends, so the relayed body ends too
    let body = tokio::time::timeout(
        Duration::from_secs(5),
        to_bytes(resp.into_body(), usize::MAX),
    )
    .await
    .expect("gateway did not close after upstream ended")
    .unwrap();
    assert_eq!(std::str::from_utf8(&body).unwrap(), UPSTREAM_BODY);
}

async fn assert_single_placeholder(resp: Response) {
    assert_sse_headers(&resp);

    let mut frames = resp.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(5), frames.next())
        .await
        .expect("no placeholder event")
        .unwrap()
        .unwrap();

    let text = std::str::from_utf8(&first).unwrap();
    let json = text
        .strip_prefix("data: ")
        .and_then(|t| t.strip_suffix("\n\n"))
        .expect("not a data frame");
    let batch: Vec<Notification> = serde_json::from_str(json).unwrap();
    assert_eq!(batch.len(), 1);
    assert!(batch[0].id < 0);
    assert_eq!(batch[0].kind(), "coupon_expiry");
    assert_eq!(batch[0].priority, Priority::High);
    assert!(!batch[0].read);

    // Nothing else until the first keep-alive, 30s out
    assert!(
        tokio::time::timeout(Duration::from_millis(300), frames.next())
            .await
            .is_err(),
        "unexpected second event"
    );
}

#[tokio::test]
async fn test_upstream_error_status_degrades_to_placeholder() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications/stream"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = gateway(format!("{}/api/notifications/stream", upstream.uri()));
    assert_single_placeholder(open(app).await).await;
}

#[tokio::test]
async fn test_unreachable_upstream_degrades_to_placeholder() {
    let app = gateway("http://127.0.0.1:1/api/notifications/stream".into());
    assert_single_placeholder(open(app).await).await;
}

#[tokio::test]
async fn test_slow_upstream_does_not_block_headers() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(UPSTREAM_BODY, "text/event-stream")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&upstream)
        .await;

    let app = gateway(format!("{}/api/notifications/stream", upstream.uri()));
    let resp = tokio::time::timeout(Duration::from_secs(1), open(app))
        .await
        .expect("headers waited on the upstream");
    assert_sse_headers(&resp);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = gateway("http://127.0.0.1:1/api/notifications/stream".into());
    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Open one stream so the stream metrics exist
    let stream = open(app.clone()).await;
    let _first = stream.into_body().into_data_stream().next().await;

    let resp = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("notify_gateway_streams_total"));
    assert!(text.contains("notify_gateway_fallback_events_total"));
}
