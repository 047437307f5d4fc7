//! HTTP layers shared by the gateway and the development store.

use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::{self as axum_mw, Next};
use axum::response::Response;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Wrap a router with CORS, request ids and security headers.
pub fn apply(router: Router, dashboard_origin: &str) -> Router {
    router
        .layer(cors(dashboard_origin))
        .layer(axum_mw::from_fn(request_id))
        .layer(axum_mw::from_fn(security_headers))
}

/// Allow the dashboard origin plus any local dev origin. Credentials are
/// allowed so cookies reach the gateway and get forwarded upstream.
pub fn cors(dashboard_origin: &str) -> CorsLayer {
    let dashboard_origin = dashboard_origin.to_string();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            origin_str == dashboard_origin
                || origin_str.starts_with("http://localhost:")
                || origin_str.starts_with("http://127.0.0.1:")
        }))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::CACHE_CONTROL,
            HeaderName::from_static("x-dashboard-token"),
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
}

/// Stamp every response with a fresh `x-request-id`.
pub async fn request_id(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Security headers on every response.
pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));

    // Event streams set their own Cache-Control
    if !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    headers.remove(header::SERVER);
    resp
}
