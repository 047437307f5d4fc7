//! HTTP client for opening the upstream store's event stream.
//!
//! No total request timeout: the response body is a long-lived stream and
//! ends when the client or the upstream goes away. Only the connect phase
//! is bounded.
use std::time::Duration;

use axum::http::header::{self, HeaderMap, HeaderName};

use crate::errors::AppError;

/// Request headers that describe the inbound hop rather than the caller,
/// and so must not be forwarded upstream.
const HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    // The body is relayed verbatim, so it must arrive uncompressed.
    "accept-encoding",
];

pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(32)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self { client })
    }

    /// Open `url` as an event stream. Any non-success status is
    /// `UpstreamUnavailable`, same as a refused connection.
    pub async fn open_stream(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<reqwest::Response, AppError> {
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "upstream stream returned {}",
                status
            )));
        }

        Ok(resp)
    }
}

/// Copy the caller's headers (cookies, authorization, custom auth headers)
/// minus hop-by-hop ones.
pub fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if is_hop_header(name) || name == header::ACCEPT || name == header::CACHE_CONTROL {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn is_hop_header(name: &HeaderName) -> bool {
    HOP_HEADERS.contains(&name.as_str())
}
