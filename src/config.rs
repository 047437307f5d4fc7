use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the stream gateway binds. Set via NOTIFY_PORT. Default: 8080.
    pub port: u16,
    /// Port the development store binds. Set via NOTIFY_STORE_PORT. Default: 8000.
    pub store_port: u16,
    /// Base URL of the upstream notification store, e.g. `http://localhost:8000/api`.
    /// REST calls and the upstream stream (`/notifications/stream`) hang off it.
    pub upstream_url: String,
    /// Base URL of the stream gateway, used by `watch`.
    pub gateway_url: String,
    /// Dashboard origin allowed by CORS.
    pub cors_origin: String,
}

impl Config {
    /// Upstream store stream endpoint relayed by the gateway.
    pub fn upstream_stream_url(&self) -> String {
        format!("{}/notifications/stream", self.upstream_url)
    }

    /// Gateway stream endpoint opened by the consumer.
    pub fn gateway_stream_url(&self) -> String {
        format!("{}/api/notifications/stream", self.gateway_url)
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let upstream_url = base_url(
        "NOTIFY_UPSTREAM_URL",
        std::env::var("NOTIFY_UPSTREAM_URL").unwrap_or_else(|_| "http://localhost:8000/api".into()),
    )?;
    let gateway_url = base_url(
        "NOTIFY_GATEWAY_URL",
        std::env::var("NOTIFY_GATEWAY_URL").unwrap_or_else(|_| "http://localhost:8080".into()),
    )?;

    Ok(Config {
        port: std::env::var("NOTIFY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080),
        store_port: std::env::var("NOTIFY_STORE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000),
        upstream_url,
        gateway_url,
        cors_origin: std::env::var("NOTIFY_CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".into()),
    })
}

/// Validate a base URL and strip any trailing slash so paths can be appended.
pub fn base_url(var: &str, raw: String) -> anyhow::Result<String> {
    let parsed = url::Url::parse(&raw).with_context(|| format!("{} is not a valid URL: {}", var, raw))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must be an http(s) URL, got scheme '{}'", var, parsed.scheme());
    }
    Ok(raw.trim_end_matches('/').to_string())
}
