//! Stream Consumer: subscribes to the gateway's event stream and forwards
//! parsed batches to the controller.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ClientError;
use crate::models::notification::Notification;
use crate::proxy::stream::{SseDecoder, SseFrame};

/// A stream that sends nothing at all, keep-alives included, for this long
/// is treated as dead. Three missed pings.
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// What the stream task reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Response headers received with a success status.
    Opened,
    /// One `data:` event, parsed.
    Batch(Vec<Notification>),
    /// The stream is gone. Always the last message.
    Failed(String),
}

/// Something the controller can subscribe to for notification batches.
pub trait EventSource: Send + Sync {
    /// Start delivering into `tx`. The returned task is aborted by the
    /// controller when it no longer wants events.
    fn subscribe(&self, tx: mpsc::Sender<StreamMessage>) -> JoinHandle<()>;
}

/// The gateway's `/api/notifications/stream` endpoint.
pub struct GatewayStream {
    http: Client,
    url: String,
    idle_timeout: Duration,
}

impl GatewayStream {
    pub fn new(url: impl Into<String>) -> Result<Self, ClientError> {
        // No total timeout; liveness is judged per chunk instead.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
            idle_timeout: STREAM_IDLE_TIMEOUT,
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

impl EventSource for GatewayStream {
    fn subscribe(&self, tx: mpsc::Sender<StreamMessage>) -> JoinHandle<()> {
        let http = self.http.clone();
        let url = self.url.clone();
        let idle_timeout = self.idle_timeout;

        tokio::spawn(async move {
            let reason = match read_stream(&http, &url, idle_timeout, &tx).await {
                Ok(()) => return,
                Err(reason) => reason,
            };
            tracing::warn!(url = %url, "notification stream failed: {}", reason);
            let _ = tx.send(StreamMessage::Failed(reason)).await;
        })
    }
}

/// Runs until the stream fails (`Err`) or the receiver goes away (`Ok`).
/// A clean end of the body counts as a failure: the gateway never closes
/// a healthy stream.
async fn read_stream(
    http: &Client,
    url: &str,
    idle_timeout: Duration,
    tx: &mpsc::Sender<StreamMessage>,
) -> Result<(), String> {
    let resp = http
        .get(url)
        .header(header::ACCEPT, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .send()
        .await
        .map_err(|e| format!("connect failed: {}", e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(format!("gateway returned {}", status));
    }
    if tx.send(StreamMessage::Opened).await.is_err() {
        return Ok(());
    }

    let mut body = resp.bytes_stream();
    let mut decoder = SseDecoder::new();

    loop {
        let chunk = match tokio::time::timeout(idle_timeout, body.next()).await {
            Err(_) => return Err(format!("no data for {:?}", idle_timeout)),
            Ok(None) => return Err("stream closed by gateway".to_string()),
            Ok(Some(Err(e))) => return Err(format!("read failed: {}", e)),
            Ok(Some(Ok(chunk))) => chunk,
        };

        for frame in decoder.push(&chunk) {
            let SseFrame::Data(data) = frame else {
                continue;
            };
            match parse_batch(&data) {
                Ok(batch) => {
                    if tx.send(StreamMessage::Batch(batch)).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => tracing::warn!("skipping malformed stream event: {}", e),
            }
        }
    }
}

/// Decode one event's JSON array. Items that do not decode are logged and
/// dropped; the rest of the batch is kept.
fn parse_batch(data: &str) -> Result<Vec<Notification>, serde_json::Error> {
    let items: Vec<serde_json::Value> = serde_json::from_str(data)?;
    let batch = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Notification>(item) {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!("skipping malformed notification in stream event: {}", e);
                None
            }
        })
        .collect();
    Ok(batch)
}
