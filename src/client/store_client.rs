//! Notification Store Client: typed HTTP access to the store's REST surface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{ClientError, NotificationApi};
use crate::models::notification::{Ack, GeneratedBatch, NotificationList};

pub struct StoreClient {
    base_url: String,
    http: Client,
}

/// `{error: "..."}` body the store sends with non-2xx statuses.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl StoreClient {
    /// `base_url` is the store's API root, e.g. `http://localhost:8000/api`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            let snippet: String = body.chars().take(200).collect();
            ClientError::Decode(format!("{} (body: {})", e, snippet))
        })
    }

    async fn send_ack(&self, req: RequestBuilder) -> Result<(), ClientError> {
        let ack: Ack = self.send(req).await?;
        if !ack.success {
            return Err(ClientError::StoreUnavailable {
                status: StatusCode::OK.as_u16(),
                message: "store reported success=false".into(),
            });
        }
        Ok(())
    }
}

fn status_error(status: StatusCode, body: &str) -> ClientError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound,
        StatusCode::BAD_REQUEST => ClientError::InvalidRequest(message),
        _ => ClientError::StoreUnavailable {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl NotificationApi for StoreClient {
    async fn list(&self) -> Result<NotificationList, ClientError> {
        self.send(self.http.get(self.url("/notifications"))).await
    }

    async fn mark_read(&self, id: i64) -> Result<(), ClientError> {
        let url = self.url(&format!("/notifications/{}/read", id));
        self.send_ack(self.http.post(url)).await
    }

    async fn mark_all_read(&self) -> Result<(), ClientError> {
        self.send_ack(self.http.post(self.url("/notifications/read-all")))
            .await
    }

    async fn delete(&self, id: i64) -> Result<(), ClientError> {
        let url = self.url(&format!("/notifications/{}", id));
        self.send_ack(self.http.delete(url)).await
    }

    async fn generate(&self) -> Result<GeneratedBatch, ClientError> {
        self.send(self.http.post(self.url("/notifications/generate")))
            .await
    }
}
