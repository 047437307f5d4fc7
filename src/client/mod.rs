//! Client half of the delivery pipeline: the typed store client, the
//! gateway stream consumer, and the controller that reconciles the two
//! into one local notification list.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::notification::{GeneratedBatch, NotificationList};

pub mod consumer;
pub mod controller;
pub mod state;
pub mod store_client;

pub use consumer::{EventSource, GatewayStream, StreamMessage};
pub use controller::{ConnectionState, ControllerHandle, Snapshot};
pub use state::NotificationState;
pub use store_client::StoreClient;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Notification not found")]
    NotFound,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store unavailable ({status}): {message}")]
    StoreUnavailable { status: u16, message: String },

    #[error("failed to decode store response: {0}")]
    Decode(String),

    #[error("notification controller has shut down")]
    Closed,
}

impl ClientError {
    /// The store answered and refused the operation. Anything else means
    /// the outcome is unknown and local state should be re-synced.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::NotFound | ClientError::InvalidRequest(_))
    }
}

/// The store's REST surface. One request per call, no retries.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list(&self) -> Result<NotificationList, ClientError>;
    async fn mark_read(&self, id: i64) -> Result<(), ClientError>;
    async fn mark_all_read(&self) -> Result<(), ClientError>;
    async fn delete(&self, id: i64) -> Result<(), ClientError>;
    async fn generate(&self) -> Result<GeneratedBatch, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections() {
        assert!(ClientError::NotFound.is_rejection());
        assert!(ClientError::InvalidRequest("Invalid notification ID".into()).is_rejection());
        assert!(!ClientError::StoreUnavailable {
            status: 503,
            message: "down".into()
        }
        .is_rejection());
        assert!(!ClientError::Closed.is_rejection());
    }
}
