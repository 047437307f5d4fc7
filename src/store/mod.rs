pub mod memory;
pub mod templates;

use async_trait::async_trait;

use crate::models::notification::Notification;
use templates::NotificationDraft;

/// Abstraction over the notification system of record.
/// Implementations: MemoryStore (process-local, development only).
///
/// The delivery pipeline only ever sees this contract, so swapping the
/// backing store leaves the gateway and the consumer untouched.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// All notifications, most recent first.
    async fn list(&self) -> anyhow::Result<Vec<Notification>>;

    /// Returns `false` if no notification has this id.
    async fn mark_read(&self, id: i64) -> anyhow::Result<bool>;

    /// Returns how many notifications flipped from unread to read.
    async fn mark_all_read(&self) -> anyhow::Result<usize>;

    /// Returns `false` if no notification has this id.
    async fn delete(&self, id: i64) -> anyhow::Result<bool>;

    /// Assign ids and timestamps to the drafts and prepend them.
    async fn insert_batch(&self, drafts: Vec<NotificationDraft>) -> anyhow::Result<Vec<Notification>>;
}
