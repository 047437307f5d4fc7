use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use super::StoreState;
use crate::errors::AppError;
use crate::models::notification::{Ack, GeneratedBatch, NotificationList};
use crate::proxy::PING_INTERVAL;
use crate::store::templates::{random_drafts, GENERATE_COUNT};

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::InvalidRequest("Invalid notification ID".to_string()))
}

// ── Notification Handlers ────────────────────────────────────

/// GET /api/notifications — every notification plus the unread total
pub async fn list_notifications(
    State(state): State<Arc<StoreState>>,
) -> Result<Json<NotificationList>, AppError> {
    let notifications = state.repo.list().await?;
    let unread_count = notifications.iter().filter(|n| !n.read).count();
    Ok(Json(NotificationList {
        notifications,
        unread_count,
    }))
}

/// POST /api/notifications/:id/read — mark as read
pub async fn mark_notification_read(
    State(state): State<Arc<StoreState>>,
    Path(id_str): Path<String>,
) -> Result<Json<Ack>, AppError> {
    let id = parse_id(&id_str)?;
    if !state.repo.mark_read(id).await? {
        return Err(AppError::NotFound);
    }
    tracing::debug!(id, "notification marked read");
    Ok(Json(Ack { success: true }))
}

/// POST /api/notifications/read-all — mark all as read
pub async fn mark_all_notifications_read(
    State(state): State<Arc<StoreState>>,
) -> Result<Json<Ack>, AppError> {
    let flipped = state.repo.mark_all_read().await?;
    tracing::debug!(flipped, "all notifications marked read");
    Ok(Json(Ack { success: true }))
}

/// DELETE /api/notifications/:id
pub async fn delete_notification(
    State(state): State<Arc<StoreState>>,
    Path(id_str): Path<String>,
) -> Result<Json<Ack>, AppError> {
    let id = parse_id(&id_str)?;
    if !state.repo.delete(id).await? {
        return Err(AppError::NotFound);
    }
    tracing::debug!(id, "notification deleted");
    Ok(Json(Ack { success: true }))
}

/// POST /api/notifications/generate — development only
pub async fn generate_notifications(
    State(state): State<Arc<StoreState>>,
) -> Result<Json<GeneratedBatch>, AppError> {
    let drafts = random_drafts(&mut rand::thread_rng(), GENERATE_COUNT);
    let created = state.repo.insert_batch(drafts).await?;

    // No subscribers is not an error; the batch is still in the store.
    let receivers = state.feed.send(created.clone()).unwrap_or(0);
    tracing::info!(
        count = created.len(),
        receivers,
        "generated notifications"
    );

    Ok(Json(GeneratedBatch {
        message: "Notifications generated successfully".to_string(),
        count: created.len(),
        notifications: created,
    }))
}

// ── Store Event Feed (SSE) ───────────────────────────────────

/// GET /api/notifications/stream — every generated batch as one `data:` event
pub async fn stream_notifications(
    State(state): State<Arc<StoreState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.feed.subscribe()).filter_map(|batch| async move {
        match batch {
            Ok(batch) => match serde_json::to_string(&batch) {
                Ok(data) => Some(Ok(Event::default().data(data))),
                Err(e) => {
                    tracing::error!("failed to encode notification batch: {}", e);
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "store feed subscriber lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(PING_INTERVAL).text(" ping"))
}
