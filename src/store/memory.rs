//! Process-local notification store.
//!
//! Stand-in for a real system of record: state lives in one `RwLock`ed
//! vector and resets on restart.

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::json;
use tokio::sync::RwLock;

use super::templates::NotificationDraft;
use super::NotificationRepository;
use crate::models::notification::{Notification, NotificationPayload, Priority};

#[derive(Default)]
pub struct MemoryStore {
    table: RwLock<Table>,
}

#[derive(Default)]
struct Table {
    rows: Vec<Notification>,
    /// Highest id ever issued. Ids are never reissued within a process,
    /// even after the row holding them is deleted.
    high_water: i64,
}

impl MemoryStore {
    pub fn new(rows: Vec<Notification>) -> Self {
        let high_water = rows.iter().map(|n| n.id).max().unwrap_or(0).max(0);
        Self {
            table: RwLock::new(Table { rows, high_water }),
        }
    }

    /// Store preloaded with the three development fixtures.
    pub fn seeded() -> Self {
        Self::new(fixtures())
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn list(&self) -> anyhow::Result<Vec<Notification>> {
        Ok(self.table.read().await.rows.clone())
    }

    async fn mark_read(&self, id: i64) -> anyhow::Result<bool> {
        let mut table = self.table.write().await;
        match table.rows.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self) -> anyhow::Result<usize> {
        let mut table = self.table.write().await;
        let mut flipped = 0;
        for n in table.rows.iter_mut().filter(|n| !n.read) {
            n.read = true;
            flipped += 1;
        }
        Ok(flipped)
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let mut table = self.table.write().await;
        let before = table.rows.len();
        table.rows.retain(|n| n.id != id);
        Ok(table.rows.len() != before)
    }

    async fn insert_batch(&self, drafts: Vec<NotificationDraft>) -> anyhow::Result<Vec<Notification>> {
        let mut table = self.table.write().await;
        let next = table.high_water + 1;
        let timestamp = iso_now(Duration::zero());

        let created: Vec<Notification> = drafts
            .into_iter()
            .enumerate()
            .map(|(i, d)| Notification {
                id: next + i as i64,
                title: d.title,
                message: d.message,
                timestamp: timestamp.clone(),
                read: false,
                priority: d.priority,
                payload: d.payload,
                employee_id: None,
                department: None,
            })
            .collect();

        table.high_water += created.len() as i64;
        let mut merged = created.clone();
        merged.append(&mut table.rows);
        table.rows = merged;

        Ok(created)
    }
}

fn iso_now(ago: Duration) -> String {
    (Utc::now() - ago).to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn fixtures() -> Vec<Notification> {
    vec![
        Notification {
            id: 1,
            title: "Coupons Expiring Soon".into(),
            message: "5 coupons will expire within 24 hours".into(),
            timestamp: iso_now(Duration::zero()),
            read: false,
            priority: Priority::High,
            payload: NotificationPayload::from_parts("coupon_expiry", json!({ "count": 5 })),
            employee_id: None,
            department: None,
        },
        Notification {
            id: 2,
            title: "Department Performance Alert".into(),
            message: "Marketing has a low claim rate of 65.5%".into(),
            timestamp: iso_now(Duration::hours(1)),
            read: false,
            priority: Priority::Medium,
            payload: NotificationPayload::from_parts("department_alert", json!({ "claim_rate": 65.5 })),
            employee_id: None,
            department: None,
        },
        Notification {
            id: 3,
            title: "Perfect Performance!".into(),
            message: "John Doe from Engineering has 100% claim rate!".into(),
            timestamp: iso_now(Duration::hours(2)),
            read: true,
            priority: Priority::Low,
            payload: NotificationPayload::from_parts(
                "achievement",
                json!({ "claim_rate": 100, "total_coupons": 12 }),
            ),
            employee_id: None,
            department: None,
        },
    ]
}
