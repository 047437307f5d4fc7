use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Display urgency. `High` + unread is what surfaces a live alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// The unit of delivery. `id` is the merge key everywhere on the client side.
///
/// On the wire this is the flat JSON object the store emits
/// (`{id, type, title, message, timestamp, read, priority, data}`); the
/// `type`/`data` pair is lifted into [`NotificationPayload`] on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireNotification", into = "WireNotification")]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub message: String,
    /// ISO-8601 creation time. Display only, never used for ordering.
    pub timestamp: String,
    pub read: bool,
    pub priority: Priority,
    pub payload: NotificationPayload,
    pub employee_id: Option<i64>,
    pub department: Option<String>,
}

impl Notification {
    /// The opaque `type` string as it appears on the wire.
    pub fn kind(&self) -> &str {
        self.payload.kind()
    }

    pub fn is_unread(&self) -> bool {
        !self.read
    }

    /// High priority and still unread.
    pub fn wants_alert(&self) -> bool {
        self.priority == Priority::High && !self.read
    }
}

#[derive(Serialize, Deserialize)]
struct WireNotification {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    read: bool,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    employee_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    department: Option<String>,
}

impl From<WireNotification> for Notification {
    fn from(w: WireNotification) -> Self {
        Self {
            id: w.id,
            title: w.title,
            message: w.message,
            timestamp: w.timestamp,
            read: w.read,
            priority: w.priority,
            payload: NotificationPayload::from_parts(&w.kind, w.data),
            employee_id: w.employee_id,
            department: w.department,
        }
    }
}

impl From<Notification> for WireNotification {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            kind: n.payload.kind().to_string(),
            data: n.payload.to_data(),
            title: n.title,
            message: n.message,
            timestamp: n.timestamp,
            read: n.read,
            priority: n.priority,
            employee_id: n.employee_id,
            department: n.department,
        }
    }
}

// ── Typed payloads ───────────────────────────────────────────
//
// Every payload keeps unrecognised keys in `extra` so re-serialising a
// notification never drops fields the store added later.

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CouponExpiry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DepartmentAlert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Achievement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_coupons: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageAlert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Auxiliary data keyed by the notification `type`.
///
/// Types this build does not know, and known types whose `data` does not
/// fit the typed shape, land in `Unknown` untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationPayload {
    CouponExpiry(CouponExpiry),
    DepartmentAlert(DepartmentAlert),
    Achievement(Achievement),
    UsageAlert(UsageAlert),
    SystemUpdate(SystemUpdate),
    Unknown { kind: String, data: Value },
}

impl NotificationPayload {
    pub fn from_parts(kind: &str, data: Value) -> Self {
        let parsed = match kind {
            "coupon_expiry" => typed(&data).map(Self::CouponExpiry),
            "department_alert" => typed(&data).map(Self::DepartmentAlert),
            "achievement" => typed(&data).map(Self::Achievement),
            "usage_alert" => typed(&data).map(Self::UsageAlert),
            "system_update" => typed(&data).map(Self::SystemUpdate),
            _ => None,
        };
        parsed.unwrap_or_else(|| Self::Unknown {
            kind: kind.to_string(),
            data,
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::CouponExpiry(_) => "coupon_expiry",
            Self::DepartmentAlert(_) => "department_alert",
            Self::Achievement(_) => "achievement",
            Self::UsageAlert(_) => "usage_alert",
            Self::SystemUpdate(_) => "system_update",
            Self::Unknown { kind, .. } => kind,
        }
    }

    pub fn to_data(&self) -> Value {
        let encoded = match self {
            Self::CouponExpiry(p) => serde_json::to_value(p),
            Self::DepartmentAlert(p) => serde_json::to_value(p),
            Self::Achievement(p) => serde_json::to_value(p),
            Self::UsageAlert(p) => serde_json::to_value(p),
            Self::SystemUpdate(p) => serde_json::to_value(p),
            Self::Unknown { data, .. } => return data.clone(),
        };
        encoded.unwrap_or(Value::Null)
    }
}

fn typed<T: DeserializeOwned>(data: &Value) -> Option<T> {
    match data {
        Value::Null => serde_json::from_value(Value::Object(Map::new())).ok(),
        Value::Object(_) => serde_json::from_value(data.clone()).ok(),
        _ => None,
    }
}

/// Response body of `GET /notifications`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

/// Response body of `POST /notifications/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedBatch {
    pub message: String,
    pub count: usize,
    pub notifications: Vec<Notification>,
}

/// `{success: true}` acknowledgement returned by the mutating endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_store_fixture() {
        let n: Notification = serde_json::from_value(json!({
            "id": 1,
            "type": "coupon_expiry",
            "title": "Coupons Expiring Soon",
            "message": "5 coupons will expire within 24 hours",
            "timestamp": "2024-05-01T10:00:00.000Z",
            "read": false,
            "priority": "high",
            "data": { "count": 5 }
        }))
        .unwrap();

        assert_eq!(n.id, 1);
        assert_eq!(n.kind(), "coupon_expiry");
        assert!(n.wants_alert());
        match &n.payload {
            NotificationPayload::CouponExpiry(p) => assert_eq!(p.count, Some(5)),
            other => panic!("expected coupon payload, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_read_flag_defaults_to_unread() {
        let n: Notification = serde_json::from_value(json!({
            "id": 7,
            "type": "achievement",
            "title": "t",
            "message": "m",
            "priority": "low"
        }))
        .unwrap();
        assert!(n.is_unread());
        assert!(!n.wants_alert());
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let raw = json!({
            "id": 9,
            "type": "billing_digest",
            "title": "t",
            "message": "m",
            "timestamp": "",
            "read": true,
            "priority": "medium",
            "data": { "invoices": [1, 2] }
        });
        let n: Notification = serde_json::from_value(raw).unwrap();
        assert_eq!(n.kind(), "billing_digest");

        let back = serde_json::to_value(&n).unwrap();
        assert_eq!(back["type"], "billing_digest");
        assert_eq!(back["data"]["invoices"], json!([1, 2]));
    }

    #[test]
    fn test_known_type_with_odd_data_falls_back_to_unknown() {
        let payload = NotificationPayload::from_parts("coupon_expiry", json!("five"));
        assert!(matches!(payload, NotificationPayload::Unknown { .. }));
        assert_eq!(payload.kind(), "coupon_expiry");
    }

    #[test]
    fn test_extra_data_keys_survive() {
        let payload = NotificationPayload::from_parts(
            "department_alert",
            json!({ "claim_rate": 58.3, "department": "Sales", "region": "EMEA" }),
        );
        let data = payload.to_data();
        assert_eq!(data["department"], "Sales");
        assert_eq!(data["region"], "EMEA");
    }

    #[test]
    fn test_unknown_priority_is_rejected() {
        let res: Result<Notification, _> = serde_json::from_value(json!({
            "id": 1, "type": "x", "title": "", "message": "", "priority": "urgent"
        }));
        assert!(res.is_err());
    }
}
