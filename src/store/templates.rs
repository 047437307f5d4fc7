//! Canned notifications used by `POST /notifications/generate`.
//!
//! Picks a family uniformly, then a template within it, so every
//! family is equally likely regardless of how many templates it has.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};

use crate::models::notification::{NotificationPayload, Priority};

/// How many notifications a single generate call produces.
pub const GENERATE_COUNT: usize = 3;

/// A notification without an id or timestamp; the store assigns those.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub payload: NotificationPayload,
}

struct Template {
    title: &'static str,
    message: &'static str,
    priority: Priority,
    data: Value,
}

struct Family {
    kind: &'static str,
    templates: Vec<Template>,
}

static FAMILIES: Lazy<Vec<Family>> = Lazy::new(|| {
    vec![
        Family {
            kind: "coupon_expiry",
            templates: vec![
                Template {
                    title: "Coupons Expiring Soon",
                    message: "12 coupons will expire within 24 hours",
                    priority: Priority::High,
                    data: json!({ "count": 12 }),
                },
                Template {
                    title: "Urgent: Coupons Expiring Today",
                    message: "8 coupons expire at midnight today",
                    priority: Priority::High,
                    data: json!({ "count": 8 }),
                },
                Template {
                    title: "Weekly Expiry Alert",
                    message: "25 coupons will expire this week",
                    priority: Priority::Medium,
                    data: json!({ "count": 25 }),
                },
            ],
        },
        Family {
            kind: "department_alert",
            templates: vec![
                Template {
                    title: "Department Performance Alert",
                    message: "Sales department has a low claim rate of 58.3%",
                    priority: Priority::Medium,
                    data: json!({ "claim_rate": 58.3, "department": "Sales" }),
                },
                Template {
                    title: "Low Engagement Warning",
                    message: "HR department claim rate dropped to 45.2%",
                    priority: Priority::High,
                    data: json!({ "claim_rate": 45.2, "department": "HR" }),
                },
                Template {
                    title: "Department Review Needed",
                    message: "Finance department showing declining coupon usage",
                    priority: Priority::Medium,
                    data: json!({ "department": "Finance" }),
                },
            ],
        },
        Family {
            kind: "achievement",
            templates: vec![
                Template {
                    title: "Perfect Performance!",
                    message: "Sarah Johnson from Marketing has 100% claim rate!",
                    priority: Priority::Low,
                    data: json!({ "claim_rate": 100, "employee": "Sarah Johnson", "department": "Marketing" }),
                },
                Template {
                    title: "Top Performer Alert",
                    message: "Mike Chen from Engineering achieved 95% claim rate",
                    priority: Priority::Low,
                    data: json!({ "claim_rate": 95, "employee": "Mike Chen", "department": "Engineering" }),
                },
                Template {
                    title: "Monthly Champion",
                    message: "Lisa Wang leads with highest coupon usage this month",
                    priority: Priority::Low,
                    data: json!({ "employee": "Lisa Wang" }),
                },
            ],
        },
        Family {
            kind: "system_update",
            templates: vec![
                Template {
                    title: "System Maintenance Scheduled",
                    message: "Coupon system will be offline for maintenance on Sunday 2AM-4AM",
                    priority: Priority::Medium,
                    data: json!({ "maintenance_window": "Sunday 2AM-4AM" }),
                },
                Template {
                    title: "New Feature Available",
                    message: "Mobile app now supports QR code scanning for faster redemption",
                    priority: Priority::Low,
                    data: json!({ "feature": "QR scanning" }),
                },
                Template {
                    title: "Security Update",
                    message: "Enhanced security measures have been implemented",
                    priority: Priority::Medium,
                    data: json!({ "update_type": "security" }),
                },
            ],
        },
    ]
});

pub fn random_drafts<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<NotificationDraft> {
    let mut drafts = Vec::with_capacity(count);
    for _ in 0..count {
        let Some(family) = FAMILIES.choose(rng) else {
            break;
        };
        let Some(template) = family.templates.choose(rng) else {
            continue;
        };
        drafts.push(NotificationDraft {
            title: template.title.to_string(),
            message: template.message.to_string(),
            priority: template.priority,
            payload: NotificationPayload::from_parts(family.kind, template.data.clone()),
        });
    }
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generates_requested_count() {
        let mut rng = StdRng::seed_from_u64(7);
        let drafts = random_drafts(&mut rng, GENERATE_COUNT);
        assert_eq!(drafts.len(), 3);
    }

    #[test]
    fn test_drafts_are_typed() {
        let mut rng = StdRng::seed_from_u64(42);
        for draft in random_drafts(&mut rng, 50) {
            assert!(
                !matches!(draft.payload, NotificationPayload::Unknown { .. }),
                "template '{}' produced an untyped payload",
                draft.title
            );
        }
    }

    #[test]
    fn test_every_family_has_three_templates() {
        assert_eq!(FAMILIES.len(), 4);
        for f in FAMILIES.iter() {
            assert_eq!(f.templates.len(), 3, "family {}", f.kind);
        }
    }
}
