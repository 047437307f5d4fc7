//! Terminal rendering of the notification center for `watch`.

use std::fmt::Write;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::client::{ConnectionState, Snapshot};
use crate::models::notification::{Notification, Priority};

/// Which notifications the list shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Unread,
    /// Exact `type` match.
    Kind(String),
}

impl Filter {
    pub fn matches(&self, n: &Notification) -> bool {
        match self {
            Filter::All => true,
            Filter::Unread => n.is_unread(),
            Filter::Kind(kind) => n.kind() == kind,
        }
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("filter must not be empty".to_string()),
            "all" => Ok(Filter::All),
            "unread" => Ok(Filter::Unread),
            kind => Ok(Filter::Kind(kind.to_string())),
        }
    }
}

/// "Just now", "Xm ago", "Xh ago" or "Xd ago". Timestamps that do not
/// parse, or lie in the future, read as "Just now".
pub fn age_label(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(at) = DateTime::parse_from_rfc3339(timestamp) else {
        return "Just now".to_string();
    };
    let diff = now.signed_duration_since(at.with_timezone(&Utc));

    let minutes = diff.num_minutes();
    let hours = diff.num_hours();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else {
        format!("{}d ago", diff.num_days())
    }
}

/// Unread badge; hidden at zero, capped at "99+".
pub fn badge_text(unread: usize) -> Option<String> {
    match unread {
        0 => None,
        1..=99 => Some(unread.to_string()),
        _ => Some("99+".to_string()),
    }
}

pub fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connecting => "Connecting",
        ConnectionState::Connected => "Connected",
        ConnectionState::DegradedPolling => "Polling",
    }
}

pub fn priority_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "!!",
        Priority::Medium => "! ",
        Priority::Low => "  ",
    }
}

/// Full notification center view.
pub fn render(snapshot: &Snapshot, filter: &Filter, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    let _ = write!(out, "Notifications [{}]", connection_label(snapshot.connection));
    if let Some(badge) = badge_text(snapshot.unread_count) {
        let _ = write!(out, " ({} unread)", badge);
    }
    out.push('\n');

    let visible: Vec<&Notification> = snapshot
        .notifications
        .iter()
        .filter(|n| filter.matches(n))
        .collect();

    if visible.is_empty() {
        match filter {
            Filter::All => out.push_str("  No notifications\n"),
            _ => out.push_str("  No notifications match this filter\n"),
        }
        return out;
    }

    for n in visible {
        let unread = if n.read { ' ' } else { '*' };
        let _ = writeln!(
            out,
            "{}{} #{:<4} {:<14} {} ({})",
            unread,
            priority_marker(n.priority),
            n.id,
            n.kind(),
            n.title,
            age_label(&n.timestamp, now)
        );
        if !n.message.is_empty() {
            let _ = writeln!(out, "         {}", n.message);
        }
    }
    out
}

/// One-line toast for a high priority arrival.
pub fn render_alert(n: &Notification) -> String {
    format!("[ALERT] {}: {}", n.title, n.message)
}
