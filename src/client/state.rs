//! Client-held notification list.
//!
//! Every update path goes through here: stream batches via
//! [`NotificationState::merge_batch`], store lists via
//! [`NotificationState::apply_snapshot`], and optimistic commands via the
//! `mark_*`/`remove` methods, which hand back an [`Undo`] to either
//! [`NotificationState::confirm`] or [`NotificationState::revert`].
//! No two entries ever share an `id`.
//!
//! A list request may be answered with data older than what the stream has
//! delivered since it was sent. Each change is stamped with a generation;
//! a snapshot carries the generation its request was issued at, and only
//! changes stamped after it survive on top of the snapshot.

use std::collections::{HashMap, HashSet};

use crate::models::notification::Notification;

#[derive(Debug, Default, Clone)]
pub struct NotificationState {
    /// Most-recent-first.
    items: Vec<Notification>,
    /// Ids that can no longer raise an alert: alerted already, or first
    /// seen through a snapshot. Never pruned, so a deleted id that is
    /// delivered again stays quiet.
    seen: HashSet<i64>,
    generation: u64,
    /// Id -> generation it was merged at.
    arrivals: HashMap<i64, u64>,
    /// Optimistic commands, pending or confirmed, in the order applied.
    edits: Vec<Edit>,
}

/// Result of merging one stream batch.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub added: usize,
    /// New high-priority unread notifications, each reported once per id
    /// for the life of the state.
    pub alerts: Vec<Notification>,
}

/// Inverse of an optimistic command.
#[derive(Debug, Clone)]
pub struct Undo {
    stamp: u64,
    change: Change,
}

#[derive(Debug, Clone)]
enum Change {
    Read { id: i64, was_read: bool },
    ReadAll { ids: Vec<i64> },
    Removed { index: usize, notification: Notification },
}

#[derive(Debug, Clone)]
struct Edit {
    stamp: u64,
    /// `None` while the store has not answered.
    confirmed_at: Option<u64>,
    change: Change,
}

impl NotificationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.items.iter().any(|n| n.id == id)
    }

    /// Stamp to hand to [`apply_snapshot`](Self::apply_snapshot) for a list
    /// requested now.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Always recomputed from the merged list; totals sent by the store are
    /// never trusted for the merged view.
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| n.is_unread()).count()
    }

    /// Merge a stream batch. Ids already present are ignored, so applying
    /// the same batch twice is the same as applying it once. New entries
    /// go to the front, keeping their order within the batch.
    pub fn merge_batch(&mut self, batch: Vec<Notification>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut fresh: Vec<Notification> = Vec::new();

        for n in batch {
            if self.contains(n.id) || fresh.iter().any(|f| f.id == n.id) {
                continue;
            }
            if n.wants_alert() && self.seen.insert(n.id) {
                outcome.alerts.push(n.clone());
            }
            fresh.push(n);
        }

        outcome.added = fresh.len();
        if !fresh.is_empty() {
            let at = self.bump();
            for n in &fresh {
                self.arrivals.insert(n.id, at);
            }
            fresh.append(&mut self.items);
            self.items = fresh;
        }
        outcome
    }

    /// Replace local state with a list requested at generation `since`.
    ///
    /// Entries merged after `since` that the list lacks are kept in front,
    /// and commands still pending or confirmed after `since` are applied
    /// again. Never alerts; ids the list carries are marked seen so a later
    /// stream re-delivery stays quiet.
    pub fn apply_snapshot(&mut self, notifications: Vec<Notification>, since: u64) {
        let mut listed: Vec<Notification> = Vec::with_capacity(notifications.len());
        for n in notifications {
            if listed.iter().any(|m| m.id == n.id) {
                continue;
            }
            self.seen.insert(n.id);
            listed.push(n);
        }

        let mut items: Vec<Notification> = self
            .items
            .iter()
            .filter(|n| self.arrivals.get(&n.id).is_some_and(|&at| at > since))
            .filter(|n| !listed.iter().any(|m| m.id == n.id))
            .cloned()
            .collect();
        items.append(&mut listed);
        self.items = items;

        for edit in &self.edits {
            if edit.confirmed_at.map_or(true, |at| at > since) {
                replay(&mut self.items, &edit.change);
            }
        }
    }

    /// Returns `None` when `id` is not held locally.
    pub fn mark_read(&mut self, id: i64) -> Option<Undo> {
        let n = self.items.iter_mut().find(|n| n.id == id)?;
        let was_read = n.read;
        n.read = true;
        Some(self.record(Change::Read { id, was_read }))
    }

    pub fn mark_all_read(&mut self) -> Undo {
        let mut ids = Vec::new();
        for n in self.items.iter_mut().filter(|n| !n.read) {
            n.read = true;
            ids.push(n.id);
        }
        self.record(Change::ReadAll { ids })
    }

    /// Returns `None` when `id` is not held locally.
    pub fn remove(&mut self, id: i64) -> Option<Undo> {
        let index = self.items.iter().position(|n| n.id == id)?;
        let notification = self.items.remove(index);
        Some(self.record(Change::Removed {
            index,
            notification,
        }))
    }

    fn record(&mut self, change: Change) -> Undo {
        let stamp = self.bump();
        self.edits.push(Edit {
            stamp,
            confirmed_at: None,
            change: change.clone(),
        });
        Undo { stamp, change }
    }

    /// The store accepted the command.
    pub fn confirm(&mut self, undo: Undo) {
        let at = self.bump();
        if let Some(edit) = self.edits.iter_mut().find(|e| e.stamp == undo.stamp) {
            edit.confirmed_at = Some(at);
        }
    }

    pub fn revert(&mut self, undo: Undo) {
        self.edits.retain(|e| e.stamp != undo.stamp);
        match undo.change {
            Change::Read { id, was_read } => {
                if let Some(n) = self.items.iter_mut().find(|n| n.id == id) {
                    n.read = was_read;
                }
            }
            Change::ReadAll { ids } => {
                for n in self.items.iter_mut().filter(|n| ids.contains(&n.id)) {
                    n.read = false;
                }
            }
            Change::Removed {
                index,
                notification,
            } => {
                // A newer copy may have arrived meanwhile; keep that one.
                if !self.contains(notification.id) {
                    let index = index.min(self.items.len());
                    self.items.insert(index, notification);
                }
            }
        }
    }

    /// Forget history no outstanding list can predate. `horizon` is the
    /// oldest generation a list still in flight was requested at, or the
    /// current generation when there is none.
    pub fn compact(&mut self, horizon: u64) {
        self.arrivals.retain(|_, at| *at > horizon);
        self.edits
            .retain(|e| e.confirmed_at.map_or(true, |at| at > horizon));
    }
}

fn replay(items: &mut Vec<Notification>, change: &Change) {
    match change {
        Change::Read { id, .. } => {
            if let Some(n) = items.iter_mut().find(|n| n.id == *id) {
                n.read = true;
            }
        }
        Change::ReadAll { ids } => {
            for n in items.iter_mut().filter(|n| ids.contains(&n.id)) {
                n.read = true;
            }
        }
        Change::Removed { notification, .. } => items.retain(|n| n.id != notification.id),
    }
}
