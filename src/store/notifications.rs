//! In-memory notification store.
//!
//! Records are keyed by id with a separate arrival-order index (front =
//! newest arrival). Ordering follows arrival, not the embedded timestamp.
//! There is no eviction: the store lives as long as the feed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{Notification, NotificationId, Tab};
use crate::store::pending::{AckLedger, AckTicket};

/// Result of inserting a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Id already present: fields refreshed in place, position unchanged.
    Updated,
}

#[derive(Debug, Default)]
pub struct NotificationStore {
    records: HashMap<NotificationId, Notification>,
    order: VecDeque<NotificationId>,
    acks: AckLedger,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.records.get(id)
    }

    /// Insert at the head. A known id is updated in place instead; its read
    /// flag never goes back to false through a delivery.
    ///
    /// A delivery carrying `read: true` is backend-confirmed state, so it
    /// settles any acknowledgement still pending for that id.
    pub fn prepend(&mut self, notification: Notification) -> InsertOutcome {
        if notification.read && self.acks.settle(&notification.id) {
            tracing::debug!(id = %notification.id, "pending read confirmed by delivery");
        }
        if let Some(existing) = self.records.get_mut(&notification.id) {
            let read = existing.read || notification.read;
            *existing = notification;
            existing.read = read;
            return InsertOutcome::Updated;
        }

        self.order.push_front(notification.id.clone());
        self.records.insert(notification.id.clone(), notification);
        InsertOutcome::Inserted
    }

    /// Merge a poll response (newest first). Unseen records end up at the head
    /// in the same relative order the backend returned them.
    /// Returns the records that were new to the store.
    pub fn extend_from_poll(&mut self, batch: Vec<Notification>) -> Vec<Notification> {
        let mut inserted = Vec::new();
        for notification in batch.into_iter().rev() {
            if self.prepend(notification.clone()) == InsertOutcome::Inserted {
                inserted.push(notification);
            }
        }
        inserted.reverse();
        inserted
    }

    /// Newest arrival first.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> + '_ {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn by_tab(&self, tab: Tab) -> Vec<&Notification> {
        self.iter().filter(|n| tab.includes(n.kind)).collect()
    }

    pub fn unread_count(&self) -> usize {
        self.records.values().filter(|n| !n.read).count()
    }

    pub fn unread_in(&self, tab: Tab) -> usize {
        self.records
            .values()
            .filter(|n| !n.read && tab.includes(n.kind))
            .count()
    }

    /// Returns true if the record existed and was unread.
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.records.get_mut(id) {
            Some(n) if !n.read => {
                n.read = true;
                true
            }
            _ => false,
        }
    }

    /// Returns the ids that flipped, newest first.
    pub fn mark_all_read(&mut self) -> Vec<NotificationId> {
        let mut flipped = Vec::new();
        for id in &self.order {
            if let Some(n) = self.records.get_mut(id) {
                if !n.read {
                    n.read = true;
                    flipped.push(id.clone());
                }
            }
        }
        flipped
    }

    /// Reverse a read flip. Only used to roll back a rejected acknowledgement.
    pub(crate) fn mark_unread(&mut self, id: &NotificationId) -> bool {
        match self.records.get_mut(id) {
            Some(n) if n.read => {
                n.read = false;
                true
            }
            _ => false,
        }
    }

    // ── Optimistic acknowledgements ───────────────────────────

    /// Flip one record and open a ticket for it. `None` if the id is unknown.
    /// An already-read record still gets a ticket; if it was pending under an
    /// older ticket, the new one takes it over.
    pub fn optimistic_read(&mut self, id: &NotificationId) -> Option<AckTicket> {
        if !self.records.contains_key(id) {
            return None;
        }
        let flipped = self.mark_read(id);
        let covered = if flipped || self.acks.is_pending(id) {
            vec![id.clone()]
        } else {
            Vec::new()
        };
        Some(self.acks.begin(&covered))
    }

    /// Flip every unread record and open one ticket covering them plus any
    /// records still pending under older tickets.
    pub fn optimistic_read_all(&mut self) -> AckTicket {
        let mut covered = self.mark_all_read();
        let still_pending: Vec<NotificationId> = self
            .order
            .iter()
            .filter(|id| self.acks.is_pending(id) && !covered.contains(id))
            .cloned()
            .collect();
        covered.extend(still_pending);
        self.acks.begin(&covered)
    }

    pub fn confirm(&mut self, ticket: AckTicket) {
        self.acks.confirm(ticket);
    }

    /// Revert every flip the ticket still owns. Returns the reverted ids.
    pub fn rollback(&mut self, ticket: AckTicket) -> Vec<NotificationId> {
        let owned = self.acks.reject(ticket);
        owned.into_iter().filter(|id| self.mark_unread(id)).collect()
    }

    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }

    /// Session teardown.
    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
        self.acks.clear();
    }
}

/// Store handle shared between the transport task and callers.
///
/// Every mutation runs in one short critical section that is never held
/// across an `.await`, so each delivery applies atomically.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<RwLock<NotificationStore>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<R>(&self, f: impl FnOnce(&NotificationStore) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut NotificationStore) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn unread_count(&self) -> usize {
        self.read(|s| s.unread_count())
    }

    pub fn len(&self) -> usize {
        self.read(|s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.read(|s| s.is_empty())
    }

    /// Cloned newest-first view for rendering.
    pub fn snapshot(&self, tab: Tab) -> Vec<Notification> {
        self.read(|s| s.by_tab(tab).into_iter().cloned().collect())
    }
}
