//! Log of optimistic read acknowledgements awaiting backend confirmation.
//!
//! Each optimistic operation gets a ticket. A notification belongs to the
//! most recent ticket that flipped it, so a late rejection of an older
//! operation never reverts a flip a newer one still owns.

use std::collections::HashMap;

use crate::models::NotificationId;

/// Handle for one optimistic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckTicket(u64);

#[derive(Debug, Default)]
pub struct AckLedger {
    next: u64,
    owners: HashMap<NotificationId, AckTicket>,
}

impl AckLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a ticket covering the ids this operation flipped.
    pub fn begin(&mut self, flipped: &[NotificationId]) -> AckTicket {
        self.next += 1;
        let ticket = AckTicket(self.next);
        for id in flipped {
            self.owners.insert(id.clone(), ticket);
        }
        ticket
    }

    /// Backend confirmed: forget everything the ticket still owns.
    pub fn confirm(&mut self, ticket: AckTicket) -> usize {
        let before = self.owners.len();
        self.owners.retain(|_, owner| *owner != ticket);
        before - self.owners.len()
    }

    /// Backend rejected: release the ticket and return the ids to revert.
    pub fn reject(&mut self, ticket: AckTicket) -> Vec<NotificationId> {
        let mut reverted = Vec::new();
        self.owners.retain(|id, owner| {
            if *owner == ticket {
                reverted.push(id.clone());
                false
            } else {
                true
            }
        });
        reverted.sort();
        reverted
    }

    /// The backend reported the id as read on its own: no ticket may revert it.
    pub fn settle(&mut self, id: &NotificationId) -> bool {
        self.owners.remove(id).is_some()
    }

    pub fn is_pending(&self, id: &NotificationId) -> bool {
        self.owners.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }
}
