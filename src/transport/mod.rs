pub mod api;
pub mod selector;
pub mod socket;

use crate::models::Notification;

/// Which path delivered a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    Push,
    Poll,
}

/// Delivery mode the selector is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Socket open.
    Push,
    /// Socket failed or closed; polling every poll interval while visible.
    Poll,
    /// Socket could not be constructed; polling every fallback interval.
    Fallback,
}

/// Broadcast to feed subscribers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A record new to the store.
    Delivered {
        notification: Notification,
        via: DeliveryPath,
    },
    TransportChanged(TransportMode),
}
