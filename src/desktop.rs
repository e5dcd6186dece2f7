//! OS-level popups for notifications that arrive while the page is unfocused.

use crate::models::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// Never asked or the user dismissed the prompt.
    Default,
}

/// Host notification facility. Denial or absence is not an error: the feed
/// just skips the popup.
pub trait DesktopNotifier: Send + Sync {
    /// Asked once when a feed starts.
    fn request_permission(&self) -> Permission;

    fn show(&self, notification: &Notification);
}

/// No popups at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

impl DesktopNotifier for Disabled {
    fn request_permission(&self) -> Permission {
        Permission::Denied
    }

    fn show(&self, _notification: &Notification) {}
}

/// Emits each popup as a structured log event, for headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDesktop;

impl DesktopNotifier for LogDesktop {
    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, notification: &Notification) {
        tracing::info!(
            target: "hfn_notify::desktop",
            id = %notification.id,
            kind = %notification.kind,
            actor = %notification.actor.name,
            "{}",
            notification.text
        );
    }
}
