pub mod notification;
pub mod session;

pub use notification::{Actor, Notification, NotificationId, NotificationKind, Tab};
pub use session::Session;
