pub mod notifications;
pub mod pending;

pub use notifications::{InsertOutcome, NotificationStore, SharedStore};
pub use pending::{AckLedger, AckTicket};
