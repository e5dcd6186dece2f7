//! hfn-notify: real-time notification feed client for the Hindustan
//! Founders Network.
//!
//! Re-exports modules needed by the binary and by integration tests in `tests/`.

pub mod config;
pub mod desktop;
pub mod errors;
pub mod feed;
pub mod models;
pub mod normalize;
pub mod settings;
pub mod store;
pub mod transport;

pub use errors::FeedError;
pub use feed::{Feed, FeedConfig, FeedHandle, PageState};
pub use transport::{DeliveryPath, FeedEvent, TransportMode};
