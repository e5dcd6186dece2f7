use thiserror::Error;

use crate::models::NotificationId;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend rejected request: status={status}, body={body}")]
    Rejected { status: u16, body: String },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown notification: {0}")]
    UnknownNotification(NotificationId),

    #[error("settings i/o error: {0}")]
    Settings(#[from] std::io::Error),
}

impl FeedError {
    /// Short message suitable for a toast. Transport and payload details are
    /// logged, not shown.
    pub fn user_message(&self) -> String {
        match self {
            FeedError::Rejected { status: 401 | 403, .. } => {
                "You are not allowed to update this notification".to_string()
            }
            FeedError::Rejected { .. } => "Failed to update notification".to_string(),
            FeedError::UnknownNotification(id) => format!("Notification {} no longer exists", id),
            FeedError::Http(_) | FeedError::Socket(_) | FeedError::InvalidOrigin(_) => {
                "Could not reach the server".to_string()
            }
            FeedError::Malformed(_) | FeedError::Json(_) => "Something went wrong".to_string(),
            FeedError::Settings(_) => "Failed to save notification settings".to_string(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        FeedError::Malformed(msg.into())
    }
}
