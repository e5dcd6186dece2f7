use serde_json::Value;

/// The signed-in user a feed runs for.
///
/// Passed explicitly into every feed instead of living in a global; dropping
/// the feed via `FeedHandle::sign_out` is the session teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub auth_token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            auth_token,
        }
    }

    /// User id as it goes into the socket handshake: numeric ids are sent as
    /// JSON numbers, anything else as a string.
    pub fn wire_user_id(&self) -> Value {
        match self.user_id.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::from(self.user_id.clone()),
        }
    }
}
