use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Identifiers ───────────────────────────────────────────────

/// Notification identifier.
///
/// The backend is inconsistent about id types: some payloads carry an
/// integer, others a string. Both are keyed by their textual form, so `5`
/// and `"5"` name the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(String);

const SYNTHETIC_PREFIX: &str = "local:";

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a stable key for a record the backend sent without an id.
    /// Identical payloads map to the same key, so re-deliveries still dedup.
    pub fn synthetic(created_at: Option<&str>, related: Option<&NotificationId>, text: &str) -> Self {
        Self(format!(
            "{}{}:{}:{}",
            SYNTHETIC_PREFIX,
            created_at.unwrap_or("-"),
            related.map(|r| r.as_str()).unwrap_or("-"),
            text
        ))
    }

    /// Synthetic ids are unknown to the backend and are never acknowledged remotely.
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(SYNTHETIC_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<i64> for NotificationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Int(i64),
            Str(String),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Int(n) => n.into(),
            Wire::Str(s) => s.into(),
        })
    }
}

// ── Categories ────────────────────────────────────────────────

/// Fixed category tag carried by every notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Connection,
    Message,
    Mention,
    Job,
    Pitch,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 5] = [
        NotificationKind::Connection,
        NotificationKind::Message,
        NotificationKind::Mention,
        NotificationKind::Job,
        NotificationKind::Pitch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Connection => "connection",
            NotificationKind::Message => "message",
            NotificationKind::Mention => "mention",
            NotificationKind::Job => "job",
            NotificationKind::Pitch => "pitch",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown notification type '{}'", s))
    }
}

/// Display grouping used by the notifications page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    All,
    Network,
    Mentions,
}

impl Tab {
    pub fn includes(&self, kind: NotificationKind) -> bool {
        match self {
            Tab::All => true,
            Tab::Network => kind == NotificationKind::Connection,
            Tab::Mentions => kind == NotificationKind::Mention,
        }
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Tab::All),
            "network" => Ok(Tab::Network),
            "mentions" => Ok(Tab::Mentions),
            other => Err(format!("unknown tab '{}' (expected all, network or mentions)", other)),
        }
    }
}

// ── Canonical record ──────────────────────────────────────────

/// Snapshot of the user who triggered a notification. Not refreshed if the
/// user later renames or changes avatar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: Option<NotificationId>,
    pub name: String,
    pub avatar: Option<String>,
}

/// The canonical notification shape held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub actor: Actor,
}

// ── Wire shapes ───────────────────────────────────────────────

/// A notification as the backend sends it, before normalization.
/// Every field is optional here; the normalizer decides what is fatal.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNotification {
    pub id: Option<NotificationId>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub content: Option<String>,
    pub text: Option<String>,
    pub created_at: Option<String>,
    pub read: Option<bool>,
    pub related_id: Option<NotificationId>,
    pub actor: Option<RawActor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActor {
    pub id: Option<NotificationId>,
    pub name: Option<String>,
    pub avatar: Option<String>,
}
