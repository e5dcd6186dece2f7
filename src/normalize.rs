//! Delivery normalizer.
//!
//! Push frames and poll responses carry the same raw record in different
//! envelopes. Everything that reaches the store goes through `normalize`, so
//! the store only ever sees fully populated [`Notification`]s.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::FeedError;
use crate::models::notification::{Actor, Notification, NotificationId, NotificationKind, RawNotification};

/// Socket message envelope: `{ "type": ..., "payload": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// Convert one raw record to the canonical shape.
///
/// `now` stands in for a missing `createdAt`.
pub fn normalize(raw: RawNotification, now: DateTime<Utc>) -> Result<Notification, FeedError> {
    let text = raw
        .content
        .or(raw.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| FeedError::malformed("notification has no content"))?;

    let kind = match raw.kind.as_deref() {
        Some(k) => k.parse::<NotificationKind>().map_err(FeedError::Malformed)?,
        None => NotificationKind::Message,
    };

    let timestamp = match raw.created_at.as_deref() {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .map_err(|e| FeedError::malformed(format!("bad createdAt '{}': {}", ts, e)))?
            .with_timezone(&Utc),
        None => now,
    };

    let id = match raw.id {
        Some(id) => id,
        None => NotificationId::synthetic(raw.created_at.as_deref(), raw.related_id.as_ref(), &text),
    };

    // A structured actor from the backend wins; otherwise fall back to the
    // first word of the content, which is how the web client has always
    // guessed the name.
    let actor = match raw.actor {
        Some(a) if a.name.as_deref().is_some_and(|n| !n.trim().is_empty()) => Actor {
            id: a.id.or(raw.related_id),
            name: a.name.unwrap_or_default(),
            avatar: a.avatar,
        },
        other => Actor {
            id: raw.related_id,
            name: first_token(&text),
            avatar: other.and_then(|a| a.avatar),
        },
    };

    Ok(Notification {
        id,
        kind,
        text,
        timestamp,
        read: raw.read.unwrap_or(false),
        actor,
    })
}

/// Normalize a single JSON record.
pub fn from_value(value: Value, now: DateTime<Utc>) -> Result<Notification, FeedError> {
    let raw: RawNotification = serde_json::from_value(value)?;
    normalize(raw, now)
}

/// Decode one socket text frame.
///
/// Returns `Ok(None)` for well-formed frames that are not notification events.
pub fn from_socket_frame(frame: &str, now: DateTime<Utc>) -> Result<Option<Notification>, FeedError> {
    let envelope: Envelope = serde_json::from_str(frame)?;
    if envelope.kind != "notification" {
        debug!(frame_type = %envelope.kind, "ignoring non-notification frame");
        return Ok(None);
    }

    let raw = match envelope.payload {
        Value::Object(mut payload) => payload
            .remove("notification")
            .ok_or_else(|| FeedError::malformed("notification frame without payload.notification"))?,
        _ => return Err(FeedError::malformed("notification frame without payload object")),
    };

    from_value(raw, now).map(Some)
}

/// Normalize a poll response. Bad records are logged and skipped; the rest of
/// the batch is kept in the order the backend sent it.
pub fn from_poll_records(records: Vec<Value>, now: DateTime<Utc>) -> Vec<Notification> {
    let total = records.len();
    let batch: Vec<Notification> = records
        .into_iter()
        .enumerate()
        .filter_map(|(idx, record)| match from_value(record, now) {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(index = idx, error = %e, "dropping malformed notification from poll");
                None
            }
        })
        .collect();

    if batch.len() != total {
        debug!(kept = batch.len(), total, "poll batch normalized with drops");
    }
    batch
}

fn first_token(text: &str) -> String {
    text.split_whitespace().next().unwrap_or_default().to_string()
}
