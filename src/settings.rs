//! Per-category notification preferences.
//!
//! Persisted in a small JSON document under the `notificationSettings` key,
//! the same key the web client uses in local storage. Other keys in the
//! document are left alone on save.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::FeedError;
use crate::models::NotificationKind;

pub const SETTINGS_KEY: &str = "notificationSettings";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryChannel {
    Email,
    Push,
}

impl FromStr for DeliveryChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(DeliveryChannel::Email),
            "push" => Ok(DeliveryChannel::Push),
            other => Err(format!("unknown channel '{}' (expected email or push)", other)),
        }
    }
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            DeliveryChannel::Email => "email",
            DeliveryChannel::Push => "push",
        })
    }
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelToggles {
    #[serde(default = "enabled")]
    pub email: bool,
    #[serde(default = "enabled")]
    pub push: bool,
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self { email: true, push: true }
    }
}

/// Missing categories default to everything on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationSettings {
    categories: BTreeMap<NotificationKind, ChannelToggles>,
}

impl NotificationSettings {
    pub fn toggles(&self, kind: NotificationKind) -> ChannelToggles {
        self.categories.get(&kind).copied().unwrap_or_default()
    }

    pub fn push_enabled(&self, kind: NotificationKind) -> bool {
        self.toggles(kind).push
    }

    pub fn email_enabled(&self, kind: NotificationKind) -> bool {
        self.toggles(kind).email
    }

    pub fn set(&mut self, kind: NotificationKind, channel: DeliveryChannel, on: bool) {
        let entry = self.categories.entry(kind).or_default();
        match channel {
            DeliveryChannel::Email => entry.email = on,
            DeliveryChannel::Push => entry.push = on,
        }
    }

    fn to_value(&self) -> Value {
        let map: Map<String, Value> = NotificationKind::ALL
            .into_iter()
            .map(|kind| {
                let toggles = self.toggles(kind);
                (kind.as_str().to_string(), serde_json::json!({"email": toggles.email, "push": toggles.push}))
            })
            .collect();
        Value::Object(map)
    }

    /// Lenient: unknown categories are skipped, a JSON-encoded string (as
    /// local storage holds it) is unwrapped first.
    fn from_value(value: Value) -> Result<Self, FeedError> {
        let value = match value {
            Value::String(encoded) => serde_json::from_str(&encoded)?,
            other => other,
        };
        let Value::Object(map) = value else {
            return Err(FeedError::malformed(format!("{} must be an object", SETTINGS_KEY)));
        };

        let mut settings = Self::default();
        for (key, toggles) in map {
            match key.parse::<NotificationKind>() {
                Ok(kind) => {
                    settings.categories.insert(kind, serde_json::from_value(toggles)?);
                }
                Err(_) => tracing::debug!(category = %key, "ignoring unknown settings category"),
            }
        }
        Ok(settings)
    }
}

/// Settings document on disk.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/hfn-notify/settings.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("hfn-notify").join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Defaults when the file or the key does not exist yet.
    pub fn load(&self) -> Result<NotificationSettings, FeedError> {
        let mut doc = self.read_document()?;
        match doc.remove(SETTINGS_KEY) {
            Some(value) => NotificationSettings::from_value(value),
            None => Ok(NotificationSettings::default()),
        }
    }

    pub fn save(&self, settings: &NotificationSettings) -> Result<(), FeedError> {
        let mut doc = self.read_document()?;
        doc.insert(SETTINGS_KEY.to_string(), settings.to_value());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(&Value::Object(doc))?)?;
        tracing::debug!(path = %self.path.display(), "notification settings saved");
        Ok(())
    }

    fn read_document(&self) -> Result<Map<String, Value>, FeedError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(FeedError::malformed(format!(
                "{} is not a JSON object",
                self.path.display()
            ))),
        }
    }
}
