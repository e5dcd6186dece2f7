use std::path::PathBuf;
use std::time::Duration;

use crate::feed::FeedConfig;
use crate::models::Session;
use crate::settings::SettingsFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopMode {
    /// Popups are written to the log.
    Log,
    Off,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Page origin the REST endpoints and `/ws` live on.
    pub origin: String,
    /// Optional separate origin for the socket.
    pub socket_origin: Option<String>,
    pub user_id: Option<String>,
    pub auth_token: Option<String>,
    /// Set via HFN_POLL_INTERVAL_SECS. Default: 30.
    pub poll_interval_secs: u64,
    /// Set via HFN_FALLBACK_INTERVAL_SECS. Default: 60.
    pub fallback_interval_secs: u64,
    /// Unset means REST requests have no overall timeout.
    pub request_timeout_secs: Option<u64>,
    pub settings_path: PathBuf,
    pub desktop: DesktopMode,
}

impl Config {
    /// Session for the configured user. Fails if HFN_USER_ID is not set.
    pub fn session(&self) -> anyhow::Result<Session> {
        let user_id = self
            .user_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("HFN_USER_ID is not set"))?;
        Ok(Session::new(user_id, self.auth_token.clone()))
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            origin: self.origin.clone(),
            socket_origin: self.socket_origin.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            fallback_interval: Duration::from_secs(self.fallback_interval_secs.max(1)),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn settings_file(&self) -> SettingsFile {
        SettingsFile::new(&self.settings_path)
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let settings_path = match std::env::var("HFN_SETTINGS_PATH") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => SettingsFile::default_path().ok_or_else(|| {
            anyhow::anyhow!("no config directory on this platform; set HFN_SETTINGS_PATH")
        })?,
    };

    let desktop = match std::env::var("HFN_DESKTOP").unwrap_or_default().trim() {
        "" | "log" => DesktopMode::Log,
        "off" | "none" => DesktopMode::Off,
        other => anyhow::bail!("HFN_DESKTOP must be 'log' or 'off', got '{}'", other),
    };

    Ok(Config {
        origin: std::env::var("HFN_ORIGIN").unwrap_or_else(|_| "http://localhost:5000".into()),
        socket_origin: std::env::var("HFN_SOCKET_ORIGIN").ok().filter(|s| !s.trim().is_empty()),
        user_id: std::env::var("HFN_USER_ID").ok().filter(|s| !s.trim().is_empty()),
        auth_token: std::env::var("HFN_AUTH_TOKEN").ok().filter(|s| !s.trim().is_empty()),
        poll_interval_secs: std::env::var("HFN_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30),
        fallback_interval_secs: std::env::var("HFN_FALLBACK_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60),
        request_timeout_secs: std::env::var("HFN_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok()),
        settings_path,
        desktop,
    })
}
