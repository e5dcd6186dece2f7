//! REST client for the notification endpoints.
//!
//! - `GET   /api/notifications`           list (newest first)
//! - `PATCH /api/notifications/:id/read`  acknowledge one
//! - `PATCH /api/notifications/read-all`  acknowledge all

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use crate::errors::FeedError;
use crate::models::{NotificationId, Session};

/// Backend operations the feed depends on.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Raw records, still to be normalized.
    async fn list(&self) -> Result<Vec<Value>, FeedError>;

    async fn mark_read(&self, id: &NotificationId) -> Result<(), FeedError>;

    async fn mark_all_read(&self) -> Result<(), FeedError>;
}

pub struct RestClient {
    base: Url,
    auth_token: Option<String>,
    http: Client,
}

impl RestClient {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(origin: &str, session: &Session, timeout: Option<Duration>) -> Result<Self, FeedError> {
        let base = Url::parse(origin).map_err(|e| FeedError::InvalidOrigin(format!("{}: {}", origin, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(FeedError::InvalidOrigin(format!(
                "{}: expected http or https",
                origin
            )));
        }

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("hfn-notify/", env!("CARGO_PKG_VERSION")));
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }

        Ok(Self {
            base,
            auth_token: session.auth_token.clone(),
            http: builder.build()?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FeedError> {
        self.base
            .join(path)
            .map_err(|e| FeedError::InvalidOrigin(format!("{}{}: {}", self.base, path, e)))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(resp: Response) -> Result<Response, FeedError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(FeedError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl NotificationApi for RestClient {
    async fn list(&self) -> Result<Vec<Value>, FeedError> {
        let url = self.endpoint("/api/notifications")?;
        let resp = self.authorize(self.http.get(url)).send().await?;
        let body: Value = Self::check(resp).await?.json().await?;

        match body {
            Value::Array(records) => {
                tracing::debug!(count = records.len(), "fetched notifications");
                Ok(records)
            }
            other => Err(FeedError::malformed(format!(
                "expected an array of notifications, got {}",
                type_name(&other)
            ))),
        }
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), FeedError> {
        let path = format!("/api/notifications/{}/read", urlencoding::encode(id.as_str()));
        let url = self.endpoint(&path)?;
        let resp = self.authorize(self.http.patch(url)).send().await?;
        Self::check(resp).await?;
        tracing::debug!(id = %id, "notification acknowledged");
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), FeedError> {
        let url = self.endpoint("/api/notifications/read-all")?;
        let resp = self.authorize(self.http.patch(url)).send().await?;
        Self::check(resp).await?;
        tracing::debug!("all notifications acknowledged");
        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Tests ──────────────────────────────────────────────────────
