//! Push channel: one WebSocket to `/ws` on the page origin.
//!
//! The handler:
//!   1. Rewrites the origin scheme (http → ws, https → wss) and fixes the path
//!   2. Connects and sends the `connection` handshake with the user id
//!   3. Yields normalized notifications until the server closes or errors
//!
//! The channel is never reconnected; the selector falls back to polling.

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::errors::FeedError;
use crate::models::{Notification, Session};
use crate::normalize;

pub const SOCKET_PATH: &str = "/ws";

// ── URL builder ───────────────────────────────────────────────

/// Socket endpoint for a page origin. Fails for anything that is not an
/// http(s) or ws(s) origin with a host.
pub fn socket_url(origin: &str) -> Result<Url, FeedError> {
    let mut url = Url::parse(origin).map_err(|e| FeedError::InvalidOrigin(format!("{}: {}", origin, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(FeedError::InvalidOrigin(format!(
                "{}: no socket equivalent for scheme '{}'",
                origin, other
            )))
        }
    };
    if url.host_str().is_none() {
        return Err(FeedError::InvalidOrigin(format!("{}: missing host", origin)));
    }

    url.set_scheme(scheme)
        .map_err(|_| FeedError::InvalidOrigin(format!("{}: cannot switch scheme to {}", origin, scheme)))?;
    url.set_path(SOCKET_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

// ── Wire messages ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
enum ClientMessage {
    Connection {
        #[serde(rename = "userId")]
        user_id: Value,
    },
}

// ── Channel ───────────────────────────────────────────────────

pub struct PushChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: Url,
    received: u64,
}

impl PushChannel {
    /// Connect and authenticate.
    pub async fn connect(url: &Url, session: &Session) -> Result<Self, FeedError> {
        let (mut stream, _resp) = connect_async(url.as_str()).await?;

        let hello = serde_json::to_string(&ClientMessage::Connection {
            user_id: session.wire_user_id(),
        })?;
        stream.send(Message::Text(hello)).await?;

        tracing::info!(url = %url, user_id = %session.user_id, "push channel connected");

        Ok(Self {
            stream,
            url: url.clone(),
            received: 0,
        })
    }

    /// Next notification from the server.
    ///
    /// `Ok(None)` once the server has closed the channel. Malformed frames are
    /// logged and skipped. Cancel-safe: a frame is either fully handled or
    /// still unread.
    pub async fn recv(&mut self) -> Result<Option<Notification>, FeedError> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => match normalize::from_socket_frame(&text, Utc::now()) {
                    Ok(Some(notification)) => {
                        self.received += 1;
                        return Ok(Some(notification));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(url = %self.url, error = %e, "dropping malformed push frame");
                    }
                },
                Message::Close(frame) => {
                    tracing::debug!(url = %self.url, ?frame, "server closed push channel");
                    return Ok(None);
                }
                Message::Binary(_) => tracing::debug!("ignoring binary push frame"),
                // Pings are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Send a close frame. Errors are logged; the channel is gone either way.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(url = %self.url, error = %e, "push channel close failed");
        }
        tracing::info!(url = %self.url, received = self.received, "push channel closed");
    }
}
