//! Transport selection: push first, polling when push is unavailable.
//!
//! ```text
//!   mount ─► initial poll (detached)
//!     │
//!     └─► socket url? ──no──► fallback poll (fallback_interval)
//!             │yes
//!          connect ──err──► poll (poll_interval)
//!             │ok
//!          push loop ──closed/err──► catch-up poll ─► poll (poll_interval)
//! ```
//!
//! The socket is never retried within one feed. Every failure is logged and
//! the feed keeps delivering through polling.
//!
//! Each REST fetch runs as its own task in a `JoinSet`, so a request that
//! never answers only loses its own cycle. Outstanding fetches are aborted
//! when the feed stops.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::api::NotificationApi;
use super::socket::{self, PushChannel};
use super::{DeliveryPath, FeedEvent, TransportMode};
use crate::desktop::{DesktopNotifier, Permission};
use crate::feed::PageState;
use crate::models::{Notification, Session};
use crate::normalize;
use crate::settings::NotificationSettings;
use crate::store::{InsertOutcome, SharedStore};

pub(crate) struct Selector {
    pub store: SharedStore,
    pub api: Arc<dyn NotificationApi>,
    pub session: Session,
    pub socket_origin: String,
    pub poll_interval: Duration,
    pub fallback_interval: Duration,
    pub page: watch::Receiver<PageState>,
    pub desktop: Arc<dyn DesktopNotifier>,
    pub settings: NotificationSettings,
    pub events: broadcast::Sender<FeedEvent>,
}

enum PushEnd {
    Shutdown,
    Closed,
    Failed(crate::errors::FeedError),
}

/// Resolves once shutdown is requested or the handle is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// One REST fetch-and-merge, detached from the selector so it can run as a
/// task of its own.
#[derive(Clone)]
struct Poller {
    store: SharedStore,
    api: Arc<dyn NotificationApi>,
    events: broadcast::Sender<FeedEvent>,
}

impl Poller {
    async fn poll_once(self, reason: &'static str) {
        let records = match self.api.list().await {
            Ok(records) => records,
            Err(e) => {
                warn!(reason, error = %e, "notification poll failed");
                return;
            }
        };

        let batch = normalize::from_poll_records(records, Utc::now());
        let inserted = self.store.write(|s| s.extend_from_poll(batch));
        debug!(reason, new = inserted.len(), "poll merged");

        for notification in inserted {
            // No subscribers is fine.
            let _ = self.events.send(FeedEvent::Delivered {
                notification,
                via: DeliveryPath::Poll,
            });
        }
    }
}

impl Selector {
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut polls = JoinSet::new();
        self.drive(&mut polls, &mut shutdown).await;
        // Aborts fetches still waiting on the backend and waits for them to
        // unwind, so nothing merges into the store after the feed stops.
        polls.shutdown().await;
    }

    async fn drive(&self, polls: &mut JoinSet<()>, shutdown: &mut watch::Receiver<bool>) {
        let permission = self.desktop.request_permission();
        debug!(?permission, user_id = %self.session.user_id, "feed starting");

        self.spawn_poll(polls, "mount");

        let url = match socket::socket_url(&self.socket_origin) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "push channel unavailable, falling back to polling");
                self.emit(FeedEvent::TransportChanged(TransportMode::Fallback));
                self.poll_loop(self.fallback_interval, polls, shutdown).await;
                return;
            }
        };

        let connected = tokio::select! {
            r = PushChannel::connect(&url, &self.session) => r,
            _ = stopped(shutdown) => return,
        };

        match connected {
            Ok(mut channel) => {
                self.emit(FeedEvent::TransportChanged(TransportMode::Push));
                match self.push_loop(&mut channel, permission, polls, shutdown).await {
                    PushEnd::Shutdown => {
                        channel.close().await;
                        return;
                    }
                    PushEnd::Closed => {
                        info!(url = %url, received = channel.received(), "push channel ended, switching to polling")
                    }
                    PushEnd::Failed(e) => {
                        warn!(url = %url, error = %e, "push channel failed, switching to polling")
                    }
                }
                self.emit(FeedEvent::TransportChanged(TransportMode::Poll));
                // Whatever was pushed while the socket was dying is picked up here.
                self.spawn_poll(polls, "catch-up");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "push channel connect failed, switching to polling");
                self.emit(FeedEvent::TransportChanged(TransportMode::Poll));
            }
        }

        self.poll_loop(self.poll_interval, polls, shutdown).await;
    }

    async fn push_loop(
        &self,
        channel: &mut PushChannel,
        permission: Permission,
        polls: &mut JoinSet<()>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> PushEnd {
        loop {
            let next = tokio::select! {
                r = channel.recv() => r,
                Some(joined) = polls.join_next(), if !polls.is_empty() => {
                    reap(joined);
                    continue;
                }
                _ = stopped(shutdown) => return PushEnd::Shutdown,
            };
            match next {
                Ok(Some(notification)) => self.deliver_push(notification, permission),
                Ok(None) => return PushEnd::Closed,
                Err(e) => return PushEnd::Failed(e),
            }
        }
    }

    /// Ticks are skipped while the page is hidden. A tick never waits on an
    /// earlier fetch.
    async fn poll_loop(
        &self,
        period: Duration,
        polls: &mut JoinSet<()>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                Some(joined) = polls.join_next(), if !polls.is_empty() => {
                    reap(joined);
                    continue;
                }
                _ = stopped(shutdown) => return,
            }

            if !self.page.borrow().visible {
                debug!("page hidden, skipping poll");
                continue;
            }

            if !polls.is_empty() {
                debug!(in_flight = polls.len(), "earlier poll still outstanding");
            }
            self.spawn_poll(polls, "interval");
        }
    }

    fn spawn_poll(&self, polls: &mut JoinSet<()>, reason: &'static str) {
        let poller = Poller {
            store: self.store.clone(),
            api: self.api.clone(),
            events: self.events.clone(),
        };
        polls.spawn(poller.poll_once(reason));
    }

    fn deliver_push(&self, notification: Notification, permission: Permission) {
        let outcome = self.store.write(|s| s.prepend(notification.clone()));
        if outcome == InsertOutcome::Updated {
            debug!(id = %notification.id, "pushed notification already known");
            return;
        }

        let focused = self.page.borrow().focused;
        if permission == Permission::Granted && !focused && self.settings.push_enabled(notification.kind) {
            self.desktop.show(&notification);
        }

        self.emit(FeedEvent::Delivered {
            notification,
            via: DeliveryPath::Push,
        });
    }

    fn emit(&self, event: FeedEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn reap(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            warn!(error = %e, "poll task panicked");
        }
    }
}
