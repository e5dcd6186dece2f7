//! Notification feed: the store plus the task that keeps it filled.
//!
//! [`Feed::spawn`] starts transport selection in the background and returns a
//! [`FeedHandle`] for reads, acknowledgements and teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::desktop::{DesktopNotifier, Disabled};
use crate::errors::FeedError;
use crate::models::{NotificationId, Session};
use crate::settings::NotificationSettings;
use crate::store::SharedStore;
use crate::transport::api::NotificationApi;
use crate::transport::selector::Selector;
use crate::transport::FeedEvent;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_FALLBACK_INTERVAL: Duration = Duration::from_secs(60);

const EVENT_BUFFER: usize = 256;

/// Page visibility as the host reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    /// Polling only runs while visible.
    pub visible: bool,
    /// Desktop popups only fire while unfocused.
    pub focused: bool,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            visible: true,
            focused: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Page origin; REST calls and, unless overridden, the socket use it.
    pub origin: String,
    /// Separate origin for the `/ws` endpoint.
    pub socket_origin: Option<String>,
    pub poll_interval: Duration,
    pub fallback_interval: Duration,
}

impl FeedConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            socket_origin: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fallback_interval: DEFAULT_FALLBACK_INTERVAL,
        }
    }
}

pub struct Feed {
    config: FeedConfig,
    session: Session,
    api: Arc<dyn NotificationApi>,
    desktop: Arc<dyn DesktopNotifier>,
    settings: NotificationSettings,
    page: PageState,
}

impl Feed {
    pub fn new(config: FeedConfig, session: Session, api: Arc<dyn NotificationApi>) -> Self {
        Self {
            config,
            session,
            api,
            desktop: Arc::new(Disabled),
            settings: NotificationSettings::default(),
            page: PageState::default(),
        }
    }

    pub fn with_desktop(mut self, desktop: Arc<dyn DesktopNotifier>) -> Self {
        self.desktop = desktop;
        self
    }

    pub fn with_settings(mut self, settings: NotificationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_page_state(mut self, page: PageState) -> Self {
        self.page = page;
        self
    }

    /// Start delivering. Must be called inside a tokio runtime.
    pub fn spawn(self) -> FeedHandle {
        let store = SharedStore::new();
        let (page_tx, page_rx) = watch::channel(self.page);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, first_rx) = broadcast::channel(EVENT_BUFFER);

        let selector = Selector {
            store: store.clone(),
            api: self.api.clone(),
            socket_origin: self
                .config
                .socket_origin
                .clone()
                .unwrap_or_else(|| self.config.origin.clone()),
            session: self.session,
            poll_interval: self.config.poll_interval,
            fallback_interval: self.config.fallback_interval,
            page: page_rx,
            desktop: self.desktop,
            settings: self.settings,
            events: events_tx.clone(),
        };
        let task = tokio::spawn(selector.run(shutdown_rx));

        FeedHandle {
            store,
            api: self.api,
            page: page_tx,
            shutdown: shutdown_tx,
            events: events_tx,
            first_events: Some(first_rx),
            task: Some(task),
        }
    }
}

pub struct FeedHandle {
    store: SharedStore,
    api: Arc<dyn NotificationApi>,
    page: watch::Sender<PageState>,
    shutdown: watch::Sender<bool>,
    events: broadcast::Sender<FeedEvent>,
    first_events: Option<broadcast::Receiver<FeedEvent>>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// The first call sees every event since spawn; later calls see events
    /// from the point of subscription.
    pub fn subscribe(&mut self) -> broadcast::Receiver<FeedEvent> {
        self.first_events
            .take()
            .unwrap_or_else(|| self.events.subscribe())
    }

    pub fn set_page_state(&self, visible: bool, focused: bool) {
        self.page.send_replace(PageState { visible, focused });
    }

    pub fn unread_count(&self) -> usize {
        self.store.unread_count()
    }

    /// Optimistically mark one notification read, then acknowledge it.
    /// A failed acknowledgement restores the unread flag and is returned.
    pub async fn mark_read(&self, id: &NotificationId) -> Result<(), FeedError> {
        let ticket = self
            .store
            .write(|s| s.optimistic_read(id))
            .ok_or_else(|| FeedError::UnknownNotification(id.clone()))?;

        if id.is_synthetic() {
            self.store.write(|s| s.confirm(ticket));
            tracing::debug!(id = %id, "synthetic notification marked read locally");
            return Ok(());
        }

        match self.api.mark_read(id).await {
            Ok(()) => {
                self.store.write(|s| s.confirm(ticket));
                Ok(())
            }
            Err(e) => {
                let reverted = self.store.write(|s| s.rollback(ticket));
                tracing::warn!(id = %id, error = %e, reverted = reverted.len(), "mark read rejected, rolled back");
                Err(e)
            }
        }
    }

    /// Optimistically mark everything read, then acknowledge.
    pub async fn mark_all_read(&self) -> Result<(), FeedError> {
        let ticket = self.store.write(|s| s.optimistic_read_all());

        match self.api.mark_all_read().await {
            Ok(()) => {
                self.store.write(|s| s.confirm(ticket));
                Ok(())
            }
            Err(e) => {
                let reverted = self.store.write(|s| s.rollback(ticket));
                tracing::warn!(error = %e, reverted = reverted.len(), "mark all read rejected, rolled back");
                Err(e)
            }
        }
    }

    /// Stop polling, close the socket, and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.stop().await;
    }

    /// Shutdown and drop everything the session held.
    pub async fn sign_out(mut self) {
        self.stop().await;
        self.store.write(|s| s.clear());
        tracing::info!("feed signed out");
    }

    async fn stop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "feed task ended abnormally");
            }
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        // The task notices and closes its socket on its own.
        self.shutdown.send_replace(true);
    }
}
