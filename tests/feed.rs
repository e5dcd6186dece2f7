//! End-to-end feed tests.
//!
//! A throwaway axum backend serves `/ws` and the REST endpoints on one
//! origin, the way the real site does. Tests that only need the poll path use
//! a scripted `NotificationApi` instead of a server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;

use hfn_notify::desktop::{DesktopNotifier, Permission};
use hfn_notify::models::{Notification, NotificationId, NotificationKind, Session};
use hfn_notify::settings::{DeliveryChannel, NotificationSettings};
use hfn_notify::transport::api::{NotificationApi, RestClient};
use hfn_notify::{DeliveryPath, Feed, FeedConfig, FeedError, FeedEvent, PageState, TransportMode};

// ── Test backend ──────────────────────────────────────────────

#[derive(Default)]
struct Backend {
    /// Frames pushed right after the handshake.
    pushes: Vec<Value>,
    close_after_push: bool,
    /// Answer the `/ws` upgrade with a 404.
    refuse_socket: bool,
    /// Call n of the list endpoint gets `lists[n]`, the last entry repeating.
    lists: Vec<Value>,
    reject_reads: bool,
    list_calls: AtomicUsize,
    handshakes: Mutex<Vec<Value>>,
    patched: Mutex<Vec<String>>,
}

async fn ws_handler(State(backend): State<Arc<Backend>>, ws: WebSocketUpgrade) -> Response {
    if backend.refuse_socket {
        return StatusCode::NOT_FOUND.into_response();
    }
    ws.on_upgrade(move |socket| serve_socket(socket, backend))
}

async fn serve_socket(mut socket: WebSocket, backend: Arc<Backend>) {
    if let Some(Ok(Message::Text(hello))) = socket.recv().await {
        if let Ok(v) = serde_json::from_str(&hello) {
            backend.handshakes.lock().unwrap().push(v);
        }
    }
    for frame in &backend.pushes {
        if socket.send(Message::Text(frame.to_string())).await.is_err() {
            return;
        }
    }
    if backend.close_after_push {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}

async fn list_handler(State(backend): State<Arc<Backend>>) -> Json<Value> {
    let call = backend.list_calls.fetch_add(1, Ordering::SeqCst);
    let body = backend
        .lists
        .get(call.min(backend.lists.len().saturating_sub(1)))
        .cloned()
        .unwrap_or_else(|| json!([]));
    Json(body)
}

async fn read_one(State(backend): State<Arc<Backend>>, Path(id): Path<String>) -> StatusCode {
    backend.patched.lock().unwrap().push(id);
    if backend.reject_reads {
        StatusCode::FORBIDDEN
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn read_all(State(backend): State<Arc<Backend>>) -> StatusCode {
    backend.patched.lock().unwrap().push("read-all".to_string());
    if backend.reject_reads {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::NO_CONTENT
    }
}

/// Returns the backend's origin, e.g. `http://127.0.0.1:41234`.
async fn spawn_backend(backend: Arc<Backend>) -> String {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/notifications", get(list_handler))
        .route("/api/notifications/read-all", patch(read_all))
        .route("/api/notifications/:id/read", patch(read_one))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ── Helpers ───────────────────────────────────────────────────

fn session() -> Session {
    Session::new("42", Some("tok_test".into()))
}

fn fast_config(origin: &str) -> FeedConfig {
    let mut cfg = FeedConfig::new(origin);
    cfg.poll_interval = Duration::from_millis(100);
    cfg.fallback_interval = Duration::from_millis(100);
    cfg
}

fn rest(origin: &str) -> Arc<dyn NotificationApi> {
    Arc::new(RestClient::new(origin, &session(), Some(Duration::from_secs(5))).unwrap())
}

fn record(id: i64, kind: &str, content: &str) -> Value {
    json!({"id": id, "type": kind, "content": content, "createdAt": Utc::now().to_rfc3339()})
}

fn push_frame(id: i64, kind: &str, content: &str) -> Value {
    json!({"type": "notification", "payload": {"notification": record(id, kind, content)}})
}

async fn wait_for<T>(
    rx: &mut broadcast::Receiver<FeedEvent>,
    mut pick: impl FnMut(FeedEvent) -> Option<T>,
) -> T {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(v) = pick(event) {
                        return v;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("feed event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for feed event")
}

async fn wait_delivery(rx: &mut broadcast::Receiver<FeedEvent>, via: DeliveryPath) -> Notification {
    wait_for(rx, |event| match event {
        FeedEvent::Delivered { notification, via: v } if v == via => Some(notification),
        _ => None,
    })
    .await
}

async fn wait_mode(rx: &mut broadcast::Receiver<FeedEvent>, mode: TransportMode) {
    wait_for(rx, |event| match event {
        FeedEvent::TransportChanged(m) if m == mode => Some(()),
        _ => None,
    })
    .await
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn no_mode_change(rx: &mut broadcast::Receiver<FeedEvent>, mode: TransportMode) -> bool {
    while let Ok(event) = rx.try_recv() {
        if matches!(event, FeedEvent::TransportChanged(m) if m == mode) {
            return false;
        }
    }
    true
}

#[derive(Default)]
struct RecordingDesktop {
    shown: Mutex<Vec<NotificationId>>,
}

impl DesktopNotifier for RecordingDesktop {
    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, notification: &Notification) {
        self.shown.lock().unwrap().push(notification.id.clone());
    }
}

/// Poll-only backend: batch n for call n, last batch repeating.
struct ScriptedApi {
    batches: Vec<Vec<Value>>,
    calls: AtomicUsize,
}

impl ScriptedApi {
    fn new(batches: Vec<Vec<Value>>) -> Self {
        Self {
            batches,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NotificationApi for ScriptedApi {
    async fn list(&self) -> Result<Vec<Value>, FeedError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.batches[call.min(self.batches.len() - 1)].clone())
    }

    async fn mark_read(&self, _id: &NotificationId) -> Result<(), FeedError> {
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), FeedError> {
        Err(FeedError::Rejected {
            status: 500,
            body: "read-all unavailable".into(),
        })
    }
}

/// List call `stall_on` never answers. Call 0 is empty, later calls return
/// `batch`.
struct StallingApi {
    stall_on: usize,
    batch: Vec<Value>,
    calls: AtomicUsize,
}

impl StallingApi {
    fn new(stall_on: usize, batch: Vec<Value>) -> Self {
        Self {
            stall_on,
            batch,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NotificationApi for StallingApi {
    async fn list(&self) -> Result<Vec<Value>, FeedError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == self.stall_on {
            std::future::pending::<()>().await;
        }
        if call == 0 {
            Ok(Vec::new())
        } else {
            Ok(self.batch.clone())
        }
    }

    async fn mark_read(&self, _id: &NotificationId) -> Result<(), FeedError> {
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), FeedError> {
        Ok(())
    }
}

// ── Push path ─────────────────────────────────────────────────

#[tokio::test]
async fn test_push_then_mark_read() {
    let backend = Arc::new(Backend {
        pushes: vec![push_frame(1, "connection", "Amit sent you a connection request")],
        lists: vec![json!([])],
        ..Default::default()
    });
    let origin = spawn_backend(backend.clone()).await;

    let mut handle = Feed::new(fast_config(&origin), session(), rest(&origin)).spawn();
    let mut events = handle.subscribe();

    let pushed = wait_delivery(&mut events, DeliveryPath::Push).await;
    assert_eq!(pushed.id, NotificationId::from(1));
    assert_eq!(pushed.kind, NotificationKind::Connection);
    assert_eq!(pushed.actor.name, "Amit");
    assert_eq!(handle.store().len(), 1);
    assert_eq!(handle.unread_count(), 1);

    handle.mark_read(&NotificationId::from(1)).await.unwrap();
    assert_eq!(handle.unread_count(), 0);
    assert_eq!(*backend.patched.lock().unwrap(), vec!["1".to_string()]);

    assert_eq!(
        backend.handshakes.lock().unwrap()[0],
        json!({"type": "connection", "payload": {"userId": 42}})
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn test_rejected_read_is_rolled_back() {
    let backend = Arc::new(Backend {
        pushes: vec![push_frame(9, "message", "Kiran sent you a message")],
        lists: vec![json!([])],
        reject_reads: true,
        ..Default::default()
    });
    let origin = spawn_backend(backend.clone()).await;

    let mut handle = Feed::new(fast_config(&origin), session(), rest(&origin)).spawn();
    let mut events = handle.subscribe();
    wait_delivery(&mut events, DeliveryPath::Push).await;

    let err = handle.mark_read(&NotificationId::from(9)).await.unwrap_err();
    assert!(matches!(err, FeedError::Rejected { status: 403, .. }), "got {:?}", err);
    assert_eq!(handle.unread_count(), 1);
    assert_eq!(handle.store().read(|s| s.pending_acks()), 0);

    let err = handle.mark_all_read().await.unwrap_err();
    assert!(matches!(err, FeedError::Rejected { status: 500, .. }));
    assert_eq!(handle.unread_count(), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_mark_read_unknown_id_does_not_call_backend() {
    let backend = Arc::new(Backend {
        lists: vec![json!([])],
        ..Default::default()
    });
    let origin = spawn_backend(backend.clone()).await;

    let mut handle = Feed::new(fast_config(&origin), session(), rest(&origin)).spawn();
    let mut events = handle.subscribe();
    wait_mode(&mut events, TransportMode::Push).await;

    let err = handle.mark_read(&NotificationId::from(404)).await.unwrap_err();
    assert!(matches!(err, FeedError::UnknownNotification(_)));
    assert!(backend.patched.lock().unwrap().is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_push_and_poll_of_same_event_dedup() {
    let backend = Arc::new(Backend {
        pushes: vec![
            push_frame(1, "pitch", "Meera shared a pitch"),
            push_frame(2, "job", "Orbit is hiring"),
        ],
        lists: vec![json!([record(1, "pitch", "Meera shared a pitch")])],
        ..Default::default()
    });
    let origin = spawn_backend(backend.clone()).await;

    let mut handle = Feed::new(fast_config(&origin), session(), rest(&origin)).spawn();
    let mut events = handle.subscribe();

    // The mount fetch and the socket race; whichever sees 1 second only refreshes it.
    let mut first_deliveries = 0;
    wait_for(&mut events, |event| match event {
        FeedEvent::Delivered { notification, .. } if notification.id == NotificationId::from(1) => {
            first_deliveries += 1;
            None
        }
        FeedEvent::Delivered { notification, via: DeliveryPath::Push }
            if notification.id == NotificationId::from(2) =>
        {
            Some(())
        }
        _ => None,
    })
    .await;
    eventually(|| backend.list_calls.load(Ordering::SeqCst) >= 1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(event) = events.try_recv() {
        if matches!(&event, FeedEvent::Delivered { notification, .. } if notification.id == NotificationId::from(1)) {
            first_deliveries += 1;
        }
    }
    assert_eq!(first_deliveries, 1);

    let ids: Vec<String> = handle.store().read(|s| s.iter().map(|n| n.id.to_string()).collect());
    assert_eq!(ids, vec!["2", "1"]);

    handle.mark_all_read().await.unwrap();
    assert_eq!(handle.unread_count(), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_push_not_held_up_by_stalled_mount_fetch() {
    let backend = Arc::new(Backend {
        pushes: vec![push_frame(1, "mention", "Asha mentioned you")],
        ..Default::default()
    });
    let origin = spawn_backend(backend.clone()).await;
    let api = Arc::new(StallingApi::new(0, Vec::new()));

    let mut handle = Feed::new(fast_config(&origin), session(), api.clone()).spawn();
    let mut events = handle.subscribe();

    let pushed = wait_delivery(&mut events, DeliveryPath::Push).await;
    assert_eq!(pushed.id, NotificationId::from(1));
    assert_eq!(backend.handshakes.lock().unwrap().len(), 1);
    assert_eq!(api.calls.load(Ordering::SeqCst), 1);

    timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown should not wait on a stalled fetch");
}

#[tokio::test]
async fn test_malformed_frame_does_not_end_push() {
    let backend = Arc::new(Backend {
        pushes: vec![
            json!("garbage"),
            json!({"type": "notification", "payload": {"notification": {"id": 7, "type": "webinar", "content": "?"}}}),
            push_frame(3, "job", "Nova is hiring"),
        ],
        lists: vec![json!([])],
        ..Default::default()
    });
    let origin = spawn_backend(backend).await;

    let mut handle = Feed::new(fast_config(&origin), session(), rest(&origin)).spawn();
    let mut events = handle.subscribe();

    wait_mode(&mut events, TransportMode::Push).await;
    let pushed = wait_delivery(&mut events, DeliveryPath::Push).await;
    assert_eq!(pushed.id, NotificationId::from(3));
    assert_eq!(handle.store().len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(no_mode_change(&mut events, TransportMode::Poll), "push channel should stay up");

    handle.shutdown().await;
}

// ── Degradation ───────────────────────────────────────────────

#[tokio::test]
async fn test_closed_socket_switches_to_polling() {
    let backend = Arc::new(Backend {
        close_after_push: true,
        lists: vec![json!([]), json!([record(5, "mention", "Sana mentioned you in a post")])],
        ..Default::default()
    });
    let origin = spawn_backend(backend.clone()).await;

    let mut handle = Feed::new(fast_config(&origin), session(), rest(&origin)).spawn();
    let mut events = handle.subscribe();

    wait_mode(&mut events, TransportMode::Push).await;
    wait_mode(&mut events, TransportMode::Poll).await;
    let polled = wait_delivery(&mut events, DeliveryPath::Poll).await;
    assert_eq!(polled.id, NotificationId::from(5));
    assert_eq!(handle.unread_count(), 1);
    assert!(backend.list_calls.load(Ordering::SeqCst) >= 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_refused_socket_switches_to_polling() {
    let backend = Arc::new(Backend {
        refuse_socket: true,
        lists: vec![json!([]), json!([record(6, "connection", "Ravi sent you a connection request")])],
        ..Default::default()
    });
    let origin = spawn_backend(backend.clone()).await;

    let mut handle = Feed::new(fast_config(&origin), session(), rest(&origin)).spawn();
    let mut events = handle.subscribe();

    wait_mode(&mut events, TransportMode::Poll).await;
    let polled = wait_delivery(&mut events, DeliveryPath::Poll).await;
    assert_eq!(polled.id, NotificationId::from(6));
    assert!(backend.handshakes.lock().unwrap().is_empty());
    assert!(backend.list_calls.load(Ordering::SeqCst) >= 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_stalled_poll_does_not_stop_later_cycles() {
    let api = Arc::new(StallingApi::new(1, vec![record(8, "pitch", "Zoya shared a pitch")]));
    let mut cfg = FeedConfig::new("http://unused.invalid");
    cfg.socket_origin = Some("mailto:nobody@hfn.example".into());
    cfg.fallback_interval = Duration::from_millis(50);

    let mut handle = Feed::new(cfg, session(), api.clone()).spawn();
    let mut events = handle.subscribe();

    let polled = wait_delivery(&mut events, DeliveryPath::Poll).await;
    assert_eq!(polled.id, NotificationId::from(8));
    eventually(|| api.calls.load(Ordering::SeqCst) >= 6).await;
    assert_eq!(handle.store().len(), 1);

    timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown should not wait on a stalled fetch");
}

#[tokio::test]
async fn test_unconstructible_socket_uses_fallback_timer() {
    let api = Arc::new(ScriptedApi::new(vec![
        vec![],
        vec![record(3, "job", "Tara posted a job")],
    ]));
    let mut cfg = FeedConfig::new("http://unused.invalid");
    cfg.socket_origin = Some("mailto:nobody@hfn.example".into());
    cfg.poll_interval = Duration::from_secs(3600);
    cfg.fallback_interval = Duration::from_millis(100);

    let mut handle = Feed::new(cfg, session(), api.clone()).spawn();
    let mut events = handle.subscribe();

    wait_mode(&mut events, TransportMode::Fallback).await;
    let polled = wait_delivery(&mut events, DeliveryPath::Poll).await;
    assert_eq!(polled.id, NotificationId::from(3));
    assert_eq!(handle.store().len(), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_hidden_page_skips_polls() {
    let api = Arc::new(ScriptedApi::new(vec![
        vec![],
        vec![record(4, "message", "Dev replied")],
    ]));
    let mut cfg = FeedConfig::new("http://unused.invalid");
    cfg.socket_origin = Some("mailto:nobody@hfn.example".into());
    cfg.fallback_interval = Duration::from_millis(50);

    let mut handle = Feed::new(cfg, session(), api.clone())
        .with_page_state(PageState { visible: false, focused: false })
        .spawn();
    let mut events = handle.subscribe();
    wait_mode(&mut events, TransportMode::Fallback).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(api.calls.load(Ordering::SeqCst), 1, "only the mount fetch runs while hidden");

    handle.set_page_state(true, false);
    let polled = wait_delivery(&mut events, DeliveryPath::Poll).await;
    assert_eq!(polled.id, NotificationId::from(4));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_failed_read_all_rolls_back_every_flip() {
    let api = Arc::new(ScriptedApi::new(vec![vec![
        record(2, "job", "Second"),
        json!({"id": 1, "type": "job", "content": "First", "read": true}),
    ]]));
    let mut cfg = FeedConfig::new("http://unused.invalid");
    cfg.socket_origin = Some("mailto:nobody@hfn.example".into());

    let mut handle = Feed::new(cfg, session(), api).spawn();
    let mut events = handle.subscribe();
    // Poll deliveries come out newest first; 1 is the last of the batch.
    wait_for(&mut events, |event| match event {
        FeedEvent::Delivered { notification, .. } if notification.id == NotificationId::from(1) => Some(()),
        _ => None,
    })
    .await;
    assert_eq!(handle.unread_count(), 1);

    assert!(handle.mark_all_read().await.is_err());
    assert_eq!(handle.unread_count(), 1);
    assert!(handle.store().read(|s| s.get(&NotificationId::from(1)).unwrap().read));

    handle.shutdown().await;
}

// ── Desktop popups ────────────────────────────────────────────

#[tokio::test]
async fn test_popups_only_when_unfocused_and_enabled() {
    let backend = Arc::new(Backend {
        pushes: vec![
            push_frame(1, "job", "Lumen is hiring"),
            push_frame(2, "connection", "Vikram sent you a connection request"),
        ],
        lists: vec![json!([])],
        ..Default::default()
    });
    let origin = spawn_backend(backend).await;

    let mut settings = NotificationSettings::default();
    settings.set(NotificationKind::Job, DeliveryChannel::Push, false);
    let desktop = Arc::new(RecordingDesktop::default());

    let mut handle = Feed::new(fast_config(&origin), session(), rest(&origin))
        .with_desktop(desktop.clone())
        .with_settings(settings)
        .with_page_state(PageState { visible: true, focused: false })
        .spawn();
    let mut events = handle.subscribe();

    wait_delivery(&mut events, DeliveryPath::Push).await;
    wait_delivery(&mut events, DeliveryPath::Push).await;
    assert_eq!(*desktop.shown.lock().unwrap(), vec![NotificationId::from(2)]);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_no_popups_while_focused() {
    let backend = Arc::new(Backend {
        pushes: vec![push_frame(1, "mention", "Isha mentioned you")],
        lists: vec![json!([])],
        ..Default::default()
    });
    let origin = spawn_backend(backend).await;
    let desktop = Arc::new(RecordingDesktop::default());

    let mut handle = Feed::new(fast_config(&origin), session(), rest(&origin))
        .with_desktop(desktop.clone())
        .spawn();
    let mut events = handle.subscribe();

    wait_delivery(&mut events, DeliveryPath::Push).await;
    assert!(desktop.shown.lock().unwrap().is_empty());

    handle.shutdown().await;
}

// ── Teardown ──────────────────────────────────────────────────

#[tokio::test]
async fn test_sign_out_clears_store() {
    let backend = Arc::new(Backend {
        pushes: vec![push_frame(1, "message", "Rohan sent a message")],
        lists: vec![json!([])],
        ..Default::default()
    });
    let origin = spawn_backend(backend).await;

    let mut handle = Feed::new(fast_config(&origin), session(), rest(&origin)).spawn();
    let mut events = handle.subscribe();
    wait_delivery(&mut events, DeliveryPath::Push).await;

    let store = handle.store().clone();
    assert_eq!(store.len(), 1);
    timeout(Duration::from_secs(5), handle.sign_out())
        .await
        .expect("sign out should not hang on an open socket");
    assert!(store.is_empty());
}
