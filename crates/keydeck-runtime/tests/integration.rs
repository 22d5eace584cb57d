//! End-to-end tests against an in-process WebSocket host.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use keydeck_core::{ContextId, RegistrationParameters};
use keydeck_protocol::{AppearancePayload, EventKind, KeyPayload};
use keydeck_runtime::{
    Action, ActionContext, ConnectionState, ExitReason, HandlerError, HandlerResult,
    PluginContext, PluginHandler, PluginRuntime, RunningPlugin,
};
use keydeck_settings::KeydeckSettings;

const TIMEOUT: Duration = Duration::from_secs(5);
const TRACKED: &str = "com.example.tracked";

// ── Mock host ──

enum HostCommand {
    Send(String),
    Close,
    Drop,
}

/// Accepts one plugin connection and exposes its frames as a channel.
struct MockHost {
    port: u16,
    frames: mpsc::UnboundedReceiver<String>,
    commands: mpsc::UnboundedSender<HostCommand>,
}

impl MockHost {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (commands, mut command_rx) = mpsc::unbounded_channel();

        drop(tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            loop {
                tokio::select! {
                    msg = ws.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = frame_tx.send(text.to_string());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => break,
                    },
                    cmd = command_rx.recv() => match cmd {
                        Some(HostCommand::Send(text)) => {
                            if ws.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(HostCommand::Close) => {
                            let _ = ws.close(None).await;
                        }
                        Some(HostCommand::Drop) | None => break,
                    },
                }
            }
        }));

        Self {
            port,
            frames,
            commands,
        }
    }

    async fn next_raw(&mut self) -> String {
        timeout(TIMEOUT, self.frames.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("host task ended")
    }

    async fn next_frame(&mut self) -> Value {
        serde_json::from_str(&self.next_raw().await).unwrap()
    }

    fn push(&self, frame: &Value) {
        self.push_raw(frame.to_string());
    }

    fn push_raw(&self, text: impl Into<String>) {
        let _ = self.commands.send(HostCommand::Send(text.into()));
    }

    fn close(&self) {
        let _ = self.commands.send(HostCommand::Close);
    }

    fn drop_transport(&self) {
        let _ = self.commands.send(HostCommand::Drop);
    }
}

// ── Test plugin ──

#[derive(Default)]
struct Counters {
    built: AtomicUsize,
    appeared: AtomicUsize,
    keys: AtomicUsize,
    started: AtomicBool,
}

/// How the test action's `keyDown` handler behaves.
#[derive(Clone, Default)]
struct Behavior {
    fail: bool,
    delay: Option<Duration>,
    /// Park the handler for this context until the notify fires.
    hold: Option<(String, Arc<Notify>)>,
}

impl Behavior {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

struct Recorder {
    counters: Arc<Counters>,
    behavior: Behavior,
}

#[async_trait]
impl Action for Recorder {
    async fn on_will_appear(&self, _cx: &ActionContext, _p: AppearancePayload) -> HandlerResult {
        let _ = self.counters.appeared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_key_down(&self, cx: &ActionContext, _p: KeyPayload) -> HandlerResult {
        self.counters.started.store(true, Ordering::SeqCst);
        if let Some((held, release)) = &self.behavior.hold {
            if cx.context().as_str() == held {
                release.notified().await;
            }
        }
        if let Some(delay) = self.behavior.delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.fail {
            return Err(HandlerError::msg("key failed"));
        }
        let _ = self.counters.keys.fetch_add(1, Ordering::SeqCst);
        cx.set_title("pressed").await?;
        Ok(())
    }
}

/// Answers `systemDidWakeUp` with `getGlobalSettings`, used as a barrier.
struct Marker;

#[async_trait]
impl PluginHandler for Marker {
    async fn on_system_did_wake_up(&self, cx: &PluginContext) -> HandlerResult {
        cx.get_global_settings().await?;
        Ok(())
    }
}

fn settings() -> KeydeckSettings {
    let mut settings = KeydeckSettings::default();
    settings.connection.host = "127.0.0.1".into();
    settings.connection.close_timeout_ms = 500;
    settings.dispatcher.drain_timeout_ms = 2_000;
    settings
}

async fn start_plugin(
    host: &mut MockHost,
    counters: &Arc<Counters>,
    behavior: Behavior,
) -> RunningPlugin {
    let params = RegistrationParameters::new(
        host.port,
        "ABCDEF123456",
        "registerPlugin",
        json!({"application": {"version": "6.0"}}),
    )
    .unwrap();
    let mut runtime = PluginRuntime::new(params, settings());
    let factory_counters = Arc::clone(counters);
    let _ = runtime
        .map_action(TRACKED, move |_cx| {
            let _ = factory_counters.built.fetch_add(1, Ordering::SeqCst);
            Recorder {
                counters: Arc::clone(&factory_counters),
                behavior: behavior.clone(),
            }
        })
        .unwrap()
        .plugin_handler(Marker);

    let running = runtime.start().await.unwrap();
    let registration = host.next_raw().await;
    assert_eq!(
        registration,
        r#"{"event":"registerPlugin","uuid":"ABCDEF123456"}"#
    );
    running
}

fn will_appear(context: &str, action: &str) -> Value {
    json!({
        "event": "willAppear",
        "action": action,
        "context": context,
        "device": "dev1",
        "payload": {"settings": {}, "coordinates": {"column": 1, "row": 2}, "isInMultiAction": false}
    })
}

fn will_disappear(context: &str) -> Value {
    json!({
        "event": "willDisappear",
        "action": TRACKED,
        "context": context,
        "device": "dev1",
        "payload": {"settings": {}, "coordinates": {"column": 1, "row": 2}, "isInMultiAction": false}
    })
}

fn key_down(context: &str) -> Value {
    json!({
        "event": "keyDown",
        "action": TRACKED,
        "context": context,
        "device": "dev1",
        "payload": {"settings": {}, "coordinates": {"column": 1, "row": 2}, "isInMultiAction": false}
    })
}

fn wake() -> Value {
    json!({"event": "systemDidWakeUp"})
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ── Tests ──

#[tokio::test]
async fn registration_is_first_frame_and_session_opens() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::default()).await;
    assert_eq!(running.connection().state(), ConnectionState::Open);
    assert_eq!(running.connection().url(), format!("ws://127.0.0.1:{}/", host.port));
}

#[tokio::test]
async fn key_down_reaches_instance_and_command_comes_back() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::default()).await;

    host.push(&will_appear("ctx1", TRACKED));
    host.push(&key_down("ctx1"));

    let frame = host.next_frame().await;
    assert_eq!(
        frame,
        json!({"context": "ctx1", "payload": {"title": "pressed", "target": 0}, "event": "setTitle"})
    );
    assert_eq!(counters.keys.load(Ordering::SeqCst), 1);
    assert!(running.router().contains(&ContextId::new("ctx1")));
}

#[tokio::test]
async fn key_down_after_disappear_is_dropped() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::default()).await;

    host.push(&will_appear("ctx1", TRACKED));
    host.push(&will_disappear("ctx1"));
    host.push(&key_down("ctx1"));
    host.push(&wake());

    let frame = host.next_frame().await;
    assert_eq!(frame["event"], "getGlobalSettings");
    assert_eq!(frame["context"], "ABCDEF123456");
    assert_eq!(counters.keys.load(Ordering::SeqCst), 0);
    assert_eq!(running.router().instance_count(), 0);
}

#[tokio::test]
async fn duplicate_appear_keeps_one_instance() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::default()).await;

    host.push(&will_appear("ctx1", TRACKED));
    host.push(&will_appear("ctx1", TRACKED));
    wait_until(|| counters.appeared.load(Ordering::SeqCst) == 2).await;

    assert_eq!(counters.built.load(Ordering::SeqCst), 1);
    assert_eq!(running.router().instance_count(), 1);
}

#[tokio::test]
async fn unknown_action_creates_no_instance() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::default()).await;

    host.push(&will_appear("ctx7", "com.example.unregistered"));
    host.push(&wake());
    assert_eq!(host.next_frame().await["event"], "getGlobalSettings");

    assert_eq!(counters.built.load(Ordering::SeqCst), 0);
    assert_eq!(running.router().instance_count(), 0);
}

#[tokio::test]
async fn garbage_frames_do_not_stop_the_loop() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let _running = start_plugin(&mut host, &counters, Behavior::default()).await;

    host.push_raw("{not json");
    host.push_raw(r#"{"payload":{}}"#);
    host.push(&json!({"event": "dialRotate", "context": "ctx1"}));
    host.push(&wake());
    assert_eq!(host.next_frame().await["event"], "getGlobalSettings");
}

#[tokio::test]
async fn hundred_faults_are_isolated_and_reported() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::failing()).await;

    host.push(&will_appear("ctx1", TRACKED));
    for _ in 0..100 {
        host.push(&key_down("ctx1"));
    }

    let mut logs = 0;
    let mut alerts = 0;
    for _ in 0..200 {
        let frame = host.next_frame().await;
        match frame["event"].as_str() {
            Some("logMessage") => {
                logs += 1;
                assert!(frame["payload"]["message"].as_str().unwrap().contains("key failed"));
            }
            Some("showAlert") => {
                alerts += 1;
                assert_eq!(frame["context"], "ctx1");
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert_eq!((logs, alerts), (100, 100));
    assert_eq!(running.dispatcher().fault_count(), 100);

    // the loop is still alive
    host.push(&wake());
    assert_eq!(host.next_frame().await["event"], "getGlobalSettings");
    assert_eq!(running.connection().state(), ConnectionState::Open);
}

#[tokio::test]
async fn slow_handler_does_not_hold_up_other_contexts() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let release = Arc::new(Notify::new());
    let behavior = Behavior {
        hold: Some(("ctx1".to_owned(), Arc::clone(&release))),
        ..Behavior::default()
    };
    let running = start_plugin(&mut host, &counters, behavior).await;

    host.push(&will_appear("ctx1", TRACKED));
    host.push(&will_appear("ctx2", TRACKED));
    host.push(&key_down("ctx1"));
    wait_until(|| counters.started.load(Ordering::SeqCst)).await;
    host.push(&key_down("ctx2"));

    let frame = host.next_frame().await;
    assert_eq!(frame["event"], "setTitle");
    assert_eq!(frame["context"], "ctx2");
    wait_until(|| running.dispatcher().in_flight() == 1).await;
    assert_eq!(counters.keys.load(Ordering::SeqCst), 1);

    release.notify_one();
    let frame = host.next_frame().await;
    assert_eq!(frame["event"], "setTitle");
    assert_eq!(frame["context"], "ctx1");
    assert_eq!(counters.keys.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn subscribers_see_events() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::default()).await;
    let mut events = running.connection().subscribe();

    host.push(&json!({
        "event": "deviceDidConnect",
        "device": "dev9",
        "deviceInfo": {"name": "Desk", "type": 0, "size": {"columns": 5, "rows": 3}}
    }));

    let event = timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, EventKind::DeviceDidConnect);
    assert_eq!(event.device.as_ref().map(|d| d.as_str()), Some("dev9"));
    let info: keydeck_protocol::DeviceInfo = event.payload().unwrap();
    assert_eq!(info.size.columns, 5);
}

#[tokio::test]
async fn transport_drop_faults_session() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::default()).await;

    host.push(&will_appear("ctx1", TRACKED));
    wait_until(|| running.router().instance_count() == 1).await;
    host.drop_transport();

    let state = timeout(TIMEOUT, running.connection().wait_terminal())
        .await
        .unwrap();
    assert_eq!(state, ConnectionState::Faulted);

    let cx = running.router().instance(&ContextId::new("ctx1")).unwrap();
    let err = cx.set_title("late").await.unwrap_err();
    assert!(err.to_string().contains("not open"));

    let report = timeout(TIMEOUT, running.wait()).await.unwrap();
    assert_eq!(report.reason, ExitReason::TransportFault);
    assert!(report.reason.is_fault());
    assert!(cx.is_disposed());
}

#[tokio::test]
async fn host_close_ends_cleanly() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::default()).await;

    host.close();
    let report = timeout(TIMEOUT, running.wait()).await.unwrap();
    assert_eq!(report.reason, ExitReason::HostClosed);
    assert!(!report.reason.is_fault());
}

#[tokio::test]
async fn shutdown_drains_in_flight_work_before_closing() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::slow(Duration::from_millis(200))).await;

    host.push(&will_appear("ctx1", TRACKED));
    host.push(&key_down("ctx1"));
    wait_until(|| counters.started.load(Ordering::SeqCst)).await;

    let token = running.shutdown_token();
    let connection = running.connection().clone();
    token.cancel();
    let report = timeout(TIMEOUT, running.wait()).await.unwrap();

    assert_eq!(report.reason, ExitReason::Shutdown);
    assert!(report.drained);
    assert_eq!(report.faults, 0);
    assert_eq!(counters.keys.load(Ordering::SeqCst), 1);
    assert_eq!(host.next_frame().await["event"], "setTitle");
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert!(connection.send(keydeck_protocol::Command::log("late")).await.is_err());
}

#[tokio::test]
async fn concurrent_sends_each_produce_one_frame() {
    let mut host = MockHost::start().await;
    let counters = Arc::new(Counters::default());
    let running = start_plugin(&mut host, &counters, Behavior::default()).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let connection = running.connection().clone();
        handles.push(tokio::spawn(async move {
            connection
                .send(keydeck_protocol::Command::log(format!("line {i}")))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..20 {
        let frame = host.next_frame().await;
        assert_eq!(frame["event"], "logMessage");
        seen.push(frame["payload"]["message"].as_str().unwrap().to_owned());
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 20);
}
