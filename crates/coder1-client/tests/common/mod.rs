//! In-process WebSocket server and event recorder shared by the
//! integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use coder1_client::{ClientEvent, EventKind, StreamClient};
use coder1_settings::Coder1Settings;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const TIMEOUT: Duration = Duration::from_secs(5);
pub const GRACE: Duration = Duration::from_millis(200);

enum Outgoing {
    Text(String),
    Drop,
}

/// Scripted server side of the protocol.
pub struct MockServer {
    pub addr: SocketAddr,
    frames: mpsc::UnboundedReceiver<(usize, Value)>,
    conns: Arc<Mutex<Vec<mpsc::UnboundedSender<Outgoing>>>>,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    accept_task: Option<JoinHandle<()>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let conns: Arc<Mutex<Vec<mpsc::UnboundedSender<Outgoing>>>> = Arc::default();
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let task_conns = Arc::clone(&conns);
        let task_accepted = Arc::clone(&accepted);
        let task_closed = Arc::clone(&closed);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let (out_tx, mut out_rx) = mpsc::unbounded_channel();
                let index = {
                    let mut conns = task_conns.lock();
                    conns.push(out_tx);
                    conns.len() - 1
                };
                let _ = task_accepted.fetch_add(1, Ordering::SeqCst);
                let frames_tx = frames_tx.clone();
                let closed = Arc::clone(&task_closed);
                let _ = tokio::spawn(async move {
                    let (mut sink, mut source) = ws.split();
                    loop {
                        tokio::select! {
                            out = out_rx.recv() => match out {
                                Some(Outgoing::Text(text)) => {
                                    if sink.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Some(Outgoing::Drop) | None => break,
                            },
                            msg = source.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                                        let _ = frames_tx.send((index, value));
                                    }
                                }
                                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                        }
                    }
                    let _ = closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            addr,
            frames,
            conns,
            accepted,
            closed,
            accept_task: Some(accept_task),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws/streaming", self.addr)
    }

    /// Settings pointing at this server with short timers.
    pub fn settings(&self) -> Coder1Settings {
        let mut settings = Coder1Settings::default();
        settings.connection.url = Some(self.url());
        settings.connection.max_reconnect_attempts = 3;
        settings.connection.reconnect_interval_ms = 20;
        settings.connection.heartbeat_interval_ms = 0;
        settings.connection.connect_timeout_ms = 1000;
        settings.streams.completion_grace_ms = u64::try_from(GRACE.as_millis()).unwrap();
        settings
    }

    pub fn client(&self) -> StreamClient {
        StreamClient::streaming(&self.settings()).unwrap()
    }

    /// A client that has connected and been registered server side.
    pub async fn connected_client(&self) -> StreamClient {
        let client = self.client();
        client.connect().await.unwrap();
        self.wait_for_connections(self.connection_count().max(1)).await;
        client
    }

    /// Number of completed WebSocket handshakes.
    pub fn connection_count(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Number of server-side connections that have ended.
    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn wait_for_connections(&self, n: usize) {
        let deadline = Instant::now() + TIMEOUT;
        while self.connection_count() < n {
            assert!(
                Instant::now() < deadline,
                "expected {n} connections, saw {}",
                self.connection_count()
            );
            sleep(Duration::from_millis(5)).await;
        }
    }

    /// Send a JSON frame on the most recent connection.
    pub fn send(&self, frame: Value) {
        self.send_raw(&frame.to_string());
    }

    pub fn send_raw(&self, text: &str) {
        let conns = self.conns.lock();
        let latest = conns.last().expect("no connection yet");
        let _ = latest.send(Outgoing::Text(text.to_owned()));
    }

    /// Drop every open socket without a close handshake.
    pub fn drop_connections(&self) {
        for conn in self.conns.lock().iter() {
            let _ = conn.send(Outgoing::Drop);
        }
    }

    /// Close the listening socket so new connections are refused.
    pub async fn stop_accepting(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    pub async fn next_frame(&mut self) -> (usize, Value) {
        timeout(TIMEOUT, self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("frame channel closed")
    }

    /// Next frame of type `ty`, skipping heartbeats and anything else.
    pub async fn next_frame_of_type(&mut self, ty: &str) -> (usize, Value) {
        loop {
            let (conn, frame) = self.next_frame().await;
            if frame["type"] == ty {
                return (conn, frame);
            }
        }
    }

    /// Frames that arrive within `window`.
    pub async fn drain(&mut self, window: Duration) -> Vec<(usize, Value)> {
        let mut out = Vec::new();
        let deadline = Instant::now() + window;
        while let Ok(Some(item)) = timeout(
            deadline.saturating_duration_since(Instant::now()),
            self.frames.recv(),
        )
        .await
        {
            out.push(item);
        }
        out
    }
}

/// Every event a client emitted, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ClientEvent>>>,
}

impl EventLog {
    pub fn attach(client: &StreamClient) -> Self {
        let log = Self::default();
        let sink = Arc::clone(&log.events);
        let _ = client.on_any(move |e| sink.lock().push(e.clone()));
        log
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().clone()
    }

    /// Events excluding the raw `message` echo.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events
            .lock()
            .iter()
            .map(ClientEvent::kind)
            .filter(|k| *k != EventKind::Message)
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub async fn wait_for(&self, kind: EventKind) -> ClientEvent {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            if let Some(event) = self.events.lock().iter().find(|e| e.kind() == kind) {
                return event.clone();
            }
            assert!(Instant::now() < deadline, "timed out waiting for {kind}");
            sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Poll `cond` until it holds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        sleep(Duration::from_millis(5)).await;
    }
}
