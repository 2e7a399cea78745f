#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Guess Duel Client integration tests.
//!
//! Provides a scripted [`MockLobby`], a [`MockConnector`] that hands out
//! channel-backed transports driven through [`DuelServer`] handles, and
//! helpers for building lobby and duel JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use guess_duel_client::lobby::ByteStream;
use guess_duel_client::{
    Connector, DuelClientConfig, DuelClientError, DuelEvent, DuelSessionController, Lobby,
    StatusTone, Transport,
};
use serde_json::json;
use tokio::sync::mpsc;

// ── MockLobby ───────────────────────────────────────────────────────

/// Lobby that answers each match request with the next scripted response.
#[derive(Default)]
pub struct MockLobby {
    responses: StdMutex<VecDeque<Result<ByteStream, DuelClientError>>>,
    /// Every server address a match was requested from.
    pub requests: StdMutex<Vec<String>>,
}

impl MockLobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next request with `lines`, one chunk per line.
    pub fn respond_with_lines(&self, lines: &[String]) {
        let chunks: Vec<Result<Bytes, DuelClientError>> = lines
            .iter()
            .map(|line| Ok(Bytes::from(line.clone())))
            .collect();
        self.respond_with(Box::pin(stream::iter(chunks)));
    }

    /// Answer the next request with a body the test feeds by hand. The body
    /// ends when the sender is dropped.
    pub fn respond_with_channel(&self) -> mpsc::UnboundedSender<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
        let body = stream::unfold(rx, |mut rx| async move {
            rx.recv()
                .await
                .map(|chunk| (Ok::<_, DuelClientError>(chunk), rx))
        });
        self.respond_with(Box::pin(body));
        tx
    }

    /// Fail the next request.
    pub fn refuse(&self, error: DuelClientError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    fn respond_with(&self, body: ByteStream) {
        self.responses.lock().unwrap().push_back(Ok(body));
    }
}

#[async_trait]
impl Lobby for MockLobby {
    async fn open_match_stream(&self, server_address: &str) -> Result<ByteStream, DuelClientError> {
        self.requests
            .lock()
            .unwrap()
            .push(server_address.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(DuelClientError::Http("no scripted lobby response".into())))
    }
}

// ── MockConnector / MockTransport ───────────────────────────────────

/// One entry in the connector's open/close log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnEvent {
    Opened { id: usize, address: String },
    Closed { id: usize },
}

type ConnLog = Arc<StdMutex<Vec<ConnEvent>>>;

#[derive(Default)]
struct ConnectorInner {
    queue: VecDeque<MockTransport>,
    scripted: usize,
}

/// Connector that hands out pre-scripted transports in order. With nothing
/// scripted, connecting fails with `ConnectionRefused`.
#[derive(Default)]
pub struct MockConnector {
    inner: StdMutex<ConnectorInner>,
    log: ConnLog,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transport for the next connect and return its server side.
    /// Transports are numbered from 1 in the order they are scripted.
    pub fn script_server(&self) -> DuelServer {
        let mut inner = self.inner.lock().unwrap();
        inner.scripted += 1;
        let id = inner.scripted;

        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        inner.queue.push_back(MockTransport {
            id,
            incoming: rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
            log: Arc::clone(&self.log),
        });

        DuelServer {
            id,
            tx,
            sent,
            closed,
        }
    }

    /// Everything opened and closed so far, in order.
    pub fn log(&self) -> Vec<ConnEvent> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>, DuelClientError> {
        let next = self.inner.lock().unwrap().queue.pop_front();
        match next {
            Some(transport) => {
                self.log.lock().unwrap().push(ConnEvent::Opened {
                    id: transport.id,
                    address: address.to_string(),
                });
                Ok(Box::new(transport))
            }
            None => Err(DuelClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("nothing listening at {address}"),
            ))),
        }
    }
}

/// Client side of a scripted duel connection.
pub struct MockTransport {
    id: usize,
    incoming: mpsc::UnboundedReceiver<Option<Result<String, DuelClientError>>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    log: ConnLog,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), DuelClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DuelClientError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, DuelClientError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // Server handle dropped without hanging up; stay open.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), DuelClientError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.log.lock().unwrap().push(ConnEvent::Closed { id: self.id });
        }
        Ok(())
    }
}

/// Server side of a scripted duel connection. Messages queued before the
/// client connects are delivered once it does.
pub struct DuelServer {
    pub id: usize,
    tx: mpsc::UnboundedSender<Option<Result<String, DuelClientError>>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl DuelServer {
    /// Deliver one text frame to the client.
    pub fn say(&self, frame: impl Into<String>) {
        let _ = self.tx.send(Some(Ok(frame.into())));
    }

    /// Close the connection from the server side.
    pub fn hang_up(&self) {
        let _ = self.tx.send(None);
    }

    /// Break the connection with a receive error.
    pub fn fail(&self, reason: &str) {
        let _ = self
            .tx
            .send(Some(Err(DuelClientError::TransportReceive(reason.into()))));
    }

    /// Frames the client sent, parsed as JSON.
    pub fn received(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    /// Whether the client closed this connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ── Controller helpers ──────────────────────────────────────────────

pub const LOBBY: &str = "http://lobby.test";

/// Start a controller over the given mocks.
pub fn start_controller(
    lobby: &Arc<MockLobby>,
    connector: &Arc<MockConnector>,
    config: DuelClientConfig,
) -> (DuelSessionController, mpsc::Receiver<DuelEvent>) {
    DuelSessionController::start(
        Arc::clone(lobby) as Arc<dyn Lobby>,
        Arc::clone(connector) as Arc<dyn Connector>,
        config,
    )
}

/// Receive events until one matches `pred`. Returns everything received,
/// the match included.
pub async fn wait_for(
    events: &mut mpsc::Receiver<DuelEvent>,
    pred: impl Fn(&DuelEvent) -> bool,
) -> Vec<DuelEvent> {
    let mut seen = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(30), events.recv()).await {
            Ok(Some(event)) => {
                let done = pred(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
            Ok(None) => panic!("event channel closed; saw {seen:#?}"),
            Err(_) => panic!("timed out waiting for event; saw {seen:#?}"),
        }
    }
}

/// Status lines in `events`, with their tone.
pub fn statuses(events: &[DuelEvent]) -> Vec<(String, StatusTone)> {
    events
        .iter()
        .filter_map(|event| match event {
            DuelEvent::Status { text, tone } => Some((text.clone(), *tone)),
            _ => None,
        })
        .collect()
}

/// Status lines styled as errors.
pub fn error_statuses(events: &[DuelEvent]) -> Vec<String> {
    statuses(events)
        .into_iter()
        .filter(|(_, tone)| *tone == StatusTone::Error)
        .map(|(text, _)| text)
        .collect()
}

// ── Lobby JSON ──────────────────────────────────────────────────────

pub fn lobby_waiting(message: &str) -> String {
    format!("{}\n", json!({ "status": "waiting", "message": message }))
}

pub fn lobby_matched(message: &str, ws_url: &str) -> String {
    format!(
        "{}\n",
        json!({ "status": "matched", "message": message, "wsUrl": ws_url })
    )
}

pub fn lobby_timeout(message: &str) -> String {
    format!("{}\n", json!({ "status": "timeout", "message": message }))
}

// ── Duel JSON ───────────────────────────────────────────────────────

pub fn duel_waiting(message: &str) -> String {
    json!({ "type": "waiting", "message": message }).to_string()
}

pub fn duel_start(message: &str) -> String {
    json!({ "type": "start", "message": message, "isEven": -1, "sum": -1, "isPrime": -1 })
        .to_string()
}

pub fn duel_update(message: &str) -> String {
    json!({ "type": "update", "message": message, "isEven": -1, "sum": -1, "isPrime": -1 })
        .to_string()
}

pub fn duel_end(message: &str) -> String {
    json!({ "type": "end", "message": message }).to_string()
}

pub fn duel_error(message: &str) -> String {
    json!({ "type": "error", "message": message }).to_string()
}
