//! Async duel session controller.
//!
//! [`DuelSessionController`] is a thin handle that talks to a background
//! task over an unbounded command channel. The task owns the
//! [`SessionState`], the in-flight matchmaking attempt, the display-delay
//! timer and the live duel transport, and handles one event at a time.
//! UI-facing [`DuelEvent`]s are emitted on a bounded channel returned from
//! [`DuelSessionController::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), guess_duel_client::DuelClientError> {
//! use guess_duel_client::{DuelClientConfig, DuelEvent, DuelSessionController};
//!
//! let (mut duel, mut events) = DuelSessionController::start_with_defaults(DuelClientConfig::new())?;
//! duel.start_new_match("http://localhost:8080")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         DuelEvent::GuessInputEnabled { enabled: true } => {
//!             duel.submit_guess("50").await?;
//!         }
//!         DuelEvent::Status { text, .. } => println!("{text}"),
//!         _ => {}
//!     }
//! }
//! duel.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

use crate::error::{DuelClientError, Result};
use crate::event::{DuelEvent, EventSink};
use crate::lobby::Lobby;
use crate::matchmaking::MatchmakingClient;
use crate::protocol::{ClientMessage, DuelMessage, MatchmakingOutcome};
use crate::session::{Phase, SessionState};
use crate::signals::PhraseSet;
use crate::transport::{Connector, Transport};

/// Default pause between a match being found and dialing the duel server.
const DEFAULT_MATCH_DISPLAY_DELAY: Duration = Duration::from_millis(1000);

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`DuelSessionController`].
///
/// # Example
///
/// ```
/// use guess_duel_client::controller::DuelClientConfig;
/// use guess_duel_client::signals::PhraseSet;
/// use std::time::Duration;
///
/// let config = DuelClientConfig::new()
///     .with_phrases(PhraseSet::CHINESE)
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.match_display_delay, Duration::from_millis(1000));
/// ```
#[derive(Debug, Clone)]
pub struct DuelClientConfig {
    /// How long the "matched" message stays up before the duel connection is
    /// opened.
    ///
    /// Defaults to **1000 ms**.
    pub match_display_delay: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) so the controller task never blocks.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`DuelSessionController::shutdown`] is called, the background task
    /// is given this much time to close the duel transport. If the timeout
    /// expires the task is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Phrases used to read turn, range and result out of server text.
    ///
    /// Defaults to [`PhraseSet::ENGLISH`].
    pub phrases: PhraseSet,
}

impl Default for DuelClientConfig {
    fn default() -> Self {
        Self {
            match_display_delay: DEFAULT_MATCH_DISPLAY_DELAY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            phrases: PhraseSet::default(),
        }
    }
}

impl DuelClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pause between a match being found and dialing the duel server.
    #[must_use]
    pub fn with_match_display_delay(mut self, delay: Duration) -> Self {
        self.match_display_delay = delay;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Read server text with a different phrase set.
    #[must_use]
    pub fn with_phrases(mut self, phrases: PhraseSet) -> Self {
        self.phrases = phrases;
        self
    }
}

// ── Handle ──────────────────────────────────────────────────────────

enum Command {
    StartMatch {
        server_address: String,
    },
    Guess {
        raw: String,
        reply: oneshot::Sender<Result<u8>>,
    },
}

/// Async handle for one player's duel session.
///
/// Created via [`DuelSessionController::start`], which spawns the background
/// task and returns this handle together with an event receiver.
pub struct DuelSessionController {
    /// Sender half of the command channel to the background task.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Latest session snapshot, published after every transition.
    state_rx: watch::Receiver<SessionState>,
    /// Handle to the background task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the background task to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl DuelSessionController {
    /// Start the controller task and return a handle plus event receiver.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `lobby` - Opens matchmaking requests.
    /// * `connector` - Dials the duel address the lobby hands out.
    /// * `config` - Timing, channel and phrase settings.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        lobby: Arc<dyn Lobby>,
        connector: Arc<dyn Connector>,
        config: DuelClientConfig,
    ) -> (Self, mpsc::Receiver<DuelEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (events, event_rx) = EventSink::channel(config.event_channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = SessionState::new(config.phrases);
        let (state_tx, state_rx) = watch::channel(state.clone());

        let duel_loop = DuelLoop {
            state,
            state_tx,
            events,
            matchmaking: MatchmakingClient::new(lobby),
            connector,
            display_delay: config.match_display_delay,
            transport: None,
            pending_match: None,
            pending_connect: None,
            connecting: None,
        };
        let task = tokio::spawn(duel_loop.run(cmd_rx, shutdown_rx));

        let controller = Self {
            cmd_tx,
            state_rx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (controller, event_rx)
    }

    /// Start with the HTTP lobby and the WebSocket connector.
    ///
    /// # Errors
    ///
    /// Returns [`DuelClientError::Http`] if the HTTP client cannot be built.
    #[cfg(all(feature = "lobby-http", feature = "transport-websocket"))]
    pub fn start_with_defaults(
        config: DuelClientConfig,
    ) -> Result<(Self, mpsc::Receiver<DuelEvent>)> {
        let lobby = crate::lobby::HttpLobby::new()?;
        let connector = crate::transports::WebSocketConnector::new();
        Ok(Self::start(Arc::new(lobby), Arc::new(connector), config))
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Look for an opponent through the lobby at `server_address`.
    ///
    /// Any open duel connection is closed first. A matchmaking attempt or
    /// duel connection still pending from an earlier call is abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`DuelClientError::NotConnected`] if the controller has shut
    /// down.
    pub fn start_new_match(&self, server_address: impl Into<String>) -> Result<()> {
        self.cmd_tx
            .send(Command::StartMatch {
                server_address: server_address.into(),
            })
            .map_err(|_| DuelClientError::NotConnected)
    }

    /// Validate `raw` and, if it is acceptable, send it as a guess.
    ///
    /// Resolves once the guess has been handed to the transport.
    ///
    /// # Errors
    ///
    /// - [`DuelClientError::InvalidGuess`] if `raw` is not a whole number in
    ///   `[1, 100]` or it is not the local player's turn. Nothing is sent.
    /// - [`DuelClientError::NotConnected`] if there is no duel connection or
    ///   the controller has shut down.
    /// - A transport error if the send itself failed.
    pub async fn submit_guess(&self, raw: impl Into<String>) -> Result<u8> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Guess {
                raw: raw.into(),
                reply,
            })
            .map_err(|_| DuelClientError::NotConnected)?;
        reply_rx.await.map_err(|_| DuelClientError::NotConnected)?
    }

    /// Shut down the controller, closing any duel connection and stopping the
    /// background task.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// the task exits.
    pub async fn shutdown(&mut self) {
        debug!("DuelSessionController: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("duel loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("duel loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("duel loop aborted: {join_err}");
                    }
                }
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.state_rx.borrow().phase()
    }

    /// Inclusive range the next guess should fall in, as last reported.
    pub fn valid_range(&self) -> (u32, u32) {
        self.state_rx.borrow().valid_range()
    }

    /// Returns `true` once the server has ended the current duel.
    pub fn is_ended(&self) -> bool {
        self.state_rx.borrow().is_ended()
    }

    /// A copy of the whole session state.
    pub fn snapshot(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }
}

impl std::fmt::Debug for DuelSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelSessionController")
            .field("phase", &self.phase())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for DuelSessionController {
    fn drop(&mut self) {
        // No executor to drive an async close here; abort the task instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Background task ─────────────────────────────────────────────────

struct PendingConnect {
    delay: Pin<Box<Sleep>>,
    address: String,
}

/// State owned by the background task.
struct DuelLoop {
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    events: EventSink,
    matchmaking: MatchmakingClient,
    connector: Arc<dyn Connector>,
    display_delay: Duration,
    /// Live duel connection. At most one at a time.
    transport: Option<Box<dyn Transport>>,
    /// In-flight matchmaking attempt.
    pending_match: Option<BoxFuture<'static, MatchmakingOutcome>>,
    /// Matched; waiting out the display delay before dialing.
    pending_connect: Option<PendingConnect>,
    /// Dialing the duel server.
    connecting: Option<BoxFuture<'static, Result<Box<dyn Transport>>>>,
}

impl DuelLoop {
    /// Multiplex commands, matchmaking, the display delay, connection setup
    /// and inbound duel messages via `tokio::select!`.
    ///
    /// Exits when the shutdown signal fires or the command channel closes.
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("duel loop started");

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::StartMatch { server_address }) => {
                            self.start_match(server_address).await;
                        }
                        Some(Command::Guess { raw, reply }) => {
                            let result = self.submit_guess(&raw).await;
                            let _ = reply.send(result);
                        }
                        None => {
                            debug!("command channel closed, shutting down duel loop");
                            break;
                        }
                    }
                }

                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    break;
                }

                outcome = next_outcome(&mut self.pending_match) => {
                    self.pending_match = None;
                    self.matchmaking_resolved(outcome);
                }

                () = delay_elapsed(&mut self.pending_connect) => {
                    if let Some(PendingConnect { address, .. }) = self.pending_connect.take() {
                        self.begin_connect(address);
                    }
                }

                connected = connect_result(&mut self.connecting) => {
                    self.connecting = None;
                    match connected {
                        Ok(transport) => {
                            info!("duel connection open, waiting for the server");
                            self.transport = Some(transport);
                        }
                        Err(e) => {
                            error!("failed to open duel connection: {e}");
                            let events = self.state.transport_failed();
                            self.publish(events);
                        }
                    }
                }

                incoming = next_frame(&mut self.transport) => {
                    self.handle_incoming(incoming).await;
                }
            }
        }

        self.close_transport().await;
        self.pending_match = None;
        self.pending_connect = None;
        self.connecting = None;
        let events = self.state.abandon();
        self.publish(events);

        debug!("duel loop exited");
    }

    async fn start_match(&mut self, server_address: String) {
        self.close_transport().await;
        if self.pending_match.take().is_some() {
            debug!("abandoning in-flight matchmaking attempt");
        }
        if self.pending_connect.take().is_some() || self.connecting.take().is_some() {
            debug!("abandoning pending duel connection");
        }

        let events = self.state.begin_matchmaking();
        self.publish(events);

        let matchmaking = self.matchmaking.clone();
        let events = self.events.clone();
        self.pending_match = Some(Box::pin(async move {
            matchmaking.request_match(&server_address, &events).await
        }));
    }

    fn matchmaking_resolved(&mut self, outcome: MatchmakingOutcome) {
        debug!(?outcome, "matchmaking resolved");
        self.events.emit(DuelEvent::MatchmakingResolved {
            outcome: outcome.clone(),
        });
        let events = self.state.matchmaking_resolved(&outcome);
        self.publish(events);

        if let MatchmakingOutcome::Matched { transport_address } = outcome {
            self.pending_connect = Some(PendingConnect {
                delay: Box::pin(tokio::time::sleep(self.display_delay)),
                address: transport_address,
            });
        }
    }

    fn begin_connect(&mut self, address: String) {
        debug!(address = %address, "opening duel connection");
        let connector = Arc::clone(&self.connector);
        self.connecting = Some(Box::pin(async move { connector.connect(&address).await }));
    }

    async fn handle_incoming(&mut self, incoming: Option<Result<String>>) {
        match incoming {
            Some(Ok(text)) => {
                let events = match DuelMessage::parse(&text) {
                    Ok(message) => {
                        debug!(kind = message.kind(), "duel message");
                        self.state.apply(message)
                    }
                    Err(e) => {
                        warn!("failed to decode duel message: {e} (raw: {text})");
                        self.state.message_unreadable()
                    }
                };
                self.publish(events);
            }
            Some(Err(e)) => {
                if self.state.is_ended() {
                    debug!("duel transport error after end of duel: {e}");
                } else {
                    error!("duel transport error: {e}");
                }
                self.close_transport().await;
                let events = self.state.transport_failed();
                self.publish(events);
            }
            None => {
                debug!("duel transport closed by server");
                self.transport = None;
                let events = self.state.transport_closed();
                self.publish(events);
            }
        }
    }

    async fn submit_guess(&mut self, raw: &str) -> Result<u8> {
        let number = match self.state.validate_guess(raw) {
            Ok(number) => number,
            Err(reason) => {
                debug!(%reason, "guess rejected");
                self.events.emit(DuelEvent::GuessRejected {
                    reason: reason.clone(),
                });
                return Err(reason.into());
            }
        };

        let Some(transport) = self.transport.as_mut() else {
            return Err(DuelClientError::NotConnected);
        };
        let json = serde_json::to_string(&ClientMessage::Guess { number })?;
        if let Err(e) = transport.send(json).await {
            error!("duel transport send error: {e}");
            self.close_transport().await;
            let events = self.state.transport_failed();
            self.publish(events);
            return Err(e);
        }

        let events = self.state.guess_sent(number);
        self.publish(events);
        Ok(number)
    }

    async fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            debug!("closing duel connection");
            if let Err(e) = transport.close().await {
                debug!("duel transport close failed: {e}");
            }
        }
    }

    /// Publish the current state snapshot, then emit `events`.
    fn publish(&self, events: Vec<DuelEvent>) {
        self.state_tx.send_replace(self.state.clone());
        self.events.emit_all(events);
    }
}

// Each helper stays pending while its slot is empty, so the matching
// `select!` branch is never taken.

async fn next_outcome(
    pending_match: &mut Option<BoxFuture<'static, MatchmakingOutcome>>,
) -> MatchmakingOutcome {
    match pending_match {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn delay_elapsed(pending_connect: &mut Option<PendingConnect>) {
    match pending_connect {
        Some(p) => p.delay.as_mut().await,
        None => pending().await,
    }
}

async fn connect_result(
    connecting: &mut Option<BoxFuture<'static, Result<Box<dyn Transport>>>>,
) -> Result<Box<dyn Transport>> {
    match connecting {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_frame(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<String>> {
    match transport {
        Some(t) => t.recv().await,
        None => pending().await,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::GuessRejected;
    use crate::lobby::ByteStream;
    use async_trait::async_trait;

    /// Lobby that never answers.
    struct SilentLobby;

    #[async_trait]
    impl Lobby for SilentLobby {
        async fn open_match_stream(&self, _server_address: &str) -> Result<ByteStream> {
            pending().await
        }
    }

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _address: &str) -> Result<Box<dyn Transport>> {
            Err(DuelClientError::TransportClosed)
        }
    }

    fn start(config: DuelClientConfig) -> (DuelSessionController, mpsc::Receiver<DuelEvent>) {
        DuelSessionController::start(Arc::new(SilentLobby), Arc::new(RefusingConnector), config)
    }

    #[test]
    fn config_defaults() {
        let config = DuelClientConfig::new();
        assert_eq!(config.match_display_delay, Duration::from_millis(1000));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.phrases, PhraseSet::ENGLISH);
    }

    #[test]
    fn config_builder_methods() {
        let config = DuelClientConfig::new()
            .with_match_display_delay(Duration::from_millis(10))
            .with_event_channel_capacity(0)
            .with_shutdown_timeout(Duration::from_secs(5))
            .with_phrases(PhraseSet::CHINESE);
        assert_eq!(config.match_display_delay, Duration::from_millis(10));
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.phrases, PhraseSet::CHINESE);
    }

    #[tokio::test]
    async fn starts_idle() {
        let (mut duel, _events) = start(DuelClientConfig::new());
        assert_eq!(duel.phase(), Phase::Idle);
        assert_eq!(duel.valid_range(), (1, 100));
        assert!(!duel.is_ended());
        duel.shutdown().await;
    }

    #[tokio::test]
    async fn guess_before_duel_is_rejected_locally() {
        let (mut duel, mut events) = start(DuelClientConfig::new());
        let err = duel.submit_guess("50").await.unwrap_err();
        assert!(matches!(
            err,
            DuelClientError::InvalidGuess(GuessRejected::NotYourTurn)
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            DuelEvent::GuessRejected {
                reason: GuessRejected::NotYourTurn
            }
        );
        duel.shutdown().await;
    }

    #[tokio::test]
    async fn start_new_match_enters_matchmaking() {
        let (mut duel, mut events) = start(DuelClientConfig::new());
        duel.start_new_match("http://lobby").unwrap();

        loop {
            if let DuelEvent::PhaseChanged { phase } = events.recv().await.unwrap() {
                assert_eq!(phase, Phase::Matchmaking);
                break;
            }
        }
        assert_eq!(duel.phase(), Phase::Matchmaking);
        duel.shutdown().await;
    }

    #[tokio::test]
    async fn commands_fail_after_shutdown() {
        let (mut duel, _events) = start(DuelClientConfig::new());
        duel.shutdown().await;
        assert!(matches!(
            duel.start_new_match("http://lobby"),
            Err(DuelClientError::NotConnected)
        ));
        assert!(matches!(
            duel.submit_guess("50").await,
            Err(DuelClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn shutdown_closes_event_channel() {
        let (mut duel, mut events) = start(DuelClientConfig::new());
        duel.shutdown().await;
        while events.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn zero_shutdown_timeout_does_not_hang() {
        let (mut duel, _events) =
            start(DuelClientConfig::new().with_shutdown_timeout(Duration::ZERO));
        duel.shutdown().await;
    }
}
