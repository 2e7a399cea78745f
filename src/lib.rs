//! # Guess Duel Client
//!
//! Async Rust client for a two-player number-guessing duel.
//!
//! A player asks a lobby server for an opponent over a long-lived HTTP
//! response that streams newline-delimited JSON status records. Once matched,
//! the client opens a duel connection to the address the lobby handed out and
//! plays turn by turn: the server announces whose turn it is in free text, the
//! client validates each guess locally before sending it.
//!
//! ## Features
//!
//! - **Front-end agnostic**: every visible effect is a [`DuelEvent`] on a channel
//! - **Pluggable I/O**: implement [`Lobby`], [`Connector`] and [`Transport`]
//!   for any backend
//! - **HTTP + WebSocket built-in**: default `lobby-http` and
//!   `transport-websocket` features provide [`HttpLobby`] and
//!   [`WebSocketConnector`]
//! - **Localized servers**: [`PhraseSet`](signals::PhraseSet) reads English or
//!   Chinese server text
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), guess_duel_client::DuelClientError> {
//! use guess_duel_client::{DuelClientConfig, DuelEvent, DuelSessionController};
//!
//! let (mut duel, mut events) = DuelSessionController::start_with_defaults(DuelClientConfig::new())?;
//! duel.start_new_match("http://localhost:8080")?;
//!
//! while let Some(event) = events.recv().await {
//!     if let DuelEvent::Status { text, .. } = event {
//!         println!("{text}");
//!     }
//! }
//! duel.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod event;
pub mod framing;
pub mod lobby;
pub mod matchmaking;
pub mod protocol;
pub mod session;
pub mod signals;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use controller::{DuelClientConfig, DuelSessionController};
pub use error::{DuelClientError, GuessRejected};
pub use event::{DuelEvent, StatusTone};
pub use framing::LineFrameDecoder;
pub use lobby::Lobby;
pub use matchmaking::MatchmakingClient;
pub use protocol::{ClientMessage, DuelMessage, MatchmakingOutcome};
pub use session::Phase;
pub use transport::{Connector, Transport};

#[cfg(feature = "lobby-http")]
pub use lobby::HttpLobby;
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
