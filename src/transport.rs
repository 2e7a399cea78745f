//! Transport abstraction for the duel connection.
//!
//! The [`Transport`] trait is a bidirectional text message channel between the
//! client and the duel server. The duel protocol sends one JSON object per
//! message, so every implementation must handle framing internally (WebSocket
//! frames, length-prefixed TCP, in-process channels).
//!
//! Opening a transport is the job of a [`Connector`]: the controller only
//! learns the duel address at runtime, from the lobby, so it needs a way to
//! dial it.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use guess_duel_client::error::DuelClientError;
//! use guess_duel_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), DuelClientError> {
//!         // Send the JSON text message over your transport
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, DuelClientError>> {
//!         // Receive the next JSON text message;
//!         // return None when the connection is closed cleanly
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), DuelClientError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::DuelClientError;

/// A bidirectional text message transport to a duel server.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message;
/// each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: the controller polls it
/// inside `tokio::select!`, and a cancelled `recv` must not lose a message.
/// Channel-based implementations are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`DuelClientError::TransportSend`] if the message could not be
    /// sent, or [`DuelClientError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), DuelClientError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, DuelClientError>>;

    /// Close the connection. Closing twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), DuelClientError>;
}

/// Opens a [`Transport`] to a duel address handed out by the lobby.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect to `address` (for the stock lobby, a `ws://` URL).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>, DuelClientError>;
}
