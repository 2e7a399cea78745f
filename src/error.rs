//! Error types for the guess duel client.

use thiserror::Error;

/// Errors that can occur when using the guess duel client.
#[derive(Debug, Error)]
pub enum DuelClientError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The lobby answered with a non-success HTTP status, or the request
    /// could not be sent at all.
    #[error("lobby HTTP error: {0}")]
    Http(String),

    /// Attempted an operation that requires a live duel, but there is none
    /// (or the controller has shut down).
    #[error("not connected to a duel")]
    NotConnected,

    /// A guess failed local validation and was not sent.
    #[error("guess rejected: {0}")]
    InvalidGuess(#[from] GuessRejected),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a guess was refused before reaching the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuessRejected {
    /// The input did not parse as an integer.
    #[error("{raw:?} is not a whole number")]
    NotANumber { raw: String },

    /// The number is outside the accepted guess bounds.
    #[error("{value} is outside {min}-{max}")]
    OutOfBounds { value: i64, min: u8, max: u8 },

    /// It is not the local player's turn.
    #[error("it is not your turn")]
    NotYourTurn,
}

/// A specialized [`Result`] type for guess duel client operations.
pub type Result<T> = std::result::Result<T, DuelClientError>;
