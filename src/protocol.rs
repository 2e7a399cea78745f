//! Wire types for the lobby and duel protocols.
//!
//! Two protocols are spoken:
//!
//! - **Lobby**: `GET <server>/match` answers with newline-delimited
//!   [`MatchmakingStatusRecord`]s until one of them is terminal.
//! - **Duel**: a persistent text connection carrying [`DuelMessage`]s from the
//!   server and [`ClientMessage`]s from the client, one JSON object per frame.
//!
//! The duel server does not carry structured turn or range fields; those are
//! embedded in the free-form `message` text and extracted by
//! [`signals`](crate::signals).

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Lobby ───────────────────────────────────────────────────────────

/// Status of one matchmaking record.
///
/// Unknown status strings are kept as [`MatchStatus::Unrecognized`] instead of
/// failing the parse, so a lobby reporting `"error"` still ends the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchStatus {
    /// Still queued; the record's message is progress text.
    Waiting,
    /// An opponent was found; the record carries the duel address.
    Matched,
    /// The lobby gave up waiting for an opponent.
    Timeout,
    /// Any other status value, as sent.
    Unrecognized(String),
}

impl From<String> for MatchStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "waiting" => Self::Waiting,
            "matched" => Self::Matched,
            "timeout" => Self::Timeout,
            _ => Self::Unrecognized(raw),
        }
    }
}

impl From<MatchStatus> for String {
    fn from(status: MatchStatus) -> Self {
        match status {
            MatchStatus::Waiting => "waiting".into(),
            MatchStatus::Matched => "matched".into(),
            MatchStatus::Timeout => "timeout".into(),
            MatchStatus::Unrecognized(raw) => raw,
        }
    }
}

/// One line of the matchmaking response stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakingStatusRecord {
    pub status: MatchStatus,
    /// Human-readable progress text.
    #[serde(default)]
    pub message: String,
    /// Duel transport address. Only meaningful when `status` is `matched`.
    #[serde(
        rename = "wsUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transport_address: Option<String>,
}

impl MatchmakingStatusRecord {
    /// Parse one line of the matchmaking stream.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] for malformed lines.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Why a matchmaking attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFailure {
    /// The lobby answered with a non-success HTTP status or was unreachable.
    ServerError,
    /// A `matched` record arrived without a transport address.
    MissingTransportAddress,
    /// A record carried a status this client does not understand.
    InvalidResponse,
    /// The stream ended before any terminal record.
    StreamEnded,
}

impl fmt::Display for MatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ServerError => "matchmaking server error",
            Self::MissingTransportAddress => "invalid server address",
            Self::InvalidResponse => "invalid response from server",
            Self::StreamEnded => "matchmaking failed",
        };
        f.write_str(text)
    }
}

/// Terminal result of one matchmaking attempt. Produced exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchmakingOutcome {
    /// An opponent was found; connect to `transport_address` to duel.
    Matched { transport_address: String },
    /// The lobby timed out waiting for an opponent.
    TimedOut,
    /// The attempt failed.
    Failed { reason: MatchFailure },
}

// ── Duel ────────────────────────────────────────────────────────────

/// Hints about the target number sent with `start` and `update` messages.
///
/// The server reveals a random subset; withheld hints are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hints {
    pub is_even: Option<bool>,
    pub digit_sum: Option<u32>,
    pub is_prime: Option<bool>,
}

impl Hints {
    /// Returns `true` if at least one hint is revealed.
    pub fn any(&self) -> bool {
        self.is_even.is_some() || self.digit_sum.is_some() || self.is_prime.is_some()
    }

    fn from_wire(is_even: Option<i64>, sum: Option<i64>, is_prime: Option<i64>) -> Self {
        let flag = |v: Option<i64>| v.filter(|v| *v >= 0).map(|v| v != 0);
        Self {
            is_even: flag(is_even),
            digit_sum: sum.and_then(|v| u32::try_from(v).ok()),
            is_prime: flag(is_prime),
        }
    }
}

/// A message from the duel server.
///
/// Decoded through a flat frame struct; an unknown `type` becomes
/// [`DuelMessage::Unknown`] rather than a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DuelFrame", into = "DuelFrame")]
pub enum DuelMessage {
    /// Connected, still waiting for the second player.
    Waiting { text: String },
    /// The duel began. The text says who moves first.
    Start { text: String, hints: Hints },
    /// A guess missed. The text carries the narrowed range and whose turn it is.
    Update { text: String, hints: Hints },
    /// The duel is over; the server closes the connection next.
    End { text: String },
    /// The server refused the last action (e.g. out-of-turn guess).
    ErrorNotice { text: String },
    /// A message type this client does not know.
    Unknown { raw_type: String },
}

impl DuelMessage {
    /// Parse one inbound duel frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if the frame is not a JSON
    /// object with a string `type` field.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Wire name of this message's type.
    pub fn kind(&self) -> &str {
        match self {
            Self::Waiting { .. } => "waiting",
            Self::Start { .. } => "start",
            Self::Update { .. } => "update",
            Self::End { .. } => "end",
            Self::ErrorNotice { .. } => "error",
            Self::Unknown { raw_type } => raw_type,
        }
    }
}

/// Flat JSON shape of a duel server frame.
///
/// Hint fields use `-1` for "withheld" on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DuelFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
    #[serde(rename = "isEven", default, skip_serializing_if = "Option::is_none")]
    is_even: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sum: Option<i64>,
    #[serde(rename = "isPrime", default, skip_serializing_if = "Option::is_none")]
    is_prime: Option<i64>,
}

impl From<DuelFrame> for DuelMessage {
    fn from(frame: DuelFrame) -> Self {
        let text = frame.message;
        match frame.kind.as_str() {
            "waiting" => Self::Waiting { text },
            "start" => Self::Start {
                text,
                hints: Hints::from_wire(frame.is_even, frame.sum, frame.is_prime),
            },
            "update" => Self::Update {
                text,
                hints: Hints::from_wire(frame.is_even, frame.sum, frame.is_prime),
            },
            "end" => Self::End { text },
            "error" => Self::ErrorNotice { text },
            other => Self::Unknown {
                raw_type: other.to_string(),
            },
        }
    }
}

impl From<DuelMessage> for DuelFrame {
    fn from(msg: DuelMessage) -> Self {
        let kind = msg.kind().to_string();
        match msg {
            DuelMessage::Start { text, hints } | DuelMessage::Update { text, hints } => {
                let flag = |v: Option<bool>| Some(v.map_or(-1, i64::from));
                DuelFrame {
                    kind,
                    message: text,
                    is_even: flag(hints.is_even),
                    sum: Some(hints.digit_sum.map_or(-1, i64::from)),
                    is_prime: flag(hints.is_prime),
                }
            }
            DuelMessage::Waiting { text }
            | DuelMessage::End { text }
            | DuelMessage::ErrorNotice { text } => DuelFrame {
                kind,
                message: text,
                ..Default::default()
            },
            DuelMessage::Unknown { .. } => DuelFrame {
                kind,
                ..Default::default()
            },
        }
    }
}

/// Message types sent from client to duel server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Guess the target number. Only accepted on the sender's turn.
    Guess { number: u8 },
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

    #[test]
    fn status_record_with_address() {
        let record = MatchmakingStatusRecord::parse(
            r#"{"status":"matched","message":"Opponent found!","wsUrl":"ws://localhost:8081/game"}"#,
        )
        .unwrap();
        assert_eq!(record.status, MatchStatus::Matched);
        assert_eq!(record.message, "Opponent found!");
        assert_eq!(
            record.transport_address.as_deref(),
            Some("ws://localhost:8081/game")
        );
    }

    #[test]
    fn status_record_keeps_unknown_status() {
        let record =
            MatchmakingStatusRecord::parse(r#"{"status":"error","message":"no session"}"#).unwrap();
        assert_eq!(record.status, MatchStatus::Unrecognized("error".into()));
        assert!(record.transport_address.is_none());
    }

    #[test]
    fn status_record_without_status_is_an_error() {
        assert!(MatchmakingStatusRecord::parse(r#"{"message":"hi"}"#).is_err());
        assert!(MatchmakingStatusRecord::parse("not json").is_err());
    }

    #[test]
    fn failure_reasons_display() {
        assert_eq!(MatchFailure::ServerError.to_string(), "matchmaking server error");
        assert_eq!(
            MatchFailure::MissingTransportAddress.to_string(),
            "invalid server address"
        );
        assert_eq!(
            MatchFailure::InvalidResponse.to_string(),
            "invalid response from server"
        );
        assert_eq!(MatchFailure::StreamEnded.to_string(), "matchmaking failed");
    }

    #[test]
    fn start_message_with_hints() {
        let msg = DuelMessage::parse(
            r#"{"type":"start","message":"Game started! It's your turn","isEven":1,"sum":-1,"isPrime":0}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            DuelMessage::Start {
                text: "Game started! It's your turn".into(),
                hints: Hints {
                    is_even: Some(true),
                    digit_sum: None,
                    is_prime: Some(false),
                },
            }
        );
    }

    #[test]
    fn update_without_hint_fields() {
        let msg = DuelMessage::parse(r#"{"type":"update","message":"Valid range: 10-50."}"#).unwrap();
        assert_eq!(
            msg,
            DuelMessage::Update {
                text: "Valid range: 10-50.".into(),
                hints: Hints::default(),
            }
        );
    }

    #[test]
    fn end_ignores_zeroed_hint_fields() {
        let msg = DuelMessage::parse(
            r#"{"type":"end","message":"Game over! You win!","isEven":0,"sum":0,"isPrime":0}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            DuelMessage::End {
                text: "Game over! You win!".into()
            }
        );
    }

    #[test]
    fn error_type_maps_to_error_notice() {
        let msg = DuelMessage::parse(r#"{"type":"error","message":"Not your turn"}"#).unwrap();
        assert_eq!(
            msg,
            DuelMessage::ErrorNotice {
                text: "Not your turn".into()
            }
        );
        assert_eq!(msg.kind(), "error");
    }

    #[test]
    fn unknown_type_is_preserved() {
        let msg = DuelMessage::parse(r#"{"type":"chat","message":"gg"}"#).unwrap();
        assert_eq!(
            msg,
            DuelMessage::Unknown {
                raw_type: "chat".into()
            }
        );
    }

    #[test]
    fn missing_type_fails_to_parse() {
        assert!(DuelMessage::parse(r#"{"message":"x"}"#).is_err());
        assert!(DuelMessage::parse("[1,2]").is_err());
    }

    #[test]
    fn start_serializes_withheld_hints_as_minus_one() {
        let msg = DuelMessage::Start {
            text: "go".into(),
            hints: Hints {
                is_even: None,
                digit_sum: Some(7),
                is_prime: None,
            },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type":"start","message":"go","isEven":-1,"sum":7,"isPrime":-1})
        );
    }

    #[test]
    fn guess_wire_format() {
        let json = serde_json::to_string(&ClientMessage::Guess { number: 50 }).unwrap();
        assert_eq!(json, r#"{"type":"guess","number":50}"#);
    }

    #[test]
    fn hints_any() {
        assert!(!Hints::default().any());
        assert!(Hints {
            digit_sum: Some(3),
            ..Hints::default()
        }
        .any());
    }
}
