//! Matchmaking: one lobby request resolved into one outcome.
//!
//! The lobby keeps the `/match` response open while it looks for an opponent
//! and writes one JSON status record per line as things progress. A record is
//! terminal when its status is anything other than `waiting`. Malformed lines
//! are logged and skipped; they never end the attempt.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use tracing::{debug, warn};

use crate::event::{DuelEvent, EventSink};
use crate::framing::LineReader;
use crate::lobby::Lobby;
use crate::protocol::{MatchFailure, MatchStatus, MatchmakingOutcome, MatchmakingStatusRecord};

/// Issues matchmaking requests through a [`Lobby`].
#[derive(Clone)]
pub struct MatchmakingClient {
    lobby: Arc<dyn Lobby>,
}

impl MatchmakingClient {
    pub fn new(lobby: Arc<dyn Lobby>) -> Self {
        Self { lobby }
    }

    /// Request a match and follow the response stream to its outcome.
    ///
    /// Progress messages are surfaced on `events` as they arrive. A lobby that
    /// cannot be reached or answers with an error status resolves to
    /// [`MatchFailure::ServerError`] without retrying.
    pub async fn request_match(&self, server_address: &str, events: &EventSink) -> MatchmakingOutcome {
        match self.lobby.open_match_stream(server_address).await {
            Ok(body) => resolve_match_stream(body, events).await,
            Err(e) => {
                warn!(server = %server_address, "matchmaking request failed: {e}");
                MatchmakingOutcome::Failed {
                    reason: MatchFailure::ServerError,
                }
            }
        }
    }
}

impl fmt::Debug for MatchmakingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchmakingClient").finish_non_exhaustive()
    }
}

/// Read status records from a matchmaking response body until one is terminal.
///
/// Stops reading as soon as the outcome is known; the rest of the body is
/// never polled.
pub async fn resolve_match_stream<S, E>(body: S, events: &EventSink) -> MatchmakingOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    let mut lines = LineReader::new(body);

    while let Some(line) = lines.next_line().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("matchmaking stream broke: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let record = match MatchmakingStatusRecord::parse(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping unreadable matchmaking line: {e} (raw: {line})");
                continue;
            }
        };
        debug!(status = ?record.status, "matchmaking status");

        match record.status {
            MatchStatus::Waiting => {
                events.emit(DuelEvent::status(record.message));
            }
            MatchStatus::Matched => {
                events.emit(DuelEvent::status(record.message));
                return match record.transport_address {
                    Some(transport_address) => MatchmakingOutcome::Matched { transport_address },
                    None => {
                        warn!("matched record carried no transport address");
                        MatchmakingOutcome::Failed {
                            reason: MatchFailure::MissingTransportAddress,
                        }
                    }
                };
            }
            MatchStatus::Timeout => {
                events.emit(DuelEvent::status(record.message));
                return MatchmakingOutcome::TimedOut;
            }
            MatchStatus::Unrecognized(status) => {
                warn!(status = %status, "unrecognized matchmaking status");
                return MatchmakingOutcome::Failed {
                    reason: MatchFailure::InvalidResponse,
                };
            }
        }
    }

    debug!("matchmaking stream ended without a result");
    MatchmakingOutcome::Failed {
        reason: MatchFailure::StreamEnded,
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
    use crate::error::{DuelClientError, Result};
    use crate::lobby::ByteStream;
    use async_trait::async_trait;
    use futures_util::stream;
    use tokio::sync::mpsc;

    fn chunked(chunks: &[&[u8]]) -> impl Stream<Item = Result<Bytes>> + Unpin {
        let owned: Vec<Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(owned)
    }

    fn statuses(rx: &mut mpsc::Receiver<DuelEvent>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DuelEvent::Status { text, .. } = event {
                out.push(text);
            }
        }
        out
    }

    const WAITING_THEN_MATCHED: &[u8] = b"{\"status\":\"waiting\",\"message\":\"m1\"}\n\
{\"status\":\"matched\",\"message\":\"m2\",\"wsUrl\":\"ws://x\"}\n";

    #[tokio::test]
    async fn resolves_matched_regardless_of_chunking() {
        for size in [1, 2, 7, 16, WAITING_THEN_MATCHED.len()] {
            let chunks: Vec<&[u8]> = WAITING_THEN_MATCHED.chunks(size).collect();
            let (sink, mut rx) = EventSink::channel(16);

            let outcome = resolve_match_stream(chunked(&chunks), &sink).await;

            assert_eq!(
                outcome,
                MatchmakingOutcome::Matched {
                    transport_address: "ws://x".into()
                },
                "chunk size {size}"
            );
            assert_eq!(statuses(&mut rx), vec!["m1", "m2"], "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn matched_without_address_fails() {
        let (sink, _rx) = EventSink::channel(16);
        let outcome =
            resolve_match_stream(chunked(&[b"{\"status\":\"matched\",\"message\":\"m\"}\n"]), &sink)
                .await;
        assert_eq!(
            outcome,
            MatchmakingOutcome::Failed {
                reason: MatchFailure::MissingTransportAddress
            }
        );
    }

    #[tokio::test]
    async fn timeout_record_resolves_timed_out() {
        let (sink, mut rx) = EventSink::channel(16);
        let outcome = resolve_match_stream(
            chunked(&[b"{\"status\":\"timeout\",\"message\":\"No opponent found. Please try again.\"}\n"]),
            &sink,
        )
        .await;
        assert_eq!(outcome, MatchmakingOutcome::TimedOut);
        assert_eq!(
            statuses(&mut rx),
            vec!["No opponent found. Please try again."]
        );
    }

    #[tokio::test]
    async fn unknown_status_is_invalid_response() {
        let (sink, _rx) = EventSink::channel(16);
        let outcome = resolve_match_stream(
            chunked(&[b"{\"status\":\"error\",\"message\":\"Failed to create game session\"}\n"]),
            &sink,
        )
        .await;
        assert_eq!(
            outcome,
            MatchmakingOutcome::Failed {
                reason: MatchFailure::InvalidResponse
            }
        );
    }

    #[tokio::test]
    async fn malformed_and_blank_lines_are_skipped() {
        let (sink, mut rx) = EventSink::channel(16);
        let outcome = resolve_match_stream(
            chunked(&[
                b"garbage\n\n   \n{\"message\":\"no status\"}\n",
                b"{\"status\":\"matched\",\"message\":\"ok\",\"wsUrl\":\"ws://y\"}\n",
            ]),
            &sink,
        )
        .await;
        assert_eq!(
            outcome,
            MatchmakingOutcome::Matched {
                transport_address: "ws://y".into()
            }
        );
        assert_eq!(statuses(&mut rx), vec!["ok"]);
    }

    #[tokio::test]
    async fn stream_end_without_terminal_record_fails() {
        let (sink, _rx) = EventSink::channel(16);
        let outcome = resolve_match_stream(
            chunked(&[b"{\"status\":\"waiting\",\"message\":\"m1\"}\n{\"status\":\"matc"]),
            &sink,
        )
        .await;
        assert_eq!(
            outcome,
            MatchmakingOutcome::Failed {
                reason: MatchFailure::StreamEnded
            }
        );
    }

    #[tokio::test]
    async fn stream_error_fails() {
        let (sink, _rx) = EventSink::channel(16);
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"{\"status\":\"waiting\",\"message\":\"m1\"}\n")),
            Err(DuelClientError::Http("connection reset".into())),
        ]);
        let outcome = resolve_match_stream(body, &sink).await;
        assert_eq!(
            outcome,
            MatchmakingOutcome::Failed {
                reason: MatchFailure::StreamEnded
            }
        );
    }

    #[tokio::test]
    async fn lines_after_terminal_record_are_not_read() {
        let (sink, mut rx) = EventSink::channel(16);
        let outcome = resolve_match_stream(
            chunked(&[
                b"{\"status\":\"timeout\",\"message\":\"t\"}\n",
                b"{\"status\":\"waiting\",\"message\":\"late\"}\n",
            ]),
            &sink,
        )
        .await;
        assert_eq!(outcome, MatchmakingOutcome::TimedOut);
        assert_eq!(statuses(&mut rx), vec!["t"]);
    }

    struct RefusingLobby;

    #[async_trait]
    impl Lobby for RefusingLobby {
        async fn open_match_stream(&self, _server_address: &str) -> Result<ByteStream> {
            Err(DuelClientError::Http("match request failed with status 500".into()))
        }
    }

    #[tokio::test]
    async fn lobby_error_is_server_error() {
        let client = MatchmakingClient::new(Arc::new(RefusingLobby));
        let (sink, _rx) = EventSink::channel(16);
        let outcome = client.request_match("http://localhost:8080", &sink).await;
        assert_eq!(
            outcome,
            MatchmakingOutcome::Failed {
                reason: MatchFailure::ServerError
            }
        );
    }
}
