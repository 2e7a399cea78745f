//! # Scripted Duel Example
//!
//! Plays a whole duel without a network by implementing the three seams the
//! controller talks through:
//!
//! - a [`Lobby`] that streams a canned matchmaking response
//! - a [`Connector`] that hands out in-process loopback [`Transport`]s
//! - a tiny referee task standing in for the duel server
//!
//! The client side plays by bisecting the range the referee reports.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example scripted_duel
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use guess_duel_client::lobby::ByteStream;
use guess_duel_client::{
    ClientMessage, Connector, DuelClientConfig, DuelClientError, DuelEvent,
    DuelSessionController, Lobby, Phase, Transport,
};
use serde_json::json;
use tokio::sync::mpsc;

/// The number the referee picks.
const TARGET: u8 = 37;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A lobby that always finds an opponent
// ─────────────────────────────────────────────────────────────────────

struct ScriptedLobby;

#[async_trait]
impl Lobby for ScriptedLobby {
    async fn open_match_stream(&self, server_address: &str) -> Result<ByteStream, DuelClientError> {
        tracing::info!("Lobby: match requested at {server_address}");
        // The second record is split across chunks the way a real HTTP body
        // may be.
        let chunks: [&'static str; 3] = [
            "{\"status\":\"waiting\",\"message\":\"Waiting for opponent...\"}\n{\"status\":\"mat",
            "ched\",\"message\":\"Opponent found!\",",
            "\"wsUrl\":\"loopback://referee\"}\n",
        ];
        let body = chunks.map(|chunk| Ok::<_, DuelClientError>(Bytes::from_static(chunk.as_bytes())));
        Ok(Box::pin(stream::iter(body)))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A loopback transport and a connector that hands it out
// ─────────────────────────────────────────────────────────────────────

/// Client half of an in-process duel connection.
struct LoopbackTransport {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Referee half of an in-process duel connection.
struct RefereeSide {
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, RefereeSide) {
    let (client_tx, referee_rx) = mpsc::unbounded_channel();
    let (referee_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: Some(client_tx),
            rx: client_rx,
        },
        RefereeSide {
            rx: referee_rx,
            tx: referee_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), DuelClientError> {
        let tx = self.tx.as_ref().ok_or(DuelClientError::TransportClosed)?;
        tx.send(message)
            .map_err(|e| DuelClientError::TransportSend(e.to_string()))
    }

    /// Cancel-safe: `mpsc::UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, DuelClientError>> {
        self.rx.recv().await.map(Ok)
    }

    /// Dropping the sender tells the referee the client left.
    async fn close(&mut self) -> Result<(), DuelClientError> {
        self.tx = None;
        Ok(())
    }
}

struct RefereeConnector;

#[async_trait]
impl Connector for RefereeConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>, DuelClientError> {
        tracing::info!("Connector: dialing {address}");
        let (transport, referee) = loopback_pair();
        tokio::spawn(referee_loop(referee, TARGET));
        Ok(Box::new(transport))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: The referee
// ─────────────────────────────────────────────────────────────────────

/// Single-player referee: it is always the client's turn. Returning drops the
/// referee side, which the client sees as the server closing the connection.
async fn referee_loop(mut side: RefereeSide, target: u8) {
    let (mut low, mut high) = (1u8, 100u8);
    let hint_even = i64::from(target % 2 == 0);

    let _ = side.tx.send(
        json!({
            "type": "start",
            "message": "Game started! It's your turn",
            "isEven": hint_even,
            "sum": -1,
            "isPrime": -1
        })
        .to_string(),
    );

    while let Some(frame) = side.rx.recv().await {
        let Ok(ClientMessage::Guess { number }) = serde_json::from_str(&frame) else {
            let _ = side
                .tx
                .send(json!({ "type": "error", "message": "Bad request" }).to_string());
            continue;
        };
        tracing::info!("Referee: received guess {number}");

        if number == target {
            let _ = side.tx.send(
                json!({
                    "type": "end",
                    "message": format!("Game over! Number was: {target}. You win!")
                })
                .to_string(),
            );
            return;
        }
        if number < target {
            low = number.saturating_add(1);
        } else {
            high = number.saturating_sub(1);
        }
        let _ = side.tx.send(
            json!({
                "type": "update",
                "message": format!("Valid range: {low}-{high}. It's your turn"),
                "isEven": hint_even,
                "sum": -1,
                "isPrime": -1
            })
            .to_string(),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 4: Wire the controller to the fakes and play
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = DuelClientConfig::new().with_match_display_delay(Duration::from_millis(200));
    let (mut duel, mut events) =
        DuelSessionController::start(Arc::new(ScriptedLobby), Arc::new(RefereeConnector), config);

    duel.start_new_match("in-process://lobby")?;

    let mut guesses = 0;
    while let Some(event) = events.recv().await {
        match event {
            DuelEvent::Status { text, tone } => {
                tracing::info!("Status ({tone:?}): {text}");
            }
            DuelEvent::HintsRevealed { hints } => {
                tracing::info!("Hints: {hints:?}");
            }
            DuelEvent::GuessInputEnabled { enabled: true } => {
                let (low, high) = duel.valid_range();
                let guess = (low + high) / 2;
                duel.submit_guess(guess.to_string()).await?;
                guesses += 1;
            }
            DuelEvent::PhaseChanged { phase: Phase::Idle } => break,
            _ => {}
        }
    }

    duel.shutdown().await;
    tracing::info!(
        "Done: {} after {guesses} guess(es)",
        if duel.is_ended() { "duel finished" } else { "duel did not finish" }
    );
    Ok(())
}
