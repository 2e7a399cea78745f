//! # Terminal Duel Example
//!
//! Plays the guessing duel from a terminal:
//!
//! 1. Type `match` to ask the lobby for an opponent
//! 2. When it is your turn, type a number between 1 and 100
//! 3. Type `quit` (or press Ctrl+C) to leave
//!
//! Every [`DuelEvent`] is rendered as a log line.
//!
//! ## Running
//!
//! ```sh
//! # Start the lobby server on localhost:8080, then:
//! cargo run --example terminal_duel
//!
//! # Override the lobby address:
//! GUESS_DUEL_LOBBY=http://my-lobby:8080 cargo run --example terminal_duel
//! ```

use guess_duel_client::{
    DuelClientConfig, DuelClientError, DuelEvent, DuelSessionController, StatusTone,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Default lobby address when `GUESS_DUEL_LOBBY` is not set.
const DEFAULT_LOBBY: &str = "http://localhost:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let lobby = std::env::var("GUESS_DUEL_LOBBY").unwrap_or_else(|_| DEFAULT_LOBBY.to_string());
    tracing::info!("Using lobby at {lobby}");

    let (mut duel, mut events) = DuelSessionController::start_with_defaults(DuelClientConfig::new())?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!("Type `match` to find an opponent, `quit` to leave");

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };
                render(&event);
            }

            line = stdin.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("stdin closed, exiting");
                    break;
                };
                match line.trim() {
                    "" => {}
                    "quit" => break,
                    "match" => duel.start_new_match(lobby.as_str())?,
                    guess => match duel.submit_guess(guess).await {
                        Ok(_) | Err(DuelClientError::InvalidGuess(_)) => {}
                        Err(e) => tracing::error!("Guess not sent: {e}"),
                    },
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    duel.shutdown().await;
    Ok(())
}

fn render(event: &DuelEvent) {
    match event {
        DuelEvent::Status { text, tone } => match tone {
            StatusTone::Info => tracing::info!("{text}"),
            StatusTone::Win => tracing::info!("🏆 {text}"),
            StatusTone::Lose => tracing::info!("💀 {text}"),
            StatusTone::Error => tracing::warn!("{text}"),
        },
        DuelEvent::RangeChanged { low, high } => {
            tracing::info!("Range: {low}-{high}");
        }
        DuelEvent::HintsRevealed { hints } => {
            if let Some(even) = hints.is_even {
                tracing::info!("Hint: the number is {}", if even { "even" } else { "odd" });
            }
            if let Some(sum) = hints.digit_sum {
                tracing::info!("Hint: its digits add up to {sum}");
            }
            if let Some(prime) = hints.is_prime {
                tracing::info!("Hint: it is {}prime", if prime { "" } else { "not " });
            }
        }
        DuelEvent::GuessInputEnabled { enabled: true } => {
            tracing::info!("Your turn, enter a number");
        }
        DuelEvent::MatchButtonEnabled { enabled: true } => {
            tracing::info!("Type `match` to play again");
        }
        DuelEvent::GuessRejected { reason } => {
            tracing::warn!("Guess rejected: {reason}");
        }
        DuelEvent::GuessSent { number } => {
            tracing::debug!("Sent guess {number}");
        }
        other => tracing::debug!(?other, "event"),
    }
}
