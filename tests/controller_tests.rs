#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for `DuelSessionController`.
//!
//! All tests run on paused time: the 1000 ms display delay elapses as soon as
//! the runtime has nothing else to do.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::*;
use guess_duel_client::protocol::MatchFailure;
use guess_duel_client::signals::PhraseSet;
use guess_duel_client::{
    DuelClientConfig, DuelClientError, DuelEvent, DuelSessionController, GuessRejected,
    MatchmakingOutcome, Phase, StatusTone,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    lobby: Arc<MockLobby>,
    connector: Arc<MockConnector>,
    duel: DuelSessionController,
    events: mpsc::Receiver<DuelEvent>,
}

fn harness(config: DuelClientConfig) -> Harness {
    let lobby = Arc::new(MockLobby::new());
    let connector = Arc::new(MockConnector::new());
    let (duel, events) = start_controller(&lobby, &connector, config);
    Harness {
        lobby,
        connector,
        duel,
        events,
    }
}

/// Script a lobby match to `ws_url`, start matchmaking and return the duel
/// server the controller will connect to.
fn match_into_duel(h: &Harness, ws_url: &str) -> DuelServer {
    h.lobby.respond_with_lines(&[
        lobby_waiting("Waiting for opponent..."),
        lobby_matched("Opponent found! Connecting...", ws_url),
    ]);
    let server = h.connector.script_server();
    h.duel.start_new_match(LOBBY).unwrap();
    server
}

fn is_input_enabled(enabled: bool) -> impl Fn(&DuelEvent) -> bool {
    move |e| *e == DuelEvent::GuessInputEnabled { enabled }
}

fn is_phase(phase: Phase) -> impl Fn(&DuelEvent) -> bool {
    move |e| *e == DuelEvent::PhaseChanged { phase }
}

fn is_resolved(e: &DuelEvent) -> bool {
    matches!(e, DuelEvent::MatchmakingResolved { .. })
}

// ── Matchmaking ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn matchmaking_surfaces_progress_then_connects_after_delay() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_waiting("Waiting for another player..."));

    let seen = wait_for(&mut h.events, is_resolved).await;
    let matched_at = Instant::now();
    assert_eq!(
        statuses(&seen)
            .into_iter()
            .map(|(text, _)| text)
            .collect::<Vec<_>>(),
        vec![
            "Finding opponent...",
            "Waiting for opponent...",
            "Opponent found! Connecting..."
        ]
    );
    assert_eq!(
        seen.last(),
        Some(&DuelEvent::MatchmakingResolved {
            outcome: MatchmakingOutcome::Matched {
                transport_address: "ws://duel.test/game".into()
            }
        })
    );
    assert_eq!(h.duel.phase(), Phase::Matchmaking);
    assert!(h.connector.log().is_empty());

    let seen = wait_for(&mut h.events, |e| {
        *e == DuelEvent::DuelAreaVisible { visible: false }
    })
    .await;
    assert!(matched_at.elapsed() >= Duration::from_millis(1000));
    assert!(seen.contains(&DuelEvent::status("Waiting for another player...")));
    assert_eq!(
        h.connector.log(),
        vec![ConnEvent::Opened {
            id: 1,
            address: "ws://duel.test/game".into()
        }]
    );
    assert_eq!(*h.lobby.requests.lock().unwrap(), vec![LOBBY.to_string()]);

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn match_display_delay_is_configurable() {
    let mut h = harness(DuelClientConfig::new().with_match_display_delay(Duration::from_millis(50)));
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_waiting("hello"));

    wait_for(&mut h.events, is_resolved).await;
    let matched_at = Instant::now();
    wait_for(&mut h.events, |e| *e == DuelEvent::status("hello")).await;

    let waited = matched_at.elapsed();
    assert!(waited >= Duration::from_millis(50));
    assert!(waited < Duration::from_millis(1000));

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn lobby_timeout_returns_to_idle() {
    let mut h = harness(DuelClientConfig::new());
    h.lobby.respond_with_lines(&[
        lobby_waiting("Waiting for opponent..."),
        lobby_timeout("No opponent found. Please try again."),
    ]);
    h.duel.start_new_match(LOBBY).unwrap();

    let seen = wait_for(&mut h.events, |e| {
        *e == DuelEvent::MatchButtonEnabled { enabled: true }
    })
    .await;
    assert!(seen.contains(&DuelEvent::MatchmakingResolved {
        outcome: MatchmakingOutcome::TimedOut
    }));
    assert!(seen.contains(&DuelEvent::status("No opponent found. Please try again.")));
    assert!(error_statuses(&seen).is_empty());
    assert_eq!(h.duel.phase(), Phase::Idle);
    assert!(h.connector.log().is_empty());

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn lobby_error_status_is_reported() {
    let mut h = harness(DuelClientConfig::new());
    h.lobby
        .refuse(DuelClientError::Http("match request failed with status 503".into()));
    h.duel.start_new_match(LOBBY).unwrap();

    let seen = wait_for(&mut h.events, |e| {
        *e == DuelEvent::MatchButtonEnabled { enabled: true }
    })
    .await;
    assert!(seen.contains(&DuelEvent::MatchmakingResolved {
        outcome: MatchmakingOutcome::Failed {
            reason: MatchFailure::ServerError
        }
    }));
    assert_eq!(
        error_statuses(&seen),
        vec!["matchmaking server error, please try again"]
    );
    assert_eq!(h.duel.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn matched_without_address_never_connects() {
    let mut h = harness(DuelClientConfig::new());
    h.lobby
        .respond_with_lines(&["{\"status\":\"matched\",\"message\":\"Opponent found!\"}\n".into()]);
    h.duel.start_new_match(LOBBY).unwrap();

    let seen = wait_for(&mut h.events, is_phase(Phase::Idle)).await;
    assert_eq!(
        error_statuses(&seen),
        vec!["invalid server address, please try again"]
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(h.connector.log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn lobby_stream_ending_early_fails_the_attempt() {
    let mut h = harness(DuelClientConfig::new());
    h.lobby
        .respond_with_lines(&[lobby_waiting("Waiting for opponent..."), "{\"status\":".into()]);
    h.duel.start_new_match(LOBBY).unwrap();

    let seen = wait_for(&mut h.events, is_phase(Phase::Idle)).await;
    assert_eq!(
        error_statuses(&seen),
        vec!["matchmaking failed, please try again"]
    );
}

// ── Turn gating and guesses ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn guess_is_sent_only_on_local_turn() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! It's your turn"));

    let seen = wait_for(&mut h.events, is_input_enabled(true)).await;
    assert!(seen.contains(&DuelEvent::DuelAreaVisible { visible: true }));
    assert_eq!(h.duel.phase(), Phase::LocalTurn);

    assert_eq!(assert_ok!(h.duel.submit_guess("50").await), 50);
    assert_eq!(
        server.received(),
        vec![json!({ "type": "guess", "number": 50 })]
    );
    assert_eq!(h.duel.phase(), Phase::AwaitingOpponentTurn);

    // The turn passed with the guess.
    let err = assert_err!(h.duel.submit_guess("40").await);
    assert!(matches!(
        err,
        DuelClientError::InvalidGuess(GuessRejected::NotYourTurn)
    ));

    server.say(duel_update("Too high! Valid range: 1-49. Opponent's turn"));
    wait_for(&mut h.events, |e| {
        *e == DuelEvent::RangeChanged { low: 1, high: 49 }
    })
    .await;
    assert_eq!(h.duel.valid_range(), (1, 49));

    let err = assert_err!(h.duel.submit_guess("20").await);
    assert!(matches!(
        err,
        DuelClientError::InvalidGuess(GuessRejected::NotYourTurn)
    ));
    assert_eq!(server.received().len(), 1);

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn opponent_first_start_blocks_guessing() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! Opponent's turn"));

    wait_for(&mut h.events, is_phase(Phase::AwaitingOpponentTurn)).await;
    assert_err!(h.duel.submit_guess("50").await);
    assert!(server.received().is_empty());

    server.say(duel_update("Too low! Valid range: 51-100. It's your turn"));
    wait_for(&mut h.events, is_input_enabled(true)).await;
    assert_eq!(h.duel.valid_range(), (51, 100));
    assert_ok!(h.duel.submit_guess("75").await);

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn guess_bounds_are_inclusive() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! It's your turn"));
    wait_for(&mut h.events, is_input_enabled(true)).await;

    for raw in ["0", "101", "-5", "abc", "5.5", "50abc", ""] {
        let err = assert_err!(h.duel.submit_guess(raw).await);
        assert!(
            matches!(err, DuelClientError::InvalidGuess(_)),
            "{raw:?} gave {err:?}"
        );
    }
    assert!(server.received().is_empty());
    assert_eq!(h.duel.phase(), Phase::LocalTurn);

    assert_eq!(assert_ok!(h.duel.submit_guess(" 1 ").await), 1);

    server.say(duel_update("Too low! Valid range: 2-100. It's your turn"));
    wait_for(&mut h.events, is_input_enabled(true)).await;
    assert_eq!(assert_ok!(h.duel.submit_guess("100").await), 100);

    assert_eq!(
        server.received(),
        vec![
            json!({ "type": "guess", "number": 1 }),
            json!({ "type": "guess", "number": 100 })
        ]
    );

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_guess_is_reported_as_event() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! It's your turn"));
    wait_for(&mut h.events, is_input_enabled(true)).await;

    assert_err!(h.duel.submit_guess("101").await);
    let seen = wait_for(&mut h.events, |e| {
        matches!(e, DuelEvent::GuessRejected { .. })
    })
    .await;
    assert_eq!(
        seen.last(),
        Some(&DuelEvent::GuessRejected {
            reason: GuessRejected::OutOfBounds {
                value: 101,
                min: 1,
                max: 100
            }
        })
    );

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn accepted_guess_clears_input() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! It's your turn"));
    wait_for(&mut h.events, is_input_enabled(true)).await;

    assert_ok!(h.duel.submit_guess("42").await);
    let seen = wait_for(&mut h.events, is_input_enabled(false)).await;
    assert!(seen.contains(&DuelEvent::GuessSent { number: 42 }));
    assert!(seen.contains(&DuelEvent::GuessInputCleared));

    h.duel.shutdown().await;
}

// ── Server messages ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn hints_are_revealed() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(
        json!({
            "type": "start",
            "message": "Game started! It's your turn",
            "isEven": 1,
            "sum": -1,
            "isPrime": 0
        })
        .to_string(),
    );

    let seen = wait_for(&mut h.events, |e| {
        matches!(e, DuelEvent::HintsRevealed { .. })
    })
    .await;
    let Some(DuelEvent::HintsRevealed { hints }) = seen.last() else {
        unreachable!()
    };
    assert_eq!(hints.is_even, Some(true));
    assert_eq!(hints.digit_sum, None);
    assert_eq!(hints.is_prime, Some(false));

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn server_error_notice_is_surfaced_without_phase_change() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! Opponent's turn"));
    wait_for(&mut h.events, is_phase(Phase::AwaitingOpponentTurn)).await;

    server.say(duel_error("Not your turn"));
    let seen = wait_for(&mut h.events, |e| {
        matches!(e, DuelEvent::Status { tone: StatusTone::Error, .. })
    })
    .await;
    assert_eq!(error_statuses(&seen), vec!["Not your turn"]);
    assert_eq!(h.duel.phase(), Phase::AwaitingOpponentTurn);

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_and_unreadable_frames_do_not_break_the_duel() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! It's your turn"));
    wait_for(&mut h.events, is_input_enabled(true)).await;

    server.say(json!({ "type": "chat", "message": "gl hf" }).to_string());
    server.say("this is not json");
    let seen = wait_for(&mut h.events, |e| {
        matches!(e, DuelEvent::Status { tone: StatusTone::Error, .. })
    })
    .await;
    assert_eq!(error_statuses(&seen), vec!["Message processing error"]);
    assert!(!seen.contains(&DuelEvent::status("gl hf")));
    assert_eq!(h.duel.phase(), Phase::LocalTurn);

    assert_ok!(h.duel.submit_guess("10").await);
    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn update_before_start_is_ignored() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_update("Valid range: 10-20. It's your turn"));
    server.say(duel_waiting("Waiting for another player..."));

    let seen = wait_for(&mut h.events, |e| {
        *e == DuelEvent::status("Waiting for another player...")
    })
    .await;
    assert!(!seen.contains(&DuelEvent::GuessInputEnabled { enabled: true }));
    assert_eq!(h.duel.phase(), Phase::Matchmaking);
    assert_eq!(h.duel.valid_range(), (1, 100));

    h.duel.shutdown().await;
}

// ── End of duel and connection loss ─────────────────────────────────

#[tokio::test(start_paused = true)]
async fn close_after_end_is_not_an_error() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! It's your turn"));
    server.say(duel_end("You win! The number was 42"));
    server.hang_up();

    let seen = wait_for(&mut h.events, is_phase(Phase::Idle)).await;
    assert!(seen.contains(&DuelEvent::Status {
        text: "You win! The number was 42".into(),
        tone: StatusTone::Win
    }));
    assert!(seen.contains(&DuelEvent::MatchButtonEnabled { enabled: true }));
    assert!(error_statuses(&seen).is_empty(), "{seen:#?}");
    assert!(h.duel.is_ended());

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn receive_error_after_end_is_not_an_error() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! Opponent's turn"));
    server.say(duel_end("Game over! Number was: 42. You lose!"));
    server.fail("connection reset without closing handshake");

    let seen = wait_for(&mut h.events, is_phase(Phase::Idle)).await;
    assert!(seen.contains(&DuelEvent::Status {
        text: "Game over! Number was: 42. You lose!".into(),
        tone: StatusTone::Lose
    }));
    assert!(seen.contains(&DuelEvent::MatchButtonEnabled { enabled: true }));
    assert!(error_statuses(&seen).is_empty(), "{seen:#?}");
    assert!(h.duel.is_ended());
    assert!(server.is_closed());

    h.duel.shutdown().await;
}

#[cfg(feature = "transport-websocket")]
#[tokio::test]
async fn websocket_server_dropping_socket_after_end_is_not_an_error() {
    use futures_util::SinkExt;
    use guess_duel_client::{Connector, Lobby, WebSocketConnector};
    use tokio_tungstenite::tungstenite::Message;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_url = format!("ws://{}/game", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        for frame in [
            duel_start("Game started! It's your turn"),
            duel_end("Game over! Number was: 42. You win!"),
        ] {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
        // Exits like the stock duel server: no close frame.
        drop(ws);
    });

    let lobby = Arc::new(MockLobby::new());
    lobby.respond_with_lines(&[lobby_matched("Opponent found! Connecting...", &ws_url)]);
    let (mut duel, mut events) = DuelSessionController::start(
        Arc::clone(&lobby) as Arc<dyn Lobby>,
        Arc::new(WebSocketConnector::new()) as Arc<dyn Connector>,
        DuelClientConfig::new().with_match_display_delay(Duration::ZERO),
    );
    duel.start_new_match(LOBBY).unwrap();

    let seen = wait_for(&mut events, is_phase(Phase::Idle)).await;
    assert!(seen.contains(&DuelEvent::Status {
        text: "Game over! Number was: 42. You win!".into(),
        tone: StatusTone::Win
    }));
    assert!(error_statuses(&seen).is_empty(), "{seen:#?}");
    assert!(duel.is_ended());

    duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn losing_end_is_styled() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! Opponent's turn"));
    server.say(duel_end("You lose! The number was 7"));

    let seen = wait_for(&mut h.events, is_phase(Phase::Ended)).await;
    assert!(seen.contains(&DuelEvent::Status {
        text: "You lose! The number was 7".into(),
        tone: StatusTone::Lose
    }));
    assert!(seen.contains(&DuelEvent::DuelAreaVisible { visible: false }));

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn close_mid_duel_reports_connection_lost() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! It's your turn"));
    server.hang_up();

    let seen = wait_for(&mut h.events, is_phase(Phase::Idle)).await;
    assert_eq!(
        error_statuses(&seen),
        vec!["Connection lost, please try again"]
    );
    assert!(seen.contains(&DuelEvent::MatchButtonEnabled { enabled: true }));
    assert!(!h.duel.is_ended());

    let err = assert_err!(h.duel.submit_guess("50").await);
    assert!(matches!(
        err,
        DuelClientError::InvalidGuess(GuessRejected::NotYourTurn)
    ));

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transport_error_reports_connection_error() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! Opponent's turn"));
    server.fail("connection reset by peer");

    let seen = wait_for(&mut h.events, is_phase(Phase::Idle)).await;
    assert_eq!(
        error_statuses(&seen),
        vec!["Connection error, please try again"]
    );
    assert!(server.is_closed());
}

#[tokio::test(start_paused = true)]
async fn connect_failure_reports_connection_error() {
    let mut h = harness(DuelClientConfig::new());
    h.lobby.respond_with_lines(&[lobby_matched(
        "Opponent found! Connecting...",
        "ws://nowhere.test/game",
    )]);
    h.duel.start_new_match(LOBBY).unwrap();

    let seen = wait_for(&mut h.events, is_phase(Phase::Idle)).await;
    assert_eq!(
        error_statuses(&seen),
        vec!["Connection error, please try again"]
    );
    assert!(seen.contains(&DuelEvent::MatchButtonEnabled { enabled: true }));
}

// ── Starting over ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn new_match_closes_previous_connection_first() {
    let mut h = harness(DuelClientConfig::new());
    let first = match_into_duel(&h, "ws://duel.test/one");
    first.say(duel_start("Game started! It's your turn"));
    wait_for(&mut h.events, is_input_enabled(true)).await;

    let second = match_into_duel(&h, "ws://duel.test/two");
    second.say(duel_start("Game started! Opponent's turn"));
    wait_for(&mut h.events, |e| {
        *e == DuelEvent::status("Game started! Opponent's turn")
    })
    .await;

    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert_eq!(
        h.connector.log(),
        vec![
            ConnEvent::Opened {
                id: 1,
                address: "ws://duel.test/one".into()
            },
            ConnEvent::Closed { id: 1 },
            ConnEvent::Opened {
                id: 2,
                address: "ws://duel.test/two".into()
            },
        ]
    );

    // Nothing from the old duel leaks into the new one.
    first.say(duel_update("Valid range: 1-10. It's your turn"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.duel.phase(), Phase::AwaitingOpponentTurn);
    assert_eq!(h.duel.valid_range(), (1, 100));

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn new_match_abandons_in_flight_matchmaking() {
    let mut h = harness(DuelClientConfig::new());
    let stale_body = h.lobby.respond_with_channel();
    h.duel.start_new_match(LOBBY).unwrap();
    stale_body
        .send(Bytes::from(lobby_waiting("Waiting for opponent...")))
        .unwrap();
    wait_for(&mut h.events, |e| {
        *e == DuelEvent::status("Waiting for opponent...")
    })
    .await;

    h.lobby
        .respond_with_lines(&[lobby_timeout("No opponent found. Please try again.")]);
    h.duel.start_new_match(LOBBY).unwrap();
    let seen = wait_for(&mut h.events, is_resolved).await;
    assert_eq!(
        seen.last(),
        Some(&DuelEvent::MatchmakingResolved {
            outcome: MatchmakingOutcome::TimedOut
        })
    );

    // The first response body was dropped along with its attempt.
    assert!(stale_body.is_closed());
    let _ = stale_body.send(Bytes::from(lobby_matched("late", "ws://stale.test")));

    h.connector.script_server();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(h.connector.log().is_empty());
    assert_eq!(h.duel.phase(), Phase::Idle);

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn new_match_cancels_pending_connect() {
    let mut h = harness(DuelClientConfig::new());
    h.lobby
        .respond_with_lines(&[lobby_matched("Opponent found!", "ws://stale.test")]);
    h.connector.script_server();
    h.duel.start_new_match(LOBBY).unwrap();
    wait_for(&mut h.events, is_resolved).await;

    // Still inside the display delay.
    h.lobby
        .respond_with_lines(&[lobby_timeout("No opponent found. Please try again.")]);
    h.duel.start_new_match(LOBBY).unwrap();
    wait_for(&mut h.events, is_resolved).await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(h.connector.log().is_empty());
    assert_eq!(h.lobby.requests.lock().unwrap().len(), 2);

    h.duel.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn new_match_resets_session() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/one");
    server.say(duel_start("Game started! Opponent's turn"));
    server.say(duel_update("Valid range: 30-60. Opponent's turn"));
    server.say(duel_end("You lose! The number was 44"));
    server.hang_up();
    wait_for(&mut h.events, is_phase(Phase::Idle)).await;
    assert!(h.duel.is_ended());
    assert_eq!(h.duel.valid_range(), (30, 60));

    let _body = h.lobby.respond_with_channel();
    h.duel.start_new_match(LOBBY).unwrap();
    let seen = wait_for(&mut h.events, is_phase(Phase::Matchmaking)).await;
    assert!(seen.contains(&DuelEvent::RangeChanged { low: 1, high: 100 }));
    assert!(seen.contains(&DuelEvent::MatchButtonEnabled { enabled: false }));
    assert!(!h.duel.is_ended());
    assert_eq!(h.duel.valid_range(), (1, 100));

    h.duel.shutdown().await;
}

// ── Localized servers ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn chinese_phrase_set_drives_turns_and_range() {
    let mut h = harness(DuelClientConfig::new().with_phrases(PhraseSet::CHINESE));
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("游戏开始！你是先手"));
    wait_for(&mut h.events, is_input_enabled(true)).await;

    assert_ok!(h.duel.submit_guess("50").await);
    server.say(duel_update("太大了！范围：1-49，轮到你猜测"));
    let seen = wait_for(&mut h.events, is_input_enabled(true)).await;
    assert!(seen.contains(&DuelEvent::RangeChanged { low: 1, high: 49 }));

    server.say(duel_end("你赢了！数字是 25"));
    let seen = wait_for(&mut h.events, is_phase(Phase::Ended)).await;
    assert!(seen.contains(&DuelEvent::Status {
        text: "你赢了！数字是 25".into(),
        tone: StatusTone::Win
    }));

    h.duel.shutdown().await;
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn shutdown_closes_duel_connection() {
    let mut h = harness(DuelClientConfig::new());
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! It's your turn"));
    wait_for(&mut h.events, is_input_enabled(true)).await;

    h.duel.shutdown().await;

    assert!(server.is_closed());
    assert_eq!(h.connector.log().last(), Some(&ConnEvent::Closed { id: 1 }));
    while h.events.recv().await.is_some() {}
    assert!(matches!(
        h.duel.start_new_match(LOBBY),
        Err(DuelClientError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn full_event_channel_does_not_stall_the_duel() {
    let mut h = harness(DuelClientConfig::new().with_event_channel_capacity(1));
    let server = match_into_duel(&h, "ws://duel.test/game");
    server.say(duel_start("Game started! It's your turn"));

    // Nobody drains events; the controller must keep going regardless.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.duel.phase(), Phase::LocalTurn);
    assert_ok!(h.duel.submit_guess("33").await);
    assert_eq!(server.received(), vec![json!({ "type": "guess", "number": 33 })]);

    h.duel.shutdown().await;
    while h.events.recv().await.is_some() {}
}
