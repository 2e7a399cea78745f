//! Client-side duel session state machine.
//!
//! [`SessionState`] is a plain value with no I/O. Each transition method
//! updates the state and returns the [`DuelEvent`]s a front end needs to
//! reflect it. The controller owns the only instance and feeds it one event
//! at a time; tests drive it directly.
//!
//! Guess input is enabled exactly when the phase is [`Phase::LocalTurn`].
//! Every phase change goes through [`SessionState::set_phase`], which emits
//! the matching [`DuelEvent::GuessInputEnabled`] whenever that changes.

use tracing::{debug, warn};

use crate::error::GuessRejected;
use crate::event::{DuelEvent, StatusTone};
use crate::protocol::{DuelMessage, Hints, MatchmakingOutcome};
use crate::signals::{DuelResult, PhraseSet};

/// Range shown before the server narrows it.
pub const DEFAULT_RANGE: (u32, u32) = (1, 100);

/// Smallest number the duel server accepts as a guess.
pub const GUESS_MIN: u8 = 1;

/// Largest number the duel server accepts as a guess.
pub const GUESS_MAX: u8 = 100;

const FINDING_OPPONENT: &str = "Finding opponent...";
const CONNECTION_LOST: &str = "Connection lost, please try again";
const CONNECTION_ERROR: &str = "Connection error, please try again";
const MESSAGE_UNREADABLE: &str = "Message processing error";

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No match requested, or the last one finished.
    #[default]
    Idle,
    /// Matchmaking in progress, or matched and waiting for the duel to start.
    Matchmaking,
    /// Duel running; the opponent is guessing.
    AwaitingOpponentTurn,
    /// Duel running; the local player may guess.
    LocalTurn,
    /// The server announced the end of the duel.
    Ended,
}

impl Phase {
    /// Returns `true` while a duel is being played.
    pub fn in_duel(self) -> bool {
        matches!(self, Self::AwaitingOpponentTurn | Self::LocalTurn)
    }
}

/// State of one duel session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    phase: Phase,
    valid_range: (u32, u32),
    ended: bool,
    phrases: PhraseSet,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(PhraseSet::default())
    }
}

impl SessionState {
    /// Create an idle session that reads server text with `phrases`.
    pub fn new(phrases: PhraseSet) -> Self {
        Self {
            phase: Phase::Idle,
            valid_range: DEFAULT_RANGE,
            ended: false,
            phrases,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Inclusive range the next guess should fall in, as last reported.
    pub fn valid_range(&self) -> (u32, u32) {
        self.valid_range
    }

    /// Returns `true` once an `end` message has been received in this session.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Returns `true` if the guess input should be enabled.
    pub fn can_guess(&self) -> bool {
        self.phase == Phase::LocalTurn
    }

    pub fn phrases(&self) -> &PhraseSet {
        &self.phrases
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Start a fresh session for a new matchmaking attempt.
    pub fn begin_matchmaking(&mut self) -> Vec<DuelEvent> {
        let mut events = vec![
            DuelEvent::MatchButtonEnabled { enabled: false },
            DuelEvent::status(FINDING_OPPONENT),
            DuelEvent::DuelAreaVisible { visible: false },
        ];
        self.ended = false;
        self.reset_range(&mut events);
        events.push(DuelEvent::GuessInputCleared);
        self.set_phase(Phase::Matchmaking, &mut events);
        events
    }

    /// Apply the result of a matchmaking attempt.
    ///
    /// A match keeps the session in [`Phase::Matchmaking`] until the duel
    /// transport opens and the server starts the duel.
    pub fn matchmaking_resolved(&mut self, outcome: &MatchmakingOutcome) -> Vec<DuelEvent> {
        let mut events = Vec::new();
        match outcome {
            MatchmakingOutcome::Matched { transport_address } => {
                debug!(address = %transport_address, "matched, duel transport pending");
            }
            MatchmakingOutcome::TimedOut => {
                self.set_phase(Phase::Idle, &mut events);
                events.push(DuelEvent::MatchButtonEnabled { enabled: true });
            }
            MatchmakingOutcome::Failed { reason } => {
                events.push(DuelEvent::error_status(format!("{reason}, please try again")));
                self.set_phase(Phase::Idle, &mut events);
                events.push(DuelEvent::MatchButtonEnabled { enabled: true });
            }
        }
        events
    }

    /// Apply one inbound duel message.
    pub fn apply(&mut self, message: DuelMessage) -> Vec<DuelEvent> {
        let mut events = Vec::new();
        match message {
            DuelMessage::Waiting { text } => {
                events.push(DuelEvent::status(text));
                events.push(DuelEvent::DuelAreaVisible { visible: false });
            }
            DuelMessage::Start { text, hints } => {
                events.push(DuelEvent::DuelAreaVisible { visible: true });
                self.reset_range(&mut events);
                self.read_turn_text(text, hints, &mut events);
            }
            DuelMessage::Update { text, hints } => {
                if !self.phase.in_duel() {
                    warn!(phase = ?self.phase, "ignoring update outside a running duel");
                    return events;
                }
                self.read_turn_text(text, hints, &mut events);
            }
            DuelMessage::End { text } => {
                self.ended = true;
                let tone = match self.phrases.duel_result(&text) {
                    Some(DuelResult::Won) => StatusTone::Win,
                    Some(DuelResult::Lost) => StatusTone::Lose,
                    None => StatusTone::Info,
                };
                events.push(DuelEvent::Status { text, tone });
                events.push(DuelEvent::DuelAreaVisible { visible: false });
                self.set_phase(Phase::Ended, &mut events);
                events.push(DuelEvent::MatchButtonEnabled { enabled: true });
            }
            DuelMessage::ErrorNotice { text } => {
                events.push(DuelEvent::error_status(text));
            }
            DuelMessage::Unknown { raw_type } => {
                warn!(raw_type = %raw_type, "unknown duel message type");
            }
        }
        events
    }

    /// An inbound frame could not be decoded.
    pub fn message_unreadable(&self) -> Vec<DuelEvent> {
        vec![DuelEvent::error_status(MESSAGE_UNREADABLE)]
    }

    /// The duel transport closed.
    ///
    /// After an `end` message this is the expected way for a duel to finish
    /// and nothing is reported.
    pub fn transport_closed(&mut self) -> Vec<DuelEvent> {
        let mut events = Vec::new();
        if self.ended {
            debug!("duel transport closed after end of duel");
        } else {
            events.push(DuelEvent::error_status(CONNECTION_LOST));
            events.push(DuelEvent::DuelAreaVisible { visible: false });
            events.push(DuelEvent::MatchButtonEnabled { enabled: true });
        }
        self.set_phase(Phase::Idle, &mut events);
        events
    }

    /// The duel transport failed to open or errored.
    ///
    /// A duel server may drop the socket without a close handshake once it
    /// has sent `end`, so after the end of a duel this is as silent as
    /// [`transport_closed`](Self::transport_closed).
    pub fn transport_failed(&mut self) -> Vec<DuelEvent> {
        let mut events = Vec::new();
        if self.ended {
            debug!("duel transport dropped after end of duel");
            self.set_phase(Phase::Idle, &mut events);
            return events;
        }
        events.push(DuelEvent::error_status(CONNECTION_ERROR));
        events.push(DuelEvent::DuelAreaVisible { visible: false });
        self.set_phase(Phase::Idle, &mut events);
        events.push(DuelEvent::MatchButtonEnabled { enabled: true });
        events
    }

    /// Return to idle without reporting anything (controller shutdown or a
    /// superseded attempt).
    pub fn abandon(&mut self) -> Vec<DuelEvent> {
        let mut events = Vec::new();
        self.set_phase(Phase::Idle, &mut events);
        events
    }

    /// Check a raw guess against the bounds and the turn.
    ///
    /// Surrounding whitespace is ignored. Nothing else about the input is
    /// forgiven: `"50abc"` and `"5.5"` are not numbers.
    ///
    /// # Errors
    ///
    /// Returns the first [`GuessRejected`] reason that applies.
    pub fn validate_guess(&self, raw: &str) -> Result<u8, GuessRejected> {
        let trimmed = raw.trim();
        let value: i64 = trimmed.parse().map_err(|_| GuessRejected::NotANumber {
            raw: trimmed.to_string(),
        })?;
        let number = u8::try_from(value)
            .ok()
            .filter(|n| (GUESS_MIN..=GUESS_MAX).contains(n))
            .ok_or(GuessRejected::OutOfBounds {
                value,
                min: GUESS_MIN,
                max: GUESS_MAX,
            })?;
        if !self.can_guess() {
            return Err(GuessRejected::NotYourTurn);
        }
        Ok(number)
    }

    /// A validated guess went out; the turn passes until the server says
    /// otherwise.
    pub fn guess_sent(&mut self, number: u8) -> Vec<DuelEvent> {
        let mut events = vec![
            DuelEvent::GuessSent { number },
            DuelEvent::GuessInputCleared,
        ];
        self.set_phase(Phase::AwaitingOpponentTurn, &mut events);
        events
    }

    // ── Internals ───────────────────────────────────────────────────

    fn read_turn_text(&mut self, text: String, hints: Hints, events: &mut Vec<DuelEvent>) {
        if let Some((low, high)) = self.phrases.extract_range(&text) {
            self.valid_range = (low, high);
            events.push(DuelEvent::RangeChanged { low, high });
        }
        if hints.any() {
            events.push(DuelEvent::HintsRevealed { hints });
        }
        let next = if self.phrases.is_local_turn(&text) {
            Phase::LocalTurn
        } else {
            Phase::AwaitingOpponentTurn
        };
        events.push(DuelEvent::status(text));
        self.set_phase(next, events);
    }

    fn reset_range(&mut self, events: &mut Vec<DuelEvent>) {
        self.valid_range = DEFAULT_RANGE;
        let (low, high) = DEFAULT_RANGE;
        events.push(DuelEvent::RangeChanged { low, high });
    }

    fn set_phase(&mut self, next: Phase, events: &mut Vec<DuelEvent>) {
        if self.phase == next {
            return;
        }
        let could_guess = self.can_guess();
        debug!(from = ?self.phase, to = ?next, "phase change");
        self.phase = next;
        events.push(DuelEvent::PhaseChanged { phase: next });
        if could_guess != self.can_guess() {
            events.push(DuelEvent::GuessInputEnabled {
                enabled: self.can_guess(),
            });
        }
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
    use crate::protocol::MatchFailure;

    fn start(text: &str) -> DuelMessage {
        DuelMessage::Start {
            text: text.into(),
            hints: Hints::default(),
        }
    }

    fn update(text: &str) -> DuelMessage {
        DuelMessage::Update {
            text: text.into(),
            hints: Hints::default(),
        }
    }

    fn in_duel(local_turn: bool) -> SessionState {
        let mut state = SessionState::default();
        state.begin_matchmaking();
        let text = if local_turn {
            "Game started! It's your turn"
        } else {
            "Game started! Opponent's turn"
        };
        state.apply(start(text));
        state
    }

    #[test]
    fn begin_matchmaking_resets_session() {
        let mut state = SessionState::default();
        let events = state.begin_matchmaking();
        assert_eq!(state.phase(), Phase::Matchmaking);
        assert_eq!(state.valid_range(), DEFAULT_RANGE);
        assert!(!state.is_ended());
        assert_eq!(events.first(), Some(&DuelEvent::MatchButtonEnabled { enabled: false }));
        assert!(events.contains(&DuelEvent::status("Finding opponent...")));
        assert!(events.contains(&DuelEvent::PhaseChanged {
            phase: Phase::Matchmaking
        }));
    }

    #[test]
    fn start_with_turn_phrase_grants_turn() {
        let mut state = SessionState::default();
        state.begin_matchmaking();
        let events = state.apply(start("Game started! It's your turn"));
        assert_eq!(state.phase(), Phase::LocalTurn);
        assert!(state.can_guess());
        assert!(events.contains(&DuelEvent::DuelAreaVisible { visible: true }));
        assert!(events.contains(&DuelEvent::GuessInputEnabled { enabled: true }));
        assert!(events.contains(&DuelEvent::status("Game started! It's your turn")));
    }

    #[test]
    fn start_without_turn_phrase_waits_for_opponent() {
        let state = in_duel(false);
        assert_eq!(state.phase(), Phase::AwaitingOpponentTurn);
        assert!(!state.can_guess());
    }

    #[test]
    fn start_resets_range_to_default() {
        let mut state = in_duel(true);
        state.apply(update("Valid range: 10-50. It's your turn"));
        assert_eq!(state.valid_range(), (10, 50));
        let events = state.apply(start("Game started! Opponent's turn"));
        assert_eq!(state.valid_range(), DEFAULT_RANGE);
        assert!(events.contains(&DuelEvent::RangeChanged { low: 1, high: 100 }));
    }

    #[test]
    fn update_extracts_range() {
        let mut state = in_duel(false);
        let events = state.apply(update("range: 10-50"));
        assert_eq!(state.valid_range(), (10, 50));
        assert!(events.contains(&DuelEvent::RangeChanged { low: 10, high: 50 }));
    }

    #[test]
    fn update_without_range_keeps_previous() {
        let mut state = in_duel(false);
        state.apply(update("range: 10-50"));
        let events = state.apply(update("Opponent is thinking"));
        assert_eq!(state.valid_range(), (10, 50));
        assert!(!events
            .iter()
            .any(|e| matches!(e, DuelEvent::RangeChanged { .. })));
    }

    #[test]
    fn update_without_turn_phrase_revokes_turn() {
        let mut state = in_duel(true);
        let events = state.apply(update("Valid range: 51-100. Opponent's turn"));
        assert_eq!(state.phase(), Phase::AwaitingOpponentTurn);
        assert!(events.contains(&DuelEvent::GuessInputEnabled { enabled: false }));
    }

    #[test]
    fn update_before_start_is_ignored() {
        let mut state = SessionState::default();
        state.begin_matchmaking();
        let events = state.apply(update("Valid range: 10-20. It's your turn"));
        assert!(events.is_empty());
        assert_eq!(state.phase(), Phase::Matchmaking);
        assert_eq!(state.valid_range(), DEFAULT_RANGE);
    }

    #[test]
    fn update_surfaces_hints() {
        let mut state = in_duel(false);
        let hints = Hints {
            is_even: Some(true),
            ..Hints::default()
        };
        let events = state.apply(DuelMessage::Update {
            text: "Valid range: 1-40. It's your turn".into(),
            hints,
        });
        assert!(events.contains(&DuelEvent::HintsRevealed { hints }));
    }

    #[test]
    fn waiting_hides_duel_area() {
        let mut state = SessionState::default();
        state.begin_matchmaking();
        let events = state.apply(DuelMessage::Waiting {
            text: "Waiting for another player...".into(),
        });
        assert_eq!(
            events,
            vec![
                DuelEvent::status("Waiting for another player..."),
                DuelEvent::DuelAreaVisible { visible: false },
            ]
        );
        assert_eq!(state.phase(), Phase::Matchmaking);
    }

    #[test]
    fn end_sets_latch_and_styles_win() {
        let mut state = in_duel(true);
        let events = state.apply(DuelMessage::End {
            text: "Game over! Number was: 42. You win!".into(),
        });
        assert!(state.is_ended());
        assert_eq!(state.phase(), Phase::Ended);
        assert!(events.contains(&DuelEvent::Status {
            text: "Game over! Number was: 42. You win!".into(),
            tone: StatusTone::Win,
        }));
        assert!(events.contains(&DuelEvent::GuessInputEnabled { enabled: false }));
        assert!(events.contains(&DuelEvent::MatchButtonEnabled { enabled: true }));
    }

    #[test]
    fn end_styles_loss() {
        let mut state = in_duel(false);
        let events = state.apply(DuelMessage::End {
            text: "Game over! Number was: 42. You lose!".into(),
        });
        assert!(events.contains(&DuelEvent::Status {
            text: "Game over! Number was: 42. You lose!".into(),
            tone: StatusTone::Lose,
        }));
    }

    #[test]
    fn close_after_end_is_silent() {
        let mut state = in_duel(true);
        state.apply(DuelMessage::End {
            text: "Game over! You win!".into(),
        });
        let events = state.transport_closed();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.is_ended());
        assert!(!events
            .iter()
            .any(|e| matches!(e, DuelEvent::Status { .. })));
    }

    #[test]
    fn close_mid_duel_reports_connection_lost() {
        let mut state = in_duel(true);
        let events = state.transport_closed();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(events.contains(&DuelEvent::error_status(CONNECTION_LOST)));
        assert!(events.contains(&DuelEvent::MatchButtonEnabled { enabled: true }));
        assert!(events.contains(&DuelEvent::GuessInputEnabled { enabled: false }));
    }

    #[test]
    fn transport_failure_reports_connection_error() {
        let mut state = SessionState::default();
        state.begin_matchmaking();
        let events = state.transport_failed();
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(events.first(), Some(&DuelEvent::error_status(CONNECTION_ERROR)));
    }

    #[test]
    fn transport_failure_after_end_is_silent() {
        let mut state = in_duel(false);
        state.apply(DuelMessage::End {
            text: "Game over! Number was: 42. You lose!".into(),
        });
        let events = state.transport_failed();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.is_ended());
        assert!(!events
            .iter()
            .any(|e| matches!(e, DuelEvent::Status { .. })));
        assert!(events.contains(&DuelEvent::PhaseChanged { phase: Phase::Idle }));
    }

    #[test]
    fn unreadable_message_leaves_state_alone() {
        let state = in_duel(true);
        let before = state.clone();
        assert_eq!(
            state.message_unreadable(),
            vec![DuelEvent::error_status(MESSAGE_UNREADABLE)]
        );
        assert_eq!(state, before);
    }

    #[test]
    fn error_notice_only_surfaces_text() {
        let mut state = in_duel(true);
        let events = state.apply(DuelMessage::ErrorNotice {
            text: "Not your turn".into(),
        });
        assert_eq!(events, vec![DuelEvent::error_status("Not your turn")]);
        assert_eq!(state.phase(), Phase::LocalTurn);
    }

    #[test]
    fn unknown_message_changes_nothing() {
        let mut state = in_duel(true);
        let before = state.clone();
        let events = state.apply(DuelMessage::Unknown {
            raw_type: "chat".into(),
        });
        assert!(events.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn guess_bounds() {
        let state = in_duel(true);
        assert_eq!(state.validate_guess("1"), Ok(1));
        assert_eq!(state.validate_guess("100"), Ok(100));
        assert_eq!(state.validate_guess(" 50 "), Ok(50));
        assert!(matches!(
            state.validate_guess("0"),
            Err(GuessRejected::OutOfBounds { value: 0, .. })
        ));
        assert!(matches!(
            state.validate_guess("101"),
            Err(GuessRejected::OutOfBounds { value: 101, .. })
        ));
        assert!(matches!(
            state.validate_guess("-3"),
            Err(GuessRejected::OutOfBounds { value: -3, .. })
        ));
    }

    #[test]
    fn guess_must_be_a_number() {
        let state = in_duel(true);
        for raw in ["", "abc", "50abc", "5.5"] {
            assert!(
                matches!(state.validate_guess(raw), Err(GuessRejected::NotANumber { .. })),
                "{raw:?} should not parse"
            );
        }
    }

    #[test]
    fn guess_out_of_turn_is_rejected() {
        let state = in_duel(false);
        assert_eq!(state.validate_guess("50"), Err(GuessRejected::NotYourTurn));
    }

    #[test]
    fn guess_sent_passes_turn() {
        let mut state = in_duel(true);
        let events = state.guess_sent(50);
        assert_eq!(state.phase(), Phase::AwaitingOpponentTurn);
        assert_eq!(
            events,
            vec![
                DuelEvent::GuessSent { number: 50 },
                DuelEvent::GuessInputCleared,
                DuelEvent::PhaseChanged {
                    phase: Phase::AwaitingOpponentTurn
                },
                DuelEvent::GuessInputEnabled { enabled: false },
            ]
        );
    }

    #[test]
    fn matchmaking_failure_returns_to_idle() {
        let mut state = SessionState::default();
        state.begin_matchmaking();
        let events = state.matchmaking_resolved(&MatchmakingOutcome::Failed {
            reason: MatchFailure::MissingTransportAddress,
        });
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(
            events.first(),
            Some(&DuelEvent::error_status(
                "invalid server address, please try again"
            ))
        );
        assert!(events.contains(&DuelEvent::MatchButtonEnabled { enabled: true }));
    }

    #[test]
    fn matched_stays_in_matchmaking() {
        let mut state = SessionState::default();
        state.begin_matchmaking();
        let events = state.matchmaking_resolved(&MatchmakingOutcome::Matched {
            transport_address: "ws://x".into(),
        });
        assert!(events.is_empty());
        assert_eq!(state.phase(), Phase::Matchmaking);
    }

    #[test]
    fn chinese_phrases_drive_turns() {
        let mut state = SessionState::new(PhraseSet::CHINESE);
        state.begin_matchmaking();
        state.apply(start("游戏开始！你是先手"));
        assert_eq!(state.phase(), Phase::LocalTurn);
        state.apply(update("范围：20-60，对手猜测中"));
        assert_eq!(state.phase(), Phase::AwaitingOpponentTurn);
        assert_eq!(state.valid_range(), (20, 60));
    }
}
