//! UI-facing events emitted by the duel session controller.
//!
//! The controller never touches a display. Every visible effect of a state
//! transition is expressed as a [`DuelEvent`] on a bounded channel, and a front
//! end (terminal, web page, game engine) renders them however it likes.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::GuessRejected;
use crate::protocol::{Hints, MatchmakingOutcome};
use crate::session::Phase;

/// How a status line should be styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusTone {
    #[default]
    Info,
    /// The local player won the duel.
    Win,
    /// The local player lost the duel.
    Lose,
    /// Something went wrong; a retry is needed.
    Error,
}

/// Events produced by the controller, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuelEvent {
    /// Replace the status line.
    Status { text: String, tone: StatusTone },
    /// Show or hide the duel area (range, hints, guess input).
    DuelAreaVisible { visible: bool },
    /// Enable or disable the guess input.
    GuessInputEnabled { enabled: bool },
    /// Clear whatever the player typed into the guess input.
    GuessInputCleared,
    /// The valid guess range changed.
    RangeChanged { low: u32, high: u32 },
    /// The server revealed hints about the target number.
    HintsRevealed { hints: Hints },
    /// Enable or disable the "find match" action.
    MatchButtonEnabled { enabled: bool },
    /// A matchmaking attempt finished.
    MatchmakingResolved { outcome: MatchmakingOutcome },
    /// A guess passed validation and was sent.
    GuessSent { number: u8 },
    /// A guess failed local validation; nothing was sent.
    GuessRejected { reason: GuessRejected },
    /// The session moved to a new phase.
    PhaseChanged { phase: Phase },
}

impl DuelEvent {
    /// Shorthand for an [`Info`](StatusTone::Info) status line.
    pub fn status(text: impl Into<String>) -> Self {
        Self::Status {
            text: text.into(),
            tone: StatusTone::Info,
        }
    }

    /// Shorthand for an [`Error`](StatusTone::Error) status line.
    pub fn error_status(text: impl Into<String>) -> Self {
        Self::Status {
            text: text.into(),
            tone: StatusTone::Error,
        }
    }
}

/// Sending half of the event channel.
///
/// Events are delivered with `try_send`: if the consumer falls behind and the
/// channel is full, the event is dropped with a warning so the controller
/// loop never blocks on a slow front end.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<DuelEvent>,
}

impl EventSink {
    /// Wrap an existing sender.
    pub fn new(tx: mpsc::Sender<DuelEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and its receiver. Capacity is clamped to at least 1.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DuelEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Emit one event.
    pub fn emit(&self, event: DuelEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("event channel full, dropping event: {dropped:?}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Emit a batch of events in order.
    pub fn emit_all(&self, events: impl IntoIterator<Item = DuelEvent>) {
        for event in events {
            self.emit(event);
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

    #[test]
    fn emit_preserves_order() {
        let (sink, mut rx) = EventSink::channel(8);
        sink.emit_all([DuelEvent::status("a"), DuelEvent::error_status("b")]);
        assert_eq!(rx.try_recv().unwrap(), DuelEvent::status("a"));
        assert_eq!(
            rx.try_recv().unwrap(),
            DuelEvent::Status {
                text: "b".into(),
                tone: StatusTone::Error
            }
        );
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.emit(DuelEvent::status("kept"));
        sink.emit(DuelEvent::status("dropped"));
        assert_eq!(rx.try_recv().unwrap(), DuelEvent::status("kept"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (sink, mut rx) = EventSink::channel(0);
        sink.emit(DuelEvent::GuessInputCleared);
        assert_eq!(rx.try_recv().unwrap(), DuelEvent::GuessInputCleared);
    }

    #[test]
    fn emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel(4);
        drop(rx);
        sink.emit(DuelEvent::GuessInputCleared);
    }
}
