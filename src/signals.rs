//! Turn, range and result signals embedded in duel message text.
//!
//! The duel server encodes whose turn it is and the currently valid guess
//! range only inside its human-readable `message` strings, e.g.
//! `"Valid range: 26-100. It's your turn"`. The functions here are the only
//! place that text is interpreted. Each server locale gets its own
//! [`PhraseSet`]; matching is exact and case-sensitive.

/// Result of a finished duel as read from the `end` message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelResult {
    Won,
    Lost,
}

/// The fixed phrases one server locale uses to signal turn, range and result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseSet {
    /// Any of these substrings means it is the local player's turn.
    pub turn_phrases: &'static [&'static str],
    /// Text immediately preceding `<low>-<high>`.
    pub range_label: &'static str,
    /// Substrings announcing a win in an `end` message.
    pub win_phrases: &'static [&'static str],
    /// Substrings announcing a loss in an `end` message.
    pub lose_phrases: &'static [&'static str],
}

impl PhraseSet {
    /// Phrases of the English-language duel server.
    pub const ENGLISH: Self = Self {
        turn_phrases: &["your turn"],
        range_label: "range: ",
        win_phrases: &["You win"],
        lose_phrases: &["You lose"],
    };

    /// Phrases of the Chinese-language duel server.
    pub const CHINESE: Self = Self {
        turn_phrases: &["你是先手", "轮到你猜测"],
        range_label: "范围：",
        win_phrases: &["你赢了"],
        lose_phrases: &["你输了"],
    };

    /// Returns `true` if `text` says it is the local player's turn.
    ///
    /// ```
    /// use guess_duel_client::signals::PhraseSet;
    ///
    /// assert!(PhraseSet::ENGLISH.is_local_turn("Game started! It's your turn"));
    /// assert!(!PhraseSet::ENGLISH.is_local_turn("Game started! Opponent's turn"));
    /// ```
    pub fn is_local_turn(&self, text: &str) -> bool {
        self.turn_phrases.iter().any(|p| text.contains(p))
    }

    /// Extract the first `<label><low>-<high>` range from `text`.
    ///
    /// Returns `None` when no occurrence of the label is followed by two
    /// integers joined by `-`.
    ///
    /// ```
    /// use guess_duel_client::signals::PhraseSet;
    ///
    /// let en = PhraseSet::ENGLISH;
    /// assert_eq!(en.extract_range("Valid range: 10-50. Opponent's turn"), Some((10, 50)));
    /// assert_eq!(en.extract_range("Not your turn"), None);
    /// ```
    pub fn extract_range(&self, text: &str) -> Option<(u32, u32)> {
        if self.range_label.is_empty() {
            return None;
        }
        text.match_indices(self.range_label).find_map(|(at, label)| {
            let rest = text.get(at + label.len()..)?;
            parse_range(rest)
        })
    }

    /// Classify an `end` message as a win or a loss, if it says which.
    pub fn duel_result(&self, text: &str) -> Option<DuelResult> {
        if self.win_phrases.iter().any(|p| text.contains(p)) {
            Some(DuelResult::Won)
        } else if self.lose_phrases.iter().any(|p| text.contains(p)) {
            Some(DuelResult::Lost)
        } else {
            None
        }
    }
}

impl Default for PhraseSet {
    fn default() -> Self {
        Self::ENGLISH
    }
}

/// Parse a leading `<digits>-<digits>`.
fn parse_range(s: &str) -> Option<(u32, u32)> {
    let (low, rest) = split_digits(s)?;
    let rest = rest.strip_prefix('-')?;
    let (high, _) = split_digits(rest)?;
    Some((low, high))
}

/// Split off a leading run of ASCII digits and parse it.
fn split_digits(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let (digits, rest) = s.split_at(end);
    digits.parse().ok().map(|n| (n, rest))
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

    const EN: PhraseSet = PhraseSet::ENGLISH;
    const ZH: PhraseSet = PhraseSet::CHINESE;

    #[test]
    fn english_turn_phrases() {
        assert!(EN.is_local_turn("Valid range: 51-100. It's your turn"));
        assert!(!EN.is_local_turn("Valid range: 51-100. Opponent's turn"));
        assert!(!EN.is_local_turn("YOUR TURN"));
    }

    #[test]
    fn chinese_turn_phrases() {
        assert!(ZH.is_local_turn("游戏开始！你是先手"));
        assert!(ZH.is_local_turn("范围：1-49，轮到你猜测"));
        assert!(!ZH.is_local_turn("范围：1-49，对手猜测中"));
    }

    #[test]
    fn range_in_plain_label() {
        assert_eq!(EN.extract_range("range: 10-50"), Some((10, 50)));
    }

    #[test]
    fn range_embedded_in_sentence() {
        assert_eq!(
            EN.extract_range("Valid range: 26-100. Opponent's turn"),
            Some((26, 100))
        );
    }

    #[test]
    fn range_skips_label_without_numbers() {
        assert_eq!(
            EN.extract_range("range: unknown, new range: 3-9"),
            Some((3, 9))
        );
    }

    #[test]
    fn range_requires_both_bounds() {
        assert_eq!(EN.extract_range("range: 10-"), None);
        assert_eq!(EN.extract_range("range: -50"), None);
        assert_eq!(EN.extract_range("range: 10 - 50"), None);
        assert_eq!(EN.extract_range("Range: 10-50"), None);
    }

    #[test]
    fn range_overflow_is_no_match() {
        assert_eq!(EN.extract_range("range: 99999999999-1"), None);
    }

    #[test]
    fn chinese_range_uses_fullwidth_colon() {
        assert_eq!(ZH.extract_range("范围：12-88，轮到你猜测"), Some((12, 88)));
        assert_eq!(ZH.extract_range("范围:12-88"), None);
    }

    #[test]
    fn duel_result_detection() {
        assert_eq!(
            EN.duel_result("Game over! Number was: 42. You win!"),
            Some(DuelResult::Won)
        );
        assert_eq!(
            EN.duel_result("Game over! Number was: 42. You lose!"),
            Some(DuelResult::Lost)
        );
        assert_eq!(
            EN.duel_result("No opponent connected within 10 seconds. You win by default!"),
            Some(DuelResult::Won)
        );
        assert_eq!(EN.duel_result("Server shutting down"), None);
    }

    #[test]
    fn default_is_english() {
        assert_eq!(PhraseSet::default(), PhraseSet::ENGLISH);
    }
}
