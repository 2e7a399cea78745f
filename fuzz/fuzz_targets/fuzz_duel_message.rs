#![no_main]

use guess_duel_client::protocol::{DuelMessage, MatchmakingStatusRecord};
use guess_duel_client::signals::PhraseSet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<DuelMessage>(data);
    let _ = serde_json::from_slice::<MatchmakingStatusRecord>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = DuelMessage::parse(s) {
            // Whatever decodes must encode again.
            let _ = serde_json::to_string(&msg).unwrap();
        }
        let _ = MatchmakingStatusRecord::parse(s);

        // Free-text extraction must never panic on arbitrary server text.
        for phrases in [PhraseSet::ENGLISH, PhraseSet::CHINESE] {
            let _ = phrases.is_local_turn(s);
            let _ = phrases.extract_range(s);
            let _ = phrases.duel_result(s);
        }
    }
});
