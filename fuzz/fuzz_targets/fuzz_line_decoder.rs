#![no_main]

use guess_duel_client::framing::LineFrameDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the chunk size; the rest is the stream.
    let Some((&size, body)) = data.split_first() else {
        return;
    };
    let size = usize::from(size).max(1);

    let mut whole = LineFrameDecoder::new();
    let expected = whole.push(body);

    let mut chunked = LineFrameDecoder::new();
    let mut lines = Vec::new();
    for chunk in body.chunks(size) {
        lines.extend(chunked.push(chunk));
    }

    assert_eq!(lines, expected);
    assert_eq!(chunked.pending_len(), whole.pending_len());
});
