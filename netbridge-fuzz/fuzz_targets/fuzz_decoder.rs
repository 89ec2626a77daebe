#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use netbridge_wire::{decode_payload, peek_id, FrameDecoder};

// A small limit so length prefixes near it get exercised too.
const MAX_FRAME: usize = 4096;

fuzz_target!(|data: &[u8]| {
    let Some((&step, stream)) = data.split_first() else {
        return;
    };
    // Feed the stream in chunks of 1..=16 bytes to hit every split point.
    let step = usize::from(step % 16) + 1;

    let mut decoder = FrameDecoder::new(MAX_FRAME);
    let mut buf = BytesMut::new();

    for chunk in stream.chunks(step) {
        buf.extend_from_slice(chunk);
        loop {
            match decoder.decode(&mut buf) {
                Ok(Some(frame)) => {
                    assert!(frame.len() <= MAX_FRAME);
                    let _ = peek_id(&frame);
                    let _ = decode_payload::<serde_json::Value>(&frame);
                }
                Ok(None) => break,
                // The connection would be dropped here.
                Err(_) => return,
            }
        }
    }
});
