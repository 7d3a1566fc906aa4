//! Fuzz target feeding arbitrary bytes to the push parser.
//!
//! The first byte picks a chunk size so that block boundaries and
//! decompressor framing are hit at varying offsets.
//!
//! Run with: cargo +nightly fuzz run parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use tarstream::read::{ParseEvent, ParseOptions, Parser};

fuzz_target!(|data: &[u8]| {
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(first).max(1);
    let mut parser = Parser::new(ParseOptions::new().max_meta_entry_size(64 * 1024));

    for piece in rest.chunks(chunk) {
        if parser.write(piece).is_err() {
            return;
        }
        parser.drain_events().for_each(drop);
    }
    if parser.end().is_err() {
        return;
    }
    let ended = parser
        .drain_events()
        .any(|event| matches!(event, ParseEvent::End));
    assert!(ended);
});
