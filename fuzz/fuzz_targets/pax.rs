//! Fuzz target for the extended header record parser.
//!
//! Run with: cargo +nightly fuzz run pax

#![no_main]

use libfuzzer_sys::fuzz_target;
use tarstream::format::Pax;

fuzz_target!(|data: &[u8]| {
    let pax = Pax::parse(data, None, false);
    let encoded = pax.encode();
    assert_eq!(encoded.len() % 512, 0);
});
