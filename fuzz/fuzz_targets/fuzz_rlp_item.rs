#![no_main]
//! Fuzz target for the RLP item codec.
//!
//! Decoding arbitrary bytes must never panic, and any input the decoder
//! accepts must re-encode to exactly the original bytes (the codec
//! admits only canonical encodings).

use gantry_proofs::rlp::{decode_item, encode_item};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 64 * 1024 {
        return;
    }

    let Ok(item) = decode_item(data) else {
        return;
    };

    let encoded = encode_item(&item);
    assert_eq!(encoded, data, "accepted input must be canonical");
});
