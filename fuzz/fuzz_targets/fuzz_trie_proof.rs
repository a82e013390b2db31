#![no_main]
//! Fuzz target for trie proof verification.
//!
//! Malformed proofs must be rejected with an error, never a panic, and
//! a proof can only be accepted against the root that actually commits
//! to its first node.

use alloy_primitives::keccak256;
use arbitrary::{Arbitrary, Unstructured};
use gantry_proofs::trie::verify_inclusion;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzProofInput {
    root: [u8; 32],
    key: Vec<u8>,
    proof: Vec<Vec<u8>>,
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let Ok(input) = FuzzProofInput::arbitrary(&mut u) else {
        return;
    };

    if input.key.len() > 64 || input.proof.len() > 32 {
        return;
    }
    let total_bytes: usize = input.proof.iter().map(Vec::len).sum();
    if total_bytes > 64 * 1024 {
        return;
    }

    if verify_inclusion(&input.root, &input.key, &input.proof).is_ok() {
        // Acceptance implies the root commits to the first proof node.
        let first = &input.proof[0];
        assert_eq!(keccak256(first).0, input.root);
    }
});
