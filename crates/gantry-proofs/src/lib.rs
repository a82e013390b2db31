#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]

//! Proof verification core for the Gantry bridge.
//!
//! Layered bottom-up:
//!
//! 1. [`rlp`]: canonical RLP item codec over untrusted bytes.
//! 2. [`trie`]: Merkle-Patricia proof walking against a trusted root.
//! 3. [`account`]: the two-level storage-proof resolver
//!    (state root to account storage root to slot value).
//!
//! Everything in this crate is a pure function over its inputs: no
//! state, no I/O, deterministic failures. Callers decide what a failure
//! means; here a failure only ever means "this proof does not bind this
//! key to this value under this root".

pub mod account;
pub mod fixtures;
pub mod rlp;
pub mod trie;

pub use account::{storage_root, storage_value, ProofError};
pub use rlp::{decode_item, encode_item, CodecError, Item};
pub use trie::{verify_inclusion, TrieError};
