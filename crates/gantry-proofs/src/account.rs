//! Storage-proof resolution: two composed trie walks.
//!
//! The trust chain is `state root -> account leaf (carries the storage
//! root) -> storage leaf (carries the slot value)`. The first walk keys
//! the state trie by `keccak256(address)` and decodes the account leaf
//! as the four-field RLP list `(nonce, balance, storage_root,
//! code_hash)`; the second walk keys the storage trie by the
//! already-hashed slot key and reinterprets the leaf as a 32-byte
//! big-endian word.

use crate::rlp::{decode_item, read_word, CodecError, Item};
use crate::trie::{verify_inclusion, TrieError};
use alloy_primitives::keccak256;
use thiserror::Error;

/// Errors raised while resolving a storage proof.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("trie verification failed: {0}")]
    Trie(#[from] TrieError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("account not found under state root")]
    AccountNotFound,
    #[error("invalid account encoding: expected 4 fields, got {arity}")]
    InvalidAccountEncoding { arity: usize },
    #[error("account storage root must be 32 bytes, got {len}")]
    InvalidStorageRoot { len: usize },
    #[error("storage value not found for slot")]
    StorageValueNotFound,
}

/// Resolve an account's storage root from the world-state root.
pub fn storage_root(
    state_root: &[u8; 32],
    address: &[u8; 20],
    account_proof: &[Vec<u8>],
) -> Result<[u8; 32], ProofError> {
    let key = keccak256(address);
    let leaf_value =
        verify_inclusion(state_root, key.as_slice(), account_proof).map_err(|err| match err {
            TrieError::KeyNotFound => ProofError::AccountNotFound,
            other => ProofError::Trie(other),
        })?;

    let account = decode_item(&leaf_value)?;
    let Item::List(fields) = account else {
        return Err(ProofError::Codec(CodecError::NotAList));
    };
    if fields.len() != 4 {
        return Err(ProofError::InvalidAccountEncoding {
            arity: fields.len(),
        });
    }

    let root_bytes = fields[2].as_leaf()?;
    if root_bytes.len() != 32 {
        return Err(ProofError::InvalidStorageRoot {
            len: root_bytes.len(),
        });
    }
    let mut root = [0u8; 32];
    root.copy_from_slice(root_bytes);
    Ok(root)
}

/// Resolve a slot value from an account's storage root.
///
/// `slot_key` must already be the trie-key hash of the raw slot (see
/// the engine's slot derivation); the stored leaf is one RLP byte
/// string holding the minimally-encoded big-endian word.
pub fn storage_value(
    storage_root: &[u8; 32],
    slot_key: &[u8; 32],
    storage_proof: &[Vec<u8>],
) -> Result<[u8; 32], ProofError> {
    let leaf_value =
        verify_inclusion(storage_root, slot_key, storage_proof).map_err(|err| match err {
            TrieError::KeyNotFound => ProofError::StorageValueNotFound,
            other => ProofError::Trie(other),
        })?;

    let stored = decode_item(&leaf_value)?;
    let bytes = stored.as_leaf()?;
    Ok(read_word(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{account_body, storage_word_body, TrieBuilder};
    use crate::rlp::encode_item;

    const REGISTRY: [u8; 20] = [0xAA; 20];

    fn storage_trie(slot_key: [u8; 32], word: [u8; 32]) -> crate::fixtures::BuiltTrie {
        TrieBuilder::new()
            .with(slot_key.to_vec(), storage_word_body(&word))
            .build()
    }

    #[test]
    fn resolves_account_then_slot() {
        let slot_key = [0x42; 32];
        let mut word = [0u8; 32];
        word[28..].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let storage = storage_trie(slot_key, word);

        let account = account_body(1, 0, storage.root, [0xCC; 32]);
        let state = TrieBuilder::new()
            .with(keccak256(REGISTRY).to_vec(), account)
            .build();

        let account_proof = state.proof(keccak256(REGISTRY).as_slice()).unwrap();
        let resolved_root = storage_root(&state.root, &REGISTRY, &account_proof).unwrap();
        assert_eq!(resolved_root, storage.root);

        let slot_proof = storage.proof(&slot_key).unwrap();
        let value = storage_value(&resolved_root, &slot_key, &slot_proof).unwrap();
        assert_eq!(value, word);
    }

    #[test]
    fn missing_account_is_reported() {
        let account = account_body(1, 0, [0x11; 32], [0xCC; 32]);
        let state = TrieBuilder::new()
            .with(keccak256(REGISTRY).to_vec(), account)
            .build();
        let account_proof = state.proof(keccak256(REGISTRY).as_slice()).unwrap();

        let other: [u8; 20] = [0xBB; 20];
        assert_eq!(
            storage_root(&state.root, &other, &account_proof),
            Err(ProofError::AccountNotFound)
        );
    }

    #[test]
    fn wrong_arity_account_leaf() {
        // Three-field leaf body: not an account.
        let body = encode_item(&Item::List(vec![
            Item::Leaf(vec![0x01]),
            Item::Leaf(vec![]),
            Item::Leaf(vec![0x22; 32]),
        ]));
        let state = TrieBuilder::new()
            .with(keccak256(REGISTRY).to_vec(), body)
            .build();
        let account_proof = state.proof(keccak256(REGISTRY).as_slice()).unwrap();
        assert_eq!(
            storage_root(&state.root, &REGISTRY, &account_proof),
            Err(ProofError::InvalidAccountEncoding { arity: 3 })
        );
    }

    #[test]
    fn non_list_account_leaf() {
        let body = encode_item(&Item::Leaf(vec![0x99; 40]));
        let state = TrieBuilder::new()
            .with(keccak256(REGISTRY).to_vec(), body)
            .build();
        let account_proof = state.proof(keccak256(REGISTRY).as_slice()).unwrap();
        assert_eq!(
            storage_root(&state.root, &REGISTRY, &account_proof),
            Err(ProofError::Codec(CodecError::NotAList))
        );
    }

    #[test]
    fn short_storage_root_is_rejected() {
        let body = encode_item(&Item::List(vec![
            Item::Leaf(vec![0x01]),
            Item::Leaf(vec![]),
            Item::Leaf(vec![0x22; 16]),
            Item::Leaf(vec![0xCC; 32]),
        ]));
        let state = TrieBuilder::new()
            .with(keccak256(REGISTRY).to_vec(), body)
            .build();
        let account_proof = state.proof(keccak256(REGISTRY).as_slice()).unwrap();
        assert_eq!(
            storage_root(&state.root, &REGISTRY, &account_proof),
            Err(ProofError::InvalidStorageRoot { len: 16 })
        );
    }

    #[test]
    fn missing_slot_is_reported() {
        let slot_key = [0x42; 32];
        let mut word = [0u8; 32];
        word[31] = 0x01;
        let storage = storage_trie(slot_key, word);
        let slot_proof = storage.proof(&slot_key).unwrap();

        let absent = [0x43; 32];
        assert_eq!(
            storage_value(&storage.root, &absent, &slot_proof),
            Err(ProofError::StorageValueNotFound)
        );
    }
}
