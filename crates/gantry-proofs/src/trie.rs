//! Merkle-Patricia trie proof verification.
//!
//! Walks a proof (ordered root-to-leaf node encodings) against a trusted
//! 32-byte root and a key, returning the terminal value bytes or a
//! failure. Every node must hash to the reference held by its parent
//! (the trusted root for the first node); nibble consumption is tracked
//! with a single cursor into the key.
//!
//! This is the most failure-sensitive routine in the bridge: an
//! off-by-one in nibble accounting either resolves a plausible wrong
//! value or reports a spurious absence. The fixture suite in
//! [`crate::fixtures`] exercises every node shape.

use crate::rlp::{decode_item, encode_item, CodecError, Item};
use alloy_primitives::keccak256;
use thiserror::Error;

/// Errors raised while walking a proof.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrieError {
    #[error("empty proof")]
    EmptyProof,
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("proof node {index} does not match its parent reference (expected {expected}, got {got})")]
    InvalidProofNode {
        index: usize,
        expected: String,
        got: String,
    },
    #[error("proof node {index} has invalid arity {arity}")]
    InvalidNodeArity { index: usize, arity: usize },
    #[error("malformed proof node {index}: {reason}")]
    MalformedNode { index: usize, reason: String },
    #[error("key not found in trie")]
    KeyNotFound,
    #[error("proof exhausted before the key was resolved")]
    ProofExhausted,
}

/// Reference a parent node holds to one of its children.
enum NodeRef {
    /// keccak256 of the child encoding.
    Hash([u8; 32]),
    /// Child encoding embedded directly (encodings shorter than 32 bytes).
    Inline(Vec<u8>),
}

/// Expand a key into its nibble path (most significant nibble first).
pub fn to_nibbles(key: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(key.len() * 2);
    for byte in key {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    nibbles
}

/// Hex-prefix encode a nibble path with the leaf/extension flag.
pub fn hp_encode(nibbles: &[u8], is_leaf: bool) -> Vec<u8> {
    let flag: u8 = if is_leaf { 0x20 } else { 0x00 };
    let mut out;
    if nibbles.len() % 2 == 0 {
        out = Vec::with_capacity(1 + nibbles.len() / 2);
        out.push(flag);
        for pair in nibbles.chunks(2) {
            out.push((pair[0] << 4) | pair[1]);
        }
    } else {
        out = Vec::with_capacity(1 + nibbles.len() / 2);
        out.push(flag | 0x10 | nibbles[0]);
        for pair in nibbles[1..].chunks(2) {
            out.push((pair[0] << 4) | pair[1]);
        }
    }
    out
}

/// Decode a hex-prefix path. Returns the nibbles and the leaf flag.
fn hp_decode(encoded: &[u8], node_index: usize) -> Result<(Vec<u8>, bool), TrieError> {
    let Some(&first) = encoded.first() else {
        return Err(TrieError::MalformedNode {
            index: node_index,
            reason: "empty path field".to_string(),
        });
    };
    let flag = first >> 4;
    if flag > 0x03 {
        return Err(TrieError::MalformedNode {
            index: node_index,
            reason: format!("invalid hex-prefix flag nibble {flag:#x}"),
        });
    }
    let is_leaf = flag & 0x02 != 0;
    let is_odd = flag & 0x01 != 0;
    if !is_odd && first & 0x0F != 0 {
        return Err(TrieError::MalformedNode {
            index: node_index,
            reason: "even-length path with nonzero padding nibble".to_string(),
        });
    }
    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    if is_odd {
        nibbles.push(first & 0x0F);
    }
    for &byte in &encoded[1..] {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    Ok((nibbles, is_leaf))
}

/// Resolve the reference a node holds at one of its slots.
fn child_ref(slot: &Item, node_index: usize) -> Result<Option<NodeRef>, TrieError> {
    match slot {
        Item::Leaf(bytes) if bytes.is_empty() => Ok(None),
        Item::Leaf(bytes) if bytes.len() == 32 => {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(bytes);
            Ok(Some(NodeRef::Hash(hash)))
        }
        Item::Leaf(bytes) => Err(TrieError::MalformedNode {
            index: node_index,
            reason: format!("child reference of {} bytes", bytes.len()),
        }),
        Item::List(_) => Ok(Some(NodeRef::Inline(encode_item(slot)))),
    }
}

/// Verify that `proof` binds `key` to a value under `root`.
///
/// Returns the stored value bytes. The proof must be ordered
/// root-to-leaf; reordering only makes the referenced node missing and
/// the walk fail. An empty branch slot or a diverging path on the key's
/// route is [`TrieError::KeyNotFound`].
pub fn verify_inclusion(
    root: &[u8; 32],
    key: &[u8],
    proof: &[Vec<u8>],
) -> Result<Vec<u8>, TrieError> {
    if proof.is_empty() {
        return Err(TrieError::EmptyProof);
    }

    let nibbles = to_nibbles(key);
    let mut cursor = 0usize;
    let mut expected = NodeRef::Hash(*root);

    for (index, node) in proof.iter().enumerate() {
        match &expected {
            NodeRef::Hash(hash) => {
                let got = keccak256(node);
                if got.as_slice() != hash {
                    return Err(TrieError::InvalidProofNode {
                        index,
                        expected: hex::encode(hash),
                        got: hex::encode(got),
                    });
                }
            }
            NodeRef::Inline(bytes) => {
                if node != bytes {
                    return Err(TrieError::InvalidProofNode {
                        index,
                        expected: hex::encode(bytes),
                        got: hex::encode(node),
                    });
                }
            }
        }

        let item = decode_item(node)?;
        let fields = item.as_list()?;

        match fields.len() {
            17 => {
                // Branch: 16 child slots plus a value slot.
                if cursor == nibbles.len() {
                    let value = fields[16].as_leaf()?;
                    if value.is_empty() {
                        return Err(TrieError::KeyNotFound);
                    }
                    return Ok(value.to_vec());
                }
                let nibble = usize::from(nibbles[cursor]);
                cursor += 1;
                match child_ref(&fields[nibble], index)? {
                    Some(next) => expected = next,
                    None => return Err(TrieError::KeyNotFound),
                }
            }
            2 => {
                let path_bytes = fields[0].as_leaf()?;
                let (path, is_leaf) = hp_decode(path_bytes, index)?;
                let remaining = &nibbles[cursor..];
                if is_leaf {
                    if path != remaining {
                        return Err(TrieError::KeyNotFound);
                    }
                    let value = fields[1].as_leaf()?;
                    if value.is_empty() {
                        return Err(TrieError::KeyNotFound);
                    }
                    return Ok(value.to_vec());
                }
                // Extension: path must be a prefix of the remaining key.
                if remaining.len() < path.len() || remaining[..path.len()] != path[..] {
                    return Err(TrieError::KeyNotFound);
                }
                cursor += path.len();
                match child_ref(&fields[1], index)? {
                    Some(next) => expected = next,
                    None => {
                        return Err(TrieError::MalformedNode {
                            index,
                            reason: "extension with empty child".to_string(),
                        });
                    }
                }
            }
            arity => {
                return Err(TrieError::InvalidNodeArity { index, arity });
            }
        }
    }

    Err(TrieError::ProofExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TrieBuilder;

    fn long_value(tag: u8) -> Vec<u8> {
        vec![tag; 40]
    }

    #[test]
    fn nibble_and_hp_round_trip() {
        assert_eq!(to_nibbles(&[0x12, 0xAB]), vec![0x1, 0x2, 0xA, 0xB]);
        assert_eq!(hp_encode(&[0x1, 0x2], true), vec![0x20, 0x12]);
        assert_eq!(hp_encode(&[0x1, 0x2, 0x3], true), vec![0x31, 0x23]);
        assert_eq!(hp_encode(&[0xA], false), vec![0x1A]);
        assert_eq!(hp_encode(&[], false), vec![0x00]);
        let (nibbles, leaf) = hp_decode(&[0x31, 0x23], 0).unwrap();
        assert!(leaf);
        assert_eq!(nibbles, vec![0x1, 0x2, 0x3]);
        let (nibbles, leaf) = hp_decode(&[0x00], 0).unwrap();
        assert!(!leaf);
        assert!(nibbles.is_empty());
    }

    #[test]
    fn hp_decode_rejects_bad_padding() {
        assert!(matches!(
            hp_decode(&[0x05], 3),
            Err(TrieError::MalformedNode { index: 3, .. })
        ));
        assert!(matches!(
            hp_decode(&[0x40], 0),
            Err(TrieError::MalformedNode { .. })
        ));
        assert!(matches!(
            hp_decode(&[], 0),
            Err(TrieError::MalformedNode { .. })
        ));
    }

    #[test]
    fn single_leaf_trie() {
        let key = [0x12u8, 0x34];
        let built = TrieBuilder::new()
            .with(key.to_vec(), long_value(0xA1))
            .build();
        let proof = built.proof(&key).unwrap();
        let value = verify_inclusion(&built.root, &key, &proof).unwrap();
        assert_eq!(value, long_value(0xA1));
    }

    #[test]
    fn branch_and_extension_paths() {
        // Shared prefix 0x12, diverging third nibble: extension -> branch -> leaves.
        let k1 = [0x12u8, 0x34];
        let k2 = [0x12u8, 0x78];
        let built = TrieBuilder::new()
            .with(k1.to_vec(), long_value(0xB1))
            .with(k2.to_vec(), long_value(0xB2))
            .build();
        let p1 = built.proof(&k1).unwrap();
        let p2 = built.proof(&k2).unwrap();
        assert!(p1.len() >= 3, "extension + branch + leaf expected");
        assert_eq!(verify_inclusion(&built.root, &k1, &p1).unwrap(), long_value(0xB1));
        assert_eq!(verify_inclusion(&built.root, &k2, &p2).unwrap(), long_value(0xB2));
    }

    #[test]
    fn branch_value_slot() {
        // One key is a strict prefix of the other: the shorter key's value
        // lands in a branch value slot.
        let short = [0x12u8];
        let long = [0x12u8, 0x34];
        let built = TrieBuilder::new()
            .with(short.to_vec(), long_value(0xC1))
            .with(long.to_vec(), long_value(0xC2))
            .build();
        let p_short = built.proof(&short).unwrap();
        let p_long = built.proof(&long).unwrap();
        assert_eq!(
            verify_inclusion(&built.root, &short, &p_short).unwrap(),
            long_value(0xC1)
        );
        assert_eq!(
            verify_inclusion(&built.root, &long, &p_long).unwrap(),
            long_value(0xC2)
        );
    }

    #[test]
    fn embedded_short_nodes() {
        // Short values produce sub-32-byte leaf encodings that parents
        // embed inline; the proof still carries them as explicit nodes.
        let k1 = [0x05u8];
        let k2 = [0xF5u8];
        let built = TrieBuilder::new()
            .with(k1.to_vec(), vec![0x01, 0x02])
            .with(k2.to_vec(), vec![0x03, 0x04])
            .build();
        let p1 = built.proof(&k1).unwrap();
        assert_eq!(verify_inclusion(&built.root, &k1, &p1).unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn wrong_root_is_rejected() {
        let key = [0x12u8, 0x34];
        let built = TrieBuilder::new()
            .with(key.to_vec(), long_value(0xD1))
            .build();
        let proof = built.proof(&key).unwrap();
        let mut wrong = built.root;
        wrong[0] ^= 0xFF;
        assert!(matches!(
            verify_inclusion(&wrong, &key, &proof),
            Err(TrieError::InvalidProofNode { index: 0, .. })
        ));
    }

    #[test]
    fn absent_key_reports_not_found() {
        let k1 = [0x12u8, 0x34];
        let k2 = [0x12u8, 0x78];
        let absent = [0x12u8, 0x99];
        let built = TrieBuilder::new()
            .with(k1.to_vec(), long_value(0xE1))
            .with(k2.to_vec(), long_value(0xE2))
            .build();
        // Walking k1's proof with an absent key diverges at the leaf.
        let proof = built.proof(&k1).unwrap();
        assert_eq!(
            verify_inclusion(&built.root, &absent, &proof),
            Err(TrieError::KeyNotFound)
        );
    }

    #[test]
    fn truncated_proof_is_exhausted() {
        let k1 = [0x12u8, 0x34];
        let k2 = [0x12u8, 0x78];
        let built = TrieBuilder::new()
            .with(k1.to_vec(), long_value(0xF1))
            .with(k2.to_vec(), long_value(0xF2))
            .build();
        let mut proof = built.proof(&k1).unwrap();
        proof.pop();
        assert_eq!(
            verify_inclusion(&built.root, &k1, &proof),
            Err(TrieError::ProofExhausted)
        );
    }

    #[test]
    fn reordered_proof_fails_hash_check() {
        let k1 = [0x12u8, 0x34];
        let k2 = [0x12u8, 0x78];
        let built = TrieBuilder::new()
            .with(k1.to_vec(), long_value(0xA7))
            .with(k2.to_vec(), long_value(0xA8))
            .build();
        let mut proof = built.proof(&k1).unwrap();
        proof.swap(0, 1);
        assert!(matches!(
            verify_inclusion(&built.root, &k1, &proof),
            Err(TrieError::InvalidProofNode { index: 0, .. })
        ));
    }

    #[test]
    fn empty_proof_is_rejected() {
        assert_eq!(
            verify_inclusion(&[0u8; 32], &[0x00], &[]),
            Err(TrieError::EmptyProof)
        );
    }

    #[test]
    fn non_list_node_is_codec_error() {
        let node = crate::rlp::encode_item(&Item::Leaf(vec![0xAA; 40]));
        let root: [u8; 32] = keccak256(&node).0;
        let err = verify_inclusion(&root, &[0x12], &[node]).unwrap_err();
        assert_eq!(err, TrieError::Codec(CodecError::NotAList));
    }
}
