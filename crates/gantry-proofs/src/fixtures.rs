//! Deterministic in-memory trie construction.
//!
//! Builds small Merkle-Patricia tries entirely in memory and produces
//! root-to-leaf proofs for their keys. Used by the unit and integration
//! suites (and the benchmarks) to exercise [`crate::trie`] and
//! [`crate::account`] against self-consistent inputs instead of
//! captured chain fixtures.

use crate::rlp::{encode_item, Item};
use crate::trie::{hp_encode, to_nibbles};
use alloy_primitives::keccak256;
use std::collections::BTreeMap;

enum Node {
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: Box<Node>,
    },
    Branch {
        children: [Option<Box<Node>>; 16],
        value: Option<Vec<u8>>,
    },
}

/// Accumulates key/value entries and builds the trie.
#[derive(Default)]
pub struct TrieBuilder {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// A built trie: its root hash and proof access for its keys.
pub struct BuiltTrie {
    pub root: [u8; 32],
    root_node: Option<Node>,
}

impl TrieBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: Vec<u8>, value: Vec<u8>) -> Self {
        self.entries.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    pub fn build(&self) -> BuiltTrie {
        if self.entries.is_empty() {
            // Root of the empty trie: hash of the empty string encoding.
            return BuiltTrie {
                root: keccak256([0x80u8]).0,
                root_node: None,
            };
        }
        let entries: Vec<(Vec<u8>, Vec<u8>)> = self
            .entries
            .iter()
            .map(|(k, v)| (to_nibbles(k), v.clone()))
            .collect();
        let root_node = build_node(entries);
        let root = keccak256(encode_node(&root_node)).0;
        BuiltTrie {
            root,
            root_node: Some(root_node),
        }
    }
}

impl BuiltTrie {
    /// Proof for a key present in the trie, root-to-leaf. `None` if the
    /// key was never inserted.
    pub fn proof(&self, key: &[u8]) -> Option<Vec<Vec<u8>>> {
        let node = self.root_node.as_ref()?;
        let nibbles = to_nibbles(key);
        let mut out = Vec::new();
        if prove(node, &nibbles, &mut out) {
            Some(out)
        } else {
            None
        }
    }
}

fn build_node(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Node {
    if entries.len() == 1 {
        let (path, value) = entries.into_iter().next().unwrap();
        return Node::Leaf { path, value };
    }

    // Longest common prefix across all remaining paths.
    let mut prefix_len = entries[0].0.len();
    for (path, _) in &entries[1..] {
        let mut shared = 0;
        while shared < prefix_len && shared < path.len() && path[shared] == entries[0].0[shared] {
            shared += 1;
        }
        prefix_len = shared;
    }

    if prefix_len > 0 {
        let prefix = entries[0].0[..prefix_len].to_vec();
        let stripped = entries
            .into_iter()
            .map(|(path, value)| (path[prefix_len..].to_vec(), value))
            .collect();
        return Node::Extension {
            path: prefix,
            child: Box::new(build_node(stripped)),
        };
    }

    let mut children: [Vec<(Vec<u8>, Vec<u8>)>; 16] = Default::default();
    let mut value = None;
    for (path, entry_value) in entries {
        if path.is_empty() {
            value = Some(entry_value);
        } else {
            children[usize::from(path[0])].push((path[1..].to_vec(), entry_value));
        }
    }
    let children = children.map(|group| {
        if group.is_empty() {
            None
        } else {
            Some(Box::new(build_node(group)))
        }
    });
    Node::Branch { children, value }
}

fn node_item(node: &Node) -> Item {
    match node {
        Node::Leaf { path, value } => Item::List(vec![
            Item::Leaf(hp_encode(path, true)),
            Item::Leaf(value.clone()),
        ]),
        Node::Extension { path, child } => Item::List(vec![
            Item::Leaf(hp_encode(path, false)),
            ref_item(child),
        ]),
        Node::Branch { children, value } => {
            let mut slots = Vec::with_capacity(17);
            for child in children {
                slots.push(match child {
                    Some(node) => ref_item(node),
                    None => Item::Leaf(Vec::new()),
                });
            }
            slots.push(Item::Leaf(value.clone().unwrap_or_default()));
            Item::List(slots)
        }
    }
}

fn encode_node(node: &Node) -> Vec<u8> {
    encode_item(&node_item(node))
}

/// Parent-held reference: hash for encodings of 32 bytes or more,
/// the encoding itself embedded inline otherwise.
fn ref_item(child: &Node) -> Item {
    let encoded = encode_node(child);
    if encoded.len() >= 32 {
        Item::Leaf(keccak256(&encoded).to_vec())
    } else {
        node_item(child)
    }
}

fn prove(node: &Node, nibbles: &[u8], out: &mut Vec<Vec<u8>>) -> bool {
    out.push(encode_node(node));
    match node {
        Node::Leaf { path, .. } => path[..] == *nibbles,
        Node::Extension { path, child } => {
            nibbles.starts_with(path) && prove(child, &nibbles[path.len()..], out)
        }
        Node::Branch { children, value } => {
            if nibbles.is_empty() {
                return value.is_some();
            }
            children[usize::from(nibbles[0])]
                .as_ref()
                .is_some_and(|child| prove(child, &nibbles[1..], out))
        }
    }
}

/// Strip leading zero bytes (storage words are stored minimally).
pub fn strip_leading_zeros(word: &[u8; 32]) -> Vec<u8> {
    let start = word.iter().position(|&b| b != 0).unwrap_or(32);
    word[start..].to_vec()
}

/// RLP body stored at a storage-trie leaf for a 32-byte word.
pub fn storage_word_body(word: &[u8; 32]) -> Vec<u8> {
    encode_item(&Item::Leaf(strip_leading_zeros(word)))
}

/// RLP body stored at a state-trie leaf for an account.
pub fn account_body(
    nonce: u64,
    balance: u64,
    storage_root: [u8; 32],
    code_hash: [u8; 32],
) -> Vec<u8> {
    let minimal = |v: u64| {
        let bytes = v.to_be_bytes();
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(8);
        bytes[start..].to_vec()
    };
    encode_item(&Item::List(vec![
        Item::Leaf(minimal(nonce)),
        Item::Leaf(minimal(balance)),
        Item::Leaf(storage_root.to_vec()),
        Item::Leaf(code_hash.to_vec()),
    ]))
}
