//! Canonical RLP item codec.
//!
//! Decodes untrusted byte strings into a tree of leaves and lists in a
//! single pass, rejecting every non-canonical form: zero-length input,
//! length prefixes overrunning the buffer, leading zeros in a long-form
//! length, single bytes below `0x80` wrapped in a short-string prefix,
//! payload-length mismatches inside lists, and lists nested deeper than
//! [`MAX_LIST_DEPTH`]. The low-level prefix parsing (including the
//! canonical-form checks) is `alloy_rlp::Header`; this module layers
//! the item tree, the re-encoder and the fixed-width readers on top.

use alloy_rlp::{Buf, Header as RlpHeader};
use thiserror::Error;

/// Errors raised by the codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The input is not canonical RLP.
    #[error("malformed encoding: {0}")]
    Malformed(String),
    /// A list was required but the item is a byte string.
    #[error("expected a list, found a byte string")]
    NotAList,
    /// A byte string was required but the item is a list.
    #[error("expected a byte string, found a list")]
    UnexpectedList,
    /// A fixed-width read saw more bytes than the target width allows.
    #[error("oversized value: {got} bytes for a {max}-byte target")]
    OversizedValue { got: usize, max: usize },
    /// An address leaf was neither empty nor exactly 20 bytes.
    #[error("invalid address length: {got} bytes")]
    InvalidAddressLength { got: usize },
}

/// Deepest list nesting the decoder accepts.
///
/// Trie nodes are at most two levels deep; the bound exists so that a
/// crafted input cannot drive the decoder (or the eventual drop of the
/// decoded tree) into unbounded recursion. Enforced while decoding: an
/// over-deep [`Item`] is never constructed.
pub const MAX_LIST_DEPTH: usize = 32;

/// A decoded RLP item: a byte-string leaf or an ordered list of items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Leaf(Vec<u8>),
    List(Vec<Item>),
}

impl Item {
    /// Borrow the sub-items of a list.
    pub fn as_list(&self) -> Result<&[Item], CodecError> {
        match self {
            Item::List(items) => Ok(items),
            Item::Leaf(_) => Err(CodecError::NotAList),
        }
    }

    /// Borrow the bytes of a leaf.
    pub fn as_leaf(&self) -> Result<&[u8], CodecError> {
        match self {
            Item::Leaf(bytes) => Ok(bytes),
            Item::List(_) => Err(CodecError::UnexpectedList),
        }
    }
}

/// Decode exactly one item covering the whole buffer.
///
/// Trailing bytes after the item are rejected: a proof node or stored
/// value is always a single item.
pub fn decode_item(data: &[u8]) -> Result<Item, CodecError> {
    if data.is_empty() {
        return Err(CodecError::Malformed("zero-length input".to_string()));
    }
    let mut buf = data;
    let item = decode_one(&mut buf, 0)?;
    if !buf.is_empty() {
        return Err(CodecError::Malformed(format!(
            "{} trailing bytes after item",
            buf.len()
        )));
    }
    Ok(item)
}

fn decode_one(buf: &mut &[u8], depth: usize) -> Result<Item, CodecError> {
    if depth >= MAX_LIST_DEPTH {
        return Err(CodecError::Malformed(format!(
            "list nesting deeper than {MAX_LIST_DEPTH}"
        )));
    }
    if buf.is_empty() {
        return Err(CodecError::Malformed("truncated item".to_string()));
    }
    let header =
        RlpHeader::decode(buf).map_err(|e| CodecError::Malformed(e.to_string()))?;
    if header.list {
        let mut payload = &buf[..header.payload_length];
        let mut items = Vec::new();
        while !payload.is_empty() {
            items.push(decode_one(&mut payload, depth + 1)?);
        }
        buf.advance(header.payload_length);
        Ok(Item::List(items))
    } else {
        let bytes = buf[..header.payload_length].to_vec();
        buf.advance(header.payload_length);
        Ok(Item::Leaf(bytes))
    }
}

/// Re-encode an item canonically.
///
/// `encode_item(&decode_item(bytes)?) == bytes` for every input
/// `decode_item` accepts.
pub fn encode_item(item: &Item) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(item, &mut out);
    out
}

fn encode_into(item: &Item, out: &mut Vec<u8>) {
    match item {
        Item::Leaf(bytes) => {
            // A single byte below 0x80 is its own encoding.
            if bytes.len() == 1 && bytes[0] < 0x80 {
                out.push(bytes[0]);
            } else {
                RlpHeader {
                    list: false,
                    payload_length: bytes.len(),
                }
                .encode(out);
                out.extend_from_slice(bytes);
            }
        }
        Item::List(items) => {
            let mut payload = Vec::new();
            for sub in items {
                encode_into(sub, &mut payload);
            }
            RlpHeader {
                list: true,
                payload_length: payload.len(),
            }
            .encode(out);
            out.extend_from_slice(&payload);
        }
    }
}

/// Interpret a leaf as a 32-byte big-endian word, left-padded.
///
/// Up to 33 bytes are accepted when the 33rd is a single leading zero
/// (a sign byte emitted by some encoders); anything longer, or a
/// 33-byte leaf without the zero, is [`CodecError::OversizedValue`].
pub fn read_word(leaf: &[u8]) -> Result<[u8; 32], CodecError> {
    let bytes = match leaf.len() {
        0..=32 => leaf,
        33 if leaf[0] == 0 => &leaf[1..],
        got => {
            return Err(CodecError::OversizedValue { got, max: 32 });
        }
    };
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(word)
}

/// Interpret a leaf as a 20-byte address.
///
/// An empty leaf denotes the zero address (a deleted-account marker);
/// any length other than 0 or 20 is an error.
pub fn read_address(leaf: &[u8]) -> Result<[u8; 20], CodecError> {
    match leaf.len() {
        0 => Ok([0u8; 20]),
        20 => {
            let mut address = [0u8; 20];
            address.copy_from_slice(leaf);
            Ok(address)
        }
        got => Err(CodecError::InvalidAddressLength { got }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(bytes: &[u8]) -> Item {
        let item = decode_item(bytes).expect("canonical fixture must decode");
        assert_eq!(encode_item(&item), bytes, "round trip for {}", hex::encode(bytes));
        item
    }

    #[test]
    fn canonical_fixtures_round_trip() {
        // Single byte.
        assert_eq!(round_trip(&[0x7F]), Item::Leaf(vec![0x7F]));
        // Empty string.
        assert_eq!(round_trip(&[0x80]), Item::Leaf(vec![]));
        // Short string.
        assert_eq!(
            round_trip(&[0x83, b'd', b'o', b'g']),
            Item::Leaf(b"dog".to_vec())
        );
        // Long string (> 55 bytes).
        let mut long = vec![0xB8, 56];
        long.extend(std::iter::repeat(0xAB).take(56));
        assert_eq!(round_trip(&long), Item::Leaf(vec![0xAB; 56]));
        // Empty list.
        assert_eq!(round_trip(&[0xC0]), Item::List(vec![]));
        // Short list ["cat", "dog"].
        assert_eq!(
            round_trip(&[0xC8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']),
            Item::List(vec![
                Item::Leaf(b"cat".to_vec()),
                Item::Leaf(b"dog".to_vec())
            ])
        );
        // Nested list [[], [[]]].
        assert_eq!(
            round_trip(&[0xC3, 0xC0, 0xC1, 0xC0]),
            Item::List(vec![
                Item::List(vec![]),
                Item::List(vec![Item::List(vec![])])
            ])
        );
        // Long list (> 55 byte payload).
        let mut long_list = vec![0xF8, 58];
        for _ in 0..29 {
            long_list.extend_from_slice(&[0x81, 0x80]);
        }
        let decoded = round_trip(&long_list);
        assert_eq!(decoded.as_list().unwrap().len(), 29);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        // Zero-length input.
        assert!(matches!(
            decode_item(&[]),
            Err(CodecError::Malformed(_))
        ));
        // Truncated string payload.
        assert!(matches!(
            decode_item(&[0x83, b'd', b'o']),
            Err(CodecError::Malformed(_))
        ));
        // Non-canonical single byte (0x81 wrapping a byte < 0x80).
        assert!(matches!(
            decode_item(&[0x81, 0x05]),
            Err(CodecError::Malformed(_))
        ));
        // Leading zero in a long-form length.
        assert!(matches!(
            decode_item(&[0xB9, 0x00, 0x38]),
            Err(CodecError::Malformed(_))
        ));
        // Long form used for a short length.
        assert!(matches!(
            decode_item(&[0xB8, 0x05, 1, 2, 3, 4, 5]),
            Err(CodecError::Malformed(_))
        ));
        // List payload length overruns the buffer.
        assert!(matches!(
            decode_item(&[0xC5, 0x80]),
            Err(CodecError::Malformed(_))
        ));
        // Sub-item overruns the list payload.
        assert!(matches!(
            decode_item(&[0xC1, 0x83, b'd', b'o', b'g']),
            Err(CodecError::Malformed(_))
        ));
        // Trailing bytes after a complete item.
        assert!(matches!(
            decode_item(&[0x80, 0x00]),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        // `wraps` list headers around an empty list: wraps + 1 levels.
        // Emitted outside-in from precomputed payload sizes so hostile
        // depths build in linear time.
        fn nested(wraps: usize) -> Vec<u8> {
            let mut sizes = Vec::with_capacity(wraps);
            let mut size = 1usize;
            for _ in 0..wraps {
                sizes.push(size);
                let mut header = Vec::new();
                RlpHeader {
                    list: true,
                    payload_length: size,
                }
                .encode(&mut header);
                size += header.len();
            }
            let mut out = Vec::with_capacity(size);
            for &payload_length in sizes.iter().rev() {
                RlpHeader {
                    list: true,
                    payload_length,
                }
                .encode(&mut out);
            }
            out.push(0xC0);
            out
        }

        assert!(decode_item(&nested(16)).is_ok());
        // Exactly at the bound.
        assert!(decode_item(&nested(MAX_LIST_DEPTH - 1)).is_ok());
        assert!(matches!(
            decode_item(&nested(MAX_LIST_DEPTH)),
            Err(CodecError::Malformed(_))
        ));
        // Hostile depth must fail cleanly, not exhaust the stack.
        assert!(matches!(
            decode_item(&nested(300_000)),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn list_accessors() {
        let list = decode_item(&[0xC1, 0x80]).unwrap();
        assert_eq!(list.as_list().unwrap().len(), 1);
        assert_eq!(list.as_leaf(), Err(CodecError::UnexpectedList));
        let leaf = decode_item(&[0x80]).unwrap();
        assert_eq!(leaf.as_list(), Err(CodecError::NotAList));
    }

    #[test]
    fn read_word_pads_and_rejects() {
        assert_eq!(read_word(&[]).unwrap(), [0u8; 32]);
        let mut expected = [0u8; 32];
        expected[31] = 0x07;
        assert_eq!(read_word(&[0x07]).unwrap(), expected);
        assert_eq!(read_word(&[0xFF; 32]).unwrap(), [0xFF; 32]);
        // 33 bytes with a leading zero sign byte.
        let mut signed = vec![0x00];
        signed.extend_from_slice(&[0xFF; 32]);
        assert_eq!(read_word(&signed).unwrap(), [0xFF; 32]);
        // 33 bytes without the zero.
        assert_eq!(
            read_word(&[0x01; 33]),
            Err(CodecError::OversizedValue { got: 33, max: 32 })
        );
        assert_eq!(
            read_word(&[0x00; 34]),
            Err(CodecError::OversizedValue { got: 34, max: 32 })
        );
    }

    #[test]
    fn read_address_lengths() {
        assert_eq!(read_address(&[]).unwrap(), [0u8; 20]);
        assert_eq!(read_address(&[0xAA; 20]).unwrap(), [0xAA; 20]);
        assert_eq!(
            read_address(&[0xAA; 19]),
            Err(CodecError::InvalidAddressLength { got: 19 })
        );
        assert_eq!(
            read_address(&[0xAA; 32]),
            Err(CodecError::InvalidAddressLength { got: 32 })
        );
    }
}
