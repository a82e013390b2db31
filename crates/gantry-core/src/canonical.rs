#![allow(clippy::module_name_repetitions)]

//! Canonical serialization and hashing.
//!
//! Canonical bytes are used wherever a stable identifier is derived from a
//! structured value (proposal ids, persisted records). The encoding is
//! bincode with fixed-width integers, little-endian, trailing bytes
//! rejected; the digest is BLAKE3. Verification-critical hashing (tries,
//! commitments) never goes through this path: that is keccak256 over
//! explicit big-endian words in [`crate::commitment`].

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// 32-byte hash wrapper used across bridge primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CanonicalError> {
        let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(stripped).map_err(CanonicalError::from_hex)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CanonicalError::from_hex("expected 32-byte hash"))?;
        Ok(Self(array))
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Hash32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Canonical serialization/hashing errors.
#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("hex decode error: {0}")]
    FromHex(String),
}

impl CanonicalError {
    pub(crate) fn from_hex(err: impl ToString) -> Self {
        Self::FromHex(err.to_string())
    }
}

/// Canonical encoder options (fixed-int, little-endian, no trailing bytes).
fn encoder() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Serialize using canonical encoding.
pub fn canonical_encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    encoder().serialize(value).map_err(CanonicalError::from)
}

/// Decode canonical bytes back into the target structure.
pub fn canonical_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CanonicalError> {
    encoder().deserialize(bytes).map_err(CanonicalError::from)
}

/// Hash any serializable value using canonical encoding and BLAKE3.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<Hash32, CanonicalError> {
    let bytes = canonical_encode(value)?;
    Ok(Hash32(blake3::hash(&bytes).into()))
}
