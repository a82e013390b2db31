#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]

//! Persistent nonce bitmap.
//!
//! The bitmap is the only long-lived state of the bridge: bit
//! `nonce % 256` of word `nonce / 256` for a domain is set if and only
//! if that `(domain, nonce)` proposal has executed. Words are stored as
//! 32-byte big-endian integers in a single sled tree under
//! `domain_id (1 byte) || word_index (8 bytes BE)`; bit `b` of a word is
//! `1 << (b % 8)` in byte `31 - b / 8`. The layout is stable and must
//! not change: deployments interoperate on it bit-for-bit.
//!
//! Mutation happens only through [`NonceStore::try_mark`], an atomic
//! check-and-set that hands back a [`NonceGuard`]. The guard is the
//! two-phase commit token: `commit()` makes the mark permanent, dropping
//! it without committing rolls the bit back. Rollback on every exit
//! path is what keeps a failed downstream execution retryable.

use gantry_core::{DepositNonce, DomainId};
use sled::Tree;
use thiserror::Error;
use tracing::{debug, error};

pub const SCHEMA_VERSION: &str = "1";
const META_TREE: &str = "meta";
const META_SCHEMA_KEY: &[u8] = b"schema_version";
const BITMAP_TREE: &str = "nonce_bitmap";

/// Storage errors.
#[derive(Debug, Error)]
pub enum NonceStoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),
    #[error("schema mismatch: expected {expected}, found {found:?}")]
    SchemaMismatch {
        expected: String,
        found: Option<String>,
    },
    #[error("corrupt bitmap word at domain {domain} word {word_index}: {len} bytes")]
    CorruptWord {
        domain: DomainId,
        word_index: u64,
        len: usize,
    },
}

/// Persistent per-domain nonce bitmap with atomic check-and-set.
#[derive(Clone)]
pub struct NonceStore {
    bitmap: Tree,
}

fn word_key(domain: DomainId, word_index: u64) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = domain.0;
    key[1..].copy_from_slice(&word_index.to_be_bytes());
    key
}

#[allow(clippy::cast_possible_truncation)]
fn bit_position(nonce: DepositNonce) -> (u64, usize) {
    // nonce % 256 fits in usize by construction.
    ((nonce / 256), (nonce % 256) as usize)
}

/// Byte offset and mask of bit `b` inside a big-endian 32-byte word.
fn bit_mask(bit: usize) -> (usize, u8) {
    (31 - bit / 8, 1u8 << (bit % 8))
}

impl NonceStore {
    /// Open the bitmap tree, enforcing the schema version.
    pub fn open(db: &sled::Db) -> Result<Self, NonceStoreError> {
        let meta = db.open_tree(META_TREE)?;
        match meta.get(META_SCHEMA_KEY)? {
            None => {
                meta.insert(META_SCHEMA_KEY, SCHEMA_VERSION.as_bytes())?;
            }
            Some(found) if found.as_ref() == SCHEMA_VERSION.as_bytes() => {}
            Some(found) => {
                return Err(NonceStoreError::SchemaMismatch {
                    expected: SCHEMA_VERSION.to_string(),
                    found: Some(String::from_utf8_lossy(&found).to_string()),
                });
            }
        }
        Ok(Self {
            bitmap: db.open_tree(BITMAP_TREE)?,
        })
    }

    fn load_word(
        &self,
        domain: DomainId,
        word_index: u64,
    ) -> Result<(Option<sled::IVec>, [u8; 32]), NonceStoreError> {
        let raw = self.bitmap.get(word_key(domain, word_index))?;
        let mut word = [0u8; 32];
        if let Some(bytes) = &raw {
            if bytes.len() != 32 {
                return Err(NonceStoreError::CorruptWord {
                    domain,
                    word_index,
                    len: bytes.len(),
                });
            }
            word.copy_from_slice(bytes);
        }
        Ok((raw, word))
    }

    /// Whether the `(domain, nonce)` bit is set.
    pub fn is_executed(
        &self,
        domain: DomainId,
        nonce: DepositNonce,
    ) -> Result<bool, NonceStoreError> {
        let (word_index, bit) = bit_position(nonce);
        let (_, word) = self.load_word(domain, word_index)?;
        let (byte, mask) = bit_mask(bit);
        Ok(word[byte] & mask != 0)
    }

    /// Atomically set the `(domain, nonce)` bit.
    ///
    /// Returns `None` when the bit was already set (already executed or
    /// concurrently pending). On success the returned guard must be
    /// committed after downstream execution succeeds; dropping it rolls
    /// the bit back.
    pub fn try_mark(
        &self,
        domain: DomainId,
        nonce: DepositNonce,
    ) -> Result<Option<NonceGuard>, NonceStoreError> {
        let (word_index, bit) = bit_position(nonce);
        let (byte, mask) = bit_mask(bit);
        let key = word_key(domain, word_index);
        loop {
            let (current, mut word) = self.load_word(domain, word_index)?;
            if word[byte] & mask != 0 {
                return Ok(None);
            }
            word[byte] |= mask;
            let swap = self
                .bitmap
                .compare_and_swap(key, current, Some(word.to_vec()))?;
            if swap.is_ok() {
                debug!(domain = %domain, nonce, "nonce marked pending");
                return Ok(Some(NonceGuard {
                    bitmap: self.bitmap.clone(),
                    domain,
                    nonce,
                    committed: false,
                }));
            }
            // Lost a race on this word; reload and retry.
        }
    }

    /// Clear the `(domain, nonce)` bit (rollback path).
    pub fn clear(&self, domain: DomainId, nonce: DepositNonce) -> Result<(), NonceStoreError> {
        clear_bit(&self.bitmap, domain, nonce)
    }
}

fn clear_bit(
    bitmap: &Tree,
    domain: DomainId,
    nonce: DepositNonce,
) -> Result<(), NonceStoreError> {
    let (word_index, bit) = bit_position(nonce);
    let (byte, mask) = bit_mask(bit);
    let key = word_key(domain, word_index);
    loop {
        let raw = bitmap.get(key)?;
        let mut word = [0u8; 32];
        match &raw {
            None => return Ok(()),
            Some(bytes) => {
                if bytes.len() != 32 {
                    return Err(NonceStoreError::CorruptWord {
                        domain,
                        word_index,
                        len: bytes.len(),
                    });
                }
                word.copy_from_slice(bytes);
            }
        }
        if word[byte] & mask == 0 {
            return Ok(());
        }
        word[byte] &= !mask;
        let swap = bitmap.compare_and_swap(key, raw, Some(word.to_vec()))?;
        if swap.is_ok() {
            return Ok(());
        }
    }
}

/// Two-phase commit token for an optimistically-marked nonce.
///
/// Holding the guard means the bit is set and the proposal is `Pending`.
/// `commit()` finalizes `Executed`; dropping without committing restores
/// `Unseen`.
#[must_use = "dropping the guard without commit() rolls the nonce back"]
pub struct NonceGuard {
    bitmap: Tree,
    domain: DomainId,
    nonce: DepositNonce,
    committed: bool,
}

impl NonceGuard {
    /// Make the mark permanent.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for NonceGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(err) = clear_bit(&self.bitmap, self.domain, self.nonce) {
            // The bit stays set and the nonce is unretryable until the
            // store recovers; surface loudly.
            error!(
                domain = %self.domain,
                nonce = self.nonce,
                error = %err,
                "failed to roll back nonce mark"
            );
        } else {
            debug!(domain = %self.domain, nonce = self.nonce, "nonce mark rolled back");
        }
    }
}
