//! Transfer-commitment and storage-slot derivation.
//!
//! The origin domain's deposit recorder persists, per deposit nonce, a
//! 32-byte commitment into its own state trie at a deterministic mapping
//! slot. The destination-side engine recomputes both the commitment and
//! the slot key from untrusted proposal fields alone; equality of the
//! recomputed commitment and the proven slot value is the sole
//! correctness oracle.
//!
//! All hashing here is keccak256 over 32-byte big-endian-padded words,
//! matching the origin recorder's ABI-style packing. Any divergence in
//! the packing silently resolves the wrong slot (proof failure, not a
//! wrong value), so the word layout below is load-bearing.

use crate::{DepositNonce, DomainId, Hash32, ResourceId, SecurityModel};
use alloy_primitives::keccak256;

/// Left-pad a u64 into a 32-byte big-endian word.
pub fn pad32_u64(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Left-pad a single byte into a 32-byte big-endian word.
pub fn pad32_u8(value: u8) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[31] = value;
    word
}

/// Recompute the transfer commitment for a deposit.
///
/// `keccak256(origin || destination || security_model || nonce ||
/// resource_id || keccak256(data))`, each field one 32-byte word. The
/// destination domain id is always the engine's own, never taken from
/// the proposal.
pub fn transfer_commitment(
    origin: DomainId,
    destination: DomainId,
    security_model: SecurityModel,
    nonce: DepositNonce,
    resource_id: ResourceId,
    data: &[u8],
) -> Hash32 {
    let mut packed = Vec::with_capacity(6 * 32);
    packed.extend_from_slice(&pad32_u8(origin.0));
    packed.extend_from_slice(&pad32_u8(destination.0));
    packed.extend_from_slice(&pad32_u8(security_model.0));
    packed.extend_from_slice(&pad32_u64(nonce));
    packed.extend_from_slice(&resource_id.0);
    packed.extend_from_slice(keccak256(data).as_slice());
    Hash32(keccak256(&packed).0)
}

/// Derive the state-trie key of the deposit-registry slot for a nonce.
///
/// Inner hash is the Solidity mapping-slot derivation
/// `keccak256(pad32(nonce) || pad32(slot_index))`; the outer hash is the
/// trie-key hash applied to every raw storage slot.
pub fn deposit_slot_key(nonce: DepositNonce, slot_index: u64) -> Hash32 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(&pad32_u64(nonce));
    preimage[32..].copy_from_slice(&pad32_u64(slot_index));
    let raw_slot = keccak256(preimage);
    Hash32(keccak256(raw_slot.as_slice()).0)
}
