#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]

//! Core types and primitives for the Gantry cross-domain bridge.
//!
//! This crate defines the shared vocabulary of the bridge: domain and
//! security-model identifiers, relayer proposals, the transfer-commitment
//! and storage-slot derivations, and the route/verifier-set configuration
//! structures injected into the verification engine.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod canonical;
pub mod commitment;
pub mod config;
pub mod proposal;

pub use canonical::{canonical_decode, canonical_encode, canonical_hash, CanonicalError, Hash32};
pub use commitment::{deposit_slot_key, pad32_u64, pad32_u8, transfer_commitment};
pub use config::{DomainRoute, RouteTable};
pub use proposal::{Proposal, ProposalId};

/// Identifier of an isolated deterministic ledger ("domain").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct DomainId(pub u8);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a verifier-set configuration.
///
/// Model `0` is reserved for "unset" and must never resolve; the oracle
/// fails loudly instead of defaulting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct SecurityModel(pub u8);

impl SecurityModel {
    /// Whether this model is the reserved unset value.
    pub fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SecurityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deposit nonce assigned by the origin domain's deposit recorder.
pub type DepositNonce = u64;

/// 32-byte identifier binding a proposal to an execution handler class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub [u8; 32]);

impl ResourceId {
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CanonicalError> {
        Ok(Self(Hash32::from_hex(hex_str)?.0))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// 20-byte account address on an EVM-style origin domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CanonicalError> {
        let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(stripped).map_err(CanonicalError::from_hex)?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| CanonicalError::from_hex("expected 20-byte address"))?;
        Ok(Self(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}
