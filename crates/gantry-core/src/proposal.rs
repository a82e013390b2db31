//! Relayer-submitted proposals.

use crate::{canonical_hash, CanonicalError, DepositNonce, DomainId, ResourceId, SecurityModel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a proposal, used for logging and observability.
///
/// BLAKE3 over the canonical bytes of the identity fields (everything
/// except the storage proof). Never part of verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub [u8; 32]);

impl ProposalId {
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A single relayer-submitted proposal.
///
/// Immutable once submitted; lives only for the duration of one
/// verification call. The only durable trace of a proposal is the
/// nonce-bitmap bit set on successful execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Domain the deposit was recorded on.
    pub origin_domain: DomainId,
    /// Verifier-set selector for the state-root oracle.
    pub security_model: SecurityModel,
    /// Deposit nonce assigned by the origin recorder.
    pub deposit_nonce: DepositNonce,
    /// Resource class, resolved to an execution handler on dispatch.
    pub resource_id: ResourceId,
    /// Handler-specific payload (e.g. amount + recipient).
    pub data: Vec<u8>,
    /// Storage proof for this proposal's deposit slot, root-to-leaf.
    pub storage_proof: Vec<Vec<u8>>,
}

impl Proposal {
    /// Derive the observability identifier for this proposal.
    pub fn proposal_id(&self) -> Result<ProposalId, CanonicalError> {
        let identity = (
            self.origin_domain,
            self.security_model,
            self.deposit_nonce,
            self.resource_id,
            &self.data,
        );
        Ok(ProposalId(canonical_hash(&identity)?.0))
    }
}
