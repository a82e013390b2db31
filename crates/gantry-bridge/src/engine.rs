//! Proposal verification and deduplication engine.
//!
//! Per `(origin domain, deposit nonce)` the lifecycle is
//! `Unseen -> Pending -> Executed` with a rollback edge
//! `Pending -> Unseen` taken only when the downstream handler fails
//! after verification succeeded. `Unseen` is the implicit clear bit in
//! the nonce bitmap; `Pending` is the bit set optimistically before
//! dispatch (held as a [`gantry_storage::NonceGuard`]); `Executed` is
//! the committed bit.
//!
//! Failure semantics, per proposal within a batch:
//!
//! - already executed/pending: silently skipped, the batch continues;
//! - verification failure (oracle, proof, commitment): terminal for the
//!   proposal, nonce stays clear, the batch continues;
//! - handler failure: nonce rolled back, retry allowed, the batch
//!   continues.
//!
//! The whole batch runs under one lock: proposal processing is strictly
//! serial against every other batch touching the same bitmap, and each
//! proposal runs to completion before the next begins.

use crate::handler::{AccessControl, AdminOperation, HandlerError, ResourceRegistry};
use crate::metrics::EngineMetrics;
use crate::oracle::{OracleError, RootOracle, StateRootSource};
use gantry_core::{
    deposit_slot_key, transfer_commitment, CanonicalError, DepositNonce, DomainId, DomainRoute,
    Hash32, Proposal, ProposalId, RouteTable, SecurityModel,
};
use gantry_proofs::account::{storage_root, storage_value, ProofError};
use gantry_storage::{NonceStore, NonceStoreError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Batch-level errors. Everything per-proposal is reported through
/// [`ProposalOutcome`] instead, so one bad proposal never aborts the
/// rest of a batch.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("empty proposal batch")]
    EmptyBatch,
    #[error("caller {caller} is not allowed to perform {operation:?}")]
    NotAllowed {
        caller: String,
        operation: AdminOperation,
    },
    #[error("nonce store error: {0}")]
    Storage(#[from] NonceStoreError),
    #[error("canonical encoding error: {0}")]
    Canonical(#[from] CanonicalError),
}

/// Terminal verification failures for a single proposal.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("oracle: {0}")]
    Oracle(#[from] OracleError),
    #[error("storage proof: {0}")]
    Proof(#[from] ProofError),
    #[error("no route configured for origin domain {domain}")]
    RouteNotConfigured { domain: DomainId },
    #[error("commitment mismatch: expected {expected}, stored {stored}")]
    CommitmentMismatch { expected: Hash32, stored: Hash32 },
}

/// Outcome of one proposal within a batch.
#[derive(Debug)]
pub enum ProposalOutcome {
    /// Verified and executed exactly once.
    Executed {
        proposal_id: ProposalId,
        output: Vec<u8>,
    },
    /// Already executed or pending; idempotent no-op.
    Skipped { proposal_id: ProposalId },
    /// Proof or trust failure; nonce remains clear. Not retryable with
    /// the same inputs.
    VerificationFailed {
        proposal_id: ProposalId,
        error: VerifyError,
    },
    /// Handler failure after successful verification; nonce rolled
    /// back, retry allowed.
    ExecutionFailed {
        proposal_id: ProposalId,
        error: HandlerError,
    },
}

impl ProposalOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, ProposalOutcome::Executed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ProposalOutcome::Skipped { .. })
    }
}

/// Per-batch memo of resolved roots: each distinct
/// `(security model, origin)` pair is resolved once per call.
#[derive(Default)]
struct BatchCache {
    state_roots: HashMap<(SecurityModel, DomainId), [u8; 32]>,
    storage_roots: HashMap<(SecurityModel, DomainId), [u8; 32]>,
}

/// The verification and deduplication engine.
pub struct Engine {
    destination: DomainId,
    routes: RwLock<RouteTable>,
    oracle: RootOracle,
    registry: Arc<ResourceRegistry>,
    nonces: NonceStore,
    access: Arc<dyn AccessControl>,
    metrics: EngineMetrics,
    batch_lock: Mutex<()>,
}

impl Engine {
    pub fn new(
        destination: DomainId,
        routes: RouteTable,
        oracle: RootOracle,
        registry: Arc<ResourceRegistry>,
        nonces: NonceStore,
        access: Arc<dyn AccessControl>,
    ) -> Self {
        Self {
            destination,
            routes: RwLock::new(routes),
            oracle,
            registry,
            nonces,
            access,
            metrics: EngineMetrics::new(),
            batch_lock: Mutex::new(()),
        }
    }

    /// The domain this engine executes into.
    pub fn destination_domain(&self) -> DomainId {
        self.destination
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Read-only status query over the nonce bitmap.
    pub fn is_proposal_executed(
        &self,
        domain: DomainId,
        nonce: DepositNonce,
    ) -> Result<bool, EngineError> {
        Ok(self.nonces.is_executed(domain, nonce)?)
    }

    /// Install or replace the route for an origin domain.
    pub fn set_route(
        &self,
        caller: &str,
        domain: DomainId,
        route: DomainRoute,
    ) -> Result<(), EngineError> {
        self.check_allowed(caller, AdminOperation::UpdateRoute)?;
        self.routes.write().insert(domain, route);
        info!(caller, domain = %domain, "route updated");
        Ok(())
    }

    /// Install or replace the verifier set for a security model.
    pub fn set_verifier_sources(
        &self,
        caller: &str,
        model: SecurityModel,
        sources: Vec<(String, Arc<dyn StateRootSource>)>,
    ) -> Result<(), EngineError> {
        self.check_allowed(caller, AdminOperation::UpdateVerifierSet)?;
        self.oracle.set_sources(model, sources);
        info!(caller, model = %model, "verifier set updated");
        Ok(())
    }

    fn check_allowed(&self, caller: &str, operation: AdminOperation) -> Result<(), EngineError> {
        if self.access.is_allowed(caller, operation) {
            Ok(())
        } else {
            Err(EngineError::NotAllowed {
                caller: caller.to_string(),
                operation,
            })
        }
    }

    /// Single-proposal convenience wrapper around [`Engine::execute_proposals`].
    pub fn execute_proposal(
        &self,
        proposal: &Proposal,
        account_proof: &[Vec<u8>],
        block_ref: u64,
    ) -> Result<ProposalOutcome, EngineError> {
        let mut outcomes =
            self.execute_proposals(std::slice::from_ref(proposal), account_proof, block_ref)?;
        // One proposal in, one outcome out.
        Ok(outcomes.remove(0))
    }

    /// Verify and execute a batch of proposals.
    ///
    /// Returns one outcome per proposal, in order. Only an empty batch
    /// or an internal storage failure aborts the call.
    pub fn execute_proposals(
        &self,
        proposals: &[Proposal],
        account_proof: &[Vec<u8>],
        block_ref: u64,
    ) -> Result<Vec<ProposalOutcome>, EngineError> {
        if proposals.is_empty() {
            return Err(EngineError::EmptyBatch);
        }

        let _serial = self.batch_lock.lock();
        let mut cache = BatchCache::default();
        let mut outcomes = Vec::with_capacity(proposals.len());

        for proposal in proposals {
            outcomes.push(self.process_one(proposal, account_proof, block_ref, &mut cache)?);
        }
        Ok(outcomes)
    }

    fn process_one(
        &self,
        proposal: &Proposal,
        account_proof: &[Vec<u8>],
        block_ref: u64,
        cache: &mut BatchCache,
    ) -> Result<ProposalOutcome, EngineError> {
        let proposal_id = proposal.proposal_id()?;
        let origin = proposal.origin_domain;
        let nonce = proposal.deposit_nonce;

        if self.nonces.is_executed(origin, nonce)? {
            debug!(proposal = %proposal_id, origin = %origin, nonce, "skipping seen proposal");
            self.metrics.record_skipped();
            return Ok(ProposalOutcome::Skipped { proposal_id });
        }

        if let Err(error) = self.verify(proposal, account_proof, block_ref, cache) {
            warn!(
                proposal = %proposal_id,
                origin = %origin,
                nonce,
                error = %error,
                "proposal verification failed"
            );
            self.metrics.record_verification_failed();
            return Ok(ProposalOutcome::VerificationFailed { proposal_id, error });
        }

        let handler = match self.registry.resolve(proposal.resource_id) {
            Ok(handler) => handler,
            Err(error) => {
                warn!(proposal = %proposal_id, error = %error, "handler resolution failed");
                self.metrics.record_execution_failed();
                return Ok(ProposalOutcome::ExecutionFailed { proposal_id, error });
            }
        };

        // Optimistic mark: the bit is set before dispatch so a
        // re-entrant submission of the same pair inside this batch is
        // skipped, and rolled back by the guard if dispatch fails.
        let Some(guard) = self.nonces.try_mark(origin, nonce)? else {
            self.metrics.record_skipped();
            return Ok(ProposalOutcome::Skipped { proposal_id });
        };

        match handler.execute_proposal(proposal.resource_id, &proposal.data) {
            Ok(output) => {
                guard.commit();
                info!(
                    proposal = %proposal_id,
                    origin = %origin,
                    nonce,
                    "proposal executed"
                );
                self.metrics.record_executed();
                Ok(ProposalOutcome::Executed {
                    proposal_id,
                    output,
                })
            }
            Err(error) => {
                drop(guard);
                warn!(
                    proposal = %proposal_id,
                    origin = %origin,
                    nonce,
                    error = %error,
                    "proposal execution failed, nonce rolled back"
                );
                self.metrics.record_execution_failed();
                self.metrics.record_rollback();
                Ok(ProposalOutcome::ExecutionFailed { proposal_id, error })
            }
        }
    }

    /// Steps 3-8 of the verification sequence: trusted root, storage
    /// root, recomputed commitment, proven slot value, comparison.
    fn verify(
        &self,
        proposal: &Proposal,
        account_proof: &[Vec<u8>],
        block_ref: u64,
        cache: &mut BatchCache,
    ) -> Result<(), VerifyError> {
        let origin = proposal.origin_domain;
        let model = proposal.security_model;

        let route = {
            let routes = self.routes.read();
            *routes
                .get(origin)
                .ok_or(VerifyError::RouteNotConfigured { domain: origin })?
        };

        let cache_key = (model, origin);
        let state_root = match cache.state_roots.get(&cache_key) {
            Some(root) => *root,
            None => {
                let root = self.oracle.resolve_state_root(model, origin, block_ref)?;
                cache.state_roots.insert(cache_key, root);
                root
            }
        };

        let registry_storage_root = match cache.storage_roots.get(&cache_key) {
            Some(root) => *root,
            None => {
                let root = storage_root(&state_root, &route.registry_address.0, account_proof)?;
                cache.storage_roots.insert(cache_key, root);
                root
            }
        };

        // Recomputed from the proposal's own fields plus this engine's
        // destination domain; a commitment carried in the proposal would
        // be attacker-controlled and is never consulted.
        let expected = transfer_commitment(
            origin,
            self.destination,
            model,
            proposal.deposit_nonce,
            proposal.resource_id,
            &proposal.data,
        );
        let slot_key = deposit_slot_key(proposal.deposit_nonce, route.slot_index);
        let stored = storage_value(
            &registry_storage_root,
            &slot_key.0,
            &proposal.storage_proof,
        )?;

        if stored != expected.0 {
            return Err(VerifyError::CommitmentMismatch {
                expected,
                stored: Hash32(stored),
            });
        }
        Ok(())
    }
}
