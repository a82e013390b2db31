//! Multi-verifier state-root oracle.
//!
//! State roots enter the bridge only through here. A security model
//! names an ordered set of root sources; the first member is the
//! candidate and every other member must report an identical root
//! before the candidate is trusted. Any single divergence aborts
//! resolution: a fork or an attack on one verifier is a signal to
//! stop, not something to vote away.

use gantry_core::{DomainId, SecurityModel};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Error from an individual root source.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RootSourceError {
    #[error("state root unavailable: {0}")]
    Unavailable(String),
}

/// One independent source of `(domain, block) -> state root`.
///
/// The light-client or committee protocol behind a source is opaque to
/// the bridge; only the reported root matters.
pub trait StateRootSource: Send + Sync {
    fn state_root(&self, origin: DomainId, block_ref: u64) -> Result<[u8; 32], RootSourceError>;
}

/// Oracle resolution errors. All of these are loud, terminal failures
/// for the proposal being verified; none may be defaulted around.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Security model 0 is reserved for "unset".
    #[error("security model is unset")]
    SecurityModelNotConfigured,
    #[error("no verifier configured for security model {model}")]
    NoVerifierConfigured { model: SecurityModel },
    #[error("verifier {verifier} failed: {source}")]
    SourceFailed {
        verifier: String,
        source: RootSourceError,
    },
    #[error("state root disagreement: verifier {verifier} reported {theirs}, candidate was {candidate}")]
    Disagreement {
        verifier: String,
        candidate: String,
        theirs: String,
    },
}

type VerifierSet = Vec<(String, Arc<dyn StateRootSource>)>;

/// Verifier sets keyed by security model, with unanimous resolution.
#[derive(Default)]
pub struct RootOracle {
    sets: RwLock<BTreeMap<SecurityModel, VerifierSet>>,
}

impl RootOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style set installation.
    pub fn with_set(self, model: SecurityModel, sources: VerifierSet) -> Self {
        self.set_sources(model, sources);
        self
    }

    /// Replace the verifier set for a model.
    pub fn set_sources(&self, model: SecurityModel, sources: VerifierSet) {
        self.sets.write().insert(model, sources);
    }

    /// Resolve a trusted state root for `(model, origin, block_ref)`.
    pub fn resolve_state_root(
        &self,
        model: SecurityModel,
        origin: DomainId,
        block_ref: u64,
    ) -> Result<[u8; 32], OracleError> {
        if model.is_unset() {
            return Err(OracleError::SecurityModelNotConfigured);
        }
        let sets = self.sets.read();
        let set = sets
            .get(&model)
            .filter(|set| !set.is_empty())
            .ok_or(OracleError::NoVerifierConfigured { model })?;

        let (candidate_id, candidate_source) = &set[0];
        let candidate = candidate_source
            .state_root(origin, block_ref)
            .map_err(|source| OracleError::SourceFailed {
                verifier: candidate_id.clone(),
                source,
            })?;

        for (verifier_id, source) in &set[1..] {
            let theirs = source
                .state_root(origin, block_ref)
                .map_err(|source| OracleError::SourceFailed {
                    verifier: verifier_id.clone(),
                    source,
                })?;
            if theirs != candidate {
                warn!(
                    model = %model,
                    origin = %origin,
                    block_ref,
                    verifier = %verifier_id,
                    "state root disagreement"
                );
                return Err(OracleError::Disagreement {
                    verifier: verifier_id.clone(),
                    candidate: hex::encode(candidate),
                    theirs: hex::encode(theirs),
                });
            }
        }

        debug!(
            model = %model,
            origin = %origin,
            block_ref,
            verifiers = set.len(),
            root = %hex::encode(candidate),
            "state root resolved"
        );
        Ok(candidate)
    }
}

/// Table-driven root source.
///
/// Serves a fixed `(domain, block) -> root` map; the development
/// backend for the node and the honest source in tests.
#[derive(Default)]
pub struct StaticRootSource {
    roots: BTreeMap<(DomainId, u64), [u8; 32]>,
}

impl StaticRootSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, origin: DomainId, block_ref: u64, root: [u8; 32]) -> Self {
        self.roots.insert((origin, block_ref), root);
        self
    }

    pub fn insert(&mut self, origin: DomainId, block_ref: u64, root: [u8; 32]) {
        self.roots.insert((origin, block_ref), root);
    }
}

impl StateRootSource for StaticRootSource {
    fn state_root(&self, origin: DomainId, block_ref: u64) -> Result<[u8; 32], RootSourceError> {
        self.roots
            .get(&(origin, block_ref))
            .copied()
            .ok_or_else(|| {
                RootSourceError::Unavailable(format!(
                    "no root for domain {origin} block {block_ref}"
                ))
            })
    }
}

/// Root source that always fails. Test double.
pub struct FailingRootSource;

impl StateRootSource for FailingRootSource {
    fn state_root(&self, _origin: DomainId, _block_ref: u64) -> Result<[u8; 32], RootSourceError> {
        Err(RootSourceError::Unavailable("backend offline".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(root: [u8; 32]) -> Arc<dyn StateRootSource> {
        Arc::new(StaticRootSource::new().with_root(DomainId(1), 100, root))
    }

    #[test]
    fn unanimous_set_resolves() {
        let oracle = RootOracle::new().with_set(
            SecurityModel(1),
            vec![
                ("alpha".to_string(), source([0x11; 32])),
                ("beta".to_string(), source([0x11; 32])),
                ("gamma".to_string(), source([0x11; 32])),
            ],
        );
        let root = oracle
            .resolve_state_root(SecurityModel(1), DomainId(1), 100)
            .unwrap();
        assert_eq!(root, [0x11; 32]);
    }

    #[test]
    fn single_verifier_is_a_valid_configuration() {
        let oracle = RootOracle::new().with_set(
            SecurityModel(2),
            vec![("solo".to_string(), source([0x22; 32]))],
        );
        assert_eq!(
            oracle
                .resolve_state_root(SecurityModel(2), DomainId(1), 100)
                .unwrap(),
            [0x22; 32]
        );
    }

    #[test]
    fn one_divergent_verifier_fails_resolution() {
        let oracle = RootOracle::new().with_set(
            SecurityModel(1),
            vec![
                ("alpha".to_string(), source([0x11; 32])),
                ("beta".to_string(), source([0x11; 32])),
                ("mallory".to_string(), source([0x99; 32])),
            ],
        );
        let err = oracle
            .resolve_state_root(SecurityModel(1), DomainId(1), 100)
            .unwrap_err();
        match err {
            OracleError::Disagreement { verifier, .. } => assert_eq!(verifier, "mallory"),
            other => panic!("expected disagreement, got {other}"),
        }
    }

    #[test]
    fn unset_model_fails_loudly() {
        let oracle = RootOracle::new().with_set(
            SecurityModel(1),
            vec![("alpha".to_string(), source([0x11; 32]))],
        );
        assert!(matches!(
            oracle.resolve_state_root(SecurityModel(0), DomainId(1), 100),
            Err(OracleError::SecurityModelNotConfigured)
        ));
    }

    #[test]
    fn unknown_or_empty_model_fails() {
        let oracle = RootOracle::new().with_set(SecurityModel(3), vec![]);
        assert!(matches!(
            oracle.resolve_state_root(SecurityModel(7), DomainId(1), 100),
            Err(OracleError::NoVerifierConfigured { .. })
        ));
        assert!(matches!(
            oracle.resolve_state_root(SecurityModel(3), DomainId(1), 100),
            Err(OracleError::NoVerifierConfigured { .. })
        ));
    }

    #[test]
    fn source_failure_is_surfaced() {
        let oracle = RootOracle::new().with_set(
            SecurityModel(1),
            vec![
                ("alpha".to_string(), source([0x11; 32])),
                ("offline".to_string(), Arc::new(FailingRootSource)),
            ],
        );
        let err = oracle
            .resolve_state_root(SecurityModel(1), DomainId(1), 100)
            .unwrap_err();
        assert!(matches!(err, OracleError::SourceFailed { verifier, .. } if verifier == "offline"));
    }
}
