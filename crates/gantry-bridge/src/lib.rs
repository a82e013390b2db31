#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]

//! Gantry bridge engine.
//!
//! Takes untrusted relayer proposals, establishes a trusted state root
//! through a unanimous multi-verifier oracle, proves each proposal's
//! deposit commitment out of the origin domain's state trie, and
//! executes verified proposals exactly once against pluggable handlers.
//!
//! The crate is organised around three seams:
//!
//! - [`oracle`]: [`oracle::StateRootSource`] implementations supply
//!   `(domain, block) -> state root`; the oracle demands unanimity
//!   across the configured verifier set.
//! - [`handler`]: [`handler::ExecutionHandler`] implementations
//!   perform the domain-specific effect of a verified proposal.
//! - [`engine`]: the verification and deduplication state machine
//!   tying both to the persistent nonce bitmap.

pub mod engine;
pub mod handler;
pub mod metrics;
pub mod oracle;

pub use engine::{Engine, EngineError, ProposalOutcome, VerifyError};
pub use handler::{
    AccessControl, AdminOperation, DenyAll, ExecutionHandler, HandlerError, LoggingHandler,
    MockHandler, OpenAccess, ResourceRegistry,
};
pub use metrics::{EngineMetrics, EngineMetricsSnapshot};
pub use oracle::{
    FailingRootSource, OracleError, RootOracle, RootSourceError, StateRootSource,
    StaticRootSource,
};
