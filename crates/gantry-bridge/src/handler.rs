//! Execution-handler and access-control seams.
//!
//! Execution is out of the verification engine's scope: a verified
//! proposal is dispatched to whatever [`ExecutionHandler`] the resource
//! registry maps its resource id to. Handler failures are recoverable:
//! the engine rolls the nonce back and the proposal may be retried.
//! Verification failures, in contrast, are terminal.

use gantry_core::ResourceId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::info;

/// Errors from handler resolution and execution.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("no handler registered for resource {resource}")]
    ResourceNotRegistered { resource: String },
    #[error("handler execution failed: {0}")]
    Execution(String),
}

/// Performs the domain-specific effect of a verified proposal
/// (mint, unlock, message call). May fail; failures are retryable.
pub trait ExecutionHandler: Send + Sync {
    fn execute_proposal(&self, resource_id: ResourceId, data: &[u8])
        -> Result<Vec<u8>, HandlerError>;
}

/// Maps resource ids to their execution handlers.
#[derive(Default)]
pub struct ResourceRegistry {
    handlers: RwLock<BTreeMap<ResourceId, Arc<dyn ExecutionHandler>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, resource_id: ResourceId, handler: Arc<dyn ExecutionHandler>) {
        self.handlers.write().insert(resource_id, handler);
    }

    pub fn resolve(
        &self,
        resource_id: ResourceId,
    ) -> Result<Arc<dyn ExecutionHandler>, HandlerError> {
        self.handlers
            .read()
            .get(&resource_id)
            .cloned()
            .ok_or_else(|| HandlerError::ResourceNotRegistered {
                resource: resource_id.to_hex(),
            })
    }
}

/// Administrative operations gated by [`AccessControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOperation {
    UpdateRoute,
    UpdateVerifierSet,
}

/// Gate for administrative configuration. Never consulted on the
/// verification hot path.
pub trait AccessControl: Send + Sync {
    fn is_allowed(&self, caller: &str, operation: AdminOperation) -> bool;
}

/// Allows every caller. Default for single-operator deployments.
pub struct OpenAccess;

impl AccessControl for OpenAccess {
    fn is_allowed(&self, _caller: &str, _operation: AdminOperation) -> bool {
        true
    }
}

/// Denies every caller. Test double.
pub struct DenyAll;

impl AccessControl for DenyAll {
    fn is_allowed(&self, _caller: &str, _operation: AdminOperation) -> bool {
        false
    }
}

/// Handler that logs the dispatch and succeeds with empty output.
/// Default wiring for the node until real asset handlers are attached.
pub struct LoggingHandler;

impl ExecutionHandler for LoggingHandler {
    fn execute_proposal(
        &self,
        resource_id: ResourceId,
        data: &[u8],
    ) -> Result<Vec<u8>, HandlerError> {
        info!(
            resource = %resource_id,
            data_len = data.len(),
            "executing proposal"
        );
        Ok(Vec::new())
    }
}

/// Recording handler for tests, with an induced-failure budget.
#[derive(Default)]
pub struct MockHandler {
    executed: parking_lot::Mutex<Vec<(ResourceId, Vec<u8>)>>,
    fail_budget: AtomicU32,
}

impl MockHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` executions before succeeding again.
    pub fn fail_times(self, count: u32) -> Self {
        self.fail_budget.store(count, Ordering::SeqCst);
        self
    }

    /// Proposals executed so far.
    pub fn executed(&self) -> Vec<(ResourceId, Vec<u8>)> {
        self.executed.lock().clone()
    }
}

impl ExecutionHandler for MockHandler {
    fn execute_proposal(
        &self,
        resource_id: ResourceId,
        data: &[u8],
    ) -> Result<Vec<u8>, HandlerError> {
        let remaining = self.fail_budget.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_budget.store(remaining - 1, Ordering::SeqCst);
            return Err(HandlerError::Execution(
                "mock: induced failure".to_string(),
            ));
        }
        self.executed.lock().push((resource_id, data.to_vec()));
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolution() {
        let registry = ResourceRegistry::new();
        let resource = ResourceId([0x01; 32]);
        assert!(matches!(
            registry.resolve(resource),
            Err(HandlerError::ResourceNotRegistered { .. })
        ));
        registry.register(resource, Arc::new(LoggingHandler));
        assert!(registry.resolve(resource).is_ok());
    }

    #[test]
    fn mock_handler_fail_budget() {
        let handler = MockHandler::new().fail_times(1);
        let resource = ResourceId([0x02; 32]);
        assert!(handler.execute_proposal(resource, b"x").is_err());
        assert!(handler.execute_proposal(resource, b"x").is_ok());
        assert_eq!(handler.executed().len(), 1);
    }

    #[test]
    fn access_control_defaults() {
        assert!(OpenAccess.is_allowed("anyone", AdminOperation::UpdateRoute));
        assert!(!DenyAll.is_allowed("anyone", AdminOperation::UpdateVerifierSet));
    }
}
