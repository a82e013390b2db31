//! Injected configuration for the verification engine.
//!
//! Routes and verifier sets are explicit structures handed to the engine
//! at construction (or updated through its access-controlled admin
//! surface). There are no ambient global registries.

use crate::{Address, DomainId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Location of the deposit registry on one origin domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRoute {
    /// Account of the deposit-registry contract on the origin domain.
    pub registry_address: Address,
    /// Storage slot index of the registry's nonce-to-commitment mapping.
    pub slot_index: u64,
}

/// Per-origin-domain route table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    routes: BTreeMap<DomainId, DomainRoute>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, domain: DomainId, route: DomainRoute) -> Self {
        self.routes.insert(domain, route);
        self
    }

    pub fn insert(&mut self, domain: DomainId, route: DomainRoute) {
        self.routes.insert(domain, route);
    }

    pub fn get(&self, domain: DomainId) -> Option<&DomainRoute> {
        self.routes.get(&domain)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DomainId, &DomainRoute)> {
        self.routes.iter()
    }
}
