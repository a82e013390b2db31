#![forbid(unsafe_code)]

//! Node configuration file.
//!
//! Routes and verifier sets are loaded from a JSON file at startup and
//! passed into the engine at construction. The file also carries the
//! static `(domain, block) -> root` tables served by the development
//! oracle backend; a production deployment would swap those for live
//! light-client sources behind the same [`StateRootSource`] trait.
//!
//! ```json
//! {
//!   "routes": [
//!     { "domain": 1, "registry_address": "0xaa..aa", "slot_index": 5 }
//!   ],
//!   "verifier_sets": [
//!     {
//!       "model": 1,
//!       "verifiers": [
//!         {
//!           "id": "alpha",
//!           "roots": [
//!             { "domain": 1, "block_ref": 100, "root": "0x11..11" }
//!           ]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use gantry_bridge::{StateRootSource, StaticRootSource};
use gantry_core::{Address, DomainId, DomainRoute, Hash32, ResourceId, RouteTable, SecurityModel};
use serde::Deserialize;
use std::fs;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("route for domain {domain}: {reason}")]
    InvalidRoute { domain: u8, reason: String },
    #[error("verifier {verifier}: {reason}")]
    InvalidRoot { verifier: String, reason: String },
    #[error("resource id {resource}: {reason}")]
    InvalidResource { resource: String, reason: String },
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub verifier_sets: Vec<VerifierSetEntry>,
    /// Resource ids (hex) the node accepts proposals for. Each gets the
    /// default logging handler until real asset handlers are attached.
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteEntry {
    pub domain: u8,
    pub registry_address: String,
    pub slot_index: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifierSetEntry {
    pub model: u8,
    pub verifiers: Vec<VerifierEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifierEntry {
    pub id: String,
    #[serde(default)]
    pub roots: Vec<RootEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RootEntry {
    pub domain: u8,
    pub block_ref: u64,
    pub root: String,
}

impl NodeConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Route table for the engine, with addresses parsed out of hex.
    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        let mut table = RouteTable::new();
        for entry in &self.routes {
            let registry_address =
                Address::from_hex(&entry.registry_address).map_err(|err| {
                    ConfigError::InvalidRoute {
                        domain: entry.domain,
                        reason: err.to_string(),
                    }
                })?;
            table.insert(
                DomainId(entry.domain),
                DomainRoute {
                    registry_address,
                    slot_index: entry.slot_index,
                },
            );
        }
        Ok(table)
    }

    /// Verifier sets backed by static root tables, one per model.
    #[allow(clippy::type_complexity)]
    pub fn verifier_sources(
        &self,
    ) -> Result<Vec<(SecurityModel, Vec<(String, Arc<dyn StateRootSource>)>)>, ConfigError> {
        let mut sets = Vec::with_capacity(self.verifier_sets.len());
        for set in &self.verifier_sets {
            let mut sources: Vec<(String, Arc<dyn StateRootSource>)> =
                Vec::with_capacity(set.verifiers.len());
            for verifier in &set.verifiers {
                let mut table = StaticRootSource::new();
                for root in &verifier.roots {
                    let parsed =
                        Hash32::from_hex(&root.root).map_err(|err| ConfigError::InvalidRoot {
                            verifier: verifier.id.clone(),
                            reason: err.to_string(),
                        })?;
                    table.insert(DomainId(root.domain), root.block_ref, parsed.0);
                }
                sources.push((verifier.id.clone(), Arc::new(table)));
            }
            sets.push((SecurityModel(set.model), sources));
        }
        Ok(sets)
    }

    pub fn resource_ids(&self) -> Result<Vec<ResourceId>, ConfigError> {
        self.resources
            .iter()
            .map(|raw| {
                ResourceId::from_hex(raw).map_err(|err| ConfigError::InvalidResource {
                    resource: raw.clone(),
                    reason: err.to_string(),
                })
            })
            .collect()
    }
}
