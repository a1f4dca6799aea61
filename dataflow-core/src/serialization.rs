//! Network Files
//!
//! A [`NetworkFile`] is the persistable picture of a network: module ids and
//! lookup descriptors, each module's persisted state, and the connections.
//! Transient state and port data are never written.
//!
//! Two encodings are provided: JSON for files people read and diff, and
//! MessagePack for compact snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SerializationError;
use crate::network::{ConnectionDescription, ModuleId, ModuleLookupInfo, Network};
use crate::state::StateValue;

/// One saved module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub id: ModuleId,
    pub info: ModuleLookupInfo,
    #[serde(default)]
    pub state: BTreeMap<String, StateValue>,
}

/// Saved form of a whole network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkFile {
    pub modules: Vec<ModuleEntry>,
    #[serde(default)]
    pub connections: Vec<ConnectionDescription>,
}

impl NetworkFile {
    /// Capture the structure and persisted state of `network`.
    pub fn from_network(network: &Network) -> Self {
        let modules = network
            .modules()
            .map(|node| ModuleEntry {
                id: node.id().clone(),
                info: node.info().clone(),
                state: node.state().values(),
            })
            .collect();
        let connections = network
            .connections()
            .map(|c| c.description().clone())
            .collect();
        Self {
            modules,
            connections,
        }
    }

    /// Recreate the saved modules and connections inside `network`, keeping
    /// the saved module ids.
    ///
    /// Stops at the first failure; the caller decides what to do with a
    /// partially rebuilt network.
    pub fn rebuild(&self, network: &mut Network) -> Result<(), SerializationError> {
        for entry in &self.modules {
            let id = network.add_module_with_id(&entry.info, entry.id.clone())?;
            if let Some(node) = network.lookup_module(&id) {
                let state = node.state();
                for (key, value) in &entry.state {
                    state.set_value(key.clone(), value.clone());
                }
            }
        }
        for connection in &self.connections {
            network.connect(
                &connection.from.module,
                connection.from.port.index,
                &connection.to.module,
                connection.to.port.index,
            )?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SerializationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, SerializationError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
