//! Connections
//!
//! A connection is a directed edge from one output port to one input port.
//! Its id is derived from the four endpoint fields, so connecting the same
//! pair of ports twice produces the same id.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{ModuleId, PortId};

/// One end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortAddress {
    pub module: ModuleId,
    pub port: PortId,
}

impl PortAddress {
    pub fn new(module: ModuleId, port: PortId) -> Self {
        Self { module, port }
    }
}

/// Endpoints of a connection: `from` is an output port, `to` an input port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionDescription {
    pub from: PortAddress,
    pub to: PortAddress,
}

impl ConnectionDescription {
    pub fn new(from: PortAddress, to: PortAddress) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for ConnectionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) -> {}({})",
            self.from.module, self.from.port, self.to.module, self.to.port
        )
    }
}

/// Deterministic id of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Derive the id for a description.
    pub fn create(desc: &ConnectionDescription) -> Self {
        Self(format!(
            "{}_p#{}_@to@_{}_p#{}",
            desc.from.module, desc.from.port, desc.to.module, desc.to.port
        ))
    }

    pub(crate) fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directed edge in the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    id: ConnectionId,
    description: ConnectionDescription,
}

impl Connection {
    pub(crate) fn new(description: ConnectionDescription) -> Self {
        Self {
            id: ConnectionId::create(&description),
            description,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn description(&self) -> &ConnectionDescription {
        &self.description
    }

    /// Producing module.
    pub fn source(&self) -> &ModuleId {
        &self.description.from.module
    }

    /// Consuming module.
    pub fn target(&self) -> &ModuleId {
        &self.description.to.module
    }

    pub fn source_port(&self) -> usize {
        self.description.from.port.index
    }

    pub fn target_port(&self) -> usize {
        self.description.to.port.index
    }

    /// Whether either endpoint is on `module`.
    pub fn touches(&self, module: &ModuleId) -> bool {
        self.source() == module || self.target() == module
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(from: &str, to: &str) -> ConnectionDescription {
        ConnectionDescription::new(
            PortAddress::new(from.parse().unwrap(), PortId::new(0, "Output")),
            PortAddress::new(to.parse().unwrap(), PortId::new(1, "Input")),
        )
    }

    #[test]
    fn connection_id_is_derived_from_endpoints() {
        let id = ConnectionId::create(&desc("A:0", "B:0"));
        assert_eq!(id.as_str(), "A:0_p#Output#0_@to@_B:0_p#Input#1");

        // Same endpoints, same id
        assert_eq!(id, ConnectionId::create(&desc("A:0", "B:0")));
        assert_ne!(id, ConnectionId::create(&desc("A:0", "B:1")));
    }

    #[test]
    fn connection_touches_both_endpoints() {
        let connection = Connection::new(desc("A:0", "B:0"));
        assert!(connection.touches(&"A:0".parse().unwrap()));
        assert!(connection.touches(&"B:0".parse().unwrap()));
        assert!(!connection.touches(&"C:0".parse().unwrap()));
        assert_eq!(connection.source_port(), 0);
        assert_eq!(connection.target_port(), 1);
    }
}
