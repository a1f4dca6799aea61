//! Ports
//!
//! A port description is the static part (name, datatype tag, dynamic flag)
//! declared by a module type. `InputPort` and `OutputPort` are the runtime
//! instances owned by a module node: they track which connections are
//! attached and, for outputs, the last data sent.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::connection::ConnectionId;
use super::datatype::DatatypeHandle;
use super::ids::{ModuleId, PortId};

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Static declaration of a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescription {
    pub name: String,
    /// Datatype tag; two ports connect only when their tags are equal.
    pub datatype: String,
    /// Dynamic input ports accept any number of incoming connections.
    #[serde(default)]
    pub dynamic: bool,
}

impl PortDescription {
    pub fn new(name: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datatype: datatype.into(),
            dynamic: false,
        }
    }

    /// Declare a dynamic port.
    pub fn dynamic(name: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            dynamic: true,
            ..Self::new(name, datatype)
        }
    }
}

/// Address of one port on one module, used by connection requests where the
/// direction is not known up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub module: ModuleId,
    pub direction: PortDirection,
    pub index: usize,
}

impl PortRef {
    pub fn input(module: ModuleId, index: usize) -> Self {
        Self {
            module,
            direction: PortDirection::Input,
            index,
        }
    }

    pub fn output(module: ModuleId, index: usize) -> Self {
        Self {
            module,
            direction: PortDirection::Output,
            index,
        }
    }
}

/// Runtime input port.
#[derive(Debug, Clone)]
pub struct InputPort {
    id: PortId,
    description: PortDescription,
    /// Incoming connections in arrival order. One entry unless dynamic.
    connections: SmallVec<[ConnectionId; 1]>,
}

impl InputPort {
    pub(crate) fn new(index: usize, description: PortDescription) -> Self {
        Self {
            id: PortId::new(index, description.name.clone()),
            description,
            connections: SmallVec::new(),
        }
    }

    pub fn id(&self) -> &PortId {
        &self.id
    }

    pub fn description(&self) -> &PortDescription {
        &self.description
    }

    pub fn datatype(&self) -> &str {
        &self.description.datatype
    }

    pub fn is_dynamic(&self) -> bool {
        self.description.dynamic
    }

    pub fn nconnections(&self) -> usize {
        self.connections.len()
    }

    /// Incoming connections, oldest first.
    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }

    /// Whether another connection may be attached.
    pub fn can_accept(&self) -> bool {
        self.is_dynamic() || self.connections.is_empty()
    }

    pub(crate) fn attach(&mut self, id: ConnectionId) {
        self.connections.push(id);
    }

    pub(crate) fn detach(&mut self, id: &ConnectionId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != id);
        self.connections.len() != before
    }
}

/// Runtime output port.
#[derive(Debug, Clone)]
pub struct OutputPort {
    id: PortId,
    description: PortDescription,
    connections: Vec<ConnectionId>,
    data: Option<DatatypeHandle>,
}

impl OutputPort {
    pub(crate) fn new(index: usize, description: PortDescription) -> Self {
        Self {
            id: PortId::new(index, description.name.clone()),
            description,
            connections: Vec::new(),
            data: None,
        }
    }

    pub fn id(&self) -> &PortId {
        &self.id
    }

    pub fn description(&self) -> &PortDescription {
        &self.description
    }

    pub fn datatype(&self) -> &str {
        &self.description.datatype
    }

    pub fn nconnections(&self) -> usize {
        self.connections.len()
    }

    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }

    /// The last data sent on this port, if any.
    pub fn data(&self) -> Option<&DatatypeHandle> {
        self.data.as_ref()
    }

    pub(crate) fn attach(&mut self, id: ConnectionId) {
        self.connections.push(id);
    }

    pub(crate) fn detach(&mut self, id: &ConnectionId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != id);
        self.connections.len() != before
    }

    /// Replace the port data. Returns true if the generation changed.
    pub(crate) fn set_data(&mut self, data: Option<DatatypeHandle>) -> bool {
        let changed = self.data.as_ref().map(DatatypeHandle::generation)
            != data.as_ref().map(DatatypeHandle::generation);
        self.data = data;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(name: &str) -> ConnectionId {
        ConnectionId::from_raw(name)
    }

    #[test]
    fn static_input_accepts_one_connection() {
        let mut port = InputPort::new(0, PortDescription::new("Input", "Matrix"));
        assert!(port.can_accept());

        port.attach(conn("c1"));
        assert!(!port.can_accept());
        assert_eq!(port.nconnections(), 1);

        assert!(port.detach(&conn("c1")));
        assert!(port.can_accept());
    }

    #[test]
    fn dynamic_input_keeps_arrival_order() {
        let mut port = InputPort::new(0, PortDescription::dynamic("Inputs", "Field"));
        port.attach(conn("c2"));
        port.attach(conn("c1"));
        port.attach(conn("c3"));

        assert!(port.can_accept());
        assert_eq!(port.connections(), &[conn("c2"), conn("c1"), conn("c3")]);

        port.detach(&conn("c1"));
        assert_eq!(port.connections(), &[conn("c2"), conn("c3")]);
    }

    #[test]
    fn output_set_data_reports_generation_change() {
        let mut port = OutputPort::new(0, PortDescription::new("Output", "Scalar"));
        let data = DatatypeHandle::new("Scalar", 1.0_f64);

        assert!(port.set_data(Some(data.clone())));
        // Same handle again: same generation
        assert!(!port.set_data(Some(data)));
        assert!(port.set_data(None));
        assert!(!port.set_data(None));
    }
}
