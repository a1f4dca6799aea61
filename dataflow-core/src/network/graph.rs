//! Network
//!
//! The network owns every module node and every connection. Modules live in
//! an insertion-ordered map keyed by id; connections refer to modules by id
//! and port index only, so there are no ownership cycles even when the
//! module graph itself is cyclic.
//!
//! # Invariants
//!
//! - No connection references a module that is not in the network.
//! - Each connection id appears in exactly the two port connection lists of
//!   its endpoints.
//! - A non-dynamic input port has at most one incoming connection.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::connection::{Connection, ConnectionDescription, ConnectionId, PortAddress};
use super::datatype::{DatatypeHandle, Generation};
use super::factory::ModuleFactory;
use super::ids::{ModuleId, ModuleLookupInfo};
use super::module::{InputSignature, ModuleNode};
use super::port::PortDirection;
use crate::error::NetworkError;
use crate::state::ModuleStateFactory;

/// Data available on one input port at execution time.
#[derive(Debug, Clone, Default)]
pub(crate) struct InputSlot {
    /// Number of incoming connections.
    pub connected: usize,
    /// Data from upstream ports that have sent something, in arrival order.
    pub data: Vec<DatatypeHandle>,
}

/// The directed graph of modules and connections.
pub struct Network {
    factory: Arc<dyn ModuleFactory>,
    state_factory: Arc<dyn ModuleStateFactory>,
    modules: IndexMap<ModuleId, ModuleNode>,
    connections: IndexMap<ConnectionId, Connection>,
    /// Next sequence number per module name.
    id_counters: HashMap<String, usize>,
}

impl Network {
    pub fn new(
        factory: Arc<dyn ModuleFactory>,
        state_factory: Arc<dyn ModuleStateFactory>,
    ) -> Self {
        Self {
            factory,
            state_factory,
            modules: IndexMap::new(),
            connections: IndexMap::new(),
            id_counters: HashMap::new(),
        }
    }

    /// Create a module through the factory and append it.
    ///
    /// Fails only when the factory does not know the module.
    pub fn add_module(&mut self, info: &ModuleLookupInfo) -> Result<ModuleId, NetworkError> {
        let index = self
            .id_counters
            .get(&info.module_name)
            .copied()
            .unwrap_or(0);
        let id = ModuleId::new(info.module_name.clone(), index);
        let node = self.instantiate(info, id.clone())?;
        self.id_counters.insert(info.module_name.clone(), index + 1);

        debug!(module = %id, "module added");
        self.modules.insert(id.clone(), node);
        Ok(id)
    }

    /// Create a module under a caller-chosen id, as when restoring a saved
    /// network. Later automatic ids for that name continue past it.
    pub fn add_module_with_id(
        &mut self,
        info: &ModuleLookupInfo,
        id: ModuleId,
    ) -> Result<ModuleId, NetworkError> {
        if self.modules.contains_key(&id) {
            return Err(NetworkError::DuplicateModuleId(id));
        }
        let node = self.instantiate(info, id.clone())?;

        let counter = self.id_counters.entry(id.name().to_string()).or_insert(0);
        *counter = (*counter).max(id.index() + 1);

        debug!(module = %id, "module added with explicit id");
        self.modules.insert(id.clone(), node);
        Ok(id)
    }

    fn instantiate(&self, info: &ModuleLookupInfo, id: ModuleId) -> Result<ModuleNode, NetworkError> {
        let description = self.factory.lookup_description(info)?;
        let module = self.factory.create(info)?;
        let state = self.state_factory.make_state(&info.module_name);
        Ok(ModuleNode::new(id, description, module, state))
    }

    /// Remove a module that has no connections.
    ///
    /// Returns false when the module is absent or still connected; use
    /// [`remove_module_with_connections`](Self::remove_module_with_connections)
    /// to drop a connected module.
    pub fn remove_module(&mut self, id: &ModuleId) -> bool {
        if !self.modules.contains_key(id) {
            return false;
        }
        if self.connections.values().any(|c| c.touches(id)) {
            warn!(module = %id, "refusing to remove a module that still has connections");
            return false;
        }
        self.modules.shift_remove(id);
        debug!(module = %id, "module removed");
        true
    }

    /// Remove a module together with every connection touching it.
    ///
    /// Returns the removed connections, or `None` if the module is absent.
    pub fn remove_module_with_connections(&mut self, id: &ModuleId) -> Option<Vec<Connection>> {
        if !self.modules.contains_key(id) {
            return None;
        }
        let incident: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.touches(id))
            .map(|c| c.id().clone())
            .collect();

        let mut removed = Vec::with_capacity(incident.len());
        for cid in incident {
            if let Some(connection) = self.detach(&cid) {
                removed.push(connection);
            }
        }
        self.modules.shift_remove(id);
        debug!(module = %id, connections = removed.len(), "module removed with its connections");
        Some(removed)
    }

    /// Connect output port `from_port` of `from` to input port `to_port` of
    /// `to`.
    ///
    /// Connecting the same two ports again is a no-op returning the existing
    /// id. On error nothing is changed.
    pub fn connect(
        &mut self,
        from: &ModuleId,
        from_port: usize,
        to: &ModuleId,
        to_port: usize,
    ) -> Result<ConnectionId, NetworkError> {
        let description = self.describe_connection(from, from_port, to, to_port)?;
        let id = ConnectionId::create(&description);
        if self.connections.contains_key(&id) {
            debug!(connection = %id, "connection already exists");
            return Ok(id);
        }

        let source = &self.modules[from];
        let target = &self.modules[to];
        let out = &source.output_ports()[from_port];
        let input = &target.input_ports()[to_port];
        if out.datatype() != input.datatype() {
            return Err(NetworkError::IncompatiblePortTypes {
                from_type: out.datatype().to_string(),
                to_type: input.datatype().to_string(),
            });
        }
        if !input.can_accept() {
            return Err(NetworkError::InputPortOccupied {
                module: to.clone(),
                port: to_port,
            });
        }

        if let Some(port) = self
            .modules
            .get_mut(from)
            .and_then(|m| m.output_port_mut(from_port))
        {
            port.attach(id.clone());
        }
        if let Some(port) = self
            .modules
            .get_mut(to)
            .and_then(|m| m.input_port_mut(to_port))
        {
            port.attach(id.clone());
        }
        self.connections
            .insert(id.clone(), Connection::new(description));

        debug!(connection = %id, "connected");
        Ok(id)
    }

    /// Validate endpoints and build the description of a prospective
    /// connection. Does not check datatypes or port occupancy.
    pub fn describe_connection(
        &self,
        from: &ModuleId,
        from_port: usize,
        to: &ModuleId,
        to_port: usize,
    ) -> Result<ConnectionDescription, NetworkError> {
        let source = self
            .modules
            .get(from)
            .ok_or_else(|| NetworkError::ModuleNotFound(from.clone()))?;
        let target = self
            .modules
            .get(to)
            .ok_or_else(|| NetworkError::ModuleNotFound(to.clone()))?;
        if from == to {
            return Err(NetworkError::SameModuleConnection(from.clone()));
        }

        let out = source
            .output_port(from_port)
            .ok_or_else(|| NetworkError::PortOutOfRange {
                module: from.clone(),
                direction: PortDirection::Output,
                port: from_port,
                count: source.num_output_ports(),
            })?;
        let input = target
            .input_port(to_port)
            .ok_or_else(|| NetworkError::PortOutOfRange {
                module: to.clone(),
                direction: PortDirection::Input,
                port: to_port,
                count: target.num_input_ports(),
            })?;

        Ok(ConnectionDescription::new(
            PortAddress::new(from.clone(), out.id().clone()),
            PortAddress::new(to.clone(), input.id().clone()),
        ))
    }

    /// Remove a connection. Returns false if it does not exist.
    pub fn disconnect(&mut self, id: &ConnectionId) -> bool {
        let removed = self.detach(id).is_some();
        if removed {
            debug!(connection = %id, "disconnected");
        }
        removed
    }

    fn detach(&mut self, id: &ConnectionId) -> Option<Connection> {
        let connection = self.connections.shift_remove(id)?;
        if let Some(port) = self
            .modules
            .get_mut(connection.source())
            .and_then(|m| m.output_port_mut(connection.source_port()))
        {
            port.detach(id);
        }
        if let Some(port) = self
            .modules
            .get_mut(connection.target())
            .and_then(|m| m.input_port_mut(connection.target_port()))
        {
            port.detach(id);
        }
        Some(connection)
    }

    /// Id of the connection between two ports, if they are connected.
    pub fn connection_between(
        &self,
        from: &ModuleId,
        from_port: usize,
        to: &ModuleId,
        to_port: usize,
    ) -> Option<ConnectionId> {
        let description = self
            .describe_connection(from, from_port, to, to_port)
            .ok()?;
        let id = ConnectionId::create(&description);
        self.connections.contains_key(&id).then_some(id)
    }

    /// Remove every module and connection. Id counters are kept.
    pub fn clear(&mut self) {
        self.connections.clear();
        self.modules.clear();
    }

    pub fn nmodules(&self) -> usize {
        self.modules.len()
    }

    pub fn nconnections(&self) -> usize {
        self.connections.len()
    }

    /// The `index`-th module in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if `index >= nmodules()`.
    pub fn module(&self, index: usize) -> &ModuleNode {
        match self.modules.get_index(index) {
            Some((_, node)) => node,
            None => panic!(
                "module index {index} out of range (network has {} modules)",
                self.modules.len()
            ),
        }
    }

    pub fn lookup_module(&self, id: &ModuleId) -> Option<&ModuleNode> {
        self.modules.get(id)
    }

    pub fn lookup_module_mut(&mut self, id: &ModuleId) -> Option<&mut ModuleNode> {
        self.modules.get_mut(id)
    }

    /// Position of a module in insertion order.
    pub fn index_of(&self, id: &ModuleId) -> Option<usize> {
        self.modules.get_index_of(id)
    }

    pub fn contains_module(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    /// Modules in insertion order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.values()
    }

    pub fn module_ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.keys()
    }

    /// Connections in creation order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Connections leaving `id`.
    pub fn downstream_connections<'a>(
        &'a self,
        id: &'a ModuleId,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.values().filter(move |c| c.source() == id)
    }

    /// Connections arriving at `id`.
    pub fn upstream_connections<'a>(
        &'a self,
        id: &'a ModuleId,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.values().filter(move |c| c.target() == id)
    }

    /// Every module reachable from `id` along connections, excluding `id`
    /// itself unless it lies on a cycle.
    pub fn downstream_closure(&self, id: &ModuleId) -> HashSet<ModuleId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(id.clone());

        while let Some(current) = queue.pop_front() {
            for connection in self.downstream_connections(&current) {
                if visited.insert(connection.target().clone()) {
                    queue.push_back(connection.target().clone());
                }
            }
        }
        visited
    }

    /// Whether the module's current inputs or state differ from its last
    /// successful run. `None` if the module is absent.
    pub fn need_to_execute(&self, id: &ModuleId) -> Option<bool> {
        let node = self.modules.get(id)?;
        Some(node.need_to_execute_with(&self.input_signature(node)))
    }

    /// Generations currently visible on each input port of `node`.
    pub(crate) fn input_signature(&self, node: &ModuleNode) -> InputSignature {
        node.input_ports()
            .iter()
            .map(|port| {
                port.connections()
                    .iter()
                    .map(|cid| self.upstream_data(cid).map(DatatypeHandle::generation))
                    .collect::<Vec<Option<Generation>>>()
            })
            .collect()
    }

    /// Data currently visible on each input port of `node`.
    pub(crate) fn gather_inputs(&self, node: &ModuleNode) -> Vec<InputSlot> {
        node.input_ports()
            .iter()
            .map(|port| InputSlot {
                connected: port.nconnections(),
                data: port
                    .connections()
                    .iter()
                    .filter_map(|cid| self.upstream_data(cid).cloned())
                    .collect(),
            })
            .collect()
    }

    fn upstream_data(&self, cid: &ConnectionId) -> Option<&DatatypeHandle> {
        let connection = self.connections.get(cid)?;
        self.modules
            .get(connection.source())?
            .output_port(connection.source_port())?
            .data()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Network: {} modules, {} connections",
            self.modules.len(),
            self.connections.len()
        )?;
        for node in self.modules.values() {
            writeln!(
                f,
                "  module {} [{} in, {} out]",
                node.id(),
                node.num_input_ports(),
                node.num_output_ports()
            )?;
        }
        for connection in self.connections.values() {
            writeln!(f, "  connection {}", connection.description())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("connections", &self.connections.keys().collect::<Vec<_>>())
            .finish()
    }
}
