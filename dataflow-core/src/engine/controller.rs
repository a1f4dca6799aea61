//! Network Editor Controller
//!
//! The entry point GUIs and scripts talk to. It owns the network behind a
//! lock, turns successful edits into [`NetworkEvent`]s and runs execution
//! passes with the configured scheduler.
//!
//! # Locking
//!
//! Structural edits and execution passes both take the network lock, so an
//! edit requested while a pass is running waits for the pass to finish.
//! Edit events are emitted after the lock is released; execution events are
//! emitted while it is held.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::{EngineConfig, SchedulerKind};
use crate::error::{ExecutionError, NetworkError, SchedulingError, SerializationError};
use crate::events::{EventBus, ListenerId, NetworkEvent};
use crate::logging::{ModuleLoggerHandle, TracingModuleLogger};
use crate::network::{
    ConnectionDescription, ConnectionId, ModuleFactory, ModuleId, ModuleLookupInfo, Network,
    PortAddress, PortDirection, PortRef,
};
use crate::serialization::NetworkFile;
use crate::state::{ModuleStateFactory, ModuleStateHandle};

use super::executor::{ExecutionReport, SerialExecutor};
use super::scheduler::{LeveledScheduler, ModuleExecutionOrder, Scheduler, SerialScheduler};

/// Logged when a pass is refused because of a cycle.
pub const CYCLE_DIAGNOSTIC: &str =
    "Cannot schedule execution: network has cycles. Please break all cycles and try again.";

/// Mediates every edit and execution request on one network.
pub struct NetworkEditorController {
    network: Arc<Mutex<Network>>,
    events: Arc<EventBus>,
    logger: ModuleLoggerHandle,
    config: EngineConfig,
}

impl NetworkEditorController {
    pub fn new(
        factory: Arc<dyn ModuleFactory>,
        state_factory: Arc<dyn ModuleStateFactory>,
    ) -> Self {
        Self {
            network: Arc::new(Mutex::new(Network::new(factory, state_factory))),
            events: Arc::new(EventBus::new()),
            logger: Arc::new(TracingModuleLogger),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Route module messages to `logger` instead of `tracing`.
    pub fn with_logger(mut self, logger: ModuleLoggerHandle) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&NetworkEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Run `f` with read access to the network.
    pub fn with_network<R>(&self, f: impl FnOnce(&Network) -> R) -> R {
        f(&self.network.lock())
    }

    pub fn module_state(&self, id: &ModuleId) -> Option<ModuleStateHandle> {
        self.network.lock().lookup_module(id).map(|node| node.state())
    }

    pub fn add_module(&self, info: &ModuleLookupInfo) -> Result<ModuleId, NetworkError> {
        let id = self.network.lock().add_module(info)?;
        self.events.emit(&NetworkEvent::ModuleAdded {
            name: info.module_name.clone(),
            id: id.clone(),
        });
        Ok(id)
    }

    /// Remove a module together with its connections. Returns false if the
    /// module does not exist.
    pub fn remove_module(&self, id: &ModuleId) -> bool {
        let removed = self.network.lock().remove_module_with_connections(id);
        let Some(connections) = removed else {
            return false;
        };
        for connection in connections {
            self.events
                .emit(&NetworkEvent::ConnectionRemoved(connection.id().clone()));
        }
        self.events
            .emit(&NetworkEvent::ModuleRemoved { id: id.clone() });
        true
    }

    /// Connect an output port to an input port.
    ///
    /// `ConnectionAdded` fires only when a new connection was made.
    pub fn connect(
        &self,
        from: &ModuleId,
        from_port: usize,
        to: &ModuleId,
        to_port: usize,
    ) -> Result<ConnectionId, NetworkError> {
        let (id, added) = {
            let mut network = self.network.lock();
            let existed = network
                .connection_between(from, from_port, to, to_port)
                .is_some();
            let id = network.connect(from, from_port, to, to_port)?;
            let added = network
                .connection(&id)
                .filter(|_| !existed)
                .map(|c| c.description().clone());
            (id, added)
        };
        if let Some(description) = added {
            self.events.emit(&NetworkEvent::ConnectionAdded(description));
        }
        Ok(id)
    }

    /// Connect two ports given in either order.
    ///
    /// Refused requests (two ports of the same direction, same module,
    /// datatype mismatch, occupied input) fire `InvalidConnection` and
    /// return `None`.
    pub fn request_connection(&self, a: &PortRef, b: &PortRef) -> Option<ConnectionId> {
        let (output, input) = match (a.direction, b.direction) {
            (PortDirection::Output, PortDirection::Input) => (a, b),
            (PortDirection::Input, PortDirection::Output) => (b, a),
            _ => {
                warn!(
                    "refusing to connect two {} ports ({} and {})",
                    a.direction, a.module, b.module
                );
                self.invalid_connection(a, b);
                return None;
            }
        };

        match self.connect(&output.module, output.index, &input.module, input.index) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "invalid connection request");
                self.invalid_connection(output, input);
                None
            }
        }
    }

    fn invalid_connection(&self, from: &PortRef, to: &PortRef) {
        let description = {
            let network = self.network.lock();
            port_address(&network, from).zip(port_address(&network, to))
        };
        if let Some((from, to)) = description {
            self.events.emit(&NetworkEvent::InvalidConnection(
                ConnectionDescription::new(from, to),
            ));
        }
    }

    pub fn remove_connection(&self, id: &ConnectionId) -> bool {
        let removed = self.network.lock().disconnect(id);
        if removed {
            self.events
                .emit(&NetworkEvent::ConnectionRemoved(id.clone()));
        }
        removed
    }

    /// Remove every module and connection.
    pub fn clear_network(&self) {
        self.network.lock().clear();
        self.events.emit(&NetworkEvent::NetworkCleared);
    }

    pub fn save_network(&self) -> NetworkFile {
        NetworkFile::from_network(&self.network.lock())
    }

    /// Replace the current network with the saved one. On failure the
    /// network is left empty.
    pub fn load_network(&self, file: &NetworkFile) -> Result<(), SerializationError> {
        self.clear_network();

        let result = file.rebuild(&mut self.network.lock());
        if let Err(err) = &result {
            warn!(error = %err, "network load failed; clearing partial network");
            self.clear_network();
            return result;
        }

        for entry in &file.modules {
            self.events.emit(&NetworkEvent::ModuleAdded {
                name: entry.info.module_name.clone(),
                id: entry.id.clone(),
            });
        }
        for connection in &file.connections {
            self.events
                .emit(&NetworkEvent::ConnectionAdded(connection.clone()));
        }
        info!(modules = file.modules.len(), connections = file.connections.len(), "network loaded");
        Ok(())
    }

    fn scheduler(&self) -> Box<dyn Scheduler> {
        match self.config.scheduler {
            SchedulerKind::Serial => Box::new(SerialScheduler),
            SchedulerKind::Leveled => Box::new(LeveledScheduler),
        }
    }

    fn executor(&self) -> SerialExecutor {
        SerialExecutor::new(Arc::clone(&self.logger), self.config.clone())
            .with_events(Arc::clone(&self.events))
    }

    /// Schedule and execute every module.
    ///
    /// A cyclic network is refused before anything runs: the diagnostic is
    /// logged and the cycle error returned.
    pub fn execute_all(&self) -> Result<ExecutionReport, ExecutionError> {
        let mut network = self.network.lock();
        let order = self.checked_order(self.scheduler().schedule(&network))?;
        self.executor().execute_all(&mut network, &order)
    }

    /// Execute `start` and everything downstream of it. Other modules keep
    /// their outputs from earlier passes.
    pub fn execute_from(&self, start: &ModuleId) -> Result<ExecutionReport, ExecutionError> {
        let mut network = self.network.lock();
        let order = self.checked_order(self.scheduler().schedule_from(&network, start))?;
        self.executor().execute_all(&mut network, &order)
    }

    /// Run [`execute_all`](Self::execute_all) on the tokio blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn execute_all_detached(
        self: &Arc<Self>,
    ) -> tokio::task::JoinHandle<Result<ExecutionReport, ExecutionError>> {
        let controller = Arc::clone(self);
        tokio::task::spawn_blocking(move || controller.execute_all())
    }

    fn checked_order(
        &self,
        order: Result<ModuleExecutionOrder, SchedulingError>,
    ) -> Result<ModuleExecutionOrder, ExecutionError> {
        order.map_err(|err| {
            error!("{}", CYCLE_DIAGNOSTIC);
            ExecutionError::from(err)
        })
    }
}

impl std::fmt::Debug for NetworkEditorController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkEditorController")
            .field("network", &*self.network.lock())
            .field("events", &self.events)
            .field("config", &self.config)
            .finish()
    }
}

fn port_address(network: &Network, port: &PortRef) -> Option<PortAddress> {
    let node = network.lookup_module(&port.module)?;
    let id = match port.direction {
        PortDirection::Input => node.input_port(port.index)?.id().clone(),
        PortDirection::Output => node.output_port(port.index)?.id().clone(),
    };
    Some(PortAddress::new(port.module.clone(), id))
}
