//! Python API
//!
//! String-based wrapper over the controller for scripting front ends. Module
//! ids cross the boundary as `Name:N` strings. Every call takes
//! `python_lock`, so interpreter commands are applied one at a time even when
//! several threads drive the same editor.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::engine::{ExecutionReport, NetworkEditorController};
use crate::error::{ExecutionError, NetworkError};
use crate::network::{ModuleId, ModuleLookupInfo};
use crate::state::StateValue;

/// Interpreter-facing wrapper around a [`NetworkEditorController`].
pub struct PythonApi {
    controller: Arc<NetworkEditorController>,
    python_lock: Mutex<()>,
}

impl PythonApi {
    pub fn new(controller: Arc<NetworkEditorController>) -> Self {
        Self {
            controller,
            python_lock: Mutex::new(()),
        }
    }

    pub fn controller(&self) -> &Arc<NetworkEditorController> {
        &self.controller
    }

    /// Add a module by name; returns its id string.
    pub fn add_module(&self, name: &str) -> Result<String, NetworkError> {
        let _guard = self.python_lock.lock();
        debug!(module = name, "python: add module");
        let id = self.controller.add_module(&ModuleLookupInfo::named(name))?;
        Ok(id.to_string())
    }

    /// Remove a module and its connections. `Ok(false)` if it does not exist.
    pub fn remove_module(&self, id: &str) -> Result<bool, NetworkError> {
        let _guard = self.python_lock.lock();
        let id: ModuleId = id.parse()?;
        Ok(self.controller.remove_module(&id))
    }

    /// Connect output `from_port` of `from` to input `to_port` of `to`;
    /// returns the connection id string.
    pub fn connect(
        &self,
        from: &str,
        from_port: usize,
        to: &str,
        to_port: usize,
    ) -> Result<String, NetworkError> {
        let _guard = self.python_lock.lock();
        let (from, to): (ModuleId, ModuleId) = (from.parse()?, to.parse()?);
        let id = self.controller.connect(&from, from_port, &to, to_port)?;
        Ok(id.to_string())
    }

    /// Remove the connection between two ports. `Ok(false)` if there is none.
    pub fn disconnect(
        &self,
        from: &str,
        from_port: usize,
        to: &str,
        to_port: usize,
    ) -> Result<bool, NetworkError> {
        let _guard = self.python_lock.lock();
        let (from, to): (ModuleId, ModuleId) = (from.parse()?, to.parse()?);
        let existing = self
            .controller
            .with_network(|n| n.connection_between(&from, from_port, &to, to_port));
        Ok(existing.is_some_and(|id| self.controller.remove_connection(&id)))
    }

    pub fn get_state(&self, id: &str, key: &str) -> Result<Option<StateValue>, NetworkError> {
        let _guard = self.python_lock.lock();
        let id: ModuleId = id.parse()?;
        let state = self
            .controller
            .module_state(&id)
            .ok_or(NetworkError::ModuleNotFound(id))?;
        Ok(state.get_value(key))
    }

    pub fn set_state(&self, id: &str, key: &str, value: StateValue) -> Result<(), NetworkError> {
        let _guard = self.python_lock.lock();
        let id: ModuleId = id.parse()?;
        let state = self
            .controller
            .module_state(&id)
            .ok_or(NetworkError::ModuleNotFound(id))?;
        state.set_value(key, value);
        Ok(())
    }

    pub fn module_ids(&self) -> Vec<String> {
        let _guard = self.python_lock.lock();
        self.controller
            .with_network(|n| n.module_ids().map(ToString::to_string).collect())
    }

    pub fn execute_all(&self) -> Result<ExecutionReport, ExecutionError> {
        let _guard = self.python_lock.lock();
        self.controller.execute_all()
    }
}

impl std::fmt::Debug for PythonApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonApi")
            .field("controller", &self.controller)
            .finish()
    }
}
