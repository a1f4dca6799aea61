//! Modules
//!
//! A module type is anything implementing [`Module`]. The network never sees
//! concrete module types: it wraps each instance in a [`ModuleNode`] that
//! adds the identity, runtime ports, state handle and execution bookkeeping.
//!
//! # Need-to-execute
//!
//! A node needs to execute when any of these hold:
//!
//! - it has never run successfully, or was explicitly marked;
//! - a persisted state key changed since its last successful run;
//! - the data on any of its inputs has a different generation than what it
//!   consumed last time.
//!
//! Modules may still be executed when none of these hold (for propagation);
//! they are expected to re-send their cached outputs instead of recomputing.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::datatype::Generation;
use super::ids::{ModuleId, ModuleLookupInfo};
use super::port::{InputPort, OutputPort, PortDescription};
use crate::engine::ExecutionContext;
use crate::error::ModuleError;
use crate::state::{ModuleState, ModuleStateHandle};

/// Capability interface implemented by every module type.
pub trait Module: Send {
    /// Populate default parameter values. Called once, right after creation.
    fn set_state_defaults(&self, _state: &ModuleState) {}

    /// Run the module: read inputs, compute, send outputs.
    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ModuleError>;
}

/// Older module style that reports failure through a boolean.
pub trait LegacyModule: Send {
    fn set_state_defaults(&self, _state: &ModuleState) {}

    /// Returns false on failure. Details go through the context's logger.
    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> bool;
}

/// Adapts a [`LegacyModule`] to the error-returning [`Module`] contract.
pub struct Legacy<M>(pub M);

impl<M: LegacyModule> Module for Legacy<M> {
    fn set_state_defaults(&self, state: &ModuleState) {
        self.0.set_state_defaults(state);
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ModuleError> {
        if self.0.execute(ctx) {
            Ok(())
        } else {
            Err(ModuleError::LegacyExecuteFailed)
        }
    }
}

/// Static description of a module type, as known to the factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescription {
    pub lookup_info: ModuleLookupInfo,
    pub input_ports: Vec<PortDescription>,
    pub output_ports: Vec<PortDescription>,
    pub has_ui: bool,
    pub has_algorithm: bool,
}

impl ModuleDescription {
    pub fn new(lookup_info: ModuleLookupInfo) -> Self {
        Self {
            lookup_info,
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            has_ui: true,
            has_algorithm: false,
        }
    }

    /// Append an input port.
    pub fn input(mut self, port: PortDescription) -> Self {
        self.input_ports.push(port);
        self
    }

    /// Append an output port.
    pub fn output(mut self, port: PortDescription) -> Self {
        self.output_ports.push(port);
        self
    }

    pub fn without_ui(mut self) -> Self {
        self.has_ui = false;
        self
    }

    pub fn with_algorithm(mut self) -> Self {
        self.has_algorithm = true;
        self
    }

    pub fn module_name(&self) -> &str {
        &self.lookup_info.module_name
    }
}

/// Execution status of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    NotExecuted,
    /// Scheduled in the current pass, not yet started.
    Waiting,
    Executing,
    Completed,
    Errored,
}

/// Generations of the data seen on each input port (per connection, in
/// arrival order) when a module last ran.
pub(crate) type InputSignature = Vec<Vec<Option<Generation>>>;

/// A module instance living in a network.
pub struct ModuleNode {
    id: ModuleId,
    description: ModuleDescription,
    module: Box<dyn Module>,
    state: ModuleStateHandle,
    input_ports: Vec<InputPort>,
    output_ports: Vec<OutputPort>,
    execution_state: ExecutionState,
    needs_execution: bool,
    last_inputs: Option<InputSignature>,
    execution_count: usize,
}

impl ModuleNode {
    pub(crate) fn new(
        id: ModuleId,
        description: ModuleDescription,
        module: Box<dyn Module>,
        state: ModuleStateHandle,
    ) -> Self {
        module.set_state_defaults(&state);

        let input_ports = description
            .input_ports
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, p)| InputPort::new(i, p))
            .collect();
        let output_ports = description
            .output_ports
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, p)| OutputPort::new(i, p))
            .collect();

        Self {
            id,
            description,
            module,
            state,
            input_ports,
            output_ports,
            execution_state: ExecutionState::NotExecuted,
            needs_execution: true,
            last_inputs: None,
            execution_count: 0,
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn info(&self) -> &ModuleLookupInfo {
        &self.description.lookup_info
    }

    pub fn description(&self) -> &ModuleDescription {
        &self.description
    }

    pub fn module_name(&self) -> &str {
        self.description.module_name()
    }

    pub fn has_ui(&self) -> bool {
        self.description.has_ui
    }

    /// Shared handle to this module's state.
    pub fn state(&self) -> ModuleStateHandle {
        ModuleStateHandle::clone(&self.state)
    }

    pub fn num_input_ports(&self) -> usize {
        self.input_ports.len()
    }

    pub fn num_output_ports(&self) -> usize {
        self.output_ports.len()
    }

    pub fn input_port(&self, index: usize) -> Option<&InputPort> {
        self.input_ports.get(index)
    }

    pub fn output_port(&self, index: usize) -> Option<&OutputPort> {
        self.output_ports.get(index)
    }

    pub fn input_ports(&self) -> &[InputPort] {
        &self.input_ports
    }

    pub fn output_ports(&self) -> &[OutputPort] {
        &self.output_ports
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.execution_state
    }

    /// Successful runs since creation.
    pub fn execution_count(&self) -> usize {
        self.execution_count
    }

    /// Force the next need-to-execute check to report true.
    pub fn mark_needs_execution(&mut self) {
        self.needs_execution = true;
    }

    /// Need-to-execute check against the given current input signature.
    pub(crate) fn need_to_execute_with(&self, inputs: &InputSignature) -> bool {
        self.needs_execution
            || self.state.has_changes()
            || self.last_inputs.as_ref() != Some(inputs)
    }

    pub(crate) fn input_port_mut(&mut self, index: usize) -> Option<&mut InputPort> {
        self.input_ports.get_mut(index)
    }

    pub(crate) fn output_port_mut(&mut self, index: usize) -> Option<&mut OutputPort> {
        self.output_ports.get_mut(index)
    }

    pub(crate) fn module_mut(&mut self) -> &mut dyn Module {
        self.module.as_mut()
    }

    pub(crate) fn set_execution_state(&mut self, state: ExecutionState) {
        self.execution_state = state;
    }

    /// Drop all output data, e.g. before a pass that will rerun this module.
    pub(crate) fn clear_outputs(&mut self) {
        for port in &mut self.output_ports {
            port.set_data(None);
        }
    }

    /// Record a successful run. `observed` is the state revision snapshotted
    /// before the run; later state changes still count as pending.
    pub(crate) fn record_success(&mut self, inputs: InputSignature, observed: u64) {
        self.last_inputs = Some(inputs);
        self.needs_execution = false;
        self.execution_count += 1;
        self.execution_state = ExecutionState::Completed;
        self.state.mark_observed_upto(observed);
    }
}

impl fmt::Debug for ModuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleNode")
            .field("id", &self.id)
            .field("inputs", &self.input_ports.len())
            .field("outputs", &self.output_ports.len())
            .field("execution_state", &self.execution_state)
            .field("execution_count", &self.execution_count)
            .finish()
    }
}
