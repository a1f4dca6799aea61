//! Execution Context
//!
//! The view a module gets of the world while its `execute()` runs: input
//! data gathered from upstream ports, a place to send outputs, its state,
//! a logger and the re-execution request flag.

use std::any::{type_name, Any};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::ModuleError;
use crate::events::{EventBus, NetworkEvent};
use crate::logging::{LogLevel, ModuleLogger};
use crate::network::{DatatypeHandle, InputSlot, ModuleId, PortDirection};
use crate::state::{ModuleState, ModuleStateHandle};

use super::streaming::{wait_for, PollOutcome, StreamingQueue};

/// Output port layout handed to the context.
#[derive(Debug, Clone)]
pub(crate) struct OutputSlot {
    pub datatype: String,
    pub connected: bool,
}

/// What a successful run leaves behind for the executor.
#[derive(Debug)]
pub(crate) struct ExecutionOutcome {
    pub sent: Vec<Option<DatatypeHandle>>,
    pub execute_again: bool,
}

/// Per-invocation handle passed to [`Module::execute`](crate::network::Module::execute).
pub struct ExecutionContext<'a> {
    module_id: ModuleId,
    state: ModuleStateHandle,
    inputs: Vec<InputSlot>,
    outputs: Vec<OutputSlot>,
    sent: Vec<Option<DatatypeHandle>>,
    need_to_execute: bool,
    execute_again: bool,
    logger: &'a dyn ModuleLogger,
    events: Option<&'a EventBus>,
    config: &'a EngineConfig,
}

impl<'a> ExecutionContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        module_id: ModuleId,
        state: ModuleStateHandle,
        inputs: Vec<InputSlot>,
        outputs: Vec<OutputSlot>,
        need_to_execute: bool,
        logger: &'a dyn ModuleLogger,
        events: Option<&'a EventBus>,
        config: &'a EngineConfig,
    ) -> Self {
        let sent = vec![None; outputs.len()];
        Self {
            module_id,
            state,
            inputs,
            outputs,
            sent,
            need_to_execute,
            execute_again: false,
            logger,
            events,
            config,
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    /// Whether inputs or state differ from the last successful run.
    ///
    /// When false, the module should re-send cached outputs instead of
    /// recomputing them.
    pub fn need_to_execute(&self) -> bool {
        self.need_to_execute
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Number of connections on an input port.
    pub fn input_connections(&self, port: usize) -> Result<usize, ModuleError> {
        Ok(self.input_slot(port)?.connected)
    }

    fn input_slot(&self, port: usize) -> Result<&InputSlot, ModuleError> {
        self.inputs.get(port).ok_or(ModuleError::PortNotFound {
            direction: PortDirection::Input,
            port,
        })
    }

    /// Data on an input port. Fails if the port has no data in this pass.
    pub fn get_required_handle(&self, port: usize) -> Result<DatatypeHandle, ModuleError> {
        self.input_slot(port)?
            .data
            .first()
            .cloned()
            .ok_or(ModuleError::NoHandleOnPort { port })
    }

    /// Data on an input port, or `None` if there is none.
    pub fn get_optional_handle(&self, port: usize) -> Result<Option<DatatypeHandle>, ModuleError> {
        Ok(self.input_slot(port)?.data.first().cloned())
    }

    /// Typed data on an input port. Fails on missing data or a type mismatch.
    pub fn get_required_input<T: Any + Send + Sync>(
        &self,
        port: usize,
    ) -> Result<Arc<T>, ModuleError> {
        let handle = self.get_required_handle(port)?;
        downcast_input(port, &handle)
    }

    /// Typed data on an input port, `None` if nothing arrived.
    ///
    /// A type mismatch is still an error.
    pub fn get_optional_input<T: Any + Send + Sync>(
        &self,
        port: usize,
    ) -> Result<Option<Arc<T>>, ModuleError> {
        self.get_optional_handle(port)?
            .map(|handle| downcast_input(port, &handle))
            .transpose()
    }

    /// Typed data from every connection on a dynamic input port, in
    /// connection order. Connections whose producer sent nothing are skipped.
    pub fn get_dynamic_inputs<T: Any + Send + Sync>(
        &self,
        port: usize,
    ) -> Result<Vec<Arc<T>>, ModuleError> {
        self.input_slot(port)?
            .data
            .iter()
            .map(|handle| downcast_input(port, handle))
            .collect()
    }

    /// Send data on an output port. The handle's type tag must match the
    /// port's datatype.
    ///
    /// Re-sending a handle received earlier keeps its generation, so
    /// downstream modules see the data as unchanged.
    pub fn send_output(&mut self, port: usize, handle: DatatypeHandle) -> Result<(), ModuleError> {
        let slot = self.outputs.get(port).ok_or(ModuleError::PortNotFound {
            direction: PortDirection::Output,
            port,
        })?;
        if handle.type_name() != slot.datatype {
            return Err(ModuleError::WrongDatatypeOnPort {
                port,
                expected: slot.datatype.clone(),
                actual: handle.type_name().to_string(),
            });
        }
        self.sent[port] = Some(handle);
        Ok(())
    }

    /// Wrap a value in a new handle tagged with the port's datatype and send
    /// it. Returns the handle so the module can cache it.
    pub fn send_value<T: Any + Send + Sync>(
        &mut self,
        port: usize,
        value: T,
    ) -> Result<DatatypeHandle, ModuleError> {
        let datatype = self
            .outputs
            .get(port)
            .ok_or(ModuleError::PortNotFound {
                direction: PortDirection::Output,
                port,
            })?
            .datatype
            .clone();
        let handle = DatatypeHandle::new(datatype, value);
        self.send_output(port, handle.clone())?;
        Ok(handle)
    }

    /// Whether anything downstream listens on an output port.
    pub fn is_output_connected(&self, port: usize) -> bool {
        self.outputs.get(port).is_some_and(|slot| slot.connected)
    }

    /// Ask the executor to invoke this module again within the current pass.
    pub fn enqueue_execute_again(&mut self) {
        self.execute_again = true;
    }

    pub fn execute_again_requested(&self) -> bool {
        self.execute_again
    }

    pub fn error(&self, message: &str) {
        self.logger.log(&self.module_id, LogLevel::Error, message);
    }

    pub fn warning(&self, message: &str) {
        self.logger.log(&self.module_id, LogLevel::Warning, message);
    }

    pub fn remark(&self, message: &str) {
        self.logger.log(&self.module_id, LogLevel::Remark, message);
    }

    pub fn status(&self, message: &str) {
        self.logger.log(&self.module_id, LogLevel::Status, message);
    }

    /// Report progress in `[0, 1]`; values outside are clamped.
    pub fn report_progress(&self, fraction: f64) {
        if let Some(events) = self.events {
            events.emit(&NetworkEvent::ModuleProgress {
                id: self.module_id.clone(),
                fraction: fraction.clamp(0.0, 1.0),
            });
        }
    }

    /// Poll a streaming queue using the configured interval and retry count.
    /// Running out of retries is reported as a warning, not an error.
    pub fn poll_stream<T>(&self, queue: &StreamingQueue<T>) -> PollOutcome<T> {
        let outcome = queue.poll(self.config.poll_interval(), self.config.max_poll_retries);
        if let PollOutcome::Exhausted { attempts } = &outcome {
            self.warning(&format!(
                "no data from stream after {attempts} attempts; giving up for this invocation"
            ));
        }
        outcome
    }

    /// Wait for an external result using the configured interval and retry
    /// count. Warns when nothing arrives.
    pub fn wait_for<T>(&self, probe: impl FnMut() -> Option<T>) -> Option<T> {
        let value = wait_for(
            self.config.poll_interval(),
            self.config.max_poll_retries,
            probe,
        );
        if value.is_none() {
            self.warning(&format!(
                "timed out waiting for output after {} attempts",
                self.config.max_poll_retries.max(1)
            ));
        }
        value
    }

    pub(crate) fn into_outcome(self) -> ExecutionOutcome {
        ExecutionOutcome {
            sent: self.sent,
            execute_again: self.execute_again,
        }
    }
}

fn downcast_input<T: Any + Send + Sync>(
    port: usize,
    handle: &DatatypeHandle,
) -> Result<Arc<T>, ModuleError> {
    handle
        .downcast::<T>()
        .ok_or_else(|| ModuleError::WrongDatatypeOnPort {
            port,
            expected: type_name::<T>().to_string(),
            actual: handle.type_name().to_string(),
        })
}
