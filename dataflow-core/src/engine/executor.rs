//! Executor
//!
//! Walks an execution order and invokes each module on the calling thread.
//!
//! # Pass semantics
//!
//! 1. Every module in the order is marked `Waiting` and its outputs are
//!    dropped, so a consumer can only see data sent during this pass.
//! 2. Modules run one at a time in order. Data sent by a module is visible
//!    to its consumers as soon as it returns.
//! 3. Whenever a module produces new output, its downstream modules in the
//!    pass are appended (in order) unless they are already pending. A
//!    pending module downstream of one that was just appended moves behind
//!    it, so no consumer runs ahead of a refreshed producer. A module that
//!    asks to run again is appended after its dependents.
//! 4. The first module error stops the pass. Outputs of modules that already
//!    ran are kept.
//!
//! The executor never caps re-execution; modules bound their own loops.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{ExecutionError, ModuleError};
use crate::events::{EventBus, NetworkEvent};
use crate::logging::{LogLevel, ModuleLoggerHandle};
use crate::network::{ExecutionState, ModuleId, Network};

use super::context::{ExecutionContext, OutputSlot};
use super::scheduler::ModuleExecutionOrder;

/// Record of a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    invocations: Vec<ModuleId>,
}

impl ExecutionReport {
    /// Every module invocation in the order it happened.
    pub fn invocations(&self) -> &[ModuleId] {
        &self.invocations
    }

    /// How many times `id` ran in the pass.
    pub fn count(&self, id: &ModuleId) -> usize {
        self.invocations.iter().filter(|m| *m == id).count()
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }
}

/// Runs modules serially on the calling thread.
pub struct SerialExecutor {
    logger: ModuleLoggerHandle,
    events: Option<std::sync::Arc<EventBus>>,
    config: EngineConfig,
}

impl SerialExecutor {
    pub fn new(logger: ModuleLoggerHandle, config: EngineConfig) -> Self {
        Self {
            logger,
            events: None,
            config,
        }
    }

    /// Emit execution events on `events`.
    pub fn with_events(mut self, events: std::sync::Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: NetworkEvent) {
        if let Some(events) = &self.events {
            events.emit(&event);
        }
    }

    /// Execute the modules of `order` against `network`.
    pub fn execute_all(
        &self,
        network: &mut Network,
        order: &ModuleExecutionOrder,
    ) -> Result<ExecutionReport, ExecutionError> {
        info!(modules = order.len(), "network execution started");
        self.emit(NetworkEvent::NetworkExecutionStarted {
            modules: order.len(),
        });

        for id in order {
            if let Some(node) = network.lookup_module_mut(id) {
                node.set_execution_state(ExecutionState::Waiting);
                node.clear_outputs();
            }
        }

        let mut pending: VecDeque<ModuleId> = order.iter().cloned().collect();
        let mut queued: HashSet<ModuleId> = pending.iter().cloned().collect();
        let mut report = ExecutionReport::default();

        while let Some(id) = pending.pop_front() {
            queued.remove(&id);
            report.invocations.push(id.clone());

            let (new_output, again) = match self.execute_module(network, &id) {
                Ok(result) => result,
                Err(source) => {
                    self.fail(network, &id, &source, &report);
                    return Err(ExecutionError::Module { module: id, source });
                }
            };

            if new_output {
                requeue_downstream(network, order, &id, &mut pending, &mut queued);
            }
            if again && queued.insert(id.clone()) {
                debug!(module = %id, "module requested re-execution");
                pending.push_back(id);
            }
        }

        info!(invocations = report.len(), "network execution finished");
        self.emit(NetworkEvent::NetworkExecutionFinished {
            invocations: report.len(),
            failed: None,
        });
        Ok(report)
    }

    /// Run one module. Returns whether it sent data with a new generation
    /// and whether it asked to run again.
    fn execute_module(
        &self,
        network: &mut Network,
        id: &ModuleId,
    ) -> Result<(bool, bool), ModuleError> {
        // Removed since scheduling; nothing to run
        let Some(node) = network.lookup_module(id) else {
            return Ok((false, false));
        };

        // State writes after this snapshot stay marked for the next pass
        let observed = node.state().change_revision();
        let signature = network.input_signature(node);
        let inputs = network.gather_inputs(node);
        let need_to_execute = node.need_to_execute_with(&signature);
        let outputs: Vec<OutputSlot> = node
            .output_ports()
            .iter()
            .map(|port| OutputSlot {
                datatype: port.datatype().to_string(),
                connected: port.nconnections() > 0,
            })
            .collect();
        let state = node.state();

        let mut ctx = ExecutionContext::new(
            id.clone(),
            state,
            inputs,
            outputs,
            need_to_execute,
            self.logger.as_ref(),
            self.events.as_deref(),
            &self.config,
        );

        let Some(node) = network.lookup_module_mut(id) else {
            return Ok((false, false));
        };
        node.set_execution_state(ExecutionState::Executing);
        self.emit(NetworkEvent::ExecuteBegins { id: id.clone() });
        debug!(module = %id, need_to_execute, "executing module");

        let started = Instant::now();
        let result = node.module_mut().execute(&mut ctx);
        if self.config.log_module_timings {
            debug!(module = %id, elapsed_us = started.elapsed().as_micros() as u64, "module finished");
        }
        result?;

        let outcome = ctx.into_outcome();
        let mut new_output = false;
        for (index, data) in outcome.sent.into_iter().enumerate() {
            if let (Some(data), Some(port)) = (data, node.output_port_mut(index)) {
                new_output |= port.set_data(Some(data));
            }
        }
        node.record_success(signature, observed);
        self.emit(NetworkEvent::ExecuteEnds { id: id.clone() });

        Ok((new_output, outcome.execute_again))
    }

    fn fail(
        &self,
        network: &mut Network,
        id: &ModuleId,
        error: &ModuleError,
        report: &ExecutionReport,
    ) {
        if let Some(node) = network.lookup_module_mut(id) {
            node.set_execution_state(ExecutionState::Errored);
        }
        let message = error.to_string();
        self.logger.log(id, LogLevel::Error, &message);
        self.emit(NetworkEvent::ModuleErrored {
            id: id.clone(),
            message,
        });
        self.emit(NetworkEvent::ExecuteEnds { id: id.clone() });
        self.emit(NetworkEvent::NetworkExecutionFinished {
            invocations: report.len(),
            failed: Some(id.clone()),
        });
    }
}

/// Queue the in-pass dependents of `upstream` after it produced new output.
///
/// Dependents that are not pending are appended. Pending modules downstream
/// of an appended one are pulled out and appended too, keeping the refreshed
/// tail in schedule order.
fn requeue_downstream(
    network: &Network,
    order: &ModuleExecutionOrder,
    upstream: &ModuleId,
    pending: &mut VecDeque<ModuleId>,
    queued: &mut HashSet<ModuleId>,
) {
    let downstream = network.downstream_closure(upstream);
    let appended: HashSet<ModuleId> = order
        .iter()
        .filter(|m| *m != upstream && downstream.contains(*m) && !queued.contains(*m))
        .cloned()
        .collect();
    if appended.is_empty() {
        return;
    }

    let moved: HashSet<ModuleId> = appended
        .iter()
        .flat_map(|m| network.downstream_closure(m))
        .filter(|m| queued.contains(m))
        .collect();
    if !moved.is_empty() {
        pending.retain(|m| !moved.contains(m));
    }

    for module in order
        .iter()
        .filter(|m| appended.contains(*m) || moved.contains(*m))
    {
        debug!(module = %module, upstream = %upstream, "re-queued downstream module");
        queued.insert(module.clone());
        pending.push_back(module.clone());
    }
}

impl std::fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialExecutor")
            .field("config", &self.config)
            .field("events", &self.events.is_some())
            .finish()
    }
}
