//! Error Types
//!
//! Errors are split by the layer that produces them:
//!
//! - `NetworkError`: structural edits (add/remove/connect). These are the
//!   expected outcomes of trial edits made from a GUI or script, so callers
//!   get a `Result` back and decide what to do.
//! - `SchedulingError`: the module graph cannot be ordered.
//! - `ModuleError`: raised from inside a module's `execute()`.
//! - `ExecutionError`: what a whole pass reports to its caller.
//! - `SerializationError` / `ConfigError`: persistence and configuration.

use thiserror::Error;

use crate::network::{ModuleId, PortDirection};

/// Failure of a structural edit on a [`Network`](crate::network::Network).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The factory has no module registered under this name.
    #[error("no module named '{0}' is registered")]
    UnknownModule(String),

    /// No module with this id lives in the network.
    #[error("module {0} not found")]
    ModuleNotFound(ModuleId),

    /// A string could not be parsed as a `Name:N` module id.
    #[error("invalid module id '{0}'")]
    InvalidModuleId(String),

    /// A module with this id already exists (only possible when ids are
    /// supplied explicitly, e.g. while loading a saved network).
    #[error("module id {0} is already in use")]
    DuplicateModuleId(ModuleId),

    /// A port index past the module's current port count.
    #[error("{direction} port #{port} is out of range on {module} ({count} ports)")]
    PortOutOfRange {
        module: ModuleId,
        direction: PortDirection,
        port: usize,
        count: usize,
    },

    /// The two ports declare different datatypes.
    #[error("cannot connect a {from_type} output to a {to_type} input")]
    IncompatiblePortTypes { from_type: String, to_type: String },

    /// A non-dynamic input port already has its single producer.
    #[error("input port #{port} on {module} already has a connection")]
    InputPortOccupied { module: ModuleId, port: usize },

    /// Both endpoints are on the same module.
    #[error("cannot connect module {0} to itself")]
    SameModuleConnection(ModuleId),
}

/// Failure to compute an execution order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    /// The graph contains at least one cycle. `modules` lists every module
    /// that could not be ordered, in network insertion order.
    #[error("network has cycles ({} module(s) could not be scheduled)", .modules.len())]
    NetworkHasCycles { modules: Vec<ModuleId> },
}

/// Failure raised by a module while it executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// A required input has no data: the port is unconnected or its upstream
    /// module has not sent anything in this pass.
    #[error("input data required on port #{port}")]
    NoHandleOnPort { port: usize },

    /// Data arrived (or was sent) with a different type than expected.
    #[error("wrong datatype on port #{port}; expected {expected} but received {actual}")]
    WrongDatatypeOnPort {
        port: usize,
        expected: String,
        actual: String,
    },

    /// The port index does not exist on this module.
    #[error("{direction} port #{port} not found")]
    PortNotFound { direction: PortDirection, port: usize },

    /// A boolean-returning legacy module reported `false`.
    #[error("module execution failed")]
    LegacyExecuteFailed,

    /// Failure inside the module's algorithm.
    #[error("{0}")]
    Algorithm(String),
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Algorithm`].
    pub fn algorithm(message: impl Into<String>) -> Self {
        Self::Algorithm(message.into())
    }
}

/// Outcome of a failed execution pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The pass was aborted before any module ran.
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    /// A module failed; modules after it in the pass did not run.
    #[error("module {module} failed: {source}")]
    Module {
        module: ModuleId,
        #[source]
        source: ModuleError,
    },
}

impl ExecutionError {
    /// The failing module, if the pass got as far as running modules.
    pub fn module(&self) -> Option<&ModuleId> {
        match self {
            Self::Scheduling(_) => None,
            Self::Module { module, .. } => Some(module),
        }
    }

    /// Whether the pass was refused because of a cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(
            self,
            Self::Scheduling(SchedulingError::NetworkHasCycles { .. })
        )
    }
}

/// Failure while saving or restoring a network.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("cannot rebuild network: {0}")]
    Network(#[from] NetworkError),
}

/// Failure while loading an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
