//! Dataflow Core
//!
//! This crate provides the execution engine for dataflow networks: graphs of
//! modules with typed ports, connected output-to-input, scheduled in
//! dependency order and executed with per-module caching.
//! It implements:
//!
//! - The network model (modules, ports, connections, port data)
//! - Topological scheduling with deterministic tie-breaking and cycle
//!   detection
//! - A serial executor with re-execution requests for streaming and loop
//!   modules
//! - Per-module persisted and transient state with change tracking
//! - A controller that turns edits into events and persists networks
//!
//! The crate is designed to be used both as a native Rust library and, with
//! the `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! - `network`: data model and structural edits
//! - `engine`: schedulers, executor, execution context, controller
//! - `state`: module state and its factory
//! - `events`: listener registration for edit and execution events
//! - `serialization`: saved network files (JSON and MessagePack)
//! - `python`: interpreter-facing API
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dataflow_core::engine::NetworkEditorController;
//! use dataflow_core::network::ModuleLookupInfo;
//! use dataflow_core::state::SimpleMapModuleStateFactory;
//!
//! let controller = NetworkEditorController::new(
//!     Arc::new(registry),
//!     Arc::new(SimpleMapModuleStateFactory),
//! );
//!
//! let reader = controller.add_module(&ModuleLookupInfo::named("ReadField"))?;
//! let viewer = controller.add_module(&ModuleLookupInfo::named("ShowField"))?;
//! controller.connect(&reader, 0, &viewer, 0)?;
//!
//! let report = controller.execute_all()?;
//! assert_eq!(report.invocations(), &[reader, viewer]);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod network;
pub mod python;
pub mod serialization;
pub mod state;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyNetworkEditor>()?;

    // Add version info
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
