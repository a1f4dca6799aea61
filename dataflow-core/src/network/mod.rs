//! Network Model
//!
//! This module holds the data model of a dataflow network: modules with
//! typed input and output ports, and connections from an output port of one
//! module to an input port of another.
//!
//! # Overview
//!
//! - [`Network`] owns all [`ModuleNode`]s and [`Connection`]s.
//! - A [`ModuleFactory`] turns a [`ModuleLookupInfo`] into a [`Module`]
//!   instance plus its [`ModuleDescription`].
//! - Data moves between modules as [`DatatypeHandle`]s, each stamped with a
//!   [`Generation`] so consumers can tell fresh data from a repeat.
//!
//! # Design Decisions
//!
//! 1. Modules and connections are stored in insertion-ordered maps keyed by
//!    id. Every cross reference is an id, never a pointer, so cyclic module
//!    graphs need no special ownership handling.
//!
//! 2. Connection ids are derived from their endpoints. Re-connecting the same
//!    two ports is therefore detectable and idempotent.
//!
//! 3. Structural edits report failure through `Result`, `Option` or `bool`
//!    and leave the network unchanged when they fail.

mod connection;
mod datatype;
mod factory;
mod graph;
mod ids;
mod module;
mod port;

pub use connection::{Connection, ConnectionDescription, ConnectionId, PortAddress};
pub use datatype::{DatatypeHandle, Generation};
pub use factory::{ModuleFactory, ModuleRegistry};
pub use graph::Network;
pub use ids::{ModuleId, ModuleLookupInfo, PortId};
pub use module::{
    ExecutionState, Legacy, LegacyModule, Module, ModuleDescription, ModuleNode,
};
pub use port::{InputPort, OutputPort, PortDescription, PortDirection, PortRef};

pub(crate) use graph::InputSlot;
pub(crate) use module::InputSignature;
