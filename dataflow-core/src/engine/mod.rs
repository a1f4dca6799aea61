//! Execution Engine
//!
//! Scheduling and execution of a [`Network`](crate::network::Network).
//!
//! # Overview
//!
//! - A [`Scheduler`] computes a [`ModuleExecutionOrder`], or refuses with a
//!   cycle error.
//! - The [`SerialExecutor`] walks that order, hands each module an
//!   [`ExecutionContext`] and propagates the data it sends.
//! - [`NetworkEditorController`] ties the two to a locked network and an
//!   event bus; it is what front ends use.
//! - [`StreamingQueue`] connects a background producer to a progressive
//!   module that re-queues itself until the stream is drained.

mod context;
mod controller;
mod executor;
mod scheduler;
mod streaming;

pub use context::ExecutionContext;
pub use controller::{NetworkEditorController, CYCLE_DIAGNOSTIC};
pub use executor::{ExecutionReport, SerialExecutor};
pub use scheduler::{
    LeveledScheduler, ModuleExecutionOrder, ParallelExecutionOrder, Scheduler, SerialScheduler,
};
pub use streaming::{wait_for, PollOutcome, StreamingQueue};
