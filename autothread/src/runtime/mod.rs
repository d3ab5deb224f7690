//! # Runtime Adapters
//!
//! Concrete executable units. [`ThreadUnit`] runs every worker on a
//! dedicated OS thread; [`ThreadUnitFactory`] spawns them from a shared
//! [`RoutineTable`](autothread_api::RoutineTable), which is what a worker's
//! entry amounts to in-process.

mod entry;
mod thread_unit;

pub use thread_unit::{ThreadUnit, ThreadUnitFactory};
