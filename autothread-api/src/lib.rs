//! # Autothread API
//!
//! Contracts shared by the autothread worker pool and the workers it drives.
//!
//! ## Core Components
//!
//! - **Values**: the serializable payload type crossing the worker boundary
//! - **Commands and tasks**: what gets dispatched, and how it is identified
//! - **Outcomes**: expected success/failure, kept apart from protocol errors
//! - **Executable units**: the isolated execution contexts workers run in
//! - **Routines**: user functions a worker entry dispatches commands to
//!
//! ## Module Organization
//!
//! - [`value`]: serializable values and serde bridging
//! - [`task`]: commands, tasks, worker replies and their wire codec
//! - [`outcome`]: the `Outcome` type
//! - [`errors`]: protocol, unit and rejection errors
//! - [`unit`]: executable unit and unit factory traits
//! - [`routine`]: routine trait and routine tables

pub mod errors;
pub mod outcome;
pub mod routine;
pub mod task;
pub mod unit;
pub mod value;

pub use errors::{ProtocolError, TaskRejection, UnitError};
pub use outcome::Outcome;
pub use routine::{Routine, RoutineTable};
pub use task::{Command, FinalizedTask, Task, TaskId, WorkerMessage, ABORT_KIND, ABORT_SENTINEL, RESERVED_KINDS};
pub use unit::{EventHandler, EventKind, ExecutableUnit, UnitEvent, UnitFactory, WorkerId};
pub use value::Value;
