//! # Error Types
//!
//! Two families of errors live here and they are deliberately kept apart:
//!
//! - `ProtocolError`: a violation of the coordinator/worker contract
//!   (unknown task id, malformed reply, unknown routine, an error event
//!   raised by the worker). These are fatal:
//!   they are returned on the `Err` side and must not be folded into an
//!   [`Outcome`](crate::outcome::Outcome).
//! - `UnitError` and `TaskRejection`: expected failures of the executable
//!   unit collaborator and of a single task. Callers see them as outcome
//!   failures or as rejected task futures.

use thiserror::Error;

use crate::task::TaskId;

/// Fatal violations of the coordinator/worker protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Finalization of a task that is not in flight (duplicate or stale reply).
    #[error("Unregistered task: id = '{id}'")]
    UnregisteredTask { id: TaskId },

    /// A message whose shape does not match the protocol.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A task naming a routine the worker does not know.
    #[error("Unknown routine name: '{0}'")]
    UnknownRoutine(String),

    /// An error event raised by the unit itself.
    #[error("Worker error: {0}")]
    WorkerError(String),
}

/// Failures reported by an executable unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("Failed to spawn unit: {0}")]
    Spawn(String),

    #[error("Failed to post message: {0}")]
    Post(String),

    #[error("Failed to terminate unit: {0}")]
    Terminate(String),

    #[error("Unit has been terminated")]
    Terminated,
}

/// Rejection reason delivered to a caller awaiting a task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TaskRejection(pub String);

impl TaskRejection {
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskRejection {
    fn from(message: String) -> Self {
        TaskRejection(message)
    }
}

impl From<&str> for TaskRejection {
    fn from(message: &str) -> Self {
        TaskRejection(message.to_string())
    }
}
