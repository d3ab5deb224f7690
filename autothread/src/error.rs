use thiserror::Error;

use autothread_api::{ProtocolError, TaskRejection, WorkerId};

/// Fatal pool errors. These indicate misuse of the pool or a broken
/// coordinator/worker contract and are never returned as outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Unregistered worker: id = '{0}'")]
    UnregisteredWorker(WorkerId),

    #[error("Worker {0} has not finished spawning")]
    WorkerNotReady(WorkerId),

    #[error("Maximum pool size reached: '{max}'")]
    MaxPoolSizeExceeded { max: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Why a worker could not be brought up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Worker {worker} failed to spawn: {reason}")]
    Spawn { worker: WorkerId, reason: String },

    #[error("Worker {worker} failed initialization: {reason}")]
    Initialization { worker: WorkerId, reason: String },

    #[error("Worker {0} was removed before it became ready")]
    Removed(WorkerId),

    #[error("Registration task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Failure of a task dispatched through the pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Expected failure: the routine failed, admission was refused or the
    /// unit could not be posted to.
    #[error("Task rejected: {0}")]
    Rejected(#[from] TaskRejection),

    /// The worker the task was routed to never became ready.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Fatal pool error raised while dispatching.
    #[error(transparent)]
    Fatal(#[from] PoolError),
}

impl TaskError {
    /// Rejection message, when this is an expected failure.
    pub fn rejection(&self) -> Option<&str> {
        match self {
            TaskError::Rejected(rejection) => Some(rejection.message()),
            _ => None,
        }
    }
}

/// A worker whose teardown could not be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortFailure {
    pub worker_id: WorkerId,
    pub error: String,
}
