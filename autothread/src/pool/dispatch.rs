use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, Shared};
use tokio::task::JoinHandle;

use autothread_api::{FinalizedTask, TaskRejection, WorkerId};

use crate::error::{RegistrationError, TaskError};

/// Resolves with the id of the worker a task was admitted to, once that
/// worker is ready. Cloneable; every clone observes the same result.
pub type RegistrationSignal = Shared<BoxFuture<'static, Result<WorkerId, RegistrationError>>>;

/// The two signals of a greedy dispatch.
pub struct DispatchRegistration {
    /// Admission: the worker the task was routed to is ready.
    pub registration: RegistrationSignal,
    /// Completion: the task's value and overhead.
    pub pending_task: PoolTask,
}

impl fmt::Debug for DispatchRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRegistration")
            .field("registration", &self.registration.peek())
            .field("pending_task", &self.pending_task)
            .finish()
    }
}

/// Completion of a task dispatched through the pool.
///
/// The task runs whether or not this handle is awaited.
#[derive(Debug)]
#[must_use = "a pool task reports its result only when awaited"]
pub struct PoolTask {
    handle: JoinHandle<Result<FinalizedTask, TaskError>>,
}

impl PoolTask {
    pub(crate) fn new(handle: JoinHandle<Result<FinalizedTask, TaskError>>) -> Self {
        Self { handle }
    }
}

impl Future for PoolTask {
    type Output = Result<FinalizedTask, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => {
                Poll::Ready(Err(TaskError::Rejected(TaskRejection(format!("Task aborted: {e}")))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
