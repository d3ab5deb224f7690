use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use autothread_api::{FinalizedTask, Outcome, TaskRejection, Value};

#[derive(Debug)]
struct Resolution {
    outcome: Outcome<Value>,
    resolved_at: Instant,
}

/// Resolving half of a task's result. Only the first call to
/// [`PendingResult::done`] takes effect.
#[derive(Debug)]
pub struct PendingResult {
    created_at: Instant,
    sender: Mutex<Option<oneshot::Sender<Resolution>>>,
}

/// Awaiting half of a task's result.
///
/// Resolves to the task's value and its overhead (time between registration
/// and resolution), or rejects with the failure message.
#[derive(Debug)]
#[must_use = "a pending task does nothing unless awaited"]
pub struct PendingTask {
    created_at: Instant,
    receiver: oneshot::Receiver<Resolution>,
}

impl PendingResult {
    pub fn new() -> (Self, PendingTask) {
        let created_at = Instant::now();
        let (sender, receiver) = oneshot::channel();
        (
            Self { created_at, sender: Mutex::new(Some(sender)) },
            PendingTask { created_at, receiver },
        )
    }

    /// Resolve on `Outcome::Ok`, reject on `Outcome::Fail`.
    ///
    /// Returns `false` when the result was already settled.
    pub fn done(&self, result: Outcome<Value>) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(sender) => {
                // The awaiting side may already be gone; settling still counts.
                let _ = sender.send(Resolution { outcome: result, resolved_at: Instant::now() });
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since the pending result was created.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl PendingTask {
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl Future for PendingTask {
    type Output = Result<FinalizedTask, TaskRejection>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let created_at = self.created_at;
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(Resolution { outcome, resolved_at })) => Poll::Ready(match outcome {
                Outcome::Ok(value) => Ok(FinalizedTask {
                    value,
                    overhead: resolved_at.saturating_duration_since(created_at),
                }),
                Outcome::Fail(error) => Err(TaskRejection(error)),
            }),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskRejection(
                "Task abandoned: its pending result was dropped unresolved".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
