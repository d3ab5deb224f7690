//! # Lifecycle Hooks
//!
//! Hooks let callers observe the registry and the workers without being able
//! to corrupt them. Every method has a no-op default, so an implementation
//! only overrides what it cares about.
//!
//! A hook "throws" by returning `Err` or by panicking. Both are captured by
//! [`run_hook`] and reported as an outcome failure of whichever operation
//! invoked the hook; neither unwinds into registry or pool state.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use autothread_api::{Outcome, ProtocolError, Task, Value, WorkerMessage};

use crate::registry::RegistryEntry;

/// Hooks invoked by a [`TaskRegistry`](crate::registry::TaskRegistry).
pub trait TaskRegistryHooks: Send + Sync {
    /// Called after a task has been stored. Failing rolls the registration back.
    fn on_registered(&self, _task: &Task) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the entry was resolved and removed.
    fn on_finalized(&self, _entry: &RegistryEntry, _result: &Outcome<Value>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hooks invoked by a [`TaskWorker`](crate::worker::TaskWorker).
pub trait TaskWorkerHooks: Send + Sync {
    /// Called after a task was posted to the unit.
    fn on_task_dispatched(&self, _task: &Task) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after a worker reply finalized its task.
    fn on_task_done(&self, _message: &WorkerMessage) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the worker's unit was terminated for breaking the protocol.
    fn on_protocol_error(&self, _error: &ProtocolError) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Run a hook, capturing both errors and panics.
pub fn run_hook<F>(name: &str, hook: F) -> Result<(), String>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("Hook error '{name}': {err:#}")),
        Err(payload) => Err(format!("Hook error '{name}': panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}

/// Registry hooks that log every registration and finalization.
#[derive(Debug, Default, Clone, Copy)]
pub struct InspectHooks;

impl TaskRegistryHooks for InspectHooks {
    fn on_registered(&self, task: &Task) -> anyhow::Result<()> {
        tracing::info!(task = task.id, kind = %task.command.kind, "task registered");
        Ok(())
    }

    fn on_finalized(&self, entry: &RegistryEntry, result: &Outcome<Value>) -> anyhow::Result<()> {
        let task = &entry.payload;
        let overhead_ms = entry.pending.elapsed().as_secs_f64() * 1000.0;
        match result {
            Outcome::Ok(value) => {
                tracing::info!(task = task.id, kind = %task.command.kind, overhead_ms, value = %value, "task finalized")
            }
            Outcome::Fail(error) => {
                tracing::warn!(task = task.id, kind = %task.command.kind, overhead_ms, error = %error, "task failed")
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_hook_captures_error() {
        let err = run_hook("on_registered", || anyhow::bail!("nope")).unwrap_err();
        assert_eq!(err, "Hook error 'on_registered': nope");
    }

    #[test]
    fn test_run_hook_captures_panic() {
        let err = run_hook("on_task_done", || panic!("exploded")).unwrap_err();
        assert!(err.contains("panicked: exploded"));
    }

    #[test]
    fn test_run_hook_ok() {
        assert!(run_hook("noop", || Ok(())).is_ok());
    }
}
