//! # Task Worker
//!
//! A [`TaskWorker`] owns one executable unit and shares a
//! [`TaskRegistry`] with its siblings. Dispatching a command registers a
//! task and posts it to the unit; the unit's reply is correlated back to
//! the registry entry by task id.
//!
//! A reply that breaks the protocol is never swallowed: the offending unit
//! is terminated and the worker's `on_protocol_error` hook is told why.

use std::fmt;
use std::sync::{Arc, Weak};

use autothread_api::{
    Command, EventKind, ExecutableUnit, Outcome, ProtocolError, Task, UnitError, UnitEvent, Value, WorkerId,
    WorkerMessage, ABORT_SENTINEL,
};
use tracing::warn;

use crate::hooks::{run_hook, TaskWorkerHooks};
use crate::registry::{PendingTask, Registration, TaskRegistry};
use crate::{log_error, log_task};

#[derive(Clone)]
pub struct TaskWorker {
    core: Arc<WorkerCore>,
}

struct WorkerCore {
    id: WorkerId,
    unit: Arc<dyn ExecutableUnit>,
    registry: Arc<TaskRegistry>,
    hooks: Option<Arc<dyn TaskWorkerHooks>>,
}

impl TaskWorker {
    /// Wrap `unit` and start listening to its events.
    pub fn new(
        id: WorkerId,
        unit: Arc<dyn ExecutableUnit>,
        registry: Arc<TaskRegistry>,
        hooks: Option<Arc<dyn TaskWorkerHooks>>,
    ) -> Self {
        let core = Arc::new(WorkerCore { id, unit, registry, hooks });

        let weak: Weak<WorkerCore> = Arc::downgrade(&core);
        core.unit.listen(
            EventKind::Message,
            Arc::new(move |event: UnitEvent| {
                if let (Some(core), UnitEvent::Message(message)) = (weak.upgrade(), event) {
                    core.on_message(&message);
                }
            }),
        );

        let weak: Weak<WorkerCore> = Arc::downgrade(&core);
        core.unit.listen(
            EventKind::Error,
            Arc::new(move |event: UnitEvent| {
                if let (Some(core), UnitEvent::Error(error)) = (weak.upgrade(), event) {
                    core.isolate(ProtocolError::WorkerError(error));
                }
            }),
        );

        Self { core }
    }

    pub fn id(&self) -> WorkerId {
        self.core.id
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.core.registry
    }

    /// Register `command` and post it to the unit.
    ///
    /// Expected failures (registry full, unit not accepting messages) come
    /// back as `Outcome::Fail`; a task that could not be posted is finalized
    /// as failed so it does not linger in the registry. The teardown command
    /// terminates the unit instead of being posted.
    pub fn dispatch(&self, command: Command) -> Result<Outcome<PendingTask>, ProtocolError> {
        let Registration { task, pending } = match self.core.registry.register(command) {
            Outcome::Ok(registration) => registration,
            Outcome::Fail(error) => return Ok(Outcome::Fail(error)),
        };

        if task.command.is_abort() {
            return self.core.teardown(task, pending);
        }

        if let Err(error) = self.core.unit.post(Value::from(task.clone())) {
            let message = format!("DispatchError: {error}");
            self.core.settle(&task, Outcome::fail(message.clone()))?;
            return Ok(Outcome::Fail(message));
        }
        log_task!(task.id, "dispatched", worker = self.core.id, kind = %task.command.kind);

        if let Some(hooks) = &self.core.hooks {
            // The task is already on its way; a failing hook cannot recall it.
            if let Err(error) = run_hook("on_task_dispatched", || hooks.on_task_dispatched(&task)) {
                warn!(worker = self.core.id, task = task.id, %error, "dispatch hook failed");
            }
        }
        Ok(Outcome::Ok(pending))
    }

    /// Handle a raw reply from the unit.
    ///
    /// `Err` means the reply broke the protocol. `Outcome::Fail` reports
    /// hook failures; the task result has been delivered either way.
    pub fn receive(&self, message: &Value) -> Result<Outcome<()>, ProtocolError> {
        self.core.receive(message)
    }

    pub fn terminate(&self) -> Result<(), UnitError> {
        self.core.unit.terminate()
    }
}

impl WorkerCore {
    fn receive(&self, message: &Value) -> Result<Outcome<()>, ProtocolError> {
        let message = WorkerMessage::try_from(message)?;
        let mut failures = Vec::new();

        if let Outcome::Fail(error) = self.registry.finalize(&message.task, message.result.clone())? {
            failures.push(error);
        }
        if let Some(hooks) = &self.hooks {
            if let Err(error) = run_hook("on_task_done", || hooks.on_task_done(&message)) {
                failures.push(error);
            }
        }

        if failures.is_empty() {
            Ok(Outcome::ok(()))
        } else {
            Ok(Outcome::fail(format!("Task result reception error: {}", failures.join("; "))))
        }
    }

    fn on_message(&self, message: &Value) {
        match self.receive(message) {
            Ok(Outcome::Ok(())) => {}
            Ok(Outcome::Fail(error)) => warn!(worker = self.id, %error, "task reply handled with errors"),
            Err(error) => self.isolate(error),
        }
    }

    fn teardown(&self, task: Task, pending: PendingTask) -> Result<Outcome<PendingTask>, ProtocolError> {
        match self.unit.terminate() {
            Ok(()) => {
                self.settle(&task, Outcome::ok(Value::from(ABORT_SENTINEL)))?;
                Ok(Outcome::Ok(pending))
            }
            Err(error) => {
                let message = format!("DispatchError: {error}");
                self.settle(&task, Outcome::fail(message.clone()))?;
                Ok(Outcome::Fail(message))
            }
        }
    }

    /// Finalize a task on the coordinator side, without a worker reply.
    fn settle(&self, task: &Task, result: Outcome<Value>) -> Result<(), ProtocolError> {
        if let Outcome::Fail(error) = self.registry.finalize(task, result)? {
            warn!(worker = self.id, task = task.id, %error, "finalize hook failed");
        }
        Ok(())
    }

    /// Terminate the unit after a protocol violation.
    fn isolate(&self, error: ProtocolError) {
        log_error!(error, worker = self.id, "protocol violation, terminating worker");
        if let Err(terminate) = self.unit.terminate() {
            log_error!(terminate, worker = self.id, "failed to terminate worker");
        }
        if let Some(hooks) = &self.hooks {
            if let Err(hook) = run_hook("on_protocol_error", || hooks.on_protocol_error(&error)) {
                warn!(worker = self.id, error = %hook, "protocol error hook failed");
            }
        }
    }
}

impl fmt::Debug for TaskWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWorker")
            .field("id", &self.core.id)
            .field("unit", &self.core.unit)
            .field("hooks", &self.core.hooks.is_some())
            .finish()
    }
}
