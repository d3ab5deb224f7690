//! # Task Registry
//!
//! Correlates in-flight tasks with the futures their callers hold. The
//! registry issues task ids, bounds the number of outstanding tasks and
//! runs the registry hooks around registration and finalization.
//!
//! An entry exists exactly while its task is in flight: it is inserted by
//! [`TaskRegistry::register`] and removed by [`TaskRegistry::finalize`].

mod pending;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use autothread_api::{Command, Outcome, ProtocolError, Task, TaskId, Value};

pub use pending::{PendingResult, PendingTask};

use crate::config::RegistryConfig;
use crate::hooks::{run_hook, TaskRegistryHooks};
use crate::log_task;

/// A task in flight together with the resolving half of its result.
#[derive(Debug)]
pub struct RegistryEntry {
    pub payload: Task,
    pub pending: PendingResult,
}

/// A successful registration: the stored task and the future to await.
#[derive(Debug)]
pub struct Registration {
    pub task: Task,
    pub pending: PendingTask,
}

pub struct TaskRegistry {
    entries: Mutex<HashMap<TaskId, RegistryEntry>>,
    next_id: AtomicU64,
    hooks: Option<Arc<dyn TaskRegistryHooks>>,
    config: RegistryConfig,
}

impl TaskRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            hooks: None,
            config,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn TaskRegistryHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Store a new task for `command`.
    ///
    /// Fails when the registry is full or when the `on_registered` hook
    /// fails; in the latter case the entry is removed again.
    pub fn register(&self, command: Command) -> Outcome<Registration> {
        let (task, pending) = {
            let mut entries = self.lock();
            if entries.len() >= self.config.max_outstanding {
                return Outcome::fail(format!(
                    "CapacityExceeded: maximum of {} outstanding tasks reached",
                    self.config.max_outstanding
                ));
            }

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let task = Task { id, command };
            let (result, pending) = PendingResult::new();
            entries.insert(id, RegistryEntry { payload: task.clone(), pending: result });
            (task, pending)
        };

        if let Some(hooks) = &self.hooks {
            if let Err(error) = run_hook("on_registered", || hooks.on_registered(&task)) {
                self.lock().remove(&task.id);
                return Outcome::fail(error);
            }
        }

        log_task!(task.id, "registered", kind = %task.command.kind);
        Outcome::ok(Registration { task, pending })
    }

    /// Deliver `result` to the task's pending result and drop its entry.
    ///
    /// A hook failure is reported as `Outcome::Fail` but the result has
    /// already been delivered by then.
    pub fn finalize(&self, task: &Task, result: Outcome<Value>) -> Result<Outcome<()>, ProtocolError> {
        let entry = self
            .lock()
            .remove(&task.id)
            .ok_or(ProtocolError::UnregisteredTask { id: task.id })?;

        entry.pending.done(result.clone());
        log_task!(task.id, "finalized", ok = result.is_ok());

        if let Some(hooks) = &self.hooks {
            if let Err(error) = run_hook("on_finalized", || hooks.on_finalized(&entry, &result)) {
                return Ok(Outcome::fail(error));
            }
        }
        Ok(Outcome::ok(()))
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of outstanding tasks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.max_outstanding
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, RegistryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("outstanding", &self.len())
            .field("capacity", &self.config.max_outstanding)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn registry(max: usize) -> TaskRegistry {
        TaskRegistry::new(RegistryConfig::with_max_outstanding(max))
    }

    fn register(registry: &TaskRegistry) -> Registration {
        match registry.register(Command::new("noop", Value::Null)) {
            Outcome::Ok(registration) => registration,
            Outcome::Fail(error) => panic!("registration failed: {error}"),
        }
    }

    struct FailingRegistration;

    impl TaskRegistryHooks for FailingRegistration {
        fn on_registered(&self, _task: &Task) -> anyhow::Result<()> {
            anyhow::bail!("refused")
        }
    }

    #[derive(Default)]
    struct PanickingFinalize {
        calls: AtomicUsize,
    }

    impl TaskRegistryHooks for PanickingFinalize {
        fn on_finalized(&self, _entry: &RegistryEntry, _result: &Outcome<Value>) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("finalize hook exploded")
        }
    }

    #[test]
    fn test_ids_strictly_increase() {
        let registry = registry(16);
        let ids: Vec<TaskId> = (0..10).map(|_| register(&registry).task.id).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn test_capacity_exceeded_leaves_registry_unchanged() {
        let registry = registry(3);
        let held: Vec<Registration> = (0..3).map(|_| register(&registry)).collect();

        let refused = registry.register(Command::new("noop", Value::Null));
        assert!(refused.failure().unwrap().starts_with("CapacityExceeded"));
        assert_eq!(registry.len(), 3);
        drop(held);
    }

    #[tokio::test]
    async fn test_finalize_resolves_and_removes() {
        let registry = registry(4);
        let Registration { task, pending } = register(&registry);

        let finalized = registry.finalize(&task, Outcome::ok(Value::from(42))).unwrap();
        assert!(finalized.is_ok());
        assert!(!registry.contains(task.id));
        assert_eq!(pending.await.unwrap().value, Value::from(42));
    }

    #[test]
    fn test_second_finalize_is_unregistered() {
        let registry = registry(4);
        let Registration { task, .. } = register(&registry);

        registry.finalize(&task, Outcome::ok(Value::Null)).unwrap();
        let err = registry.finalize(&task, Outcome::ok(Value::Null)).unwrap_err();
        assert_eq!(err, ProtocolError::UnregisteredTask { id: task.id });
    }

    #[test]
    fn test_registration_hook_failure_rolls_back() {
        let registry = registry(4).with_hooks(Arc::new(FailingRegistration));

        let outcome = registry.register(Command::new("noop", Value::Null));
        assert_eq!(outcome.failure().map(String::as_str), Some("Hook error 'on_registered': refused"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_finalize_hook_failure_still_delivers() {
        let hooks = Arc::new(PanickingFinalize::default());
        let registry = registry(4).with_hooks(hooks.clone());
        let Registration { task, pending } = register(&registry);

        let outcome = registry.finalize(&task, Outcome::fail("boom")).unwrap();
        assert!(outcome.failure().unwrap().contains("finalize hook exploded"));
        assert_eq!(hooks.calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert_eq!(pending.await.unwrap_err().message(), "boom");
    }
}
