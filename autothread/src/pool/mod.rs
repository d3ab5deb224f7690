//! # Worker Pool
//!
//! An elastic set of [`TaskWorker`]s sharing one [`TaskRegistry`].
//!
//! ## Dispatch
//!
//! [`WorkerPool::dispatch_greedy`] routes every command to the least loaded
//! worker (lowest id on ties). The pool grows when that worker already
//! carries its optimal load, up to the maximum pool size. The selected
//! worker's workload is reserved synchronously, so concurrent dispatches
//! see each other before any worker has even finished spawning.
//!
//! ## Worker lifecycle
//!
//! `spawning → ready → (busy)* → idle → terminated`
//!
//! A spawning worker becomes ready once its unit is up and the optional
//! init command has completed. A worker that fails either step is
//! terminated and removed, and the tasks routed to it fail.
//!
//! ## Shrinking
//!
//! After every completed task the worker's workload is released. An idle
//! worker is retired when the pool is above its minimum size and the least
//! loaded of the other workers is below the optimal load; otherwise it is
//! retained, so a burst that just saturated a neighbour does not cause a
//! respawn. Every other idle worker is re-evaluated the same way, and so is
//! a worker whose reserved slot was released without reaching it. The reply
//! to a worker's own init command never triggers shrinking.

mod dispatch;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::FutureExt;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{Instrument, Span};
use uuid::Uuid;

use autothread_api::{Command, FinalizedTask, Outcome, ProtocolError, Task, TaskRejection, WorkerId, WorkerMessage};

pub use dispatch::{DispatchRegistration, PoolTask, RegistrationSignal};

use crate::config::{PoolOptions, PoolPreferences, RegistryConfig};
use crate::error::{AbortFailure, PoolError, RegistrationError, TaskError};
use crate::hooks::TaskWorkerHooks;
use crate::registry::{PendingTask, TaskRegistry};
use crate::worker::TaskWorker;
use crate::{log_error, log_scaling, policy, pool_span};

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolMetrics {
    /// Workers in the pool, spawning ones included.
    pub pool_size: usize,
    /// Sum of all workers' workloads.
    pub total_workload: usize,
    /// Tasks outstanding in the registry, which may be shared.
    pub outstanding_tasks: usize,
    /// Workers that are not ready yet.
    pub spawning: usize,
}

struct WorkerEntry {
    /// `None` while the unit is being spawned.
    worker: Option<TaskWorker>,
    workload: usize,
    ready: RegistrationSignal,
    /// Set until the reply to the init command arrives.
    init_pending: bool,
}

#[derive(Default)]
struct PoolState {
    workers: BTreeMap<WorkerId, WorkerEntry>,
    next_id: WorkerId,
}

struct PoolInner {
    id: Uuid,
    handle: Handle,
    state: Mutex<PoolState>,
    registry: Arc<TaskRegistry>,
    options: PoolOptions,
    prefs: PoolPreferences,
}

/// Elastic, load-balanced pool of task workers.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create an empty pool. Workers are spawned on demand and their
    /// bookkeeping runs on `handle`.
    pub fn new(options: PoolOptions, prefs: PoolPreferences, handle: Handle) -> Self {
        let registry = options.registry.clone().unwrap_or_else(|| {
            let capacity = policy::pool_registry_capacity(prefs.hardware_concurrency).max(1);
            Arc::new(TaskRegistry::new(RegistryConfig::with_max_outstanding(capacity)))
        });

        let id = Uuid::new_v4();
        tracing::debug!(pool = %id, ?prefs, registry = ?registry, "worker pool created");

        Self {
            inner: Arc::new(PoolInner {
                id,
                handle,
                state: Mutex::new(PoolState::default()),
                registry,
                options,
                prefs,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    pub fn preferences(&self) -> &PoolPreferences {
        &self.inner.prefs
    }

    /// Route `command` to the least loaded worker, growing the pool if needed.
    ///
    /// Selection happens synchronously; growing beyond the maximum pool size
    /// is an error. The returned signals resolve once the chosen worker is
    /// ready and once the task has completed.
    pub fn dispatch_greedy(&self, command: Command) -> Result<DispatchRegistration, PoolError> {
        let span = pool_span!(self.inner.id, kind = %command.kind);
        let registration = span.in_scope(|| self.inner.select())?;

        let inner = Arc::clone(&self.inner);
        let handle = self
            .inner
            .handle
            .spawn(PoolInner::run_pending(inner, registration.clone(), command).instrument(span));

        Ok(DispatchRegistration { registration, pending_task: PoolTask::new(handle) })
    }

    /// Dispatch `command` to a specific worker, bypassing selection.
    ///
    /// Unknown or still-spawning workers are errors; expected failures come
    /// back as `Outcome::Fail`.
    pub fn dispatch_by_id(&self, worker_id: WorkerId, command: Command) -> Result<Outcome<PendingTask>, PoolError> {
        self.inner.reserve(worker_id)?;
        self.inner.dispatch_reserved(worker_id, command)
    }

    /// Send the teardown command to every ready worker and drop every
    /// spawning one.
    ///
    /// Failures are collected per worker instead of stopping at the first
    /// one. Tasks in flight on aborted workers are abandoned.
    pub fn abort_all(&self) -> Outcome<usize, Vec<AbortFailure>> {
        let _span = pool_span!(self.inner.id).entered();
        let (ready, spawning): (Vec<(WorkerId, Option<TaskWorker>)>, Vec<_>) = self
            .inner
            .lock()
            .workers
            .iter()
            .map(|(id, entry)| (*id, entry.worker.clone()))
            .partition(|(_, worker)| worker.is_some());

        let mut aborted = 0;
        let mut failures = Vec::new();

        for (worker_id, worker) in ready {
            let Some(worker) = worker else { continue };
            let error = match worker.dispatch(Command::abort()) {
                Ok(Outcome::Ok(_settled)) => None,
                Ok(Outcome::Fail(error)) => Some(error),
                Err(error) => Some(error.to_string()),
            };
            match error {
                None => {
                    self.inner.lock().workers.remove(&worker_id);
                    aborted += 1;
                }
                Some(error) => {
                    log_error!(error, worker = worker_id, "failed to abort worker");
                    failures.push(AbortFailure { worker_id, error });
                }
            }
        }

        // Their registration finds the entry gone and terminates the unit.
        for (worker_id, _) in spawning {
            if self.inner.lock().workers.remove(&worker_id).is_some() {
                aborted += 1;
            }
        }

        log_scaling!(self.inner.prefs.inspect, "abort", aborted, failed = failures.len());
        if failures.is_empty() {
            Outcome::Ok(aborted)
        } else {
            Outcome::Fail(failures)
        }
    }

    /// Number of workers, spawning ones included.
    pub fn size(&self) -> usize {
        self.inner.lock().workers.len()
    }

    /// Number of workers the current load demands.
    pub fn parallelism_demand(&self) -> usize {
        self.size()
    }

    /// Workload of every worker, by id.
    pub fn workloads(&self) -> BTreeMap<WorkerId, usize> {
        self.inner.lock().workers.iter().map(|(id, entry)| (*id, entry.workload)).collect()
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.inner.lock();
        PoolMetrics {
            pool_size: state.workers.len(),
            total_workload: state.workers.values().map(|entry| entry.workload).sum(),
            outstanding_tasks: self.inner.registry.len(),
            spawning: state.workers.values().filter(|entry| entry.worker.is_none()).count(),
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("id", &self.inner.id)
            .field("metrics", &self.metrics())
            .field("options", &self.inner.options)
            .field("prefs", &self.inner.prefs)
            .finish()
    }
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pick a worker for one more task and reserve the slot.
    fn select(self: &Arc<Self>) -> Result<RegistrationSignal, PoolError> {
        let inspect = self.prefs.inspect;
        let mut state = self.lock();
        let pool_size = state.workers.len();
        let optimal = self.prefs.optimal_tasks(pool_size);

        // BTreeMap iterates by id, so ties go to the lowest id.
        if let Some((worker_id, entry)) = state.workers.iter_mut().min_by_key(|(_, entry)| entry.workload) {
            if entry.workload < optimal {
                entry.workload += 1;
                log_scaling!(inspect, "reuse", worker = *worker_id, workload = entry.workload, optimal, pool_size);
                return Ok(entry.ready.clone());
            }
        }

        let max = self.prefs.max_pool_size();
        if pool_size >= max {
            log_scaling!(inspect, "refuse", optimal, pool_size, max);
            return Err(PoolError::MaxPoolSizeExceeded { max });
        }

        let worker_id = state.next_id;
        state.next_id += 1;

        let bring_up = self
            .handle
            .spawn(Self::bring_up(Arc::clone(self), worker_id).instrument(Span::current()));
        let ready: RegistrationSignal = async move {
            bring_up
                .await
                .map_err(|e| RegistrationError::Join(e.to_string()))
                .and_then(|registered| registered)
        }
        .boxed()
        .shared();

        let init_pending = self.options.init_command.is_some();
        state.workers.insert(worker_id, WorkerEntry { worker: None, workload: 1, ready: ready.clone(), init_pending });
        log_scaling!(inspect, "grow", worker = worker_id, workload = 1, optimal, pool_size = pool_size + 1);
        Ok(ready)
    }

    /// Spawn the unit of a reserved worker and run its init command.
    async fn bring_up(pool: Arc<Self>, worker_id: WorkerId) -> Result<WorkerId, RegistrationError> {
        let unit = match pool.options.entry.spawn(worker_id).await {
            Ok(unit) => unit,
            Err(e) => {
                pool.lock().workers.remove(&worker_id);
                log_error!(e, worker = worker_id, "failed to spawn worker");
                return Err(RegistrationError::Spawn { worker: worker_id, reason: e.to_string() });
            }
        };

        let hooks = Arc::new(PoolWorkerHooks { pool: Arc::downgrade(&pool), worker_id });
        let worker = TaskWorker::new(worker_id, unit, Arc::clone(&pool.registry), Some(hooks));

        let attached = match pool.lock().workers.get_mut(&worker_id) {
            Some(entry) => {
                entry.worker = Some(worker.clone());
                true
            }
            None => false,
        };
        if !attached {
            if let Err(e) = worker.terminate() {
                log_error!(e, worker = worker_id, "failed to terminate removed worker");
            }
            return Err(RegistrationError::Removed(worker_id));
        }

        if let Some(init) = pool.options.init_command.clone() {
            if let Err(error) = pool.initialize(worker_id, init).await {
                log_error!(error, worker = worker_id, "worker failed initialization");
                pool.lock().workers.remove(&worker_id);
                if let Err(e) = worker.terminate() {
                    log_error!(e, worker = worker_id, "failed to terminate worker");
                }
                return Err(error);
            }
        }

        tracing::debug!(worker = worker_id, "worker ready");
        Ok(worker_id)
    }

    async fn initialize(&self, worker_id: WorkerId, init: Command) -> Result<(), RegistrationError> {
        self.reserve(worker_id)?;
        let pending = match self.dispatch_reserved(worker_id, init)? {
            Outcome::Ok(pending) => pending,
            Outcome::Fail(reason) => return Err(RegistrationError::Initialization { worker: worker_id, reason }),
        };
        pending
            .await
            .map(|_| ())
            .map_err(|rejection| RegistrationError::Initialization { worker: worker_id, reason: rejection.0 })
    }

    /// Wait for the selected worker, then hand it the task.
    async fn run_pending(
        pool: Arc<Self>,
        registration: RegistrationSignal,
        command: Command,
    ) -> Result<FinalizedTask, TaskError> {
        let worker_id = registration.await?;
        match pool.dispatch_reserved(worker_id, command)? {
            Outcome::Ok(pending) => Ok(pending.await?),
            Outcome::Fail(error) => Err(TaskRejection(error).into()),
        }
    }

    fn reserve(&self, worker_id: WorkerId) -> Result<(), PoolError> {
        let mut state = self.lock();
        let entry = state.workers.get_mut(&worker_id).ok_or(PoolError::UnregisteredWorker(worker_id))?;
        if entry.worker.is_none() {
            return Err(PoolError::WorkerNotReady(worker_id));
        }
        entry.workload += 1;
        Ok(())
    }

    /// Give back a reserved slot that never reached the worker. A worker
    /// left idle by this is evaluated for shrinking like a completed one.
    fn release(&self, worker_id: WorkerId) {
        let retired = {
            let mut state = self.lock();
            let Some(entry) = state.workers.get_mut(&worker_id) else { return };
            entry.workload = entry.workload.saturating_sub(1);
            if entry.init_pending {
                None
            } else {
                self.try_retire(&mut state, worker_id)
            }
        };
        Self::terminate_retired(retired);
    }

    /// Dispatch on a slot reserved by `select` or `reserve`. The slot is
    /// released unless the task reached the worker. A worker that accepted
    /// the teardown command is gone and leaves the pool.
    fn dispatch_reserved(&self, worker_id: WorkerId, command: Command) -> Result<Outcome<PendingTask>, PoolError> {
        let worker = {
            let state = self.lock();
            let entry = state.workers.get(&worker_id).ok_or(PoolError::UnregisteredWorker(worker_id))?;
            entry.worker.clone()
        };
        let Some(worker) = worker else {
            self.release(worker_id);
            return Err(PoolError::WorkerNotReady(worker_id));
        };

        let teardown = command.is_abort();
        match worker.dispatch(command) {
            Ok(Outcome::Ok(pending)) if teardown => {
                if self.lock().workers.remove(&worker_id).is_some() {
                    log_scaling!(self.prefs.inspect, "abort", worker = worker_id);
                }
                Ok(Outcome::Ok(pending))
            }
            Ok(Outcome::Ok(pending)) => Ok(Outcome::Ok(pending)),
            Ok(Outcome::Fail(error)) => {
                self.release(worker_id);
                Ok(Outcome::Fail(error))
            }
            Err(error) => {
                self.release(worker_id);
                Err(error.into())
            }
        }
    }

    fn is_init(&self, task: &Task) -> bool {
        self.options.init_command.as_ref().is_some_and(|init| *init == task.command)
    }

    fn terminate_retired(retired: impl IntoIterator<Item = TaskWorker>) {
        for worker in retired {
            if let Err(e) = worker.terminate() {
                log_error!(e, worker = worker.id(), "failed to terminate retired worker");
            }
        }
    }

    /// Release the slot of a completed task and shrink if possible.
    fn complete(&self, worker_id: WorkerId, message: &WorkerMessage) -> Result<(), PoolError> {
        let retired = {
            let mut state = self.lock();
            let entry = state.workers.get_mut(&worker_id).ok_or(PoolError::UnregisteredWorker(worker_id))?;
            entry.workload = entry.workload.saturating_sub(1);

            if entry.init_pending && self.is_init(&message.task) {
                entry.init_pending = false;
                Vec::new()
            } else {
                let mut retired: Vec<TaskWorker> = self.try_retire(&mut state, worker_id).into_iter().collect();
                let idle: Vec<WorkerId> = state
                    .workers
                    .iter()
                    .filter(|(id, entry)| **id != worker_id && entry.workload == 0 && entry.worker.is_some())
                    .map(|(id, _)| *id)
                    .collect();
                for id in idle {
                    retired.extend(self.try_retire(&mut state, id));
                }
                retired
            }
        };

        Self::terminate_retired(retired);
        Ok(())
    }

    /// Remove `worker_id` from the pool if it is idle and no longer needed.
    fn try_retire(&self, state: &mut PoolState, worker_id: WorkerId) -> Option<TaskWorker> {
        let inspect = self.prefs.inspect;
        let pool_size = state.workers.len();
        let entry = state.workers.get(&worker_id)?;
        if entry.workload > 0 || entry.worker.is_none() || pool_size <= self.prefs.min_pool_size() {
            return None;
        }

        let optimal = self.prefs.optimal_tasks(pool_size);
        let neighbour = state
            .workers
            .iter()
            .filter(|(id, _)| **id != worker_id)
            .map(|(_, entry)| entry.workload)
            .min();

        match neighbour {
            Some(workload) if workload >= optimal => {
                log_scaling!(inspect, "retain", worker = worker_id, neighbour_workload = workload, optimal, pool_size);
                None
            }
            _ => {
                log_scaling!(inspect, "shrink", worker = worker_id, optimal, pool_size = pool_size - 1);
                state.workers.remove(&worker_id)?.worker
            }
        }
    }

    fn isolate(&self, worker_id: WorkerId, error: &ProtocolError) {
        if self.lock().workers.remove(&worker_id).is_some() {
            log_scaling!(self.prefs.inspect, "isolate", worker = worker_id, error = %error);
        }
    }
}

/// Per-worker hooks through which the pool tracks its workers.
struct PoolWorkerHooks {
    pool: Weak<PoolInner>,
    worker_id: WorkerId,
}

impl TaskWorkerHooks for PoolWorkerHooks {
    fn on_task_dispatched(&self, task: &Task) -> anyhow::Result<()> {
        let Some(pool) = self.pool.upgrade() else { return Ok(()) };
        match &pool.options.worker_hooks {
            Some(hooks) => hooks.on_task_dispatched(task),
            None => Ok(()),
        }
    }

    fn on_task_done(&self, message: &WorkerMessage) -> anyhow::Result<()> {
        let Some(pool) = self.pool.upgrade() else { return Ok(()) };
        pool.complete(self.worker_id, message)?;
        match &pool.options.worker_hooks {
            Some(hooks) => hooks.on_task_done(message),
            None => Ok(()),
        }
    }

    fn on_protocol_error(&self, error: &ProtocolError) -> anyhow::Result<()> {
        let Some(pool) = self.pool.upgrade() else { return Ok(()) };
        pool.isolate(self.worker_id, error);
        match &pool.options.worker_hooks {
            Some(hooks) => hooks.on_protocol_error(error),
            None => Ok(()),
        }
    }
}
