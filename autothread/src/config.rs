use std::fmt;
use std::sync::Arc;

use autothread_api::{Command, UnitFactory};

use crate::hooks::TaskWorkerHooks;
use crate::policy;
use crate::registry::TaskRegistry;

/// `(hc, pool_size) -> optimal in-flight tasks per worker`
pub type OptimalTasksFn = Arc<dyn Fn(usize, usize) -> usize + Send + Sync>;

/// `hc -> number of workers`
pub type PoolBoundFn = Arc<dyn Fn(usize) -> usize + Send + Sync>;

// --- Registry Configuration ---

/// Configuration for a [`TaskRegistry`].
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Maximum number of simultaneously outstanding tasks.
    pub max_outstanding: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_outstanding: policy::registry_capacity(policy::hardware_concurrency()) }
    }
}

impl RegistryConfig {
    pub fn with_max_outstanding(max_outstanding: usize) -> Self {
        Self { max_outstanding }
    }
}

// --- Pool Configuration ---

/// Sizing policy of a [`WorkerPool`](crate::pool::WorkerPool).
///
/// Every sizing function can be overridden; the defaults are the ones in
/// [`policy`].
#[derive(Clone)]
pub struct PoolPreferences {
    /// Optimal number of in-flight tasks per worker.
    pub optimal_tasks: OptimalTasksFn,

    /// Maximum number of workers. Going beyond hardware concurrency is
    /// rarely useful.
    pub max_pool_size: PoolBoundFn,

    /// Minimum number of workers kept alive when idle. Very small values
    /// make the pool grow and shrink frequently.
    pub min_pool_size: PoolBoundFn,

    /// Log every scaling decision at INFO.
    pub inspect: bool,

    /// Logical processors the sizing functions are evaluated against.
    pub hardware_concurrency: usize,
}

impl Default for PoolPreferences {
    fn default() -> Self {
        Self {
            optimal_tasks: Arc::new(policy::optimal_tasks_per_worker),
            max_pool_size: Arc::new(policy::max_pool_size),
            min_pool_size: Arc::new(policy::min_pool_size),
            inspect: false,
            hardware_concurrency: policy::hardware_concurrency(),
        }
    }
}

impl fmt::Debug for PoolPreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolPreferences")
            .field("hardware_concurrency", &self.hardware_concurrency)
            .field("max_pool_size", &self.max_pool_size())
            .field("min_pool_size", &self.min_pool_size())
            .field("inspect", &self.inspect)
            .finish()
    }
}

impl PoolPreferences {
    pub fn with_optimal_tasks(mut self, f: impl Fn(usize, usize) -> usize + Send + Sync + 'static) -> Self {
        self.optimal_tasks = Arc::new(f);
        self
    }

    pub fn with_max_pool_size(mut self, f: impl Fn(usize) -> usize + Send + Sync + 'static) -> Self {
        self.max_pool_size = Arc::new(f);
        self
    }

    pub fn with_min_pool_size(mut self, f: impl Fn(usize) -> usize + Send + Sync + 'static) -> Self {
        self.min_pool_size = Arc::new(f);
        self
    }

    pub fn with_inspect(mut self, inspect: bool) -> Self {
        self.inspect = inspect;
        self
    }

    pub fn with_hardware_concurrency(mut self, hc: usize) -> Self {
        self.hardware_concurrency = hc;
        self
    }

    /// Optimal load for a pool of `pool_size` workers, never below one task.
    pub fn optimal_tasks(&self, pool_size: usize) -> usize {
        (self.optimal_tasks)(self.hardware_concurrency, pool_size).max(1)
    }

    pub fn max_pool_size(&self) -> usize {
        (self.max_pool_size)(self.hardware_concurrency)
    }

    pub fn min_pool_size(&self) -> usize {
        (self.min_pool_size)(self.hardware_concurrency)
    }
}

/// What a [`WorkerPool`](crate::pool::WorkerPool) spawns and shares.
#[derive(Clone)]
pub struct PoolOptions {
    /// Entry every worker unit is spawned from.
    pub entry: Arc<dyn UnitFactory>,

    /// Registry shared by all workers. A pool-sized one is created when absent,
    /// pass one explicitly to share it across pools.
    pub registry: Option<Arc<TaskRegistry>>,

    /// User hooks attached to each worker of the pool.
    pub worker_hooks: Option<Arc<dyn TaskWorkerHooks>>,

    /// One-time command a worker must complete before it accepts work.
    pub init_command: Option<Command>,
}

impl PoolOptions {
    pub fn new(entry: Arc<dyn UnitFactory>) -> Self {
        Self { entry, registry: None, worker_hooks: None, init_command: None }
    }

    pub fn with_registry(mut self, registry: Arc<TaskRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_worker_hooks(mut self, hooks: Arc<dyn TaskWorkerHooks>) -> Self {
        self.worker_hooks = Some(hooks);
        self
    }

    pub fn with_init_command(mut self, command: Command) -> Self {
        self.init_command = Some(command);
        self
    }
}

impl fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("entry", &self.entry)
            .field("shared_registry", &self.registry.is_some())
            .field("worker_hooks", &self.worker_hooks.is_some())
            .field("init_command", &self.init_command.as_ref().map(|c| c.kind.as_str()))
            .finish()
    }
}

// --- Thread Unit Configuration ---

/// Configuration of OS-thread executable units.
#[derive(Clone, Debug)]
pub struct ThreadUnitConfig {
    /// Worker threads are named `{prefix}{worker_id}`.
    pub thread_name_prefix: String,

    /// Stack size of worker threads; the platform default when `None`.
    pub stack_size: Option<usize>,
}

impl Default for ThreadUnitConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "autothread-worker-".to_string(),
            stack_size: None,
        }
    }
}
