// Autothread worker pool
//
// A self-scaling pool of isolated workers. Tasks are registered in a
// shared registry, routed greedily to the least loaded worker and
// correlated back to their caller when the worker replies.

pub mod config;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod policy;
pub mod pool;
pub mod registry;
pub mod runtime;
pub mod worker;

// Re-export commonly used types
pub use autothread_api::*;
pub use config::{PoolOptions, PoolPreferences, RegistryConfig, ThreadUnitConfig};
pub use error::{AbortFailure, PoolError, RegistrationError, TaskError};
pub use hooks::{InspectHooks, TaskRegistryHooks, TaskWorkerHooks};
pub use pool::{DispatchRegistration, PoolMetrics, PoolTask, RegistrationSignal, WorkerPool};
pub use registry::{PendingResult, PendingTask, Registration, RegistryEntry, TaskRegistry};
pub use runtime::{ThreadUnit, ThreadUnitFactory};
pub use worker::TaskWorker;
