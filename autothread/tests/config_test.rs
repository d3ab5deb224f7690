// Integration tests for configuration types in autothread::config

use std::sync::Arc;

use autothread::config::*;
use autothread::{policy, Command, TaskRegistry, ThreadUnitFactory, RoutineTable};

#[test]
fn test_registry_config_defaults() {
    let config = RegistryConfig::default();
    assert_eq!(config.max_outstanding, policy::registry_capacity(num_cpus::get()));
    assert_eq!(RegistryConfig::with_max_outstanding(7).max_outstanding, 7);
}

#[test]
fn test_pool_preferences_defaults() {
    let prefs = PoolPreferences::default().with_hardware_concurrency(10);

    assert_eq!(PoolPreferences::default().hardware_concurrency, num_cpus::get());
    assert!(!prefs.inspect);
    assert_eq!(prefs.max_pool_size(), 10);
    assert_eq!(prefs.min_pool_size(), 3);
    assert_eq!(prefs.optimal_tasks(0), 8);
    assert_eq!(prefs.optimal_tasks(10), policy::optimal_tasks_per_worker(10, 10));
}

#[test]
fn test_pool_preferences_overrides() {
    let prefs = PoolPreferences::default()
        .with_hardware_concurrency(4)
        .with_optimal_tasks(|hc, cw| hc + cw)
        .with_max_pool_size(|hc| hc * 2)
        .with_min_pool_size(|_| 1)
        .with_inspect(true);

    assert_eq!(prefs.optimal_tasks(3), 7);
    assert_eq!(prefs.max_pool_size(), 8);
    assert_eq!(prefs.min_pool_size(), 1);
    assert!(prefs.inspect);
}

#[test]
fn test_optimal_load_is_at_least_one() {
    let prefs = PoolPreferences::default().with_optimal_tasks(|_, _| 0);
    assert_eq!(prefs.optimal_tasks(5), 1);
}

#[test]
fn test_thread_unit_config_defaults() {
    let config = ThreadUnitConfig::default();
    assert_eq!(config.thread_name_prefix, "autothread-worker-");
    assert!(config.stack_size.is_none());
}

#[tokio::test]
async fn test_pool_options_builder() {
    let entry = Arc::new(ThreadUnitFactory::new(RoutineTable::new(), tokio::runtime::Handle::current()));
    let registry = Arc::new(TaskRegistry::default());
    let options = PoolOptions::new(entry)
        .with_registry(registry.clone())
        .with_init_command(Command::new("init", true));

    assert!(Arc::ptr_eq(options.registry.as_ref().unwrap(), &registry));
    assert_eq!(options.init_command.as_ref().unwrap().kind, "init");
    assert!(options.worker_hooks.is_none());

    let debug = format!("{options:?}");
    assert!(debug.contains("shared_registry: true"));
}

#[test]
fn test_preferences_debug_format() {
    let prefs = PoolPreferences::default().with_hardware_concurrency(6);
    let debug = format!("{prefs:?}");
    assert!(debug.contains("hardware_concurrency: 6"));
    assert!(debug.contains("max_pool_size: 6"));
}
