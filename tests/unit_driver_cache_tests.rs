//! # Driver Cache Unit Tests / 驱动缓存单元测试
//!
//! Lazy creation, reuse, failed-initialization replay and the
//! keep-on-error release policy of the per-worker driver cache.
//!
//! 按工作线程划分的驱动缓存：惰性创建、复用、初始化失败重放以及出错保留策略。

mod common;

use std::sync::Arc;

use case_runner::core::driver::{DriverRegistry, DriverState, WorkerDriverCache};
use case_runner::core::error::{ConfigError, DriverError};
use case_runner::core::models::{BackendType, Step, WorkerId};
use common::{CountingProvider, LifecycleCounters};

fn counting_registry(counters: &Arc<LifecycleCounters>, fail_init: bool) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    let counters = Arc::clone(counters);
    registry.register(BackendType::Web, move |_| {
        CountingProvider::boxed(Arc::clone(&counters), fail_init)
    });
    registry
}

#[test]
fn test_default_registry_has_only_none_backend() {
    let registry = DriverRegistry::new();
    assert!(registry.contains(BackendType::None));
    assert!(!registry.contains(BackendType::Web));
    assert!(matches!(
        registry.ensure_registered(BackendType::Android),
        Err(ConfigError::MissingProvider(BackendType::Android))
    ));
    assert!(DriverRegistry::empty().ensure_registered(BackendType::None).is_err());
}

#[test]
fn test_driver_created_once_per_worker_and_reused() {
    let counters = Arc::new(LifecycleCounters::default());
    let cache = WorkerDriverCache::new(counting_registry(&counters, false), false);
    let worker = WorkerId(0);

    assert_eq!(cache.state(worker, BackendType::Web), None);
    let first = cache.acquire(worker, BackendType::Web).unwrap();
    let second = cache.acquire(worker, BackendType::Web).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(counters.created(), 1);
    assert_eq!(counters.initialized(), 1);
    assert_eq!(cache.state(worker, BackendType::Web), Some(DriverState::Ready));
}

#[test]
fn test_workers_never_share_a_driver() {
    let counters = Arc::new(LifecycleCounters::default());
    let cache = WorkerDriverCache::new(counting_registry(&counters, false), false);

    let a = cache.acquire(WorkerId(0), BackendType::Web).unwrap();
    let b = cache.acquire(WorkerId(1), BackendType::Web).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(counters.initialized(), 2);
    assert_eq!(cache.live_count(), 2);
}

#[test]
fn test_backends_are_cached_independently() {
    let counters = Arc::new(LifecycleCounters::default());
    let cache = WorkerDriverCache::new(counting_registry(&counters, false), false);
    let worker = WorkerId(3);

    cache.acquire(worker, BackendType::Web).unwrap();
    cache.acquire(worker, BackendType::None).unwrap();
    assert_eq!(cache.live_count(), 2);
    assert_eq!(counters.initialized(), 1);
}

#[test]
fn test_acquired_driver_performs_steps() {
    let cache = WorkerDriverCache::new(DriverRegistry::new(), false);
    let handle = cache.acquire(WorkerId(0), BackendType::None).unwrap();
    let mut provider = handle.lock().unwrap();
    let output = provider
        .driver()
        .perform(&Step::new("log").with_param("message", "hi"))
        .unwrap();
    assert_eq!(output, "hi");
}

#[test]
fn test_failed_initialization_is_not_retried() {
    let counters = Arc::new(LifecycleCounters::default());
    let cache = WorkerDriverCache::new(counting_registry(&counters, true), false);
    let worker = WorkerId(0);

    let first = cache.acquire(worker, BackendType::Web).unwrap_err();
    let second = cache.acquire(worker, BackendType::Web).unwrap_err();

    assert!(matches!(first, DriverError::Initialization(_)));
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(counters.created(), 1);
    assert_eq!(cache.state(worker, BackendType::Web), Some(DriverState::Failed));
    assert_eq!(cache.live_count(), 0);
}

#[test]
fn test_release_closes_the_workers_drivers_only() {
    let counters = Arc::new(LifecycleCounters::default());
    let cache = WorkerDriverCache::new(counting_registry(&counters, false), false);

    cache.acquire(WorkerId(0), BackendType::Web).unwrap();
    cache.acquire(WorkerId(1), BackendType::Web).unwrap();
    cache.release(WorkerId(0), false);

    assert_eq!(counters.closed(), 1);
    assert_eq!(cache.state(WorkerId(0), BackendType::Web), None);
    assert_eq!(cache.state(WorkerId(1), BackendType::Web), Some(DriverState::Ready));
}

#[test]
fn test_release_after_failure_closes_without_keep_policy() {
    let counters = Arc::new(LifecycleCounters::default());
    let cache = WorkerDriverCache::new(counting_registry(&counters, false), false);

    cache.acquire(WorkerId(0), BackendType::Web).unwrap();
    cache.release(WorkerId(0), true);
    assert_eq!(counters.closed(), 1);
    assert_eq!(cache.live_count(), 0);
}

#[test]
fn test_keep_on_error_retains_until_shutdown() {
    let counters = Arc::new(LifecycleCounters::default());
    let cache = WorkerDriverCache::new(counting_registry(&counters, false), true);

    cache.acquire(WorkerId(0), BackendType::Web).unwrap();
    cache.acquire(WorkerId(1), BackendType::Web).unwrap();

    cache.release(WorkerId(0), true);
    cache.release(WorkerId(1), false);
    assert_eq!(counters.closed(), 1);
    assert_eq!(cache.state(WorkerId(0), BackendType::Web), Some(DriverState::Ready));

    cache.shutdown();
    assert_eq!(counters.closed(), 2);
    assert_eq!(cache.live_count(), 0);
}

#[test]
fn test_failed_entries_are_cleared_on_release() {
    let counters = Arc::new(LifecycleCounters::default());
    let cache = WorkerDriverCache::new(counting_registry(&counters, true), false);

    cache.acquire(WorkerId(0), BackendType::Web).unwrap_err();
    cache.release(WorkerId(0), true);
    assert_eq!(cache.state(WorkerId(0), BackendType::Web), None);
    assert_eq!(counters.closed(), 0);
}
