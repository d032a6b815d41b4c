//! # Orchestrator Integration Tests / 编排器集成测试
//!
//! Worker pool behaviour end to end: group affinity and ordering,
//! stop-on-error, driver failures, the parallelism bound, interruption and
//! first-failure persistence.
//!
//! 端到端的工作线程池行为：组亲和与顺序、出错停止、驱动失败、
//! 并行度上限、中断以及首次失败持久化。

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use case_runner::core::driver::{Driver, DriverProvider, DriverRegistry, WorkerDriverCache};
use case_runner::core::error::DriverError;
use case_runner::core::models::{
    BackendType, FailureReason, InstanceResult, InstanceStatus, SkipReason, Step, StepStatus,
    TestCaseDefinition, TestCaseInstance,
};
use case_runner::core::orchestrator::{Orchestrator, OrchestratorSettings};
use case_runner::core::retry::{FailureRecorder, RetryStore};
use case_runner::core::sequencer::{self, SequenceGroup};
use common::{
    definition, fail_step, instance, log_step, on_backend, sleep_step, CountingProvider,
    LifecycleCounters,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn settings(parallelism: usize, stop_on_error: bool) -> OrchestratorSettings {
    OrchestratorSettings {
        parallelism,
        stop_on_error,
        ..OrchestratorSettings::default()
    }
}

fn orchestrator(parallelism: usize, stop_on_error: bool) -> Orchestrator {
    Orchestrator::new(
        settings(parallelism, stop_on_error),
        Arc::new(WorkerDriverCache::new(DriverRegistry::new(), false)),
    )
}

fn member(name: &str, series: &str, steps: Vec<Step>) -> TestCaseInstance {
    instance(TestCaseDefinition {
        series: Some(series.to_string()),
        ..definition(name, steps)
    })
}

fn groups_of(instances: Vec<TestCaseInstance>) -> Vec<SequenceGroup> {
    sequencer::group(instances).unwrap().groups
}

fn result<'a>(results: &'a [InstanceResult], name: &str) -> &'a InstanceResult {
    results
        .iter()
        .find(|r| r.case_name() == name)
        .unwrap_or_else(|| panic!("no result for {name}"))
}

#[tokio::test]
async fn test_every_instance_yields_one_result() {
    let ungrouped = (0..5)
        .map(|i| instance(definition(&format!("case-{i}"), vec![log_step("ok")])))
        .collect();
    let results = orchestrator(3, false).run(ungrouped, Vec::new()).await;

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(InstanceResult::is_passed));
    let names: HashSet<_> = results.iter().map(|r| r.case_name()).collect();
    assert_eq!(names.len(), 5);
}

#[tokio::test]
async fn test_empty_run_returns_no_results() {
    let results = orchestrator(4, false).run(Vec::new(), Vec::new()).await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_sequential_run_follows_submission_order() {
    let ungrouped = vec![
        instance(definition("u1", vec![log_step("1")])),
        instance(definition("u2", vec![log_step("2")])),
    ];
    let groups = groups_of(vec![
        member("g2", "G.2", vec![log_step("g2")]),
        member("g1", "G.1", vec![log_step("g1")]),
    ]);
    let results = orchestrator(1, false).run(ungrouped, groups).await;

    let order: Vec<_> = results.iter().map(|r| r.case_name()).collect();
    assert_eq!(order, vec!["u1", "u2", "g1", "g2"]);
}

#[tokio::test]
async fn test_group_members_share_a_worker_in_order() {
    // Scenario: X.2, X.1, X.3 with parallelism 2, plus unrelated work.
    let groups = groups_of(vec![
        member("x2", "X.2", vec![sleep_step(5)]),
        member("x1", "X.1", vec![sleep_step(5)]),
        member("x3", "X.3", vec![sleep_step(5)]),
        member("y1", "Y.1", vec![sleep_step(5)]),
        member("y2", "Y.2", vec![sleep_step(5)]),
    ]);
    let ungrouped = (0..4)
        .map(|i| instance(definition(&format!("free-{i}"), vec![sleep_step(5)])))
        .collect();

    let results = orchestrator(2, false).run(ungrouped, groups).await;
    assert_eq!(results.len(), 9);

    for (group, members) in [("X", vec!["x1", "x2", "x3"]), ("Y", vec!["y1", "y2"])] {
        let in_group: Vec<&InstanceResult> = results
            .iter()
            .filter(|r| r.group.as_deref() == Some(group))
            .collect();
        let workers: HashSet<_> = in_group.iter().map(|r| r.worker).collect();
        assert_eq!(workers.len(), 1, "group {group} split across workers");

        let mut by_start = in_group.clone();
        by_start.sort_by_key(|r| r.started_at);
        let order: Vec<_> = by_start.iter().map(|r| r.case_name()).collect();
        assert_eq!(order, members);
    }
}

#[tokio::test]
async fn test_stop_on_error_skips_rest_of_group() {
    // Scenario: X.1 passes, X.2 fails at step 1, stop-on-error set.
    let groups = groups_of(vec![
        member("x1", "X.1", vec![log_step("ok")]),
        member("x2", "X.2", vec![log_step("ok"), fail_step("boom"), log_step("never")]),
        member("x3", "X.3", vec![log_step("ok")]),
    ]);
    let results = orchestrator(1, true).run(Vec::new(), groups).await;

    assert!(result(&results, "x1").is_passed());

    let failed = result(&results, "x2");
    assert_eq!(failed.failed_step, Some(1));
    assert!(matches!(
        &failed.status,
        InstanceStatus::Failed { reason: FailureReason::StepFailed, message } if message.contains("boom")
    ));
    let statuses: Vec<_> = failed.steps.iter().map(|s| s.status).collect();
    assert_eq!(statuses, vec![StepStatus::Passed, StepStatus::Failed, StepStatus::NotRun]);

    let skipped = result(&results, "x3");
    assert_eq!(skipped.status, InstanceStatus::Skipped { reason: SkipReason::StopOnError });
    assert!(skipped.worker.is_none());
}

#[tokio::test]
async fn test_without_stop_on_error_group_continues() {
    let groups = groups_of(vec![
        member("x1", "X.1", vec![fail_step("boom")]),
        member("x2", "X.2", vec![log_step("ok")]),
    ]);
    let results = orchestrator(1, false).run(Vec::new(), groups).await;
    assert!(result(&results, "x1").is_failure());
    assert!(result(&results, "x2").is_passed());
}

#[tokio::test]
async fn test_failure_stays_local_to_its_unit() {
    let groups = groups_of(vec![
        member("a1", "A.1", vec![fail_step("boom")]),
        member("a2", "A.2", vec![log_step("ok")]),
        member("b1", "B.1", vec![log_step("ok")]),
    ]);
    let ungrouped = vec![instance(definition("free", vec![log_step("ok")]))];
    let results = orchestrator(2, true).run(ungrouped, groups).await;

    assert!(result(&results, "b1").is_passed());
    assert!(result(&results, "free").is_passed());
    assert!(result(&results, "a2").is_skipped());
}

#[tokio::test]
async fn test_driver_initialization_failure_fails_instances_on_that_backend() {
    let counters = Arc::new(LifecycleCounters::default());
    let mut registry = DriverRegistry::new();
    let c = Arc::clone(&counters);
    registry.register(BackendType::Web, move |_| CountingProvider::boxed(Arc::clone(&c), true));

    let ungrouped = vec![
        instance(on_backend(definition("web-1", vec![log_step("ok")]), BackendType::Web)),
        instance(on_backend(definition("web-2", vec![log_step("ok")]), BackendType::Web)),
        instance(definition("plain", vec![log_step("ok")])),
    ];
    let orchestrator = Orchestrator::new(settings(1, false), Arc::new(WorkerDriverCache::new(registry, false)));
    let results = orchestrator.run(ungrouped, Vec::new()).await;

    for name in ["web-1", "web-2"] {
        let r = result(&results, name);
        assert!(matches!(
            r.status,
            InstanceStatus::Failed { reason: FailureReason::DriverUnavailable, .. }
        ));
        assert!(r.steps.iter().all(|s| s.status == StepStatus::NotRun));
        assert_eq!(r.failed_step, None);
    }
    assert!(result(&results, "plain").is_passed());
    // One worker, one failed attempt: never retried within the run.
    assert_eq!(counters.created(), 1);
}

#[tokio::test]
async fn test_drivers_are_released_when_workers_finish() {
    let counters = Arc::new(LifecycleCounters::default());
    let mut registry = DriverRegistry::new();
    let c = Arc::clone(&counters);
    registry.register(BackendType::Web, move |_| CountingProvider::boxed(Arc::clone(&c), false));
    let cache = Arc::new(WorkerDriverCache::new(registry, false));

    let ungrouped = (0..4)
        .map(|i| instance(on_backend(definition(&format!("web-{i}"), vec![log_step("ok")]), BackendType::Web)))
        .collect();
    let results = Orchestrator::new(settings(2, false), Arc::clone(&cache))
        .run(ungrouped, Vec::new())
        .await;

    assert!(results.iter().all(InstanceResult::is_passed));
    assert!(counters.initialized() <= 2);
    assert_eq!(counters.closed(), counters.initialized());
    assert_eq!(cache.live_count(), 0);
}

#[tokio::test]
async fn test_keep_on_error_retains_driver_until_shutdown() {
    let counters = Arc::new(LifecycleCounters::default());
    let mut registry = DriverRegistry::new();
    let c = Arc::clone(&counters);
    registry.register(BackendType::Web, move |_| CountingProvider::boxed(Arc::clone(&c), false));
    let cache = Arc::new(WorkerDriverCache::new(registry, true));

    let ungrouped = vec![instance(on_backend(definition("web", vec![fail_step("boom")]), BackendType::Web))];
    Orchestrator::new(settings(1, false), Arc::clone(&cache))
        .run(ungrouped, Vec::new())
        .await;

    assert_eq!(cache.live_count(), 1);
    assert_eq!(counters.closed(), 0);
    cache.shutdown();
    assert_eq!(counters.closed(), 1);
}

/// Tracks how many drivers are performing a step at the same moment.
struct ProbeProvider {
    driver: ProbeDriver,
}

struct ProbeDriver {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Driver for ProbeDriver {
    fn perform(&mut self, _step: &Step) -> Result<String, String> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(String::new())
    }
}

impl DriverProvider for ProbeProvider {
    fn initialize(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn driver(&mut self) -> &mut dyn Driver {
        &mut self.driver
    }

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallelism_bounds_concurrent_instances() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut registry = DriverRegistry::new();
    let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
    registry.register(BackendType::Rest, move |_| -> Box<dyn DriverProvider> {
        Box::new(ProbeProvider {
            driver: ProbeDriver {
                active: Arc::clone(&a),
                peak: Arc::clone(&p),
            },
        })
    });

    let ungrouped = (0..10)
        .map(|i| instance(on_backend(definition(&format!("api-{i}"), vec![log_step("x")]), BackendType::Rest)))
        .collect();
    let results = Orchestrator::new(settings(3, false), Arc::new(WorkerDriverCache::new(registry, false)))
        .run(ungrouped, Vec::new())
        .await;

    assert_eq!(results.len(), 10);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_cancelled_run_reports_interrupted() {
    let token = CancellationToken::new();
    token.cancel();

    let ungrouped = vec![instance(definition("u", vec![log_step("ok")]))];
    let groups = groups_of(vec![
        member("g1", "G.1", vec![log_step("ok")]),
        member("g2", "G.2", vec![log_step("ok")]),
    ]);
    let results = orchestrator(2, false)
        .with_stop_token(token)
        .run(ungrouped, groups)
        .await;

    assert_eq!(results.len(), 3);
    assert!(results
        .iter()
        .all(|r| r.status == InstanceStatus::Skipped { reason: SkipReason::Interrupted }));
}

#[tokio::test]
async fn test_first_failure_is_persisted() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(FailureRecorder::new(RetryStore::new(dir.path())));

    let ungrouped = vec![
        instance(definition("ok", vec![log_step("ok")])),
        instance(definition("broken", vec![log_step("ok"), log_step("ok"), fail_step("boom")])),
    ];
    let results = orchestrator(1, false)
        .with_failure_recorder(Arc::clone(&recorder))
        .run(ungrouped, Vec::new())
        .await;

    assert!(result(&results, "broken").is_failure());
    let state = RetryStore::new(dir.path()).read().unwrap();
    assert_eq!(state.instance.definition, "broken");
    assert_eq!(state.step_index, 2);
}

#[tokio::test]
async fn test_resumed_instance_skips_earlier_steps() {
    let mut resumed = instance(definition(
        "resumed",
        vec![fail_step("would fail"), log_step("one"), log_step("two")],
    ));
    resumed.start_step = 1;

    let results = orchestrator(1, false).run(vec![resumed], Vec::new()).await;
    let r = &results[0];
    assert!(r.is_passed());
    assert_eq!(r.resumed_from, Some(1));
    let statuses: Vec<_> = r.steps.iter().map(|s| s.status).collect();
    assert_eq!(statuses, vec![StepStatus::Skipped, StepStatus::Passed, StepStatus::Passed]);
}
