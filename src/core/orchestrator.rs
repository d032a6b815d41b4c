//! # Orchestrator Module / 编排器模块
//!
//! Owns the worker pool. Every ungrouped instance and every sequence group is
//! one unit of work; a fixed number of workers pull units from a shared queue
//! and run each to completion before taking the next. Members of a group run
//! in order on the worker that took the group.
//!
//! 持有工作线程池。每个未分组实例和每个序列组都是一个工作单元；
//! 固定数量的工作线程从共享队列中拉取单元，并在获取下一个之前运行完当前单元。
//! 组内成员在获取该组的工作线程上按顺序运行。
//!
//! Workers are blocking tasks: step execution talks to automation backends
//! synchronously and may sleep while polling.

use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::driver::WorkerDriverCache;
use crate::core::execution::{run_instance, WorkerContext};
use crate::core::models::{InstanceResult, SkipReason, TestCaseInstance, WorkerId};
use crate::core::retry::FailureRecorder;
use crate::core::sequencer::SequenceGroup;

/// A schedulable unit: never split across workers.
/// 可调度单元：永远不会被拆分到多个工作线程上。
#[derive(Debug, Clone)]
pub enum WorkUnit {
    Single(TestCaseInstance),
    Group(SequenceGroup),
}

impl WorkUnit {
    pub fn label(&self) -> String {
        match self {
            WorkUnit::Single(instance) => instance.id.to_string(),
            WorkUnit::Group(group) => format!("series {}", group.name),
        }
    }

    fn into_skipped(self, reason: SkipReason) -> Vec<InstanceResult> {
        match self {
            WorkUnit::Single(instance) => vec![InstanceResult::skipped(&instance, None, reason)],
            WorkUnit::Group(group) => group
                .instances
                .iter()
                .map(|instance| InstanceResult::skipped(instance, Some(group.name.clone()), reason))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Worker count; 1 means strictly sequential.
    pub parallelism: usize,
    /// A failing member aborts the rest of its own group.
    pub stop_on_error: bool,
    pub locale: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            parallelism: 1,
            stop_on_error: false,
            locale: "en".to_string(),
        }
    }
}

/// Runs work units on a bounded pool and collects their results.
/// 在有界线程池上运行工作单元并收集结果。
#[derive(Debug)]
pub struct Orchestrator {
    settings: OrchestratorSettings,
    cache: Arc<WorkerDriverCache>,
    recorder: Option<Arc<FailureRecorder>>,
    stop_token: CancellationToken,
}

impl Orchestrator {
    pub fn new(settings: OrchestratorSettings, cache: Arc<WorkerDriverCache>) -> Self {
        Self {
            settings,
            cache,
            recorder: None,
            stop_token: CancellationToken::new(),
        }
    }

    /// Persists the first step failure of the run for a later resume.
    pub fn with_failure_recorder(mut self, recorder: Arc<FailureRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Workers stop taking new units once the token is cancelled; units not
    /// yet started are reported as interrupted.
    pub fn with_stop_token(mut self, token: CancellationToken) -> Self {
        self.stop_token = token;
        self
    }

    pub fn cache(&self) -> &Arc<WorkerDriverCache> {
        &self.cache
    }

    /// Executes every unit and returns one result per instance, in completion
    /// order. Ungrouped instances are queued first, then groups, each in the
    /// order given.
    ///
    /// 执行所有单元，并按完成顺序为每个实例返回一个结果。
    pub async fn run(&self, ungrouped: Vec<TestCaseInstance>, groups: Vec<SequenceGroup>) -> Vec<InstanceResult> {
        let units: VecDeque<WorkUnit> = ungrouped
            .into_iter()
            .map(WorkUnit::Single)
            .chain(groups.into_iter().filter(|g| !g.is_empty()).map(WorkUnit::Group))
            .collect();
        if units.is_empty() {
            return Vec::new();
        }

        let workers = self.settings.parallelism.max(1).min(units.len());
        info!(units = units.len(), workers, "starting run");

        let queue = Arc::new(Mutex::new(units));
        let (tx, mut rx) = mpsc::unbounded_channel::<InstanceResult>();

        let handles: Vec<_> = (0..workers)
            .map(|n| {
                let worker = Worker {
                    id: WorkerId(n),
                    queue: Arc::clone(&queue),
                    results: tx.clone(),
                    cache: Arc::clone(&self.cache),
                    recorder: self.recorder.clone(),
                    stop_token: self.stop_token.clone(),
                    stop_on_error: self.settings.stop_on_error,
                    locale: self.settings.locale.clone(),
                };
                tokio::task::spawn_blocking(move || worker.run())
            })
            .collect();
        drop(tx);

        for (n, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                warn!(worker = n, error = %e, "worker terminated abnormally");
            }
        }

        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }
}

/// State owned by one worker for the duration of a run.
struct Worker {
    id: WorkerId,
    queue: Arc<Mutex<VecDeque<WorkUnit>>>,
    results: mpsc::UnboundedSender<InstanceResult>,
    cache: Arc<WorkerDriverCache>,
    recorder: Option<Arc<FailureRecorder>>,
    stop_token: CancellationToken,
    stop_on_error: bool,
    locale: String,
}

impl Worker {
    fn next_unit(&self) -> Option<WorkUnit> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    fn report(&self, result: InstanceResult) {
        if result.is_failure() {
            if let (Some(recorder), Some(step)) = (&self.recorder, result.failed_step) {
                recorder.record(&result.id, step);
            }
        }
        // The receiver lives until every worker has been joined.
        let _ = self.results.send(result);
    }

    fn run(self) {
        let ctx = WorkerContext {
            worker: self.id,
            cache: &self.cache,
            locale: &self.locale,
        };
        let mut last_failed = false;

        while let Some(unit) = self.next_unit() {
            if self.stop_token.is_cancelled() {
                for skipped in unit.into_skipped(SkipReason::Interrupted) {
                    self.report(skipped);
                }
                continue;
            }
            debug!(worker = %self.id, unit = %unit.label(), "took work unit");

            match unit {
                WorkUnit::Single(instance) => {
                    let result = run_instance(&instance, None, &ctx);
                    last_failed = result.is_failure();
                    self.report(result);
                }
                WorkUnit::Group(group) => {
                    let mut aborted = false;
                    for instance in &group.instances {
                        let skip = if aborted {
                            Some(SkipReason::StopOnError)
                        } else if self.stop_token.is_cancelled() {
                            Some(SkipReason::Interrupted)
                        } else {
                            None
                        };
                        if let Some(reason) = skip {
                            self.report(InstanceResult::skipped(instance, Some(group.name.clone()), reason));
                            continue;
                        }

                        let result = run_instance(instance, Some(&group.name), &ctx);
                        last_failed = result.is_failure();
                        if last_failed && self.stop_on_error {
                            debug!(worker = %self.id, group = %group.name, "stopping series after failure");
                            aborted = true;
                        }
                        self.report(result);
                    }
                }
            }
        }

        self.cache.release(self.id, last_failed);
        debug!(worker = %self.id, "worker finished");
    }
}
