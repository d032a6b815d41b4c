//! # Instance Execution Module / 实例执行模块
//!
//! Runs a single instance on the calling worker: acquires the worker's driver
//! for the instance's backend, resolves each step against the data row and
//! hands it to the driver, stopping at the first failing step.
//!
//! 在调用方工作线程上运行单个实例：获取该工作线程对应后端的驱动，
//! 根据数据行解析每个步骤并交给驱动执行，在第一个失败的步骤处停止。

use chrono::Utc;
use colored::*;
use std::time::{Duration, Instant};

use crate::core::driver::WorkerDriverCache;
use crate::core::models::{
    DataRow, FailureReason, InstanceResult, InstanceStatus, Step, StepResult, StepStatus,
    TestCaseInstance, WorkerId,
};
use crate::infra::t;

/// What a worker hands to each instance it runs: its own identity and the
/// shared driver cache, instead of any ambient per-thread state.
/// 工作线程交给每个实例的内容：它自己的标识和共享的驱动缓存。
#[derive(Debug, Clone, Copy)]
pub struct WorkerContext<'a> {
    pub worker: WorkerId,
    pub cache: &'a WorkerDriverCache,
    pub locale: &'a str,
}

/// Substitutes `${field}` / `$field` placeholders in the step's parameters
/// with values from the data row. Unknown placeholders are left as written.
pub fn resolve_step(step: &Step, row: Option<&DataRow>) -> Step {
    let Some(row) = row else {
        return step.clone();
    };
    let params = step
        .params
        .iter()
        .map(|(key, value)| {
            let expanded = shellexpand::env_with_context_no_errors(value, |name: &str| row.get(name));
            (key.clone(), expanded.into_owned())
        })
        .collect();
    Step {
        name: step.name.clone(),
        action: step.action.clone(),
        params,
    }
}

/// Runs an instance to completion and returns its result.
///
/// Steps before `instance.start_step` are marked skipped. After a failing
/// step the remaining steps are not run. If the worker has no usable driver
/// for the backend, the instance fails without running any step.
///
/// 运行实例直到完成并返回结果。
pub fn run_instance(instance: &TestCaseInstance, group: Option<&str>, ctx: &WorkerContext<'_>) -> InstanceResult {
    let started_at = Utc::now();
    let clock = Instant::now();
    let name = instance.id.to_string();
    let definition = &instance.definition;
    let resumed_from = (instance.start_step > 0).then_some(instance.start_step);

    println!(
        "{}",
        t!("run.running_instance", locale = ctx.locale, name = &name, worker = ctx.worker).blue()
    );
    if let Some(start) = resumed_from {
        println!(
            "{}",
            t!("run.resuming_instance", locale = ctx.locale, name = &name, step = start).yellow()
        );
    }

    let mut result = InstanceResult {
        id: instance.id.clone(),
        correlation_id: instance.correlation_id.clone(),
        backend: instance.backend(),
        group: group.map(str::to_string),
        worker: Some(ctx.worker),
        status: InstanceStatus::Passed,
        steps: Vec::with_capacity(definition.steps.len()),
        duration: Duration::ZERO,
        started_at,
        failed_step: None,
        resumed_from,
    };

    let handle = match ctx.cache.acquire(ctx.worker, instance.backend()) {
        Ok(handle) => handle,
        Err(error) => {
            result.steps = definition
                .steps
                .iter()
                .enumerate()
                .map(|(index, step)| not_run(index, step))
                .collect();
            result.status = InstanceStatus::Failed {
                reason: FailureReason::DriverUnavailable,
                message: error.to_string(),
            };
            result.duration = clock.elapsed();
            println!(
                "{}",
                t!("run.driver_unavailable", locale = ctx.locale, name = &name, error = error.to_string()).red()
            );
            return result;
        }
    };

    let mut provider = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let driver = provider.driver();

    for (index, step) in definition.steps.iter().enumerate() {
        if result.failed_step.is_some() {
            result.steps.push(not_run(index, step));
            continue;
        }
        if index < instance.start_step {
            result.steps.push(StepResult {
                index,
                name: step.label().to_string(),
                status: StepStatus::Skipped,
                duration: Duration::ZERO,
                output: String::new(),
            });
            continue;
        }

        let resolved = resolve_step(step, instance.row.as_ref());
        let step_clock = Instant::now();
        let outcome = driver.perform(&resolved);
        let duration = step_clock.elapsed();

        match outcome {
            Ok(output) => result.steps.push(StepResult {
                index,
                name: step.label().to_string(),
                status: StepStatus::Passed,
                duration,
                output,
            }),
            Err(message) => {
                result.failed_step = Some(index);
                result.status = InstanceStatus::Failed {
                    reason: FailureReason::StepFailed,
                    message: format!("step {} '{}': {}", index, step.label(), message),
                };
                result.steps.push(StepResult {
                    index,
                    name: step.label().to_string(),
                    status: StepStatus::Failed,
                    duration,
                    output: message,
                });
            }
        }
    }
    drop(provider);

    result.duration = clock.elapsed();
    let secs = format!("{:.2}", result.duration.as_secs_f64());
    if result.is_failure() {
        println!(
            "{}",
            t!("run.instance_failed", locale = ctx.locale, name = &name, duration = &secs).red()
        );
    } else {
        println!(
            "{}",
            t!("run.instance_passed", locale = ctx.locale, name = &name, duration = &secs).green()
        );
    }
    result
}

fn not_run(index: usize, step: &Step) -> StepResult {
    StepResult {
        index,
        name: step.label().to_string(),
        status: StepStatus::NotRun,
        duration: Duration::ZERO,
        output: String::new(),
    }
}
