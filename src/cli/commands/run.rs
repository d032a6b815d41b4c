// src/cli/commands/run.rs

use anyhow::{Context, Result};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::config::SuiteConfig;
use crate::core::data_source::DataLoader;
use crate::core::driver::{DriverRegistry, WorkerDriverCache};
use crate::core::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::core::planner::{self, PlanContext, ResumeRequest};
use crate::core::retry::{FailureRecorder, RetryStore};
use crate::core::selector::Selector;
use crate::infra::t;
use crate::reporting::{ConsoleSink, ResultSink, RunSummary};

/// Command-line values that take precedence over the suite file.
/// 优先于套件文件的命令行参数。
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub language: Option<String>,
    pub jobs: Option<usize>,
    pub tags: Vec<String>,
    /// External selection; `Some` turns coverage mode on.
    pub selection: Option<Vec<String>>,
    pub retry: bool,
    pub steps_back: Option<usize>,
    pub stop_on_error: bool,
    pub keep_driver_on_error: bool,
}

impl RunOverrides {
    pub fn apply(&self, suite: &mut SuiteConfig) {
        if let Some(language) = &self.language {
            suite.language = language.clone();
        }
        if let Some(jobs) = self.jobs {
            suite.run.multi_threading = jobs > 1;
            suite.run.parallelism = Some(jobs);
        }
        if !self.tags.is_empty() {
            suite.filter.tags = self.tags.clone();
        }
        if let Some(selection) = &self.selection {
            suite.coverage.enabled = true;
            suite.coverage.selected = selection.clone();
        }
        suite.retry.enabled |= self.retry;
        if let Some(steps_back) = self.steps_back {
            suite.retry.steps_back = steps_back;
        }
        suite.run.stop_on_error |= self.stop_on_error;
        suite.run.keep_driver_on_error |= self.keep_driver_on_error;
    }
}

pub async fn execute(suite_path: PathBuf, overrides: RunOverrides) -> Result<()> {
    let mut suite = SuiteConfig::load(&suite_path)?;
    overrides.apply(&mut suite);

    let locale = crate::match_locale(&suite.language);
    rust_i18n::set_locale(locale);

    println!(
        "{}",
        t!("loading_suite", locale = locale, path = suite_path.display())
    );

    let stop_token = setup_signal_handler(locale);
    let mut sink = ConsoleSink::new(locale);
    let summary = run_suite(&suite, &suite_path, DriverRegistry::new(), stop_token, &mut sink).await?;

    if summary.failed > 0 {
        anyhow::bail!(t!("run_failed", locale = locale, count = summary.failed).to_string());
    }
    if summary.total() > 0 && summary.skipped == 0 {
        println!("\n{}", t!("all_instances_passed", locale = locale).green().bold());
    }
    Ok(())
}

/// Plans and executes a loaded suite, hands the results to `sink` and
/// returns the counts.
///
/// Configuration errors abort before anything runs. When retry mode is on,
/// the previous failure (if any) is resumed, the first failure of this run is
/// persisted, and a run without failures clears the record.
///
/// 计划并执行已加载的套件，将结果交给 `sink` 并返回计数。
pub async fn run_suite(
    suite: &SuiteConfig,
    source: &Path,
    registry: DriverRegistry,
    stop_token: CancellationToken,
    sink: &mut dyn ResultSink,
) -> Result<RunSummary> {
    let locale = crate::match_locale(&suite.language);
    let definitions = suite.definitions(source)?;

    let selection = suite
        .coverage
        .enabled
        .then(|| suite.coverage.selected.clone());
    let selector = Selector::new(&suite.filter.tags, selection)?;
    let loader = DataLoader::from_suite(suite);

    let store = RetryStore::new(&suite.retry.state_dir);
    let resume = if suite.retry.enabled {
        store.read().map(|state| ResumeRequest {
            state,
            steps_back: suite.retry.steps_back,
        })
    } else {
        None
    };

    let plan = planner::plan_execution(
        &definitions,
        PlanContext {
            selector: &selector,
            loader: &loader,
            registry: &registry,
            correlation_key: &suite.coverage.correlation_key,
        },
        resume.as_ref(),
    )?;

    if plan.filtered_count > 0 {
        println!(
            "{}",
            t!(
                "filtered_cases",
                locale = locale,
                filtered = plan.filtered_count,
                total = definitions.len()
            )
            .cyan()
        );
    }
    match (&plan.resumed, &resume) {
        (Some((id, step)), _) => println!(
            "{}",
            t!("retry_resuming", locale = locale, name = id, step = step).yellow()
        ),
        (None, Some(request)) => println!(
            "{}",
            t!("retry_not_found", locale = locale, name = &request.state.instance).yellow()
        ),
        (None, None) => {}
    }

    if plan.is_empty() {
        println!("{}", t!("no_instances_to_run", locale = locale).green());
        return Ok(RunSummary::default());
    }

    let parallelism = suite.effective_parallelism();
    println!(
        "{}",
        t!(
            "running_instances",
            locale = locale,
            count = plan.instance_count(),
            workers = parallelism
        )
        .bold()
    );

    let cache = Arc::new(WorkerDriverCache::new(registry, suite.run.keep_driver_on_error));
    let settings = OrchestratorSettings {
        parallelism,
        stop_on_error: suite.run.stop_on_error,
        locale: locale.to_string(),
    };
    let mut orchestrator = Orchestrator::new(settings, Arc::clone(&cache)).with_stop_token(stop_token);
    if suite.retry.enabled {
        orchestrator = orchestrator.with_failure_recorder(Arc::new(FailureRecorder::new(store.clone())));
    }

    let results = orchestrator.run(plan.ungrouped, plan.groups).await;
    let summary = RunSummary::from_results(&results);
    info!(
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        "run finished"
    );

    let reported = sink.accept(&results).context("Failed to report results");
    // Drivers kept open for inspection are closed only after reporting.
    cache.shutdown();
    reported?;

    if suite.retry.enabled && summary.failed == 0 && summary.skipped == 0 {
        if let Err(e) = store.clear() {
            warn!(error = %e, "failed to clear retry state");
        }
    }
    Ok(summary)
}

fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("\n{}", t!("shutdown_signal", locale = &locale).yellow());
                token_clone.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    token
}
