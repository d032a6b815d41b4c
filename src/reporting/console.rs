//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints run results to the console with colour coding and
//! internationalization support.
//!
//! 此模块在控制台打印运行结果，支持颜色编码和国际化。

use anyhow::Result;
use colored::*;

use crate::core::models::{InstanceResult, InstanceStatus, SkipReason, StepStatus};
use crate::infra::t;
use crate::reporting::{ResultSink, RunSummary};

/// Prints a formatted summary of instance results to the console.
///
/// 在控制台打印格式化的实例结果摘要。
///
/// # Output Format / 输出格式
/// ```text
/// --- Run Summary ---
///   - Status           | Instance                                 | Worker     |   Duration
///   - Passed           | login[#1]                                | worker-0   |      1.23s
///   - Failed           | checkout                                 | worker-1   |      0.45s  (resumed at step 2)
///   - Skipped          | checkout.confirm                         | -          |        N/A
/// ```
pub fn print_summary(results: &[InstanceResult], locale: &str) {
    println!("\n{}", t!("summary_banner", locale = locale).bold());

    let mut sorted: Vec<&InstanceResult> = results.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    for result in sorted {
        let status_str = result.get_status_str(locale);
        let duration_str = result
            .get_duration()
            .map(|d| format!("{:.2?}", d))
            .unwrap_or_else(|| "N/A".to_string());
        let worker_str = result
            .worker
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string());
        let note = match (&result.status, result.resumed_from) {
            (InstanceStatus::Skipped { reason: SkipReason::StopOnError }, _) => {
                format!(" ({})", t!("report.note_stop_on_error", locale = locale))
            }
            (InstanceStatus::Skipped { reason: SkipReason::Interrupted }, _) => {
                format!(" ({})", t!("report.note_interrupted", locale = locale))
            }
            (_, Some(step)) => format!(" ({})", t!("report.note_resumed", locale = locale, step = step)),
            _ => String::new(),
        };

        let status_colored = match result.status {
            InstanceStatus::Passed => status_str.green(),
            InstanceStatus::Failed { .. } => status_str.red(),
            InstanceStatus::Skipped { .. } => status_str.dimmed(),
        };

        println!(
            "  - {:<18} | {:<40} | {:<10} | {:>10}{}",
            status_colored,
            result.case_name(),
            worker_str,
            duration_str,
            note
        );
    }

    let summary = RunSummary::from_results(results);
    println!(
        "\n{}",
        t!(
            "summary_counts",
            locale = locale,
            total = summary.total(),
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped
        )
    );
}

/// Prints the failing step and its message for every failed instance.
///
/// 打印每个失败实例的失败步骤及其消息。
pub fn print_failure_details(results: &[InstanceResult], locale: &str) {
    let failures: Vec<_> = results.iter().filter(|r| r.is_failure()).collect();
    if failures.is_empty() {
        return;
    }

    println!("\n{}", t!("failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, result) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}'",
            i + 1,
            failures.len(),
            t!("report_header_failure", locale = locale).red(),
            result.case_name().cyan()
        );
        if let Some(id) = &result.correlation_id {
            println!("  {}: {}", t!("report.correlation", locale = locale), id);
        }
        if let Some(message) = result.failure_message() {
            println!("\n  {}", message);
        }
        for step in &result.steps {
            let marker = match step.status {
                StepStatus::Passed => "+".green(),
                StepStatus::Failed => "x".red(),
                StepStatus::Skipped => "~".dimmed(),
                StepStatus::NotRun => "-".dimmed(),
            };
            println!("    {} [{}] {}", marker, step.index, step.name);
        }
        println!("\n{}", "-".repeat(80));
    }
}

/// Prints the summary, then details for failures.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    locale: String,
}

impl ConsoleSink {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
        }
    }
}

impl ResultSink for ConsoleSink {
    fn accept(&mut self, results: &[InstanceResult]) -> Result<()> {
        print_summary(results, &self.locale);
        print_failure_details(results, &self.locale);
        Ok(())
    }
}
