//! # Reporting Module / 报告模块
//!
//! Results are handed to a [`ResultSink`] once a run completes. The built-in
//! sink prints a colourful, localised summary to the console; report writers
//! and test-management sync plug in through the same trait.
//!
//! 运行完成后，结果会交给 [`ResultSink`]。内置的输出端在控制台打印
//! 彩色的本地化摘要；报告生成器和测试管理同步通过同一个 trait 接入。

pub mod console;

use anyhow::Result;

use crate::core::models::InstanceResult;

// Re-export common reporting functions
pub use console::{print_failure_details, print_summary, ConsoleSink};

/// Receives the results of a finished run.
pub trait ResultSink {
    fn accept(&mut self, results: &[InstanceResult]) -> Result<()>;
}

/// Pass/fail/skip counts for a run.
/// 一次运行的通过/失败/跳过计数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_results(results: &[InstanceResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            if r.is_passed() {
                acc.passed += 1;
            } else if r.is_failure() {
                acc.failed += 1;
            } else {
                acc.skipped += 1;
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}
