//! # Case Runner Library / Case Runner 库
//!
//! This library provides the core functionality for Case Runner, a
//! data-driven test-case runner. Definitions are read from a suite file,
//! filtered by tags or a coverage selection, expanded against their data
//! sources and executed on a bounded worker pool with one automation driver
//! per worker and backend.
//!
//! 此库为 Case Runner 提供核心功能，这是一个数据驱动的测试用例运行器。
//! 定义从套件文件中读取，按标签或覆盖选择进行筛选，根据数据源展开，
//! 并在有界工作线程池上执行，每个工作线程和后端对应一个自动化驱动。
//!
//! ## Modules / 模块
//!
//! - `core` - Data models, planning and the execution engine
//! - `infra` - Logging and file system helpers
//! - `reporting` - Result sinks and console output
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 数据模型、计划和执行引擎
//! - `infra` - 日志和文件系统工具
//! - `reporting` - 结果输出端和控制台输出
//! - `cli` - 命令行接口和命令

pub mod core;
pub mod infra;
pub mod reporting;
pub mod cli;

// Re-export commonly used items
pub use core::models;
pub use core::config;
pub use core::execution;

/// Picks the best available locale for `requested`.
///
/// The full locale (e.g., "zh-CN") is tried first, then just the language
/// code (e.g., "en" from "en-US"), and finally the default language ("en").
pub fn match_locale(requested: &str) -> &'static str {
    let available_locales = rust_i18n::available_locales!();

    let found = available_locales
        .iter()
        .find(|l| l.eq_ignore_ascii_case(requested))
        .or_else(|| {
            let lang_code = requested.split(['-', '_']).next().unwrap_or_default();
            available_locales.iter().find(|l| l.eq_ignore_ascii_case(lang_code))
        });

    match found {
        Some(&locale) => locale,
        None => "en",
    }
}

/// Initializes the application's internationalization (i18n) based on the system locale.
///
/// Returns the locale that was set.
pub fn init() -> &'static str {
    // Fallback to "en" if detection fails.
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    let lang = match_locale(&locale);
    rust_i18n::set_locale(lang);
    lang
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
