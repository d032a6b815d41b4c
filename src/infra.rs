//! # Infrastructure Module / 基础设施模块
//!
//! This module provides infrastructure services for the runner:
//! atomic file writes, diagnostic logging and i18n support.
//!
//! 此模块为运行器提供基础设施服务：
//! 原子文件写入、诊断日志和国际化支持。

pub mod fs;
pub mod logging;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
