//! # Core Module / 核心模块
//!
//! This module contains the execution engine: data models, configuration,
//! selection, data expansion, sequencing, driver affinity, retry resume and
//! the worker-pool orchestrator.
//!
//! 此模块包含执行引擎：数据模型、配置、筛选、数据展开、序列编排、
//! 驱动亲和、重试续跑以及工作线程池编排器。

pub mod config;
pub mod data_source;
pub mod driver;
pub mod error;
pub mod execution;
pub mod expander;
pub mod models;
pub mod noop;
pub mod orchestrator;
pub mod planner;
pub mod retry;
pub mod selector;
pub mod sequencer;

// Re-exports
pub use config::SuiteConfig;
pub use error::ConfigError;
pub use models::InstanceResult;
pub use orchestrator::Orchestrator;
