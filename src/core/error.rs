//! # Error Taxonomy Module / 错误分类模块
//!
//! Fatal setup errors abort a run before any instance is scheduled. Everything
//! that goes wrong after scheduling is recorded in the instance results instead.
//!
//! 致命的配置错误会在调度任何实例之前中止运行。
//! 调度之后发生的错误都会记录在实例结果中。

use std::path::PathBuf;
use thiserror::Error;

use crate::core::models::BackendType;

/// Errors that abort a run before scheduling.
/// 在调度之前中止运行的错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An ordering key without a `.` separator or with a non-numeric tail.
    #[error("case '{case}': malformed series number '{key}' (expected '<group>.<integer>')")]
    MalformedOrderingKey { case: String, key: String },

    #[error("unsupported data source '{0}' (expected file:, sql:, db: or collector:)")]
    UnsupportedDataSource(String),

    #[error("no data collector registered under '{0}'")]
    UnknownCollector(String),

    #[error("data collector '{name}' failed: {message}")]
    Collector { name: String, message: String },

    #[error("unsupported backend type '{0}'")]
    UnsupportedBackend(String),

    #[error("no driver provider registered for backend '{0}'")]
    MissingProvider(BackendType),

    #[error("unsupported database type '{0}'")]
    UnsupportedDatabase(String),

    #[error("data source '{0}' needs a [database] section")]
    MissingDatabase(String),

    /// External selection is active but nothing was selected.
    #[error("coverage mode is enabled but the selection list is empty")]
    EmptySelection,

    #[error("{source_ref}:{line}: expected {expected} values, found {found}")]
    MalformedRow {
        source_ref: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("failed to read data source {path}: {source}")]
    DataIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("data document {path} is not a flat table: {message}")]
    InvalidDocument { path: PathBuf, message: String },

    #[error("query for data source '{source_ref}' failed: {source}")]
    Sql {
        source_ref: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// Result alias for setup operations / 配置阶段操作的结果别名
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised by a driver provider while it is being created or torn down.
/// 驱动提供者在创建或销毁时产生的错误。
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("driver initialization failed: {0}")]
    Initialization(String),

    #[error("driver teardown failed: {0}")]
    Teardown(String),
}
