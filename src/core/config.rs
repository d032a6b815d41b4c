//! # Suite Configuration Module / 套件配置模块
//!
//! The suite file is a TOML document holding run settings and the test-case
//! definitions. Raw `serde` structures are validated into domain types here,
//! so an unknown backend type is rejected before anything runs.
//!
//! 套件文件是一个 TOML 文档，包含运行设置和测试用例定义。
//! 原始的 `serde` 结构在这里被校验并转换为领域类型，
//! 因此未知的后端类型会在任何运行之前被拒绝。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::ConfigError;
use crate::core::models::{BackendType, DataRow, DataSource, Step, TestCaseDefinition};

/// A single test case as written in the suite file.
/// 套件文件中书写的单个测试用例。
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CaseConfig {
    pub name: String,
    /// Backend type name, e.g. "web", "android", "rest" or "none".
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Series number, e.g. "checkout.2".
    #[serde(default)]
    pub series: Option<String>,
    /// Tagged data-source reference, e.g. "file:users.csv".
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub coverage_ids: Vec<String>,
    /// An inline document used as the single data row.
    #[serde(default)]
    pub inline_data: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// `[run]` section / `[run]` 配置节
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RunSettings {
    /// When false the run is strictly sequential.
    #[serde(default)]
    pub multi_threading: bool,
    #[serde(default)]
    pub parallelism: Option<usize>,
    #[serde(default)]
    pub stop_on_error: bool,
    /// Keep a worker's drivers open when its last instance failed.
    #[serde(default)]
    pub keep_driver_on_error: bool,
}

/// `[retry]` section / `[retry]` 配置节
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub steps_back: usize,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            steps_back: 0,
            state_dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".case-runner")
}

/// `[filter]` section / `[filter]` 配置节
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FilterSettings {
    /// `+Tag` includes, `-Tag` excludes. A bare tag counts as an include.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `[coverage]` section / `[coverage]` 配置节
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoverageSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub selected: Vec<String>,
    /// The data-row column carrying an instance's external identifier.
    #[serde(default = "default_correlation_key")]
    pub correlation_key: String,
}

impl Default for CoverageSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            selected: Vec::new(),
            correlation_key: default_correlation_key(),
        }
    }
}

fn default_correlation_key() -> String {
    "case_id".to_string()
}

/// `[data]` section / `[data]` 配置节
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataSettings {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Directory relative data-source paths resolve against. Defaults to the
    /// directory holding the suite file.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            base_dir: None,
        }
    }
}

fn default_delimiter() -> char {
    ','
}

/// `[database]` section: the connection used by `sql:` and `db:` sources.
/// `[database]` 配置节：`sql:` 和 `db:` 数据源使用的连接。
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DatabaseSettings {
    pub kind: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Database file, for file-backed kinds such as sqlite.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Represents the entire suite file.
/// 代表整个套件文件。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SuiteConfig {
    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    /// 运行器输出消息的语言（例如 "en", "zh-CN"）。
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub filter: FilterSettings,
    #[serde(default)]
    pub coverage: CoverageSettings,
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    #[serde(default)]
    pub cases: Vec<CaseConfig>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            run: RunSettings::default(),
            retry: RetrySettings::default(),
            filter: FilterSettings::default(),
            coverage: CoverageSettings::default(),
            data: DataSettings::default(),
            database: None,
            cases: Vec::new(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

impl SuiteConfig {
    /// Reads and parses a suite file. Relative paths inside it (data base
    /// directory, retry state directory, database file) are resolved against
    /// the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite file: {}", path.display()))?;
        let mut suite: SuiteConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse suite file: {}", path.display()))?;

        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        suite.resolve_paths(&root);
        Ok(suite)
    }

    fn resolve_paths(&mut self, root: &Path) {
        let base = match self.data.base_dir.take() {
            Some(dir) if dir.is_relative() => root.join(dir),
            Some(dir) => dir,
            None => root.to_path_buf(),
        };
        self.data.base_dir = Some(base);

        if self.retry.state_dir.is_relative() {
            self.retry.state_dir = root.join(&self.retry.state_dir);
        }
        if let Some(db_path) = self.database.as_mut().and_then(|db| db.path.as_mut()) {
            if db_path.is_relative() {
                *db_path = root.join(&*db_path);
            }
        }
    }

    /// The effective worker count: 1 when multi-threading is disabled.
    /// 实际的工作线程数：禁用多线程时为 1。
    pub fn effective_parallelism(&self) -> usize {
        if !self.run.multi_threading {
            return 1;
        }
        self.run
            .parallelism
            .unwrap_or_else(|| num_cpus::get() / 2 + 1)
            .max(1)
    }

    /// Directory that relative data-source paths resolve against.
    pub fn data_dir(&self) -> PathBuf {
        self.data
            .base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Converts the raw case entries into validated definitions.
    /// 将原始用例条目转换为经过校验的定义。
    pub fn definitions(&self, source: &Path) -> std::result::Result<Vec<Arc<TestCaseDefinition>>, ConfigError> {
        self.cases
            .iter()
            .map(|case| case.to_definition(source).map(Arc::new))
            .collect()
    }
}

impl CaseConfig {
    pub fn to_definition(&self, source: &Path) -> std::result::Result<TestCaseDefinition, ConfigError> {
        let backend = match &self.backend {
            Some(name) => name.parse::<BackendType>()?,
            None => BackendType::None,
        };
        let data = match (&self.data, &self.inline_data) {
            (Some(reference), _) => DataSource::Reference(reference.clone()),
            (None, Some(doc)) => DataSource::Inline(DataRow::clone(doc)),
            (None, None) => DataSource::None,
        };
        Ok(TestCaseDefinition {
            name: self.name.clone(),
            steps: self.steps.clone(),
            tags: self.tags.clone(),
            series: self.series.clone(),
            data,
            backend,
            source: source.to_path_buf(),
            coverage_ids: self.coverage_ids.clone(),
        })
    }
}
