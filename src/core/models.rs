//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout the runner:
//! test-case definitions, data rows, runnable instances and their results.
//!
//! 此模块定义了整个运行器中使用的核心数据结构：
//! 测试用例定义、数据行、可运行实例及其结果。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::ConfigError;
use crate::infra::t;

/// One parameter set, keyed by field name.
/// 一组参数，以字段名为键。
pub type DataRow = BTreeMap<String, String>;

/// The automation backend a test case is driven through.
/// 测试用例所使用的自动化后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Web,
    Ios,
    Android,
    Rest,
    None,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Web => "web",
            BackendType::Ios => "ios",
            BackendType::Android => "android",
            BackendType::Rest => "rest",
            BackendType::None => "none",
        }
    }
}

impl FromStr for BackendType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" | "browser" => Ok(BackendType::Web),
            "ios" => Ok(BackendType::Ios),
            "android" => Ok(BackendType::Android),
            "rest" | "api" => Ok(BackendType::Rest),
            "none" | "noop" | "" => Ok(BackendType::None),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step of a test case. Parameters may reference data-row fields
/// with `${field}` placeholders.
/// 测试用例的单个步骤。参数可以通过 `${field}` 占位符引用数据行字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub name: Option<String>,
    pub action: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Step {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            name: None,
            action: action.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The name shown in reports, falling back to the action.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.action)
    }
}

/// Where a definition's parameter rows come from.
/// 定义的参数行的来源。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DataSource {
    /// No data; the case runs once without a row.
    #[default]
    None,
    /// A single inline document.
    Inline(DataRow),
    /// A tagged reference such as `file:users.csv` or `sql:query.sql`.
    Reference(String),
}

/// Immutable, parsed description of one test case.
/// 单个测试用例的不可变解析描述。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseDefinition {
    pub name: String,
    pub steps: Vec<Step>,
    /// Meta tags used for include/exclude filtering / 用于包含/排除过滤的元标签
    pub tags: Vec<String>,
    /// Optional series number, `<group>.<integer>` / 可选的序列号
    pub series: Option<String>,
    pub data: DataSource,
    pub backend: BackendType,
    /// The suite file the definition was loaded from / 定义所在的套件文件
    pub source: PathBuf,
    /// Identifiers this case maps to in the external test-management system.
    pub coverage_ids: Vec<String>,
}

impl TestCaseDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            tags: Vec::new(),
            series: None,
            data: DataSource::None,
            backend: BackendType::None,
            source: PathBuf::new(),
            coverage_ids: Vec::new(),
        }
    }
}

/// A definition that passed selection, together with the external
/// identifiers it matched.
/// 通过筛选的定义，以及它匹配到的外部标识符。
#[derive(Debug, Clone)]
pub struct SelectedDefinition {
    pub definition: Arc<TestCaseDefinition>,
    pub matched_ids: BTreeSet<String>,
}

impl SelectedDefinition {
    pub fn unmatched(definition: Arc<TestCaseDefinition>) -> Self {
        Self {
            definition,
            matched_ids: BTreeSet::new(),
        }
    }
}

/// Stable identity of an instance across runs: definition name plus a
/// data-row discriminator.
/// 实例跨运行的稳定标识：定义名加上数据行区分符。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId {
    pub definition: String,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl InstanceId {
    pub fn new(definition: impl Into<String>, discriminator: Option<String>) -> Self {
        Self {
            definition: definition.into(),
            discriminator,
        }
    }
}

impl InstanceId {
    /// The 1-based data-row index of a repeated instance (`#n`).
    pub fn row_index(&self) -> Option<usize> {
        self.discriminator.as_deref()?.strip_prefix('#')?.parse().ok()
    }
}

/// Orders by definition name, then numerically by row index, so `#2` sorts
/// before `#10`.
/// 按定义名排序，然后按数据行索引的数值排序。
impl Ord for InstanceId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.definition
            .cmp(&other.definition)
            .then_with(|| self.row_index().cmp(&other.row_index()))
            .then_with(|| self.discriminator.cmp(&other.discriminator))
    }
}

impl PartialOrd for InstanceId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.discriminator {
            Some(d) => write!(f, "{}[{}]", self.definition, d),
            None => f.write_str(&self.definition),
        }
    }
}

/// One concrete, runnable unit: a definition bound to at most one data row.
/// 一个具体的可运行单元：绑定了至多一个数据行的定义。
#[derive(Debug, Clone)]
pub struct TestCaseInstance {
    pub id: InstanceId,
    pub definition: Arc<TestCaseDefinition>,
    pub row: Option<DataRow>,
    /// External correlation identifier, used by test-management sync.
    pub correlation_id: Option<String>,
    /// First step to execute; non-zero only when resuming a failed run.
    pub start_step: usize,
}

impl TestCaseInstance {
    pub fn series(&self) -> Option<&str> {
        self.definition.series.as_deref()
    }

    pub fn backend(&self) -> BackendType {
        self.definition.backend
    }
}

/// Identity of a worker in the pool. Workers are numbered from zero.
/// 工作线程在池中的标识，从零开始编号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Passed,
    Failed,
    /// Skipped because the instance resumed past it.
    Skipped,
    /// Never reached because an earlier step failed.
    NotRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
    pub duration: Duration,
    pub output: String,
}

/// Enumerates the possible reasons for an instance failure.
/// 枚举实例失败的可能原因。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum FailureReason {
    /// A step reported a failure / 某个步骤报告失败
    StepFailed,
    /// The worker could not obtain a driver for the backend / 工作线程无法获取后端驱动
    DriverUnavailable,
}

/// Why an instance was never executed.
/// 实例未被执行的原因。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum SkipReason {
    /// An earlier member of the same series failed with stop-on-error set.
    StopOnError,
    /// The run was interrupted before the instance started.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InstanceStatus {
    Passed,
    Failed { reason: FailureReason, message: String },
    Skipped { reason: SkipReason },
}

/// Represents the final result of a single instance execution.
/// 表示单个实例执行的最终结果。
#[derive(Debug, Clone, Serialize)]
pub struct InstanceResult {
    pub id: InstanceId,
    pub correlation_id: Option<String>,
    pub backend: BackendType,
    /// Sequence group the instance belonged to, if any.
    pub group: Option<String>,
    /// The worker that handled the instance; `None` if it never reached one.
    pub worker: Option<WorkerId>,
    pub status: InstanceStatus,
    pub steps: Vec<StepResult>,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub failed_step: Option<usize>,
    /// Step index the instance resumed from after a previous failure.
    pub resumed_from: Option<usize>,
}

impl InstanceResult {
    /// Builds the result for an instance that was never executed.
    pub fn skipped(instance: &TestCaseInstance, group: Option<String>, reason: SkipReason) -> Self {
        Self {
            id: instance.id.clone(),
            correlation_id: instance.correlation_id.clone(),
            backend: instance.backend(),
            group,
            worker: None,
            status: InstanceStatus::Skipped { reason },
            steps: Vec::new(),
            duration: Duration::ZERO,
            started_at: Utc::now(),
            failed_step: None,
            resumed_from: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, InstanceStatus::Failed { .. })
    }

    pub fn is_passed(&self) -> bool {
        matches!(self.status, InstanceStatus::Passed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, InstanceStatus::Skipped { .. })
    }

    /// Gets the display name of the instance.
    /// 获取实例的显示名称。
    pub fn case_name(&self) -> String {
        self.id.to_string()
    }

    /// Gets the status of the result as a localised string for display.
    /// 以本地化字符串形式获取结果状态以供显示。
    pub fn get_status_str(&self, locale: &str) -> String {
        match &self.status {
            InstanceStatus::Passed => t!("report.status_passed", locale = locale).to_string(),
            InstanceStatus::Failed { reason, .. } => match reason {
                FailureReason::StepFailed => t!("report.status_failed", locale = locale).to_string(),
                FailureReason::DriverUnavailable => {
                    t!("report.status_driver_unavailable", locale = locale).to_string()
                }
            },
            InstanceStatus::Skipped { .. } => t!("report.status_skipped", locale = locale).to_string(),
        }
    }

    /// Gets the duration of the instance. Returns None if it never ran.
    /// 获取实例的持续时间。如果从未运行，则返回 None。
    pub fn get_duration(&self) -> Option<Duration> {
        match self.status {
            InstanceStatus::Skipped { .. } => None,
            _ => Some(self.duration),
        }
    }

    /// The failure message, if any.
    pub fn failure_message(&self) -> Option<&str> {
        match &self.status {
            InstanceStatus::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for InstanceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.id, self.status)
    }
}
