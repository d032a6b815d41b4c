//! # Data Source Module / 数据源模块
//!
//! Loads the parameter rows of a test case. A source reference is a tagged
//! string resolved against the configured backends:
//!
//! - `file:<path>`: delimited text (`.csv`, `.tsv`, `.txt`, ...) or a single
//!   JSON/TOML document
//! - `sql:<path>`: a file holding one statement, run against `[database]`
//! - `db:<statement>`: an inline statement, run against `[database]`
//! - `collector:<name>[:<argument>]`: a registered [`DataCollector`]
//!
//! 加载测试用例的参数行。数据源引用是一个带标签的字符串，
//! 根据配置的后端进行解析。

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::config::{DatabaseSettings, SuiteConfig};
use crate::core::error::{ConfigError, Result};
use crate::core::models::{DataRow, DataSource};

/// A parsed source reference.
/// 解析后的数据源引用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    File(PathBuf),
    Sql(PathBuf),
    Db(String),
    Collector { name: String, argument: String },
}

impl SourceRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (tag, rest) = raw
            .split_once(':')
            .ok_or_else(|| ConfigError::UnsupportedDataSource(raw.to_string()))?;
        let rest = rest.trim();
        match tag.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(SourceRef::File(PathBuf::from(rest))),
            "sql" => Ok(SourceRef::Sql(PathBuf::from(rest))),
            "db" => Ok(SourceRef::Db(rest.to_string())),
            "collector" => {
                let (name, argument) = rest.split_once(':').unwrap_or((rest, ""));
                Ok(SourceRef::Collector {
                    name: name.trim().to_string(),
                    argument: argument.trim().to_string(),
                })
            }
            _ => Err(ConfigError::UnsupportedDataSource(raw.to_string())),
        }
    }
}

/// Rows produced by a source. `repeat` means the caller must expand one
/// instance per row.
/// 数据源产生的行。`repeat` 表示调用方必须为每一行展开一个实例。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadedData {
    pub rows: Vec<DataRow>,
    pub repeat: bool,
}

impl LoadedData {
    fn tabular(rows: Vec<DataRow>) -> Self {
        let repeat = rows.len() > 1;
        Self { rows, repeat }
    }

    fn single(row: DataRow) -> Self {
        Self {
            rows: vec![row],
            repeat: false,
        }
    }
}

/// A pluggable producer of data rows, looked up by name.
/// 可插拔的数据行生产者，按名称查找。
pub trait DataCollector: Send + Sync {
    fn collect(&self, argument: &str) -> std::result::Result<Vec<DataRow>, String>;
}

pub type CollectorFactory = fn() -> Box<dyn DataCollector>;

/// Name to factory lookup table for data collectors.
/// 数据收集器的名称到工厂函数的查找表。
#[derive(Clone)]
pub struct CollectorRegistry {
    factories: HashMap<String, CollectorFactory>,
}

impl CollectorRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry holding the built-in `env` collector.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("env", env_collector);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: CollectorFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn DataCollector>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownCollector(name.to_string()))
    }
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("CollectorRegistry").field("collectors", &names).finish()
    }
}

fn env_collector() -> Box<dyn DataCollector> {
    Box::new(EnvCollector)
}

/// Collects the environment variables starting with the argument into one
/// row, with the prefix stripped from each key.
pub struct EnvCollector;

impl DataCollector for EnvCollector {
    fn collect(&self, prefix: &str) -> std::result::Result<Vec<DataRow>, String> {
        let row: DataRow = std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(prefix)
                    .filter(|k| !k.is_empty())
                    .map(|k| (k.to_string(), value))
            })
            .collect();
        Ok(vec![row])
    }
}

/// Resolves data sources against the configured directory, database and
/// collectors.
/// 根据配置的目录、数据库和收集器解析数据源。
#[derive(Debug, Clone)]
pub struct DataLoader {
    base_dir: PathBuf,
    delimiter: char,
    database: Option<DatabaseSettings>,
    collectors: CollectorRegistry,
}

impl DataLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            delimiter: ',',
            database: None,
            collectors: CollectorRegistry::with_builtins(),
        }
    }

    pub fn from_suite(suite: &SuiteConfig) -> Self {
        Self {
            base_dir: suite.data_dir(),
            delimiter: suite.data.delimiter,
            database: suite.database.clone(),
            collectors: CollectorRegistry::with_builtins(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_database(mut self, database: DatabaseSettings) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_collectors(mut self, collectors: CollectorRegistry) -> Self {
        self.collectors = collectors;
        self
    }

    pub fn collectors_mut(&mut self) -> &mut CollectorRegistry {
        &mut self.collectors
    }

    /// Loads the rows of a definition's data source.
    /// 加载定义的数据源中的行。
    pub fn load(&self, source: &DataSource) -> Result<LoadedData> {
        match source {
            DataSource::None => Ok(LoadedData::default()),
            DataSource::Inline(row) => Ok(LoadedData::single(row.clone())),
            DataSource::Reference(raw) => self.load_reference(raw),
        }
    }

    pub fn load_reference(&self, raw: &str) -> Result<LoadedData> {
        debug!(source = raw, "loading data source");
        match SourceRef::parse(raw)? {
            SourceRef::File(path) => self.load_file(raw, &self.resolve(&path)),
            SourceRef::Sql(path) => {
                let path = self.resolve(&path);
                let statement = read_file(&path)?;
                self.query(raw, statement.trim()).map(LoadedData::tabular)
            }
            SourceRef::Db(statement) => self.query(raw, &statement).map(LoadedData::tabular),
            SourceRef::Collector { name, argument } => {
                let collector = self.collectors.create(&name)?;
                collector
                    .collect(&argument)
                    .map(LoadedData::tabular)
                    .map_err(|message| ConfigError::Collector { name, message })
            }
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.base_dir.join(path)
        } else {
            path.to_path_buf()
        }
    }

    fn load_file(&self, raw: &str, path: &Path) -> Result<LoadedData> {
        let content = read_file(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => parse_json_document(path, &content).map(LoadedData::single),
            Some("toml") => parse_toml_document(path, &content).map(LoadedData::single),
            Some("tsv") => parse_delimited(&content, '\t', raw).map(LoadedData::tabular),
            _ => parse_delimited(&content, self.delimiter, raw).map(LoadedData::tabular),
        }
    }

    fn query(&self, source_ref: &str, statement: &str) -> Result<Vec<DataRow>> {
        let database = self
            .database
            .as_ref()
            .ok_or_else(|| ConfigError::MissingDatabase(source_ref.to_string()))?;

        match database.kind.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => {
                let conn = match &database.path {
                    Some(path) => Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY),
                    None => Connection::open_in_memory(),
                }
                .map_err(|source| ConfigError::Sql {
                    source_ref: source_ref.to_string(),
                    source,
                })?;
                query_rows(&conn, statement).map_err(|source| ConfigError::Sql {
                    source_ref: source_ref.to_string(),
                    source,
                })
            }
            other => Err(ConfigError::UnsupportedDatabase(other.to_string())),
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ConfigError::DataIo {
        path: path.to_path_buf(),
        source,
    })
}

fn query_rows(conn: &Connection, statement: &str) -> rusqlite::Result<Vec<DataRow>> {
    let mut stmt = conn.prepare(statement)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt
        .query_map([], |row| {
            let mut map = DataRow::new();
            for (i, column) in columns.iter().enumerate() {
                map.insert(column.clone(), value_to_string(row.get_ref(i)?));
            }
            Ok(map)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

/// Parses delimited text: the first significant line is the header, each
/// following line one row. Lines starting with `#` or `//` are comments, and
/// everything between a line starting with `/*` and a line ending with `*/`
/// is ignored. A row whose value count differs from the header is an error.
///
/// 解析分隔文本：第一个有效行是表头，之后每一行是一条数据。
/// 以 `#` 或 `//` 开头的行是注释，`/*` 与 `*/` 之间的所有行都会被忽略。
/// 值的数量与表头不一致的行会报错。
pub fn parse_delimited(content: &str, delimiter: char, source_ref: &str) -> Result<Vec<DataRow>> {
    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    let mut in_block = false;
    // Spreadsheet exports often start with a byte-order mark.
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if in_block {
            if trimmed.ends_with("*/") {
                in_block = false;
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("/*") {
            in_block = !rest.ends_with("*/");
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }

        let fields: Vec<String> = trimmed
            .split(delimiter)
            .map(|f| f.trim().to_string())
            .collect();

        match &header {
            None => header = Some(fields),
            Some(columns) => {
                if fields.len() != columns.len() {
                    return Err(ConfigError::MalformedRow {
                        source_ref: source_ref.to_string(),
                        line: idx + 1,
                        expected: columns.len(),
                        found: fields.len(),
                    });
                }
                rows.push(columns.iter().cloned().zip(fields).collect());
            }
        }
    }
    Ok(rows)
}

fn parse_json_document(path: &Path, content: &str) -> Result<DataRow> {
    let invalid = |message: String| ConfigError::InvalidDocument {
        path: path.to_path_buf(),
        message,
    };
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| invalid("expected a JSON object".to_string()))?;
    Ok(object
        .iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect())
}

fn parse_toml_document(path: &Path, content: &str) -> Result<DataRow> {
    let table: toml::Table = toml::from_str(content).map_err(|e| ConfigError::InvalidDocument {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(table
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}
