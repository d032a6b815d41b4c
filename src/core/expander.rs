//! # Instance Expansion Module / 实例展开模块
//!
//! Turns a selected definition plus its data rows into independent, runnable
//! instances: one per row when the data source repeats, otherwise exactly one.
//!
//! 将选中的定义及其数据行转换为独立的可运行实例：
//! 数据源需要重复时每行一个实例，否则恰好一个。

use tracing::trace;

use crate::core::data_source::{DataLoader, LoadedData};
use crate::core::error::Result;
use crate::core::models::{InstanceId, SelectedDefinition, TestCaseInstance};

/// Expands definitions using a [`DataLoader`].
/// 使用 [`DataLoader`] 展开定义。
#[derive(Debug)]
pub struct Expander<'a> {
    loader: &'a DataLoader,
    correlation_key: String,
    coverage_mode: bool,
}

impl<'a> Expander<'a> {
    pub fn new(loader: &'a DataLoader, correlation_key: impl Into<String>, coverage_mode: bool) -> Self {
        Self {
            loader,
            correlation_key: correlation_key.into(),
            coverage_mode,
        }
    }

    pub fn expand(&self, selected: &SelectedDefinition) -> Result<Vec<TestCaseInstance>> {
        let loaded = self.loader.load(&selected.definition.data)?;
        Ok(expand_rows(selected, loaded, &self.correlation_key, self.coverage_mode))
    }

    /// Expands every definition, keeping definition order and row order.
    pub fn expand_all(&self, selected: &[SelectedDefinition]) -> Result<Vec<TestCaseInstance>> {
        let mut instances = Vec::new();
        for definition in selected {
            instances.extend(self.expand(definition)?);
        }
        Ok(instances)
    }
}

/// Binds already loaded rows to a definition.
///
/// Without `repeat` a single instance is produced; it inherits the first of
/// the definition's matched identifiers. With `repeat`, each row becomes one
/// instance identified by its 1-based row index. In coverage mode a repeated
/// row must carry the correlation key with a value the definition matched,
/// otherwise the row is out of scope and dropped.
///
/// 将已加载的行绑定到定义上。覆盖模式下，重复行必须携带关联键，
/// 且其值属于定义匹配到的标识符，否则该行超出范围并被丢弃。
pub fn expand_rows(
    selected: &SelectedDefinition,
    loaded: LoadedData,
    correlation_key: &str,
    coverage_mode: bool,
) -> Vec<TestCaseInstance> {
    let definition = &selected.definition;

    if !loaded.repeat {
        let row = loaded.rows.into_iter().next();
        let correlation_id = selected
            .matched_ids
            .iter()
            .next()
            .cloned()
            .or_else(|| row.as_ref().and_then(|r| r.get(correlation_key).cloned()));
        return vec![TestCaseInstance {
            id: InstanceId::new(definition.name.clone(), None),
            definition: definition.clone(),
            row,
            correlation_id,
            start_step: 0,
        }];
    }

    loaded
        .rows
        .into_iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            let correlation_id = row.get(correlation_key).cloned();
            if coverage_mode {
                let in_scope = correlation_id
                    .as_ref()
                    .is_some_and(|id| selected.matched_ids.contains(id));
                if !in_scope {
                    trace!(
                        case = %definition.name,
                        row = idx + 1,
                        correlation = ?correlation_id,
                        "dropping data row outside the selected coverage"
                    );
                    return None;
                }
            }
            Some(TestCaseInstance {
                id: InstanceId::new(definition.name.clone(), Some(format!("#{}", idx + 1))),
                definition: definition.clone(),
                row: Some(row),
                correlation_id,
                start_step: 0,
            })
        })
        .collect()
}
