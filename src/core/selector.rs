//! # Selection Module / 筛选模块
//!
//! Decides which definitions are in scope for a run, from `+Tag` / `-Tag`
//! filters and, in coverage mode, an externally supplied list of selected
//! identifiers.
//!
//! 根据 `+Tag` / `-Tag` 过滤器以及（在覆盖模式下）外部提供的
//! 选中标识符列表，决定哪些定义属于本次运行的范围。

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::core::error::{ConfigError, Result};
use crate::core::models::{SelectedDefinition, TestCaseDefinition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagRule {
    Include(String),
    Exclude(String),
}

impl TagRule {
    /// `-X` excludes, `+X` or a bare `X` includes.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(tag) = raw.strip_prefix('-') {
            let tag = tag.trim();
            (!tag.is_empty()).then(|| TagRule::Exclude(tag.to_string()))
        } else {
            let tag = raw.strip_prefix('+').unwrap_or(raw).trim();
            (!tag.is_empty()).then(|| TagRule::Include(tag.to_string()))
        }
    }
}

/// An ordered list of include/exclude rules.
/// 有序的包含/排除规则列表。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    rules: Vec<TagRule>,
}

impl TagFilter {
    pub fn parse<S: AsRef<str>>(tags: &[S]) -> Self {
        Self {
            rules: tags.iter().filter_map(|t| TagRule::parse(t.as_ref())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Checks a definition's tags against the filter. Any matching exclude
    /// rule disqualifies the definition, whatever include rules also match.
    /// With no include rules, everything not excluded passes.
    pub fn matches<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let tags: BTreeSet<&str> = tags.iter().map(|t| normalize_tag(t.as_ref())).collect();

        let mut has_includes = false;
        let mut included = false;
        for rule in &self.rules {
            match rule {
                TagRule::Exclude(tag) if tags.contains(tag.as_str()) => return false,
                TagRule::Exclude(_) => {}
                TagRule::Include(tag) => {
                    has_includes = true;
                    included |= tags.contains(tag.as_str());
                }
            }
        }
        !has_includes || included
    }
}

fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix('+').unwrap_or(tag)
}

/// Combines the tag filter with the optional external selection.
/// 将标签过滤器与可选的外部选择结合起来。
#[derive(Debug, Clone, Default)]
pub struct Selector {
    tags: TagFilter,
    selection: Option<BTreeSet<String>>,
}

impl Selector {
    /// `selection` is `Some` when coverage mode is active. An empty selection
    /// in that mode is a fatal configuration error.
    pub fn new<S: AsRef<str>>(tags: &[S], selection: Option<Vec<String>>) -> Result<Self> {
        let selection = match selection {
            Some(ids) => {
                let ids: BTreeSet<String> = ids
                    .into_iter()
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .collect();
                if ids.is_empty() {
                    return Err(ConfigError::EmptySelection);
                }
                Some(ids)
            }
            None => None,
        };
        Ok(Self {
            tags: TagFilter::parse(tags),
            selection,
        })
    }

    pub fn is_coverage_mode(&self) -> bool {
        self.selection.is_some()
    }

    /// The definition's external identifiers that appear in the selection.
    /// Empty outside coverage mode.
    pub fn matched_ids(&self, definition: &TestCaseDefinition) -> BTreeSet<String> {
        match &self.selection {
            Some(selected) => definition
                .coverage_ids
                .iter()
                .filter(|id| selected.contains(id.as_str()))
                .cloned()
                .collect(),
            None => BTreeSet::new(),
        }
    }

    pub fn should_run(&self, definition: &TestCaseDefinition) -> bool {
        if !self.tags.matches(&definition.tags) {
            return false;
        }
        !self.is_coverage_mode() || !self.matched_ids(definition).is_empty()
    }

    /// Filters the definitions, keeping the matched identifiers of each one
    /// for later instance correlation. Input order is preserved.
    /// 过滤定义，并为每个定义保留匹配到的标识符以供后续实例关联。保持输入顺序。
    pub fn select(&self, definitions: &[Arc<TestCaseDefinition>]) -> Vec<SelectedDefinition> {
        definitions
            .iter()
            .filter(|def| {
                let keep = self.should_run(def);
                if !keep {
                    debug!(case = %def.name, "definition filtered out");
                }
                keep
            })
            .map(|def| SelectedDefinition {
                definition: Arc::clone(def),
                matched_ids: self.matched_ids(def),
            })
            .collect()
    }
}
