//! # Test Execution Planner Module / 测试执行计划模块
//!
//! Turns loaded definitions into scheduled work: selection, backend checks,
//! data expansion, retry resolution and sequencing, in that order. Every
//! configuration error surfaces here, before any instance runs.
//!
//! 将加载的定义转换为调度的工作：依次进行筛选、后端检查、数据展开、
//! 重试解析和序列编排。所有配置错误都会在此处、在任何实例运行之前暴露出来。

use std::sync::Arc;
use tracing::info;

use crate::core::data_source::DataLoader;
use crate::core::driver::DriverRegistry;
use crate::core::error::Result;
use crate::core::expander::Expander;
use crate::core::models::{InstanceId, TestCaseDefinition, TestCaseInstance};
use crate::core::retry::{self, RetryState};
use crate::core::selector::Selector;
use crate::core::sequencer::{self, SequenceGroup};

/// A persisted failure to resume from, with the configured steps back.
#[derive(Debug, Clone)]
pub struct ResumeRequest {
    pub state: RetryState,
    pub steps_back: usize,
}

/// Everything planning needs besides the definitions.
/// 除定义之外，计划所需的一切。
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub selector: &'a Selector,
    pub loader: &'a DataLoader,
    pub registry: &'a DriverRegistry,
    /// Data-row column holding an instance's external identifier.
    pub correlation_key: &'a str,
}

/// Represents a complete execution plan for a suite.
/// 表示一个套件的完整执行计划。
#[derive(Debug)]
pub struct ExecutionPlan {
    pub ungrouped: Vec<TestCaseInstance>,
    pub groups: Vec<SequenceGroup>,
    /// Definitions that passed selection.
    pub selected_count: usize,
    /// Definitions rejected by tags or coverage.
    pub filtered_count: usize,
    /// The instance that will resume mid-way, and the step it starts at.
    pub resumed: Option<(InstanceId, usize)>,
}

impl ExecutionPlan {
    pub fn instance_count(&self) -> usize {
        self.ungrouped.len() + self.groups.iter().map(SequenceGroup::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_count() == 0
    }
}

/// Creates an execution plan for the given definitions.
///
/// # Arguments
/// * `definitions` - All loaded definitions, in file order
/// * `ctx` - Selector, data loader, driver registry and correlation key
/// * `resume` - A previous failure to resume, if retry mode is on
///
/// # Returns
/// An `ExecutionPlan`, or the first configuration error found
pub fn plan_execution(
    definitions: &[Arc<TestCaseDefinition>],
    ctx: PlanContext<'_>,
    resume: Option<&ResumeRequest>,
) -> Result<ExecutionPlan> {
    let selected = ctx.selector.select(definitions);
    let filtered_count = definitions.len() - selected.len();

    for definition in &selected {
        ctx.registry.ensure_registered(definition.definition.backend)?;
    }

    let expander = Expander::new(ctx.loader, ctx.correlation_key, ctx.selector.is_coverage_mode());
    let mut instances = expander.expand_all(&selected)?;

    let resumed = match resume {
        Some(request) => retry::resolve(&mut instances, &request.state, request.steps_back)
            .map(|idx| (instances[idx].id.clone(), instances[idx].start_step)),
        None => None,
    };

    let sequenced = sequencer::group(instances)?;
    info!(
        selected = selected.len(),
        filtered = filtered_count,
        ungrouped = sequenced.ungrouped.len(),
        groups = sequenced.groups.len(),
        "execution planned"
    );

    Ok(ExecutionPlan {
        ungrouped: sequenced.ungrouped,
        groups: sequenced.groups,
        selected_count: selected.len(),
        filtered_count,
        resumed,
    })
}
