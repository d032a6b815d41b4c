//! # Sequencer Module / 序列编排模块
//!
//! Groups instances sharing a series prefix into ordered chains. A series
//! number has the form `<group>.<...>.<integer>`: everything before the last
//! `.` names the group, the trailing integer orders its members.
//!
//! 将共享序列前缀的实例分组为有序链。序列号的格式为
//! `<group>.<...>.<integer>`：最后一个 `.` 之前的部分为组名，
//! 末尾的整数决定组内成员的顺序。

use std::collections::HashMap;

use crate::core::error::{ConfigError, Result};
use crate::core::models::TestCaseInstance;

/// A parsed series number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingKey {
    pub group: String,
    pub ordinal: u64,
}

impl OrderingKey {
    pub fn parse(case: &str, key: &str) -> Result<Self> {
        let malformed = || ConfigError::MalformedOrderingKey {
            case: case.to_string(),
            key: key.to_string(),
        };
        let (group, ordinal) = key.trim().rsplit_once('.').ok_or_else(malformed)?;
        if group.is_empty() {
            return Err(malformed());
        }
        let ordinal = ordinal.trim().parse::<u64>().map_err(|_| malformed())?;
        Ok(Self {
            group: group.to_string(),
            ordinal,
        })
    }
}

/// Instances that must run in order, on one worker, as one unit of work.
/// 必须在同一个工作线程上按顺序作为一个工作单元运行的实例。
#[derive(Debug, Clone)]
pub struct SequenceGroup {
    pub name: String,
    pub instances: Vec<TestCaseInstance>,
}

impl SequenceGroup {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// The sequencer's output.
#[derive(Debug, Clone, Default)]
pub struct Sequenced {
    pub ungrouped: Vec<TestCaseInstance>,
    pub groups: Vec<SequenceGroup>,
}

/// Splits instances into ungrouped ones and sequence groups.
///
/// Groups appear in order of their first member; members are sorted by
/// ordinal, keeping input order for equal ordinals. Malformed keys fail here
/// rather than at run time.
///
/// 将实例拆分为未分组实例和序列组。格式错误的序列号在此处报错，而不是在运行时。
pub fn group(instances: Vec<TestCaseInstance>) -> Result<Sequenced> {
    let mut ungrouped = Vec::new();
    let mut order: Vec<String> = Vec::new();
    let mut members: HashMap<String, Vec<(u64, TestCaseInstance)>> = HashMap::new();

    for instance in instances {
        let Some(series) = instance.series() else {
            ungrouped.push(instance);
            continue;
        };
        let key = OrderingKey::parse(&instance.definition.name, series)?;
        let entry = members.entry(key.group.clone()).or_insert_with(|| {
            order.push(key.group.clone());
            Vec::new()
        });
        entry.push((key.ordinal, instance));
    }

    let groups = order
        .into_iter()
        .filter_map(|name| {
            let mut entries = members.remove(&name)?;
            entries.sort_by_key(|(ordinal, _)| *ordinal);
            Some(SequenceGroup {
                name,
                instances: entries.into_iter().map(|(_, instance)| instance).collect(),
            })
        })
        .collect();

    Ok(Sequenced { ungrouped, groups })
}
