//! # Retry Resume Module / 重试续跑模块
//!
//! Persists which instance failed and at which step, so the next run can
//! resume that instance a configured number of steps before the failure.
//!
//! The record is a small versioned JSON document:
//!
//! ```json
//! { "version": 1, "instance": { "definition": "login", "discriminator": "#2" }, "step_index": 4 }
//! ```
//!
//! It is written atomically (temp file + rename) and read once at startup.
//! A record whose instance is not part of the new run is ignored.
//!
//! 持久化失败的实例及其失败步骤，使下一次运行能够在失败步骤之前
//! 配置的步数处续跑该实例。记录以原子方式写入，并在启动时读取一次。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::core::models::{InstanceId, TestCaseInstance};
use crate::infra::fs::write_atomic;

pub const RETRY_STATE_VERSION: u32 = 1;

/// The persisted failure position.
/// 持久化的失败位置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    pub version: u32,
    pub instance: InstanceId,
    pub step_index: usize,
}

impl RetryState {
    pub fn new(instance: InstanceId, step_index: usize) -> Self {
        Self {
            version: RETRY_STATE_VERSION,
            instance,
            step_index,
        }
    }

    /// The step to resume at, never below zero.
    pub fn resume_step(&self, steps_back: usize) -> usize {
        self.step_index.saturating_sub(steps_back)
    }
}

/// Reads and writes the retry record inside a state directory.
/// 在状态目录中读写重试记录。
#[derive(Debug, Clone)]
pub struct RetryStore {
    path: PathBuf,
}

impl RetryStore {
    pub const FILE_NAME: &'static str = "retry-state.json";

    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(Self::FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record. Missing, unreadable or unknown-version records all
    /// read as `None`; only the latter two are worth a warning.
    pub fn read(&self) -> Option<RetryState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read retry state");
                return None;
            }
        };
        match serde_json::from_str::<RetryState>(&content) {
            Ok(state) if state.version == RETRY_STATE_VERSION => Some(state),
            Ok(state) => {
                warn!(version = state.version, "ignoring retry state with unknown version");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring malformed retry state");
                None
            }
        }
    }

    pub fn write(&self, state: &RetryState) -> Result<()> {
        let json = serde_json::to_string_pretty(state).context("Failed to serialize retry state")?;
        write_atomic(&self.path, json.as_bytes())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

/// Marks the instance named by `state` to start at
/// `max(0, step_index - steps_back)`. Returns its position in `instances`, or
/// `None` when the instance is not part of this run, which is not an error.
/// A resume step past the instance's last step means the definition changed
/// since the failure; the record is stale and the instance runs from step 0.
///
/// 将 `state` 指定的实例标记为从 `max(0, step_index - steps_back)` 开始。
/// 如果该实例不在本次运行中，则返回 `None`，这不是错误。
/// 如果续跑步骤超出了实例的最后一步，记录已过期，实例从第 0 步开始运行。
pub fn resolve(instances: &mut [TestCaseInstance], state: &RetryState, steps_back: usize) -> Option<usize> {
    let position = instances.iter().position(|i| i.id == state.instance);
    match position {
        Some(idx) => {
            let start = state.resume_step(steps_back);
            let step_count = instances[idx].definition.steps.len();
            if start >= step_count {
                warn!(
                    instance = %state.instance,
                    start,
                    steps = step_count,
                    "ignoring stale retry state: resume step is past the last step"
                );
                return None;
            }
            instances[idx].start_step = start;
            info!(instance = %state.instance, start, "resuming previously failed instance");
            Some(idx)
        }
        None => {
            debug!(instance = %state.instance, "previously failed instance not in this run");
            None
        }
    }
}

/// Writes the retry record for the first failure of a run only. Workers race
/// on an atomic latch; the winner writes, everyone else is a no-op.
///
/// 只为一次运行中的第一个失败写入重试记录。工作线程竞争一个原子锁存器，
/// 获胜者写入，其他线程不做任何事。
#[derive(Debug)]
pub struct FailureRecorder {
    store: RetryStore,
    written: AtomicBool,
}

impl FailureRecorder {
    pub fn new(store: RetryStore) -> Self {
        Self {
            store,
            written: AtomicBool::new(false),
        }
    }

    /// Returns true if this call wrote the record.
    pub fn record(&self, instance: &InstanceId, step_index: usize) -> bool {
        if self
            .written
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let state = RetryState::new(instance.clone(), step_index);
        match self.store.write(&state) {
            Ok(()) => {
                debug!(%instance, step_index, "retry state written");
                true
            }
            Err(e) => {
                warn!(%instance, error = %e, "failed to persist retry state");
                false
            }
        }
    }

    pub fn has_recorded(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    pub fn store(&self) -> &RetryStore {
        &self.store
    }
}
