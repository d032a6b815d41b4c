//! # File System Operations Module / 文件系统操作模块
//!
//! Helpers for persisting run state.
//!
//! 用于持久化运行状态的工具。

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Writes `contents` to `path` atomically: the data goes to a temporary file
/// in the same directory, which is then renamed over the target. Readers see
/// either the old file or the new one, never a partial write.
///
/// 原子地将 `contents` 写入 `path`：数据先写入同目录下的临时文件，
/// 然后重命名覆盖目标文件。读取方只会看到旧文件或新文件，不会看到部分写入。
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    temp.write_all(contents)
        .context("Failed to write temporary file")?;
    temp.as_file()
        .sync_all()
        .context("Failed to flush temporary file")?;
    temp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
