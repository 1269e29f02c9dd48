//! 重试列表写入服务 - 业务能力层
//!
//! 把一次运行中失败的任务 ID 写入文件，每行一个，便于作为新一轮运行重新提交。

use crate::orchestrator::TaskId;
use anyhow::{Context, Result};
use std::fs;
use tracing::info;

/// 重试列表写入服务
pub struct RetryWriter {
    retry_file_path: String,
}

impl RetryWriter {
    pub fn new() -> Self {
        Self {
            retry_file_path: "retry.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            retry_file_path: path.into(),
        }
    }

    /// 写入失败的任务 ID，覆盖旧文件；没有失败时删除旧文件
    pub fn write(&self, failed: &[TaskId]) -> Result<()> {
        if failed.is_empty() {
            if fs::metadata(&self.retry_file_path).is_ok() {
                fs::remove_file(&self.retry_file_path)
                    .with_context(|| format!("无法删除文件: {}", self.retry_file_path))?;
            }
            return Ok(());
        }

        let mut content = failed
            .iter()
            .map(TaskId::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        content.push('\n');

        fs::write(&self.retry_file_path, content)
            .with_context(|| format!("无法写入重试列表: {}", self.retry_file_path))?;
        info!(
            "📝 {} 个失败任务已写入重试列表: {}",
            failed.len(),
            self.retry_file_path
        );

        Ok(())
    }

    /// 读取重试列表
    pub fn read(&self) -> Result<Vec<TaskId>> {
        let content = match fs::read_to_string(&self.retry_file_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("无法读取重试列表: {}", self.retry_file_path))
            }
        };

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(TaskId::from)
            .collect())
    }
}

impl Default for RetryWriter {
    fn default() -> Self {
        Self::new()
    }
}
