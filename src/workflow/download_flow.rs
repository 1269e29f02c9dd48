//! 批量下载流程 - 流程层
//!
//! 定义"下载一个模型文件"的任务：
//! 1. 从目录服务下载文件
//! 2. 成功后保存下载记录（失败只记日志）

use crate::clients::ModelFileSource;
use crate::models::{DownloadItem, DownloadRecord};
use crate::orchestrator::{Task, TaskHandler, TaskOutcome};
use crate::services::RecordSink;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// 构建下载任务
///
/// 按 模型名 → 版本名 → 文件名 排序；同一个文件只保留第一次出现。
pub fn prepare_download_tasks(mut items: Vec<DownloadItem>) -> Vec<Task<DownloadItem>> {
    items.sort_by(|a, b| {
        (&a.model_name, &a.version_name, &a.file_name).cmp(&(
            &b.model_name,
            &b.version_name,
            &b.file_name,
        ))
    });

    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|item| {
            let key = item.task_key();
            if seen.insert(key.clone()) {
                Some(Task::new(key, item))
            } else {
                warn!("⚠️ 重复的下载项已跳过: {}", key);
                None
            }
        })
        .collect()
}

/// 下载任务处理器
pub struct DownloadHandler {
    source: Arc<dyn ModelFileSource>,
    records: Arc<dyn RecordSink>,
}

impl DownloadHandler {
    pub fn new(source: Arc<dyn ModelFileSource>, records: Arc<dyn RecordSink>) -> Self {
        Self { source, records }
    }
}

#[async_trait]
impl TaskHandler<DownloadItem> for DownloadHandler {
    async fn execute(&self, task: &Task<DownloadItem>) -> anyhow::Result<TaskOutcome> {
        let item = &task.payload;
        match self.source.download_file(item).await {
            Ok(receipt) => {
                debug!(
                    "[{}] ✓ 已保存 {} ({} 字节)",
                    task.id,
                    receipt.saved_path.display(),
                    receipt.bytes
                );
                Ok(TaskOutcome::success_with(
                    receipt.saved_path.to_string_lossy(),
                ))
            }
            Err(e) => Ok(TaskOutcome::failure(e.to_string())),
        }
    }

    async fn on_success(
        &self,
        task: &Task<DownloadItem>,
        outcome: &TaskOutcome,
    ) -> anyhow::Result<()> {
        let item = &task.payload;
        let saved_path = outcome.detail.clone().unwrap_or_default();
        let bytes = match tokio::fs::metadata(&saved_path).await {
            Ok(meta) => meta.len(),
            Err(_) => item.size_kb.map(|kb| kb * 1024).unwrap_or(0),
        };

        let record = DownloadRecord {
            model_id: item.model_id.clone(),
            version_id: item.version_id.clone(),
            file_name: item.file_name.clone(),
            saved_path,
            bytes,
            downloaded_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        self.records.save_record(&record).await?;
        Ok(())
    }
}
