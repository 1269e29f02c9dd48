//! 建议任务流程 - 流程层
//!
//! 对每个待处理条目运行服务端建议任务，服务端接受后添加书签。

use crate::clients::SuggestionService;
use crate::models::{Bookmark, PendingItem};
use crate::orchestrator::{Task, TaskHandler, TaskOutcome};
use crate::services::BookmarkSink;
use async_trait::async_trait;
use std::sync::Arc;

/// 构建建议任务，保持输入顺序
pub fn prepare_suggestion_tasks(items: Vec<PendingItem>) -> Vec<Task<PendingItem>> {
    items
        .into_iter()
        .map(|item| Task::new(item.id.clone(), item))
        .collect()
}

/// 建议任务处理器
pub struct SuggestionHandler {
    service: Arc<dyn SuggestionService>,
    bookmarks: Arc<dyn BookmarkSink>,
}

impl SuggestionHandler {
    pub fn new(service: Arc<dyn SuggestionService>, bookmarks: Arc<dyn BookmarkSink>) -> Self {
        Self { service, bookmarks }
    }
}

#[async_trait]
impl TaskHandler<PendingItem> for SuggestionHandler {
    async fn execute(&self, task: &Task<PendingItem>) -> anyhow::Result<TaskOutcome> {
        let result = self.service.run_suggestion(&task.payload).await?;

        if result.accepted {
            Ok(TaskOutcome {
                success: true,
                detail: result.message,
            })
        } else {
            Ok(TaskOutcome::failure(
                result
                    .message
                    .unwrap_or_else(|| "服务端拒绝了建议任务".to_string()),
            ))
        }
    }

    async fn on_success(
        &self,
        task: &Task<PendingItem>,
        outcome: &TaskOutcome,
    ) -> anyhow::Result<()> {
        let item = &task.payload;
        let bookmark = Bookmark {
            item_id: item.id.clone(),
            model_id: item.model_id.clone(),
            title: item.title.clone(),
            note: outcome.detail.clone(),
            created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        self.bookmarks.add_bookmark(&bookmark).await?;
        Ok(())
    }
}
