//! 任务适配契约
//!
//! 一个任务 = 调用方数据（payload）+ 处理器（`TaskHandler`）。
//! 编排器只在运行期间持有任务的 `Arc` 引用。

use async_trait::async_trait;
use std::fmt::{self, Display};
use std::sync::Arc;

/// 任务标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 单个工作项
#[derive(Debug, Clone)]
pub struct Task<P> {
    pub id: TaskId,
    pub payload: P,
}

impl<P> Task<P> {
    pub fn new(id: impl Into<TaskId>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// `execute()` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub success: bool,
    pub detail: Option<String>,
}

impl TaskOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            detail: None,
        }
    }

    pub fn success_with(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: Some(detail.into()),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: Some(detail.into()),
        }
    }
}

/// 任务处理器
///
/// 职责：
/// - `execute` 执行远程操作，失败时不得产生副作用
/// - `on_success` 仅在 `execute` 报告成功时调用，它自己的失败只会被记录
///
/// `execute` 返回 `Err` 或发生 panic 时，编排器都会把任务记为失败。
#[async_trait]
pub trait TaskHandler<P>: Send + Sync + 'static
where
    P: Send + Sync + 'static,
{
    async fn execute(&self, task: &Task<P>) -> anyhow::Result<TaskOutcome>;

    async fn on_success(&self, _task: &Task<P>, _outcome: &TaskOutcome) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 单个任务结算后的报告，传给完成回调
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub id: TaskId,
    pub batch_index: usize,
    pub success: bool,
    pub detail: Option<String>,
}

/// 完成回调：每个任务结算后调用一次
pub type CompletionCallback = Arc<dyn Fn(&TaskReport) + Send + Sync>;

#[async_trait]
impl<P, T> TaskHandler<P> for Arc<T>
where
    P: Send + Sync + 'static,
    T: TaskHandler<P> + ?Sized,
{
    async fn execute(&self, task: &Task<P>) -> anyhow::Result<TaskOutcome> {
        (**self).execute(task).await
    }

    async fn on_success(&self, task: &Task<P>, outcome: &TaskOutcome) -> anyhow::Result<()> {
        (**self).on_success(task, outcome).await
    }
}
