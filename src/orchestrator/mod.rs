//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层是限流批量执行引擎，下载和建议任务两条流程都建立在它之上。
//!
//! ## 模块划分
//!
//! - `semaphore` - 有界工作池，FIFO 排队
//! - `planner` - 按固定大小切分批次
//! - `control` - 暂停 / 取消令牌
//! - `progress` - 计数、批次台账、冷却倒计时
//! - `task` - 任务与处理器契约
//! - `batch_runner` - 驱动循环
//!
//! ## 层次关系
//!
//! ```text
//! batch_runner (处理 Vec<Task>)
//!     ↓
//! planner → Vec<Batch>
//!     ↓
//! semaphore::WorkerPool (限制批内并发)
//!     ↓
//! TaskHandler (调用方提供：execute + on_success)
//! ```

pub mod batch_runner;
pub mod control;
pub mod planner;
pub mod progress;
pub mod semaphore;
pub mod task;

// 重新导出主要类型
pub use batch_runner::{BatchRunner, RunSummary, RunnerConfig};
pub use control::ControlToken;
pub use planner::{plan, Batch};
pub use progress::{
    BatchState, BatchStatus, ProgressReporter, ProgressSnapshot, RunOutcome, RunPhase,
};
pub use semaphore::{PoolHandle, WorkerPool};
pub use task::{CompletionCallback, Task, TaskHandler, TaskId, TaskOutcome, TaskReport};
