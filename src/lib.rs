//! # Model Batch
//!
//! 从远程模型目录批量下载模型文件、批量运行服务端建议任务的客户端。
//!
//! ## 架构设计
//!
//! ### ① 编排层（Orchestration）
//! - `orchestrator/` - 限流批量执行引擎：分批、限并发、抖动、冷却、暂停 / 取消、进度
//! - `BatchRunner` - 驱动循环
//! - `WorkerPool` - 有界工作池（计数信号量）
//!
//! ### ② 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"做什么
//! - `DownloadHandler` - 下载文件 → 保存记录
//! - `SuggestionHandler` - 运行建议任务 → 添加书签
//!
//! ### ③ 能力层（Clients / Services）
//! - `clients/` - 目录服务 HTTP 客户端
//! - `services/` - 记录文件、重试列表
//!
//! ### ④ 应用层
//! - `app` - 加载任务文件、运行、输出统计
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use config::{Config, RunMode};
pub use error::{AppError, AppResult, RunnerError};
pub use orchestrator::{
    BatchRunner, ControlToken, ProgressReporter, RunOutcome, RunSummary, RunnerConfig, Task,
    TaskHandler, TaskId, TaskOutcome, TaskReport, WorkerPool,
};
