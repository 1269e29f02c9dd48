//! 应用入口 - 编排层之上
//!
//! ## 职责
//!
//! 1. **应用初始化**：写日志文件头、校验配置、创建目录客户端
//! 2. **加载任务**：读取任务文件（单个文件或整个文件夹），重试模式下只保留上次失败的任务
//! 3. **运行流程**：按运行模式构建任务并交给 `BatchRunner`
//! 4. **控制**：Ctrl-C 触发取消，进度变化时输出状态行
//! 5. **收尾**：写重试列表，输出并保存最终统计

use crate::clients::CatalogClient;
use crate::config::{Config, RunMode};
use crate::models::{self, JobFile};
use crate::orchestrator::{
    BatchRunner, ControlToken, ProgressReporter, RunOutcome, RunSummary, Task, TaskHandler, TaskId,
};
use crate::services::{JsonlStore, RetryWriter};
use crate::workflow::{
    prepare_download_tasks, prepare_suggestion_tasks, DownloadHandler, SuggestionHandler,
};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    client: Arc<CatalogClient>,
    control: ControlToken,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)?;

        log_startup(&config);

        config
            .runner_config()
            .validate()
            .context("批量执行配置非法")?;

        let client = Arc::new(CatalogClient::new(&config));

        Ok(Self {
            config,
            client,
            control: ControlToken::new(),
        })
    }

    /// 控制令牌，可用于外部暂停 / 恢复 / 取消
    pub fn control(&self) -> ControlToken {
        self.control.clone()
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<Option<RunSummary>> {
        let jobs = self.load_jobs().await?;

        let summary = match self.config.run_mode {
            RunMode::Download => {
                let items: Vec<_> = jobs.into_iter().flat_map(|job| job.files).collect();
                if items.is_empty() {
                    warn!("⚠️ 没有找到待下载的文件，程序结束");
                    return Ok(None);
                }

                let records = Arc::new(JsonlStore::new(&self.config.record_file));
                let handler = DownloadHandler::new(self.client.clone(), records);
                self.execute(prepare_download_tasks(items), handler).await?
            }
            RunMode::Suggest => {
                let items: Vec<_> = jobs.into_iter().flat_map(|job| job.pending).collect();
                if items.is_empty() {
                    warn!("⚠️ 没有找到待处理的条目，程序结束");
                    return Ok(None);
                }

                let bookmarks = Arc::new(JsonlStore::new(&self.config.bookmark_file));
                let handler = SuggestionHandler::new(self.client.clone(), bookmarks);
                self.execute(prepare_suggestion_tasks(items), handler).await?
            }
        };

        RetryWriter::with_path(&self.config.retry_file).write(&summary.failed_task_ids)?;
        print_final_stats(&summary, &self.config)?;

        Ok(Some(summary))
    }

    /// 加载任务文件
    async fn load_jobs(&self) -> Result<Vec<JobFile>> {
        info!("\n📁 正在加载任务: {}", self.config.job_path);

        let path = Path::new(&self.config.job_path);
        if path.is_file() {
            Ok(vec![models::load_job_file(path).await?])
        } else {
            models::load_all_job_files(&self.config.job_path).await
        }
    }

    /// 构建编排器并运行
    async fn execute<P, H>(&self, tasks: Vec<Task<P>>, handler: H) -> Result<RunSummary>
    where
        P: Send + Sync + 'static,
        H: TaskHandler<P>,
    {
        let tasks = self.retry_targets(tasks)?;
        log_tasks_loaded(tasks.len(), &self.config);

        let runner = BatchRunner::new(self.config.runner_config(), handler)?
            .with_control(self.control.clone());

        spawn_ctrl_c_handler(self.control.clone());
        let progress = spawn_progress_logger(runner.reporter());

        let summary = runner.run(tasks).await?;
        progress.abort();

        Ok(summary)
    }

    /// 重试模式下只保留上一轮失败的任务
    fn retry_targets<P>(&self, tasks: Vec<Task<P>>) -> Result<Vec<Task<P>>> {
        if !self.config.retry_failed_only {
            return Ok(tasks);
        }

        let previous: HashSet<TaskId> = RetryWriter::with_path(&self.config.retry_file)
            .read()?
            .into_iter()
            .collect();
        let selected = retain_previous_failures(tasks, &previous);
        info!(
            "🔁 重试模式: 上次失败 {} 个，本次重跑 {} 个",
            previous.len(),
            selected.len()
        );
        Ok(selected)
    }
}

fn retain_previous_failures<P>(tasks: Vec<Task<P>>, previous: &HashSet<TaskId>) -> Vec<Task<P>> {
    tasks
        .into_iter()
        .filter(|task| previous.contains(&task.id))
        .collect()
}

/// Ctrl-C：第一次取消（等待已派发任务结束），进程退出时任务随之结束
fn spawn_ctrl_c_handler(control: ControlToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 收到 Ctrl-C，停止调度新任务，等待进行中的任务结束...");
            control.cancel();
        }
    });
}

/// 完成数变化时输出一行进度
fn spawn_progress_logger(reporter: ProgressReporter) -> tokio::task::JoinHandle<()> {
    let mut rx = reporter.subscribe();
    tokio::spawn(async move {
        let mut last_completed = 0;
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.completed != last_completed {
                last_completed = snapshot.completed;
                info!("⏱️ 进度: {}", snapshot.status_line());
            }
        }
    })
}

// ========== 日志辅助函数 ==========

fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n批量任务日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - {:?} 模式", config.run_mode);
    info!("📊 最大并发数: {}", config.concurrency_limit);
    info!("🌐 目录服务: {}", config.catalog_base_url);
    info!("{}", "=".repeat(60));
}

fn log_tasks_loaded(total: usize, config: &Config) {
    info!("✓ 找到 {} 个待处理的任务", total);
    info!("📋 将以每批 {} 个的方式处理", config.batch_size);
    info!("💡 每批完成后冷却 {} 秒再开始下一批\n", config.cooldown_secs);
}

fn print_final_stats(summary: &RunSummary, config: &Config) -> Result<()> {
    let status = match summary.outcome {
        RunOutcome::Completed => "全部处理完成",
        RunOutcome::Cancelled => "已取消",
        RunOutcome::Failed => "异常中止",
    };
    let finished_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

    info!("\n{}", "=".repeat(60));
    info!("📊 {}统计", status);
    info!("完成时间: {}", finished_at);
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.succeeded(), summary.total);
    info!("❌ 失败: {}", summary.failed_task_ids.len());
    info!("⏭️ 未执行: {}", summary.total - summary.completed);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", config.output_log_file);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.output_log_file)
        .with_context(|| format!("无法打开日志文件: {}", config.output_log_file))?;
    writeln!(file, "{} - {}", status, finished_at)?;
    writeln!(
        file,
        "成功 {}/{}, 失败 {}, 未执行 {}",
        summary.succeeded(),
        summary.total,
        summary.failed_task_ids.len(),
        summary.total - summary.completed
    )?;
    for batch in &summary.batches {
        writeln!(
            file,
            "第 {} 批 ({}-{}): {:?}{}",
            batch.index + 1,
            batch.first_item,
            batch.last_item,
            batch.state,
            batch
                .message
                .as_deref()
                .map(|m| format!(" - {}", m))
                .unwrap_or_default()
        )?;
    }
    for id in &summary.failed_task_ids {
        writeln!(file, "失败: {}", id)?;
    }

    Ok(())
}
