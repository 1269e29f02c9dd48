//! 批量任务编排器 - 编排层
//!
//! ## 职责
//!
//! 驱动一次完整的批量运行：
//!
//! 1. **分批**：用 `planner` 把任务切成固定大小的批次，批次之间严格串行
//! 2. **并发控制**：批内任务通过 `WorkerPool` 限制同时执行的数量
//! 3. **错峰派发**：每个任务派发前随机等待一段抖动时间
//! 4. **冷却**：每批结束后按配置冷却，遵守远程服务的频率限制
//! 5. **暂停 / 取消**：只在轮询点生效，已派发的任务总会跑完
//! 6. **失败隔离**：单个任务失败只记入台账，不影响同批其它任务
//!
//! ## 运行状态
//!
//! ```text
//! Idle → Running → (Cooldown ⇄ Running)* → Draining → Finished(Cancelled|Completed|Failed)
//! ```

use crate::error::{RunnerError, RunnerResult};
use crate::orchestrator::control::ControlToken;
use crate::orchestrator::planner::{self, Batch};
use crate::orchestrator::progress::{
    BatchState, BatchStatus, ProgressReporter, RunOutcome, RunPhase,
};
use crate::orchestrator::semaphore::WorkerPool;
use crate::orchestrator::task::{CompletionCallback, Task, TaskHandler, TaskId, TaskOutcome, TaskReport};
use futures::FutureExt;
use rand::Rng;
use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 运行配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// 同时执行的任务上限
    pub concurrency_limit: usize,
    /// 每批任务数
    pub batch_size: usize,
    /// 批次之间的冷却时间（秒）
    pub cooldown_secs: u64,
    /// 派发抖动下限（毫秒）
    pub jitter_min_ms: u64,
    /// 派发抖动上限（毫秒）
    pub jitter_max_ms: u64,
    /// 暂停时的轮询间隔（毫秒）
    pub pause_poll_ms: u64,
    /// 最后一批之后是否也冷却
    pub cooldown_after_last_batch: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 5,
            batch_size: 10,
            cooldown_secs: 30,
            jitter_min_ms: 200,
            jitter_max_ms: 800,
            pause_poll_ms: 500,
            cooldown_after_last_batch: true,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> RunnerResult<()> {
        if self.concurrency_limit == 0 {
            return Err(RunnerError::InvalidConfig(
                "concurrency_limit 必须大于 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RunnerError::InvalidConfig(
                "batch_size 必须大于 0".to_string(),
            ));
        }
        if self.jitter_min_ms > self.jitter_max_ms {
            return Err(RunnerError::InvalidConfig(format!(
                "jitter_min_ms ({}) 不能大于 jitter_max_ms ({})",
                self.jitter_min_ms, self.jitter_max_ms
            )));
        }
        if self.pause_poll_ms == 0 {
            return Err(RunnerError::InvalidConfig(
                "pause_poll_ms 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    fn jitter(&self) -> Duration {
        if self.jitter_max_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(self.jitter_min_ms..=self.jitter_max_ms);
        Duration::from_millis(ms)
    }
}

/// 运行结果汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub total: usize,
    pub completed: usize,
    pub failed_task_ids: Vec<TaskId>,
    pub batches: Vec<BatchStatus>,
    pub cooldowns_entered: usize,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.completed - self.failed_task_ids.len()
    }
}

/// 单批结果
#[derive(Debug, Default)]
struct BatchResult {
    success: usize,
    failed: Vec<TaskReport>,
    abandoned: usize,
}

/// 批量任务编排器
pub struct BatchRunner<P, H> {
    config: RunnerConfig,
    handler: Arc<H>,
    pool: WorkerPool,
    control: ControlToken,
    reporter: ProgressReporter,
    on_settled: Option<CompletionCallback>,
    _payload: PhantomData<fn(P)>,
}

impl<P, H> BatchRunner<P, H>
where
    P: Send + Sync + 'static,
    H: TaskHandler<P>,
{
    pub fn new(config: RunnerConfig, handler: H) -> RunnerResult<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.concurrency_limit);
        Ok(Self {
            config,
            handler: Arc::new(handler),
            pool,
            control: ControlToken::new(),
            reporter: ProgressReporter::new(0),
            on_settled: None,
            _payload: PhantomData,
        })
    }

    /// 使用外部提供的控制令牌
    pub fn with_control(mut self, control: ControlToken) -> Self {
        self.control = control;
        self
    }

    /// 设置完成回调，每个任务结算后调用一次
    pub fn on_settled(mut self, callback: impl Fn(&TaskReport) + Send + Sync + 'static) -> Self {
        self.on_settled = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn control(&self) -> ControlToken {
        self.control.clone()
    }

    pub fn reporter(&self) -> ProgressReporter {
        self.reporter.clone()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// 运行所有任务
    ///
    /// 任务失败不会让这里返回错误；只有编排器自身出错时才返回 `Err`。
    pub async fn run(&self, tasks: Vec<Task<P>>) -> RunnerResult<RunSummary> {
        let total = tasks.len();
        let tasks: Vec<Arc<Task<P>>> = tasks.into_iter().map(Arc::new).collect();
        let batches = planner::plan(tasks, self.config.batch_size)?;
        let batch_total = batches.len();

        let ranges: Vec<(usize, usize)> = batches
            .iter()
            .map(|b| (b.first_item(), b.last_item()))
            .collect();
        self.reporter.start(total, &ranges);
        self.sync_flags();
        log_run_start(total, batch_total, &self.config);

        let mut failure = None;

        for batch in batches {
            if self.control.is_cancelled() {
                info!("🛑 已取消，不再调度第 {}/{} 批", batch.index + 1, batch_total);
                break;
            }

            let is_last = batch.index + 1 == batch_total;

            if let Err(e) = self.run_batch(batch, batch_total).await {
                failure = Some(e);
                break;
            }

            if self.control.is_cancelled() {
                break;
            }

            if !is_last || self.config.cooldown_after_last_batch {
                self.cooldown().await;
            }
        }

        // 无论因何结束，都先等所有已派发的任务结算
        self.reporter.set_phase(RunPhase::Draining);
        self.pool.wait_idle().await;
        self.sync_flags();

        if let Some(e) = failure {
            warn!("❌ 编排器内部错误，运行中止: {}", e);
            self.reporter.finish(RunOutcome::Failed);
            return Err(e);
        }

        let outcome = if self.control.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        };
        self.reporter.finish(outcome);

        let snapshot = self.reporter.snapshot();
        let summary = RunSummary {
            outcome,
            total,
            completed: snapshot.completed,
            failed_task_ids: snapshot.failed.into_iter().collect(),
            batches: snapshot.batches,
            cooldowns_entered: snapshot.cooldowns_entered,
        };
        log_run_complete(&summary);

        Ok(summary)
    }

    /// 处理单个批次：派发全部任务，等待全部结算
    async fn run_batch(
        &self,
        batch: Batch<Arc<Task<P>>>,
        batch_total: usize,
    ) -> RunnerResult<BatchResult> {
        let batch_index = batch.index;
        let poll_interval = Duration::from_millis(self.config.pause_poll_ms);

        self.reporter.set_phase(RunPhase::Running);
        self.reporter
            .batch_started(batch_index, batch.first_item(), batch.last_item());
        log_batch_start(
            batch_index + 1,
            batch_total,
            batch.first_item(),
            batch.last_item(),
            self.reporter.snapshot().total,
        );

        let mut handles = Vec::with_capacity(batch.len());
        let mut result = BatchResult::default();

        for (pos, task) in batch.items.iter().enumerate() {
            if self.control.is_paused() {
                self.sync_flags();
                info!("⏸️ 已暂停，等待恢复 (下一个任务: {})", task.id);
            }
            if !self.control.wait_while_paused(poll_interval).await {
                result.abandoned = batch.len() - pos;
                break;
            }
            self.sync_flags();

            if !self.control.sleep(self.config.jitter()).await {
                result.abandoned = batch.len() - pos;
                break;
            }

            debug!("[任务 {}] 派发", task.id);
            let handle = self.pool.submit(settle_task(
                Arc::clone(&self.handler),
                Arc::clone(task),
                batch_index,
                self.reporter.clone(),
                self.on_settled.clone(),
            ));
            handles.push((task.id.clone(), handle));
        }

        if result.abandoned > 0 {
            self.sync_flags();
            info!(
                "🛑 已取消，第 {} 批剩余 {} 个任务未派发",
                batch_index + 1,
                result.abandoned
            );
        }

        // 等待本批所有已派发的任务结算
        let settled = futures::future::join_all(
            handles
                .into_iter()
                .map(|(id, handle)| async move { (id, handle.await) }),
        )
        .await;

        let mut lost = None;
        for (task_id, report) in settled {
            match report {
                Some(report) if report.success => result.success += 1,
                Some(report) => result.failed.push(report),
                None => {
                    lost.get_or_insert(task_id);
                }
            }
        }

        if let Some(task_id) = lost {
            self.reporter.batch_finished(
                batch_index,
                BatchState::PartialFailure,
                Some(format!("任务 {} 的结果丢失", task_id)),
            );
            return Err(RunnerError::ResultChannelClosed {
                task_id: task_id.to_string(),
            });
        }

        let (state, message) = summarize_batch(&result);
        self.reporter.batch_finished(batch_index, state, message);
        log_batch_complete(batch_index + 1, &result);

        Ok(result)
    }

    /// 冷却：每秒更新一次倒计时，取消时提前结束
    async fn cooldown(&self) {
        let secs = self.config.cooldown_secs;
        self.reporter.cooldown_entered(secs);
        if secs > 0 {
            info!("⏳ 冷却 {} 秒后继续...", secs);
        }

        let mut remaining = secs;
        while remaining > 0 {
            if !self.control.sleep(Duration::from_secs(1)).await {
                info!("🛑 冷却期间收到取消");
                break;
            }
            remaining -= 1;
            self.reporter.cooldown_tick(remaining);
        }

        self.reporter.cooldown_finished();
        self.sync_flags();
    }

    fn sync_flags(&self) {
        self.reporter
            .set_control_flags(self.control.is_paused(), self.control.is_cancelled());
    }
}

/// 已派发任务的完整生命周期：执行 → 副作用 → 记录 → 回调
async fn settle_task<P, H>(
    handler: Arc<H>,
    task: Arc<Task<P>>,
    batch_index: usize,
    reporter: ProgressReporter,
    on_settled: Option<CompletionCallback>,
) -> TaskReport
where
    P: Send + Sync + 'static,
    H: TaskHandler<P>,
{
    let outcome = match AssertUnwindSafe(handler.execute(&task)).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => TaskOutcome::failure(format!("{:#}", e)),
        Err(panic) => TaskOutcome::failure(format!("任务 panic: {}", panic_message(&*panic))),
    };

    if outcome.success {
        match AssertUnwindSafe(handler.on_success(&task, &outcome))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("[任务 {}] ⚠️ 成功后的副作用失败: {:#}", task.id, e),
            Err(panic) => warn!(
                "[任务 {}] ⚠️ 成功后的副作用 panic: {}",
                task.id,
                panic_message(&*panic)
            ),
        }
    } else {
        warn!(
            "[任务 {}] ❌ 失败: {}",
            task.id,
            outcome.detail.as_deref().unwrap_or("未知错误")
        );
    }

    reporter.task_settled(&task.id, outcome.success);

    let report = TaskReport {
        id: task.id.clone(),
        batch_index,
        success: outcome.success,
        detail: outcome.detail,
    };
    if let Some(callback) = &on_settled {
        callback(&report);
    }
    report
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}

fn summarize_batch(result: &BatchResult) -> (BatchState, Option<String>) {
    let mut parts = Vec::new();

    if !result.failed.is_empty() {
        let details: Vec<String> = result
            .failed
            .iter()
            .map(|r| match &r.detail {
                Some(detail) => format!("{} ({})", r.id, detail),
                None => r.id.to_string(),
            })
            .collect();
        parts.push(format!(
            "{} 个任务失败: {}",
            result.failed.len(),
            details.join("; ")
        ));
    }
    if result.abandoned > 0 {
        parts.push(format!("{} 个任务因取消未派发", result.abandoned));
    }

    let state = if result.failed.is_empty() {
        BatchState::Success
    } else {
        BatchState::PartialFailure
    };
    let message = if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    };
    (state, message)
}

// ========== 日志辅助函数 ==========

fn log_run_start(total: usize, batch_total: usize, config: &RunnerConfig) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始批量运行: 共 {} 个任务, {} 批", total, batch_total);
    info!(
        "📊 并发上限: {} | 每批: {} | 冷却: {}s | 抖动: {}-{}ms",
        config.concurrency_limit,
        config.batch_size,
        config.cooldown_secs,
        config.jitter_min_ms,
        config.jitter_max_ms
    );
    info!("{}", "=".repeat(60));
}

fn log_batch_start(batch_num: usize, total_batches: usize, start: usize, end: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批", batch_num, total_batches);
    info!("📄 本批任务: {}-{} / 共 {} 个", start, end, total);
    info!("{}", "=".repeat(60));
}

fn log_batch_complete(batch_num: usize, result: &BatchResult) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 第 {} 批完成: 成功 {}/{}",
        batch_num,
        result.success,
        result.success + result.failed.len()
    );
    info!("{}", "─".repeat(60));
}

fn log_run_complete(summary: &RunSummary) {
    let status = match summary.outcome {
        RunOutcome::Completed => "全部完成",
        RunOutcome::Cancelled => "已取消",
        RunOutcome::Failed => "异常中止",
    };
    info!("\n{}", "=".repeat(60));
    info!("📊 批量运行结束 ({})", status);
    info!("✅ 成功: {}/{}", summary.succeeded(), summary.total);
    info!("❌ 失败: {}", summary.failed_task_ids.len());
    info!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 记录执行情况的测试处理器
    #[derive(Default)]
    struct Recorder {
        fail_ids: HashSet<String>,
        panic_ids: HashSet<String>,
        work: Duration,
        running: AtomicUsize,
        peak: AtomicUsize,
        executed: Mutex<Vec<String>>,
        side_effects: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TaskHandler<usize> for Recorder {
        async fn execute(&self, task: &Task<usize>) -> anyhow::Result<TaskOutcome> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.executed.lock().unwrap().push(task.id.to_string());

            tokio::time::sleep(self.work).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.panic_ids.contains(task.id.as_str()) {
                panic!("handler exploded");
            }
            if self.fail_ids.contains(task.id.as_str()) {
                anyhow::bail!("remote rejected {}", task.id);
            }
            Ok(TaskOutcome::success())
        }

        async fn on_success(&self, task: &Task<usize>, _: &TaskOutcome) -> anyhow::Result<()> {
            self.side_effects.lock().unwrap().push(task.id.to_string());
            if task.payload == 2 {
                anyhow::bail!("record store unavailable");
            }
            Ok(())
        }
    }

    fn tasks(n: usize) -> Vec<Task<usize>> {
        (1..=n).map(|i| Task::new(format!("task{}", i), i)).collect()
    }

    fn fast_config() -> RunnerConfig {
        RunnerConfig {
            concurrency_limit: 3,
            batch_size: 4,
            cooldown_secs: 1,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            pause_poll_ms: 500,
            cooldown_after_last_batch: true,
        }
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut config = fast_config();
        config.concurrency_limit = 0;
        assert!(config.validate().is_err());

        let mut config = fast_config();
        config.jitter_min_ms = 10;
        config.jitter_max_ms = 5;
        assert!(config.validate().is_err());

        assert!(fast_config().validate().is_ok());
    }

    #[test]
    fn test_jitter_within_bounds() {
        let config = RunnerConfig {
            jitter_min_ms: 100,
            jitter_max_ms: 150,
            ..fast_config()
        };
        for _ in 0..100 {
            let jitter = config.jitter();
            assert!(jitter >= Duration::from_millis(100));
            assert!(jitter <= Duration::from_millis(150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_and_failures_isolated() {
        let recorder = Arc::new(Recorder {
            fail_ids: ["task3".to_string()].into(),
            panic_ids: ["task6".to_string()].into(),
            work: Duration::from_millis(100),
            ..Default::default()
        });
        let runner = BatchRunner::new(fast_config(), Arc::clone(&recorder)).unwrap();

        let summary = runner.run(tasks(10)).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.completed, 10);
        assert_eq!(
            summary.failed_task_ids,
            vec![TaskId::new("task3"), TaskId::new("task6")]
        );
        assert_eq!(recorder.peak.load(Ordering::SeqCst), 3);

        // 副作用只在成功时执行；task2 的副作用失败不影响结果
        let side_effects = recorder.side_effects.lock().unwrap();
        assert_eq!(side_effects.len(), 8);
        assert!(!side_effects.contains(&"task3".to_string()));
        assert!(!side_effects.contains(&"task6".to_string()));
        assert!(side_effects.contains(&"task2".to_string()));

        assert_eq!(summary.batches[0].state, BatchState::PartialFailure);
        assert_eq!(summary.batches[1].state, BatchState::PartialFailure);
        assert_eq!(summary.batches[2].state, BatchState::Success);
        assert!(summary.batches[1]
            .message
            .as_deref()
            .unwrap()
            .contains("handler exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_executes_nothing() {
        let recorder = Arc::new(Recorder::default());
        let runner = BatchRunner::new(fast_config(), Arc::clone(&recorder)).unwrap();
        runner.control().cancel();

        let summary = runner.run(tasks(5)).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(summary.completed, 0);
        assert!(recorder.executed.lock().unwrap().is_empty());
        assert_eq!(summary.batches.len(), 2);
        assert!(summary
            .batches
            .iter()
            .all(|b| b.state == BatchState::Pending));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_batch_lets_dispatched_tasks_settle() {
        let recorder = Arc::new(Recorder {
            work: Duration::from_secs(5),
            ..Default::default()
        });
        let config = RunnerConfig {
            jitter_min_ms: 100,
            jitter_max_ms: 100,
            ..fast_config()
        };
        let runner = BatchRunner::new(config, Arc::clone(&recorder)).unwrap();
        let control = runner.control();

        // 第 1、2 个任务在 100ms / 200ms 派发，250ms 取消
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            control.cancel();
        });

        let summary = runner.run(tasks(8)).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.batches.len(), 2);
        assert_eq!(summary.batches[0].state, BatchState::Success);
        assert!(summary.batches[0]
            .message
            .as_deref()
            .unwrap()
            .contains("2 个任务因取消未派发"));
        assert_eq!(summary.batches[1].state, BatchState::Pending);
        assert!(runner.pool().is_idle());
        assert_eq!(*recorder.executed.lock().unwrap(), vec!["task1", "task2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_do_not_repeat_tasks() {
        let recorder = Arc::new(Recorder {
            work: Duration::from_millis(50),
            ..Default::default()
        });
        let config = RunnerConfig {
            jitter_min_ms: 100,
            jitter_max_ms: 100,
            ..fast_config()
        };
        let runner = BatchRunner::new(config, Arc::clone(&recorder)).unwrap();
        let control = runner.control();
        let reporter = runner.reporter();
        let observer = Arc::clone(&recorder);

        let ui = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            control.pause();
            tokio::time::sleep(Duration::from_secs(3)).await;
            let seen = (
                observer.executed.lock().unwrap().len(),
                reporter.snapshot().paused,
            );
            control.resume();
            seen
        });

        let summary = runner.run(tasks(6)).await.unwrap();
        let (executed_while_paused, paused_flag) = ui.await.unwrap();

        // 暂停前已派发 task1、task2，暂停期间没有新的派发
        assert_eq!(executed_while_paused, 2);
        assert!(paused_flag);
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.completed, 6);
        let executed = recorder.executed.lock().unwrap();
        assert_eq!(
            *executed,
            vec!["task1", "task2", "task3", "task4", "task5", "task6"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_callback_called_once_per_task() {
        let recorder = Arc::new(Recorder {
            fail_ids: ["task2".to_string()].into(),
            ..Default::default()
        });
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let runner = BatchRunner::new(fast_config(), Arc::clone(&recorder))
            .unwrap()
            .on_settled(move |report| sink.lock().unwrap().push(report.clone()));

        runner.run(tasks(5)).await.unwrap();

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 5);
        let failed: Vec<_> = reports.iter().filter(|r| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, TaskId::new("task2"));
        assert_eq!(failed[0].batch_index, 0);
        assert!(failed[0].detail.as_deref().unwrap().contains("remote rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_batch_cooldown_can_be_disabled() {
        let recorder = Arc::new(Recorder::default());
        let config = RunnerConfig {
            cooldown_after_last_batch: false,
            ..fast_config()
        };
        let runner = BatchRunner::new(config, Arc::clone(&recorder)).unwrap();

        let summary = runner.run(tasks(9)).await.unwrap();

        assert_eq!(summary.batches.len(), 3);
        assert_eq!(summary.cooldowns_entered, 2);
    }

    #[tokio::test]
    async fn test_empty_task_list_completes() {
        let runner = BatchRunner::new(fast_config(), Arc::new(Recorder::default())).unwrap();
        let summary = runner.run(Vec::new()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.cooldowns_entered, 0);
        assert_eq!(
            runner.reporter().snapshot().phase,
            RunPhase::Finished(RunOutcome::Completed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_final_batch_reports_cancelled() {
        let recorder = Arc::new(Recorder {
            work: Duration::from_secs(5),
            ..Default::default()
        });
        let config = RunnerConfig {
            batch_size: 10,
            ..fast_config()
        };
        let runner = BatchRunner::new(config, Arc::clone(&recorder)).unwrap();
        let control = runner.control();

        // 三个任务都已派发后才取消
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            control.cancel();
        });

        let summary = runner.run(tasks(3)).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(summary.completed, 3);
        assert!(summary.failed_task_ids.is_empty());
        assert_eq!(summary.cooldowns_entered, 0);
        let snapshot = runner.reporter().snapshot();
        assert!(snapshot.cancelled);
        assert_eq!(snapshot.phase, RunPhase::Finished(RunOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_result_drains_and_marks_run_failed() {
        let recorder = Arc::new(Recorder {
            work: Duration::from_millis(100),
            ..Default::default()
        });
        let runner = BatchRunner::new(fast_config(), Arc::clone(&recorder))
            .unwrap()
            .on_settled(|report| {
                if report.id.as_str() == "task2" {
                    panic!("callback exploded");
                }
            });

        let err = runner.run(tasks(8)).await.unwrap_err();

        assert!(matches!(
            err,
            RunnerError::ResultChannelClosed { ref task_id } if task_id == "task2"
        ));
        assert!(runner.pool().is_idle());

        let snapshot = runner.reporter().snapshot();
        assert_eq!(snapshot.phase, RunPhase::Finished(RunOutcome::Failed));
        assert_eq!(snapshot.completed, 4);
        assert_eq!(snapshot.batches[0].state, BatchState::PartialFailure);
        assert!(snapshot.batches[0]
            .message
            .as_deref()
            .unwrap()
            .contains("task2"));
        assert_eq!(snapshot.batches[1].state, BatchState::Pending);
        assert_eq!(snapshot.cooldowns_entered, 0);
        assert_eq!(
            *recorder.executed.lock().unwrap(),
            vec!["task1", "task2", "task3", "task4"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribers_never_see_completed_decrease() {
        let recorder = Arc::new(Recorder {
            work: Duration::from_millis(2),
            ..Default::default()
        });
        let config = RunnerConfig {
            concurrency_limit: 8,
            batch_size: 32,
            cooldown_secs: 0,
            ..fast_config()
        };
        let runner = BatchRunner::new(config, Arc::clone(&recorder)).unwrap();
        let mut rx = runner.reporter().subscribe();

        let watcher = tokio::spawn(async move {
            let mut last = 0;
            let mut notifications = 0;
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                assert!(snapshot.completed >= last);
                last = snapshot.completed;
                notifications += 1;
                if matches!(snapshot.phase, RunPhase::Finished(_)) {
                    break;
                }
            }
            (last, notifications)
        });

        let summary = runner.run(tasks(96)).await.unwrap();
        let (last_seen, notifications) = watcher.await.unwrap();

        assert_eq!(summary.completed, 96);
        assert_eq!(last_seen, 96);
        assert!(notifications > 0);
        assert_eq!(runner.reporter().snapshot().completed, 96);
    }
}
