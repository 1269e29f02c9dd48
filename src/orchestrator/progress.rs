//! 进度报告
//!
//! 维护运行状态（计数、批次台账、当前区间、冷却倒计时），外部只能读取快照。
//! 每次变更都会推送到 `watch` 通道，界面可以订阅实时刷新。

use crate::orchestrator::task::TaskId;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

/// 运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Cooldown,
    Draining,
    Finished(RunOutcome),
}

/// 运行结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// 编排器内部错误，`run` 返回 `Err`
    Failed,
}

/// 批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Running,
    Success,
    PartialFailure,
}

/// 批次台账记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatus {
    pub index: usize,
    /// 闭区间，从 1 开始
    pub first_item: usize,
    pub last_item: usize,
    pub state: BatchState,
    pub message: Option<String>,
}

/// 运行状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub phase: RunPhase,
    pub total: usize,
    pub completed: usize,
    pub failed: BTreeSet<TaskId>,
    pub paused: bool,
    pub cancelled: bool,
    pub cooldown_remaining_secs: Option<u64>,
    pub current_range: Option<String>,
    pub batches: Vec<BatchStatus>,
    pub cooldowns_entered: usize,
}

impl ProgressSnapshot {
    fn new(total: usize) -> Self {
        Self {
            phase: RunPhase::Idle,
            total,
            completed: 0,
            failed: BTreeSet::new(),
            paused: false,
            cancelled: false,
            cooldown_remaining_secs: None,
            current_range: None,
            batches: Vec::new(),
            cooldowns_entered: 0,
        }
    }

    /// 完成百分比（0-100）
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total).min(100) as u8
    }

    /// 用于界面显示的一行状态
    pub fn status_line(&self) -> String {
        let mut line = format!("{}/{} ({}%)", self.completed, self.total, self.percent());
        if let Some(range) = &self.current_range {
            line.push_str(&format!(" | {}", range));
        }
        if self.paused {
            line.push_str(" | 已暂停");
        }
        if let Some(secs) = self.cooldown_remaining_secs {
            line.push_str(&format!(" | 冷却中 {}s", secs));
        }
        line
    }
}

/// 进度报告器
///
/// 编排器和已派发的任务共享同一个报告器，外部通过 `snapshot()` / `subscribe()` 读取。
/// 状态只保存在 `watch` 通道里，修改和推送是同一步。
#[derive(Clone)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<ProgressSnapshot>>,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot::new(total));
        Self { tx: Arc::new(tx) }
    }

    /// 修改状态并推送快照
    fn update(&self, f: impl FnOnce(&mut ProgressSnapshot)) {
        self.tx.send_modify(f);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    /// 开始新的运行：重置所有计数，台账里预置全部批次（`Pending`）
    pub(crate) fn start(&self, total: usize, ranges: &[(usize, usize)]) {
        self.update(|s| {
            *s = ProgressSnapshot::new(total);
            s.phase = RunPhase::Running;
            s.batches = ranges
                .iter()
                .enumerate()
                .map(|(index, &(first_item, last_item))| BatchStatus {
                    index,
                    first_item,
                    last_item,
                    state: BatchState::Pending,
                    message: None,
                })
                .collect();
        });
    }

    pub(crate) fn set_phase(&self, phase: RunPhase) {
        self.update(|s| s.phase = phase);
    }

    pub(crate) fn set_control_flags(&self, paused: bool, cancelled: bool) {
        self.tx.send_if_modified(|s| {
            if s.paused == paused && s.cancelled == cancelled {
                return false;
            }
            s.paused = paused;
            s.cancelled = cancelled;
            true
        });
    }

    pub(crate) fn batch_started(&self, index: usize, first_item: usize, last_item: usize) {
        self.update(|s| {
            s.current_range = Some(format!(
                "正在处理第 {}–{} 项 / 共 {} 项",
                first_item, last_item, s.total
            ));
            match s.batches.iter_mut().find(|b| b.index == index) {
                Some(batch) => batch.state = BatchState::Running,
                None => s.batches.push(BatchStatus {
                    index,
                    first_item,
                    last_item,
                    state: BatchState::Running,
                    message: None,
                }),
            }
        });
    }

    pub(crate) fn batch_finished(&self, index: usize, state: BatchState, message: Option<String>) {
        self.update(|s| {
            if let Some(batch) = s.batches.iter_mut().find(|b| b.index == index) {
                batch.state = state;
                batch.message = message;
            }
        });
    }

    /// 任务结算：`completed` 恰好加一
    pub(crate) fn task_settled(&self, id: &TaskId, success: bool) {
        self.update(|s| {
            s.completed += 1;
            if !success {
                s.failed.insert(id.clone());
            }
        });
    }

    pub(crate) fn cooldown_entered(&self, secs: u64) {
        self.update(|s| {
            s.phase = RunPhase::Cooldown;
            s.cooldowns_entered += 1;
            s.cooldown_remaining_secs = Some(secs);
        });
    }

    pub(crate) fn cooldown_tick(&self, remaining: u64) {
        self.update(|s| s.cooldown_remaining_secs = Some(remaining));
    }

    pub(crate) fn cooldown_finished(&self) {
        self.update(|s| s.cooldown_remaining_secs = None);
    }

    /// 清除临时字段并进入结束状态
    pub(crate) fn finish(&self, outcome: RunOutcome) {
        self.update(|s| {
            s.cooldown_remaining_secs = None;
            s.current_range = None;
            s.phase = RunPhase::Finished(outcome);
        });
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProgressReporter")
            .field(&*self.tx.borrow())
            .finish()
    }
}
