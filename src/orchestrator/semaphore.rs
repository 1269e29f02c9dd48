//! 有界工作池（计数信号量）
//!
//! 与批次逻辑无关，只负责"什么时候开始跑一个任务"：
//! - `active < limit` 时立即启动
//! - 否则进入 FIFO 等待队列，由先结束的任务在释放槽位时启动
//! - 槽位在 drop guard 中释放，任务 panic 也不会泄漏槽位
//!
//! 工作池从不检查任务结果。
//!
//! 没有直接用 `tokio::sync::Semaphore`：这里要对外暴露 `waiting()` 计数，
//! 并且由释放槽位的一方按 FIFO 顺序启动下一个任务。

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tracing::warn;

type Job = Box<dyn FnOnce(SlotGuard) -> BoxFuture<'static, ()> + Send + 'static>;

struct PoolState {
    active: usize,
    waiting: VecDeque<Job>,
}

struct Shared {
    limit: usize,
    state: Mutex<PoolState>,
    idle: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(self: &Arc<Self>, job: Job) {
        let guard = SlotGuard {
            shared: Arc::clone(self),
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(job(guard));
            }
            Err(_) => {
                // 没有运行时：丢弃任务，guard 随之释放槽位
                warn!("工作池不在 tokio 运行时中，任务被丢弃");
                drop(job(guard));
            }
        }
    }

    /// 释放一个槽位：最多启动一个等待中的任务
    fn release(self: &Arc<Self>) {
        let next = {
            let mut state = self.lock();
            match state.waiting.pop_front() {
                Some(job) => Some(job),
                None => {
                    state.active -= 1;
                    None
                }
            }
        };

        match next {
            Some(job) => self.start(job),
            None => self.idle.notify_waiters(),
        }
    }
}

/// 持有一个执行槽位，drop 时释放
struct SlotGuard {
    shared: Arc<Shared>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.shared.release();
    }
}

/// 任务句柄
///
/// 任务完整运行且槽位已释放后完成。任务 panic 时得到 `None`。
pub struct PoolHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for PoolHandle<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

/// 有界工作池
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// 创建工作池，`limit` 会被提升到至少 1
    pub fn new(limit: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                limit: limit.max(1),
                state: Mutex::new(PoolState {
                    active: 0,
                    waiting: VecDeque::new(),
                }),
                idle: Notify::new(),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.shared.limit
    }

    /// 当前占用的槽位数
    pub fn active(&self) -> usize {
        self.shared.lock().active
    }

    /// 等待队列长度
    pub fn waiting(&self) -> usize {
        self.shared.lock().waiting.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.shared.lock();
        state.active == 0 && state.waiting.is_empty()
    }

    /// 提交任务
    ///
    /// 必须在 tokio 运行时中调用。
    pub fn submit<F, T>(&self, job: F) -> PoolHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move |guard: SlotGuard| {
            Box::pin(async move {
                let output = job.await;
                drop(guard);
                let _ = tx.send(output);
            })
        });

        let start_now = {
            let mut state = self.shared.lock();
            if state.active < self.shared.limit {
                state.active += 1;
                Some(job)
            } else {
                state.waiting.push_back(job);
                None
            }
        };

        if let Some(job) = start_now {
            self.shared.start(job);
        }

        PoolHandle { rx }
    }

    /// 等待所有槽位释放且队列为空
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("WorkerPool")
            .field("limit", &self.shared.limit)
            .field("active", &state.active)
            .field("waiting", &state.waiting.len())
            .finish()
    }
}
