//! 协作式控制信号（暂停 / 取消）
//!
//! `ControlToken` 是一个可克隆的句柄，显式传入每个挂起点，每次检查都按值读取，
//! 不会因为闭包捕获而读到过期状态。信号只在轮询点生效，从不打断正在执行的远程调用。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 暂停 / 取消令牌
#[derive(Debug, Clone, Default)]
pub struct ControlToken {
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl ControlToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// 取消后不可撤销
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 暂停期间按 `poll_interval` 轮询，直到恢复或取消
    ///
    /// 返回 `true` 表示可以继续派发，`false` 表示已取消。
    pub async fn wait_while_paused(&self, poll_interval: Duration) -> bool {
        while self.is_paused() && !self.is_cancelled() {
            tokio::time::sleep(poll_interval).await;
        }
        !self.is_cancelled()
    }

    /// 可被取消打断的睡眠，返回 `false` 表示睡眠期间被取消
    pub async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
