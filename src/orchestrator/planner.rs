//! 批次规划
//!
//! 把有序任务列表切成固定大小、保持顺序的批次。纯函数，无共享状态。

use crate::error::{RunnerError, RunnerResult};

/// 批次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    /// 批次索引（从 0 开始）
    pub index: usize,
    /// 第一个任务在整个列表中的偏移
    pub offset: usize,
    pub items: Vec<T>,
}

impl<T> Batch<T> {
    /// 第一个任务的编号（从 1 开始）
    pub fn first_item(&self) -> usize {
        self.offset + 1
    }

    /// 最后一个任务的编号（从 1 开始，闭区间）
    pub fn last_item(&self) -> usize {
        self.offset + self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 计算批次数量
pub fn batch_count(total: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    total.div_ceil(batch_size)
}

/// 将任务列表切分为批次
///
/// 除最后一批外，每批恰好 `batch_size` 个任务。`batch_size` 为 0 时返回错误。
pub fn plan<T>(items: Vec<T>, batch_size: usize) -> RunnerResult<Vec<Batch<T>>> {
    if batch_size == 0 {
        return Err(RunnerError::InvalidConfig(
            "batch_size 必须大于 0".to_string(),
        ));
    }

    let mut batches = Vec::with_capacity(batch_count(items.len(), batch_size));
    let mut items = items.into_iter().peekable();
    let mut offset = 0;

    while items.peek().is_some() {
        let chunk: Vec<T> = items.by_ref().take(batch_size).collect();
        let len = chunk.len();
        batches.push(Batch {
            index: batches.len(),
            offset,
            items: chunk,
        });
        offset += len;
    }

    Ok(batches)
}
