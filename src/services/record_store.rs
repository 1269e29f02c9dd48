//! 记录写入服务 - 业务能力层
//!
//! 下载记录和书签都以 JSON Lines 形式追加到文件，一行一条。

use crate::error::StoreError;
use crate::models::{Bookmark, DownloadRecord};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// 下载成功后保存记录
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn save_record(&self, record: &DownloadRecord) -> Result<(), StoreError>;
}

/// 建议任务成功后添加书签
#[async_trait]
pub trait BookmarkSink: Send + Sync {
    async fn add_bookmark(&self, bookmark: &Bookmark) -> Result<(), StoreError>;
}

/// JSON Lines 文件存储
///
/// 并发任务的写入通过互斥锁串行化，保证每行完整。
pub struct JsonlStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一行
    pub async fn append<T: Serialize + Sync>(&self, value: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(value)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.write_failed(source))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| self.write_failed(source))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|source| self.write_failed(source))?;
        file.flush()
            .await
            .map_err(|source| self.write_failed(source))?;

        debug!("写入记录: {} ({} 字节)", self.path.display(), line.len());
        Ok(())
    }

    fn write_failed(&self, source: std::io::Error) -> StoreError {
        StoreError::WriteFailed {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl RecordSink for JsonlStore {
    async fn save_record(&self, record: &DownloadRecord) -> Result<(), StoreError> {
        self.append(record).await
    }
}

#[async_trait]
impl BookmarkSink for JsonlStore {
    async fn add_bookmark(&self, bookmark: &Bookmark) -> Result<(), StoreError> {
        self.append(bookmark).await
    }
}
