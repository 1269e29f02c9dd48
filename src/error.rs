//! 错误类型
//!
//! 按来源分为三类：
//! - `RunnerError` - 编排器内部错误（配置非法、工作池损坏），会中止整个运行
//! - `ClientError` - 远程目录服务调用错误，只会让单个任务失败
//! - `StoreError` - 记录文件写入错误，只会被记录为副作用失败

use thiserror::Error;

/// 编排器内部错误
///
/// 任务本身的失败不会出现在这里，它们在批次内部被捕获并记录。
#[derive(Debug, Error)]
pub enum RunnerError {
    /// 配置非法
    #[error("运行配置非法: {0}")]
    InvalidConfig(String),

    /// 工作池在任务结算前被丢弃
    #[error("任务 {task_id} 的结果通道已关闭")]
    ResultChannelClosed { task_id: String },
}

/// 远程目录服务错误
#[derive(Debug, Error)]
pub enum ClientError {
    /// 网络请求失败
    #[error("请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// 服务端返回非成功状态码
    #[error("服务端返回错误 ({endpoint}): HTTP {status}")]
    BadStatus { endpoint: String, status: u16 },

    /// 请求频率限制
    #[error("请求频率限制 ({endpoint}), 建议等待: {retry_after:?}秒")]
    RateLimited {
        endpoint: String,
        retry_after: Option<u64>,
    },

    /// 写入下载文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 记录文件错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("写入记录文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("记录序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// 配置错误
    #[error("配置错误: 环境变量 {var_name} 的值 '{value}' 无法转换为 {expected_type}")]
    Config {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 编排器结果类型
pub type RunnerResult<T> = Result<T, RunnerError>;
