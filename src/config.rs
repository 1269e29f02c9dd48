use crate::error::{AppError, AppResult};
use crate::orchestrator::RunnerConfig;
use std::str::FromStr;

/// 运行模式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// 批量下载模型文件
    Download,
    /// 对待处理条目运行服务端建议任务
    Suggest,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(RunMode::Download),
            "suggest" => Ok(RunMode::Suggest),
            other => Err(format!("未知的运行模式: {}", other)),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    pub run_mode: RunMode,
    /// 任务文件或任务文件夹
    pub job_path: String,
    // --- 批量执行配置 ---
    pub concurrency_limit: usize,
    pub batch_size: usize,
    pub cooldown_secs: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub pause_poll_ms: u64,
    pub cooldown_after_last_batch: bool,
    // --- 目录服务配置 ---
    pub catalog_base_url: String,
    pub catalog_token: String,
    // --- 输出 ---
    pub download_dir: String,
    pub record_file: String,
    pub bookmark_file: String,
    pub retry_file: String,
    /// 只重跑重试列表中的任务
    pub retry_failed_only: bool,
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let runner = RunnerConfig::default();
        Self {
            run_mode: RunMode::Download,
            job_path: "jobs".to_string(),
            concurrency_limit: runner.concurrency_limit,
            batch_size: runner.batch_size,
            cooldown_secs: runner.cooldown_secs,
            jitter_min_ms: runner.jitter_min_ms,
            jitter_max_ms: runner.jitter_max_ms,
            pause_poll_ms: runner.pause_poll_ms,
            cooldown_after_last_batch: runner.cooldown_after_last_batch,
            catalog_base_url: "http://localhost:8080".to_string(),
            catalog_token: String::new(),
            download_dir: "downloads".to_string(),
            record_file: "downloaded.jsonl".to_string(),
            bookmark_file: "bookmarks.jsonl".to_string(),
            retry_file: "retry.txt".to_string(),
            retry_failed_only: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量加载，未设置的使用默认值，无法解析的返回错误
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 从任意键值来源加载
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let default = Self::default();
        Ok(Self {
            run_mode: parse_var(&lookup, "RUN_MODE", "download|suggest", default.run_mode)?,
            job_path: lookup("JOB_FILE").unwrap_or(default.job_path),
            concurrency_limit: parse_var(
                &lookup,
                "CONCURRENCY_LIMIT",
                "usize",
                default.concurrency_limit,
            )?,
            batch_size: parse_var(&lookup, "BATCH_SIZE", "usize", default.batch_size)?,
            cooldown_secs: parse_var(&lookup, "COOLDOWN_SECS", "u64", default.cooldown_secs)?,
            jitter_min_ms: parse_var(&lookup, "JITTER_MIN_MS", "u64", default.jitter_min_ms)?,
            jitter_max_ms: parse_var(&lookup, "JITTER_MAX_MS", "u64", default.jitter_max_ms)?,
            pause_poll_ms: parse_var(&lookup, "PAUSE_POLL_MS", "u64", default.pause_poll_ms)?,
            cooldown_after_last_batch: parse_var(
                &lookup,
                "COOLDOWN_AFTER_LAST_BATCH",
                "bool",
                default.cooldown_after_last_batch,
            )?,
            catalog_base_url: lookup("CATALOG_BASE_URL").unwrap_or(default.catalog_base_url),
            catalog_token: lookup("CATALOG_TOKEN").unwrap_or(default.catalog_token),
            download_dir: lookup("DOWNLOAD_DIR").unwrap_or(default.download_dir),
            record_file: lookup("RECORD_FILE").unwrap_or(default.record_file),
            bookmark_file: lookup("BOOKMARK_FILE").unwrap_or(default.bookmark_file),
            retry_file: lookup("RETRY_FILE").unwrap_or(default.retry_file),
            retry_failed_only: parse_var(
                &lookup,
                "RETRY_FAILED_ONLY",
                "bool",
                default.retry_failed_only,
            )?,
            output_log_file: lookup("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        })
    }

    /// 批量执行配置
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            concurrency_limit: self.concurrency_limit,
            batch_size: self.batch_size,
            cooldown_secs: self.cooldown_secs,
            jitter_min_ms: self.jitter_min_ms,
            jitter_max_ms: self.jitter_max_ms,
            pause_poll_ms: self.pause_poll_ms,
            cooldown_after_last_batch: self.cooldown_after_last_batch,
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    expected_type: &str,
    default: T,
) -> AppResult<T> {
    match lookup(var_name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| AppError::Config {
            var_name: var_name.to_string(),
            value,
            expected_type: expected_type.to_string(),
        }),
    }
}
