/// 模型目录服务客户端
///
/// 封装下载文件和运行建议任务两类远程调用
use crate::config::Config;
use crate::error::ClientError;
use crate::models::{DownloadItem, PendingItem};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// 下载结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReceipt {
    pub saved_path: PathBuf,
    pub bytes: u64,
}

/// 建议任务结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionResult {
    pub accepted: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// 模型文件来源
#[async_trait]
pub trait ModelFileSource: Send + Sync {
    async fn download_file(&self, item: &DownloadItem) -> Result<DownloadReceipt, ClientError>;
}

/// 服务端建议任务
#[async_trait]
pub trait SuggestionService: Send + Sync {
    async fn run_suggestion(&self, item: &PendingItem) -> Result<SuggestionResult, ClientError>;
}

/// 目录服务 HTTP 客户端
pub struct CatalogClient {
    http: Client,
    base_url: String,
    token: String,
    download_dir: PathBuf,
}

impl CatalogClient {
    /// 创建新的目录客户端
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.catalog_base_url.trim_end_matches('/').to_string(),
            token: config.catalog_token.clone(),
            download_dir: PathBuf::from(&config.download_dir),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    /// 发送请求并检查状态码
    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|source| ClientError::RequestFailed {
                endpoint: endpoint.to_string(),
                source,
            })?;

        check_status(endpoint, response)
    }
}

fn check_status(endpoint: &str, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(ClientError::RateLimited {
            endpoint: endpoint.to_string(),
            retry_after,
        });
    }
    if !status.is_success() {
        return Err(ClientError::BadStatus {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

#[async_trait]
impl ModelFileSource for CatalogClient {
    async fn download_file(&self, item: &DownloadItem) -> Result<DownloadReceipt, ClientError> {
        let endpoint = item.download_url.as_str();
        debug!("下载: {} -> {}", endpoint, item.relative_path().display());

        let response = self.send(endpoint, self.http.get(endpoint)).await?;
        let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::RequestFailed {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let saved_path = self.download_dir.join(item.relative_path());
        write_file(&saved_path, &body).await?;

        Ok(DownloadReceipt {
            saved_path,
            bytes: body.len() as u64,
        })
    }
}

#[async_trait]
impl SuggestionService for CatalogClient {
    async fn run_suggestion(&self, item: &PendingItem) -> Result<SuggestionResult, ClientError> {
        let endpoint = format!("{}/api/suggestions/run", self.base_url);
        let body = serde_json::json!({ "item_id": item.id });

        let response = self
            .send(&endpoint, self.http.post(&endpoint).json(&body))
            .await?;

        response
            .json::<SuggestionResult>()
            .await
            .map_err(|source| ClientError::RequestFailed { endpoint, source })
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// 先写临时文件再改名，失败时不留下半个文件
async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ClientError> {
    let write_failed = |source: std::io::Error| ClientError::WriteFailed {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let partial = partial_path(path);
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(write_failed)?;
    if let Err(e) = file.write_all(bytes).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(write_failed(e));
    }
    file.flush().await.map_err(write_failed)?;
    drop(file);

    tokio::fs::rename(&partial, path)
        .await
        .map_err(write_failed)?;
    Ok(())
}
