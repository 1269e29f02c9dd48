use serde::{Deserialize, Serialize};

/// 待下载的模型文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItem {
    #[serde(deserialize_with = "deserialize_id")]
    pub model_id: String,
    pub model_name: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub version_id: String,
    pub version_name: String,
    pub file_name: String,
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_kb: Option<u64>,
}

impl DownloadItem {
    /// 任务标识：`模型/版本/文件名`
    pub fn task_key(&self) -> String {
        format!("{}/{}/{}", self.model_id, self.version_id, self.file_name)
    }

    /// 相对下载目录的保存路径
    pub fn relative_path(&self) -> std::path::PathBuf {
        [
            sanitize_segment(&self.model_name),
            sanitize_segment(&self.version_name),
            sanitize_segment(&self.file_name),
        ]
        .iter()
        .collect()
    }
}

/// 等待服务端生成建议的条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingItem {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub model_id: Option<String>,
    #[serde(default)]
    pub title: String,
}

/// 下载成功后保存的记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub model_id: String,
    pub version_id: String,
    pub file_name: String,
    pub saved_path: String,
    pub bytes: u64,
    pub downloaded_at: String,
}

/// 建议任务成功后添加的书签
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: String,
}

/// 一个任务文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub files: Vec<DownloadItem>,
    #[serde(default)]
    pub pending: Vec<PendingItem>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

/// 去掉路径分隔符等不能出现在文件名里的字符
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

// 目录接口里的 ID 有时是字符串、有时是整数
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer id")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_id(deserializer).map(Some)
}
