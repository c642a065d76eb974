use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::job::Job;

/// 持久化记录的固定命名空间
pub const QUEUE_RECORD_KEY: &str = "ytdlp-queue";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("记录格式无效: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// 队列记录的持久化接口
#[async_trait]
pub trait QueueRecord: Send + Sync {
    async fn read(&self) -> Result<Vec<Job>>;
    async fn write(&self, jobs: &[Job]) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

// 读取时宽松解析，缺字段的条目在这里被过滤
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedJob {
    url: Option<String>,
    title: Option<String>,
    destination_path: Option<String>,
    #[serde(default)]
    format_only_audio: bool,
    #[serde(default)]
    expand_playlist: bool,
    #[serde(default)]
    strip_sponsor_segments: bool,
}

impl PersistedJob {
    fn into_job(self) -> Option<Job> {
        let url = self.url.filter(|u| !u.trim().is_empty())?;
        let destination = self.destination_path.filter(|d| !d.trim().is_empty())?;
        let mut job = Job::new(url, destination);
        if let Some(title) = self.title.filter(|t| !t.is_empty()) {
            job.title = title;
        }
        job.format_only_audio = self.format_only_audio;
        job.expand_playlist = self.expand_playlist;
        job.strip_sponsor_segments = self.strip_sponsor_segments;
        Some(job)
    }
}

/// 解析持久化的 JSON 数组，丢弃不合格的条目而不是整体拒绝
pub fn parse_queue_record(content: &str) -> Result<Vec<Job>> {
    let value: Value = serde_json::from_str(content)?;
    let Value::Array(entries) = value else {
        return Err(PersistenceError::InvalidRecord("顶层不是数组".to_string()));
    };

    let total = entries.len();
    let jobs: Vec<Job> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<PersistedJob>(entry).ok())
        .filter_map(PersistedJob::into_job)
        .collect();

    if jobs.len() < total {
        warn!("丢弃了 {} 条无效的队列记录", total - jobs.len());
    }
    Ok(jobs)
}

/// 以 JSON 文件保存队列
#[derive(Debug, Clone)]
pub struct JsonQueueFile {
    path: PathBuf,
}

impl JsonQueueFile {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(format!("{}.json", QUEUE_RECORD_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl QueueRecord for JsonQueueFile {
    async fn read(&self) -> Result<Vec<Job>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_queue_record(&content)
    }

    async fn write(&self, jobs: &[Job]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(jobs)?;
        // 先写临时文件再改名；每次写入用独立的临时文件
        let tmp = self
            .path
            .with_file_name(format!("{}.json.{}.tmp", QUEUE_RECORD_KEY, Uuid::new_v4()));
        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("队列已写入: {:?} ({} 项)", self.path, jobs.len());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 进程内的队列记录
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueRecord {
    jobs: Arc<Mutex<Option<Vec<Job>>>>,
}

impl MemoryQueueRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Some(jobs))),
        }
    }

    /// 记录是否存在（区分“空数组”与“已清除”）
    pub async fn exists(&self) -> bool {
        self.jobs.lock().await.is_some()
    }
}

#[async_trait]
impl QueueRecord for MemoryQueueRecord {
    async fn read(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.lock().await.clone().unwrap_or_default())
    }

    async fn write(&self, jobs: &[Job]) -> Result<()> {
        *self.jobs.lock().await = Some(jobs.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.jobs.lock().await = None;
        Ok(())
    }
}

/// 由“记住队列”开关控制的持久化适配器
#[derive(Clone)]
pub struct QueuePersistence {
    record: Arc<dyn QueueRecord>,
    remember: Arc<AtomicBool>,
}

impl QueuePersistence {
    pub fn new(record: Arc<dyn QueueRecord>, remember_queue: bool) -> Self {
        Self {
            record,
            remember: Arc::new(AtomicBool::new(remember_queue)),
        }
    }

    pub fn remember_queue(&self) -> bool {
        self.remember.load(Ordering::SeqCst)
    }

    pub fn set_remember_queue(&self, enabled: bool) {
        self.remember.store(enabled, Ordering::SeqCst);
    }

    pub async fn load(&self) -> Result<Vec<Job>> {
        if !self.remember_queue() {
            return Ok(Vec::new());
        }
        self.record.read().await
    }

    pub async fn save(&self, jobs: &[Job]) -> Result<()> {
        if !self.remember_queue() {
            return Ok(());
        }
        self.record.write(jobs).await
    }

    // 清除不受开关限制
    pub async fn clear(&self) -> Result<()> {
        self.record.clear().await
    }
}
