use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::{JobField, QueueError};

/// 下载选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    pub only_audio: bool,
    pub expand_playlist: bool,
    pub strip_sponsor_segments: bool,
}

/// 队列中的一个下载任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub url: String,
    pub title: String,
    pub destination_path: String,
    pub format_only_audio: bool,
    pub expand_playlist: bool,
    pub strip_sponsor_segments: bool,
    // 仅在执行期间有意义，持久化时始终写 0
    #[serde(default, skip_deserializing, serialize_with = "zero_progress")]
    pub progress_percent: u8,
}

fn zero_progress<S: serde::Serializer>(_: &u8, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(0)
}

impl Job {
    /// 标题在解析出来之前默认使用链接本身
    pub fn new(url: impl Into<String>, destination_path: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            title: url.clone(),
            url,
            destination_path: destination_path.into(),
            format_only_audio: false,
            expand_playlist: false,
            strip_sponsor_segments: false,
            progress_percent: 0,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.format_only_audio = options.only_audio;
        self.expand_playlist = options.expand_playlist;
        self.strip_sponsor_segments = options.strip_sponsor_segments;
        self
    }

    pub fn options(&self) -> JobOptions {
        JobOptions {
            only_audio: self.format_only_audio,
            expand_playlist: self.expand_playlist,
            strip_sponsor_segments: self.strip_sponsor_segments,
        }
    }

    /// 交给下载进程的参数
    pub fn request(&self) -> JobRequest {
        JobRequest {
            url: self.url.clone(),
            destination_path: PathBuf::from(&self.destination_path),
            options: self.options(),
        }
    }
}

/// `WorkerGateway::start_job` 的参数集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub url: String,
    pub destination_path: PathBuf,
    pub options: JobOptions,
}

/// 可编辑的输入表单
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobForm {
    pub url: String,
    pub destination_path: String,
    pub options: JobOptions,
}

impl JobForm {
    pub fn new(url: impl Into<String>, destination_path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination_path: destination_path.into(),
            options: JobOptions::default(),
        }
    }

    // 用设置中的下载目录预填目标路径
    pub fn with_destination(destination_path: impl Into<String>) -> Self {
        Self::new(String::new(), destination_path)
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn from_job(job: &Job) -> Self {
        Self {
            url: job.url.clone(),
            destination_path: job.destination_path.clone(),
            options: job.options(),
        }
    }

    /// 校验必填字段，返回去除首尾空白后的任务
    pub fn validate(&self) -> Result<Job, QueueError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(QueueError::Validation(JobField::Url));
        }
        let destination = self.destination_path.trim();
        if destination.is_empty() {
            return Err(QueueError::Validation(JobField::DestinationPath));
        }
        Ok(Job::new(url, destination).with_options(self.options))
    }
}
