use std::fmt;

use thiserror::Error;

/// 表单中必须填写的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobField {
    Url,
    DestinationPath,
}

impl fmt::Display for JobField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobField::Url => write!(f, "url"),
            JobField::DestinationPath => write!(f, "destinationPath"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("缺少必填字段: {0}")]
    Validation(JobField),

    #[error("该链接已在队列中: {0}")]
    DuplicateJob(String),

    #[error("索引越界: {index} (队列长度 {len})")]
    IndexOutOfRange { index: usize, len: usize },

    // 编辑期间原任务已被取走或移除
    #[error("正在编辑的任务已不在队列中: {0}")]
    StaleEdit(String),

    // 仅供处理器判断何时停止
    #[error("队列为空")]
    EmptyQueue,
}

pub type Result<T> = std::result::Result<T, QueueError>;
