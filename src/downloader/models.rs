use std::fmt;

use chrono::{DateTime, Local};

/// 一个任务的最终结果。退出码只用于展示，不参与流程判断。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { exit_code: i32 },
    Failed { message: String },
}

impl JobOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. })
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed { exit_code } => write!(f, "下载结束，退出码 {}", exit_code),
            JobOutcome::Failed { message } => write!(f, "下载失败: {}", message),
        }
    }
}

/// 推送给界面的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    JobStarted {
        url: String,
        title: String,
    },
    // url 为 None 表示没有正在执行的任务
    Progress {
        url: Option<String>,
        percent: u8,
    },
    Log {
        url: Option<String>,
        line: String,
    },
    JobFinished {
        url: String,
        outcome: JobOutcome,
    },
    DrainFinished {
        completed: usize,
        failed: usize,
    },
}

// --------------------------------------------------------------------

/// 活动日志中的一行
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    // 归属的任务链接，或 "<unknown>" / "queue"
    pub job: String,
    pub line: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.at.format("%H:%M:%S"), self.job, self.line)
    }
}
