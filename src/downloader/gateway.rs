use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::DownloadError;
use crate::queue::JobRequest;

/// 下载进程发出的信号，不携带任务标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerSignal {
    Progress(u8),
    Log(String),
    Error(String),
    Complete(i32),
}

impl WorkerSignal {
    /// `Error` 和 `Complete` 结束一个任务
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerSignal::Error(_) | WorkerSignal::Complete(_))
    }
}

pub type SignalSender = mpsc::UnboundedSender<WorkerSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<WorkerSignal>;

pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}

/// 外部下载进程的接口。
///
/// 信号没有任务标识，调用方必须保证同一时间只有一个任务在执行。
#[async_trait]
pub trait WorkerGateway: Send + Sync {
    /// 启动下载，进程启动后即返回；进度和结果通过信号通道送达
    async fn start_job(&self, request: &JobRequest) -> Result<(), DownloadError>;

    /// 获取标题，仅用于展示
    async fn resolve_title(&self, url: &str) -> Result<String, DownloadError>;
}
