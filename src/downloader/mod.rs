use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::queue::{EditMode, EditSession, JobQueue, QueueError};

pub mod binaries;
pub mod correlator;
pub mod error;
pub mod gateway;
pub mod models;
pub mod processor;
pub mod progress;
pub mod ytdlp;

pub use binaries::{BinaryLocator, BinaryStatus};
pub use correlator::{Activity, CurrentJob, EventCorrelator, JobMonitor};
pub use error::DownloadError;
pub use gateway::{SignalReceiver, SignalSender, WorkerGateway, WorkerSignal, signal_channel};
pub use models::{JobOutcome, LogEntry, QueueEvent};
pub use processor::{DrainSummary, ProcessorState, SequentialProcessor, SpawnOutcome, StartOutcome};
pub use ytdlp::YtDlpGateway;

/// 把队列、下载进程、关联器和处理器接在一起
pub struct DownloadRuntime {
    queue: JobQueue,
    gateway: Arc<dyn WorkerGateway>,
    processor: SequentialProcessor,
    correlator: JoinHandle<()>,
}

impl DownloadRuntime {
    /// 创建信号通道，用发送端构造下载进程，接收端交给关联器。
    /// 需要在 tokio 运行时中调用。
    pub fn start<G, F>(queue: JobQueue, make_gateway: F) -> Self
    where
        G: WorkerGateway + 'static,
        F: FnOnce(SignalSender) -> G,
    {
        let (sender, receiver) = signal_channel();
        let gateway: Arc<dyn WorkerGateway> = Arc::new(make_gateway(sender));
        let monitor = JobMonitor::new();
        let correlator = EventCorrelator::new(monitor.clone()).spawn(receiver);
        let processor = SequentialProcessor::new(queue.clone(), Arc::clone(&gateway), monitor);

        Self {
            queue,
            gateway,
            processor,
            correlator,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn gateway(&self) -> &dyn WorkerGateway {
        self.gateway.as_ref()
    }

    pub fn processor(&self) -> &SequentialProcessor {
        &self.processor
    }

    pub fn monitor(&self) -> &JobMonitor {
        self.processor.monitor()
    }

    // 提交表单的便捷方法
    pub async fn commit(&self, session: &mut EditSession) -> Result<EditMode, QueueError> {
        session.commit(&self.queue, self.gateway.as_ref()).await
    }

    pub fn shutdown(self) {
        self.correlator.abort();
    }
}
