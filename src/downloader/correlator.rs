use std::sync::Arc;

use chrono::Local;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::gateway::{SignalReceiver, WorkerSignal};
use super::models::{JobOutcome, LogEntry, QueueEvent};
use crate::queue::Job;

/// 没有正在执行的任务时，信号归到这个占位名下
pub const UNKNOWN_JOB: &str = "<unknown>";
/// 队列本身（而非某个任务）产生的日志
pub const QUEUE_LABEL: &str = "queue";

const EVENT_CAPACITY: usize = 256;

struct ActiveJob {
    job: Job,
    done: Option<oneshot::Sender<JobOutcome>>,
}

/// 当前正在执行的任务。
///
/// 处理器和关联器持有同一个槽位；信号没有任务标识，
/// 全靠这里同一时间最多只有一个任务来归属。
#[derive(Clone, Default)]
pub struct CurrentJob {
    slot: Arc<Mutex<Option<ActiveJob>>>,
}

impl CurrentJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置当前任务，返回在终止信号到达时完成的接收端
    pub async fn begin(&self, job: Job) -> oneshot::Receiver<JobOutcome> {
        let (tx, rx) = oneshot::channel();
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.as_ref() {
            warn!("上一个任务尚未清除: {}", previous.job.url);
        }
        *slot = Some(ActiveJob {
            job,
            done: Some(tx),
        });
        rx
    }

    pub async fn clear(&self) -> Option<Job> {
        self.slot.lock().await.take().map(|active| active.job)
    }

    pub async fn job(&self) -> Option<Job> {
        self.slot.lock().await.as_ref().map(|active| active.job.clone())
    }

    pub async fn url(&self) -> Option<String> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|active| active.job.url.clone())
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    // 返回 (链接, 标题)
    async fn set_progress(&self, percent: u8) -> Option<(String, String)> {
        let mut slot = self.slot.lock().await;
        let active = slot.as_mut()?;
        active.job.progress_percent = percent.min(100);
        Some((active.job.url.clone(), active.job.title.clone()))
    }

    // 唤醒等待中的处理器；同一任务的重复终止信号只记日志
    async fn finish(&self, outcome: JobOutcome) -> Option<(String, bool)> {
        let mut slot = self.slot.lock().await;
        let active = slot.as_mut()?;
        let delivered = match active.done.take() {
            Some(done) => done.send(outcome).is_ok(),
            None => false,
        };
        Some((active.job.url.clone(), delivered))
    }
}

#[derive(Debug, Default)]
struct ActivityState {
    status: String,
    log: Vec<LogEntry>,
}

/// 可观察的状态：一行状态文字和只追加的日志
#[derive(Clone, Default)]
pub struct Activity {
    inner: Arc<Mutex<ActivityState>>,
}

impl Activity {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status(&self) -> String {
        self.inner.lock().await.status.clone()
    }

    pub async fn set_status(&self, status: impl Into<String>) {
        self.inner.lock().await.status = status.into();
    }

    pub async fn push(&self, job: impl Into<String>, line: impl Into<String>) {
        self.inner.lock().await.log.push(LogEntry {
            at: Local::now(),
            job: job.into(),
            line: line.into(),
        });
    }

    pub async fn log(&self) -> Vec<LogEntry> {
        self.inner.lock().await.log.clone()
    }

    pub async fn log_lines(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .log
            .iter()
            .map(|entry| entry.line.clone())
            .collect()
    }
}

/// 处理器与关联器共享的状态
#[derive(Clone)]
pub struct JobMonitor {
    pub current: CurrentJob,
    pub activity: Activity,
    events: broadcast::Sender<QueueEvent>,
}

impl JobMonitor {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current: CurrentJob::new(),
            activity: Activity::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    // 没有订阅者时发送失败是正常的
    pub fn publish(&self, event: QueueEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for JobMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// 把无标识的信号归属到当前任务
#[derive(Clone)]
pub struct EventCorrelator {
    monitor: JobMonitor,
}

impl EventCorrelator {
    pub fn new(monitor: JobMonitor) -> Self {
        Self { monitor }
    }

    pub async fn handle(&self, signal: WorkerSignal) {
        match signal {
            WorkerSignal::Progress(percent) => self.on_progress(percent).await,
            WorkerSignal::Log(line) => self.on_log(line).await,
            WorkerSignal::Error(message) => {
                self.on_terminal(JobOutcome::Failed { message }).await
            }
            WorkerSignal::Complete(exit_code) => {
                self.on_terminal(JobOutcome::Completed { exit_code }).await
            }
        }
    }

    /// 消费信号直到通道关闭
    pub async fn run(self, mut receiver: SignalReceiver) {
        while let Some(signal) = receiver.recv().await {
            self.handle(signal).await;
        }
        debug!("信号通道已关闭");
        // 不能让处理器永远等下去
        if self.monitor.current.is_active().await {
            self.on_terminal(JobOutcome::Failed {
                message: "信号通道已关闭".to_string(),
            })
            .await;
        }
    }

    pub fn spawn(self, receiver: SignalReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }

    async fn on_progress(&self, percent: u8) {
        let percent = percent.min(100);
        match self.monitor.current.set_progress(percent).await {
            Some((url, title)) => {
                self.monitor
                    .activity
                    .set_status(format!("{}: {}%", title, percent))
                    .await;
                self.monitor.publish(QueueEvent::Progress {
                    url: Some(url),
                    percent,
                });
            }
            None => {
                self.monitor
                    .activity
                    .push(UNKNOWN_JOB, format!("进度 {}%", percent))
                    .await;
                self.monitor.publish(QueueEvent::Progress { url: None, percent });
            }
        }
    }

    async fn on_log(&self, line: String) {
        let url = self.monitor.current.url().await;
        let label = url.clone().unwrap_or_else(|| UNKNOWN_JOB.to_string());
        self.monitor.activity.push(label, line.clone()).await;
        self.monitor.publish(QueueEvent::Log { url, line });
    }

    async fn on_terminal(&self, outcome: JobOutcome) {
        let line = outcome.to_string();
        let failed = outcome.is_failed();
        match self.monitor.current.finish(outcome).await {
            Some((url, delivered)) => {
                if !delivered {
                    debug!("重复的终止信号: {}", url);
                } else if failed {
                    warn!("{}: {}", url, line);
                } else {
                    info!("{}: {}", url, line);
                }
                self.monitor.activity.push(url, line).await;
            }
            None => {
                self.monitor.activity.push(UNKNOWN_JOB, line).await;
            }
        }
    }
}
