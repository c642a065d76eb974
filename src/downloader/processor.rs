use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::correlator::{JobMonitor, QUEUE_LABEL};
use super::gateway::WorkerGateway;
use super::models::{JobOutcome, QueueEvent};
use crate::queue::{Job, JobQueue, QueueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    Draining,
}

/// 一次清空队列的结果，按处理顺序记录
#[derive(Debug, Clone)]
pub struct DrainSummary {
    pub run_id: Uuid,
    pub completed: Vec<String>,
    // (链接, 错误信息)
    pub failed: Vec<(String, String)>,
}

impl DrainSummary {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            completed: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

#[derive(Debug)]
pub enum StartOutcome {
    Finished(DrainSummary),
    AlreadyDraining,
}

#[derive(Debug)]
pub enum SpawnOutcome {
    Started(JoinHandle<DrainSummary>),
    AlreadyDraining,
}

// 持有期间处理器处于 Draining，离开作用域时回到 Idle
struct DrainGuard {
    draining: Arc<AtomicBool>,
    armed: bool,
}

impl DrainGuard {
    fn release(&mut self) {
        if self.armed {
            self.draining.store(false, Ordering::SeqCst);
            self.armed = false;
        }
    }

    // 别的调用者已经抢先占用时返回 false
    fn reclaim(&mut self) -> bool {
        if !self.armed {
            self.armed = self
                .draining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
        }
        self.armed
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// 逐个取出队首任务交给下载进程，等到终止信号后再处理下一个。
///
/// 同一时间只有一个任务在执行：`EventCorrelator` 依赖这一点把无标识的
/// 信号归属到当前任务。要并发执行必须先给信号加上任务标识。
#[derive(Clone)]
pub struct SequentialProcessor {
    queue: JobQueue,
    gateway: Arc<dyn WorkerGateway>,
    monitor: JobMonitor,
    draining: Arc<AtomicBool>,
}

impl SequentialProcessor {
    pub fn new(queue: JobQueue, gateway: Arc<dyn WorkerGateway>, monitor: JobMonitor) -> Self {
        Self {
            queue,
            gateway,
            monitor,
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> ProcessorState {
        if self.draining.load(Ordering::SeqCst) {
            ProcessorState::Draining
        } else {
            ProcessorState::Idle
        }
    }

    pub fn monitor(&self) -> &JobMonitor {
        &self.monitor
    }

    /// 在当前任务中清空队列；已经在运行时直接返回
    pub async fn drain(&self) -> StartOutcome {
        match self.try_claim().await {
            Some(guard) => StartOutcome::Finished(self.run_claimed(guard).await),
            None => StartOutcome::AlreadyDraining,
        }
    }

    /// 在后台任务中清空队列
    pub async fn spawn(&self) -> SpawnOutcome {
        match self.try_claim().await {
            Some(guard) => {
                let this = self.clone();
                SpawnOutcome::Started(tokio::spawn(async move { this.run_claimed(guard).await }))
            }
            None => SpawnOutcome::AlreadyDraining,
        }
    }

    async fn try_claim(&self) -> Option<DrainGuard> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("已经有下载在进行中");
            self.monitor
                .activity
                .push(QUEUE_LABEL, "A download is already in progress")
                .await;
            return None;
        }
        Some(DrainGuard {
            draining: Arc::clone(&self.draining),
            armed: true,
        })
    }

    async fn run_claimed(&self, mut guard: DrainGuard) -> DrainSummary {
        let summary = DrainSummary::new();
        let span = info_span!("drain", run_id = %summary.run_id);
        self.drain_loop(summary, &mut guard).instrument(span).await
    }

    async fn drain_loop(&self, mut summary: DrainSummary, guard: &mut DrainGuard) -> DrainSummary {
        info!("开始处理队列");
        self.monitor.activity.push(QUEUE_LABEL, "Starting download...").await;

        loop {
            let job = match self.queue.dequeue_front().await {
                Ok(job) => job,
                Err(QueueError::EmptyQueue) => {
                    self.monitor.current.clear().await;
                    self.monitor.activity.set_status("").await;
                    // 先回到 Idle 再检查一次：此前加入的任务在这里接着处理，
                    // 之后加入的任务由新的 spawn 处理
                    guard.release();
                    if !self.queue.is_empty().await && guard.reclaim() {
                        info!("队列中有新加入的任务，继续处理");
                        continue;
                    }
                    break;
                }
                Err(e) => {
                    error!("取出任务失败: {}", e);
                    self.monitor.current.clear().await;
                    self.monitor.activity.set_status("").await;
                    break;
                }
            };

            let url = job.url.clone();
            let outcome = self.run_job(job).await;
            match &outcome {
                JobOutcome::Completed { exit_code } => {
                    info!("任务完成: {} (退出码 {})", url, exit_code);
                    self.monitor
                        .activity
                        .push(url.clone(), format!("Finished {}", url))
                        .await;
                    summary.completed.push(url.clone());
                }
                JobOutcome::Failed { message } => {
                    warn!("任务失败: {}: {}", url, message);
                    self.monitor
                        .activity
                        .push(url.clone(), format!("Failed to download {}: {}", url, message))
                        .await;
                    summary.failed.push((url.clone(), message.clone()));
                }
            }

            self.queue.finish_in_flight().await;
            self.monitor.current.clear().await;
            self.monitor.publish(QueueEvent::JobFinished { url, outcome });
        }

        info!(
            "队列处理结束: 完成 {} 个, 失败 {} 个",
            summary.completed.len(),
            summary.failed.len()
        );
        self.monitor.publish(QueueEvent::DrainFinished {
            completed: summary.completed.len(),
            failed: summary.failed.len(),
        });
        summary
    }

    async fn run_job(&self, job: Job) -> JobOutcome {
        let request = job.request();
        let (url, title) = (job.url.clone(), job.title.clone());

        // 先登记当前任务，再启动进程，保证最早的信号也能归属
        let done = self.monitor.current.begin(job).await;
        info!("开始处理: {}", url);
        self.monitor
            .activity
            .push(url.clone(), format!("Processing {}...", url))
            .await;
        self.monitor.activity.set_status(format!("{}: 0%", title)).await;
        self.monitor.publish(QueueEvent::JobStarted {
            url: url.clone(),
            title,
        });

        if let Err(e) = self.gateway.start_job(&request).await {
            // 启动失败等同于收到 error 信号
            return JobOutcome::Failed {
                message: e.to_string(),
            };
        }

        done.await.unwrap_or_else(|_| JobOutcome::Failed {
            message: "任务结束前信号通道已关闭".to_string(),
        })
    }
}
