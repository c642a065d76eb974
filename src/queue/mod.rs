use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub mod edit;
pub mod error;
pub mod job;
pub mod persistence;
pub mod store;

pub use edit::{EditMode, EditSession};
pub use error::{JobField, QueueError};
pub use job::{Job, JobForm, JobOptions, JobRequest};
pub use persistence::{JsonQueueFile, MemoryQueueRecord, QueuePersistence, QueueRecord};
pub use store::{QueueSnapshot, QueueStore};

/// 队列句柄：内存中的 `QueueStore` 加上持久化。
///
/// 所有修改先在内存中生效，然后写入持久化记录；写入失败只记录日志。
/// 记录的读取快照和写入都在 `write_lock` 内完成，后写入的一定是较新的内容。
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<Mutex<QueueStore>>,
    persistence: QueuePersistence,
    write_lock: Arc<Mutex<()>>,
}

impl JobQueue {
    pub fn new(persistence: QueuePersistence) -> Self {
        Self {
            store: Arc::new(Mutex::new(QueueStore::new())),
            persistence,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 不做持久化的队列
    pub fn in_memory() -> Self {
        Self::new(QueuePersistence::new(Arc::new(MemoryQueueRecord::new()), false))
    }

    pub fn persistence(&self) -> &QueuePersistence {
        &self.persistence
    }

    // 启动时恢复上次保存的队列
    pub async fn restore(&self) -> usize {
        let jobs = match self.persistence.load().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("读取保存的队列失败: {}", e);
                return 0;
            }
        };

        let mut restored = 0;
        {
            let mut store = self.store.lock().await;
            for job in jobs {
                if store.append(job).is_ok() {
                    restored += 1;
                }
            }
        }
        if restored > 0 {
            info!("已恢复 {} 个队列任务", restored);
        }
        restored
    }

    pub async fn append(&self, job: Job) -> Result<(), QueueError> {
        let url = job.url.clone();
        self.store.lock().await.append(job)?;
        info!("已加入队列: {}", url);
        self.persist().await;
        Ok(())
    }

    pub async fn remove_at<I>(&self, indices: I) -> Vec<Job>
    where
        I: IntoIterator<Item = usize>,
    {
        let removed = self.store.lock().await.remove_at(indices);
        for job in &removed {
            info!("已从队列移除: {}", job.url);
        }
        self.persist().await;
        removed
    }

    pub async fn update_at(&self, index: usize, job: Job) -> Result<(), QueueError> {
        let url = job.url.clone();
        self.store.lock().await.update_at(index, job)?;
        info!("已更新队列第 {} 项: {}", index, url);
        self.persist().await;
        Ok(())
    }

    /// 按编辑开始时的位置和链接替换任务，返回实际替换的位置
    pub async fn update_matching(
        &self,
        index: usize,
        expected_url: &str,
        job: Job,
    ) -> Result<usize, QueueError> {
        let position = self
            .store
            .lock()
            .await
            .update_matching(index, expected_url, job)?;
        info!("已更新队列第 {} 项: {}", position, expected_url);
        self.persist().await;
        Ok(position)
    }

    // 出队不写持久化，任务结束后由 finish_in_flight 写
    pub async fn dequeue_front(&self) -> Result<Job, QueueError> {
        self.store.lock().await.dequeue_front()
    }

    /// 当前任务已结束：从记录中去掉它并写入
    pub async fn finish_in_flight(&self) -> Option<Job> {
        let finished = self.store.lock().await.finish_in_flight();
        self.persist().await;
        finished
    }

    pub async fn in_flight(&self) -> Option<Job> {
        self.store.lock().await.in_flight().cloned()
    }

    pub async fn clear(&self) {
        let _write = self.write_lock.lock().await;
        self.store.lock().await.clear();
        if let Err(e) = self.persistence.clear().await {
            error!("清除队列记录失败: {}", e);
        }
        info!("队列已清空");
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        self.store.lock().await.snapshot()
    }

    pub async fn get(&self, index: usize) -> Option<Job> {
        self.store.lock().await.get(index).cloned()
    }

    pub async fn contains_url(&self, url: &str) -> bool {
        self.store.lock().await.contains_url(url)
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.is_empty()
    }

    /// 切换“记住队列”：关闭时清除记录，打开时立即写入当前内容
    pub async fn set_remember_queue(&self, enabled: bool) {
        self.persistence.set_remember_queue(enabled);
        if enabled {
            self.persist().await;
            return;
        }
        let _write = self.write_lock.lock().await;
        if let Err(e) = self.persistence.clear().await {
            error!("清除队列记录失败: {}", e);
        }
    }

    /// 把当前内容（含执行中的任务）写入持久化记录
    pub async fn persist(&self) {
        let _write = self.write_lock.lock().await;
        let jobs = self.store.lock().await.record();
        if let Err(e) = self.persistence.save(&jobs).await {
            error!("保存队列失败: {}", e);
        }
    }
}
