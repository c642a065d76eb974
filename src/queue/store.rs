use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::error::{QueueError, Result};
use super::job::Job;

/// 按加入顺序排列的待下载任务，先进先出。
///
/// 出队的任务在结束前记在 `in_flight`，不算在队列里，但仍写入持久化记录。
#[derive(Debug, Clone, Default)]
pub struct QueueStore {
    jobs: Vec<Job>,
    in_flight: Option<Job>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.jobs.iter().any(|job| job.url == url)
    }

    pub fn position_of(&self, url: &str) -> Option<usize> {
        self.jobs.iter().position(|job| job.url == url)
    }

    // 追加到队尾，链接重复时拒绝
    pub fn append(&mut self, job: Job) -> Result<()> {
        if self.contains_url(&job.url) {
            return Err(QueueError::DuplicateJob(job.url));
        }
        debug!("加入队列: {}", job.url);
        self.jobs.push(job);
        Ok(())
    }

    /// 一次性删除多个索引，按降序处理避免下标错位；越界的索引直接忽略。
    /// 返回被删除的任务（按原顺序）。
    pub fn remove_at<I>(&mut self, indices: I) -> Vec<Job>
    where
        I: IntoIterator<Item = usize>,
    {
        let indices: BTreeSet<usize> = indices.into_iter().collect();
        let mut removed = Vec::with_capacity(indices.len());
        for index in indices.into_iter().rev() {
            if index < self.jobs.len() {
                removed.push(self.jobs.remove(index));
            } else {
                debug!("忽略越界索引: {}", index);
            }
        }
        removed.reverse();
        removed
    }

    // 整体替换，不再检查链接唯一性
    pub fn update_at(&mut self, index: usize, job: Job) -> Result<()> {
        let len = self.jobs.len();
        let slot = self
            .jobs
            .get_mut(index)
            .ok_or(QueueError::IndexOutOfRange { index, len })?;
        *slot = job;
        Ok(())
    }

    /// 替换编辑开始时位于 `index` 的任务。
    /// 队列在此期间变动过时按链接重新定位，原任务已不在队列中则返回 `StaleEdit`。
    pub fn update_matching(&mut self, index: usize, expected_url: &str, job: Job) -> Result<usize> {
        let position = match self.jobs.get(index) {
            Some(current) if current.url == expected_url => index,
            _ => self
                .position_of(expected_url)
                .ok_or_else(|| QueueError::StaleEdit(expected_url.to_string()))?,
        };
        if position != index {
            debug!("编辑的任务已从第 {} 项移到第 {} 项", index, position);
        }
        self.jobs[position] = job;
        Ok(position)
    }

    pub fn dequeue_front(&mut self) -> Result<Job> {
        if self.jobs.is_empty() {
            return Err(QueueError::EmptyQueue);
        }
        let job = self.jobs.remove(0);
        self.in_flight = Some(job.clone());
        Ok(job)
    }

    pub fn in_flight(&self) -> Option<&Job> {
        self.in_flight.as_ref()
    }

    // 任务收到终止信号后调用
    pub fn finish_in_flight(&mut self) -> Option<Job> {
        self.in_flight.take()
    }

    /// 要持久化的内容：执行中的任务在前，其后是排队的任务
    pub fn record(&self) -> Vec<Job> {
        self.in_flight
            .iter()
            .chain(self.jobs.iter())
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            jobs: Arc::from(self.jobs.as_slice()),
        }
    }
}

/// 队列的只读视图，可以反复遍历
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    jobs: Arc<[Job]>,
}

impl QueueSnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    pub fn urls(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.url.as_str()).collect()
    }

    pub fn to_vec(&self) -> Vec<Job> {
        self.jobs.to_vec()
    }
}

impl<'a> IntoIterator for &'a QueueSnapshot {
    type Item = &'a Job;
    type IntoIter = std::slice::Iter<'a, Job>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.iter()
    }
}
