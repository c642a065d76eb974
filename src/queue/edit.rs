use tracing::{debug, info, warn};

use super::JobQueue;
use super::error::QueueError;
use super::job::{Job, JobForm};
use crate::downloader::WorkerGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Add,
    Update { index: usize },
}

/// 记录表单当前是在新增任务还是在编辑队列中的已有任务
#[derive(Debug, Clone)]
pub struct EditSession {
    form: JobForm,
    editing_index: Option<usize>,
    original_url: Option<String>,
    original_title: Option<String>,
}

impl EditSession {
    pub fn new(form: JobForm) -> Self {
        Self {
            form,
            editing_index: None,
            original_url: None,
            original_title: None,
        }
    }

    pub fn form(&self) -> &JobForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut JobForm {
        &mut self.form
    }

    pub fn editing_index(&self) -> Option<usize> {
        self.editing_index
    }

    pub fn original_url(&self) -> Option<&str> {
        self.original_url.as_deref()
    }

    pub fn mode(&self) -> EditMode {
        match self.editing_index {
            Some(index) => EditMode::Update { index },
            None => EditMode::Add,
        }
    }

    pub fn submit_label(&self) -> &'static str {
        match self.mode() {
            EditMode::Add => "Add to queue",
            EditMode::Update { .. } => "Update",
        }
    }

    // 把队列中的任务载入表单
    pub async fn begin_edit(&mut self, queue: &JobQueue, index: usize) -> Result<(), QueueError> {
        let job = match queue.get(index).await {
            Some(job) => job,
            None => {
                return Err(QueueError::IndexOutOfRange {
                    index,
                    len: queue.len().await,
                });
            }
        };

        debug!("开始编辑第 {} 项: {}", index, job.url);
        self.form = JobForm::from_job(&job);
        self.editing_index = Some(index);
        self.original_url = Some(job.url);
        self.original_title = Some(job.title);
        Ok(())
    }

    /// 链接输入框发生变化。编辑状态下任何改动都会退出编辑，需要重新确认。
    pub fn url_input_changed(&mut self, value: impl Into<String>) {
        self.form.url = value.into();
        if self.editing_index.is_some() {
            info!("链接已修改，退出编辑模式");
            self.cancel();
        }
    }

    pub fn cancel(&mut self) {
        self.editing_index = None;
        self.original_url = None;
        self.original_title = None;
    }

    /// 提交表单：编辑模式下替换原任务，否则加入队尾。
    ///
    /// 编辑期间队列可能被出队或删除改动，替换时按原链接找回任务；
    /// 原任务已不在队列中时退出编辑模式并保留表单内容。
    pub async fn commit(
        &mut self,
        queue: &JobQueue,
        gateway: &dyn WorkerGateway,
    ) -> Result<EditMode, QueueError> {
        let job = self.form.validate()?;

        match self.mode() {
            EditMode::Update { index } => {
                let expected_url = match &self.original_url {
                    Some(url) => url.clone(),
                    None => job.url.clone(),
                };
                let job = self.keep_original_title(job);
                match queue.update_matching(index, &expected_url, job).await {
                    Ok(position) => {
                        self.cancel();
                        Ok(EditMode::Update { index: position })
                    }
                    Err(e @ QueueError::StaleEdit(_)) => {
                        warn!("编辑的任务已离开队列，退出编辑模式: {}", expected_url);
                        self.cancel();
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            }
            EditMode::Add => {
                if queue.contains_url(&job.url).await {
                    return Err(QueueError::DuplicateJob(job.url));
                }
                let title = resolve_title_or_url(gateway, &job.url).await;
                queue.append(job.with_title(title)).await?;
                // 只清空链接，目录和选项留给下一条
                self.form.url.clear();
                Ok(EditMode::Add)
            }
        }
    }

    fn keep_original_title(&self, job: Job) -> Job {
        match (&self.original_url, &self.original_title) {
            (Some(url), Some(title)) if *url == job.url => job.with_title(title.clone()),
            _ => job,
        }
    }
}

/// 尽力解析标题，失败时退回链接本身
pub async fn resolve_title_or_url(gateway: &dyn WorkerGateway, url: &str) -> String {
    match gateway.resolve_title(url).await {
        Ok(title) if !title.trim().is_empty() => title.trim().to_string(),
        Ok(_) => url.to_string(),
        Err(e) => {
            warn!("获取标题失败，使用链接作为标题: {} ({})", url, e);
            url.to_string()
        }
    }
}
