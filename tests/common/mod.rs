#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use ytdlp_queue::downloader::{DownloadError, SignalSender, WorkerGateway, WorkerSignal};
use ytdlp_queue::queue::{Job, JobRequest};

/// 每个链接对应的模拟行为
#[derive(Debug, Clone)]
pub enum Script {
    Signals(Vec<WorkerSignal>),
    RejectStart,
}

/// 按脚本发出信号的假下载进程，同时检查调用是否重叠
pub struct ScriptedGateway {
    signals: SignalSender,
    scripts: HashMap<String, Script>,
    titles: HashMap<String, String>,
    gate: Option<Arc<Notify>>,
    calls: Arc<Mutex<Vec<JobRequest>>>,
    in_flight: Arc<AtomicUsize>,
    overlapped: Arc<AtomicBool>,
}

impl ScriptedGateway {
    pub fn new(signals: SignalSender) -> Self {
        Self {
            signals,
            scripts: HashMap::new(),
            titles: HashMap::new(),
            gate: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            overlapped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn script(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    pub fn title(mut self, url: &str, title: &str) -> Self {
        self.titles.insert(url.to_string(), title.to_string());
        self
    }

    // 终止信号要等 gate 被通知后才发出
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<JobRequest>>> {
        Arc::clone(&self.calls)
    }

    pub fn overlapped(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.overlapped)
    }
}

#[async_trait]
impl WorkerGateway for ScriptedGateway {
    async fn start_job(&self, request: &JobRequest) -> Result<(), DownloadError> {
        self.calls.lock().await.push(request.clone());

        let script = self.scripts.get(&request.url).cloned().unwrap_or_else(|| {
            Script::Signals(vec![WorkerSignal::Progress(100), WorkerSignal::Complete(0)])
        });
        let signals = match script {
            Script::RejectStart => {
                return Err(DownloadError::BinaryMissing("yt-dlp".to_string()));
            }
            Script::Signals(signals) => signals,
        };

        if self.in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }

        let sender = self.signals.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let gate = self.gate.clone();
        tokio::spawn(async move {
            for signal in signals {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if signal.is_terminal() {
                    if let Some(gate) = &gate {
                        gate.notified().await;
                    }
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                let _ = sender.send(signal);
            }
        });
        Ok(())
    }

    async fn resolve_title(&self, url: &str) -> Result<String, DownloadError> {
        self.titles
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::EmptyOutput(url.to_string()))
    }
}

pub fn job(url: &str) -> Job {
    Job::new(url, "/d")
}
