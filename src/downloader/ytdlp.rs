use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::binaries::BinaryLocator;
use super::error::DownloadError;
use super::gateway::{SignalSender, WorkerGateway, WorkerSignal};
use super::progress::parse_progress_line;
use crate::queue::JobRequest;

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// 通过 yt-dlp 子进程执行下载
#[derive(Debug, Clone)]
pub struct YtDlpGateway {
    locator: BinaryLocator,
    signals: SignalSender,
}

impl YtDlpGateway {
    pub fn new(locator: BinaryLocator, signals: SignalSender) -> Self {
        Self { locator, signals }
    }

    pub fn locator(&self) -> &BinaryLocator {
        &self.locator
    }
}

/// 根据任务选项生成 yt-dlp 参数，链接放在最后
pub fn build_args(request: &JobRequest, ffmpeg: Option<&Path>) -> Vec<String> {
    let output = request.destination_path.join(OUTPUT_TEMPLATE);
    let mut args = vec![
        "--newline".to_string(),
        "-o".to_string(),
        output.to_string_lossy().into_owned(),
    ];

    if request.options.only_audio {
        args.push("-x".to_string());
        args.push("--audio-format".to_string());
        args.push("mp3".to_string());
    }

    if request.options.expand_playlist {
        args.push("--yes-playlist".to_string());
    } else {
        args.push("--no-playlist".to_string());
    }

    if request.options.strip_sponsor_segments {
        args.push("--sponsorblock-remove".to_string());
        args.push("all".to_string());
    }

    if let Some(ffmpeg) = ffmpeg {
        args.push("--ffmpeg-location".to_string());
        args.push(ffmpeg.to_string_lossy().into_owned());
    }

    args.push(request.url.clone());
    args
}

#[async_trait]
impl WorkerGateway for YtDlpGateway {
    async fn start_job(&self, request: &JobRequest) -> Result<(), DownloadError> {
        let program = self.locator.ytdlp().await?;
        let ffmpeg = self.locator.ffmpeg().await;
        let args = build_args(request, ffmpeg.as_deref());
        debug!("yt-dlp 参数: {:?}", args);

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DownloadError::SpawnFailed {
                program: program.clone(),
                source,
            })?;

        info!("已启动 yt-dlp: {}", request.url);
        let signals = self.signals.clone();
        tokio::spawn(async move {
            watch_process(&mut child, signals).await;
        });
        Ok(())
    }

    async fn resolve_title(&self, url: &str) -> Result<String, DownloadError> {
        let program = self.locator.ytdlp().await?;
        let output = Command::new(&program)
            .args(["--get-title", "--no-playlist", "--skip-download", url])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| DownloadError::SpawnFailed {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::ProcessFailed {
                code: output.status.code(),
                stderr: last_line(&stderr),
            });
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DownloadError::EmptyOutput(format!("标题 {}", url)))
    }
}

// 转发输出直到进程结束，最后发出 Complete 或 Error
async fn watch_process(child: &mut Child, signals: SignalSender) {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    futures::join!(
        forward_lines(stdout, &signals, None),
        forward_lines(stderr, &signals, Some("stderr: ")),
    );

    match child.wait().await {
        Ok(status) => {
            let code = status.code().unwrap_or(-1);
            debug!("yt-dlp 退出，代码 {}", code);
            let _ = signals.send(WorkerSignal::Complete(code));
        }
        Err(e) => {
            let _ = signals.send(WorkerSignal::Error(format!("等待 yt-dlp 结束失败: {}", e)));
        }
    }
}

async fn forward_lines<R>(reader: Option<R>, signals: &SignalSender, prefix: Option<&str>)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(percent) = parse_progress_line(&line) {
                    let _ = signals.send(WorkerSignal::Progress(percent));
                }
                let line = match prefix {
                    Some(prefix) => format!("{}{}", prefix, line),
                    None => line,
                };
                let _ = signals.send(WorkerSignal::Log(line));
            }
            Ok(None) => break,
            Err(e) => {
                warn!("读取 yt-dlp 输出失败: {}", e);
                break;
            }
        }
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}
