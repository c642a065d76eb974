use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use ytdlp_queue::common::logger::PrettyLogger;
use ytdlp_queue::config::{self, ConfigManager, UserConfig};
use ytdlp_queue::downloader::progress::JobProgressBar;
use ytdlp_queue::downloader::{
    BinaryLocator, DownloadRuntime, JobOutcome, QueueEvent, SpawnOutcome, YtDlpGateway,
};
use ytdlp_queue::queue::{
    EditMode, EditSession, JobForm, JobOptions, JobQueue, JsonQueueFile, QueueError,
    QueuePersistence,
};
use ytdlp_queue::{log_complete, log_error, log_info, log_step, log_success, log_warning};

mod cli;

use cli::{Command, ConfigCommand, ConfigSetArgs};

/// 处理 add 命令
async fn handle_add(
    runtime: &DownloadRuntime,
    manager: &ConfigManager,
    url: String,
    dest: Option<PathBuf>,
    options: JobOptions,
) -> anyhow::Result<()> {
    let destination = match dest {
        Some(dest) => path_to_string(&dest)?,
        None => manager.download_dir().context("无法确定下载目录")?,
    };

    let mut session = EditSession::new(JobForm::with_destination(destination).with_options(options));
    session.url_input_changed(url.clone());

    match runtime.commit(&mut session).await {
        Ok(_) => {
            log_success!("已加入队列: {}", url);
            Ok(())
        }
        Err(QueueError::DuplicateJob(url)) => {
            log_warning!("该链接已在队列中，跳过: {}", url);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// 处理 edit 命令
async fn handle_edit(
    runtime: &DownloadRuntime,
    manager: &ConfigManager,
    index: usize,
    dest: Option<PathBuf>,
    audio_only: Option<bool>,
    playlist: Option<bool>,
    sponsorblock: Option<bool>,
) -> anyhow::Result<()> {
    let destination = manager.download_dir().context("无法确定下载目录")?;
    let mut session = EditSession::new(JobForm::with_destination(destination));
    session.begin_edit(runtime.queue(), index).await?;
    debug!("编辑模式: {:?} ({})", session.mode(), session.submit_label());

    let form = session.form_mut();
    if let Some(dest) = dest {
        form.destination_path = path_to_string(&dest)?;
    }
    if let Some(value) = audio_only {
        form.options.only_audio = value;
    }
    if let Some(value) = playlist {
        form.options.expand_playlist = value;
    }
    if let Some(value) = sponsorblock {
        form.options.strip_sponsor_segments = value;
    }

    match runtime.commit(&mut session).await? {
        EditMode::Update { index: position } if position != index => {
            log_success!("已更新第 {} 项 (原第 {} 项)", position, index);
        }
        _ => log_success!("已更新第 {} 项", index),
    }
    Ok(())
}

async fn handle_list(queue: &JobQueue) {
    let snapshot = queue.snapshot().await;
    if snapshot.is_empty() {
        log_info!("队列为空");
        return;
    }
    PrettyLogger::title(format!("队列 ({} 项)", snapshot.len()));
    for (index, job) in snapshot.iter().enumerate() {
        PrettyLogger::job(index, job);
    }
    PrettyLogger::separator();
}

/// 处理 run 命令：清空队列并在终端显示进度
async fn handle_run(runtime: &DownloadRuntime) -> anyhow::Result<()> {
    if runtime.queue().is_empty().await {
        log_info!("队列为空");
        return Ok(());
    }

    let mut events = runtime.monitor().subscribe();
    let handle = match runtime.processor().spawn().await {
        SpawnOutcome::Started(handle) => handle,
        SpawnOutcome::AlreadyDraining => {
            log_warning!("已经有下载在进行中");
            return Ok(());
        }
    };

    let mut bar: Option<JobProgressBar> = None;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                debug!("跳过了 {} 条事件", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            QueueEvent::JobStarted { url, title } => {
                log_step!("开始下载: {}", title);
                if title != url {
                    println!("  {}", url.bright_black());
                }
                bar = Some(JobProgressBar::new(&title));
            }
            QueueEvent::Progress { percent, .. } => {
                if let Some(bar) = &bar {
                    bar.set_percent(percent);
                }
            }
            QueueEvent::Log { line, .. } => match &bar {
                Some(bar) => bar.println(line.bright_black().to_string()),
                None => println!("{}", line.bright_black()),
            },
            QueueEvent::JobFinished { url, outcome } => {
                if let Some(bar) = bar.take() {
                    match &outcome {
                        JobOutcome::Completed { .. } => bar.finish("下载完成"),
                        JobOutcome::Failed { .. } => bar.abandon("下载失败"),
                    }
                }
                match outcome {
                    JobOutcome::Completed { exit_code: 0 } => log_complete!("完成: {}", url),
                    JobOutcome::Completed { exit_code } => {
                        log_warning!("{} 结束，退出码 {}", url, exit_code)
                    }
                    JobOutcome::Failed { message } => log_error!("{} 失败: {}", url, message),
                }
            }
            QueueEvent::DrainFinished { .. } => break,
        }
    }

    let summary = handle.await.context("下载任务异常退出")?;
    let mut items: Vec<String> = summary
        .completed
        .iter()
        .map(|url| format!("{} {}", "✓".green(), url))
        .collect();
    items.extend(
        summary
            .failed
            .iter()
            .map(|(url, message)| format!("{} {}: {}", "✗".red(), url, message)),
    );
    PrettyLogger::completion_summary(items);
    Ok(())
}

fn handle_config_show(manager: &ConfigManager, config: &UserConfig) -> anyhow::Result<()> {
    PrettyLogger::title("设置");
    println!("配置文件:      {}", manager.config_path().display());
    println!(
        "下载目录:      {}",
        config.download_dir.as_deref().unwrap_or("(默认)")
    );
    println!("实际下载目录:  {}", manager.download_dir()?);
    println!("字体大小:      {}", config.font_size);
    println!("记住队列:      {}", config.remember_queue);
    println!("使用系统程序:  {}", config.use_system_binaries);
    PrettyLogger::separator();
    Ok(())
}

async fn handle_config_set(
    manager: &ConfigManager,
    queue: &JobQueue,
    args: ConfigSetArgs,
) -> anyhow::Result<()> {
    let download_dir = args
        .download_dir
        .as_deref()
        .map(path_to_string)
        .transpose()?;

    let saved = manager.update(|config| {
        if let Some(dir) = download_dir {
            config.download_dir = Some(dir);
        }
        if let Some(size) = args.font_size {
            config.font_size = size;
        }
        if let Some(remember) = args.remember_queue {
            config.remember_queue = remember;
        }
        if let Some(system) = args.use_system_binaries {
            config.use_system_binaries = system;
        }
    })?;

    if let Some(remember) = args.remember_queue {
        queue.set_remember_queue(remember).await;
    }
    log_success!("设置已保存");
    handle_config_show(manager, &saved)
}

async fn handle_binaries(locator: &BinaryLocator) {
    let status = locator.status().await;
    let show = |name: &str, installed: bool, path: &Option<PathBuf>| match (installed, path) {
        (true, Some(path)) => log_success!("{}: {}", name, path.display()),
        _ => log_warning!("{}: 未安装 (放到 {} 或启用系统程序)", name, locator.binaries_dir().display()),
    };
    show("yt-dlp", status.yt_dlp_installed, &status.yt_dlp_path);
    show("ffmpeg", status.ffmpeg_installed, &status.ffmpeg_path);
}

fn path_to_string(path: &Path) -> anyhow::Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    absolute
        .to_str()
        .map(str::to_string)
        .with_context(|| format!("路径包含无效的 UTF-8: {:?}", absolute))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let manager = match &args.config_dir {
        Some(dir) => ConfigManager::new(dir),
        None => ConfigManager::from_default_dir()?,
    };
    let data_dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => config::default_data_dir()?,
    };
    let user_config = manager.load().context("读取配置失败")?;
    debug!("配置: {:?}, 数据目录: {:?}", user_config, data_dir);

    // 恢复队列
    let record = Arc::new(JsonQueueFile::new(&data_dir));
    let queue = JobQueue::new(QueuePersistence::new(record, user_config.remember_queue));
    queue.restore().await;
    if !user_config.remember_queue {
        warn!("未开启记住队列，队列不会在两次运行之间保留");
    }

    let locator = BinaryLocator::new(&data_dir, user_config.use_system_binaries);
    let runtime = DownloadRuntime::start(queue.clone(), |signals| {
        YtDlpGateway::new(locator.clone(), signals)
    });

    match args.command {
        Command::Add {
            url,
            dest,
            audio_only,
            playlist,
            sponsorblock,
        } => {
            let options = JobOptions {
                only_audio: audio_only,
                expand_playlist: playlist,
                strip_sponsor_segments: sponsorblock,
            };
            handle_add(&runtime, &manager, url, dest, options).await?;
        }
        Command::List => handle_list(&queue).await,
        Command::Remove { indices } => {
            let removed = queue.remove_at(indices).await;
            if removed.is_empty() {
                log_warning!("没有移除任何任务");
            }
            for job in removed {
                log_success!("已移除: {}", job.url);
            }
        }
        Command::Edit {
            index,
            dest,
            audio_only,
            playlist,
            sponsorblock,
        } => handle_edit(&runtime, &manager, index, dest, audio_only, playlist, sponsorblock).await?,
        Command::Clear => {
            queue.clear().await;
            log_success!("队列已清空");
        }
        Command::Run => handle_run(&runtime).await?,
        Command::Config(ConfigCommand::Show) => handle_config_show(&manager, &user_config)?,
        Command::Config(ConfigCommand::Set(set_args)) => {
            handle_config_set(&manager, &queue, set_args).await?
        }
        Command::Config(ConfigCommand::ResetDownloadDir) => {
            manager.update(|config| config.download_dir = None)?;
            log_success!("下载目录已恢复为: {}", manager.default_download_dir()?);
        }
        Command::Binaries => handle_binaries(&locator).await,
    }

    runtime.shutdown();
    Ok(())
}
