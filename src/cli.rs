use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// yt-dlp 下载队列
#[derive(Parser, Debug)]
#[command(name = "ytq")]
#[command(version = "1.0")]
#[command(author = "rpeng252@gmail.com")]
#[command(about = "一个基于 yt-dlp 的顺序下载队列", long_about = None)]
pub struct Cli {
    /// 配置目录
    #[arg(long, global = true, value_name = "DIR")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub config_dir: Option<PathBuf>,

    /// 数据目录 (队列记录与内置可执行文件)
    #[arg(long, global = true, value_name = "DIR")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    /// 输出调试日志
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 加入队列
    Add {
        /// 视频或播放列表链接
        #[arg(value_name = "URL")]
        #[arg(value_hint = clap::ValueHint::Url)]
        url: String,

        /// 保存目录 (默认使用设置中的下载目录)
        #[arg(long, value_name = "DIR")]
        #[arg(value_hint = clap::ValueHint::DirPath)]
        dest: Option<PathBuf>,

        /// 只下载音频 (mp3)
        #[arg(long)]
        audio_only: bool,

        /// 展开播放列表
        #[arg(long)]
        playlist: bool,

        /// 移除 SponsorBlock 片段
        #[arg(long)]
        sponsorblock: bool,
    },

    /// 列出队列
    List,

    /// 按序号移除 (可一次移除多个)
    Remove {
        #[arg(value_name = "INDEX", required = true)]
        indices: Vec<usize>,
    },

    /// 编辑队列中的一项
    Edit {
        #[arg(value_name = "INDEX")]
        index: usize,

        #[arg(long, value_name = "DIR")]
        #[arg(value_hint = clap::ValueHint::DirPath)]
        dest: Option<PathBuf>,

        #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
        audio_only: Option<bool>,

        #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
        playlist: Option<bool>,

        #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
        sponsorblock: Option<bool>,
    },

    /// 清空队列
    Clear,

    /// 依次下载队列中的所有任务
    Run,

    /// 查看或修改设置
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 检查 yt-dlp 与 ffmpeg
    Binaries,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示当前设置
    Show,
    /// 修改设置
    Set(ConfigSetArgs),
    /// 恢复默认下载目录
    ResetDownloadDir,
}

#[derive(Args, Debug)]
pub struct ConfigSetArgs {
    #[arg(long, value_name = "DIR")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub download_dir: Option<PathBuf>,

    /// 字体大小 (8-20)
    #[arg(long, value_name = "N")]
    pub font_size: Option<u8>,

    #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
    pub remember_queue: Option<bool>,

    #[arg(long, value_name = "BOOL", action = ArgAction::Set)]
    pub use_system_binaries: Option<bool>,
}
