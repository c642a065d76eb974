use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use super::error::DownloadError;

pub const YTDLP: &str = "yt-dlp";
pub const FFMPEG: &str = "ffmpeg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryStatus {
    pub yt_dlp_installed: bool,
    pub ffmpeg_installed: bool,
    pub yt_dlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
}

/// 查找 yt-dlp 与 ffmpeg：优先使用数据目录下的内置版本，
/// 允许时再回退到系统 PATH。
#[derive(Debug, Clone)]
pub struct BinaryLocator {
    binaries_dir: PathBuf,
    use_system_binaries: bool,
}

impl BinaryLocator {
    pub fn new(data_dir: impl AsRef<Path>, use_system_binaries: bool) -> Self {
        Self {
            binaries_dir: data_dir.as_ref().join("binaries"),
            use_system_binaries,
        }
    }

    pub fn binaries_dir(&self) -> &Path {
        &self.binaries_dir
    }

    pub fn bundled_path(&self, name: &str) -> PathBuf {
        self.binaries_dir.join(binary_file_name(name))
    }

    pub async fn locate(&self, name: &str) -> Option<PathBuf> {
        let bundled = self.bundled_path(name);
        if is_binary_valid(&bundled) {
            debug!("使用内置的 {}: {:?}", name, bundled);
            return Some(bundled);
        }
        if self.use_system_binaries && is_in_system_path(name).await {
            debug!("使用系统 PATH 中的 {}", name);
            return Some(PathBuf::from(binary_file_name(name)));
        }
        None
    }

    pub async fn ytdlp(&self) -> Result<PathBuf, DownloadError> {
        self.locate(YTDLP)
            .await
            .ok_or_else(|| DownloadError::BinaryMissing(YTDLP.to_string()))
    }

    pub async fn ffmpeg(&self) -> Option<PathBuf> {
        self.locate(FFMPEG).await
    }

    pub async fn status(&self) -> BinaryStatus {
        let yt_dlp_path = self.locate(YTDLP).await;
        let ffmpeg_path = self.locate(FFMPEG).await;
        BinaryStatus {
            yt_dlp_installed: yt_dlp_path.is_some(),
            ffmpeg_installed: ffmpeg_path.is_some(),
            yt_dlp_path,
            ffmpeg_path,
        }
    }
}

fn binary_file_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// 文件存在，并且在 Unix 上带有可执行位
pub fn is_binary_valid(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

async fn is_in_system_path(name: &str) -> bool {
    Command::new(binary_file_name(name))
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
