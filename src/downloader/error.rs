use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum DownloadError {
    IoError(std::io::Error),
    SpawnFailed { program: PathBuf, source: std::io::Error },
    BinaryMissing(String),
    ProcessFailed { code: Option<i32>, stderr: String },
    EmptyOutput(String),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::IoError(e) => write!(f, "IO错误: {}", e),
            DownloadError::SpawnFailed { program, source } => {
                write!(f, "无法启动 {}: {}", program.display(), source)
            }
            DownloadError::BinaryMissing(name) => write!(f, "未找到可执行文件: {}", name),
            DownloadError::ProcessFailed { code, stderr } => match code {
                Some(code) => write!(f, "进程退出码 {}: {}", code, stderr),
                None => write!(f, "进程被信号终止: {}", stderr),
            },
            DownloadError::EmptyOutput(what) => write!(f, "没有输出: {}", what),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DownloadError::IoError(e) => Some(e),
            DownloadError::SpawnFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(error: std::io::Error) -> Self {
        DownloadError::IoError(error)
    }
}
