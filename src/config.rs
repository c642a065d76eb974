use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const APP_DIR_NAME: &str = "ytdlp-queue";
const CONFIG_FILE: &str = "config.json";
const WRITE_TEST_FILE: &str = ".ytdl_test";

pub const DEFAULT_FONT_SIZE: u8 = 14;
pub const MIN_FONT_SIZE: u8 = 8;
pub const MAX_FONT_SIZE: u8 = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置文件解析失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("无法确定用户主目录")]
    NoHomeDir,

    #[error("路径包含无效的 UTF-8: {0:?}")]
    InvalidPath(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_font_size() -> u8 {
    DEFAULT_FONT_SIZE
}

fn default_remember_queue() -> bool {
    true
}

/// 保存在 config.json 中的用户设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default = "default_font_size")]
    pub font_size: u8,
    #[serde(default = "default_remember_queue")]
    pub remember_queue: bool,
    #[serde(default)]
    pub use_system_binaries: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            font_size: DEFAULT_FONT_SIZE,
            remember_queue: true,
            use_system_binaries: false,
        }
    }
}

impl UserConfig {
    // 保存前修正越界的值
    fn normalized(mut self) -> Self {
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.download_dir = self
            .download_dir
            .map(|dir| dir.trim().to_string())
            .filter(|dir| !dir.is_empty());
        self
    }
}

/// 核心只读的设置快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub download_dir: String,
    pub font_size: u8,
    pub remember_queue: bool,
    pub use_system_binaries: bool,
}

/// 读写配置目录下的 config.json
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
    home_dir: Option<PathBuf>,
}

impl ConfigManager {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            home_dir: dirs::home_dir(),
        }
    }

    /// 使用系统默认的配置目录
    pub fn from_default_dir() -> Result<Self> {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::new(base.join(APP_DIR_NAME)))
    }

    // 回退下载目录时使用的主目录，测试中可替换
    pub fn with_home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home_dir.into());
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn load(&self) -> Result<UserConfig> {
        let path = self.config_path();
        if !path.exists() {
            debug!("配置文件不存在，使用默认配置: {:?}", path);
            return Ok(UserConfig::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, config: &UserConfig) -> Result<UserConfig> {
        fs::create_dir_all(&self.config_dir)?;
        let config = config.clone().normalized();
        let content = serde_json::to_string_pretty(&config)?;
        fs::write(self.config_path(), content)?;
        debug!("配置已保存: {:?}", self.config_path());
        Ok(config)
    }

    pub fn update<F>(&self, apply: F) -> Result<UserConfig>
    where
        F: FnOnce(&mut UserConfig),
    {
        let mut config = self.load()?;
        apply(&mut config);
        self.save(&config)
    }

    /// 配置的目录存在且可写时使用它，否则回退到 ~/Downloads
    pub fn download_dir(&self) -> Result<String> {
        let config = self.load()?;
        if let Some(dir) = config.download_dir {
            let path = PathBuf::from(&dir);
            if is_writable_dir(&path) {
                return Ok(dir);
            }
            warn!("下载目录不可用，使用默认目录: {}", dir);
        }
        self.default_download_dir()
    }

    pub fn default_download_dir(&self) -> Result<String> {
        let home = self.home_dir.as_ref().ok_or(ConfigError::NoHomeDir)?;
        let dir = home.join("Downloads");
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        dir.to_str()
            .map(str::to_string)
            .ok_or(ConfigError::InvalidPath(dir))
    }

    pub fn settings(&self) -> Result<Settings> {
        let config = self.load()?;
        Ok(Settings {
            download_dir: self.download_dir()?,
            font_size: config.font_size,
            remember_queue: config.remember_queue,
            use_system_binaries: config.use_system_binaries,
        })
    }
}

fn is_writable_dir(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    let test_file = path.join(WRITE_TEST_FILE);
    if fs::write(&test_file, "test").is_ok() {
        let _ = fs::remove_file(&test_file);
        return true;
    }
    false
}

/// 数据目录，存放队列记录和内置的可执行文件
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .map(|base| base.join(APP_DIR_NAME))
        .ok_or(ConfigError::NoHomeDir)
}
