use indicatif::{ProgressBar, ProgressStyle};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // yt-dlp --newline 输出，例如 "[download]  42.3% of 10.00MiB at 1.00MiB/s ETA 00:05"
    static ref PROGRESS_LINE: Regex =
        Regex::new(r"^\[download\]\s+(\d{1,3}(?:\.\d+)?)%").expect("进度正则无效");
}

/// 从一行输出中解析进度百分比（向下取整，最大 100）
pub fn parse_progress_line(line: &str) -> Option<u8> {
    let captures = PROGRESS_LINE.captures(line.trim_start())?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(value.floor().clamp(0.0, 100.0) as u8)
}

/// 当前任务的终端进度条
pub struct JobProgressBar {
    bar: ProgressBar,
}

impl JobProgressBar {
    pub fn new(title: &str) -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(title.to_string());
        Self { bar }
    }

    pub fn set_percent(&self, percent: u8) {
        self.bar.set_position(u64::from(percent.min(100)));
    }

    // 在进度条上方打印，不打乱进度条
    pub fn println(&self, line: impl AsRef<str>) {
        self.bar.println(line.as_ref());
    }

    pub fn finish(&self, message: impl Into<String>) {
        self.bar.finish_with_message(message.into());
    }

    pub fn abandon(&self, message: impl Into<String>) {
        self.bar.abandon_with_message(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_download_progress_lines() {
        assert_eq!(
            parse_progress_line("[download]  42.7% of 10.00MiB at 1.00MiB/s ETA 00:05"),
            Some(42)
        );
        assert_eq!(parse_progress_line("[download] 100% of 3.2MiB in 00:02"), Some(100));
        assert_eq!(parse_progress_line("[download]   0.0% of ~ 1.00GiB"), Some(0));
    }

    #[test]
    fn ignores_other_lines() {
        assert_eq!(parse_progress_line("[youtube] abc: Downloading webpage"), None);
        assert_eq!(
            parse_progress_line("[download] Destination: /tmp/video.mp4"),
            None
        );
        assert_eq!(parse_progress_line(""), None);
    }
}
