//! 可观测性：tracing 订阅器初始化
//!
//! TUI 运行时终端被界面占用，日志写入 `<log_dir>/pixelprompt_YYYYMMDD.log`；
//! `--check` 诊断模式写 stderr。级别默认取 `--debug`，可通过 RUST_LOG 覆盖。

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// 当天的日志文件路径
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    let date = chrono::Local::now().format("%Y%m%d");
    log_dir.join(format!("pixelprompt_{date}.log"))
}

/// 日志写入文件（追加），返回文件路径
pub fn init_file(level: &str, log_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let path = log_file_path(log_dir);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(path)
}

/// 日志写入 stderr
pub fn init_stderr(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_has_date() {
        let path = log_file_path(Path::new("logs"));
        let name = path.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name.starts_with("pixelprompt_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "pixelprompt_YYYYMMDD.log".len());
    }
}
