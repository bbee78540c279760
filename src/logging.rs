//! Logging setup shared by the binaries: stderr plus a timestamped file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// `logs/<prefix>_<YYYYmmdd_HHMMSS>.log`
pub fn log_file_name(prefix: &str) -> String {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.log", prefix, ts)
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// or buffered file output is lost.
pub fn init(config: &LoggingConfig, prefix: &str) -> Result<(WorkerGuard, PathBuf)> {
    let dir = Path::new(&config.directory);
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let file_name = log_file_name(prefix);
    let path = dir.join(&file_name);
    let appender = tracing_appender::rolling::never(dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .context("failed to install tracing subscriber")?;

    eprintln!("Log: {}", path.display());
    Ok((guard, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_shape() {
        let name = log_file_name("pose_server");
        assert!(name.starts_with("pose_server_"));
        assert!(name.ends_with(".log"));
        // prefix + '_' + 8 date digits + '_' + 6 time digits + ".log"
        assert_eq!(name.len(), "pose_server_".len() + 15 + 4);
    }
}
