use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Tracing sink for one run: stderr plus a daily file in the log directory.
/// The subscriber is scoped to the session and removed when it is dropped.
pub struct LogSession {
    file: Option<PathBuf>,
    _guard: DefaultGuard,
}

impl LogSession {
    pub fn open(dir: &Path) -> Self {
        match open_log_file(dir) {
            Ok((path, file)) => {
                let subscriber = Registry::default()
                    .with(env_filter())
                    .with(fmt::layer().with_writer(io::stderr))
                    .with(
                        fmt::layer()
                            .with_ansi(false)
                            .with_writer(Arc::new(file)),
                    );
                Self {
                    file: Some(path),
                    _guard: tracing::subscriber::set_default(subscriber),
                }
            }
            Err(err) => {
                let session = Self::console();
                warn!(
                    dir = %dir.display(),
                    error = %err,
                    "log dir unavailable, logging to console only"
                );
                session
            }
        }
    }

    pub fn console() -> Self {
        let subscriber = Registry::default()
            .with(env_filter())
            .with(fmt::layer().with_writer(io::stderr));
        Self {
            file: None,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn log_file_name() -> String {
    format!("monitor_{}.log", Local::now().format("%Y%m%d"))
}

fn open_log_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(log_file_name());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info;

    #[test]
    fn file_sink_receives_events() {
        let dir = tempfile::tempdir().expect("temp dir");
        let logs = dir.path().join("logs");

        let session = LogSession::open(&logs);
        let path = session.file().expect("file sink").to_path_buf();
        info!(host = "web-01", "daily report started");
        drop(session);

        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("monitor_") && name.ends_with(".log"));
        let text = fs::read_to_string(&path).expect("read log");
        assert!(text.contains("daily report started"));
        assert!(text.contains("host=\"web-01\""));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn unusable_dir_falls_back_to_console() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("plain-file");
        fs::write(&blocker, b"x").expect("write");

        let session = LogSession::open(&blocker.join("logs"));
        assert!(session.file().is_none());
    }
}
