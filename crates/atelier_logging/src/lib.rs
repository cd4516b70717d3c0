//! Shared logging utilities for Atelier binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "atelier=info,atelier_jobs=info,atelier_catalog=info";
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration shared by Atelier binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a size-capped file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = SharedLogWriter::open(log_dir, config.app_name)
        .context("Failed to initialize log writer")?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// Get the Atelier home directory: ~/.atelier_studio
pub fn atelier_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("ATELIER_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".atelier_studio")
}

/// Get the logs directory: ~/.atelier_studio/logs
pub fn logs_dir() -> PathBuf {
    atelier_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Size-capped log file. When the cap is exceeded the current file is moved
/// to `<name>.log.old` (replacing any previous one) and a fresh file opened.
struct CappedLogFile {
    path: PathBuf,
    file: File,
    written: u64,
}

impl CappedLogFile {
    fn open(dir: PathBuf, base_name: &str) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.log", sanitize_name(base_name)));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
        })
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let old = self.path.with_extension("log.old");
        if old.exists() {
            fs::remove_file(&old)?;
        }
        fs::rename(&self.path, &old)?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for CappedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > MAX_LOG_FILE_SIZE {
            self.rotate()?;
        }
        let bytes = self.file.write(buf)?;
        self.written += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[derive(Clone)]
struct SharedLogWriter {
    inner: Arc<Mutex<CappedLogFile>>,
}

impl SharedLogWriter {
    fn open(dir: PathBuf, base_name: &str) -> Result<Self> {
        let file = CappedLogFile::open(dir, base_name)
            .with_context(|| format!("Failed to open log file for {}", base_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }
}

struct SharedLogWriterGuard {
    inner: Arc<Mutex<CappedLogFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogWriter {
    type Writer = SharedLogWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedLogWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("atelier-server"), "atelier-server");
        assert_eq!(sanitize_name("a b/c"), "a_b_c");
    }

    #[test]
    fn test_capped_file_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = CappedLogFile::open(dir.path().to_path_buf(), "test").unwrap();
        file.written = MAX_LOG_FILE_SIZE - 1;
        file.write_all(b"overflow line").unwrap();
        assert!(dir.path().join("test.log.old").exists());
    }
}
