//! Structured logging configuration.
//!
//! Sets up `tracing` with:
//! - Plain text or JSON output on stderr
//! - An optional append-only log file receiving the same records
//! - Level from the configuration, overridable with `RUST_LOG`

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

use crate::config::{LogConfig, LogFormat};
use crate::{Error, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the log sink open. Dropping it flushes the log file to disk.
#[derive(Debug)]
pub struct LogGuard {
    file: Option<Arc<File>>,
}

impl LogGuard {
    /// Whether a log file is attached.
    #[must_use]
    pub const fn has_file(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.sync_all();
        }
    }
}

/// Initialize tracing from the log configuration.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a global subscriber
/// is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<LogGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file = match config.file.as_deref() {
        Some(path) if !path.as_os_str().is_empty() => Some(Arc::new(open_log_file(path)?)),
        _ => None,
    };

    let mut layers: Vec<BoxedLayer> = vec![stderr_layer(config)];
    if let Some(file) = &file {
        layers.push(file_layer(config.format, Arc::clone(file)));
    }

    Registry::default()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| Error::internal(format!("failed to initialize tracing: {e}")))?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        file = ?config.file,
        "Tracing initialized"
    );

    Ok(LogGuard { file })
}

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::config(format!("failed to open log file '{}': {e}", path.display())))
}

fn stderr_layer(config: &LogConfig) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(config.color);

    match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.boxed(),
    }
}

fn file_layer(format: LogFormat, file: Arc<File>) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(file)
        .with_target(false)
        .with_ansi(false);

    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.boxed(),
    }
}
