//! File system subscription using notify-rs.

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::events::RawEvent;
use crate::error::WatcherError;
use crate::Result;

/// Default capacity of the event and error channels.
const CHANNEL_CAPACITY: usize = 1024;

/// Subscription configuration.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Directories to watch. Only their direct children are reported.
    pub watch_dirs: Vec<PathBuf>,
    /// Capacity of the event channel.
    pub capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch_dirs: Vec::new(),
            capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Receiving side of a subscription: events plus backend errors.
#[derive(Debug)]
pub struct EventStream {
    pub events: mpsc::Receiver<RawEvent>,
    pub errors: mpsc::Receiver<WatcherError>,
}

/// Sending side of an [`EventStream`].
#[derive(Debug, Clone)]
pub struct EventSender {
    pub events: mpsc::Sender<RawEvent>,
    pub errors: mpsc::Sender<WatcherError>,
}

impl EventStream {
    /// Create a connected sender and stream.
    #[must_use]
    pub fn channel(capacity: usize) -> (EventSender, Self) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(capacity);
        (
            EventSender {
                events: event_tx,
                errors: error_tx,
            },
            Self {
                events: event_rx,
                errors: error_rx,
            },
        )
    }
}

/// File system watcher. Dropping it ends the subscription and closes the
/// stream.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched_dirs: Vec<PathBuf>,
}

impl FileWatcher {
    /// Subscribe to every directory in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be created or any directory
    /// cannot be watched.
    pub fn new(config: &WatchConfig) -> Result<(Self, EventStream)> {
        let (tx, stream) = EventStream::channel(config.capacity);

        let watcher = notify::recommended_watcher(
            move |result: std::result::Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    for raw in RawEvent::from_notify(&event) {
                        if tx.events.blocking_send(raw).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.errors.blocking_send(WatcherError::Subscription(e.to_string()));
                }
            },
        )
        .map_err(|e| WatcherError::WatchFailed {
            path: "init".to_string(),
            reason: e.to_string(),
        })?;

        let mut watcher = Self {
            watcher,
            watched_dirs: Vec::new(),
        };

        for dir in &config.watch_dirs {
            watcher.watch(dir)?;
        }

        Ok((watcher, stream))
    }

    fn watch(&mut self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: "directory does not exist".to_string(),
            }
            .into());
        }

        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.watched_dirs.push(path.to_path_buf());
        tracing::info!(path = %path.display(), "watching path");

        Ok(())
    }

    /// Get list of watched directories.
    #[must_use]
    pub fn watched_dirs(&self) -> &[PathBuf] {
        &self.watched_dirs
    }
}
