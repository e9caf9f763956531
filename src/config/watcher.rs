//! Configuration file watcher for hot reload of the writable section.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::load_config;
use crate::config::schema::WritableConfig;

/// Live view of the writable settings, shared with everything that reads them.
pub type SharedWritable = Arc<ArcSwap<WritableConfig>>;

pub fn shared_writable(initial: WritableConfig) -> SharedWritable {
    Arc::new(ArcSwap::from_pointee(initial))
}

/// Reload `path` and swap in its writable section if it changed.
///
/// Returns whether a new value was stored. An unreadable or invalid file
/// leaves the current settings untouched.
pub fn reload_writable(path: &Path, writable: &ArcSwap<WritableConfig>) -> bool {
    match load_config(path) {
        Ok(new_config) => {
            if **writable.load() == new_config.writable {
                return false;
            }
            tracing::info!(writable = ?new_config.writable, "Writable configuration updated");
            writable.store(Arc::new(new_config.writable));
            true
        }
        Err(e) => {
            tracing::error!("Failed to reload config: {}. Keeping current configuration.", e);
            false
        }
    }
}

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    writable: SharedWritable,
}

impl ConfigWatcher {
    pub fn new(path: &Path, writable: SharedWritable) -> Self {
        Self {
            path: path.to_path_buf(),
            writable,
        }
    }

    /// Start watching the file in a background thread.
    ///
    /// Watching stops when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let writable = self.writable.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::debug!("Config file change detected, reloading");
                        reload_writable(&path, &writable);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
