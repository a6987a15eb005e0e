use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::events::{InterestMask, WatchHandle};
use super::walk::FileWalk;
use super::watcher::NotificationSource;
use crate::error::ConfigError;

/// Maps watch handles to the absolute directory each one observes.
///
/// Built once at start-up. Directories created afterwards get no watch.
#[derive(Debug, Default)]
pub struct WatchTree {
    watched: HashMap<WatchHandle, PathBuf>,
}

impl WatchTree {
    /// Registers a watch on every directory below each root, depth-first.
    ///
    /// Roots that are not existing directories are skipped. Fails when none is left.
    /// `config_path` only names the origin of the roots in the error.
    pub fn register_recursive<S: NotificationSource + ?Sized>(
        source: &mut S,
        roots: &[PathBuf],
        config_path: &Path,
    ) -> Result<Self, ConfigError> {
        let valid: Vec<&PathBuf> = roots.iter().filter(|root| root.is_dir()).collect();
        if valid.is_empty() {
            return Err(ConfigError::NoWatchRoots {
                path: config_path.to_path_buf(),
            });
        }

        let mut tree = Self::default();
        for root in valid {
            for dir in FileWalk::new(root).directories() {
                match source.register_watch(&dir, InterestMask::SYNC) {
                    Ok(handle) => {
                        info!("watching {}", dir.display());
                        tree.watched.insert(handle, dir);
                    }
                    Err(err) => warn!("cannot watch {}: {}", dir.display(), err),
                }
            }
        }
        Ok(tree)
    }

    pub fn path_of(&self, handle: WatchHandle) -> Option<&Path> {
        self.watched.get(&handle).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Removes every watch. Individual failures are ignored.
    pub fn unregister_all<S: NotificationSource + ?Sized>(&mut self, source: &mut S) {
        for (handle, _) in self.watched.drain() {
            let _ = source.unregister_watch(handle);
        }
    }
}
