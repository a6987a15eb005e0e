use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::events::{ChangeKind, InterestMask, RawEvent, WatchHandle};
use crate::error::SourceError;

/// Delivers batches of raw change events for individually registered directories.
pub trait NotificationSource {
    fn register_watch(&mut self, path: &Path, mask: InterestMask) -> Result<WatchHandle, SourceError>;

    /// Waits up to `timeout` for events and returns everything that is queued.
    /// An empty batch means the wait timed out.
    fn poll(&mut self, timeout: Duration) -> Vec<RawEvent>;

    fn unregister_watch(&mut self, handle: WatchHandle) -> Result<(), SourceError>;
}

struct Registration {
    handle: WatchHandle,
    mask: InterestMask,
}

/// [`NotificationSource`] backed by the platform watcher from `notify`.
///
/// Each directory gets its own non-recursive watch, so subdirectories created
/// later are not observed unless registered explicitly.
pub struct NotifySource {
    watcher: RecommendedWatcher,
    event_rx: Receiver<notify::Result<Event>>,
    by_path: HashMap<PathBuf, Registration>,
    by_handle: HashMap<WatchHandle, PathBuf>,
    next_handle: u64,
}

impl NotifySource {
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();

        let watcher = notify::recommended_watcher(tx)
            .context("Failed to create file system watcher")?;

        Ok(Self {
            watcher,
            event_rx: rx,
            by_path: HashMap::new(),
            by_handle: HashMap::new(),
            next_handle: 1,
        })
    }

    fn translate(&self, event: Event) -> Vec<RawEvent> {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Create,
            EventKind::Remove(_) => ChangeKind::Delete,
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                ChangeKind::Modify
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                // A moved watched directory also reports itself, without a rename cookie.
                // Its parent's watch already delivered the real moved-away half.
                if event.attrs.tracker().is_none()
                    && event.paths.iter().any(|path| self.by_path.contains_key(path))
                {
                    return Vec::new();
                }
                ChangeKind::MovedFrom
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::MovedTo,
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
                // Backends without rename halves: whichever side still exists is the destination.
                return event
                    .paths
                    .into_iter()
                    .filter_map(|path| {
                        let kind = if path.exists() {
                            ChangeKind::MovedTo
                        } else {
                            ChangeKind::MovedFrom
                        };
                        self.attribute(path, kind)
                    })
                    .collect();
            }
            // Both halves were already delivered as From/To.
            _ => return Vec::new(),
        };

        event
            .paths
            .into_iter()
            .filter_map(|path| self.attribute(path, kind))
            .collect()
    }

    /// Finds the watch an event path belongs to: its parent directory's, or its own
    /// when the event concerns a watched directory itself.
    fn attribute(&self, path: PathBuf, kind: ChangeKind) -> Option<RawEvent> {
        let by_parent = path.parent().and_then(|parent| self.by_path.get(parent));
        let (registration, name) = match (by_parent, path.file_name()) {
            (Some(registration), Some(name)) => (registration, Some(name.to_os_string())),
            _ => (self.by_path.get(&path)?, None),
        };

        if !registration.mask.contains(kind) {
            return None;
        }
        Some(RawEvent::new(registration.handle, kind, name))
    }
}

impl NotificationSource for NotifySource {
    fn register_watch(&mut self, path: &Path, mask: InterestMask) -> Result<WatchHandle, SourceError> {
        if let Some(existing) = self.by_path.get(path) {
            return Ok(existing.handle);
        }

        self.watcher.watch(path, RecursiveMode::NonRecursive)?;

        let handle = WatchHandle(self.next_handle);
        self.next_handle += 1;
        self.by_path.insert(path.to_path_buf(), Registration { handle, mask });
        self.by_handle.insert(handle, path.to_path_buf());
        Ok(handle)
    }

    fn poll(&mut self, timeout: Duration) -> Vec<RawEvent> {
        let first = match self.event_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => return Vec::new(),
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("File watcher channel closed");
                thread::sleep(timeout);
                return Vec::new();
            }
        };

        let mut batch = Vec::new();
        for result in std::iter::once(first).chain(self.event_rx.try_iter()) {
            match result {
                Ok(event) => batch.extend(self.translate(event)),
                Err(err) => tracing::warn!("File watcher error: {}", err),
            }
        }
        batch
    }

    fn unregister_watch(&mut self, handle: WatchHandle) -> Result<(), SourceError> {
        let path = self
            .by_handle
            .remove(&handle)
            .ok_or(SourceError::UnknownHandle(handle))?;
        self.by_path.remove(&path);
        self.watcher.unwatch(&path)?;
        Ok(())
    }
}
