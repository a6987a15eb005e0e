#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mediasync::core::{
    ChangeKind, EngineSettings, EventLoop, InterestMask, NotificationSource, RawEvent, StopFlag,
    WatchHandle,
};
use mediasync::{CatalogClient, CatalogEntry, CatalogError, CatalogId, SourceError};
use url::Url;

/// Catalog call as observed by [`RecordingCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Add(String),
    Remove(u32),
    Rehash(u32),
    Move(u32, String),
}

/// In-memory catalog that records every mutating call.
#[derive(Debug, Default)]
pub struct RecordingCatalog {
    entries: Vec<(CatalogId, String)>,
    pub calls: Vec<Call>,
    pub fail_moves_of: Vec<u32>,
    /// Makes `lookup_id` and `query_by_prefix` fail.
    pub fail_lookups: bool,
}

impl RecordingCatalog {
    pub fn with_entry(mut self, id: u32, path: &Path) -> Self {
        self.entries.push((CatalogId(id), url_of(path)));
        self
    }

    pub fn adds(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Add(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }
}

impl CatalogClient for RecordingCatalog {
    fn lookup_id(&mut self, url: &Url) -> Result<Option<CatalogId>, CatalogError> {
        if self.fail_lookups {
            return Err(CatalogError::Rejected(format!("lookup of {} failed", url)));
        }
        Ok(self
            .entries
            .iter()
            .find(|(_, stored)| stored == url.as_str())
            .map(|(id, _)| *id))
    }

    fn add(&mut self, url: &Url) -> Result<(), CatalogError> {
        self.calls.push(Call::Add(url.to_string()));
        Ok(())
    }

    fn remove(&mut self, id: CatalogId) -> Result<(), CatalogError> {
        self.calls.push(Call::Remove(id.0));
        Ok(())
    }

    fn rehash(&mut self, id: CatalogId) -> Result<(), CatalogError> {
        self.calls.push(Call::Rehash(id.0));
        Ok(())
    }

    fn move_entry(&mut self, id: CatalogId, new_url: &Url) -> Result<(), CatalogError> {
        if self.fail_moves_of.contains(&id.0) {
            return Err(CatalogError::Rejected(format!("cannot move {}", id)));
        }
        self.calls.push(Call::Move(id.0, new_url.to_string()));
        Ok(())
    }

    fn query_by_prefix(&mut self, prefix: &Url) -> Result<Vec<CatalogEntry>, CatalogError> {
        if self.fail_lookups {
            return Err(CatalogError::Disconnected);
        }
        Ok(self
            .entries
            .iter()
            .filter(|(_, url)| url.starts_with(prefix.as_str()))
            .map(|(id, url)| CatalogEntry {
                id: *id,
                url: url.clone(),
            })
            .collect())
    }
}

/// Notification source replaying pre-scripted batches, one per poll.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    pub watched: HashMap<PathBuf, WatchHandle>,
    pub batches: VecDeque<Vec<RawEvent>>,
    pub unregistered: Vec<WatchHandle>,
    /// Raised once every scripted batch has been handed out.
    pub stop_when_drained: Option<StopFlag>,
    next_handle: u64,
}

impl ScriptedSource {
    pub fn handle_of(&self, dir: &Path) -> WatchHandle {
        self.watched[dir]
    }
}

impl NotificationSource for ScriptedSource {
    fn register_watch(&mut self, path: &Path, _mask: InterestMask) -> Result<WatchHandle, SourceError> {
        self.next_handle += 1;
        let handle = WatchHandle(self.next_handle);
        self.watched.insert(path.to_path_buf(), handle);
        Ok(handle)
    }

    fn poll(&mut self, _timeout: Duration) -> Vec<RawEvent> {
        let batch = self.batches.pop_front().unwrap_or_default();
        if self.batches.is_empty() {
            if let Some(stop) = &self.stop_when_drained {
                stop.request();
            }
        }
        batch
    }

    fn unregister_watch(&mut self, handle: WatchHandle) -> Result<(), SourceError> {
        self.unregistered.push(handle);
        Ok(())
    }
}

pub type TestLoop = EventLoop<ScriptedSource, RecordingCatalog>;

pub fn url_of(path: &Path) -> String {
    Url::from_file_path(path).unwrap().to_string()
}

pub fn start(root: &Path, catalog: RecordingCatalog) -> TestLoop {
    EventLoop::new(
        ScriptedSource::default(),
        catalog,
        &[root.to_path_buf()],
        Path::new("watch_dirs"),
        EngineSettings {
            poll_timeout: Duration::from_millis(1),
            reconciliation_ticks: 5,
        },
        StopFlag::new(),
    )
    .unwrap()
}

/// An event for `name` inside the watched directory `dir`.
pub fn event(event_loop: &TestLoop, dir: &Path, kind: ChangeKind, name: &str) -> RawEvent {
    RawEvent::child(event_loop.source().handle_of(dir), kind, name)
}

/// Queues one batch and runs the cycle that consumes it.
pub fn run_batch(event_loop: &mut TestLoop, batch: Vec<RawEvent>) {
    event_loop.source_mut().batches.push_back(batch);
    event_loop.run_cycle();
}

/// Runs `n` cycles whose polls time out.
pub fn run_idle(event_loop: &mut TestLoop, n: usize) {
    for _ in 0..n {
        event_loop.run_cycle();
    }
}
