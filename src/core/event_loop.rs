use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::correlator::CorrelatorState;
use super::watch_tree::WatchTree;
use super::watcher::NotificationSource;
use crate::catalog::CatalogClient;
use crate::config::WatcherConfig;
use crate::error::ConfigError;

/// Cooperative shutdown request shared between the loop and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Upper bound of a single poll, and so of the reaction time to a stop request.
    pub poll_timeout: Duration,
    /// Poll cycles between two flushes of unclaimed moves.
    pub reconciliation_ticks: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(5),
            reconciliation_ticks: 5,
        }
    }
}

impl From<&WatcherConfig> for EngineSettings {
    fn from(config: &WatcherConfig) -> Self {
        Self {
            poll_timeout: config.poll_timeout(),
            reconciliation_ticks: config.reconciliation_ticks,
        }
    }
}

/// Polls the notification source and feeds every event through the correlator.
pub struct EventLoop<S: NotificationSource, C: CatalogClient> {
    source: S,
    catalog: C,
    state: CorrelatorState,
    settings: EngineSettings,
    stop: StopFlag,
}

impl<S: NotificationSource, C: CatalogClient> EventLoop<S, C> {
    /// Registers watches over `roots` and prepares the loop.
    ///
    /// `watch_file` is the file the roots were read from, for error reporting.
    pub fn new(
        mut source: S,
        catalog: C,
        roots: &[PathBuf],
        watch_file: &Path,
        settings: EngineSettings,
        stop: StopFlag,
    ) -> Result<Self, ConfigError> {
        let tree = WatchTree::register_recursive(&mut source, roots, watch_file)?;
        Ok(Self {
            source,
            catalog,
            state: CorrelatorState::new(tree, settings.reconciliation_ticks),
            settings,
            stop,
        })
    }

    /// Runs poll cycles until a stop is requested, then tears down every watch.
    pub fn run(&mut self) {
        while !self.stop.is_requested() {
            self.run_cycle();
        }
        self.shutdown();
    }

    /// One poll cycle: wait for a batch, age and flush unclaimed moves, dispatch the batch.
    pub fn run_cycle(&mut self) {
        if let Err(err) = self.catalog.flush_outbound() {
            debug!("flushing catalog requests failed: {}", err);
        }

        let batch = self.source.poll(self.settings.poll_timeout);
        self.state.begin_cycle(batch.is_empty());
        self.state.tick(&mut self.catalog);

        for event in &batch {
            self.state.handle(&mut self.catalog, event);
        }
    }

    /// Removes every watch, ignoring failures.
    pub fn shutdown(&mut self) {
        info!("shutting down");
        self.state.tree.unregister_all(&mut self.source);
    }

    pub fn state(&self) -> &CorrelatorState {
        &self.state
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut C {
        &mut self.catalog
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }
}
