//! Turns raw change events into catalog operations.
//!
//! The notification facility reports a rename as two unrelated halves, a
//! moved-away event on the old name and a moved-in event on the new one, and
//! gives us no token tying them together. Pairing is therefore a positional
//! heuristic: a moved-in event completes the pending moves only when the event
//! observed right before it was a moved-away. This is a best guess, not a
//! guarantee; interleaved or lost events break the pair, and the orphaned
//! moved-away entries are later removed by the [`ReconciliationTimer`].

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::events::{ChangeKind, PendingMove, RawEvent};
use super::reconcile::ReconciliationTimer;
use super::walk::FileWalk;
use super::watch_tree::WatchTree;
use crate::catalog::{directory_prefix_url, file_url, relative_path, CatalogClient, CatalogId};
use crate::error::DispatchError;

/// Where the pairing state machine stands relative to the last event seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPhase {
    #[default]
    Idle,
    /// The previous event was a moved-away; a moved-in now completes the move.
    SawMovedFrom,
}

/// Pairs moved-away with moved-in events and expands directory moves.
#[derive(Debug, Default)]
pub struct MoveCorrelator {
    pending: Vec<PendingMove>,
    phase: BatchPhase,
}

impl MoveCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    /// Moved-away entries in discovery order.
    pub fn pending(&self) -> &[PendingMove] {
        &self.pending
    }

    /// Starts a poll cycle and returns the pending moves that can no longer be claimed.
    ///
    /// Pending moves survive only when the last event before this cycle was a
    /// moved-away. They stay claimable by the first event of this cycle's batch,
    /// or, when the batch is empty, age out at the start of the next cycle.
    pub fn begin_cycle(&mut self, batch_is_empty: bool) -> Vec<PendingMove> {
        let aged = match self.phase {
            BatchPhase::Idle => std::mem::take(&mut self.pending),
            BatchPhase::SawMovedFrom => Vec::new(),
        };
        if batch_is_empty {
            self.phase = BatchPhase::Idle;
        }
        aged
    }

    /// Records that an event of `kind` has been processed.
    pub fn observe(&mut self, kind: ChangeKind) {
        self.phase = if kind == ChangeKind::MovedFrom {
            BatchPhase::SawMovedFrom
        } else {
            BatchPhase::Idle
        };
    }

    /// Applies one event at `path` to the catalog.
    pub fn dispatch<C: CatalogClient + ?Sized>(
        &mut self,
        catalog: &mut C,
        path: &Path,
        kind: ChangeKind,
    ) -> Result<(), DispatchError> {
        match kind {
            ChangeKind::Modify => rehash_path(catalog, path),
            ChangeKind::Create => add_tree(catalog, path),
            ChangeKind::Delete => remove_path(catalog, path),
            ChangeKind::MovedFrom => self.moved_from(catalog, path),
            ChangeKind::MovedTo => self.moved_to(catalog, path),
        }
    }

    fn moved_from<C: CatalogClient + ?Sized>(
        &mut self,
        catalog: &mut C,
        path: &Path,
    ) -> Result<(), DispatchError> {
        if let Some(id) = catalog.lookup_id(&file_url(path)?)? {
            self.pending.push(PendingMove::ById(id));
            return Ok(());
        }

        // Not an entry itself, so a directory: collect everything stored below it.
        let prefix = directory_prefix_url(path)?;
        for entry in catalog.query_by_prefix(&prefix)? {
            match relative_path(&entry.url, path) {
                Ok(relative) => self.pending.push(PendingMove::ByPrefix {
                    id: entry.id,
                    relative,
                }),
                Err(err) => debug!("skipping {}: {}", entry.id, err),
            }
        }
        Ok(())
    }

    fn moved_to<C: CatalogClient + ?Sized>(
        &mut self,
        catalog: &mut C,
        path: &Path,
    ) -> Result<(), DispatchError> {
        let Some(claimed) = self.claim() else {
            // Moved in from outside the watched trees.
            return add_tree(catalog, path);
        };

        for pending in claimed {
            let target = match &pending {
                PendingMove::ById(_) => path.to_path_buf(),
                PendingMove::ByPrefix { relative, .. } => path.join(relative),
            };
            if let Err(err) = move_entry(catalog, pending.id(), &target) {
                debug!("moving {} to {} failed: {}", pending.id(), target.display(), err);
            }
        }
        Ok(())
    }

    /// Takes the pending moves, latest first, if the previous event was a moved-away.
    ///
    /// The claim may be empty when that moved-away resolved to nothing in the catalog.
    fn claim(&mut self) -> Option<Vec<PendingMove>> {
        if self.phase != BatchPhase::SawMovedFrom {
            return None;
        }
        let mut claimed = std::mem::take(&mut self.pending);
        claimed.reverse();
        Some(claimed)
    }
}

fn rehash_path<C: CatalogClient + ?Sized>(catalog: &mut C, path: &Path) -> Result<(), DispatchError> {
    match catalog.lookup_id(&file_url(path)?)? {
        Some(id) => {
            info!("rehashing {} {}", id, path.display());
            catalog.rehash(id)?;
        }
        None => debug!("{} is not in the catalog, nothing to rehash", path.display()),
    }
    Ok(())
}

fn remove_path<C: CatalogClient + ?Sized>(catalog: &mut C, path: &Path) -> Result<(), DispatchError> {
    match catalog.lookup_id(&file_url(path)?)? {
        Some(id) => remove_entry(catalog, id, Some(path))?,
        None => debug!("{} is not in the catalog, nothing to remove", path.display()),
    }
    Ok(())
}

/// Adds every file at or below `path`. Failures of single files are logged and skipped.
fn add_tree<C: CatalogClient + ?Sized>(catalog: &mut C, path: &Path) -> Result<(), DispatchError> {
    for file in FileWalk::new(path).files() {
        let added = file_url(&file).and_then(|url| {
            info!("adding {}", file.display());
            catalog.add(&url).map_err(DispatchError::from)
        });
        if let Err(err) = added {
            debug!("adding {} failed: {}", file.display(), err);
        }
    }
    Ok(())
}

fn move_entry<C: CatalogClient + ?Sized>(
    catalog: &mut C,
    id: CatalogId,
    target: &Path,
) -> Result<(), DispatchError> {
    let url = file_url(target)?;
    info!("moving {} to {}", id, target.display());
    catalog.move_entry(id, &url)?;
    Ok(())
}

fn remove_entry<C: CatalogClient + ?Sized>(
    catalog: &mut C,
    id: CatalogId,
    path: Option<&Path>,
) -> Result<(), DispatchError> {
    info!(
        "removed {} {}",
        id,
        path.map(|p| p.display().to_string()).unwrap_or_default()
    );
    catalog.remove(id)?;
    Ok(())
}

/// All correlation state, owned by the event loop and lent out per event.
#[derive(Debug)]
pub struct CorrelatorState {
    pub tree: WatchTree,
    pub moves: MoveCorrelator,
    pub timer: ReconciliationTimer,
}

impl CorrelatorState {
    pub fn new(tree: WatchTree, reconciliation_ticks: u32) -> Self {
        Self {
            tree,
            moves: MoveCorrelator::new(),
            timer: ReconciliationTimer::new(reconciliation_ticks),
        }
    }

    /// The absolute path an event refers to.
    pub fn resolve(&self, event: &RawEvent) -> Result<PathBuf, DispatchError> {
        let dir = self
            .tree
            .path_of(event.handle)
            .ok_or(DispatchError::UnknownWatch(event.handle))?;
        Ok(match &event.name {
            Some(name) => dir.join(name),
            None => dir.to_path_buf(),
        })
    }

    /// Opens a poll cycle: unclaimable moves are handed to the reconciliation timer.
    pub fn begin_cycle(&mut self, batch_is_empty: bool) {
        let aged = self.moves.begin_cycle(batch_is_empty);
        if !aged.is_empty() {
            debug!("{} moved-away entries left unclaimed", aged.len());
            self.timer.defer(aged);
        }
    }

    /// Advances the reconciliation timer, removing expired entries from the catalog.
    pub fn tick<C: CatalogClient + ?Sized>(&mut self, catalog: &mut C) {
        let Some(expired) = self.timer.tick() else {
            return;
        };
        // Moved out of every watched tree.
        for pending in expired {
            if let Err(err) = remove_entry(catalog, pending.id(), None) {
                debug!("removing {} failed: {}", pending.id(), err);
            }
        }
    }

    /// Dispatches one event. Failures are logged and never interrupt the batch.
    pub fn handle<C: CatalogClient + ?Sized>(&mut self, catalog: &mut C, event: &RawEvent) {
        let outcome = self
            .resolve(event)
            .and_then(|path| self.moves.dispatch(catalog, &path, event.kind));
        if let Err(err) = outcome {
            debug!("{:?} event dropped: {}", event.kind, err);
        }
        self.moves.observe(event.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_pending(ids: &[u32]) -> MoveCorrelator {
        MoveCorrelator {
            pending: ids.iter().map(|&id| PendingMove::ById(CatalogId(id))).collect(),
            phase: BatchPhase::Idle,
        }
    }

    #[test]
    fn test_observe_tracks_last_kind() {
        let mut correlator = MoveCorrelator::new();
        assert_eq!(correlator.phase(), BatchPhase::Idle);

        correlator.observe(ChangeKind::MovedFrom);
        assert_eq!(correlator.phase(), BatchPhase::SawMovedFrom);

        correlator.observe(ChangeKind::Modify);
        assert_eq!(correlator.phase(), BatchPhase::Idle);
    }

    #[test]
    fn test_begin_cycle_ages_out_when_idle() {
        let mut correlator = with_pending(&[1, 2]);
        let aged = correlator.begin_cycle(false);
        assert_eq!(aged.len(), 2);
        assert!(correlator.pending().is_empty());
    }

    #[test]
    fn test_begin_cycle_keeps_moves_after_moved_from() {
        let mut correlator = with_pending(&[1]);
        correlator.observe(ChangeKind::MovedFrom);

        assert!(correlator.begin_cycle(false).is_empty());
        assert_eq!(correlator.phase(), BatchPhase::SawMovedFrom);
        assert_eq!(correlator.pending().len(), 1);
    }

    #[test]
    fn test_empty_cycle_gives_one_cycle_of_grace() {
        let mut correlator = with_pending(&[1]);
        correlator.observe(ChangeKind::MovedFrom);

        assert!(correlator.begin_cycle(true).is_empty());
        assert_eq!(correlator.phase(), BatchPhase::Idle);
        assert_eq!(correlator.begin_cycle(true), vec![PendingMove::ById(CatalogId(1))]);
    }

    #[test]
    fn test_claim_reverses_discovery_order() {
        let mut correlator = with_pending(&[1, 2, 3]);
        assert!(correlator.claim().is_none());

        correlator.observe(ChangeKind::MovedFrom);
        let claimed = correlator.claim().unwrap();
        let ids: Vec<u32> = claimed.iter().map(|m| m.id().0).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert!(correlator.pending().is_empty());
    }

    #[test]
    fn test_claim_after_unresolved_moved_from_is_empty() {
        let mut correlator = MoveCorrelator::new();
        correlator.observe(ChangeKind::MovedFrom);
        assert_eq!(correlator.claim(), Some(Vec::new()));
    }
}
