//! Core functionality module
//!
//! Contains directory watching, event correlation and the event loop

pub mod correlator;
pub mod event_loop;
pub mod events;
pub mod reconcile;
pub mod walk;
pub mod watch_tree;
pub mod watcher;

// Re-export main types
pub use correlator::{BatchPhase, CorrelatorState, MoveCorrelator};
pub use event_loop::{EngineSettings, EventLoop, StopFlag};
pub use events::{ChangeKind, InterestMask, PendingMove, RawEvent, WatchHandle};
pub use reconcile::ReconciliationTimer;
pub use walk::FileWalk;
pub use watch_tree::WatchTree;
pub use watcher::{NotificationSource, NotifySource};
