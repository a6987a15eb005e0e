use std::ffi::OsString;
use std::fmt;
use std::ops::BitOr;
use std::path::PathBuf;

use crate::catalog::CatalogId;

/// Opaque identifier handed out when a directory is registered for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(pub u64);

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Modify,
    Create,
    Delete,
    MovedFrom,
    MovedTo,
}

impl ChangeKind {
    fn bit(self) -> u8 {
        match self {
            ChangeKind::Modify => 1,
            ChangeKind::Create => 1 << 1,
            ChangeKind::Delete => 1 << 2,
            ChangeKind::MovedFrom => 1 << 3,
            ChangeKind::MovedTo => 1 << 4,
        }
    }
}

/// Set of change kinds a watch is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestMask(u8);

impl InterestMask {
    pub const MODIFY: InterestMask = InterestMask(1);
    pub const CREATE: InterestMask = InterestMask(1 << 1);
    pub const DELETE: InterestMask = InterestMask(1 << 2);
    pub const MOVED_FROM: InterestMask = InterestMask(1 << 3);
    pub const MOVED_TO: InterestMask = InterestMask(1 << 4);

    /// The mask every directory of a watch tree is registered with.
    pub const SYNC: InterestMask = InterestMask(0b1_1111);

    pub fn contains(self, kind: ChangeKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl BitOr for InterestMask {
    type Output = InterestMask;

    fn bitor(self, rhs: InterestMask) -> InterestMask {
        InterestMask(self.0 | rhs.0)
    }
}

/// One change notification as delivered by a [`NotificationSource`](super::NotificationSource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub handle: WatchHandle,
    pub kind: ChangeKind,
    /// Entry inside the watched directory; `None` when the event concerns the directory itself.
    pub name: Option<OsString>,
}

impl RawEvent {
    pub fn new(handle: WatchHandle, kind: ChangeKind, name: Option<OsString>) -> Self {
        Self { handle, kind, name }
    }

    pub fn child(handle: WatchHandle, kind: ChangeKind, name: impl Into<OsString>) -> Self {
        Self::new(handle, kind, Some(name.into()))
    }
}

/// A moved-away entry waiting for its moved-in half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMove {
    /// A single file the catalog already knows.
    ById(CatalogId),
    /// One catalog entry that lived under a moved directory, relative to that directory.
    ByPrefix { id: CatalogId, relative: PathBuf },
}

impl PendingMove {
    pub fn id(&self) -> CatalogId {
        match self {
            PendingMove::ById(id) => *id,
            PendingMove::ByPrefix { id, .. } => *id,
        }
    }
}
