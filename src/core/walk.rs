use std::path::{Path, PathBuf};

use ignore::{DirEntry, WalkBuilder};

/// Depth-first traversal of everything below a root.
///
/// Nothing is collected up front: each call to [`files`](Self::files) or
/// [`directories`](Self::directories) starts a fresh lazy walk, so a `FileWalk`
/// can be restarted as often as needed. Entries of a directory are visited in
/// file-name order, directory symlinks are not followed and no ignore files
/// are honoured.
#[derive(Debug, Clone)]
pub struct FileWalk {
    root: PathBuf,
}

impl FileWalk {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every file at or below the root. A root that is a plain file yields itself.
    pub fn files(&self) -> impl Iterator<Item = PathBuf> {
        self.entries()
            .filter(|entry| match entry.file_type() {
                Some(kind) if kind.is_file() => true,
                Some(kind) if kind.is_symlink() => entry.path().is_file(),
                _ => false,
            })
            .map(DirEntry::into_path)
    }

    /// Every directory at or below the root, the root first.
    pub fn directories(&self) -> impl Iterator<Item = PathBuf> {
        self.entries()
            .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_dir()))
            .map(DirEntry::into_path)
    }

    fn entries(&self) -> impl Iterator<Item = DirEntry> {
        WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build()
            .filter_map(|result| match result {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!("Error walking directory: {}", err);
                    None
                }
            })
    }
}
