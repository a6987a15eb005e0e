//! Interface to the remote media catalog.
//!
//! The catalog tracks entries by numeric id and `file://` url. Urls are the
//! percent-encoded absolute path with `/` left literal.

pub mod socket;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CatalogError, DispatchError};

pub use socket::SocketCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(pub u32);

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One row of a prefix query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: CatalogId,
    pub url: String,
}

/// Synchronous request/response access to the catalog.
///
/// Every call blocks until the catalog has answered.
pub trait CatalogClient {
    /// Resolves the id of the entry stored under `url`, if any.
    fn lookup_id(&mut self, url: &Url) -> Result<Option<CatalogId>, CatalogError>;

    fn add(&mut self, url: &Url) -> Result<(), CatalogError>;

    fn remove(&mut self, id: CatalogId) -> Result<(), CatalogError>;

    fn rehash(&mut self, id: CatalogId) -> Result<(), CatalogError>;

    fn move_entry(&mut self, id: CatalogId, new_url: &Url) -> Result<(), CatalogError>;

    /// Every entry whose url starts with `prefix`, in catalog order.
    fn query_by_prefix(&mut self, prefix: &Url) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Pushes any buffered outbound requests. Clients that write eagerly have nothing to do.
    fn flush_outbound(&mut self) -> Result<(), CatalogError> {
        Ok(())
    }
}

impl<C: CatalogClient + ?Sized> CatalogClient for &mut C {
    fn lookup_id(&mut self, url: &Url) -> Result<Option<CatalogId>, CatalogError> {
        (**self).lookup_id(url)
    }

    fn add(&mut self, url: &Url) -> Result<(), CatalogError> {
        (**self).add(url)
    }

    fn remove(&mut self, id: CatalogId) -> Result<(), CatalogError> {
        (**self).remove(id)
    }

    fn rehash(&mut self, id: CatalogId) -> Result<(), CatalogError> {
        (**self).rehash(id)
    }

    fn move_entry(&mut self, id: CatalogId, new_url: &Url) -> Result<(), CatalogError> {
        (**self).move_entry(id, new_url)
    }

    fn query_by_prefix(&mut self, prefix: &Url) -> Result<Vec<CatalogEntry>, CatalogError> {
        (**self).query_by_prefix(prefix)
    }

    fn flush_outbound(&mut self) -> Result<(), CatalogError> {
        (**self).flush_outbound()
    }
}

/// The catalog url of an absolute filesystem path.
pub fn file_url(path: &Path) -> Result<Url, DispatchError> {
    Url::from_file_path(path).map_err(|_| DispatchError::MalformedPath(path.to_path_buf()))
}

/// The url prefix shared by every entry stored below `dir` (ends with `/`).
pub fn directory_prefix_url(dir: &Path) -> Result<Url, DispatchError> {
    Url::from_directory_path(dir).map_err(|_| DispatchError::MalformedPath(dir.to_path_buf()))
}

/// Recovers the path of `entry_url` relative to the directory `root`.
pub fn relative_path(entry_url: &str, root: &Path) -> Result<PathBuf, DispatchError> {
    let malformed = || DispatchError::MalformedPath(PathBuf::from(entry_url));
    let path = Url::parse(entry_url)
        .map_err(|_| malformed())?
        .to_file_path()
        .map_err(|_| malformed())?;
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|_| malformed())
}
