//! Error types shared across the crate.
//!
//! Only configuration problems and a failed catalog connection are fatal.
//! Everything raised while dispatching a single event is logged and dropped.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::events::WatchHandle;

/// Problems with the configuration file or the watch-directories file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("put some directories in {} to monitor them!", path.display())]
    MissingWatchFile { path: PathBuf },

    #[error("no valid directory to watch in {}", path.display())]
    NoWatchRoots { path: PathBuf },

    #[error("invalid watch pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Failures talking to the catalog service.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("couldn't connect to catalog at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported catalog address `{0}` (expected unix:///path or tcp://host:port)")]
    UnsupportedAddress(String),

    #[error("catalog i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed catalog message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("catalog rejected request: {0}")]
    Rejected(String),

    #[error("catalog connection closed")]
    Disconnected,
}

/// Failures of the notification facility.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error("unknown watch handle {0}")]
    UnknownHandle(WatchHandle),
}

/// Per-event failures. Logged at debug level, never fatal.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("cannot express {} as a catalog url", .0.display())]
    MalformedPath(PathBuf),

    #[error("event for unknown watch handle {0}")]
    UnknownWatch(WatchHandle),
}
