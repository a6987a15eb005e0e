//! Mirrors filesystem changes under a set of watched directories into a
//! remote media catalog.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;

pub use catalog::{CatalogClient, CatalogEntry, CatalogId, SocketCatalog};
pub use self::core::*;
pub use error::{CatalogError, ConfigError, DispatchError, SourceError};
