//! Configuration management for mediasync
//!
//! Two files live in the configuration directory: an optional `config.toml`
//! with engine and connection settings, and `watch_dirs`, listing one glob
//! pattern per line for the directories to keep in sync.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use globset::GlobBuilder;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Global configuration for mediasync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Event engine configuration
    pub watcher: WatcherConfig,
    /// Catalog connection configuration
    pub catalog: CatalogConfig,
}

/// Configuration for the event engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// How long one poll waits for events, in milliseconds
    pub poll_timeout_ms: u64,
    /// Poll cycles an unclaimed moved-away entry may wait before it is removed
    pub reconciliation_ticks: u32,
    /// Watch-directories file, when not the one in the config directory
    pub watch_file: Option<PathBuf>,
}

/// Configuration for the catalog connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// `unix:///path/to/socket` or `tcp://host:port`
    pub address: String,
    /// Name announced to the catalog when connecting
    pub client_name: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 5000,
            reconciliation_ticks: 5,
            watch_file: None,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            address: "unix:///tmp/mediasync-catalog.sock".to_string(),
            client_name: "mediasync".to_string(),
        }
    }
}

impl WatcherConfig {
    /// Get poll timeout duration
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Directory holding the log, `config.toml` and `watch_dirs`.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediasync")
}

/// Configuration loading and management
impl SyncConfig {
    /// Load configuration from `path`, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override values from environment variables if present
    pub fn apply_env(mut self) -> Self {
        if let Ok(address) = std::env::var("MEDIASYNC_CATALOG") {
            if !address.is_empty() {
                self.catalog.address = address;
            }
        }

        if let Ok(val) = std::env::var("MEDIASYNC_POLL_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.watcher.poll_timeout_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("MEDIASYNC_RECONCILE_TICKS") {
            if let Ok(ticks) = val.parse::<u32>() {
                self.watcher.reconciliation_ticks = ticks;
            }
        }

        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watcher.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.watcher.reconciliation_ticks == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation_ticks must be greater than 0".to_string(),
            ));
        }

        if self.catalog.address.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "catalog address must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Reads the watch-directories file and resolves it to absolute directories.
///
/// A missing file is created empty so the user knows where to list directories.
pub fn read_watch_dirs(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
            fs::write(path, "").map_err(io_error)?;
            return Err(ConfigError::MissingWatchFile {
                path: path.to_path_buf(),
            });
        }
        Err(err) => return Err(io_error(err)),
    };

    let mut dirs: Vec<PathBuf> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for dir in expand_pattern(line)? {
            let dir = std::path::absolute(&dir).map_err(io_error)?;
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }

    if dirs.is_empty() {
        return Err(ConfigError::NoWatchRoots {
            path: path.to_path_buf(),
        });
    }
    Ok(dirs)
}

/// Existing directories matching a shell-style glob pattern.
///
/// The walk starts at the longest literal prefix of the pattern and only goes as
/// deep as the pattern does, unless the pattern contains `**`.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let invalid = |source| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    };

    if !has_glob_meta(pattern) {
        let path = PathBuf::from(pattern);
        return Ok(if path.is_dir() { vec![path] } else { Vec::new() });
    }

    let components: Vec<Component<'_>> = Path::new(pattern).components().collect();
    let literal = components
        .iter()
        .take_while(|c| !has_glob_meta(&c.as_os_str().to_string_lossy()))
        .count();
    let base: PathBuf = components[..literal].iter().collect();
    let depth = components.len() - literal;

    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(invalid)?
        .compile_matcher();

    let (walk_root, strip_dot) = if base.as_os_str().is_empty() {
        (PathBuf::from("."), true)
    } else {
        (base, false)
    };
    let max_depth = if pattern.contains("**") { None } else { Some(depth) };

    let mut matches = Vec::new();
    for entry in WalkBuilder::new(&walk_root)
        .standard_filters(false)
        .max_depth(max_depth)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
        .flatten()
    {
        let candidate = if strip_dot {
            entry.path().strip_prefix(".").unwrap_or(entry.path())
        } else {
            entry.path()
        };
        if matcher.is_match(candidate) && candidate.is_dir() {
            matches.push(candidate.to_path_buf());
        }
    }
    Ok(matches)
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();

        assert_eq!(config.watcher.poll_timeout_ms, 5000);
        assert_eq!(config.watcher.reconciliation_ticks, 5);
        assert_eq!(config.catalog.client_name, "mediasync");
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        config.watcher.reconciliation_ticks = 0;
        assert!(config.validate().is_err());

        config.watcher.reconciliation_ticks = 5;
        config.watcher.poll_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.watcher.poll_timeout_ms = 5000;
        config.catalog.address = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_conversions() {
        let config = WatcherConfig::default();
        assert_eq!(config.poll_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_config_loading() {
        std::env::set_var("MEDIASYNC_CATALOG", "tcp://127.0.0.1:9667");
        std::env::set_var("MEDIASYNC_RECONCILE_TICKS", "9");

        let config = SyncConfig::default().apply_env();

        assert_eq!(config.catalog.address, "tcp://127.0.0.1:9667");
        assert_eq!(config.watcher.reconciliation_ticks, 9);

        // Cleanup
        std::env::remove_var("MEDIASYNC_CATALOG");
        std::env::remove_var("MEDIASYNC_RECONCILE_TICKS");
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[watcher]\nreconciliation_ticks = 3\n").unwrap();

        let config = SyncConfig::load_or_default(&path).unwrap();
        assert_eq!(config.watcher.reconciliation_ticks, 3);
        assert_eq!(config.watcher.poll_timeout_ms, 5000);
        assert_eq!(config.catalog.address, CatalogConfig::default().address);
    }

    #[test]
    fn test_load_missing_and_broken_toml() {
        let dir = TempDir::new().unwrap();
        assert!(SyncConfig::load_or_default(&dir.path().join("absent.toml")).is_ok());

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[watcher\n").unwrap();
        assert!(matches!(
            SyncConfig::load_or_default(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_watch_file_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/watch_dirs");

        let result = read_watch_dirs(&path);
        assert!(matches!(result, Err(ConfigError::MissingWatchFile { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_watch_file_without_valid_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("watch_dirs");
        fs::write(&path, format!("{}\n\n", dir.path().join("nope").display())).unwrap();

        assert!(matches!(
            read_watch_dirs(&path),
            Err(ConfigError::NoWatchRoots { .. })
        ));
    }

    #[test]
    fn test_watch_file_expands_globs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("music/rock")).unwrap();
        fs::create_dir_all(root.join("music/jazz")).unwrap();
        fs::create_dir_all(root.join("podcasts")).unwrap();
        fs::write(root.join("music/notes.txt"), b"").unwrap();

        let path = root.join("watch_dirs");
        fs::write(
            &path,
            format!(
                "# music collection\n{}\n{}\n{}\n",
                root.join("music/*").display(),
                root.join("podcasts").display(),
                root.join("music/rock").display(),
            ),
        )
        .unwrap();

        let dirs = read_watch_dirs(&path).unwrap();
        assert_eq!(
            dirs,
            vec![
                root.join("music/jazz"),
                root.join("music/rock"),
                root.join("podcasts"),
            ]
        );
    }

    #[test]
    fn test_expand_pattern_depth_is_bounded() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b/c")).unwrap();

        let one_level = expand_pattern(&root.join("*").display().to_string()).unwrap();
        assert_eq!(one_level, vec![root.join("a")]);

        let any_level = expand_pattern(&root.join("**").display().to_string()).unwrap();
        assert!(any_level.contains(&root.join("a/b/c")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            expand_pattern("/music/[unclosed"),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
