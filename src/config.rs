//! Engine configuration.
//!
//! [`StoreConfig`] holds the recognized storage options and acts as a factory
//! that produces a [`DiskStore`] bound to a logical name. The configuration
//! is copied into the engine at creation time; mutating it afterward does not
//! affect already-open engines.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::engine::DiskStore;
use crate::error::{StoreError, StoreResult};

/// Default cache size for cacheable partitions, in bytes.
pub const DEFAULT_CACHE_SIZE: usize = 32 * 1024 * 1024;

/// Configuration options for big-collection storage.
///
/// # Example
///
/// ```ignore
/// use granary::StoreConfig;
///
/// let config = StoreConfig::new()
///     .directory("/var/lib/models")
///     .cache_size(64 * 1024 * 1024)
///     .compressed(true);
///
/// let store = config.create_engine("modelA")?;
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for persistent partitions.
    /// If not set, the system temp directory is used.
    pub directory: Option<PathBuf>,

    /// Cache size in bytes for cacheable partitions. 0 disables caching.
    pub cache_size: usize,

    /// Whether stored values are compressed.
    pub compressed: bool,

    /// Whether `InMemory`-hinted collections bypass disk entirely.
    pub hybridized: bool,

    /// Whether commits defer durability to the background (asynchronous writes).
    pub asynchronous: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: None,
            cache_size: DEFAULT_CACHE_SIZE,
            compressed: false,
            hybridized: false,
            asynchronous: false,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root directory for persistent partitions.
    #[must_use]
    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    /// Set the cache size in bytes. 0 disables caching.
    #[must_use]
    pub const fn cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = bytes;
        self
    }

    /// Set whether stored values are compressed.
    #[must_use]
    pub const fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// Set whether `InMemory`-hinted collections bypass disk entirely.
    #[must_use]
    pub const fn hybridized(mut self, hybridized: bool) -> Self {
        self.hybridized = hybridized;
        self
    }

    /// Set whether commits defer durability to the background.
    #[must_use]
    pub const fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    /// Apply string-valued options atomically.
    ///
    /// Recognized keys are `directory`, `cacheSize`, `compressed`,
    /// `hybridized`, and `asynchronous`. An unrecognized key or a malformed
    /// value fails with [`StoreError::InvalidArgument`] and leaves the
    /// configuration untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] at load time, not later.
    pub fn load(&mut self, options: &BTreeMap<String, String>) -> StoreResult<()> {
        // Parse everything into a staging copy first so a bad option cannot
        // leave the configuration half-applied.
        let mut staged = self.clone();
        for (key, value) in options {
            match key.as_str() {
                "directory" => staged.directory = Some(PathBuf::from(value)),
                "cacheSize" => {
                    staged.cache_size = value.parse::<usize>().map_err(|_| {
                        StoreError::InvalidArgument(format!(
                            "cacheSize must be a non-negative integer, got {value:?}"
                        ))
                    })?;
                }
                "compressed" => staged.compressed = parse_bool(key, value)?,
                "hybridized" => staged.hybridized = parse_bool(key, value)?,
                "asynchronous" => staged.asynchronous = parse_bool(key, value)?,
                other => {
                    return Err(StoreError::InvalidArgument(format!(
                        "unrecognized option: {other}"
                    )));
                }
            }
        }
        *self = staged;
        Ok(())
    }

    /// Produce an engine bound to the given logical name.
    ///
    /// Always succeeds: the underlying stores are opened lazily on first use.
    /// The engine copies this configuration; later mutation of `self` does
    /// not affect it.
    #[must_use]
    pub fn create_engine(&self, name: impl Into<String>) -> DiskStore {
        DiskStore::new(self.clone(), name.into())
    }

    /// The root directory persistent partitions live under.
    #[must_use]
    pub fn root_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Whether `path` is this configuration's root (the pruning boundary).
    pub(crate) fn is_root(&self, path: &Path) -> bool {
        path == self.root_dir().as_path()
    }
}

fn parse_bool(key: &str, value: &str) -> StoreResult<bool> {
    value.parse::<bool>().map_err(|_| {
        StoreError::InvalidArgument(format!("{key} must be true or false, got {value:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new();
        assert!(config.directory.is_none());
        assert_eq!(config.cache_size, DEFAULT_CACHE_SIZE);
        assert!(!config.compressed);
        assert!(!config.hybridized);
        assert!(!config.asynchronous);
        assert_eq!(config.root_dir(), std::env::temp_dir());
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new()
            .directory("/data/models")
            .cache_size(1024)
            .compressed(true)
            .hybridized(true)
            .asynchronous(true);
        assert_eq!(config.directory.as_deref(), Some(Path::new("/data/models")));
        assert_eq!(config.cache_size, 1024);
        assert!(config.compressed && config.hybridized && config.asynchronous);
    }

    #[test]
    fn test_load_recognized_options() {
        let mut config = StoreConfig::new();
        config
            .load(&options(&[
                ("directory", "/tmp/models"),
                ("cacheSize", "4096"),
                ("compressed", "true"),
                ("hybridized", "true"),
                ("asynchronous", "false"),
            ]))
            .expect("load failed");
        assert_eq!(config.directory.as_deref(), Some(Path::new("/tmp/models")));
        assert_eq!(config.cache_size, 4096);
        assert!(config.compressed);
        assert!(config.hybridized);
        assert!(!config.asynchronous);
    }

    #[test]
    fn test_load_rejects_unknown_key() {
        let mut config = StoreConfig::new();
        let err = config.load(&options(&[("cacheSizes", "1")])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_load_rejects_malformed_value() {
        let mut config = StoreConfig::new();
        assert!(config.load(&options(&[("cacheSize", "-1")])).is_err());
        assert!(config.load(&options(&[("compressed", "yes")])).is_err());
    }

    #[test]
    fn test_load_is_atomic() {
        let mut config = StoreConfig::new();
        let err = config
            .load(&options(&[("cacheSize", "4096"), ("hybridized", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        // The valid option must not have been applied.
        assert_eq!(config.cache_size, DEFAULT_CACHE_SIZE);
    }

    #[test]
    fn test_engine_copies_configuration() {
        let mut config = StoreConfig::new().cache_size(1024);
        let store = config.create_engine("copied");
        config.cache_size = 0;
        assert_eq!(store.config().cache_size, 1024);
    }
}
