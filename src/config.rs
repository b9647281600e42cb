//! Runtime configuration
//!
//! Precedence, lowest first: platform defaults, environment variables,
//! explicit overrides (CLI flags).

use std::path::{Path, PathBuf};

pub const ENV_DB: &str = "LEASELINE_DB";
pub const ENV_BLOB_ROOT: &str = "LEASELINE_BLOB_ROOT";
pub const ENV_KEY_PREFIX: &str = "LEASELINE_KEY_PREFIX";
pub const ENV_FRAGMENT_DIR: &str = "LEASELINE_FRAGMENT_DIR";

pub const DEFAULT_KEY_PREFIX: &str = "leases";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite database holding groups, documents, and snapshots
    pub db_path: PathBuf,
    /// Root directory of the local object store
    pub blob_root: PathBuf,
    /// Key prefix for uploaded documents
    pub key_prefix: String,
    /// Directory the extraction pipeline writes numbered fragments to
    pub fragment_dir: PathBuf,
}

/// `~/.local/share/leaseline` or the platform equivalent
pub fn default_data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("leaseline")
}

impl Default for Config {
    fn default() -> Self {
        Self::rooted_at(default_data_dir())
    }
}

impl Config {
    /// All paths under one directory.
    pub fn rooted_at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            db_path: dir.join("leaseline.db"),
            blob_root: dir.join("blobs"),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            fragment_dir: dir.join("cam_result"),
        }
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Self {
        Self::default().with_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup. Empty values are ignored.
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_DB) {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_BLOB_ROOT) {
            self.blob_root = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_KEY_PREFIX) {
            self.key_prefix = v;
        }
        if let Some(v) = get(ENV_FRAGMENT_DIR) {
            self.fragment_dir = PathBuf::from(v);
        }
        self
    }

    pub fn with_db_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.db_path = path;
        }
        self
    }

    pub fn with_blob_root(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.blob_root = path;
        }
        self
    }

    /// Create the parent directories the store and object store need.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.blob_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_rooted_defaults() {
        let config = Config::rooted_at("/data");
        assert_eq!(config.db_path, PathBuf::from("/data/leaseline.db"));
        assert_eq!(config.blob_root, PathBuf::from("/data/blobs"));
        assert_eq!(config.key_prefix, "leases");
        assert_eq!(config.fragment_dir, PathBuf::from("/data/cam_result"));
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DB, "/tmp/other.db"),
            (ENV_KEY_PREFIX, "docs"),
            (ENV_BLOB_ROOT, "  "),
        ]
        .into_iter()
        .collect();
        let config =
            Config::rooted_at("/data").with_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.key_prefix, "docs");
        // Blank values don't override
        assert_eq!(config.blob_root, PathBuf::from("/data/blobs"));
    }

    #[test]
    fn test_flags_win_over_environment() {
        let config = Config::rooted_at("/data")
            .with_lookup(|k| (k == ENV_DB).then(|| "/env.db".to_string()))
            .with_db_path(Some(PathBuf::from("/flag.db")))
            .with_blob_root(None);
        assert_eq!(config.db_path, PathBuf::from("/flag.db"));
        assert_eq!(config.blob_root, PathBuf::from("/data/blobs"));
    }

    #[test]
    fn test_ensure_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(tmp.path().join("nested"));
        config.ensure_dirs().unwrap();
        assert!(config.blob_root.is_dir());
        assert!(config.db_path.parent().unwrap().is_dir());
    }
}
