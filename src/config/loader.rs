//! Configuration loading from disk.
//!
//! A configuration is assembled from an ordered list of TOML fragments. Later
//! fragments override earlier ones key by key, so the order of the list decides
//! precedence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use toml::{Table, Value};

use crate::config::schema::ServiceConfig;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Deserialize(#[source] toml::de::Error),
}

impl ConfigError {
    /// True when the error is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Turns an ordered list of files into a configuration snapshot.
///
/// Implementations must be deterministic for identical inputs.
pub trait ConfigLoader: Send + Sync + 'static {
    type Snapshot: Send + 'static;

    fn load_files(&self, paths: &[PathBuf]) -> Result<Self::Snapshot, ConfigError>;
}

/// Loads [`ServiceConfig`] by deep-merging TOML files.
///
/// Tables merge recursively; scalars and arrays from a later file replace the
/// earlier value. An optional base file is always applied first.
#[derive(Debug, Clone, Default)]
pub struct TomlLoader {
    base: Option<PathBuf>,
}

impl TomlLoader {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    /// Merge the base file and `paths` into one table.
    pub fn merge_files(&self, paths: &[PathBuf]) -> Result<Table, ConfigError> {
        let mut merged = Table::new();
        for path in self.base.iter().chain(paths) {
            merge_tables(&mut merged, read_table(path)?);
        }
        Ok(merged)
    }
}

impl ConfigLoader for TomlLoader {
    type Snapshot = ServiceConfig;

    fn load_files(&self, paths: &[PathBuf]) -> Result<ServiceConfig, ConfigError> {
        let merged = self.merge_files(paths)?;
        Value::Table(merged)
            .try_into()
            .map_err(ConfigError::Deserialize)
    }
}

/// List the files in `dir` whose name ends in `suffix`, sorted by file name.
///
/// Subdirectories are skipped. The returned paths are joined onto `dir`.
pub fn list_config_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| n.ends_with(suffix)) {
            names.push(name);
        }
    }
    names.sort();

    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

fn read_table(path: &Path) -> Result<Table, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    content.parse::<Table>().map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        let merged = match (base.remove(&key), value) {
            (Some(Value::Table(mut existing)), Value::Table(incoming)) => {
                merge_tables(&mut existing, incoming);
                Value::Table(existing)
            }
            (_, value) => value,
        };
        base.insert(key, merged);
    }
}
