//! Configuration loader.
//!
//! This module provides the [`ConfigLoader`] for locating, decoding, and
//! materializing configuration files, optionally against a [`Schema`] and
//! optionally with write-back enabled.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::resolver::Resolver;
use crate::schema::Schema;
use crate::sync::{sync, Format};
use crate::{ConfigError, ConfigMap};

/// Extensions tried, in order, when the requested path does not exist.
const EXTENSIONS: [&str; 2] = [".yaml", ".json"];

/// Configuration loader.
///
/// Relative paths passed to [`load`](Self::load) are looked up in the base
/// directory (default `config`); [`load_raw`](Self::load_raw) takes the path
/// verbatim. If the path does not name a file, `.yaml` and then `.json` are
/// appended.
///
/// # Example
///
/// ```no_run
/// use tessera_config::{ConfigLoader, Field, Schema, Shape};
///
/// # fn main() -> Result<(), tessera_config::ConfigError> {
/// let schema = Schema::new("Config")
///     .with_field(Field::new("name", Shape::string()));
///
/// let config = ConfigLoader::new()
///     .with_schema(schema)
///     .with_sync(true)
///     .load("app")?;
///
/// config.insert("name", "renamed")?; // written back to config/app.yaml
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    base_dir: PathBuf,
    schema: Option<Arc<Schema>>,
    sync: bool,
    resolver: Resolver,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader rooted at `config/`, without schema or sync.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_config::ConfigLoader;
    ///
    /// let loader = ConfigLoader::new();
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_dir: PathBuf::from("config"),
            schema: None,
            sync: false,
            resolver: Resolver::new(),
        }
    }

    /// Set the directory relative paths are resolved against.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Validate and coerce the document against `schema`.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Persist every mutation of the loaded tree back to its file.
    #[must_use]
    pub fn with_sync(mut self, enabled: bool) -> Self {
        self.sync = enabled;
        self
    }

    /// Use `args` instead of the process arguments for command-line overrides.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolver = Resolver::with_args(args);
        self
    }

    /// Locate `path` inside the base directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] if neither the path nor any of
    /// its extension variants is a file.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
        find_file(&self.base_dir.join(path))
    }

    /// Load `path` relative to the base directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist (with or without extension)
    /// - The extension is not YAML or JSON
    /// - The file cannot be read or decoded
    /// - The document does not fit the schema
    /// - Sync is enabled and the initial write fails
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ConfigMap, ConfigError> {
        self.load_raw(self.base_dir.join(path))
    }

    /// Load `path` as given, ignoring the base directory.
    pub fn load_raw(&self, path: impl AsRef<Path>) -> Result<ConfigMap, ConfigError> {
        let path = find_file(path.as_ref())?;
        let format = Format::from_path(&path)?;
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::read_error(&path, e))?;

        let root = self.materialize(&content, format)?;
        tracing::info!(path = %path.display(), schema = ?self.schema.as_ref().map(|s| s.name()), "Configuration loaded");

        if self.sync {
            sync(&root, &path)?;
        }
        Ok(root)
    }

    /// Materialize configuration from a string. Never syncs.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_config::{ConfigLoader, Format};
    ///
    /// let config = ConfigLoader::new()
    ///     .load_str(r#"{"server": {"port": 8080}}"#, Format::Json)
    ///     .unwrap();
    ///
    /// assert_eq!(config.lookup("server.port").and_then(|v| v.as_i64()), Some(8080));
    /// ```
    pub fn load_str(&self, content: &str, format: Format) -> Result<ConfigMap, ConfigError> {
        self.materialize(content, format)
    }

    fn materialize(&self, content: &str, format: Format) -> Result<ConfigMap, ConfigError> {
        let raw = format.decode(content)?;
        match &self.schema {
            Some(schema) => self.resolver.resolve_schema(&raw, schema),
            None => ConfigMap::from_plain(&raw),
        }
    }
}

/// Load `path` from the `config/` directory using the process arguments.
///
/// Shorthand for `ConfigLoader::new().load(path)`.
pub fn read_config(path: impl AsRef<Path>) -> Result<ConfigMap, ConfigError> {
    ConfigLoader::new().load(path)
}

fn find_file(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    for extension in EXTENSIONS {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(extension);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            tracing::debug!(requested = %path.display(), resolved = %candidate.display(), "Resolved configuration extension");
            return Ok(candidate);
        }
    }
    Err(ConfigError::file_not_found(path))
}
