//! Write-back of a configuration tree to its file.
//!
//! [`sync`] installs a [`WriteBack`] sink in a root map's parent slot. From
//! then on, every mutation anywhere in the tree re-dumps the whole tree and
//! rewrites the file. Each mutation is its own write; use
//! [`ConfigMap::update`] to persist several keys at once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value as Json;

use crate::node::{ConfigMap, Propagate, WeakConfigMap};
use crate::ConfigError;

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.yaml` / `.yml`
    #[cfg(feature = "yaml")]
    Yaml,
    /// `.json`
    Json,
}

impl Format {
    /// Detect the format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedFormat`] for any other extension, and
    /// [`ConfigError::YamlUnavailable`] for YAML files when the `yaml`
    /// feature is disabled.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            #[cfg(feature = "yaml")]
            Some("yaml" | "yml") => Ok(Format::Yaml),
            #[cfg(not(feature = "yaml"))]
            Some("yaml" | "yml") => Err(ConfigError::YamlUnavailable {
                path: path.to_path_buf(),
            }),
            Some("json") => Ok(Format::Json),
            _ => Err(ConfigError::unsupported_format(path)),
        }
    }

    /// Decode a document. An empty or null document decodes to an empty mapping.
    pub fn decode(self, content: &str) -> Result<Json, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Json::Object(serde_json::Map::new()));
        }
        let value: Json = match self {
            Format::Json => serde_json::from_str(content)?,
            #[cfg(feature = "yaml")]
            Format::Yaml => serde_yaml::from_str(content)?,
        };
        Ok(match value {
            Json::Null => Json::Object(serde_json::Map::new()),
            other => other,
        })
    }

    /// Encode plain data. JSON uses 2-space indentation and keeps non-ASCII text as is.
    pub fn encode(self, value: &Json) -> Result<String, ConfigError> {
        match self {
            Format::Json => {
                let mut text = serde_json::to_string_pretty(value)?;
                text.push('\n');
                Ok(text)
            }
            #[cfg(feature = "yaml")]
            Format::Yaml => Ok(serde_yaml::to_string(value)?),
        }
    }
}

/// Terminal sink that persists its root on every notification.
pub struct WriteBack {
    root: WeakConfigMap,
    path: PathBuf,
    format: Format,
}

impl WriteBack {
    /// The file this sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The format used for encoding.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Dump the root and write it to the file now.
    pub fn persist(&self) -> Result<(), ConfigError> {
        let Some(root) = self.root.upgrade() else {
            tracing::warn!(path = %self.path.display(), "Configuration root dropped, skipping write-back");
            return Ok(());
        };
        let text = self.format.encode(&root.dump())?;
        fs::write(&self.path, text).map_err(|e| ConfigError::write_error(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), "Configuration written back");
        Ok(())
    }
}

impl Propagate for WriteBack {
    fn notify(&self) -> Result<(), ConfigError> {
        self.persist()
    }
}

impl std::fmt::Debug for WriteBack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBack")
            .field("path", &self.path)
            .field("format", &self.format)
            .finish()
    }
}

/// Bind `root` to `path`, replacing any previous binding, and write once.
///
/// # Errors
///
/// Returns [`ConfigError::UnsupportedFormat`] for unknown extensions, or any
/// encoding/write error from the initial write.
///
/// # Example
///
/// ```no_run
/// use tessera_config::{read_config, sync};
///
/// # fn main() -> Result<(), tessera_config::ConfigError> {
/// let config = read_config("app")?;
/// sync(&config, "backup/app.json")?;
/// config.insert("revision", 2)?; // rewrites backup/app.json
/// # Ok(())
/// # }
/// ```
pub fn sync(root: &ConfigMap, path: impl AsRef<Path>) -> Result<Arc<WriteBack>, ConfigError> {
    let path = path.as_ref();
    let sink = Arc::new(WriteBack {
        root: root.downgrade(),
        path: path.to_path_buf(),
        format: Format::from_path(path)?,
    });
    root.set_sink(sink.clone());
    tracing::info!(path = %path.display(), "Configuration sync enabled");
    sink.persist()?;
    Ok(sink)
}

/// Stop persisting `root`.
pub fn unsync(root: &ConfigMap) {
    root.detach();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    #[cfg(feature = "yaml")]
    fn test_yaml_null_document() {
        assert_eq!(Format::Yaml.decode("~\n").unwrap(), json!({}));
    }

    #[test]
    #[cfg(not(feature = "yaml"))]
    fn test_yaml_without_feature() {
        for name in ["a.yaml", "a.yml"] {
            assert!(matches!(
                Format::from_path(Path::new(name)),
                Err(ConfigError::YamlUnavailable { .. })
            ));
        }
    }

    #[test]
    fn test_format_from_path() {
        #[cfg(feature = "yaml")]
        {
            assert_eq!(Format::from_path(Path::new("a.yaml")).unwrap(), Format::Yaml);
            assert_eq!(Format::from_path(Path::new("a.YML")).unwrap(), Format::Yaml);
        }
        assert_eq!(Format::from_path(Path::new("a.json")).unwrap(), Format::Json);
        assert!(matches!(
            Format::from_path(Path::new("a.toml")),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_empty_document_is_empty_mapping() {
        assert_eq!(Format::Json.decode("  \n").unwrap(), json!({}));
        assert_eq!(Format::Json.decode("null").unwrap(), json!({}));
    }

    #[test]
    fn test_json_encoding_keeps_non_ascii() {
        let text = Format::Json.encode(&json!({"name": "数据库"})).unwrap();
        assert_eq!(text, "{\n  \"name\": \"数据库\"\n}\n");
    }

    #[test]
    fn test_sync_writes_immediately_and_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let root = ConfigMap::from_plain(&json!({"a": {"b": 1}})).unwrap();

        sync(&root, &path).unwrap();
        let written: Json = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"a": {"b": 1}}));

        root.set_path("a.b", 2).unwrap();
        let written: Json = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_rebind_replaces_previous_sink() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");
        let root = ConfigMap::from_plain(&json!({"v": 1})).unwrap();

        sync(&root, &first).unwrap();
        sync(&root, &second).unwrap();
        root.insert("v", 2).unwrap();

        let first: Json = serde_json::from_str(&fs::read_to_string(first).unwrap()).unwrap();
        let second: Json = serde_json::from_str(&fs::read_to_string(second).unwrap()).unwrap();
        assert_eq!(first, json!({"v": 1}));
        assert_eq!(second, json!({"v": 2}));
    }

    #[test]
    fn test_unsync_stops_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let root = ConfigMap::from_plain(&json!({"v": 1})).unwrap();

        sync(&root, &path).unwrap();
        unsync(&root);
        root.insert("v", 2).unwrap();

        let written: Json = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"v": 1}));
    }

    #[test]
    fn test_sink_outlives_root_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let root = ConfigMap::from_plain(&json!({"v": 1})).unwrap();
        let sink = sync(&root, &path).unwrap();
        drop(root);
        assert!(sink.persist().is_ok());
    }
}
