//! Configuration error types.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, resolving, or mutating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found (after extension auto-detection).
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: PathBuf,
    },

    /// Failed to read configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write configuration file during write-back.
    #[error("failed to write configuration file: {path}")]
    WriteError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension is neither YAML nor JSON.
    #[error("unsupported configuration file type: {path}")]
    UnsupportedFormat {
        /// Offending path.
        path: PathBuf,
    },

    /// A YAML file was requested but the crate was built without the `yaml` feature.
    #[error("YAML support is not available (enable the `yaml` feature): {path}")]
    YamlUnavailable {
        /// Path to the YAML file.
        path: PathBuf,
    },

    /// YAML parsing or encoding error.
    #[cfg(feature = "yaml")]
    #[error("failed to process YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing or encoding error.
    #[error("failed to process JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The decoded document root is not a mapping.
    #[error("configuration document root must be a mapping, found {found}")]
    InvalidDocument {
        /// Kind of value found at the root.
        found: &'static str,
    },

    /// A value did not match its declared shape, or a required field is missing.
    #[error("invalid configuration at {0}")]
    Schema(SchemaError),

    /// A command-line override flag was given without its argument.
    #[error("missing parameter for command-line flag {flag}")]
    MissingArgument {
        /// The flag as it appeared on the command line.
        flag: String,
    },

    /// Attaching a container would make it its own ancestor.
    #[error("cannot attach a configuration node beneath itself")]
    CyclicAttach,

    /// Sequence index out of range.
    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Sequence length at the time of the call.
        len: usize,
    },

    /// `ConfigList::remove` did not find the value.
    #[error("value not found in sequence")]
    ValueNotFound,

    /// A dotted path does not lead to a container.
    #[error("no configuration container at path `{path}`")]
    PathNotFound {
        /// The dotted path that was requested.
        path: String,
    },
}

impl ConfigError {
    /// Create a new file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Create a new write error.
    pub fn write_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteError {
            path: path.into(),
            source,
        }
    }

    /// Create a new unsupported format error.
    pub fn unsupported_format(path: impl Into<PathBuf>) -> Self {
        Self::UnsupportedFormat { path: path.into() }
    }

    /// Create a new missing argument error.
    pub fn missing_argument(flag: impl Into<String>) -> Self {
        Self::MissingArgument { flag: flag.into() }
    }

    /// Create a schema error for a field that has no value and no default.
    pub fn missing_field(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::Schema(SchemaError::new(field, expected, "missing config"))
    }

    /// Create a schema error for a value whose runtime type does not match.
    pub fn type_mismatch(expected: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema(SchemaError::new("", expected, reason))
    }

    /// Returns the structured schema error, if this is one.
    pub fn as_schema(&self) -> Option<&SchemaError> {
        match self {
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }

    /// Prefix the schema path of a schema error with `schema`.
    ///
    /// Other variants pass through unchanged.
    #[must_use]
    pub fn within_schema(self, schema: &str) -> Self {
        match self {
            Self::Schema(mut err) => {
                err.schema_path.insert(0, schema.to_string());
                Self::Schema(err)
            }
            other => other,
        }
    }

    /// Prefix the field path of a schema error with `field`.
    #[must_use]
    pub fn within_field(self, field: &str) -> Self {
        match self {
            Self::Schema(mut err) => {
                err.field_path.insert(0, field.to_string());
                Self::Schema(err)
            }
            other => other,
        }
    }
}

/// A resolution failure with the full path to the offending value.
///
/// `path()` names the chain of schemas (`Outer/Inner`), `field()` the
/// offending key, and `dotted_field()` the chain of keys from the root
/// (`inner.name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    schema_path: Vec<String>,
    field_path: Vec<String>,
    expected: String,
    reason: String,
}

impl SchemaError {
    /// Create an error for `field` (empty when the field is not yet known).
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let field = field.into();
        Self {
            schema_path: Vec::new(),
            field_path: if field.is_empty() {
                Vec::new()
            } else {
                vec![field]
            },
            expected: expected.into(),
            reason: reason.into(),
        }
    }

    /// Schema names from the root schema to the one holding the field.
    pub fn path(&self) -> String {
        self.schema_path.join("/")
    }

    /// The offending field key (the innermost path segment).
    pub fn field(&self) -> &str {
        self.field_path.last().map(String::as_str).unwrap_or("")
    }

    /// Field keys from the root to the offending value, joined with dots.
    pub fn dotted_field(&self) -> String {
        self.field_path.join(".")
    }

    /// Description of the expected shape.
    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// Human-readable reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path();
        write!(
            f,
            "{} field `{}` (expected {}): {}",
            if path.is_empty() { "<root>" } else { path.as_str() },
            self.dotted_field(),
            self.expected,
            self.reason
        )
    }
}

impl std::error::Error for SchemaError {}
