//! Pool registry error types.

use thiserror::Error;

use tessera_config::ConfigError;

/// Boxed error returned by [`PoolFactory`](crate::PoolFactory) implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while building a [`PoolRegistry`](crate::PoolRegistry).
#[derive(Error, Debug)]
pub enum DbError {
    /// The configuration has no database section under the given key.
    #[error("Database section not found: {key}")]
    MissingSection {
        /// The requested key
        key: String,
    },

    /// The database section is neither a mapping nor a list.
    #[error("Database section must be a mapping or a list, found {found}")]
    InvalidSection {
        /// Kind of value found
        found: &'static str,
    },

    /// A list entry is not a mapping.
    #[error("Database entry {index} must be a mapping, found {found}")]
    InvalidEntry {
        /// Position in the list
        index: usize,
        /// Kind of value found
        found: &'static str,
    },

    /// An entry does not fit the database schema.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A resolved entry could not be decoded.
    #[error("Failed to decode database entry: {0}")]
    Decode(#[from] serde_json::Error),

    /// `min_size` exceeds `max_size`.
    #[error("Pool '{mark}' has min_size {min} greater than max_size {max}")]
    InvalidSize {
        /// Pool mark
        mark: String,
        /// Configured minimum
        min: usize,
        /// Configured maximum
        max: usize,
    },

    /// No entries were configured.
    #[error("No database configured")]
    Empty,

    /// Two entries share a mark.
    #[error("Duplicate database mark: {mark}")]
    DuplicateMark {
        /// The repeated mark
        mark: String,
    },

    /// More than one entry is flagged as default.
    #[error("Multiple default databases: {first} and {second}")]
    MultipleDefaults {
        /// First default mark
        first: String,
        /// Second default mark
        second: String,
    },

    /// No pool is registered under the mark.
    #[error("Unknown database mark: {mark}")]
    UnknownMark {
        /// The requested mark
        mark: String,
    },

    /// No default pool is designated.
    #[error("No default database designated")]
    NoDefault,

    /// A connection could not be checked out or failed its ping.
    #[error("Failed to acquire connection from '{mark}': {source}")]
    Acquire {
        /// Pool mark
        mark: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// A connection could not be returned to its pool.
    #[error("Failed to release connection to '{mark}': {source}")]
    Release {
        /// Pool mark
        mark: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// The factory failed to create a pool.
    #[error("Failed to create pool '{mark}': {source}")]
    Factory {
        /// Pool mark
        mark: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },
}

impl DbError {
    /// Create a duplicate mark error.
    pub fn duplicate_mark(mark: impl Into<String>) -> Self {
        Self::DuplicateMark { mark: mark.into() }
    }

    /// Create a factory error.
    pub fn factory(mark: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Factory {
            mark: mark.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::duplicate_mark("main");
        assert_eq!(err.to_string(), "Duplicate database mark: main");

        let err = DbError::factory("main", "connection refused");
        assert_eq!(
            err.to_string(),
            "Failed to create pool 'main': connection refused"
        );
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err = DbError::from(ConfigError::missing_field("host", "string"));
        assert_eq!(err.to_string(), ConfigError::missing_field("host", "string").to_string());
    }
}
