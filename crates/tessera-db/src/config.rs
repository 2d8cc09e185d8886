//! Database entry configuration.

use std::fmt;

use serde::Deserialize;
use serde_json::Value as Json;
use tessera_config::{ConfigMap, Field, Resolver, Schema, Shape, Union, Value};

use crate::DbError;

/// Connection settings for one database pool.
///
/// # Example
///
/// ```yaml
/// database:
///   - host: 10.0.0.5
///     user: app
///     password: secret
///     db: orders
///     default: true
///   - host: 10.0.0.6
///     user: app
///     password: secret
///     db: orders
///     mark: orders_replica
///     max_size: 4
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DbConfig {
    /// Server host name or address.
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// User name.
    pub user: String,

    /// Password.
    pub password: String,

    /// Database name.
    pub db: String,

    /// Registry key; the database name when not set.
    pub mark: String,

    /// Whether this pool is the registry default.
    #[serde(default)]
    pub default: bool,

    /// Connections kept open.
    #[serde(default = "default_min_size")]
    pub min_size: usize,

    /// Upper bound on open connections.
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Connection character set.
    #[serde(default = "default_charset")]
    pub charset: String,
}

fn default_port() -> u16 {
    3306
}

fn default_min_size() -> usize {
    1
}

fn default_max_size() -> usize {
    10
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

/// The schema of one database entry.
pub fn database_schema() -> Schema {
    let mark = Union::new([Shape::string(), Shape::Null]).with_fallback(0);

    Schema::new("Database")
        .with_field(Field::new("host", Shape::string()))
        .with_field(Field::new("port", Shape::integer()).with_default(i64::from(default_port())))
        .with_field(Field::new("user", Shape::string()))
        .with_field(Field::new("password", Shape::string()))
        .with_field(Field::new("db", Shape::string()))
        .with_field(Field::new("mark", Shape::OneOf(mark)).with_default(Json::Null))
        .with_field(Field::new("default", Shape::boolean()).with_default(false))
        .with_field(Field::new("min_size", Shape::integer()).with_default(1))
        .with_field(Field::new("max_size", Shape::integer()).with_default(10))
        .with_field(Field::new("charset", Shape::string()).with_default(default_charset()))
}

impl DbConfig {
    /// Resolve one entry against [`database_schema`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] for schema mismatches,
    /// [`DbError::Decode`] for out-of-range numbers, and
    /// [`DbError::InvalidSize`] when `min_size > max_size`.
    pub fn from_map(entry: &ConfigMap) -> Result<Self, DbError> {
        let resolved = Resolver::with_args(Vec::<String>::new())
            .resolve_schema(&entry.dump(), &database_schema())?;

        let mut plain = resolved.dump();
        if let Json::Object(fields) = &mut plain {
            if fields.get("mark").map_or(true, Json::is_null) {
                let db = fields.get("db").cloned().unwrap_or(Json::Null);
                fields.insert("mark".to_string(), db);
            }
        }

        let config: DbConfig = serde_json::from_value(plain)?;
        if config.min_size > config.max_size {
            return Err(DbError::InvalidSize {
                mark: config.mark,
                min: config.min_size,
                max: config.max_size,
            });
        }
        Ok(config)
    }

    /// Read the entries of a database section.
    ///
    /// A mapping is a single entry; a list holds one mapping per entry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidSection`] or [`DbError::InvalidEntry`] for
    /// values of the wrong kind. Schema errors name the offending list index.
    pub fn entries(section: &Value) -> Result<Vec<Self>, DbError> {
        match section {
            Value::Map(entry) => Ok(vec![Self::from_map(entry)?]),
            Value::List(list) => list
                .to_vec()
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::Map(entry) => Self::from_map(&entry).map_err(|err| match err {
                        DbError::Config(err) => DbError::Config(err.within_field(&index.to_string())),
                        other => other,
                    }),
                    other => Err(DbError::InvalidEntry {
                        index,
                        found: other.kind(),
                    }),
                })
                .collect(),
            other => Err(DbError::InvalidSection {
                found: other.kind(),
            }),
        }
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("db", &self.db)
            .field("mark", &self.mark)
            .field("default", &self.default)
            .field("min_size", &self.min_size)
            .field("max_size", &self.max_size)
            .field("charset", &self.charset)
            .finish()
    }
}
