//! Keyed registry of database connection pools.
//!
//! Pools are created through a [`PoolFactory`] so the registry stays
//! independent of any particular database driver. Connections are checked
//! out by mark with [`PoolRegistry::acquire`].

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tessera_config::ConfigMap;

use crate::error::BoxError;
use crate::pool::{DbPool, PooledConnection};
use crate::{DbConfig, DbError};

/// Creates one pool from its configuration.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use tessera_db::{BoxError, DbConfig, DbPool, PoolFactory};
///
/// /// Hands out the server address as a stand-in connection.
/// struct AddressPool(String);
///
/// #[async_trait]
/// impl DbPool for AddressPool {
///     type Connection = String;
///
///     async fn acquire(&self) -> Result<String, BoxError> {
///         Ok(self.0.clone())
///     }
///
///     async fn release(&self, _conn: String) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// struct AddressFactory;
///
/// #[async_trait]
/// impl PoolFactory for AddressFactory {
///     type Pool = AddressPool;
///
///     async fn create(&self, config: &DbConfig) -> Result<AddressPool, BoxError> {
///         Ok(AddressPool(config.address()))
///     }
/// }
/// ```
#[async_trait]
pub trait PoolFactory: Send + Sync {
    /// The pool type handed out by the registry.
    type Pool: DbPool;

    /// Open a pool for `config`.
    async fn create(&self, config: &DbConfig) -> Result<Self::Pool, BoxError>;
}

struct Entry<P> {
    config: DbConfig,
    pool: Arc<P>,
}

/// Pools keyed by mark, with an optional default.
pub struct PoolRegistry<P> {
    pools: IndexMap<String, Entry<P>>,
    default_mark: Option<String>,
}

impl<P: DbPool> PoolRegistry<P> {
    /// Validate `entries` and open one pool per entry, in order.
    ///
    /// The entry flagged `default` is the default pool; a lone entry is the
    /// default even when not flagged.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Empty`], [`DbError::DuplicateMark`] or
    /// [`DbError::MultipleDefaults`] before any pool is opened, and
    /// [`DbError::Factory`] if the factory fails.
    pub async fn build<F>(entries: Vec<DbConfig>, factory: &F) -> Result<Self, DbError>
    where
        F: PoolFactory<Pool = P> + ?Sized,
    {
        let default_mark = validate(&entries)?;

        let mut pools = IndexMap::with_capacity(entries.len());
        for config in entries {
            let pool = factory
                .create(&config)
                .await
                .map_err(|source| DbError::factory(&config.mark, source))?;
            tracing::info!(
                mark = %config.mark,
                address = %config.address(),
                db = %config.db,
                max_size = config.max_size,
                "Database pool created"
            );
            pools.insert(
                config.mark.clone(),
                Entry {
                    config,
                    pool: Arc::new(pool),
                },
            );
        }

        Ok(Self {
            pools,
            default_mark,
        })
    }

    /// Build from the section stored under `key` in a loaded configuration.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use tessera_db::{PoolFactory, PoolRegistry};
    /// # async fn run<F: PoolFactory>(factory: F) -> Result<(), Box<dyn std::error::Error>> {
    /// let config = tessera_config::read_config("app")?;
    /// let registry = PoolRegistry::from_config(&config, "database", &factory).await?;
    ///
    /// let conn = registry.acquire_default().await?;
    /// // ... use the driver connection through `*conn` ...
    /// conn.release().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn from_config<F>(root: &ConfigMap, key: &str, factory: &F) -> Result<Self, DbError>
    where
        F: PoolFactory<Pool = P> + ?Sized,
    {
        let section = root.get(key).ok_or_else(|| DbError::MissingSection {
            key: key.to_string(),
        })?;
        let entries = DbConfig::entries(&section).map_err(|err| match err {
            DbError::Config(err) => DbError::Config(err.within_field(key)),
            other => other,
        })?;
        Self::build(entries, factory).await
    }

    /// The pool registered under `mark`.
    pub fn get(&self, mark: &str) -> Option<Arc<P>> {
        self.pools.get(mark).map(|entry| Arc::clone(&entry.pool))
    }

    /// Check out a connection from the pool under `mark`.
    ///
    /// The connection is pinged before it is handed out.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownMark`] for unregistered marks and
    /// [`DbError::Acquire`] if the pool cannot supply a live connection.
    pub async fn acquire(&self, mark: &str) -> Result<PooledConnection<P>, DbError> {
        let pool = self.get(mark).ok_or_else(|| DbError::UnknownMark {
            mark: mark.to_string(),
        })?;
        PooledConnection::checkout(mark, pool).await
    }

    /// Check out a connection from the default pool.
    pub async fn acquire_default(&self) -> Result<PooledConnection<P>, DbError> {
        let mark = self.default_mark.as_deref().ok_or(DbError::NoDefault)?;
        self.acquire(mark).await
    }

    /// The configuration the pool under `mark` was built from.
    pub fn config(&self, mark: &str) -> Option<&DbConfig> {
        self.pools.get(mark).map(|entry| &entry.config)
    }

    /// The default pool, if one is designated.
    pub fn default_pool(&self) -> Option<Arc<P>> {
        self.default_mark.as_deref().and_then(|mark| self.get(mark))
    }

    /// Mark of the default pool.
    pub fn default_mark(&self) -> Option<&str> {
        self.default_mark.as_deref()
    }

    /// Registered marks in configuration order.
    pub fn marks(&self) -> Vec<&str> {
        self.pools.keys().map(String::as_str).collect()
    }

    /// Number of pools.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns `true` if no pools are registered.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl<P> std::fmt::Debug for PoolRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("marks", &self.pools.keys().collect::<Vec<_>>())
            .field("default_mark", &self.default_mark)
            .finish()
    }
}

/// Check marks and defaults; returns the default mark.
fn validate(entries: &[DbConfig]) -> Result<Option<String>, DbError> {
    if entries.is_empty() {
        return Err(DbError::Empty);
    }

    let mut seen: Vec<&str> = Vec::with_capacity(entries.len());
    let mut default: Option<&str> = None;
    for config in entries {
        if seen.contains(&config.mark.as_str()) {
            return Err(DbError::duplicate_mark(&config.mark));
        }
        seen.push(&config.mark);

        if config.default {
            if let Some(first) = default {
                return Err(DbError::MultipleDefaults {
                    first: first.to_string(),
                    second: config.mark.clone(),
                });
            }
            default = Some(&config.mark);
        }
    }

    Ok(match (default, entries) {
        (Some(mark), _) => Some(mark.to_string()),
        (None, [only]) => Some(only.mark.clone()),
        (None, _) => None,
    })
}
