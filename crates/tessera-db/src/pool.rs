//! Connection checkout.
//!
//! A [`DbPool`] is the driver-side pool; [`PooledConnection`] is a checked
//! out connection that must be handed back with
//! [`release`](PooledConnection::release).

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::DbError;

/// A driver connection pool.
#[async_trait]
pub trait DbPool: Send + Sync + 'static {
    /// A connection checked out of the pool.
    type Connection: Send + 'static;

    /// Check out a connection.
    async fn acquire(&self) -> Result<Self::Connection, BoxError>;

    /// Return a connection to the pool.
    async fn release(&self, conn: Self::Connection) -> Result<(), BoxError>;

    /// Verify a freshly acquired connection, reconnecting if the driver can.
    async fn ping(&self, _conn: &mut Self::Connection) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A connection checked out of a registered pool.
///
/// Dereferences to the driver connection.
pub struct PooledConnection<P: DbPool> {
    mark: String,
    pool: Arc<P>,
    conn: P::Connection,
}

impl<P: DbPool> PooledConnection<P> {
    /// Acquire from `pool` and ping. A connection that fails its ping is
    /// released before the error is returned.
    pub(crate) async fn checkout(mark: &str, pool: Arc<P>) -> Result<Self, DbError> {
        let mut conn = pool.acquire().await.map_err(|source| DbError::Acquire {
            mark: mark.to_string(),
            source,
        })?;

        if let Err(source) = pool.ping(&mut conn).await {
            if let Err(err) = pool.release(conn).await {
                tracing::warn!(mark, error = %err, "Failed to release connection after ping failure");
            }
            return Err(DbError::Acquire {
                mark: mark.to_string(),
                source,
            });
        }

        tracing::debug!(mark, "Connection acquired");
        Ok(Self {
            mark: mark.to_string(),
            pool,
            conn,
        })
    }

    /// Mark of the pool this connection belongs to.
    pub fn mark(&self) -> &str {
        &self.mark
    }

    /// Hand the connection back to its pool.
    pub async fn release(self) -> Result<(), DbError> {
        let Self { mark, pool, conn } = self;
        pool.release(conn).await.map_err(|source| DbError::Release {
            mark: mark.clone(),
            source,
        })?;
        tracing::debug!(mark = %mark, "Connection released");
        Ok(())
    }
}

impl<P: DbPool> Deref for PooledConnection<P> {
    type Target = P::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<P: DbPool> DerefMut for PooledConnection<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl<P: DbPool> fmt::Debug for PooledConnection<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("mark", &self.mark)
            .finish_non_exhaustive()
    }
}
