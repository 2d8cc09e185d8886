//! Database connection pools configured through `tessera-config`.
//!
//! A configuration section describes one database or a list of them:
//!
//! ```yaml
//! database:
//!   - host: 10.0.0.5
//!     user: app
//!     password: secret
//!     db: orders
//!     default: true
//!   - host: 10.0.0.7
//!     user: app
//!     password: secret
//!     db: reports
//! ```
//!
//! Each entry is resolved against [`database_schema`] and turned into a pool
//! by a driver-specific [`PoolFactory`]. The resulting [`PoolRegistry`] hands
//! pools out by mark, and checks out [`PooledConnection`]s from any pool
//! implementing [`DbPool`].

#![warn(missing_docs)]

mod config;
mod error;
mod pool;
mod registry;

pub use config::{database_schema, DbConfig};
pub use error::{BoxError, DbError};
pub use pool::{DbPool, PooledConnection};
pub use registry::{PoolFactory, PoolRegistry};
