//! Live, schema-directed configuration objects.
//!
//! This crate turns a YAML or JSON document into a mutable object graph:
//! - [`ConfigMap`] and [`ConfigList`] containers that report every mutation
//!   to their parent
//! - Optional validation and coercion against a declared [`Schema`], with
//!   defaults filled in and precise error paths
//! - Command-line overrides for selected fields ([`CommandOverride`])
//! - Optional write-back ([`sync`]) that rewrites the source file whenever
//!   any node in the tree changes
//!
//! # Example
//!
//! ```no_run
//! use tessera_config::{CommandOverride, ConfigLoader, Field, Primitive, Schema, Shape};
//!
//! # fn main() -> Result<(), tessera_config::ConfigError> {
//! let server = Schema::new("Server")
//!     .with_field(Field::new("host", Shape::string()).with_default("127.0.0.1"))
//!     .with_field(Field::new(
//!         "port",
//!         CommandOverride::new("port")
//!             .with_prefix("--")
//!             .with_kind(Primitive::Integer)
//!             .with_default(8080),
//!     ));
//!
//! let schema = Schema::new("Config")
//!     .with_field(Field::new("name", Shape::string()))
//!     .with_field(Field::new("server", Shape::nested(server.clone())).with_default(server))
//!     .with_field(Field::new("timeout", Shape::integer()).with_default(60));
//!
//! // Reads config/app.yaml (or config/app.json) and keeps it in sync.
//! let config = ConfigLoader::new()
//!     .with_schema(schema)
//!     .with_sync(true)
//!     .load("app")?;
//!
//! config.set_path("server.host", "0.0.0.0")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Document Format
//!
//! ```yaml
//! name: billing
//! timeout: 3600 * 8   # integer fields accept products
//! server:
//!   port: 9000
//! ```
//!
//! Keys not described by the schema are kept, untyped.

#![warn(missing_docs)]

mod arg;
mod error;
mod loader;
mod node;
mod resolver;
mod schema;
mod sync;

pub use arg::{CommandOverride, OverrideKind};
pub use error::{ConfigError, SchemaError};
pub use loader::{read_config, ConfigLoader};
pub use node::{materialize, ConfigList, ConfigMap, Propagate, Value};
pub use resolver::Resolver;
pub use schema::{DefaultValue, Field, Primitive, Schema, Shape, Union};
pub use sync::{sync, unsync, Format, WriteBack};
