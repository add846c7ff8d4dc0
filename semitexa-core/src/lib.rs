//! Semitexa: attribute-driven ORM for MySQL 8.0+ with a schema-sync
//! engine.
//!
//! # Overview
//!
//! The database schema is declared entirely by annotations on resource
//! structs. The runtime reconciles the live database to match those
//! declarations through safety-gated DDL, and executes queries by
//! hydrating rows back into the same structs with batched relation
//! loading.
//!
//! ```rust,ignore
//! use semitexa_core::prelude::*;
//!
//! #[derive(Resource, Debug, Clone, Default)]
//! #[resource(table = "users")]
//! struct User {
//!     #[column(type = "int")]
//!     #[primary_key]
//!     id: Option<i64>,
//!
//!     #[column(type = "varchar", length = 255)]
//!     #[filterable]
//!     email: String,
//!
//!     #[has_many(foreign_key = "user_id")]
//!     orders: Vec<Order>,
//! }
//! ```
//!
//! Declare, then reconcile:
//!
//! ```rust,ignore
//! let config = DbConfig::from_env()?;
//! let db = MySqlAdapter::new(&config);
//! let declared = SchemaCollector::new().register::<User>().collect().into_result()?;
//! let live = SchemaReader::new(&db, config.database.clone())
//!     .with_ignored_tables(config.ignore_tables.clone())
//!     .read()
//!     .await?;
//! let diff = compare(&declared, &live, &config.ignore_tables);
//! let plan = SyncEngine::build_plan(&declared, &diff);
//! ```
//!
//! # Architecture
//!
//! - [`schema`]: declared model, collector, live-state reader,
//!   comparator, DDL renderer and sync engine
//! - [`db`]: connection pool, adapter, transaction manager
//! - [`resource`]: blueprints and the per-type metadata cache
//! - [`hydrate`] / [`relations`]: row↔resource conversion and batched
//!   relation loading
//! - [`query`] / [`repo`] / [`upsert`]: read and write paths
//!
//! Mutable process-wide state is limited to the per-type metadata caches,
//! each behind a one-shot initializer, and the deprecation sentinel
//! string; both are read-only after first write.

pub mod config;
pub mod db;
pub mod error;
pub mod hydrate;
pub mod query;
pub mod relations;
pub mod repo;
pub mod resource;
pub mod schema;
pub mod upsert;
pub mod value;

pub mod prelude;

#[cfg(test)]
pub mod testing;

pub use error::{Error, Result};

/// Boxed future alias used by generated relation loaders.
pub use futures::future::BoxFuture;

// The derive macro, re-exported so applications depend on one crate.
#[cfg(feature = "macros")]
pub use semitexa_macros::Resource;
