//! Convenient imports for applications.
//!
//! ```rust,ignore
//! use semitexa_core::prelude::*;
//! ```

pub use crate::config::DbConfig;
pub use crate::db::{DatabaseAdapter, MySqlAdapter, ServerCapabilities, TransactionManager};
pub use crate::error::{Error, Result};
pub use crate::hydrate::{dehydrate, hydrate, hydrate_all};
pub use crate::query::{FilterValue, Operator, PageResult, Query};
pub use crate::relations::{load_relations, load_relations_one, RelationLoad};
pub use crate::repo::{delete_by_pk, find_by_pk, insert, sync_pivot, update, Repository};
pub use crate::resource::{IntoDomain, Resource, ResourceMetadata, Seeder, TableBlueprint};
pub use crate::schema::{
    compare, DeclaredSchema, ExecutionPlan, SchemaCollector, SchemaDiff, SchemaReader, SyncEngine,
    SyncOptions,
};
pub use crate::upsert::{upsert, SeedRunner, UpsertReport};
pub use crate::value::{ColumnValue, QueryResult, Row, SqlValue};

#[cfg(feature = "macros")]
pub use semitexa_macros::Resource;
