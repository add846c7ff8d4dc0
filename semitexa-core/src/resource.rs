//! Resource declarations and the per-type metadata cache.
//!
//! The derive macro turns struct annotations into a [`TableBlueprint`]
//! behind a one-shot initializer; attribute reading never repeats per
//! query. The collector consumes blueprints; the runtime consumes the
//! leaner [`ResourceMetadata`] built from them.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::schema::{ForeignKeyAction, MySqlType, PkStrategy, RelationKind};
use crate::value::{SourceKind, SqlValue};

/// Tenant scoping flavor declared on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStrategy {
    /// All tenants share the table; a `tenant_id` column partitions rows.
    SameStorage,
}

/// One declared column, exactly as annotated (pre-validation).
#[derive(Debug, Clone)]
pub struct FieldBlueprint {
    pub property: String,
    /// Database column name; defaults to the property name.
    pub column: String,
    pub sql_type: MySqlType,
    pub source_type: String,
    pub source_kind: SourceKind,
    pub nullable: bool,
    pub length: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    pub default: Option<SqlValue>,
    pub primary_key: Option<PkStrategy>,
    /// Filter name when the field is filterable.
    pub filterable: Option<String>,
    pub deprecated: bool,
}

/// How a relation blueprint points at its target resource.
#[derive(Clone)]
pub enum RelationTarget {
    /// Lazy handle emitted by the derive macro. Never invoked while the
    /// owning blueprint is still initializing, which keeps mutually
    /// related types from deadlocking their one-shot initializers.
    Typed(fn() -> &'static TableBlueprint),
    /// Direct naming, used by hand-built blueprints.
    Named { table: String, pk: String },
}

impl std::fmt::Debug for RelationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationTarget::Typed(_) => f.write_str("RelationTarget::Typed(..)"),
            RelationTarget::Named { table, pk } => {
                write!(f, "RelationTarget::Named({table}.{pk})")
            }
        }
    }
}

impl RelationTarget {
    /// Target table name.
    pub fn table(&self) -> String {
        match self {
            RelationTarget::Typed(f) => f().table.clone(),
            RelationTarget::Named { table, .. } => table.clone(),
        }
    }

    /// Target primary-key column; falls back to `id` when the target
    /// declares none (the pivot-only case).
    pub fn pk_column(&self) -> String {
        match self {
            RelationTarget::Typed(f) => f()
                .fields
                .iter()
                .find(|c| c.primary_key.is_some())
                .map(|c| c.column.clone())
                .unwrap_or_else(|| "id".to_string()),
            RelationTarget::Named { pk, .. } => pk.clone(),
        }
    }
}

/// One declared relation, exactly as annotated.
#[derive(Debug, Clone)]
pub struct RelationBlueprint {
    pub property: String,
    pub kind: RelationKind,
    pub target: RelationTarget,
    pub foreign_key: String,
    pub pivot_table: Option<String>,
    pub related_key: Option<String>,
    pub on_delete: Option<ForeignKeyAction>,
    pub on_update: Option<ForeignKeyAction>,
}

/// One class-level index annotation.
#[derive(Debug, Clone)]
pub struct IndexBlueprint {
    pub columns: Vec<String>,
    pub unique: bool,
    pub name: Option<String>,
}

/// Everything a resource type declares, before validation.
#[derive(Debug, Clone)]
pub struct TableBlueprint {
    pub table: String,
    /// Domain type this resource maps to, when declared.
    pub map_to: Option<String>,
    pub fields: Vec<FieldBlueprint>,
    pub relations: Vec<RelationBlueprint>,
    pub indexes: Vec<IndexBlueprint>,
    /// Virtual fields: computed in queries, no column, no storage.
    pub aggregates: Vec<String>,
    pub tenant: Option<TenantStrategy>,
}

impl TableBlueprint {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            map_to: None,
            fields: Vec::new(),
            relations: Vec::new(),
            indexes: Vec::new(),
            aggregates: Vec::new(),
            tenant: None,
        }
    }
}

/// Column facts the hydrator needs, keyed off [`ResourceMetadata`].
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub property: String,
    pub sql_type: MySqlType,
    pub nullable: bool,
}

/// Relation facts the loader and query builder need.
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    pub property: String,
    pub kind: RelationKind,
    pub target_table: String,
    pub target_pk: String,
    pub foreign_key: String,
    pub pivot_table: Option<String>,
    pub related_key: Option<String>,
}

/// Process-wide, per-type cached runtime metadata. Built lazily behind the
/// derive's one-shot initializer and never invalidated.
#[derive(Debug, Clone)]
pub struct ResourceMetadata {
    pub table: String,
    pub pk_column: String,
    pub pk_property: String,
    pub pk_strategy: PkStrategy,
    /// Declared column order, by database name.
    pub column_order: Vec<String>,
    /// Database column name → column facts.
    pub columns: HashMap<String, ColumnMeta>,
    /// Filter name → database column, for filterable fields only.
    pub filterable: HashMap<String, String>,
    /// Virtual field names, kept so lookups can tell "not filterable"
    /// from "not stored at all".
    pub aggregates: Vec<String>,
    pub relations: Vec<RelationDescriptor>,
}

impl ResourceMetadata {
    /// Derive runtime metadata from a blueprint. Looks only at the target
    /// blueprints of relations, never at target *metadata*, so mutually
    /// related types initialize independently.
    pub fn from_blueprint(bp: &TableBlueprint) -> Self {
        let pk = bp.fields.iter().find(|f| f.primary_key.is_some());
        let mut columns = HashMap::new();
        let mut column_order = Vec::new();
        let mut filterable = HashMap::new();

        for field in &bp.fields {
            if columns.contains_key(&field.column) {
                continue;
            }
            column_order.push(field.column.clone());
            columns.insert(
                field.column.clone(),
                ColumnMeta {
                    property: field.property.clone(),
                    sql_type: field.sql_type,
                    nullable: field.nullable,
                },
            );
            if let Some(name) = &field.filterable {
                filterable.insert(name.clone(), field.column.clone());
            }
        }

        let relations = bp
            .relations
            .iter()
            .map(|rel| RelationDescriptor {
                property: rel.property.clone(),
                kind: rel.kind,
                target_table: rel.target.table(),
                target_pk: rel.target.pk_column(),
                foreign_key: rel.foreign_key.clone(),
                pivot_table: rel.pivot_table.clone(),
                related_key: rel.related_key.clone(),
            })
            .collect();

        Self {
            table: bp.table.clone(),
            pk_column: pk.map(|f| f.column.clone()).unwrap_or_else(|| "id".into()),
            pk_property: pk.map(|f| f.property.clone()).unwrap_or_else(|| "id".into()),
            pk_strategy: pk.and_then(|f| f.primary_key).unwrap_or_default(),
            column_order,
            columns,
            filterable,
            aggregates: bp.aggregates.clone(),
            relations,
        }
    }

    pub fn relation(&self, property: &str) -> Result<&RelationDescriptor> {
        self.relations
            .iter()
            .find(|r| r.property == property)
            .ok_or_else(|| Error::UnknownRelation(property.to_string()))
    }

    pub fn filter_column(&self, name: &str) -> Result<&str> {
        match self.filterable.get(name) {
            Some(column) => Ok(column),
            None if self.aggregates.iter().any(|a| a == name) => Err(Error::NotFilterable(
                format!("{name} is a virtual aggregate field"),
            )),
            None => Err(Error::NotFilterable(name.to_string())),
        }
    }

    /// Non-PK columns, in declared order. The smart upsert's update list.
    pub fn non_pk_columns(&self) -> Vec<&str> {
        self.column_order
            .iter()
            .filter(|c| **c != self.pk_column)
            .map(String::as_str)
            .collect()
    }
}

/// A value type whose fields carry column annotations.
///
/// Implemented by `#[derive(Resource)]`; the blueprint and metadata
/// accessors are backed by `OnceLock` statics in the generated code.
pub trait Resource: Sized + Send + Sync + 'static {
    /// Database table backing this resource.
    fn table_name() -> &'static str;

    /// Raw declared annotations, built once per process.
    fn blueprint() -> &'static TableBlueprint;

    /// Runtime metadata, built once per process.
    fn metadata() -> &'static ResourceMetadata;

    /// Set one field from a database value, cast to the declared in-memory
    /// type. Unknown columns are ignored (silent projection).
    fn apply_column(&mut self, column: &str, value: SqlValue) -> Result<()>;

    /// Current field values by database column name, in declared order.
    fn collect_columns(&self) -> Vec<(&'static str, SqlValue)>;

    /// Current primary key value, `Null` when unset.
    fn pk_value(&self) -> SqlValue {
        let meta = Self::metadata();
        self.collect_columns()
            .into_iter()
            .find(|(col, _)| *col == meta.pk_column)
            .map(|(_, v)| v)
            .unwrap_or(SqlValue::Null)
    }
}

/// Conversion into a domain object, required by `map_to` declarations.
pub trait IntoDomain {
    type Domain;

    fn to_domain(&self) -> Self::Domain;
}

/// Exposes a batch of default rows for the seed runner.
pub trait Seeder: Resource {
    fn defaults() -> Vec<Self>;
}
