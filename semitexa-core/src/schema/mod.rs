//! Declared-schema model.
//!
//! Tables, columns, indexes, foreign keys and relations as derived from
//! resource annotations. Instances are built once per process (or per
//! `sync` invocation) by the collector and are immutable afterwards.

pub mod collector;
pub mod comparator;
pub mod ddl;
pub mod reader;
pub mod state;
pub mod sync;

use indexmap::IndexMap;

use crate::value::{SourceKind, SqlValue};

pub use collector::{SchemaCollection, SchemaCollector};
pub use comparator::{compare, SchemaDiff};
pub use reader::SchemaReader;
pub use state::{DbColumnState, DbForeignKeyState, DbIndexState, DbSchemaState, DbTableState};
pub use sync::{DdlKind, DdlOperation, ExecutionPlan, SyncEngine, SyncOptions, SyncReport};

/// The exact comment string that marks a column or table as pending drop.
pub const DEPRECATION_SENTINEL: &str = "SEMITEXA_DEPRECATED";

/// Closed set of MySQL physical column types the ORM understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MySqlType {
    Varchar,
    Char,
    Text,
    MediumText,
    LongText,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    Boolean,
    DateTime,
    Timestamp,
    Date,
    Time,
    Year,
    Json,
    Blob,
    Binary,
}

impl MySqlType {
    /// Annotation spelling → type. Accepts the lowercase names used in
    /// `#[column(type = "...")]`.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "varchar" => Self::Varchar,
            "char" => Self::Char,
            "text" => Self::Text,
            "mediumtext" => Self::MediumText,
            "longtext" => Self::LongText,
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "int" => Self::Int,
            "bigint" => Self::BigInt,
            "float" => Self::Float,
            "double" => Self::Double,
            "decimal" => Self::Decimal,
            "boolean" | "bool" => Self::Boolean,
            "datetime" => Self::DateTime,
            "timestamp" => Self::Timestamp,
            "date" => Self::Date,
            "time" => Self::Time,
            "year" => Self::Year,
            "json" => Self::Json,
            "blob" => Self::Blob,
            "binary" => Self::Binary,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Varchar => "varchar",
            Self::Char => "char",
            Self::Text => "text",
            Self::MediumText => "mediumtext",
            Self::LongText => "longtext",
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::Time => "time",
            Self::Year => "year",
            Self::Json => "json",
            Self::Blob => "blob",
            Self::Binary => "binary",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::TinyInt | Self::SmallInt | Self::Int | Self::BigInt | Self::Year
        )
    }

    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            Self::Varchar | Self::Char | Self::Text | Self::MediumText | Self::LongText
        )
    }
}

/// Referential action on delete/update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    Restrict,
    Cascade,
    SetNull,
    NoAction,
}

impl ForeignKeyAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::NoAction => "NO ACTION",
        }
    }

    /// Parse the spelling INFORMATION_SCHEMA reports.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_uppercase().as_str() {
            "RESTRICT" => Self::Restrict,
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "NO ACTION" => Self::NoAction,
            _ => return None,
        })
    }
}

/// How primary key values come to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PkStrategy {
    #[default]
    Auto,
    Uuid,
    Manual,
}

impl PkStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "auto" => Self::Auto,
            "uuid" => Self::Uuid,
            "manual" => Self::Manual,
            _ => return None,
        })
    }
}

/// One declared column, immutable once collected.
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    /// Database column name.
    pub name: String,
    /// Source-side field name; may differ from `name`.
    pub property_name: String,
    pub sql_type: MySqlType,
    /// Tag describing the declared in-memory type.
    pub source_type: String,
    pub source_kind: SourceKind,
    pub nullable: bool,
    pub length: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    pub default: Option<SqlValue>,
    pub is_primary_key: bool,
    pub pk_strategy: PkStrategy,
    pub is_deprecated: bool,
}

impl ColumnDefinition {
    /// Whether this column carries `AUTO_INCREMENT` in DDL.
    pub fn is_auto_increment(&self) -> bool {
        self.is_primary_key && self.pk_strategy == PkStrategy::Auto && self.sql_type.is_integer()
    }
}

/// One declared index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub columns: Vec<String>,
    pub unique: bool,
    pub name: Option<String>,
}

impl IndexDefinition {
    /// Explicit name, or the generated `idx_`/`uniq_` form.
    pub fn resolved_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => {
                let prefix = if self.unique { "uniq" } else { "idx" };
                format!("{}_{}_{}", prefix, table, self.columns.join("_"))
            }
        }
    }
}

/// One declared foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDefinition {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKeyDefinition {
    /// Deterministic constraint name assumed unique by the comparator.
    pub fn constraint_name(&self) -> String {
        format!("fk_{}_{}", self.table, self.column)
    }
}

/// Relation flavor declared on a resource field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasMany,
    OneToOne,
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelongsTo => "belongs_to",
            Self::HasMany => "has_many",
            Self::OneToOne => "one_to_one",
            Self::ManyToMany => "many_to_many",
        }
    }
}

/// Resolved relation metadata attached to a table.
#[derive(Debug, Clone)]
pub struct RelationMeta {
    pub property: String,
    pub kind: RelationKind,
    pub target_table: String,
    pub target_pk: String,
    pub foreign_key: String,
    pub pivot_table: Option<String>,
    pub related_key: Option<String>,
    pub on_delete: Option<ForeignKeyAction>,
    pub on_update: Option<ForeignKeyAction>,
}

/// One declared table with everything it owns.
#[derive(Debug, Clone, Default)]
pub struct TableDefinition {
    pub name: String,
    /// Ordered by declaration; the order drives CREATE TABLE column order.
    pub columns: IndexMap<String, ColumnDefinition>,
    pub indexes: Vec<IndexDefinition>,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
    pub relations: IndexMap<String, RelationMeta>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// The single primary-key column, if one is declared.
    pub fn primary_key(&self) -> Option<&ColumnDefinition> {
        self.columns.values().find(|c| c.is_primary_key)
    }

    /// Tables this one points at through `BelongsTo` relations; drives the
    /// topological CREATE order.
    pub fn belongs_to_targets(&self) -> Vec<&str> {
        self.relations
            .values()
            .filter(|r| r.kind == RelationKind::BelongsTo)
            .map(|r| r.target_table.as_str())
            .collect()
    }
}

/// The whole declared schema, keyed by table name in registration order.
#[derive(Debug, Clone, Default)]
pub struct DeclaredSchema {
    pub tables: IndexMap<String, TableDefinition>,
}

impl DeclaredSchema {
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(name)
    }

    pub fn column_count(&self) -> usize {
        self.tables.values().map(|t| t.columns.len()).sum()
    }

    pub fn index_count(&self) -> usize {
        self.tables.values().map(|t| t.indexes.len()).sum()
    }
}

/// Identifier check applied at collection time; everything that reaches the
/// DDL renderer has already passed it.
pub fn valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
