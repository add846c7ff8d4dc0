//! Live database state, as reported by INFORMATION_SCHEMA.
//!
//! These mirrors exist only for the duration of one comparator pass and
//! are never shared across flows.

use indexmap::IndexMap;

use super::DEPRECATION_SENTINEL;

/// One live column.
#[derive(Debug, Clone, Default)]
pub struct DbColumnState {
    pub name: String,
    /// Full `COLUMN_TYPE`, e.g. `varchar(255)` or `int unsigned`.
    pub column_type: String,
    /// Bare `DATA_TYPE`, e.g. `varchar`.
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub is_primary: bool,
    pub is_auto_increment: bool,
    pub char_max_length: Option<u64>,
    pub numeric_precision: Option<u64>,
    pub numeric_scale: Option<u64>,
    pub comment: String,
}

impl DbColumnState {
    /// Whether the column already carries the two-phase drop marker.
    pub fn is_deprecated(&self) -> bool {
        self.comment == DEPRECATION_SENTINEL
    }
}

/// One live index (the PRIMARY index is never materialized here).
#[derive(Debug, Clone)]
pub struct DbIndexState {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// One live foreign key constraint.
#[derive(Debug, Clone)]
pub struct DbForeignKeyState {
    pub name: String,
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub delete_rule: String,
    pub update_rule: String,
}

/// One live table.
#[derive(Debug, Clone, Default)]
pub struct DbTableState {
    pub name: String,
    /// Carries the deprecation sentinel during two-phase table drops.
    pub comment: String,
    pub columns: IndexMap<String, DbColumnState>,
    pub indexes: Vec<DbIndexState>,
    pub foreign_keys: Vec<DbForeignKeyState>,
}

impl DbTableState {
    pub fn is_deprecated(&self) -> bool {
        self.comment == DEPRECATION_SENTINEL
    }

    pub fn index(&self, name: &str) -> Option<&DbIndexState> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn foreign_key(&self, name: &str) -> Option<&DbForeignKeyState> {
        self.foreign_keys.iter().find(|f| f.name == name)
    }
}

/// The whole live schema for one database.
#[derive(Debug, Clone, Default)]
pub struct DbSchemaState {
    pub tables: IndexMap<String, DbTableState>,
}

impl DbSchemaState {
    pub fn table(&self, name: &str) -> Option<&DbTableState> {
        self.tables.get(name)
    }

    pub fn column_count(&self) -> usize {
        self.tables.values().map(|t| t.columns.len()).sum()
    }
}
