//! Schema comparator.
//!
//! Pure functions from (declared schema, live state) to a [`SchemaDiff`].
//! The comparator never mutates the database; classification of safe vs
//! destructive changes happens here so the engine only has to gate on it.

use std::collections::HashSet;

use crate::value::SqlValue;

use super::state::{DbColumnState, DbSchemaState, DbTableState};
use super::{ColumnDefinition, DeclaredSchema, ForeignKeyDefinition, IndexDefinition, MySqlType};

/// One column whose live definition drifted from the declaration.
#[derive(Debug, Clone)]
pub struct AlterColumn {
    pub table: String,
    pub column: String,
    /// Human-readable descriptions of every detected difference.
    pub changes: Vec<String>,
    /// True when any type change is not a pure widening.
    pub destructive: bool,
}

/// Accumulated difference between declared schema and live state.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    pub create_tables: Vec<String>,
    /// Carries the live state so the plan can read the table comment.
    pub drop_tables: Vec<DbTableState>,
    /// `(table, column)` pairs, in declared order.
    pub add_columns: Vec<(String, String)>,
    pub alter_columns: Vec<AlterColumn>,
    /// Carries the live column so a full MODIFY can be reconstructed.
    pub drop_columns: Vec<(String, DbColumnState)>,
    pub add_indexes: Vec<(String, IndexDefinition)>,
    /// `(table, index name)` pairs.
    pub drop_indexes: Vec<(String, String)>,
    pub add_foreign_keys: Vec<ForeignKeyDefinition>,
    /// `(table, constraint name)` pairs.
    pub drop_foreign_keys: Vec<(String, String)>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }

    pub fn operation_count(&self) -> usize {
        self.create_tables.len()
            + self.drop_tables.len()
            + self.add_columns.len()
            + self.alter_columns.len()
            + self.drop_columns.len()
            + self.add_indexes.len()
            + self.drop_indexes.len()
            + self.add_foreign_keys.len()
            + self.drop_foreign_keys.len()
    }
}

/// Diff the declared schema against the live state.
///
/// `ignore_tables` names are invisible on both sides: never created, never
/// dropped, never compared.
pub fn compare(
    declared: &DeclaredSchema,
    live: &DbSchemaState,
    ignore_tables: &HashSet<String>,
) -> SchemaDiff {
    let mut diff = SchemaDiff::default();

    for (name, table) in &declared.tables {
        if ignore_tables.contains(name) {
            continue;
        }
        match live.table(name) {
            None => diff.create_tables.push(name.clone()),
            Some(live_table) => {
                compare_columns(table, live_table, &mut diff);
                compare_indexes(table, live_table, &mut diff);
                compare_foreign_keys(table, live_table, &mut diff);
            }
        }
    }

    for (name, live_table) in &live.tables {
        if ignore_tables.contains(name) || declared.tables.contains_key(name) {
            continue;
        }
        diff.drop_tables.push(live_table.clone());
    }

    diff
}

fn compare_columns(declared: &super::TableDefinition, live: &DbTableState, diff: &mut SchemaDiff) {
    for (name, column) in &declared.columns {
        let Some(live_column) = live.columns.get(name) else {
            diff.add_columns.push((declared.name.clone(), name.clone()));
            continue;
        };

        let mut changes = Vec::new();
        let mut destructive = false;

        let expected = normalize_type(&build_expected(column));
        let actual = normalize_type(&live_column.column_type);
        if expected != actual {
            changes.push(format!("type: {actual} -> {expected}"));
            if !is_widening(&actual, &expected) {
                destructive = true;
            }
        }

        if column.nullable != live_column.is_nullable {
            changes.push(format!(
                "nullable: {} -> {}",
                live_column.is_nullable, column.nullable
            ));
        }

        if column.is_auto_increment() != live_column.is_auto_increment {
            changes.push(format!(
                "auto_increment: {} -> {}",
                live_column.is_auto_increment,
                column.is_auto_increment()
            ));
        }

        let expected_default = normalize_default(column.default.as_ref());
        let actual_default = live_column.default.clone();
        if expected_default != actual_default {
            changes.push(format!(
                "default: {} -> {}",
                actual_default.as_deref().unwrap_or("none"),
                expected_default.as_deref().unwrap_or("none")
            ));
        }

        if !changes.is_empty() {
            diff.alter_columns.push(AlterColumn {
                table: declared.name.clone(),
                column: name.clone(),
                changes,
                destructive,
            });
        }
    }

    for (name, live_column) in &live.columns {
        if !declared.columns.contains_key(name) {
            diff.drop_columns.push((declared.name.clone(), live_column.clone()));
        }
    }
}

fn compare_indexes(declared: &super::TableDefinition, live: &DbTableState, diff: &mut SchemaDiff) {
    let declared_names: HashSet<String> = declared
        .indexes
        .iter()
        .map(|i| i.resolved_name(&declared.name))
        .collect();
    // MySQL backs every FK constraint with an index of the same name; those
    // are owned by the constraint, not by the index diff.
    let fk_backed: HashSet<String> = declared
        .foreign_keys
        .iter()
        .map(|f| f.constraint_name())
        .chain(live.foreign_keys.iter().map(|f| f.name.clone()))
        .collect();

    for index in &declared.indexes {
        let name = index.resolved_name(&declared.name);
        match live.index(&name) {
            None => diff.add_indexes.push((declared.name.clone(), index.clone())),
            Some(live_index) => {
                if live_index.columns != index.columns || live_index.unique != index.unique {
                    diff.drop_indexes.push((declared.name.clone(), name));
                    diff.add_indexes.push((declared.name.clone(), index.clone()));
                }
            }
        }
    }

    for live_index in &live.indexes {
        if declared_names.contains(&live_index.name) || fk_backed.contains(&live_index.name) {
            continue;
        }
        diff.drop_indexes.push((declared.name.clone(), live_index.name.clone()));
    }
}

fn compare_foreign_keys(
    declared: &super::TableDefinition,
    live: &DbTableState,
    diff: &mut SchemaDiff,
) {
    let declared_names: HashSet<String> = declared
        .foreign_keys
        .iter()
        .map(|f| f.constraint_name())
        .collect();

    for fk in &declared.foreign_keys {
        let name = fk.constraint_name();
        match live.foreign_key(&name) {
            None => diff.add_foreign_keys.push(fk.clone()),
            Some(live_fk) => {
                let matches = live_fk.referenced_table == fk.referenced_table
                    && live_fk.referenced_column == fk.referenced_column
                    && live_fk.delete_rule.eq_ignore_ascii_case(fk.on_delete.as_sql())
                    && live_fk.update_rule.eq_ignore_ascii_case(fk.on_update.as_sql());
                if !matches {
                    diff.drop_foreign_keys.push((declared.name.clone(), name));
                    diff.add_foreign_keys.push(fk.clone());
                }
            }
        }
    }

    for live_fk in &live.foreign_keys {
        if !declared_names.contains(&live_fk.name) {
            diff.drop_foreign_keys.push((declared.name.clone(), live_fk.name.clone()));
        }
    }
}

/// The column type string MySQL is expected to report for a declared column.
pub fn build_expected(column: &ColumnDefinition) -> String {
    match column.sql_type {
        MySqlType::Varchar => format!("varchar({})", column.length.unwrap_or(255)),
        MySqlType::Char => format!("char({})", column.length.unwrap_or(255)),
        MySqlType::Text => "text".into(),
        MySqlType::MediumText => "mediumtext".into(),
        MySqlType::LongText => "longtext".into(),
        MySqlType::TinyInt => "tinyint".into(),
        MySqlType::SmallInt => "smallint".into(),
        MySqlType::Int => "int".into(),
        MySqlType::BigInt => "bigint".into(),
        MySqlType::Float => "float".into(),
        MySqlType::Double => "double".into(),
        MySqlType::Decimal => format!(
            "decimal({},{})",
            column.precision.unwrap_or(10),
            column.scale.unwrap_or(0)
        ),
        // MySQL has no real boolean; it reports tinyint(1).
        MySqlType::Boolean => "tinyint(1)".into(),
        MySqlType::DateTime => "datetime".into(),
        MySqlType::Timestamp => "timestamp".into(),
        MySqlType::Date => "date".into(),
        MySqlType::Time => "time".into(),
        MySqlType::Year => "year".into(),
        MySqlType::Json => "json".into(),
        MySqlType::Blob => "blob".into(),
        MySqlType::Binary => format!("binary({})", column.length.unwrap_or(16)),
    }
}

/// Lowercase, trim, and strip display widths from integer types so
/// `int(11)` and `int` compare equal.
pub fn normalize_type(raw: &str) -> String {
    let s = raw.trim().to_ascii_lowercase();
    let (base, rest) = match s.find('(') {
        Some(pos) => {
            let close = s.find(')').unwrap_or(s.len() - 1);
            (&s[..pos], format!("{}{}", &s[..pos], &s[close + 1..]))
        }
        None => (s.as_str(), s.clone()),
    };
    match base {
        "tinyint" | "smallint" | "mediumint" | "int" | "bigint" | "year" => {
            rest.split_whitespace().collect::<Vec<_>>().join(" ")
        }
        _ => s,
    }
}

fn integer_rank(base: &str) -> Option<u8> {
    Some(match base {
        "tinyint" => 0,
        "smallint" => 1,
        "mediumint" => 2,
        "int" => 3,
        "bigint" => 4,
        _ => return None,
    })
}

fn text_rank(base: &str) -> Option<u8> {
    Some(match base {
        "text" => 0,
        "mediumtext" => 1,
        "longtext" => 2,
        _ => return None,
    })
}

fn split_type(s: &str) -> (String, Option<u64>, bool) {
    let unsigned = s.contains("unsigned");
    let s = s.replace("unsigned", "");
    let s = s.trim();
    match s.find('(') {
        Some(pos) => {
            let base = s[..pos].to_string();
            let args = &s[pos + 1..s.find(')').unwrap_or(s.len())];
            let first = args.split(',').next().and_then(|a| a.trim().parse().ok());
            (base, first, unsigned)
        }
        None => (s.to_string(), None, unsigned),
    }
}

/// Whether `old -> new` (both normalized) only ever widens storage.
pub fn is_widening(old: &str, new: &str) -> bool {
    if old == new {
        return true;
    }
    let (old_base, old_len, old_unsigned) = split_type(old);
    let (new_base, new_len, new_unsigned) = split_type(new);

    // varchar(N) -> varchar(M), M >= N
    if old_base == "varchar" && new_base == "varchar" {
        return match (old_len, new_len) {
            (Some(o), Some(n)) => n >= o,
            _ => false,
        };
    }
    // varchar(*) -> any of the TEXT family
    if old_base == "varchar" && text_rank(&new_base).is_some() {
        return true;
    }
    // text -> mediumtext -> longtext
    if let (Some(o), Some(n)) = (text_rank(&old_base), text_rank(&new_base)) {
        return n >= o;
    }
    // char(N) -> char(M), M >= N
    if old_base == "char" && new_base == "char" {
        return match (old_len, new_len) {
            (Some(o), Some(n)) => n >= o,
            _ => false,
        };
    }
    // char(*) -> varchar(*)
    if old_base == "char" && new_base == "varchar" {
        return true;
    }
    // tinyint < smallint < int < bigint, same signedness
    if let (Some(o), Some(n)) = (integer_rank(&old_base), integer_rank(&new_base)) {
        return n >= o && old_unsigned == new_unsigned;
    }
    // float -> double
    if old_base == "float" && new_base == "double" {
        return true;
    }
    false
}

/// The exact string MySQL stores for a declared default. `None` means
/// "no default clause".
pub fn normalize_default(default: Option<&SqlValue>) -> Option<String> {
    match default? {
        SqlValue::Null => None,
        SqlValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        SqlValue::Int(v) => Some(v.to_string()),
        SqlValue::UInt(v) => Some(v.to_string()),
        SqlValue::Float(v) => Some(v.to_string()),
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        SqlValue::DateTime(v) => Some(v.format("%Y-%m-%d %H:%M:%S").to_string()),
        SqlValue::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
        SqlValue::Time(v) => Some(v.format("%H:%M:%S").to_string()),
        SqlValue::Json(v) => Some(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::state::{DbForeignKeyState, DbIndexState};
    use crate::schema::{
        ColumnDefinition, ForeignKeyAction, PkStrategy, TableDefinition,
    };
    use crate::value::SourceKind;
    use indexmap::IndexMap;

    fn column(name: &str, sql_type: MySqlType) -> ColumnDefinition {
        ColumnDefinition {
            name: name.into(),
            property_name: name.into(),
            sql_type,
            source_type: "test".into(),
            source_kind: SourceKind::Text,
            nullable: false,
            length: if sql_type == MySqlType::Varchar { Some(255) } else { None },
            precision: None,
            scale: None,
            default: None,
            is_primary_key: false,
            pk_strategy: PkStrategy::Auto,
            is_deprecated: false,
        }
    }

    fn pk_column() -> ColumnDefinition {
        let mut c = column("id", MySqlType::Int);
        c.source_kind = SourceKind::Integer;
        c.is_primary_key = true;
        c
    }

    fn live_column(name: &str, column_type: &str) -> DbColumnState {
        DbColumnState {
            name: name.into(),
            column_type: column_type.into(),
            data_type: column_type.split('(').next().unwrap().into(),
            is_nullable: false,
            default: None,
            is_primary: name == "id",
            is_auto_increment: false,
            char_max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            comment: String::new(),
        }
    }

    fn declared_users() -> DeclaredSchema {
        let mut table = TableDefinition::new("users");
        let mut id = pk_column();
        id.pk_strategy = PkStrategy::Auto;
        table.columns.insert("id".into(), id);
        table.columns.insert("email".into(), column("email", MySqlType::Varchar));
        DeclaredSchema {
            tables: IndexMap::from([("users".to_string(), table)]),
        }
    }

    fn live_users() -> DbSchemaState {
        let mut table = DbTableState { name: "users".into(), ..Default::default() };
        let mut id = live_column("id", "int");
        id.is_auto_increment = true;
        table.columns.insert("id".into(), id);
        table
            .columns
            .insert("email".into(), live_column("email", "varchar(255)"));
        DbSchemaState {
            tables: IndexMap::from([("users".to_string(), table)]),
        }
    }

    #[test]
    fn identical_schemas_diff_empty() {
        let declared = declared_users();
        let live = live_users();
        let diff = compare(&declared, &live, &HashSet::new());
        assert!(diff.is_empty(), "{diff:?}");
    }

    #[test]
    fn missing_table_is_created_and_stray_table_dropped() {
        let declared = declared_users();
        let mut live = live_users();
        live.tables.shift_remove("users");
        live.tables.insert(
            "stray".into(),
            DbTableState { name: "stray".into(), ..Default::default() },
        );

        let diff = compare(&declared, &live, &HashSet::new());
        assert_eq!(diff.create_tables, vec!["users"]);
        assert_eq!(diff.drop_tables.len(), 1);
        assert_eq!(diff.drop_tables[0].name, "stray");
    }

    #[test]
    fn ignored_tables_are_invisible_both_ways() {
        let mut declared = declared_users();
        let mut orders = TableDefinition::new("orders");
        orders.columns.insert("id".into(), pk_column());
        declared.tables.insert("orders".into(), orders);

        let mut live = live_users();
        live.tables.insert(
            "audit_log".into(),
            DbTableState { name: "audit_log".into(), ..Default::default() },
        );

        let ignore: HashSet<String> = ["orders".to_string(), "audit_log".to_string()].into();
        let diff = compare(&declared, &live, &ignore);
        assert!(diff.is_empty(), "{diff:?}");
    }

    #[test]
    fn added_and_dropped_columns() {
        let mut declared = declared_users();
        declared
            .tables
            .get_mut("users")
            .unwrap()
            .columns
            .insert("name".into(), column("name", MySqlType::Varchar));

        let mut live = live_users();
        live.tables
            .get_mut("users")
            .unwrap()
            .columns
            .insert("legacy".into(), live_column("legacy", "varchar(32)"));

        let diff = compare(&declared, &live, &HashSet::new());
        assert_eq!(diff.add_columns, vec![("users".to_string(), "name".to_string())]);
        assert_eq!(diff.drop_columns.len(), 1);
        assert_eq!(diff.drop_columns[0].1.column_type, "varchar(32)");
    }

    #[test]
    fn display_width_differences_are_not_changes() {
        let declared = declared_users();
        let mut live = live_users();
        live.tables.get_mut("users").unwrap().columns.get_mut("id").unwrap().column_type =
            "int(11)".into();
        let diff = compare(&declared, &live, &HashSet::new());
        assert!(diff.is_empty(), "{diff:?}");
    }

    #[test]
    fn widening_varchar_is_safe_narrowing_is_destructive() {
        let mut declared = declared_users();
        declared
            .tables
            .get_mut("users")
            .unwrap()
            .columns
            .get_mut("email")
            .unwrap()
            .length = Some(200);

        // live 100 -> declared 200: widening
        let mut live = live_users();
        live.tables
            .get_mut("users")
            .unwrap()
            .columns
            .get_mut("email")
            .unwrap()
            .column_type = "varchar(100)".into();
        let diff = compare(&declared, &live, &HashSet::new());
        assert_eq!(diff.alter_columns.len(), 1);
        assert!(!diff.alter_columns[0].destructive);

        // live 400 -> declared 200: narrowing
        live.tables
            .get_mut("users")
            .unwrap()
            .columns
            .get_mut("email")
            .unwrap()
            .column_type = "varchar(400)".into();
        let diff = compare(&declared, &live, &HashSet::new());
        assert!(diff.alter_columns[0].destructive);
    }

    #[test]
    fn default_removal_is_a_default_change_not_a_type_change() {
        let declared = declared_users();
        let mut live = live_users();
        live.tables
            .get_mut("users")
            .unwrap()
            .columns
            .get_mut("email")
            .unwrap()
            .default = Some("x".into());

        let diff = compare(&declared, &live, &HashSet::new());
        assert_eq!(diff.alter_columns.len(), 1);
        let alter = &diff.alter_columns[0];
        assert_eq!(alter.changes, vec!["default: x -> none"]);
        assert!(!alter.destructive, "default changes are safe");
    }

    #[test]
    fn nullability_and_auto_increment_changes_are_safe() {
        let mut declared = declared_users();
        declared
            .tables
            .get_mut("users")
            .unwrap()
            .columns
            .get_mut("email")
            .unwrap()
            .nullable = true;
        let diff = compare(&declared, &live_users(), &HashSet::new());
        assert_eq!(diff.alter_columns.len(), 1);
        assert!(!diff.alter_columns[0].destructive);
        assert!(diff.alter_columns[0].changes[0].starts_with("nullable:"));
    }

    #[test]
    fn index_mismatch_drops_and_readds() {
        let mut declared = declared_users();
        declared.tables.get_mut("users").unwrap().indexes.push(IndexDefinition {
            columns: vec!["email".into()],
            unique: true,
            name: None,
        });

        let mut live = live_users();
        live.tables.get_mut("users").unwrap().indexes.push(DbIndexState {
            name: "uniq_users_email".into(),
            columns: vec!["email".into()],
            unique: false, // drifted
        });

        let diff = compare(&declared, &live, &HashSet::new());
        assert_eq!(diff.drop_indexes, vec![("users".to_string(), "uniq_users_email".to_string())]);
        assert_eq!(diff.add_indexes.len(), 1);
    }

    #[test]
    fn undeclared_live_index_is_dropped_but_fk_backing_index_is_kept() {
        let mut live = live_users();
        {
            let t = live.tables.get_mut("users").unwrap();
            t.indexes.push(DbIndexState {
                name: "idx_users_handmade".into(),
                columns: vec!["email".into()],
                unique: false,
            });
            t.indexes.push(DbIndexState {
                name: "fk_users_team_id".into(),
                columns: vec!["team_id".into()],
                unique: false,
            });
            t.foreign_keys.push(DbForeignKeyState {
                name: "fk_users_team_id".into(),
                table: "users".into(),
                column: "team_id".into(),
                referenced_table: "teams".into(),
                referenced_column: "id".into(),
                delete_rule: "RESTRICT".into(),
                update_rule: "RESTRICT".into(),
            });
            t.columns.insert("team_id".into(), live_column("team_id", "int"));
        }

        let mut declared = declared_users();
        {
            let t = declared.tables.get_mut("users").unwrap();
            let mut team = column("team_id", MySqlType::Int);
            team.source_kind = SourceKind::Integer;
            t.columns.insert("team_id".into(), team);
            t.foreign_keys.push(ForeignKeyDefinition {
                table: "users".into(),
                column: "team_id".into(),
                referenced_table: "teams".into(),
                referenced_column: "id".into(),
                on_delete: ForeignKeyAction::Restrict,
                on_update: ForeignKeyAction::Restrict,
            });
        }

        let diff = compare(&declared, &live, &HashSet::new());
        assert_eq!(
            diff.drop_indexes,
            vec![("users".to_string(), "idx_users_handmade".to_string())]
        );
        assert!(diff.add_foreign_keys.is_empty());
        assert!(diff.drop_foreign_keys.is_empty());
    }

    #[test]
    fn fk_rule_mismatch_drops_and_readds() {
        let mut declared = declared_users();
        {
            let t = declared.tables.get_mut("users").unwrap();
            let mut team = column("team_id", MySqlType::Int);
            team.source_kind = SourceKind::Integer;
            team.nullable = true;
            t.columns.insert("team_id".into(), team);
            t.foreign_keys.push(ForeignKeyDefinition {
                table: "users".into(),
                column: "team_id".into(),
                referenced_table: "teams".into(),
                referenced_column: "id".into(),
                on_delete: ForeignKeyAction::SetNull,
                on_update: ForeignKeyAction::SetNull,
            });
        }
        let mut live = live_users();
        {
            let t = live.tables.get_mut("users").unwrap();
            let mut team = live_column("team_id", "int");
            team.is_nullable = true;
            t.columns.insert("team_id".into(), team);
            t.foreign_keys.push(DbForeignKeyState {
                name: "fk_users_team_id".into(),
                table: "users".into(),
                column: "team_id".into(),
                referenced_table: "teams".into(),
                referenced_column: "id".into(),
                delete_rule: "CASCADE".into(), // drifted
                update_rule: "SET NULL".into(),
            });
        }

        let diff = compare(&declared, &live, &HashSet::new());
        assert_eq!(
            diff.drop_foreign_keys,
            vec![("users".to_string(), "fk_users_team_id".to_string())]
        );
        assert_eq!(diff.add_foreign_keys.len(), 1);
    }

    #[test]
    fn widening_matrix() {
        assert!(is_widening("varchar(100)", "varchar(200)"));
        assert!(!is_widening("varchar(200)", "varchar(100)"));
        assert!(is_widening("varchar(255)", "text"));
        assert!(is_widening("varchar(255)", "longtext"));
        assert!(is_widening("text", "mediumtext"));
        assert!(is_widening("mediumtext", "longtext"));
        assert!(!is_widening("longtext", "text"));
        assert!(is_widening("tinyint", "int"));
        assert!(is_widening("int", "bigint"));
        assert!(!is_widening("bigint", "int"));
        assert!(!is_widening("int", "int unsigned"));
        assert!(is_widening("float", "double"));
        assert!(!is_widening("double", "float"));
        assert!(is_widening("char(10)", "char(20)"));
        assert!(!is_widening("char(20)", "char(10)"));
        assert!(is_widening("char(64)", "varchar(32)"));
        assert!(!is_widening("int", "varchar(32)"));
        assert!(!is_widening("datetime", "date"));
    }

    #[test]
    fn type_normalization() {
        assert_eq!(normalize_type("INT(11)"), "int");
        assert_eq!(normalize_type("bigint(20) unsigned"), "bigint unsigned");
        assert_eq!(normalize_type(" VARCHAR(255) "), "varchar(255)");
        assert_eq!(normalize_type("tinyint(1)"), "tinyint");
        assert_eq!(normalize_type("decimal(10,2)"), "decimal(10,2)");
    }

    /// Simulate the state INFORMATION_SCHEMA would report right after the
    /// declared schema was applied.
    fn live_from_declared(declared: &DeclaredSchema) -> DbSchemaState {
        let mut live = DbSchemaState::default();
        for (name, table) in &declared.tables {
            let mut live_table = DbTableState { name: name.clone(), ..Default::default() };
            for (col_name, col) in &table.columns {
                live_table.columns.insert(
                    col_name.clone(),
                    DbColumnState {
                        name: col_name.clone(),
                        column_type: build_expected(col),
                        data_type: col.sql_type.as_str().to_string(),
                        is_nullable: col.nullable,
                        default: normalize_default(col.default.as_ref()),
                        is_primary: col.is_primary_key,
                        is_auto_increment: col.is_auto_increment(),
                        char_max_length: col.length.map(u64::from),
                        numeric_precision: col.precision.map(u64::from),
                        numeric_scale: col.scale.map(u64::from),
                        comment: String::new(),
                    },
                );
            }
            for index in &table.indexes {
                live_table.indexes.push(crate::schema::state::DbIndexState {
                    name: index.resolved_name(name),
                    columns: index.columns.clone(),
                    unique: index.unique,
                });
            }
            for fk in &table.foreign_keys {
                live_table.foreign_keys.push(DbForeignKeyState {
                    name: fk.constraint_name(),
                    table: fk.table.clone(),
                    column: fk.column.clone(),
                    referenced_table: fk.referenced_table.clone(),
                    referenced_column: fk.referenced_column.clone(),
                    delete_rule: fk.on_delete.as_sql().to_string(),
                    update_rule: fk.on_update.as_sql().to_string(),
                });
                // MySQL backs the constraint with an index of the same name.
                live_table.indexes.push(crate::schema::state::DbIndexState {
                    name: fk.constraint_name(),
                    columns: vec![fk.column.clone()],
                    unique: false,
                });
            }
            live.tables.insert(name.clone(), live_table);
        }
        live
    }

    #[test]
    fn applying_the_declaration_converges_to_an_empty_diff() {
        use crate::resource::{FieldBlueprint, RelationBlueprint, RelationTarget, TableBlueprint};
        use crate::schema::collector::SchemaCollector;
        use crate::schema::RelationKind;

        let mut users = TableBlueprint::new("users");
        let mut id = FieldBlueprint {
            property: "id".into(),
            column: "id".into(),
            sql_type: MySqlType::Int,
            source_type: "i64".into(),
            source_kind: SourceKind::Integer,
            nullable: false,
            length: None,
            precision: None,
            scale: None,
            default: None,
            primary_key: Some(PkStrategy::Auto),
            filterable: None,
            deprecated: false,
        };
        users.fields.push(id.clone());
        let mut email = id.clone();
        email.property = "email".into();
        email.column = "email".into();
        email.sql_type = MySqlType::Varchar;
        email.source_kind = SourceKind::Text;
        email.length = Some(255);
        email.primary_key = None;
        email.filterable = Some("email".into());
        users.fields.push(email);
        let mut active = id.clone();
        active.property = "active".into();
        active.column = "active".into();
        active.sql_type = MySqlType::Boolean;
        active.source_kind = SourceKind::Boolean;
        active.primary_key = None;
        active.default = Some(SqlValue::Bool(true));
        users.fields.push(active);

        let mut orders = TableBlueprint::new("orders");
        id.property = "id".into();
        orders.fields.push(id.clone());
        let mut user_id = id.clone();
        user_id.property = "user_id".into();
        user_id.column = "user_id".into();
        user_id.primary_key = None;
        user_id.nullable = true;
        orders.fields.push(user_id);
        orders.relations.push(RelationBlueprint {
            property: "user".into(),
            kind: RelationKind::BelongsTo,
            target: RelationTarget::Named { table: "users".into(), pk: "id".into() },
            foreign_key: "user_id".into(),
            pivot_table: None,
            related_key: None,
            on_delete: None,
            on_update: None,
        });

        let declared = SchemaCollector::new()
            .register_blueprint(users)
            .register_blueprint(orders)
            .collect()
            .into_result()
            .unwrap();

        let live = live_from_declared(&declared);
        let diff = compare(&declared, &live, &HashSet::new());
        assert!(diff.is_empty(), "diff after convergence: {diff:?}");
    }

    #[test]
    fn default_normalization() {
        assert_eq!(normalize_default(Some(&SqlValue::Bool(true))), Some("1".into()));
        assert_eq!(normalize_default(Some(&SqlValue::Bool(false))), Some("0".into()));
        assert_eq!(normalize_default(Some(&SqlValue::Int(5))), Some("5".into()));
        assert_eq!(normalize_default(Some(&SqlValue::Text("x".into()))), Some("x".into()));
        assert_eq!(normalize_default(Some(&SqlValue::Null)), None);
        assert_eq!(normalize_default(None), None);
    }
}
