//! DDL rendering.
//!
//! All identifiers arriving here have passed the collector's identifier
//! check, so backtick quoting is purely cosmetic armor. Every statement is
//! emitted as a complete string; the executor never assembles SQL itself.

use crate::value::SqlValue;

use super::comparator::build_expected;
use super::state::DbColumnState;
use super::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, TableDefinition, DEPRECATION_SENTINEL,
};

const TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci";

pub fn quote(identifier: &str) -> String {
    format!("`{identifier}`")
}

/// Single-quoted SQL string with embedded quotes doubled.
fn quote_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render a DEFAULT clause, or nothing.
///
/// No default and NOT NULL omits the clause entirely; no default on a
/// nullable column renders `DEFAULT NULL`.
pub fn render_default(default: Option<&SqlValue>, nullable: bool) -> String {
    match default {
        None | Some(SqlValue::Null) => {
            if nullable {
                " DEFAULT NULL".to_string()
            } else {
                String::new()
            }
        }
        Some(SqlValue::Bool(b)) => format!(" DEFAULT {}", if *b { 1 } else { 0 }),
        Some(SqlValue::Int(v)) => format!(" DEFAULT {v}"),
        Some(SqlValue::UInt(v)) => format!(" DEFAULT {v}"),
        Some(SqlValue::Float(v)) => format!(" DEFAULT {v}"),
        Some(SqlValue::Text(s)) => format!(" DEFAULT {}", quote_str(s)),
        Some(SqlValue::Bytes(b)) => {
            format!(" DEFAULT {}", quote_str(&String::from_utf8_lossy(b)))
        }
        Some(SqlValue::DateTime(v)) => {
            format!(" DEFAULT {}", quote_str(&v.format("%Y-%m-%d %H:%M:%S").to_string()))
        }
        Some(SqlValue::Date(v)) => {
            format!(" DEFAULT {}", quote_str(&v.format("%Y-%m-%d").to_string()))
        }
        Some(SqlValue::Time(v)) => {
            format!(" DEFAULT {}", quote_str(&v.format("%H:%M:%S").to_string()))
        }
        Some(SqlValue::Json(v)) => format!(" DEFAULT {}", quote_str(&v.to_string())),
    }
}

/// `` `name` type [NOT NULL] [DEFAULT ...] [AUTO_INCREMENT] ``: the body
/// shared by CREATE TABLE, ADD COLUMN and MODIFY COLUMN.
pub fn render_column(column: &ColumnDefinition) -> String {
    let mut sql = format!("{} {}", quote(&column.name), build_expected(column));
    if column.nullable {
        sql.push_str(" NULL");
    } else {
        sql.push_str(" NOT NULL");
    }
    sql.push_str(&render_default(column.default.as_ref(), column.nullable));
    if column.is_auto_increment() {
        sql.push_str(" AUTO_INCREMENT");
    }
    sql
}

pub fn create_table(table: &TableDefinition) -> String {
    let mut lines: Vec<String> = table
        .columns
        .values()
        .map(|c| format!("  {}", render_column(c)))
        .collect();

    if let Some(pk) = table.primary_key() {
        lines.push(format!("  PRIMARY KEY ({})", quote(&pk.name)));
    }

    // Non-PK indexes go inline; FKs are added in a later plan phase so
    // creation order never depends on reference order.
    for index in &table.indexes {
        let cols = index
            .columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let name = quote(&index.resolved_name(&table.name));
        if index.unique {
            lines.push(format!("  UNIQUE KEY {name} ({cols})"));
        } else {
            lines.push(format!("  KEY {name} ({cols})"));
        }
    }

    format!(
        "CREATE TABLE {} (\n{}\n) {}",
        quote(&table.name),
        lines.join(",\n"),
        TABLE_OPTIONS
    )
}

pub fn add_column(table: &str, column: &ColumnDefinition) -> String {
    format!("ALTER TABLE {} ADD COLUMN {}", quote(table), render_column(column))
}

/// MODIFY with the full declared definition; the declared column is the
/// source of truth for the type.
pub fn modify_column(table: &str, column: &ColumnDefinition) -> String {
    format!("ALTER TABLE {} MODIFY COLUMN {}", quote(table), render_column(column))
}

/// Phase-one drop: rewrite the live definition verbatim and append the
/// sentinel comment. MODIFY without a type would reset the column, so the
/// live `COLUMN_TYPE`, nullability, default and auto-increment must all be
/// restated.
pub fn deprecate_column(table: &str, live: &DbColumnState) -> String {
    let mut sql = format!(
        "ALTER TABLE {} MODIFY COLUMN {} {}",
        quote(table),
        quote(&live.name),
        live.column_type
    );
    if live.is_nullable {
        sql.push_str(" NULL");
    } else {
        sql.push_str(" NOT NULL");
    }
    match &live.default {
        Some(default) => sql.push_str(&format!(" DEFAULT {}", quote_str(default))),
        None if live.is_nullable => sql.push_str(" DEFAULT NULL"),
        None => {}
    }
    if live.is_auto_increment {
        sql.push_str(" AUTO_INCREMENT");
    }
    sql.push_str(&format!(" COMMENT {}", quote_str(DEPRECATION_SENTINEL)));
    sql
}

pub fn drop_column(table: &str, column: &str) -> String {
    format!("ALTER TABLE {} DROP COLUMN {}", quote(table), quote(column))
}

pub fn add_index(table: &str, index: &IndexDefinition) -> String {
    let cols = index
        .columns
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ");
    let kind = if index.unique { "UNIQUE INDEX" } else { "INDEX" };
    format!(
        "ALTER TABLE {} ADD {kind} {} ({cols})",
        quote(table),
        quote(&index.resolved_name(table))
    )
}

pub fn drop_index(table: &str, name: &str) -> String {
    format!("ALTER TABLE {} DROP INDEX {}", quote(table), quote(name))
}

pub fn add_foreign_key(fk: &ForeignKeyDefinition) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        quote(&fk.table),
        quote(&fk.constraint_name()),
        quote(&fk.column),
        quote(&fk.referenced_table),
        quote(&fk.referenced_column),
        fk.on_delete.as_sql(),
        fk.on_update.as_sql()
    )
}

pub fn drop_foreign_key(table: &str, constraint: &str) -> String {
    format!("ALTER TABLE {} DROP FOREIGN KEY {}", quote(table), quote(constraint))
}

/// Phase-one table drop: only the comment changes.
pub fn deprecate_table(table: &str) -> String {
    format!(
        "ALTER TABLE {} COMMENT {}",
        quote(table),
        quote_str(DEPRECATION_SENTINEL)
    )
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE {}", quote(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKeyAction, MySqlType, PkStrategy};
    use crate::value::SourceKind;

    fn column(name: &str, sql_type: MySqlType, length: Option<u32>) -> ColumnDefinition {
        ColumnDefinition {
            name: name.into(),
            property_name: name.into(),
            sql_type,
            source_type: "test".into(),
            source_kind: SourceKind::Text,
            nullable: false,
            length,
            precision: None,
            scale: None,
            default: None,
            is_primary_key: false,
            pk_strategy: PkStrategy::Auto,
            is_deprecated: false,
        }
    }

    #[test]
    fn create_table_shape() {
        let mut table = TableDefinition::new("users");
        let mut id = column("id", MySqlType::Int, None);
        id.source_kind = SourceKind::Integer;
        id.is_primary_key = true;
        table.columns.insert("id".into(), id);
        table.columns.insert("email".into(), column("email", MySqlType::Varchar, Some(255)));
        table.columns.insert("name".into(), column("name", MySqlType::Varchar, Some(255)));
        table.indexes.push(IndexDefinition {
            columns: vec!["email".into()],
            unique: true,
            name: None,
        });

        let sql = create_table(&table);
        assert!(sql.starts_with("CREATE TABLE `users` ("));
        assert!(sql.contains("`id` int NOT NULL AUTO_INCREMENT"));
        assert!(sql.contains("`email` varchar(255) NOT NULL"));
        assert!(sql.contains("`name` varchar(255) NOT NULL"));
        assert!(sql.contains("PRIMARY KEY (`id`)"));
        assert!(sql.contains("UNIQUE KEY `uniq_users_email` (`email`)"));
        assert!(sql.ends_with("ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"));
        assert!(!sql.contains("FOREIGN KEY"), "FKs are never inlined");
    }

    #[test]
    fn default_rendering() {
        assert_eq!(render_default(None, false), "");
        assert_eq!(render_default(None, true), " DEFAULT NULL");
        assert_eq!(render_default(Some(&SqlValue::Bool(true)), false), " DEFAULT 1");
        assert_eq!(render_default(Some(&SqlValue::Bool(false)), false), " DEFAULT 0");
        assert_eq!(render_default(Some(&SqlValue::Int(42)), false), " DEFAULT 42");
        assert_eq!(render_default(Some(&SqlValue::Float(1.5)), false), " DEFAULT 1.5");
        assert_eq!(
            render_default(Some(&SqlValue::Text("it's".into())), false),
            " DEFAULT 'it''s'"
        );
    }

    #[test]
    fn nullable_column_renders_null_and_default() {
        let mut c = column("bio", MySqlType::Text, None);
        c.nullable = true;
        assert_eq!(render_column(&c), "`bio` text NULL DEFAULT NULL");
    }

    #[test]
    fn deprecate_column_restates_live_definition() {
        let live = DbColumnState {
            name: "name".into(),
            column_type: "varchar(255)".into(),
            data_type: "varchar".into(),
            is_nullable: false,
            default: None,
            is_primary: false,
            is_auto_increment: false,
            char_max_length: Some(255),
            numeric_precision: None,
            numeric_scale: None,
            comment: String::new(),
        };
        assert_eq!(
            deprecate_column("users", &live),
            "ALTER TABLE `users` MODIFY COLUMN `name` varchar(255) NOT NULL \
             COMMENT 'SEMITEXA_DEPRECATED'"
        );
    }

    #[test]
    fn foreign_key_sql() {
        let fk = ForeignKeyDefinition {
            table: "orders".into(),
            column: "user_id".into(),
            referenced_table: "users".into(),
            referenced_column: "id".into(),
            on_delete: ForeignKeyAction::SetNull,
            on_update: ForeignKeyAction::Restrict,
        };
        assert_eq!(
            add_foreign_key(&fk),
            "ALTER TABLE `orders` ADD CONSTRAINT `fk_orders_user_id` FOREIGN KEY (`user_id`) \
             REFERENCES `users` (`id`) ON DELETE SET NULL ON UPDATE RESTRICT"
        );
        assert_eq!(
            drop_foreign_key("orders", "fk_orders_user_id"),
            "ALTER TABLE `orders` DROP FOREIGN KEY `fk_orders_user_id`"
        );
    }

    #[test]
    fn table_comment_sentinel() {
        assert_eq!(
            deprecate_table("legacy"),
            "ALTER TABLE `legacy` COMMENT 'SEMITEXA_DEPRECATED'"
        );
        assert_eq!(drop_table("legacy"), "DROP TABLE `legacy`");
    }
}
