//! Live-schema reader.
//!
//! Issues the INFORMATION_SCHEMA queries for the configured database and
//! assembles a [`DbSchemaState`]. The database name is the only bound
//! parameter; tables in the ignore set are invisible to the rest of the
//! sync pipeline.

use std::collections::HashSet;

use crate::db::DatabaseAdapter;
use crate::error::{Error, Result};
use crate::value::SqlValue;

use super::state::{
    DbColumnState, DbForeignKeyState, DbIndexState, DbSchemaState, DbTableState,
};

const TABLES_SQL: &str = "SELECT TABLE_NAME, TABLE_COMMENT \
     FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' \
     ORDER BY TABLE_NAME";

const COLUMNS_SQL: &str = "SELECT TABLE_NAME, COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, \
            COLUMN_KEY, EXTRA, DATA_TYPE, CHARACTER_MAXIMUM_LENGTH, \
            NUMERIC_PRECISION, NUMERIC_SCALE, COLUMN_COMMENT \
     FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_SCHEMA = ? \
     ORDER BY TABLE_NAME, ORDINAL_POSITION";

const INDEXES_SQL: &str = "SELECT TABLE_NAME, INDEX_NAME, COLUMN_NAME, NON_UNIQUE, SEQ_IN_INDEX \
     FROM INFORMATION_SCHEMA.STATISTICS \
     WHERE TABLE_SCHEMA = ? \
     ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX";

const FOREIGN_KEYS_SQL: &str = "SELECT kcu.CONSTRAINT_NAME, kcu.TABLE_NAME, kcu.COLUMN_NAME, \
            kcu.REFERENCED_TABLE_NAME, kcu.REFERENCED_COLUMN_NAME, \
            rc.DELETE_RULE, rc.UPDATE_RULE \
     FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
     JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc \
       ON rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
      AND rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA \
     WHERE kcu.TABLE_SCHEMA = ? AND kcu.REFERENCED_TABLE_NAME IS NOT NULL \
     ORDER BY kcu.TABLE_NAME, kcu.CONSTRAINT_NAME";

/// Reads the live schema of one database through the adapter.
pub struct SchemaReader<'a> {
    db: &'a dyn DatabaseAdapter,
    database: String,
    ignore_tables: HashSet<String>,
}

impl<'a> SchemaReader<'a> {
    pub fn new(db: &'a dyn DatabaseAdapter, database: impl Into<String>) -> Self {
        Self {
            db,
            database: database.into(),
            ignore_tables: HashSet::new(),
        }
    }

    /// Tables that must stay invisible to diffing and untouchable by sync.
    pub fn with_ignored_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Read everything in one pass.
    pub async fn read(&self) -> Result<DbSchemaState> {
        let mut state = DbSchemaState::default();
        let db_param = [SqlValue::Text(self.database.clone())];

        let tables = self.db.execute(TABLES_SQL, &db_param).await?;
        for row in &tables.rows {
            let name = row.str("TABLE_NAME")?.to_string();
            if self.ignore_tables.contains(&name) {
                continue;
            }
            let comment = row.opt_str("TABLE_COMMENT")?.unwrap_or_default();
            state
                .tables
                .insert(name.clone(), DbTableState { name, comment, ..Default::default() });
        }

        let columns = self.db.execute(COLUMNS_SQL, &db_param).await?;
        for row in &columns.rows {
            let table = row.str("TABLE_NAME")?.to_string();
            let Some(table_state) = state.tables.get_mut(&table) else {
                continue; // ignored or not a base table
            };
            let extra = row.opt_str("EXTRA")?.unwrap_or_default().to_ascii_lowercase();
            let column = DbColumnState {
                name: row.str("COLUMN_NAME")?.to_string(),
                column_type: row.str("COLUMN_TYPE")?.to_string(),
                data_type: row.str("DATA_TYPE")?.to_string(),
                is_nullable: row.str("IS_NULLABLE")?.eq_ignore_ascii_case("YES"),
                default: row.opt_str("COLUMN_DEFAULT")?,
                is_primary: row
                    .opt_str("COLUMN_KEY")?
                    .is_some_and(|k| k.eq_ignore_ascii_case("PRI")),
                is_auto_increment: extra.contains("auto_increment"),
                char_max_length: row.opt_int("CHARACTER_MAXIMUM_LENGTH")?.map(|v| v as u64),
                numeric_precision: row.opt_int("NUMERIC_PRECISION")?.map(|v| v as u64),
                numeric_scale: row.opt_int("NUMERIC_SCALE")?.map(|v| v as u64),
                comment: row.opt_str("COLUMN_COMMENT")?.unwrap_or_default(),
            };
            table_state.columns.insert(column.name.clone(), column);
        }

        let indexes = self.db.execute(INDEXES_SQL, &db_param).await?;
        for row in &indexes.rows {
            let table = row.str("TABLE_NAME")?.to_string();
            let Some(table_state) = state.tables.get_mut(&table) else {
                continue;
            };
            let name = row.str("INDEX_NAME")?.to_string();
            // The PRIMARY index is covered by the column PK flag.
            if name.eq_ignore_ascii_case("PRIMARY") {
                continue;
            }
            let column = row.str("COLUMN_NAME")?.to_string();
            let unique = row.int("NON_UNIQUE")? == 0;
            match table_state.indexes.iter_mut().find(|i| i.name == name) {
                // Rows arrive ordered by SEQ_IN_INDEX.
                Some(index) => index.columns.push(column),
                None => table_state.indexes.push(DbIndexState {
                    name,
                    columns: vec![column],
                    unique,
                }),
            }
        }

        let fks = self.db.execute(FOREIGN_KEYS_SQL, &db_param).await?;
        for row in &fks.rows {
            let table = row.str("TABLE_NAME")?.to_string();
            let Some(table_state) = state.tables.get_mut(&table) else {
                continue;
            };
            table_state.foreign_keys.push(DbForeignKeyState {
                name: row.str("CONSTRAINT_NAME")?.to_string(),
                table,
                column: row.str("COLUMN_NAME")?.to_string(),
                referenced_table: row.str("REFERENCED_TABLE_NAME")?.to_string(),
                referenced_column: row.str("REFERENCED_COLUMN_NAME")?.to_string(),
                delete_rule: row.str("DELETE_RULE")?.to_string(),
                update_rule: row.str("UPDATE_RULE")?.to_string(),
            });
        }

        Ok(state)
    }
}

/// Reject server versions the sync engine cannot reason about.
pub fn require_mysql8(version: &str) -> Result<()> {
    let major = version
        .split('.')
        .next()
        .and_then(|p| p.parse::<u32>().ok())
        .ok_or_else(|| Error::SchemaState(format!("unparseable server version {version:?}")))?;
    if major < 8 {
        return Err(Error::SchemaState(format!(
            "MySQL {version} is below the supported 8.0.0 floor"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseAdapter;
    use crate::value::{QueryResult, Row};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedDb {
        responses: Mutex<Vec<QueryResult>>,
        seen_params: Mutex<Vec<Vec<SqlValue>>>,
    }

    #[async_trait]
    impl DatabaseAdapter for CannedDb {
        async fn execute(&self, _sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
            self.seen_params.lock().unwrap().push(params.to_vec());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(QueryResult::empty())
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    fn text_row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), SqlValue::Text(v.to_string())))
            .collect()
    }

    fn table_rows() -> QueryResult {
        QueryResult {
            rows: vec![
                text_row(&[("TABLE_NAME", "users"), ("TABLE_COMMENT", "")]),
                text_row(&[("TABLE_NAME", "legacy"), ("TABLE_COMMENT", "SEMITEXA_DEPRECATED")]),
                text_row(&[("TABLE_NAME", "sessions"), ("TABLE_COMMENT", "")]),
            ],
            ..Default::default()
        }
    }

    fn column_rows() -> QueryResult {
        let mut id = text_row(&[
            ("TABLE_NAME", "users"),
            ("COLUMN_NAME", "id"),
            ("COLUMN_TYPE", "int"),
            ("IS_NULLABLE", "NO"),
            ("COLUMN_KEY", "PRI"),
            ("EXTRA", "auto_increment"),
            ("DATA_TYPE", "int"),
            ("COLUMN_COMMENT", ""),
        ]);
        id.insert("COLUMN_DEFAULT", SqlValue::Null);
        id.insert("CHARACTER_MAXIMUM_LENGTH", SqlValue::Null);
        id.insert("NUMERIC_PRECISION", SqlValue::UInt(10));
        id.insert("NUMERIC_SCALE", SqlValue::UInt(0));

        let mut email = text_row(&[
            ("TABLE_NAME", "users"),
            ("COLUMN_NAME", "email"),
            ("COLUMN_TYPE", "varchar(255)"),
            ("IS_NULLABLE", "NO"),
            ("COLUMN_KEY", ""),
            ("EXTRA", ""),
            ("DATA_TYPE", "varchar"),
            ("COLUMN_COMMENT", ""),
        ]);
        email.insert("COLUMN_DEFAULT", SqlValue::Null);
        email.insert("CHARACTER_MAXIMUM_LENGTH", SqlValue::UInt(255));
        email.insert("NUMERIC_PRECISION", SqlValue::Null);
        email.insert("NUMERIC_SCALE", SqlValue::Null);

        QueryResult { rows: vec![id, email], ..Default::default() }
    }

    fn index_rows() -> QueryResult {
        let mut pri = text_row(&[
            ("TABLE_NAME", "users"),
            ("INDEX_NAME", "PRIMARY"),
            ("COLUMN_NAME", "id"),
        ]);
        pri.insert("NON_UNIQUE", SqlValue::Int(0));
        pri.insert("SEQ_IN_INDEX", SqlValue::Int(1));

        let mut uniq1 = text_row(&[
            ("TABLE_NAME", "users"),
            ("INDEX_NAME", "uniq_users_tenant_id_email"),
            ("COLUMN_NAME", "tenant_id"),
        ]);
        uniq1.insert("NON_UNIQUE", SqlValue::Int(0));
        uniq1.insert("SEQ_IN_INDEX", SqlValue::Int(1));

        let mut uniq2 = text_row(&[
            ("TABLE_NAME", "users"),
            ("INDEX_NAME", "uniq_users_tenant_id_email"),
            ("COLUMN_NAME", "email"),
        ]);
        uniq2.insert("NON_UNIQUE", SqlValue::Int(0));
        uniq2.insert("SEQ_IN_INDEX", SqlValue::Int(2));

        QueryResult { rows: vec![pri, uniq1, uniq2], ..Default::default() }
    }

    fn fk_rows() -> QueryResult {
        QueryResult {
            rows: vec![text_row(&[
                ("CONSTRAINT_NAME", "fk_users_team_id"),
                ("TABLE_NAME", "users"),
                ("COLUMN_NAME", "team_id"),
                ("REFERENCED_TABLE_NAME", "teams"),
                ("REFERENCED_COLUMN_NAME", "id"),
                ("DELETE_RULE", "SET NULL"),
                ("UPDATE_RULE", "SET NULL"),
            ])],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn reads_and_assembles_state() {
        let db = CannedDb {
            responses: Mutex::new(vec![table_rows(), column_rows(), index_rows(), fk_rows()]),
            seen_params: Mutex::new(Vec::new()),
        };

        let state = SchemaReader::new(&db, "semitexa")
            .with_ignored_tables(["sessions"])
            .read()
            .await
            .unwrap();

        // Every query bound exactly the database name.
        for params in db.seen_params.lock().unwrap().iter() {
            assert_eq!(params, &vec![SqlValue::Text("semitexa".into())]);
        }

        assert_eq!(state.tables.len(), 2);
        assert!(state.table("sessions").is_none(), "ignored table leaked into state");
        assert!(state.table("legacy").unwrap().is_deprecated());

        let users = state.table("users").unwrap();
        assert!(users.columns["id"].is_primary);
        assert!(users.columns["id"].is_auto_increment);
        assert_eq!(users.columns["email"].column_type, "varchar(255)");
        assert_eq!(users.columns["email"].char_max_length, Some(255));

        // PRIMARY skipped; multi-column index assembled in sequence order.
        assert_eq!(users.indexes.len(), 1);
        assert_eq!(users.indexes[0].name, "uniq_users_tenant_id_email");
        assert_eq!(users.indexes[0].columns, vec!["tenant_id", "email"]);
        assert!(users.indexes[0].unique);

        assert_eq!(users.foreign_keys[0].referenced_table, "teams");
    }

    #[tokio::test]
    async fn malformed_rows_become_schema_state_errors() {
        let mut bad = Row::new();
        bad.insert("TABLE_NAME", SqlValue::Int(42));
        let db = CannedDb {
            responses: Mutex::new(vec![QueryResult { rows: vec![bad], ..Default::default() }]),
            seen_params: Mutex::new(Vec::new()),
        };
        let err = SchemaReader::new(&db, "semitexa").read().await.unwrap_err();
        assert!(matches!(err, Error::SchemaState(_)));
    }

    #[test]
    fn version_floor() {
        assert!(require_mysql8("8.0.36").is_ok());
        assert!(require_mysql8("8.4.0").is_ok());
        assert!(matches!(require_mysql8("5.7.44"), Err(Error::SchemaState(_))));
        assert!(matches!(require_mysql8("garbage"), Err(Error::SchemaState(_))));
    }
}
