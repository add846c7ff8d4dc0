//! Database adapter.
//!
//! The adapter owns all driver contact. Every `execute` call acquires a
//! connection from the pool, runs one statement, materializes every row
//! into plain [`Row`] values and returns the connection. Callers never see
//! a cursor, which is what makes cooperative scheduling safe here.

pub mod pool;
pub mod transaction;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column as _, ConnectOptions, Connection as _, Row as _, TypeInfo as _, ValueRef as _};

use crate::config::DbConfig;
use crate::error::{Error, Result};
use crate::value::{QueryResult, Row, SqlValue};

pub use pool::{Connector, Pool, PooledConn};
pub use transaction::{TransactionManager, TxSession};

/// Driver seam the whole runtime goes through.
///
/// Implementations must fully materialize result sets and must report the
/// server's affected-row count unaltered.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult>;

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.execute(sql, &[]).await
    }
}

/// What the connected server can do for the sync engine.
#[derive(Debug, Clone)]
pub struct ServerCapabilities {
    pub version: String,
    /// MySQL >= 8.0: DDL participates in transactions.
    pub atomic_ddl: bool,
    /// MySQL >= 8.0.12: ALTER TABLE ... ADD COLUMN can be instant.
    pub instant_add_column: bool,
}

impl ServerCapabilities {
    /// Derive the capability matrix from a `SELECT VERSION()` string.
    pub fn from_version(version: &str) -> Self {
        let mut parts = version.split(|c: char| !c.is_ascii_digit()).filter_map(|p| {
            if p.is_empty() {
                None
            } else {
                p.parse::<u32>().ok()
            }
        });
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);

        Self {
            version: version.to_string(),
            atomic_ddl: major >= 8,
            instant_add_column: major > 8 || (major == 8 && (minor > 0 || patch >= 12)),
        }
    }
}

/// [`Connector`] over raw sqlx MySQL connections.
pub struct MySqlConnector {
    options: MySqlConnectOptions,
}

impl MySqlConnector {
    pub fn new(config: &DbConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database)
            .charset(&config.charset);
        Self { options }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Conn = MySqlConnection;

    async fn connect(&self) -> Result<MySqlConnection> {
        self.options.connect().await.map_err(Error::from_driver)
    }

    async fn validate(&self, conn: &mut MySqlConnection) -> bool {
        sqlx::query("SELECT 1").execute(&mut *conn).await.is_ok()
    }

    async fn close(&self, conn: MySqlConnection) {
        let _ = conn.close().await;
    }
}

/// Pool-backed adapter for MySQL 8.0+.
pub struct MySqlAdapter {
    pool: Arc<Pool<MySqlConnector>>,
    acquire_timeout: Duration,
    database: String,
}

impl MySqlAdapter {
    /// Build the adapter; no connection is opened until first use.
    pub fn new(config: &DbConfig) -> Self {
        Self {
            pool: Pool::new(MySqlConnector::new(config), config.pool_size),
            acquire_timeout: config.acquire_timeout,
            database: config.database.clone(),
        }
    }

    pub fn pool(&self) -> &Arc<Pool<MySqlConnector>> {
        &self.pool
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn transaction_manager(&self) -> TransactionManager {
        TransactionManager::new(self.pool.clone(), self.acquire_timeout)
    }

    /// Probe the server version and derive the capability matrix.
    /// Versions below 8.0.0 are rejected outright.
    pub async fn capabilities(&self) -> Result<ServerCapabilities> {
        let result = self.query("SELECT VERSION() AS version").await?;
        let version = result
            .rows
            .first()
            .ok_or_else(|| Error::SchemaState("SELECT VERSION() returned no rows".into()))?
            .str("version")?
            .to_string();
        crate::schema::reader::require_mysql8(&version)?;
        Ok(ServerCapabilities::from_version(&version))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        let mut guard = self.pool.pop(self.acquire_timeout).await?;
        match run_statement(guard.conn(), sql, params).await {
            Ok(result) => Ok(result),
            Err(err @ Error::ConnectionLost(_)) => {
                // The wire is gone; don't put the carcass back in the pool.
                guard.discard();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

/// Run one statement on one connection and materialize the outcome.
pub(crate) async fn run_statement(
    conn: &mut MySqlConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<QueryResult> {
    log::debug!("sql: {sql}");
    if returns_rows(sql) {
        let query = bind_params(sqlx::query(sql), params);
        let rows = query.fetch_all(&mut *conn).await.map_err(Error::from_driver)?;
        let mut out = QueryResult::empty();
        out.rows.reserve(rows.len());
        for row in &rows {
            out.rows.push(materialize_row(row)?);
        }
        Ok(out)
    } else {
        let query = bind_params(sqlx::query(sql), params);
        let done = query.execute(&mut *conn).await.map_err(Error::from_driver)?;
        Ok(QueryResult {
            rows: Vec::new(),
            affected_rows: done.rows_affected(),
            last_insert_id: done.last_insert_id(),
        })
    }
}

fn returns_rows(sql: &str) -> bool {
    let head = sql.trim_start();
    let verb: String = head
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    matches!(verb.as_str(), "SELECT" | "SHOW" | "EXPLAIN" | "DESCRIBE" | "DESC" | "WITH")
}

type MySqlQuery<'q> = sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>;

fn bind_params<'q>(mut query: MySqlQuery<'q>, params: &'q [SqlValue]) -> MySqlQuery<'q> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::UInt(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Bytes(v) => query.bind(v.as_slice()),
            SqlValue::DateTime(v) => query.bind(*v),
            SqlValue::Date(v) => query.bind(*v),
            SqlValue::Time(v) => query.bind(*v),
            SqlValue::Json(v) => query.bind(v.clone()),
        };
    }
    query
}

/// Decode one driver row into plain values, by column type name.
fn materialize_row(row: &MySqlRow) -> Result<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(Error::from_driver)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            decode_value(row, i, column.type_info().name())?
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_value(row: &MySqlRow, i: usize, type_name: &str) -> Result<SqlValue> {
    let value = match type_name {
        "BOOLEAN" => SqlValue::Bool(row.try_get::<bool, _>(i).map_err(Error::from_driver)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            SqlValue::Int(row.try_get::<i64, _>(i).map_err(Error::from_driver)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => {
            SqlValue::UInt(row.try_get::<u64, _>(i).map_err(Error::from_driver)?)
        }
        "YEAR" => SqlValue::UInt(row.try_get::<u16, _>(i).map_err(Error::from_driver)? as u64),
        "FLOAT" => SqlValue::Float(row.try_get::<f32, _>(i).map_err(Error::from_driver)? as f64),
        "DOUBLE" => SqlValue::Float(row.try_get::<f64, _>(i).map_err(Error::from_driver)?),
        "DECIMAL" => SqlValue::Text(
            row.try_get::<rust_decimal::Decimal, _>(i)
                .map_err(Error::from_driver)?
                .to_string(),
        ),
        "DATETIME" => {
            SqlValue::DateTime(row.try_get::<chrono::NaiveDateTime, _>(i).map_err(Error::from_driver)?)
        }
        "TIMESTAMP" => SqlValue::DateTime(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                .map_err(Error::from_driver)?
                .naive_utc(),
        ),
        "DATE" => SqlValue::Date(row.try_get::<chrono::NaiveDate, _>(i).map_err(Error::from_driver)?),
        "TIME" => SqlValue::Time(row.try_get::<chrono::NaiveTime, _>(i).map_err(Error::from_driver)?),
        "JSON" => SqlValue::Json(row.try_get::<serde_json::Value, _>(i).map_err(Error::from_driver)?),
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            SqlValue::Text(row.try_get::<String, _>(i).map_err(Error::from_driver)?)
        }
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            SqlValue::Bytes(row.try_get::<Vec<u8>, _>(i).map_err(Error::from_driver)?)
        }
        _ => {
            // Unknown type: prefer text, fall back to raw bytes.
            match row.try_get::<String, _>(i) {
                Ok(text) => SqlValue::Text(text),
                Err(_) => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(i).map_err(Error::from_driver)?),
            }
        }
    };
    Ok(value)
}
