//! Transaction manager.
//!
//! `begin` claims one connection and opens a transaction on it; the
//! returned [`TxSession`] is a single-connection adapter view. Everything
//! executed through it runs on that connection, while operations outside
//! follow the pool. Nested scopes wrap their body in `SAVEPOINT sp_{depth}`.
//!
//! A session dropped without `commit`/`rollback` discards its connection,
//! so the server rolls the transaction back on disconnect rather than a
//! later pool user inheriting it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::value::{QueryResult, SqlValue};

use super::pool::{Pool, PooledConn};
use super::{run_statement, DatabaseAdapter, MySqlConnector};

/// Starts transactions over pooled connections.
pub struct TransactionManager {
    pool: Arc<Pool<MySqlConnector>>,
    acquire_timeout: Duration,
}

impl TransactionManager {
    pub fn new(pool: Arc<Pool<MySqlConnector>>, acquire_timeout: Duration) -> Self {
        Self { pool, acquire_timeout }
    }

    /// Claim a connection and issue `BEGIN`.
    pub async fn begin(&self) -> Result<TxSession> {
        let conn = self.pool.pop(self.acquire_timeout).await?;
        let session = TxSession {
            conn: Mutex::new(Some(conn)),
            depth: AtomicUsize::new(0),
        };
        session.raw("BEGIN").await?;
        Ok(session)
    }

    /// Callback form: commit on `Ok`, roll back and rethrow on `Err`.
    pub async fn run<T, F>(&self, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a TxSession) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        let session = self.begin().await?;
        match body(&session).await {
            Ok(value) => {
                session.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    log::error!("rollback failed after {err}: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}

/// Single-connection adapter view for the duration of one transaction.
pub struct TxSession {
    conn: Mutex<Option<PooledConn<MySqlConnector>>>,
    depth: AtomicUsize,
}

impl TxSession {
    async fn raw(&self, sql: &str) -> Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().expect("transaction already finished");
        run_statement(conn.conn(), sql, &[]).await.map(|_| ())
    }

    /// Commit and return the connection to the pool.
    pub async fn commit(self) -> Result<()> {
        self.raw("COMMIT").await?;
        self.release();
        Ok(())
    }

    /// Roll back and return the connection to the pool.
    pub async fn rollback(self) -> Result<()> {
        self.raw("ROLLBACK").await?;
        self.release();
        Ok(())
    }

    /// Hand the connection back healthy; `Drop` then has nothing to do.
    fn release(&self) {
        if let Ok(mut guard) = self.conn.try_lock() {
            guard.take();
        }
    }

    /// Nested scope backed by a savepoint: released on `Ok`, rolled back
    /// to on `Err`.
    pub async fn run<T, F>(&self, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a TxSession) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let savepoint = format!("sp_{depth}");
        self.raw(&format!("SAVEPOINT {savepoint}")).await?;

        let outcome = match body(self).await {
            Ok(value) => {
                self.raw(&format!("RELEASE SAVEPOINT {savepoint}")).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.raw(&format!("ROLLBACK TO {savepoint}")).await {
                    log::error!("savepoint rollback failed after {err}: {rollback_err}");
                }
                Err(err)
            }
        };
        self.depth.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

impl Drop for TxSession {
    fn drop(&mut self) {
        // An unfinished transaction must not leak back into the pool.
        if let Some(conn) = self.conn.get_mut().take() {
            log::warn!("transaction dropped without commit or rollback, discarding connection");
            conn.discard();
        }
    }
}

#[async_trait]
impl DatabaseAdapter for TxSession {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().expect("transaction already finished");
        run_statement(conn.conn(), sql, params).await
    }
}
