//! Bounded, lazily-filled connection pool.
//!
//! No connection exists until first demand; each demand claims a slot with
//! a compare-and-set against the limit before connecting, so two
//! concurrent `pop`s can never both cross the threshold. Connections taken
//! from the idle set are revalidated and silently replaced when stale.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Creates and checks the raw connections a [`Pool`] hands out.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: Send + 'static;

    async fn connect(&self) -> Result<Self::Conn>;

    /// Liveness probe for a connection coming out of the idle set.
    async fn validate(&self, conn: &mut Self::Conn) -> bool;

    /// Graceful teardown; failures are swallowed.
    async fn close(&self, conn: Self::Conn);
}

#[async_trait]
impl<T: Connector> Connector for Arc<T> {
    type Conn = T::Conn;

    async fn connect(&self) -> Result<Self::Conn> {
        T::connect(self).await
    }

    async fn validate(&self, conn: &mut Self::Conn) -> bool {
        T::validate(self, conn).await
    }

    async fn close(&self, conn: Self::Conn) {
        T::close(self, conn).await
    }
}

/// Fixed-bound pool over a [`Connector`].
pub struct Pool<C: Connector> {
    connector: C,
    limit: usize,
    created: AtomicUsize,
    idle: Mutex<Vec<C::Conn>>,
    returned: Notify,
    closed: AtomicBool,
}

impl<C: Connector> Pool<C> {
    pub fn new(connector: C, limit: usize) -> Arc<Self> {
        Arc::new(Self {
            connector,
            limit: limit.max(1),
            created: AtomicUsize::new(0),
            idle: Mutex::new(Vec::new()),
            returned: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Upper bound on concurrently open connections.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Connections created so far (idle + handed out).
    pub fn size(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// Connections currently idle.
    pub fn available(&self) -> usize {
        self.idle.lock().expect("pool idle lock poisoned").len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Acquire a connection, waiting up to `timeout` when the pool is at
    /// its limit with nothing idle.
    pub async fn pop(self: &Arc<Self>, timeout: Duration) -> Result<PooledConn<C>> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.is_closed() {
                return Err(Error::Database("connection pool is closed".into()));
            }

            let idle_conn = self.idle.lock().expect("pool idle lock poisoned").pop();
            if let Some(mut conn) = idle_conn {
                if self.connector.validate(&mut conn).await {
                    return Ok(PooledConn::new(self.clone(), conn));
                }
                // Stale: replace silently in the same slot. The slot count
                // does not move, so no CAS here.
                log::debug!("pool: replacing stale connection");
                self.connector.close(conn).await;
                match self.connector.connect().await {
                    Ok(fresh) => return Ok(PooledConn::new(self.clone(), fresh)),
                    Err(e) => {
                        self.release_slot();
                        return Err(Error::ConnectionLost(format!(
                            "reconnect after stale connection failed: {e}"
                        )));
                    }
                }
            }

            // Try to claim a fresh slot.
            let created = self.created.load(Ordering::Acquire);
            if created < self.limit {
                if self
                    .created
                    .compare_exchange(created, created + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Lost the race; start over.
                    continue;
                }
                match self.connector.connect().await {
                    Ok(conn) => return Ok(PooledConn::new(self.clone(), conn)),
                    Err(e) => {
                        self.release_slot();
                        return Err(e);
                    }
                }
            }

            // At the limit: wait for a return, bounded by the deadline.
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::PoolTimeout(timeout));
            }
            if tokio::time::timeout(remaining, self.returned.notified())
                .await
                .is_err()
            {
                return Err(Error::PoolTimeout(timeout));
            }
        }
    }

    /// Discard every idle connection and refuse future `pop`s.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<C::Conn> = {
            let mut idle = self.idle.lock().expect("pool idle lock poisoned");
            std::mem::take(&mut *idle)
        };
        for conn in drained {
            self.release_slot();
            self.connector.close(conn).await;
        }
        self.returned.notify_waiters();
    }

    fn push_back(&self, conn: C::Conn) {
        if self.is_closed() {
            self.release_slot();
            return;
        }
        self.idle.lock().expect("pool idle lock poisoned").push(conn);
        self.returned.notify_one();
    }

    fn release_slot(&self) {
        self.created.fetch_sub(1, Ordering::AcqRel);
        self.returned.notify_one();
    }
}

/// Guard that returns its connection to the pool on drop.
pub struct PooledConn<C: Connector> {
    pool: Arc<Pool<C>>,
    conn: Option<C::Conn>,
    discard: bool,
}

impl<C: Connector> std::fmt::Debug for PooledConn<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConn").field("discard", &self.discard).finish()
    }
}

impl<C: Connector> PooledConn<C> {
    fn new(pool: Arc<Pool<C>>, conn: C::Conn) -> Self {
        Self { pool, conn: Some(conn), discard: false }
    }

    pub fn conn(&mut self) -> &mut C::Conn {
        self.conn.as_mut().expect("connection already taken")
    }

    /// Drop the connection instead of returning it, freeing its slot.
    /// Used after a statement died with a connection-level fault.
    pub fn discard(mut self) {
        self.discard = true;
    }
}

impl<C: Connector> Drop for PooledConn<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.discard {
                self.pool.release_slot();
                drop(conn);
            } else {
                self.pool.push_back(conn);
            }
        }
    }
}
