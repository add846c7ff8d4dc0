//! Smart upsert and the seed runner.
//!
//! One batch is one `INSERT ... ON DUPLICATE KEY UPDATE` statement. There
//! is deliberately no SELECT-probe variant: probing and then writing
//! leaves a window where a concurrent writer invalidates the probe, and
//! the single atomic statement closes it.

use futures::future::BoxFuture;

use crate::db::DatabaseAdapter;
use crate::error::{Error, Result};
use crate::hydrate::dehydrate;
use crate::resource::{Resource, Seeder};
use crate::value::SqlValue;

/// Per-batch outcome, derived from the server's affected-row count by
/// MySQL's convention: +1 per inserted row, +2 per updated row, +0 per
/// unchanged row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertReport {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

impl UpsertReport {
    /// `updated = max(0, A − N)`, `inserted = max(0, A − 2·updated)`,
    /// `unchanged = N − inserted − updated`.
    pub fn from_affected(supplied: u64, affected: u64) -> Self {
        let n = supplied as i64;
        let a = affected as i64;
        let updated = (a - n).max(0);
        let inserted = (a - 2 * updated).max(0);
        let unchanged = (n - inserted - updated).max(0);
        Self {
            inserted: inserted as u64,
            updated: updated as u64,
            unchanged: unchanged as u64,
        }
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }
}

/// Write a batch of resources in one atomic statement.
///
/// Every row must carry its primary key value; every non-PK column
/// appears on both sides of the update list.
pub async fn upsert<T: Resource>(db: &dyn DatabaseAdapter, items: &[T]) -> Result<UpsertReport> {
    if items.is_empty() {
        return Ok(UpsertReport::default());
    }

    let meta = T::metadata();
    let columns = &meta.column_order;

    let mut params: Vec<SqlValue> = Vec::with_capacity(items.len() * columns.len());
    for item in items {
        let mut values = dehydrate(item);
        if values
            .get(&meta.pk_column)
            .map_or(true, SqlValue::is_null)
        {
            return Err(Error::BadQuery(format!(
                "upsert into {} requires a primary key value on every row",
                meta.table
            )));
        }
        for column in columns {
            params.push(values.swap_remove(column).unwrap_or(SqlValue::Null));
        }
    }

    let column_list = columns
        .iter()
        .map(|c| format!("`{c}`"))
        .collect::<Vec<_>>()
        .join(", ");
    let row_marks = format!("({})", vec!["?"; columns.len()].join(", "));
    let values_list = vec![row_marks; items.len()].join(", ");

    let non_pk = meta.non_pk_columns();
    let update_list = if non_pk.is_empty() {
        // Degenerate all-PK table; the assignment is a no-op by design.
        format!("`{0}` = `{0}`", meta.pk_column)
    } else {
        non_pk
            .iter()
            .map(|c| format!("`{c}` = VALUES(`{c}`)"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let sql = format!(
        "INSERT INTO `{}` ({column_list}) VALUES {values_list} ON DUPLICATE KEY UPDATE {update_list}",
        meta.table
    );

    let result = db.execute(&sql, &params).await?;
    let report = UpsertReport::from_affected(items.len() as u64, result.affected_rows);
    log::debug!(
        "upsert {}: {} inserted, {} updated, {} unchanged",
        meta.table,
        report.inserted,
        report.updated,
        report.unchanged
    );
    Ok(report)
}

trait ErasedSeeder: Send + Sync {
    fn table(&self) -> &str;
    fn run<'a>(&'a self, db: &'a dyn DatabaseAdapter) -> BoxFuture<'a, Result<UpsertReport>>;
}

struct TypedSeeder<T> {
    table: String,
    _resource: std::marker::PhantomData<fn() -> T>,
}

impl<T: Seeder> ErasedSeeder for TypedSeeder<T> {
    fn table(&self) -> &str {
        &self.table
    }

    fn run<'a>(&'a self, db: &'a dyn DatabaseAdapter) -> BoxFuture<'a, Result<UpsertReport>> {
        Box::pin(async move {
            let rows = T::defaults();
            upsert(db, &rows).await
        })
    }
}

/// Runs every registered `defaults()` batch through the smart upsert.
#[derive(Default)]
pub struct SeedRunner {
    jobs: Vec<Box<dyn ErasedSeeder>>,
}

impl SeedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Register a seedable resource type.
    pub fn register<T: Seeder>(mut self) -> Self {
        self.jobs.push(Box::new(TypedSeeder::<T> {
            table: T::metadata().table.clone(),
            _resource: std::marker::PhantomData,
        }));
        self
    }

    /// Seed every table, returning per-table counts in registration order.
    pub async fn run(&self, db: &dyn DatabaseAdapter) -> Result<Vec<(String, UpsertReport)>> {
        let mut reports = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            let report = job.run(db).await?;
            log::info!(
                "seeded {}: {} inserted, {} updated, {} unchanged",
                job.table(),
                report.inserted,
                report.updated,
                report.unchanged
            );
            reports.push((job.table().to_string(), report));
        }
        Ok(reports)
    }
}
