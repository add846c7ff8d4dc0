//! Sync engine.
//!
//! Builds an ordered [`ExecutionPlan`] from a [`SchemaDiff`] and applies
//! it. The plan order guarantees no reference goes live before its target:
//! creates first (topologically over BelongsTo edges), then column work,
//! then constraint/index adds, then the destructive tail with two-phase
//! drops. On servers with atomic DDL the selected operations run inside
//! one transaction; destructive operations only run when explicitly
//! allowed and are silently omitted otherwise.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::db::{DatabaseAdapter, TransactionManager};
use crate::error::{Error, Result};

use super::comparator::SchemaDiff;
use super::{ddl, DeclaredSchema};

/// What one DDL statement does, for audit and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlKind {
    CreateTable,
    AddColumn,
    AlterColumn,
    AddForeignKey,
    AddIndex,
    DropIndex,
    DeprecateColumn,
    DropColumn,
    DropForeignKey,
    DeprecateTable,
    DropTable,
}

impl DdlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTable => "create_table",
            Self::AddColumn => "add_column",
            Self::AlterColumn => "alter_column",
            Self::AddForeignKey => "add_foreign_key",
            Self::AddIndex => "add_index",
            Self::DropIndex => "drop_index",
            Self::DeprecateColumn => "deprecate_column",
            Self::DropColumn => "drop_column",
            Self::DropForeignKey => "drop_foreign_key",
            Self::DeprecateTable => "deprecate_table",
            Self::DropTable => "drop_table",
        }
    }
}

/// One planned DDL statement.
#[derive(Debug, Clone)]
pub struct DdlOperation {
    pub sql: String,
    pub kind: DdlKind,
    pub table: String,
    pub destructive: bool,
    pub description: String,
}

impl DdlOperation {
    /// The shape persisted in the `.json` audit file.
    pub fn audit_value(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.kind.as_str(),
            "table": self.table,
            "destructive": self.destructive,
            "description": self.description,
            "sql": self.sql,
        })
    }
}

/// Ordered sequence of DDL operations for one sync run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub operations: Vec<DdlOperation>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Operations that will actually run under the given gate.
    pub fn selected(&self, allow_destructive: bool) -> Vec<&DdlOperation> {
        self.operations
            .iter()
            .filter(|op| allow_destructive || !op.destructive)
            .collect()
    }

    pub fn destructive_count(&self) -> usize {
        self.operations.iter().filter(|op| op.destructive).count()
    }

    /// Pending operations grouped by kind, in plan order.
    pub fn summary(&self) -> Vec<(DdlKind, usize)> {
        let mut out: Vec<(DdlKind, usize)> = Vec::new();
        for op in &self.operations {
            match out.iter_mut().find(|(kind, _)| *kind == op.kind) {
                Some((_, count)) => *count += 1,
                None => out.push((op.kind, 1)),
            }
        }
        out
    }

    /// The plan as a runnable SQL script.
    pub fn to_script(&self, allow_destructive: bool) -> String {
        let mut script = String::new();
        for op in self.selected(allow_destructive) {
            script.push_str("-- ");
            script.push_str(&op.description);
            script.push('\n');
            script.push_str(&op.sql);
            script.push_str(";\n\n");
        }
        script
    }
}

/// Execution switches for one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub allow_destructive: bool,
    pub dry_run: bool,
    /// Fail with a capability error instead of falling back to
    /// statement-at-a-time execution when atomic DDL is unavailable.
    pub require_transaction: bool,
}

/// Outcome of one executed sync run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub executed: Vec<DdlOperation>,
    pub skipped_destructive: usize,
    pub audit_json: Option<PathBuf>,
    pub audit_sql: Option<PathBuf>,
}

/// Builds plans and applies them through the adapter.
pub struct SyncEngine<'a> {
    db: &'a dyn DatabaseAdapter,
    tx: Option<&'a TransactionManager>,
    atomic_ddl: bool,
    audit_root: Option<PathBuf>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(db: &'a dyn DatabaseAdapter) -> Self {
        Self { db, tx: None, atomic_ddl: false, audit_root: None }
    }

    /// Enable transactional execution (requires atomic DDL on the server).
    pub fn with_transactions(mut self, tx: &'a TransactionManager, atomic_ddl: bool) -> Self {
        self.tx = Some(tx);
        self.atomic_ddl = atomic_ddl;
        self
    }

    /// Write the audit trail under `{root}/var/migrations/history/`.
    pub fn with_audit_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.audit_root = Some(root.into());
        self
    }

    /// Turn a diff into the fixed-order execution plan.
    pub fn build_plan(declared: &DeclaredSchema, diff: &SchemaDiff) -> ExecutionPlan {
        let mut plan = ExecutionPlan::default();

        // 1. CREATE TABLE, topologically over BelongsTo dependencies.
        let created: HashSet<&str> = diff.create_tables.iter().map(String::as_str).collect();
        for name in topo_create_order(&diff.create_tables, declared) {
            let Some(table) = declared.table(&name) else { continue };
            plan.operations.push(DdlOperation {
                sql: ddl::create_table(table),
                kind: DdlKind::CreateTable,
                table: name.clone(),
                destructive: false,
                description: format!("create table {name}"),
            });
        }

        // 2. ADD COLUMN.
        for (table_name, column_name) in &diff.add_columns {
            let Some(column) = declared
                .table(table_name)
                .and_then(|t| t.columns.get(column_name))
            else {
                continue;
            };
            plan.operations.push(DdlOperation {
                sql: ddl::add_column(table_name, column),
                kind: DdlKind::AddColumn,
                table: table_name.clone(),
                destructive: false,
                description: format!("add column {table_name}.{column_name}"),
            });
        }

        // 3. ALTER COLUMN, full rebuilt definition from the declaration.
        for alter in &diff.alter_columns {
            let Some(column) = declared
                .table(&alter.table)
                .and_then(|t| t.columns.get(&alter.column))
            else {
                continue;
            };
            plan.operations.push(DdlOperation {
                sql: ddl::modify_column(&alter.table, column),
                kind: DdlKind::AlterColumn,
                table: alter.table.clone(),
                destructive: alter.destructive,
                description: format!(
                    "alter column {}.{} ({})",
                    alter.table,
                    alter.column,
                    alter.changes.join(", ")
                ),
            });
        }

        // 4. ADD FOREIGN KEY: diffed adds, plus every constraint of a
        // freshly created table (the comparator never saw those).
        let mut fk_adds = diff.add_foreign_keys.clone();
        for name in &diff.create_tables {
            if let Some(table) = declared.table(name) {
                fk_adds.extend(table.foreign_keys.iter().cloned());
            }
        }
        for fk in &fk_adds {
            // A created table's FK may point at another created table;
            // by now every CREATE is already in the plan.
            if !created.contains(fk.referenced_table.as_str())
                && !declared.tables.contains_key(&fk.referenced_table)
            {
                continue;
            }
            plan.operations.push(DdlOperation {
                sql: ddl::add_foreign_key(fk),
                kind: DdlKind::AddForeignKey,
                table: fk.table.clone(),
                destructive: false,
                description: format!("add foreign key {}", fk.constraint_name()),
            });
        }

        // 5. ADD INDEX.
        for (table_name, index) in &diff.add_indexes {
            plan.operations.push(DdlOperation {
                sql: ddl::add_index(table_name, index),
                kind: DdlKind::AddIndex,
                table: table_name.clone(),
                destructive: false,
                description: format!(
                    "add index {} on {table_name}",
                    index.resolved_name(table_name)
                ),
            });
        }

        // 6. DROP INDEX.
        for (table_name, index_name) in &diff.drop_indexes {
            plan.operations.push(DdlOperation {
                sql: ddl::drop_index(table_name, index_name),
                kind: DdlKind::DropIndex,
                table: table_name.clone(),
                destructive: true,
                description: format!("drop index {index_name} on {table_name}"),
            });
        }

        // 7. DROP COLUMN, two-phase over the sentinel comment.
        for (table_name, live_column) in &diff.drop_columns {
            if live_column.is_deprecated() {
                plan.operations.push(DdlOperation {
                    sql: ddl::drop_column(table_name, &live_column.name),
                    kind: DdlKind::DropColumn,
                    table: table_name.clone(),
                    destructive: true,
                    description: format!("drop column {table_name}.{}", live_column.name),
                });
            } else {
                plan.operations.push(DdlOperation {
                    sql: ddl::deprecate_column(table_name, live_column),
                    kind: DdlKind::DeprecateColumn,
                    table: table_name.clone(),
                    destructive: false,
                    description: format!(
                        "mark column {table_name}.{} deprecated",
                        live_column.name
                    ),
                });
            }
        }

        // 8. DROP FOREIGN KEY.
        for (table_name, constraint) in &diff.drop_foreign_keys {
            plan.operations.push(DdlOperation {
                sql: ddl::drop_foreign_key(table_name, constraint),
                kind: DdlKind::DropForeignKey,
                table: table_name.clone(),
                destructive: true,
                description: format!("drop foreign key {constraint} on {table_name}"),
            });
        }

        // 9. DROP TABLE, two-phase over the table comment.
        for live_table in &diff.drop_tables {
            if live_table.is_deprecated() {
                plan.operations.push(DdlOperation {
                    sql: ddl::drop_table(&live_table.name),
                    kind: DdlKind::DropTable,
                    table: live_table.name.clone(),
                    destructive: true,
                    description: format!("drop table {}", live_table.name),
                });
            } else {
                plan.operations.push(DdlOperation {
                    sql: ddl::deprecate_table(&live_table.name),
                    kind: DdlKind::DeprecateTable,
                    table: live_table.name.clone(),
                    destructive: false,
                    description: format!("mark table {} deprecated", live_table.name),
                });
            }
        }

        plan
    }

    /// Apply the plan under the given options.
    pub async fn execute(&self, plan: &ExecutionPlan, options: &SyncOptions) -> Result<SyncReport> {
        let selected: Vec<DdlOperation> = plan
            .selected(options.allow_destructive)
            .into_iter()
            .cloned()
            .collect();
        let skipped = plan.len() - selected.len();

        let mut report = SyncReport {
            executed: Vec::new(),
            skipped_destructive: skipped,
            audit_json: None,
            audit_sql: None,
        };

        if options.dry_run || selected.is_empty() {
            report.executed = selected;
            return Ok(report);
        }

        let transactional = self.atomic_ddl && self.tx.is_some();
        if !transactional && options.require_transaction {
            return Err(Error::Capability(
                "transactional DDL requested but the server lacks atomic DDL".into(),
            ));
        }

        if transactional {
            let manager = self.tx.expect("transactional path without manager");
            let tx = manager.begin().await?;
            for op in &selected {
                log::info!("sync: {}", op.description);
                if let Err(err) = tx.query(&op.sql).await {
                    if let Err(rollback_err) = tx.rollback().await {
                        log::error!("rollback failed after {err}: {rollback_err}");
                    }
                    return Err(err);
                }
            }
            tx.commit().await?;
        } else {
            // No transaction: apply one at a time, report what ran before
            // a failure and bail with the original error.
            for (i, op) in selected.iter().enumerate() {
                log::info!("sync: {}", op.description);
                if let Err(err) = self.db.query(&op.sql).await {
                    for applied in &selected[..i] {
                        log::warn!("applied before failure: {}", applied.description);
                    }
                    return Err(err);
                }
            }
        }

        report.executed = selected;

        if let Some(root) = &self.audit_root {
            let (json_path, sql_path) = write_audit(root, &report.executed)?;
            report.audit_json = Some(json_path);
            report.audit_sql = Some(sql_path);
        }

        Ok(report)
    }
}

/// CREATE order: dependencies first, cycles tolerated by passing over
/// in-progress nodes (their constraints land in the ADD FK phase anyway).
fn topo_create_order(create_tables: &[String], declared: &DeclaredSchema) -> Vec<String> {
    struct Walk<'s> {
        declared: &'s DeclaredSchema,
        create_set: HashSet<&'s str>,
        done: HashSet<String>,
        in_progress: HashSet<String>,
        ordered: Vec<String>,
    }

    impl Walk<'_> {
        fn visit(&mut self, name: &str) {
            if self.done.contains(name) || self.in_progress.contains(name) {
                return;
            }
            self.in_progress.insert(name.to_string());
            if let Some(table) = self.declared.table(name) {
                for dep in table.belongs_to_targets() {
                    if self.create_set.contains(dep) && dep != name {
                        self.visit(dep);
                    }
                }
            }
            self.in_progress.remove(name);
            self.done.insert(name.to_string());
            self.ordered.push(name.to_string());
        }
    }

    let mut walk = Walk {
        declared,
        create_set: create_tables.iter().map(String::as_str).collect(),
        done: HashSet::new(),
        in_progress: HashSet::new(),
        ordered: Vec::new(),
    };
    for name in create_tables {
        walk.visit(name);
    }
    walk.ordered
}

/// Write the `.json` and `.sql` audit files, timestamped to millisecond
/// precision. Missing directories are created.
fn write_audit(root: &Path, executed: &[DdlOperation]) -> Result<(PathBuf, PathBuf)> {
    let dir = root.join("var").join("migrations").join("history");
    std::fs::create_dir_all(&dir)?;

    let now = chrono::Local::now();
    let stamp = now.format("%Y-%m-%d_%H-%M-%S%.3f").to_string();
    let json_path = dir.join(format!("{stamp}_sync.json"));
    let sql_path = dir.join(format!("{stamp}_sync.sql"));

    let operations: Vec<serde_json::Value> =
        executed.iter().map(DdlOperation::audit_value).collect();
    let document = serde_json::json!({
        "timestamp": now.to_rfc3339(),
        "operations_count": executed.len(),
        "operations": operations,
    });
    std::fs::write(&json_path, serde_json::to_string_pretty(&document).expect("audit json"))?;

    let mut script = String::new();
    for op in executed {
        script.push_str("-- ");
        script.push_str(&op.description);
        script.push('\n');
        script.push_str(&op.sql);
        script.push_str(";\n\n");
    }
    std::fs::write(&sql_path, script)?;

    log::info!("sync audit written to {}", json_path.display());
    Ok((json_path, sql_path))
}
