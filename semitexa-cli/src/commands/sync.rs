//! `sync`: execute the plan, optionally writing the SQL script.

use std::path::Path;

use semitexa_core::db::MySqlAdapter;
use semitexa_core::schema::{SyncEngine, SyncOptions};

use crate::CliApp;

pub async fn run(
    app: &CliApp,
    dry_run: bool,
    allow_destructive: bool,
    output: Option<&Path>,
) -> anyhow::Result<i32> {
    let (declared, errors, _) = super::collect(app);
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("error: {error}");
        }
        return Ok(1);
    }

    let db = MySqlAdapter::new(&app.config);
    let caps = db.capabilities().await?;
    let plan = super::plan_against_live(app, &db, &declared).await?;

    if let Some(path) = output {
        std::fs::write(path, plan.to_script(allow_destructive))?;
        println!("script written to {}", path.display());
    }

    if plan.is_empty() {
        println!("schema is up to date");
        db.close().await;
        return Ok(0);
    }

    let tm = db.transaction_manager();
    let engine = SyncEngine::new(&db)
        .with_transactions(&tm, caps.atomic_ddl)
        .with_audit_root(app.config.root.clone());
    let report = engine
        .execute(&plan, &SyncOptions { allow_destructive, dry_run, require_transaction: false })
        .await?;

    for op in &report.executed {
        let marker = if op.destructive { "!" } else { " " };
        println!("{marker} {}", op.description);
    }
    if dry_run {
        println!("dry run: {} operations would execute", report.executed.len());
    } else {
        println!("{} operations executed", report.executed.len());
    }
    if report.skipped_destructive > 0 {
        println!(
            "{} destructive operations skipped (pass --allow-destructive)",
            report.skipped_destructive
        );
    }
    if let Some(path) = report.audit_json {
        println!("audit: {}", path.display());
    }

    db.close().await;
    Ok(0)
}
