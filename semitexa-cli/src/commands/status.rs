//! `status`: server, pool and schema overview.

use semitexa_core::db::MySqlAdapter;

use crate::CliApp;

pub async fn run(app: &CliApp) -> anyhow::Result<i32> {
    let (declared, errors, warnings) = super::collect(app);

    let db = MySqlAdapter::new(&app.config);
    let caps = db.capabilities().await?;

    println!("database      {}", app.config.redacted_dsn());
    println!("server        {}", caps.version);
    println!(
        "capabilities  atomic_ddl={} instant_add_column={}",
        caps.atomic_ddl, caps.instant_add_column
    );
    println!(
        "pool          {}/{} connections open",
        db.pool().size(),
        db.pool().limit()
    );
    println!(
        "declared      {} tables, {} columns, {} indexes",
        declared.tables.len(),
        declared.column_count(),
        declared.index_count()
    );
    println!("validation    {} errors, {} warnings", errors.len(), warnings.len());
    for error in &errors {
        println!("error: {error}");
    }

    if errors.is_empty() {
        let plan = super::plan_against_live(app, &db, &declared).await?;
        if plan.is_empty() {
            println!("sync          up to date");
        } else {
            println!(
                "sync          {} operations pending ({} destructive)",
                plan.len(),
                plan.destructive_count()
            );
            for (kind, count) in plan.summary() {
                println!("              {:<18} {count}", kind.as_str());
            }
        }
    } else {
        println!("sync          blocked by validation errors");
    }

    db.close().await;
    Ok(if errors.is_empty() { 0 } else { 1 })
}
