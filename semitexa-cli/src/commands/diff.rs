//! `diff`: print pending operations without touching anything.

use semitexa_core::db::MySqlAdapter;

use crate::CliApp;

pub async fn run(app: &CliApp) -> anyhow::Result<i32> {
    let (declared, errors, _) = super::collect(app);
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("error: {error}");
        }
        return Ok(1);
    }

    let db = MySqlAdapter::new(&app.config);
    let plan = super::plan_against_live(app, &db, &declared).await?;
    db.close().await;

    if plan.is_empty() {
        println!("schema is up to date");
        return Ok(0);
    }

    for op in &plan.operations {
        let marker = if op.destructive { "!" } else { " " };
        println!("{marker} {:<18} {}", op.kind.as_str(), op.description);
    }
    println!(
        "{} operations pending ({} destructive, run sync --allow-destructive to apply those)",
        plan.len(),
        plan.destructive_count()
    );
    Ok(0)
}
