//! `seed`: run every registered defaults() batch through the upsert.

use semitexa_core::db::MySqlAdapter;

use crate::CliApp;

pub async fn run(app: &CliApp) -> anyhow::Result<i32> {
    if app.seeds.is_empty() {
        println!("no seedable resources registered");
        return Ok(0);
    }

    let db = MySqlAdapter::new(&app.config);
    let reports = app.seeds.run(&db).await?;
    for (table, report) in &reports {
        println!(
            "{table}: {} inserted, {} updated, {} unchanged",
            report.inserted, report.updated, report.unchanged
        );
    }
    db.close().await;
    Ok(0)
}
