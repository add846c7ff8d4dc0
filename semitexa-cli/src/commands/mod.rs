pub mod diff;
pub mod seed;
pub mod status;
pub mod sync;

use semitexa_core::db::MySqlAdapter;
use semitexa_core::schema::{compare, DeclaredSchema, ExecutionPlan, SchemaReader, SyncEngine};

use crate::CliApp;

/// Collect the declared schema, printing warnings; returns the errors
/// alongside so each command can decide how fatal they are.
pub(crate) fn collect(app: &CliApp) -> (DeclaredSchema, Vec<String>, Vec<String>) {
    let collection = app.collector.collect();
    for warning in &collection.warnings {
        println!("warning: {warning}");
    }
    (collection.schema, collection.errors, collection.warnings)
}

/// Read live state and build the plan for the declared schema.
pub(crate) async fn plan_against_live(
    app: &CliApp,
    db: &MySqlAdapter,
    declared: &DeclaredSchema,
) -> anyhow::Result<ExecutionPlan> {
    let live = SchemaReader::new(db, app.config.database.clone())
        .with_ignored_tables(app.config.ignore_tables.iter().cloned())
        .read()
        .await?;
    let diff = compare(declared, &live, &app.config.ignore_tables);
    Ok(SyncEngine::build_plan(declared, &diff))
}
