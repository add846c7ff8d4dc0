//! Semitexa command shell.
//!
//! Pure presentation over the core: applications register their resource
//! types and hand control to [`run`] from their own `main`.
//!
//! ```rust,ignore
//! use semitexa_cli::CliApp;
//! use semitexa_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = CliApp::from_env()?
//!         .register::<User>()
//!         .register::<Order>()
//!         .seed::<User>();
//!     std::process::exit(semitexa_cli::run(app).await?);
//! }
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use semitexa_core::config::DbConfig;
use semitexa_core::resource::{Resource, Seeder};
use semitexa_core::schema::SchemaCollector;
use semitexa_core::upsert::SeedRunner;

#[derive(Parser)]
#[command(
    name = "semitexa",
    about = "Schema sync and seed shell for Semitexa applications",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print server, pool and schema status
    Status,
    /// Print pending schema operations without touching the database
    Diff,
    /// Reconcile the database with the declared schema
    Sync {
        /// Build and print the plan without executing it
        #[arg(long)]
        dry_run: bool,

        /// Also execute operations that drop data or narrow types
        #[arg(long)]
        allow_destructive: bool,

        /// Write the generated SQL script to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Upsert every registered defaults() batch
    Seed,
}

/// Everything the shell needs from the application.
pub struct CliApp {
    pub config: DbConfig,
    pub collector: SchemaCollector,
    pub seeds: SeedRunner,
}

impl CliApp {
    /// Configuration from the environment, registries empty.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            config: DbConfig::from_env()?,
            collector: SchemaCollector::new(),
            seeds: SeedRunner::new(),
        })
    }

    pub fn with_config(config: DbConfig) -> Self {
        Self {
            config,
            collector: SchemaCollector::new(),
            seeds: SeedRunner::new(),
        }
    }

    /// Register a resource type for schema collection.
    pub fn register<T: Resource>(mut self) -> Self {
        self.collector = self.collector.register::<T>();
        self
    }

    /// Register a resource type for the seed command.
    pub fn seed<T: Seeder>(mut self) -> Self {
        self.seeds = self.seeds.register::<T>();
        self
    }
}

/// Parse the process arguments and run the selected command. Returns the
/// process exit code.
pub async fn run(app: CliApp) -> anyhow::Result<i32> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => commands::status::run(&app).await,
        Commands::Diff => commands::diff::run(&app).await,
        Commands::Sync { dry_run, allow_destructive, output } => {
            commands::sync::run(&app, dry_run, allow_destructive, output.as_deref()).await
        }
        Commands::Seed => commands::seed::run(&app).await,
    }
}
