//! Environment-driven configuration.
//!
//! Values resolve defaults-first, then environment variables on top. The
//! recognized keys:
//!
//! | Key | Effect |
//! |-----|--------|
//! | `DB_DRIVER` | driver selector, `mysql` only |
//! | `DB_HOST` / `DB_PORT` | server address (default `127.0.0.1:3306`) |
//! | `DB_DATABASE` | database name (default `semitexa`) |
//! | `DB_USERNAME` / `DB_PASSWORD` | credentials (default `root` / empty) |
//! | `DB_CHARSET` | connection charset (default `utf8mb4`) |
//! | `DB_CLI_HOST` / `DB_CLI_PORT` | overrides outside containers |
//! | `DB_POOL_SIZE` | pool upper bound (default 10) |
//! | `ORM_IGNORE_TABLES` | comma-separated live tables invisible to sync |

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3306;
const DEFAULT_DATABASE: &str = "semitexa";
const DEFAULT_USERNAME: &str = "root";
const DEFAULT_CHARSET: &str = "utf8mb4";
const DEFAULT_POOL_SIZE: usize = 10;

/// Connection and sync configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub charset: String,
    pub pool_size: usize,
    /// How long `pop` waits for a free connection.
    pub acquire_timeout: Duration,
    /// Live tables the comparator must never see.
    pub ignore_tables: HashSet<String>,
    /// Project root; the sync audit trail lands under
    /// `{root}/var/migrations/history/`.
    pub root: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.into(),
            username: DEFAULT_USERNAME.into(),
            password: String::new(),
            charset: DEFAULT_CHARSET.into(),
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: Duration::from_secs(30),
            ignore_tables: HashSet::new(),
            root: PathBuf::from("."),
        }
    }
}

impl DbConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_root(Path::new("/"))
    }

    /// Same as [`from_env`](Self::from_env) with an explicit filesystem
    /// root for the container probe (tests use a temp dir).
    pub fn from_env_with_root(fs_root: &Path) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(driver) = std::env::var("DB_DRIVER") {
            if driver != "mysql" {
                return Err(Error::Validation(format!(
                    "unsupported DB_DRIVER {driver:?}, only mysql is available"
                )));
            }
        }

        apply_env("DB_HOST", &mut config.host);
        apply_env_parsed("DB_PORT", &mut config.port)?;
        apply_env("DB_DATABASE", &mut config.database);
        apply_env("DB_USERNAME", &mut config.username);
        apply_env("DB_PASSWORD", &mut config.password);
        apply_env("DB_CHARSET", &mut config.charset);
        apply_env_parsed("DB_POOL_SIZE", &mut config.pool_size)?;

        // Outside a container the service hostname rarely resolves; the
        // CLI overrides win there and are ignored inside one.
        if !fs_root.join(".dockerenv").exists() {
            apply_env("DB_CLI_HOST", &mut config.host);
            apply_env_parsed("DB_CLI_PORT", &mut config.port)?;
        }

        if let Ok(raw) = std::env::var("ORM_IGNORE_TABLES") {
            config.ignore_tables = parse_ignore_tables(&raw);
        }

        if config.pool_size == 0 {
            return Err(Error::Validation("DB_POOL_SIZE must be at least 1".into()));
        }

        Ok(config)
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Directory the sync audit trail is written to.
    pub fn history_dir(&self) -> PathBuf {
        self.root.join("var").join("migrations").join("history")
    }

    /// Connection target for display, with the password withheld.
    pub fn redacted_dsn(&self) -> String {
        format!(
            "mysql://{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

fn apply_env(key: &str, slot: &mut String) {
    if let Ok(value) = std::env::var(key) {
        *slot = value;
    }
}

fn apply_env_parsed<T: std::str::FromStr>(key: &str, slot: &mut T) -> Result<()> {
    match std::env::var(key) {
        Ok(value) => {
            *slot = value
                .parse()
                .map_err(|_| Error::Validation(format!("{key} has a non-numeric value {value:?}")))?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

fn parse_ignore_tables(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
