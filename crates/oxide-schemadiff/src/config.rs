//! Generator configuration.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dialect::{MigrationDialect, PostgresDialect, SqliteDialect};
use crate::lock::{LockFile, DEFAULT_LOCK_FILE};
use crate::store::{DirStore, DEFAULT_FILE_MODE};

/// Supported SQL dialects.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// PostgreSQL.
    #[default]
    #[value(alias = "postgresql")]
    Postgres,
    /// SQLite.
    Sqlite,
}

impl DialectKind {
    /// Returns the dialect implementation.
    #[must_use]
    pub fn dialect(self) -> Box<dyn MigrationDialect> {
        match self {
            Self::Postgres => Box::new(PostgresDialect::new()),
            Self::Sqlite => Box::new(SqliteDialect::new()),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        })
    }
}

/// Where and how migrations are generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Directory holding the scripts and the lock file.
    pub migrations_dir: PathBuf,
    /// Name of the lock file inside the migrations directory.
    pub lock_file: String,
    /// Dialect the scripts are rendered for.
    pub dialect: DialectKind,
    /// Permission bits of written files (unix only).
    pub file_mode: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            lock_file: DEFAULT_LOCK_FILE.to_string(),
            dialect: DialectKind::default(),
            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

impl GeneratorConfig {
    /// Returns the store for the migrations directory.
    #[must_use]
    pub fn store(&self) -> DirStore {
        DirStore::new(&self.migrations_dir).with_mode(self.file_mode)
    }

    /// Returns the lock file.
    #[must_use]
    pub fn lock(&self) -> LockFile {
        LockFile::new(&self.lock_file)
    }
}
