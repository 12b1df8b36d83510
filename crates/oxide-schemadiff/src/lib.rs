//! Schema diffing and migration generation for Rust.
//!
//! `oxide-schemadiff` compares the schema your models describe with the
//! snapshot recorded by the last generated migration, and writes the SQL
//! that gets a database from one to the other:
//! - Every difference becomes a typed [`Change`](changes::Change),
//!   classified as safe, destructive or manual
//! - Changes that could lose data are never scripted; they are written out
//!   as comments for a human to complete
//! - Each migration comes with a down script and an updated lock file
//! - SQL generation is dialect-aware (PostgreSQL, SQLite)
//!
//! # Architecture
//!
//! - **Schema** - Tables, columns, indexes and the type widening rules
//! - **Lock** - The recorded snapshot the next run diffs against
//! - **Autodetector** - Diffs two snapshots into an ordered change list
//! - **Render** - Turns a migration into up/down SQL and lock text
//! - **Writer** - Names, writes and rolls back migration artifacts
//! - **Dialect** - Database-specific SQL generation
//!
//! # Example
//!
//! ```rust
//! use oxide_schemadiff::prelude::*;
//!
//! let schema = SchemaSnapshot::new().table(
//!     Table::new("users")
//!         .column(Column::new("id", ColumnType::Uuid).primary_key())
//!         .column(Column::new("email", ColumnType::Varchar(255)).not_null()),
//! );
//!
//! let generator = MigrationGenerator::new("create users", MemoryStore::new(), PostgresDialect::new());
//! let migration = generator.build(&schema)?;
//! assert_eq!(migration.up.len(), 1);
//!
//! match generator.generate(&migration)? {
//!     GenerateOutcome::Written(written) => assert!(written.up.ends_with("_create_users.up.sql")),
//!     GenerateOutcome::NothingToDo => unreachable!(),
//! }
//! # Ok::<(), oxide_schemadiff::error::MigrateError>(())
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show what would change
//! oxide-schemadiff diff --schema schema.json
//!
//! # Write the next migration into ./migrations
//! oxide-schemadiff generate --schema schema.json --name "add sessions"
//!
//! # Show the recorded schema
//! oxide-schemadiff lock
//! ```

pub mod autodetector;
pub mod changes;
pub mod config;
pub mod dialect;
pub mod error;
pub mod lock;
pub mod migration;
pub mod render;
pub mod report;
pub mod schema;
pub mod source;
pub mod state;
pub mod store;
pub mod writer;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::autodetector::{Autodetector, AutodetectorOptions};
    pub use crate::changes::{Change, ManualChange, Risk};
    pub use crate::config::{DialectKind, GeneratorConfig};
    pub use crate::dialect::{MigrationDialect, PostgresDialect, SqliteDialect};
    pub use crate::error::{ArtifactKind, MigrateError, Result};
    pub use crate::lock::LockFile;
    pub use crate::migration::Migration;
    pub use crate::render::{RenderedMigration, Renderer};
    pub use crate::schema::{Column, ColumnType, Index, Reference, SchemaSnapshot, Table};
    pub use crate::source::{JsonSchemaFile, SchemaSource};
    pub use crate::state::SchemaState;
    pub use crate::store::{ArtifactStore, DirStore, MemoryStore};
    pub use crate::writer::{slugify, GenerateOutcome, MigrationGenerator, WrittenMigration};
}
