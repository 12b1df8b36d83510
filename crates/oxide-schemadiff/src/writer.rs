//! Migration writer.
//!
//! [`MigrationGenerator`] ties the pieces together: it loads the lock,
//! diffs it against the desired schema, and writes the down script, the up
//! script and the new lock, in that order. The lock is only replaced once
//! both scripts exist, and scripts written by a failed run are removed
//! again.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::autodetector::{Autodetector, AutodetectorOptions};
use crate::dialect::MigrationDialect;
use crate::error::{ArtifactKind, MigrateError, Result};
use crate::lock::LockFile;
use crate::migration::Migration;
use crate::render::Renderer;
use crate::schema::SchemaSnapshot;
use crate::source::SchemaSource;
use crate::store::ArtifactStore;

static SCRIPT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)_.*\.(?:up|down)\.sql$").expect("script name pattern is valid")
});

/// Normalizes a migration name for use in file names.
///
/// The result is lowercase and only holds `[a-z0-9_]`. Runs of spaces,
/// underscores and hyphens become a single `_`; other characters are
/// dropped. An empty result becomes `auto`.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut separator = false;

    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if separator && !slug.is_empty() {
                slug.push('_');
            }
            separator = false;
            slug.push(ch);
        } else if ch == ' ' || ch == '_' || ch == '-' {
            separator = true;
        }
    }

    if slug.is_empty() {
        "auto".to_string()
    } else {
        slug
    }
}

/// Returns the timestamp prefix of a migration script name.
fn script_timestamp(name: &str) -> Option<i64> {
    SCRIPT_NAME
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Artifacts written by a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenMigration {
    /// Seconds since the epoch used as the script prefix.
    pub timestamp: i64,
    /// Name of the up script.
    pub up: String,
    /// Name of the down script.
    pub down: String,
    /// Name of the lock artifact.
    pub lock: String,
}

/// Result of [`MigrationGenerator::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// The schema matches the lock. Nothing was written.
    NothingToDo,
    /// A migration was written.
    Written(WrittenMigration),
}

/// Removes the artifacts of a run unless it is committed.
struct WriteGuard<'a, S: ArtifactStore + ?Sized> {
    store: &'a S,
    written: Vec<String>,
}

impl<'a, S: ArtifactStore + ?Sized> WriteGuard<'a, S> {
    fn new(store: &'a S) -> Self {
        Self {
            store,
            written: Vec::new(),
        }
    }

    fn create(&mut self, artifact: ArtifactKind, name: &str, contents: &str) -> Result<()> {
        match self.store.create(name, contents.as_bytes()) {
            Ok(()) => {
                debug!("Wrote {} '{}'", artifact, name);
                self.written.push(name.to_string());
                Ok(())
            }
            Err(source) => Err(self.fail(artifact, name, source)),
        }
    }

    fn replace(&mut self, artifact: ArtifactKind, name: &str, contents: &str) -> Result<()> {
        self.store
            .replace(name, contents.as_bytes())
            .map_err(|source| self.fail(artifact, name, source))?;
        debug!("Wrote {} '{}'", artifact, name);
        Ok(())
    }

    /// Rolls back and builds the error for a failed write.
    fn fail(&mut self, artifact: ArtifactKind, name: &str, source: std::io::Error) -> MigrateError {
        let written = self.written.clone();
        let left_behind = self.rollback();
        MigrateError::ArtifactWrite {
            artifact,
            name: name.to_string(),
            written,
            left_behind,
            source,
        }
    }

    /// Removes everything written so far, newest first. Returns the names
    /// that could not be removed.
    fn rollback(&mut self) -> Vec<String> {
        let mut left_behind = Vec::new();
        while let Some(name) = self.written.pop() {
            match self.store.remove(&name) {
                Ok(()) => debug!("Removed '{}'", name),
                Err(e) => {
                    warn!("Could not remove '{}': {}", name, e);
                    left_behind.push(name);
                }
            }
        }
        left_behind
    }

    fn commit(mut self) {
        self.written.clear();
    }
}

impl<S: ArtifactStore + ?Sized> Drop for WriteGuard<'_, S> {
    fn drop(&mut self) {
        if !self.written.is_empty() {
            self.rollback();
        }
    }
}

/// Generates migrations for one migrations directory.
pub struct MigrationGenerator<S: ArtifactStore> {
    name: String,
    store: S,
    dialect: Box<dyn MigrationDialect>,
    lock: LockFile,
    detector: Autodetector,
    clock: Box<dyn Fn() -> DateTime<Utc>>,
}

impl<S: ArtifactStore> MigrationGenerator<S> {
    /// Creates a generator for a migration called `name`.
    pub fn new(
        name: impl Into<String>,
        store: S,
        dialect: impl MigrationDialect + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            dialect: Box::new(dialect),
            lock: LockFile::default(),
            detector: Autodetector::new(),
            clock: Box::new(Utc::now),
        }
    }

    /// Uses a different lock artifact.
    #[must_use]
    pub fn with_lock_file(mut self, lock: LockFile) -> Self {
        self.lock = lock;
        self
    }

    /// Uses a different clock for script timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Uses custom diff options.
    #[must_use]
    pub fn with_options(mut self, options: AutodetectorOptions) -> Self {
        self.detector = Autodetector::with_options(options);
        self
    }

    /// Returns the artifact store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the dialect scripts are rendered for.
    pub fn dialect(&self) -> &dyn MigrationDialect {
        self.dialect.as_ref()
    }

    /// Loads the snapshot recorded by the last generated migration.
    pub fn load_lock(&self) -> Result<SchemaSnapshot> {
        self.lock.load(&self.store)
    }

    /// Builds the migration from the lock to the schema of `source`.
    pub fn build(&self, source: &dyn SchemaSource) -> Result<Migration> {
        let old = self.load_lock()?;
        let new = source.load_schema()?;
        new.validate()
            .map_err(|message| MigrateError::InvalidSchema {
                origin: source.origin(),
                message,
            })?;

        let changes = self.detector.diff(&old, &new)?;
        debug!(
            "Diffed {} locked table(s) against {} table(s) from '{}'",
            old.tables.len(),
            new.tables.len(),
            source.origin()
        );
        Ok(Migration::new(changes, new))
    }

    /// Writes the migration's artifacts.
    ///
    /// An empty migration writes nothing and returns
    /// [`GenerateOutcome::NothingToDo`].
    pub fn generate(&self, migration: &Migration) -> Result<GenerateOutcome> {
        let Some(rendered) = Renderer::new(self.dialect.as_ref()).render(migration)? else {
            info!("No schema changes detected, nothing to generate");
            return Ok(GenerateOutcome::NothingToDo);
        };

        for manual in migration.manual_changes() {
            warn!("{}", manual);
        }

        let timestamp = self.next_timestamp()?;
        let base = format!("{}_{}", timestamp, slugify(&self.name));
        let up = format!("{base}.up.sql");
        let down = format!("{base}.down.sql");
        let lock = self.lock.name().to_string();

        let mut guard = WriteGuard::new(&self.store);
        guard.create(ArtifactKind::DownScript, &down, &rendered.down)?;
        guard.create(ArtifactKind::UpScript, &up, &rendered.up)?;
        guard.replace(ArtifactKind::Lock, &lock, &rendered.lock)?;
        guard.commit();

        info!(
            "Generated migration '{}' with {} change(s)",
            base,
            migration.up.len()
        );

        Ok(GenerateOutcome::Written(WrittenMigration {
            timestamp,
            up,
            down,
            lock,
        }))
    }

    /// Returns the clock's time, bumped past the newest existing script.
    fn next_timestamp(&self) -> Result<i64> {
        let now = (self.clock)().timestamp();
        let latest = self
            .store
            .list()?
            .iter()
            .filter_map(|name| script_timestamp(name))
            .max();

        Ok(match latest {
            Some(latest) if latest >= now => latest + 1,
            _ => now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresDialect;
    use crate::schema::{Column, ColumnType, Table};
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    const NOW: i64 = 1_700_000_000;

    fn generator(store: MemoryStore) -> MigrationGenerator<MemoryStore> {
        MigrationGenerator::new("Add users", store, PostgresDialect::new())
            .with_clock(|| Utc.timestamp_opt(NOW, 0).unwrap())
    }

    fn users() -> SchemaSnapshot {
        SchemaSnapshot::new().table(
            Table::new("users")
                .column(Column::new("id", ColumnType::Uuid).primary_key())
                .column(Column::new("name", ColumnType::Text)),
        )
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add users"), "add_users");
        assert_eq!(slugify("  add--user__email  "), "add_user_email");
        assert_eq!(slugify("Fix: orders (v2)!"), "fix_orders_v2");
        assert_eq!(slugify("a - b"), "a_b");
        assert_eq!(slugify("add\tusers"), "addusers");
        assert_eq!(slugify("add\nusers"), "addusers");
        assert_eq!(slugify("!!!"), "auto");
        assert_eq!(slugify(""), "auto");
    }

    #[test]
    fn test_script_timestamp() {
        assert_eq!(script_timestamp("1700000000_init.up.sql"), Some(NOW));
        assert_eq!(script_timestamp("1700000000_init.down.sql"), Some(NOW));
        assert_eq!(script_timestamp("lock.json"), None);
        assert_eq!(script_timestamp("notes_1.up.sql"), None);
    }

    #[test]
    fn test_generate_writes_three_artifacts() {
        let generator = generator(MemoryStore::new());
        let migration = generator.build(&users()).unwrap();

        let outcome = generator.generate(&migration).unwrap();
        let GenerateOutcome::Written(written) = outcome else {
            panic!("Expected a written migration");
        };

        assert_eq!(written.up, "1700000000_add_users.up.sql");
        assert_eq!(written.down, "1700000000_add_users.down.sql");
        assert_eq!(
            generator.store().names(),
            vec![
                "1700000000_add_users.down.sql",
                "1700000000_add_users.up.sql",
                "lock.json",
            ]
        );
        assert_eq!(generator.load_lock().unwrap(), users());
    }

    #[test]
    fn test_nothing_to_do_writes_nothing() {
        let store = MemoryStore::new();
        store.insert("lock.json", LockFile::encode(&users()).unwrap());
        let generator = generator(store);

        let migration = generator.build(&users()).unwrap();
        assert!(migration.is_empty());
        assert_eq!(
            generator.generate(&migration).unwrap(),
            GenerateOutcome::NothingToDo
        );
        assert_eq!(generator.store().names(), vec!["lock.json"]);
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let store = MemoryStore::new();
        store.insert("1700000005_later.up.sql", "");
        let generator = generator(store);

        let migration = generator.build(&users()).unwrap();
        let GenerateOutcome::Written(written) = generator.generate(&migration).unwrap() else {
            panic!("Expected a written migration");
        };
        assert_eq!(written.timestamp, NOW + 6);
    }

    #[test]
    fn test_failed_up_script_rolls_back_down_script() {
        let store = MemoryStore::new();
        store.fail_writes_ending_with(".up.sql");
        let generator = generator(store);

        let migration = generator.build(&users()).unwrap();
        let err = generator.generate(&migration).unwrap_err();

        match err {
            MigrateError::ArtifactWrite {
                artifact,
                name,
                written,
                left_behind,
                ..
            } => {
                assert_eq!(artifact, ArtifactKind::UpScript);
                assert_eq!(name, "1700000000_add_users.up.sql");
                assert_eq!(written, vec!["1700000000_add_users.down.sql"]);
                assert!(left_behind.is_empty());
            }
            other => panic!("Expected ArtifactWrite, got {other:?}"),
        }
        assert!(generator.store().names().is_empty());
    }

    #[test]
    fn test_failed_lock_keeps_previous_lock() {
        let store = MemoryStore::new();
        store.fail_writes_ending_with("lock.json");
        let generator = generator(store);

        let migration = generator.build(&users()).unwrap();
        let err = generator.generate(&migration).unwrap_err();

        assert!(matches!(
            err,
            MigrateError::ArtifactWrite {
                artifact: ArtifactKind::Lock,
                ..
            }
        ));
        assert!(generator.store().names().is_empty());
    }

    #[test]
    fn test_cleanup_failure_is_reported() {
        let store = MemoryStore::new();
        store.fail_writes_ending_with("lock.json");
        store.fail_removes_ending_with(".down.sql");
        let generator = generator(store);

        let migration = generator.build(&users()).unwrap();
        let err = generator.generate(&migration).unwrap_err();

        match err {
            MigrateError::ArtifactWrite {
                written,
                left_behind,
                ..
            } => {
                assert_eq!(written.len(), 2);
                assert_eq!(left_behind, vec!["1700000000_add_users.down.sql"]);
            }
            other => panic!("Expected ArtifactWrite, got {other:?}"),
        }
        assert_eq!(
            generator.store().names(),
            vec!["1700000000_add_users.down.sql"]
        );
    }

    #[test]
    fn test_build_rejects_invalid_schema() {
        let generator = generator(MemoryStore::new());
        let invalid = SchemaSnapshot::new().table(
            Table::new("posts")
                .column(Column::new("author_id", ColumnType::Uuid).references("users", "id")),
        );

        assert!(matches!(
            generator.build(&invalid),
            Err(MigrateError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_corrupt_lock_aborts_build() {
        let store = MemoryStore::new();
        store.insert("lock.json", "garbage");
        let generator = generator(store);

        assert!(matches!(
            generator.build(&users()),
            Err(MigrateError::CorruptLock { .. })
        ));
    }
}
