//! Migration rendering.
//!
//! Turns a [`Migration`] into the text of its up script, down script and
//! lock file.

use crate::changes::Change;
use crate::dialect::MigrationDialect;
use crate::error::Result;
use crate::lock::LockFile;
use crate::migration::Migration;

/// Marker that starts the comment a manual change renders as.
pub const MANUAL_MARKER: &str = "-- MANUAL CHANGE REQUIRED:";

/// The rendered artifacts of a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMigration {
    /// Forward script.
    pub up: String,
    /// Reverse script.
    pub down: String,
    /// Encoded lock file.
    pub lock: String,
}

/// Renders migrations into SQL scripts for one dialect.
pub struct Renderer<'a> {
    dialect: &'a dyn MigrationDialect,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer for the given dialect.
    #[must_use]
    pub fn new(dialect: &'a dyn MigrationDialect) -> Self {
        Self { dialect }
    }

    /// Renders a migration.
    ///
    /// Returns `None` when the migration has no changes, so no empty
    /// artifacts are produced.
    pub fn render(&self, migration: &Migration) -> Result<Option<RenderedMigration>> {
        if migration.is_empty() {
            return Ok(None);
        }

        Ok(Some(RenderedMigration {
            up: self.render_script(&migration.up),
            down: self.render_script(&migration.down),
            lock: LockFile::encode(&migration.lock)?,
        }))
    }

    /// Renders changes as a script. Statements end with `;`, changes are
    /// separated by a blank line.
    #[must_use]
    pub fn render_script(&self, changes: &[Change]) -> String {
        changes
            .iter()
            .map(|change| self.render_change(change))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_change(&self, change: &Change) -> String {
        let mut out = String::new();

        if matches!(change, Change::Manual(_)) {
            for line in change.to_string().lines() {
                out.push_str(MANUAL_MARKER);
                out.push(' ');
                out.push_str(line);
                out.push('\n');
            }
            return out;
        }

        for statement in change.sql(self.dialect) {
            out.push_str(&statement);
            // Comments emitted by a dialect are not statements.
            if !statement.starts_with("--") {
                out.push(';');
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::schema::{Column, ColumnType, SchemaSnapshot, Table};

    fn sessions() -> Table {
        Table::new("sessions")
            .column(Column::new("id", ColumnType::Uuid).primary_key())
            .column(Column::new("user_id", ColumnType::Uuid))
    }

    #[test]
    fn test_empty_migration_renders_nothing() {
        let dialect = PostgresDialect::new();
        let migration = Migration::new(Vec::new(), SchemaSnapshot::new());
        assert!(Renderer::new(&dialect).render(&migration).unwrap().is_none());
    }

    #[test]
    fn test_render_up_and_down() {
        let dialect = PostgresDialect::new();
        let migration = Migration::new(
            vec![
                Change::create_table(sessions()),
                Change::add_column("users", Column::new("email", ColumnType::Text)),
            ],
            SchemaSnapshot::new().table(sessions()),
        );

        let rendered = Renderer::new(&dialect).render(&migration).unwrap().unwrap();
        assert_eq!(
            rendered.up,
            "CREATE TABLE \"sessions\" (\n  \"id\" UUID PRIMARY KEY,\n  \"user_id\" UUID\n);\n\
             \n\
             ALTER TABLE \"users\" ADD COLUMN \"email\" TEXT;\n"
        );
        assert_eq!(
            rendered.down,
            "ALTER TABLE \"users\" DROP COLUMN \"email\";\n\
             \n\
             DROP TABLE \"sessions\";\n"
        );
        assert_eq!(
            rendered.lock,
            LockFile::encode(&SchemaSnapshot::new().table(sessions())).unwrap()
        );
    }

    #[test]
    fn test_manual_change_renders_as_comment() {
        let dialect = PostgresDialect::new();
        let migration = Migration::new(
            vec![Change::manual(
                "orders",
                Some("status".to_string()),
                "type change text -> integer may lose or reinterpret data",
            )],
            SchemaSnapshot::new(),
        );

        let rendered = Renderer::new(&dialect).render(&migration).unwrap().unwrap();
        assert_eq!(
            rendered.up,
            "-- MANUAL CHANGE REQUIRED: Manual change on 'orders.status': \
             type change text -> integer may lose or reinterpret data\n"
        );
        assert!(rendered.down.starts_with("-- MANUAL CHANGE REQUIRED: "));
        assert!(rendered.down.contains("revert by hand"));
        assert!(!rendered.up.contains("ALTER"));
    }

    #[test]
    fn test_dialect_comments_have_no_terminator() {
        let dialect = SqliteDialect::new();
        let script = Renderer::new(&dialect).render_script(&[Change::alter_column(
            "users",
            Column::new("age", ColumnType::Integer),
            Column::new("age", ColumnType::BigInt),
        )]);

        assert!(script.starts_with("-- MANUAL CHANGE REQUIRED: ALTER COLUMN"));
        assert!(script.ends_with("users.age\n"));
    }

    #[test]
    fn test_multi_line_manual_description() {
        let dialect = PostgresDialect::new();
        let script = Renderer::new(&dialect)
            .render_script(&[Change::manual("t", None, "first line\nsecond line")]);

        assert_eq!(
            script,
            "-- MANUAL CHANGE REQUIRED: Manual change on 't': first line\n\
             -- MANUAL CHANGE REQUIRED: second line\n"
        );
    }
}
