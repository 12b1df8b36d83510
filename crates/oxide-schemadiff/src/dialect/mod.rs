//! Database dialect implementations.
//!
//! Each dialect knows how to generate SQL for schema changes specific to
//! that database system.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::changes::Change;
use crate::schema::{Column, ColumnType, Index, Table};

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the SQL type name for the given type.
    fn type_name(&self, ty: &ColumnType) -> String;

    /// Generates the statements that change a column from `from` to `to`.
    fn alter_column_sql(&self, table: &str, from: &Column, to: &Column) -> Vec<String>;

    /// Returns the auto-increment keyword for serial primary keys, if the
    /// dialect needs one.
    fn auto_increment_keyword(&self) -> Option<&'static str> {
        None
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Generates column definition SQL.
    ///
    /// `inline_primary_key` is set when the column is the table's only
    /// primary key column.
    fn column_definition(&self, column: &Column, inline_primary_key: bool) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.ty),
        ];

        if inline_primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.ty.is_serial() {
                if let Some(keyword) = self.auto_increment_keyword() {
                    parts.push(keyword.to_string());
                }
            }
        } else if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(ref default) = column.default {
            parts.push(format!("DEFAULT {}", default));
        }

        if let Some(ref reference) = column.references {
            parts.push(format!(
                "REFERENCES {} ({})",
                self.quote_identifier(&reference.table),
                self.quote_identifier(&reference.column)
            ));
        }

        parts.join(" ")
    }

    /// Generates SQL for creating a table.
    fn create_table_sql(&self, table: &Table) -> String {
        let primary_key = table.primary_key();
        let inline = primary_key.len() == 1;

        let mut defs: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c, inline && c.primary_key))
            .collect();

        // Composite primary key
        if primary_key.len() > 1 {
            let quoted: Vec<String> = primary_key
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect();
            defs.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }

        format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&table.name),
            defs.join(",\n  ")
        )
    }

    /// Generates SQL for creating an index.
    fn create_index_sql(&self, table: &str, index: &Index) -> String {
        let quoted: Vec<String> = index
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            quoted.join(", ")
        )
    }

    /// Generates SQL for dropping an index.
    fn drop_index_sql(&self, _table: &str, index: &Index) -> String {
        format!("DROP INDEX {}", self.quote_identifier(&index.name))
    }

    /// Generates SQL for a schema change.
    ///
    /// Manual changes produce no statements.
    fn generate_sql(&self, change: &Change) -> Vec<String> {
        match change {
            Change::CreateTable { table } => vec![self.create_table_sql(table)],

            Change::DropTable { table } => {
                vec![format!("DROP TABLE {}", self.quote_identifier(&table.name))]
            }

            Change::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.quote_identifier(table),
                self.column_definition(column, column.primary_key)
            )],

            Change::DropColumn { table, column } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.quote_identifier(table),
                self.quote_identifier(&column.name)
            )],

            Change::AlterColumn { table, from, to } => self.alter_column_sql(table, from, to),

            Change::AddIndex { table, index } => vec![self.create_index_sql(table, index)],

            Change::DropIndex { table, index } => vec![self.drop_index_sql(table, index)],

            Change::Manual(_) => Vec::new(),
        }
    }
}

impl<D: MigrationDialect + ?Sized> MigrationDialect for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn type_name(&self, ty: &ColumnType) -> String {
        (**self).type_name(ty)
    }

    fn alter_column_sql(&self, table: &str, from: &Column, to: &Column) -> Vec<String> {
        (**self).alter_column_sql(table, from, to)
    }

    fn auto_increment_keyword(&self) -> Option<&'static str> {
        (**self).auto_increment_keyword()
    }

    fn quote_identifier(&self, name: &str) -> String {
        (**self).quote_identifier(name)
    }

    fn column_definition(&self, column: &Column, inline_primary_key: bool) -> String {
        (**self).column_definition(column, inline_primary_key)
    }

    fn create_table_sql(&self, table: &Table) -> String {
        (**self).create_table_sql(table)
    }

    fn create_index_sql(&self, table: &str, index: &Index) -> String {
        (**self).create_index_sql(table, index)
    }

    fn drop_index_sql(&self, table: &str, index: &Index) -> String {
        (**self).drop_index_sql(table, index)
    }

    fn generate_sql(&self, change: &Change) -> Vec<String> {
        (**self).generate_sql(change)
    }
}
