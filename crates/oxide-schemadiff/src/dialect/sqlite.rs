//! SQLite dialect for migrations.
//!
//! SQLite has limited ALTER TABLE support: columns cannot change type,
//! nullability or default without recreating the table, so those changes are
//! emitted as manual markers for the developer to complete.

use crate::render::MANUAL_MARKER;
use crate::schema::{Column, ColumnType};

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_name(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt => {
                "INTEGER".to_string()
            }
            // SQLite uses INTEGER for all ints
            ColumnType::SmallSerial | ColumnType::Serial | ColumnType::BigSerial => {
                "INTEGER".to_string()
            }
            ColumnType::Boolean => "INTEGER".to_string(), // SQLite stores booleans as 0/1
            ColumnType::Real | ColumnType::Double => "REAL".to_string(),
            ColumnType::Numeric(_, _) => "NUMERIC".to_string(),
            ColumnType::Text | ColumnType::Varchar(_) | ColumnType::Char(_) => "TEXT".to_string(),
            ColumnType::Date
            | ColumnType::Time
            | ColumnType::Timestamp
            | ColumnType::TimestampTz
            | ColumnType::Interval => "TEXT".to_string(),
            ColumnType::Uuid | ColumnType::Ulid => "TEXT".to_string(),
            ColumnType::Json | ColumnType::Jsonb | ColumnType::Array(_) => "TEXT".to_string(),
            ColumnType::Bytea => "BLOB".to_string(),
        }
    }

    fn alter_column_sql(&self, table: &str, _from: &Column, to: &Column) -> Vec<String> {
        vec![format!(
            "{} ALTER COLUMN not directly supported in SQLite. \
             Table recreation required for: {}.{}",
            MANUAL_MARKER, table, to.name
        )]
    }

    fn auto_increment_keyword(&self) -> Option<&'static str> {
        Some("AUTOINCREMENT")
    }
}
