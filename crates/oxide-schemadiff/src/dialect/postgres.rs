//! PostgreSQL dialect for migrations.

use super::MigrationDialect;
use crate::schema::{Column, ColumnType};

/// PostgreSQL dialect for migration SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MigrationDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn type_name(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::SmallSerial => "SMALLSERIAL".to_string(),
            ColumnType::Serial => "SERIAL".to_string(),
            ColumnType::BigSerial => "BIGSERIAL".to_string(),
            ColumnType::Real => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Numeric(p, s) => format!("NUMERIC({p}, {s})"),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Varchar(n) => format!("VARCHAR({n})"),
            ColumnType::Char(n) => format!("CHAR({n})"),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::TimestampTz => "TIMESTAMPTZ".to_string(),
            ColumnType::Interval => "INTERVAL".to_string(),
            // ULIDs are stored in uuid columns
            ColumnType::Uuid | ColumnType::Ulid => "UUID".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Jsonb => "JSONB".to_string(),
            ColumnType::Bytea => "BYTEA".to_string(),
            ColumnType::Array(inner) => format!("{}[]", self.type_name(inner)),
        }
    }

    fn alter_column_sql(&self, table: &str, from: &Column, to: &Column) -> Vec<String> {
        let table = self.quote_identifier(table);
        let column = self.quote_identifier(&to.name);
        let mut sql = Vec::new();

        if from.ty != to.ty {
            sql.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                table,
                column,
                self.type_name(&to.ty)
            ));
        }

        if from.default != to.default {
            sql.push(match &to.default {
                Some(expr) => format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                    table, column, expr
                ),
                None => format!("ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT", table, column),
            });
        }

        if from.nullable != to.nullable {
            if to.nullable {
                sql.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
                    table, column
                ));
            } else {
                // Existing NULLs would make SET NOT NULL fail.
                if let Some(expr) = &to.default {
                    sql.push(format!(
                        "UPDATE {} SET {} = {} WHERE {} IS NULL",
                        table, column, expr, column
                    ));
                }
                sql.push(format!("ALTER TABLE {} ALTER COLUMN {} SET NOT NULL", table, column));
            }
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::Change;
    use crate::schema::{Index, Table};

    fn dialect() -> PostgresDialect {
        PostgresDialect::new()
    }

    #[test]
    fn test_create_table_inline_primary_key() {
        let table = Table::new("sessions")
            .column(Column::new("id", ColumnType::Uuid).primary_key())
            .column(
                Column::new("user_id", ColumnType::Uuid)
                    .not_null()
                    .references("users", "id"),
            )
            .column(
                Column::new("created_at", ColumnType::TimestampTz)
                    .not_null()
                    .default("now()"),
            );

        let sql = dialect().generate_sql(&Change::create_table(table));
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE \"sessions\" (\n  \
                 \"id\" UUID PRIMARY KEY,\n  \
                 \"user_id\" UUID NOT NULL REFERENCES \"users\" (\"id\"),\n  \
                 \"created_at\" TIMESTAMPTZ NOT NULL DEFAULT now()\n)"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_create_table_composite_primary_key() {
        let table = Table::new("memberships")
            .column(Column::new("user_id", ColumnType::Uuid).primary_key())
            .column(Column::new("group_id", ColumnType::Uuid).primary_key());

        let sql = dialect().create_table_sql(&table);
        assert!(sql.contains("\"user_id\" UUID NOT NULL,"));
        assert!(sql.ends_with("PRIMARY KEY (\"user_id\", \"group_id\")\n)"));
    }

    #[test]
    fn test_alter_column_type_widening() {
        let sql = dialect().alter_column_sql(
            "users",
            &Column::new("age", ColumnType::Integer),
            &Column::new("age", ColumnType::BigInt),
        );
        assert_eq!(
            sql,
            vec!["ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE BIGINT".to_string()]
        );
    }

    #[test]
    fn test_alter_column_set_not_null_backfills_default() {
        let sql = dialect().alter_column_sql(
            "users",
            &Column::new("active", ColumnType::Boolean),
            &Column::new("active", ColumnType::Boolean)
                .not_null()
                .default("TRUE"),
        );
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"users\" ALTER COLUMN \"active\" SET DEFAULT TRUE".to_string(),
                "UPDATE \"users\" SET \"active\" = TRUE WHERE \"active\" IS NULL".to_string(),
                "ALTER TABLE \"users\" ALTER COLUMN \"active\" SET NOT NULL".to_string(),
            ]
        );
    }

    #[test]
    fn test_alter_column_drop_not_null_and_default() {
        let sql = dialect().alter_column_sql(
            "users",
            &Column::new("nickname", ColumnType::Text)
                .not_null()
                .default("''"),
            &Column::new("nickname", ColumnType::Text),
        );
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"users\" ALTER COLUMN \"nickname\" DROP DEFAULT".to_string(),
                "ALTER TABLE \"users\" ALTER COLUMN \"nickname\" DROP NOT NULL".to_string(),
            ]
        );
    }

    #[test]
    fn test_index_sql() {
        let index = Index::new("idx_users_email", ["email"]).unique();
        assert_eq!(
            dialect().generate_sql(&Change::add_index("users", index.clone())),
            vec!["CREATE UNIQUE INDEX \"idx_users_email\" ON \"users\" (\"email\")".to_string()]
        );
        assert_eq!(
            dialect().generate_sql(&Change::drop_index("users", index)),
            vec!["DROP INDEX \"idx_users_email\"".to_string()]
        );
    }

    #[test]
    fn test_manual_change_has_no_sql() {
        let change = Change::manual("orders", None, "write this by hand");
        assert!(dialect().generate_sql(&change).is_empty());
    }

    #[test]
    fn test_type_names() {
        let d = dialect();
        assert_eq!(d.type_name(&ColumnType::Double), "DOUBLE PRECISION");
        assert_eq!(d.type_name(&ColumnType::Ulid), "UUID");
        assert_eq!(d.type_name(&ColumnType::Numeric(10, 2)), "NUMERIC(10, 2)");
        assert_eq!(
            d.type_name(&ColumnType::array(ColumnType::Varchar(20))),
            "VARCHAR(20)[]"
        );
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(dialect().quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
