#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use oxide_schemadiff::prelude::*;

/// Fixed clock value used by [`generator`].
pub const NOW: i64 = 1_700_000_000;

pub fn col(name: &str, ty: ColumnType) -> Column {
    Column::new(name, ty)
}

pub fn pk_col(name: &str, ty: ColumnType) -> Column {
    Column::new(name, ty).primary_key()
}

pub fn schema(tables: Vec<Table>) -> SchemaSnapshot {
    tables
        .into_iter()
        .fold(SchemaSnapshot::new(), SchemaSnapshot::table)
}

/// `users(id uuid pk, name text)`.
pub fn users() -> Table {
    Table::new("users")
        .column(pk_col("id", ColumnType::Uuid))
        .column(col("name", ColumnType::Text))
}

/// `sessions(id uuid pk, user_id uuid)`.
pub fn sessions() -> Table {
    Table::new("sessions")
        .column(pk_col("id", ColumnType::Uuid))
        .column(col("user_id", ColumnType::Uuid))
}

/// A generator over `store` whose clock always reads [`NOW`].
pub fn generator<S: ArtifactStore>(name: &str, store: S) -> MigrationGenerator<S> {
    MigrationGenerator::new(name, store, PostgresDialect::new())
        .with_clock(|| Utc.timestamp_opt(NOW, 0).unwrap())
}

/// Applies `changes` to `start` and returns the result.
pub fn replay(start: &SchemaSnapshot, changes: &[Change]) -> SchemaSnapshot {
    let mut state = SchemaState::from_snapshot(start.clone());
    state
        .apply_all(changes)
        .unwrap_or_else(|e| panic!("Failed to replay changes: {e}"));
    state.into_snapshot()
}

/// Kind tag and table of each change, e.g. `create_table:sessions`.
pub fn kinds(changes: &[Change]) -> Vec<String> {
    changes
        .iter()
        .map(|c| {
            let json = serde_json::to_value(c).unwrap();
            format!("{}:{}", json["kind"].as_str().unwrap(), c.table_name())
        })
        .collect()
}
