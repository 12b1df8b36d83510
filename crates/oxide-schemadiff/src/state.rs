//! Schema replay.
//!
//! [`SchemaState`] applies changes to a snapshot at the descriptor level,
//! the way a database would apply the generated SQL. It is how generated
//! change lists are checked: replaying the up list on the old snapshot must
//! give the new one, and replaying an inverse must undo its change.
//!
//! Foreign keys are enforced like a database enforces them: a reference
//! must point at an existing key, and a referenced table, column or key
//! index cannot be dropped.

use crate::changes::Change;
use crate::error::{MigrateError, Result};
use crate::schema::{Column, SchemaSnapshot, Table};

fn missing_table(name: &str) -> MigrateError {
    MigrateError::InvalidState(format!("Table '{}' does not exist", name))
}

fn still_referenced(what: String, referrer: &str) -> MigrateError {
    MigrateError::InvalidState(format!("{} is still referenced by '{}'", what, referrer))
}

/// A schema snapshot that changes can be applied to.
#[derive(Debug, Clone, Default)]
pub struct SchemaState {
    schema: SchemaSnapshot,
}

impl SchemaState {
    /// Creates a new empty schema state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing snapshot.
    #[must_use]
    pub fn from_snapshot(schema: SchemaSnapshot) -> Self {
        Self { schema }
    }

    /// Returns the current schema.
    #[must_use]
    pub fn schema(&self) -> &SchemaSnapshot {
        &self.schema
    }

    /// Consumes and returns the schema.
    #[must_use]
    pub fn into_snapshot(self) -> SchemaSnapshot {
        self.schema
    }

    /// Applies changes in order, stopping at the first failure.
    pub fn apply_all<'a, I>(&mut self, changes: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Change>,
    {
        for change in changes {
            self.apply(change)?;
        }
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.schema
            .get_table_mut(name)
            .ok_or_else(|| missing_table(name))
    }

    /// Checks that the foreign key of `column`, if any, points at a key.
    /// `pending` is a table about to be created, which may be the target.
    fn check_reference(&self, owner: &str, column: &Column, pending: Option<&Table>) -> Result<()> {
        let Some(reference) = &column.references else {
            return Ok(());
        };

        let target = pending
            .filter(|t| t.name == reference.table)
            .or_else(|| self.schema.get_table(&reference.table))
            .ok_or_else(|| {
                MigrateError::InvalidState(format!(
                    "Column '{}.{}' references missing table '{}'",
                    owner, column.name, reference.table
                ))
            })?;

        if target.get_column(&reference.column).is_none() {
            return Err(MigrateError::InvalidState(format!(
                "Column '{}.{}' references missing column '{}.{}'",
                owner, column.name, reference.table, reference.column
            )));
        }
        if !target.is_key(&reference.column) {
            return Err(MigrateError::InvalidState(format!(
                "Column '{}.{}' references '{}.{}', which is not a key",
                owner, column.name, reference.table, reference.column
            )));
        }
        Ok(())
    }

    /// Finds a column whose foreign key points at `table`, or at
    /// `table.column` when a column is given. Columns for which `skip`
    /// returns true are ignored.
    fn find_referrer<F>(&self, table: &str, column: Option<&str>, skip: F) -> Option<String>
    where
        F: Fn(&Table, &Column) -> bool,
    {
        self.schema.tables.values().find_map(|t| {
            t.columns
                .iter()
                .find(|c| {
                    !skip(t, c)
                        && c.references.as_ref().is_some_and(|r| {
                            r.table == table && column.map_or(true, |name| r.column == name)
                        })
                })
                .map(|c| format!("{}.{}", t.name, c.name))
        })
    }

    fn index_name_taken(&self, name: &str) -> bool {
        self.schema
            .tables
            .values()
            .any(|t| t.indexes.contains_key(name))
    }

    /// Applies a single change.
    ///
    /// Manual changes are not applied; the state stays as it was.
    pub fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::CreateTable { table } => {
                if self.schema.get_table(&table.name).is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{}' already exists",
                        table.name
                    )));
                }
                if let Some(index) = table.indexes.keys().find(|n| self.index_name_taken(n)) {
                    return Err(MigrateError::InvalidState(format!(
                        "Index '{}' already exists",
                        index
                    )));
                }
                for column in &table.columns {
                    self.check_reference(&table.name, column, Some(table))?;
                }
                self.schema.add_table(table.clone());
            }

            Change::DropTable { table } => {
                if self.schema.get_table(&table.name).is_none() {
                    return Err(missing_table(&table.name));
                }
                if let Some(referrer) = self.find_referrer(&table.name, None, |t, _| t.name == table.name) {
                    return Err(still_referenced(format!("Table '{}'", table.name), &referrer));
                }
                self.schema.tables.remove(&table.name);
            }

            Change::AddColumn { table, column } => {
                self.check_reference(table, column, None)?;
                let t = self.table_mut(table)?;
                if t.get_column(&column.name).is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{}' already exists in table '{}'",
                        column.name, table
                    )));
                }
                t.columns.push(column.clone());
            }

            Change::DropColumn { table, column } => {
                let referrer = self.find_referrer(table, Some(column.name.as_str()), |t, c| {
                    t.name == *table && c.name == column.name
                });
                if let Some(referrer) = referrer {
                    return Err(still_referenced(
                        format!("Column '{}.{}'", table, column.name),
                        &referrer,
                    ));
                }
                let t = self.table_mut(table)?;
                let idx = t
                    .columns
                    .iter()
                    .position(|c| c.name == column.name)
                    .ok_or_else(|| {
                        MigrateError::InvalidState(format!(
                            "Column '{}' does not exist in table '{}'",
                            column.name, table
                        ))
                    })?;
                t.columns.remove(idx);
                // Indexes covering the column go with it.
                t.indexes
                    .retain(|_, index| !index.columns.iter().any(|c| *c == column.name));
            }

            Change::AlterColumn { table, from, to } => {
                if from.references != to.references {
                    self.check_reference(table, to, None)?;
                }
                let t = self.table_mut(table)?;
                let col = t.get_column_mut(&from.name).ok_or_else(|| {
                    MigrateError::InvalidState(format!(
                        "Column '{}' does not exist in table '{}'",
                        from.name, table
                    ))
                })?;
                if col != from {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{}' in table '{}' does not match the definition being altered",
                        from.name, table
                    )));
                }
                *col = to.clone();
            }

            Change::AddIndex { table, index } => {
                if self.index_name_taken(&index.name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Index '{}' already exists",
                        index.name
                    )));
                }
                let t = self.table_mut(table)?;
                if let Some(missing) = index.columns.iter().find(|c| t.get_column(c).is_none()) {
                    return Err(MigrateError::InvalidState(format!(
                        "Index '{}' covers missing column '{}' in table '{}'",
                        index.name, missing, table
                    )));
                }
                t.indexes.insert(index.name.clone(), index.clone());
            }

            Change::DropIndex { table, index } => {
                let t = self.schema.get_table(table).ok_or_else(|| missing_table(table))?;
                if !t.indexes.contains_key(&index.name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Index '{}' does not exist on table '{}'",
                        index.name, table
                    )));
                }

                // A foreign key may rely on the index for its target key.
                let mut without = t.clone();
                without.indexes.remove(&index.name);
                for column in &index.columns {
                    if t.is_key(column) && !without.is_key(column) {
                        if let Some(referrer) = self.find_referrer(table, Some(column.as_str()), |_, _| false)
                        {
                            return Err(still_referenced(
                                format!("Index '{}' on '{}.{}'", index.name, table, column),
                                &referrer,
                            ));
                        }
                    }
                }

                self.schema.tables.insert(table.clone(), without);
            }

            Change::Manual(_) => {}
        }

        Ok(())
    }
}
