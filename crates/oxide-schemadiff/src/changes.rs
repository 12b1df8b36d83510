//! Schema changes.
//!
//! This module defines every structural change the diff engine can emit,
//! along with its risk classification, inverse, and SQL rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dialect::MigrationDialect;
use crate::schema::{Column, Index, Table};

/// Risk classification of a change, used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    /// Additive or lossless change.
    Safe,
    /// Change that discards data.
    Destructive,
    /// Change the engine refused to script.
    Manual,
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Safe => "safe",
            Self::Destructive => "destructive",
            Self::Manual => "manual",
        })
    }
}

/// A difference that has to be migrated by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualChange {
    /// Table the change concerns.
    pub table: String,
    /// Column the change concerns, if any.
    pub column: Option<String>,
    /// Human-readable explanation.
    pub description: String,
}

/// A single structural change between two schema snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// Create a new table.
    CreateTable {
        /// Full table definition.
        table: Table,
    },

    /// Drop a table.
    DropTable {
        /// Definition of the table being dropped.
        table: Table,
    },

    /// Add a column to a table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: Column,
    },

    /// Drop a column from a table.
    DropColumn {
        /// Table name.
        table: String,
        /// Definition of the column being dropped.
        column: Column,
    },

    /// Alter a column's type, nullability or default.
    AlterColumn {
        /// Table name.
        table: String,
        /// Column definition before the change.
        from: Column,
        /// Column definition after the change.
        to: Column,
    },

    /// Create an index.
    AddIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: Index,
    },

    /// Drop an index.
    DropIndex {
        /// Table name.
        table: String,
        /// Definition of the index being dropped.
        index: Index,
    },

    /// A change that must be written by hand.
    Manual(ManualChange),
}

impl Change {
    /// Creates a CreateTable change.
    #[must_use]
    pub fn create_table(table: Table) -> Self {
        Self::CreateTable { table }
    }

    /// Creates a DropTable change.
    #[must_use]
    pub fn drop_table(table: Table) -> Self {
        Self::DropTable { table }
    }

    /// Creates an AddColumn change.
    #[must_use]
    pub fn add_column(table: impl Into<String>, column: Column) -> Self {
        Self::AddColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates a DropColumn change.
    #[must_use]
    pub fn drop_column(table: impl Into<String>, column: Column) -> Self {
        Self::DropColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates an AlterColumn change.
    #[must_use]
    pub fn alter_column(table: impl Into<String>, from: Column, to: Column) -> Self {
        Self::AlterColumn {
            table: table.into(),
            from,
            to,
        }
    }

    /// Creates an AddIndex change.
    #[must_use]
    pub fn add_index(table: impl Into<String>, index: Index) -> Self {
        Self::AddIndex {
            table: table.into(),
            index,
        }
    }

    /// Creates a DropIndex change.
    #[must_use]
    pub fn drop_index(table: impl Into<String>, index: Index) -> Self {
        Self::DropIndex {
            table: table.into(),
            index,
        }
    }

    /// Creates a manual change.
    #[must_use]
    pub fn manual(
        table: impl Into<String>,
        column: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::Manual(ManualChange {
            table: table.into(),
            column,
            description: description.into(),
        })
    }

    /// Returns the name of the table this change touches.
    #[must_use]
    pub fn table_name(&self) -> &str {
        match self {
            Self::CreateTable { table } | Self::DropTable { table } => &table.name,
            Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::AlterColumn { table, .. }
            | Self::AddIndex { table, .. }
            | Self::DropIndex { table, .. } => table,
            Self::Manual(manual) => &manual.table,
        }
    }

    /// Returns the risk classification of this change.
    #[must_use]
    pub fn risk(&self) -> Risk {
        match self {
            Self::DropTable { .. } | Self::DropColumn { .. } => Risk::Destructive,
            Self::Manual(_) => Risk::Manual,
            _ => Risk::Safe,
        }
    }

    /// Returns the inverse change.
    ///
    /// Returns `None` for drops of tables and columns, whose data cannot be
    /// brought back, and for manual changes.
    #[must_use]
    pub fn reverse(&self) -> Option<Self> {
        match self {
            Self::CreateTable { table } => Some(Self::drop_table(table.clone())),
            Self::DropTable { .. } => None,
            Self::AddColumn { table, column } => {
                Some(Self::drop_column(table.clone(), column.clone()))
            }
            Self::DropColumn { .. } => None,
            Self::AlterColumn { table, from, to } => {
                Some(Self::alter_column(table.clone(), to.clone(), from.clone()))
            }
            Self::AddIndex { table, index } => Some(Self::drop_index(table.clone(), index.clone())),
            Self::DropIndex { table, index } => Some(Self::add_index(table.clone(), index.clone())),
            Self::Manual(_) => None,
        }
    }

    /// Returns true if this change can be reversed automatically.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        !matches!(
            self,
            Self::DropTable { .. } | Self::DropColumn { .. } | Self::Manual(_)
        )
    }

    /// Returns the step that undoes this change in a down script.
    ///
    /// Changes without an inverse become a manual placeholder.
    #[must_use]
    pub fn reverse_or_manual(&self) -> Self {
        self.reverse().unwrap_or_else(|| match self {
            Self::Manual(manual) => Self::Manual(ManualChange {
                table: manual.table.clone(),
                column: manual.column.clone(),
                description: format!("revert by hand: {}", manual.description),
            }),
            other => Self::manual(
                other.table_name(),
                None,
                format!("{} cannot be reverted automatically", other),
            ),
        })
    }

    /// Returns the forward SQL statements for this change.
    ///
    /// Manual changes have no SQL.
    #[must_use]
    pub fn sql(&self, dialect: &dyn MigrationDialect) -> Vec<String> {
        dialect.generate_sql(self)
    }

    /// Returns the SQL statements that undo this change, if it has an
    /// inverse.
    #[must_use]
    pub fn reverse_sql(&self, dialect: &dyn MigrationDialect) -> Option<Vec<String>> {
        self.reverse().map(|inverse| dialect.generate_sql(&inverse))
    }

    /// Returns a human-readable description of this change.
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table } => write!(f, "Create table '{}'", table.name),
            Self::DropTable { table } => write!(f, "Drop table '{}'", table.name),
            Self::AddColumn { table, column } => write!(
                f,
                "Add column '{}' ({}) to table '{}'",
                column.name, column.ty, table
            ),
            Self::DropColumn { table, column } => {
                write!(f, "Drop column '{}' from table '{}'", column.name, table)
            }
            Self::AlterColumn { table, from, to } => {
                let mut parts = Vec::new();
                if from.ty != to.ty {
                    parts.push(format!("type {} -> {}", from.ty, to.ty));
                }
                if from.nullable != to.nullable {
                    parts.push(if to.nullable {
                        "drop NOT NULL".to_string()
                    } else {
                        "set NOT NULL".to_string()
                    });
                }
                if from.default != to.default {
                    parts.push(match &to.default {
                        Some(expr) => format!("default {expr}"),
                        None => "drop default".to_string(),
                    });
                }
                write!(f, "Alter column '{}' in table '{}'", to.name, table)?;
                if !parts.is_empty() {
                    write!(f, " ({})", parts.join(", "))?;
                }
                Ok(())
            }
            Self::AddIndex { table, index } => {
                write!(f, "Create index '{}' on table '{}'", index.name, table)
            }
            Self::DropIndex { table, index } => {
                write!(f, "Drop index '{}' from table '{}'", index.name, table)
            }
            Self::Manual(manual) => match &manual.column {
                Some(column) => write!(
                    f,
                    "Manual change on '{}.{}': {}",
                    manual.table, column, manual.description
                ),
                None => write!(
                    f,
                    "Manual change on '{}': {}",
                    manual.table, manual.description
                ),
            },
        }
    }
}
