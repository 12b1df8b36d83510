//! Migration assembly.

use serde::Serialize;

use crate::changes::{Change, Risk};
use crate::schema::SchemaSnapshot;

/// A generated migration: the changes to apply, the changes that undo
/// them, and the snapshot it leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    /// Changes in application order.
    pub up: Vec<Change>,
    /// Changes that undo `up`, last applied first.
    pub down: Vec<Change>,
    /// Snapshot after `up` is applied. Becomes the next lock.
    pub lock: SchemaSnapshot,
}

impl Migration {
    /// Assembles a migration from the detected changes and the target
    /// snapshot.
    ///
    /// The down list walks `up` backwards. Changes without an inverse get
    /// a manual placeholder.
    #[must_use]
    pub fn new(up: Vec<Change>, lock: SchemaSnapshot) -> Self {
        let down = up.iter().rev().map(Change::reverse_or_manual).collect();
        Self { up, down, lock }
    }

    /// Returns true if there is nothing to migrate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.up.is_empty()
    }

    /// Returns true if any change in the up list discards data.
    #[must_use]
    pub fn has_destructive_changes(&self) -> bool {
        self.up.iter().any(|c| c.risk() == Risk::Destructive)
    }

    /// Returns the changes that must be written by hand.
    pub fn manual_changes(&self) -> impl Iterator<Item = &Change> {
        self.up.iter().filter(|c| c.risk() == Risk::Manual)
    }
}
