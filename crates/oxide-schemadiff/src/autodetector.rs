//! Autodetector for generating migrations from schema changes.
//!
//! This module compares two schema snapshots and produces the ordered list
//! of changes that turns one into the other.
//!
//! # Ordering
//!
//! Changes are collected in phases:
//!
//! 1. `CreateTable`, referenced tables first
//! 2. `AddColumn`
//! 3. `AlterColumn` and manual changes
//! 4. `DropIndex`
//! 5. `AddIndex`
//! 6. `DropColumn`
//! 7. `DropTable`, referencing tables first
//!
//! Within a phase, tables appear in name order and columns in declaration
//! order. Foreign keys can make a change depend on one from a later phase:
//! a new table referencing a column added to an existing table, or a
//! dropped column still referenced by a table dropped in the same run. The
//! phase order is therefore only the tie-break of a topological sort, so a
//! script generated from the list runs top to bottom.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::changes::Change;
use crate::error::{MigrateError, Result};
use crate::schema::{Column, Index, Reference, SchemaSnapshot, Table};

/// Computes the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Returns a normalized similarity score in `[0.0, 1.0]`.
#[allow(clippy::cast_precision_loss)]
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

/// Orders `names` so each name comes after the names `deps` returns for it.
///
/// The smallest available name is taken first. Names that can never be
/// placed because they sit on, or behind, a cycle are returned separately.
fn dependency_order<'a, F>(names: &BTreeSet<&'a str>, deps: F) -> (Vec<&'a str>, Vec<&'a str>)
where
    F: Fn(&'a str) -> BTreeSet<&'a str>,
{
    let mut pending: BTreeMap<&'a str, BTreeSet<&'a str>> = names
        .iter()
        .map(|&name| {
            let within: BTreeSet<&str> = deps(name)
                .into_iter()
                .filter(|d| *d != name && names.contains(d))
                .collect();
            (name, within)
        })
        .collect();

    let mut order = Vec::with_capacity(names.len());
    loop {
        let next = pending
            .iter()
            .find(|(_, waiting_on)| waiting_on.is_empty())
            .map(|(name, _)| *name);
        let Some(next) = next else {
            break;
        };
        pending.remove(next);
        for waiting_on in pending.values_mut() {
            waiting_on.remove(next);
        }
        order.push(next);
    }

    (order, pending.into_keys().collect())
}

fn describe_reference(reference: Option<&Reference>) -> String {
    reference.map_or_else(
        || "none".to_string(),
        |r| format!("{}.{}", r.table, r.column),
    )
}

/// A schema fact a change establishes or relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Fact {
    /// The column exists.
    Column(String, String),
    /// A single-column unique index makes the column a key.
    Key(String, String),
    /// No index uses the name.
    FreeIndexName(String),
    /// No foreign key points at the column.
    Unreferenced(String, String),
}

impl Fact {
    fn column(table: &str, column: &str) -> Self {
        Self::Column(table.to_string(), column.to_string())
    }

    fn unreferenced(table: &str, column: &str) -> Self {
        Self::Unreferenced(table.to_string(), column.to_string())
    }

    /// What a foreign key on `column` needs from its target.
    fn target_of(column: &Column) -> Vec<Self> {
        column.references.as_ref().map_or_else(Vec::new, |r| {
            vec![
                Self::column(&r.table, &r.column),
                Self::Key(r.table.clone(), r.column.clone()),
            ]
        })
    }

    /// What dropping `column` gives back to its foreign key target.
    fn released_by(column: &Column) -> Option<Self> {
        column
            .references
            .as_ref()
            .map(|r| Self::unreferenced(&r.table, &r.column))
    }
}

/// The only column of a unique index.
fn key_column(index: &Index) -> Option<&str> {
    match index.columns.as_slice() {
        [column] if index.unique => Some(column.as_str()),
        _ => None,
    }
}

/// A change with the facts it provides and requires.
struct Step {
    change: Change,
    provides: BTreeSet<Fact>,
    requires: BTreeSet<Fact>,
}

impl Step {
    fn new(change: Change) -> Self {
        let mut provides = BTreeSet::new();
        let mut requires = BTreeSet::new();

        match &change {
            Change::CreateTable { table } => {
                for column in &table.columns {
                    provides.insert(Fact::column(&table.name, &column.name));
                    requires.extend(Fact::target_of(column));
                }
            }
            Change::AddColumn { table, column } => {
                provides.insert(Fact::column(table, &column.name));
                requires.extend(Fact::target_of(column));
            }
            Change::AddIndex { table, index } => {
                requires.extend(index.columns.iter().map(|c| Fact::column(table, c)));
                requires.insert(Fact::FreeIndexName(index.name.clone()));
                if let Some(column) = key_column(index) {
                    provides.insert(Fact::Key(table.clone(), column.to_string()));
                }
            }
            Change::DropIndex { table, index } => {
                provides.insert(Fact::FreeIndexName(index.name.clone()));
                if let Some(column) = key_column(index) {
                    requires.insert(Fact::unreferenced(table, column));
                }
            }
            Change::DropColumn { table, column } => {
                requires.insert(Fact::unreferenced(table, &column.name));
                provides.extend(Fact::released_by(column));
            }
            Change::DropTable { table } => {
                for column in &table.columns {
                    requires.insert(Fact::unreferenced(&table.name, &column.name));
                    provides.extend(Fact::released_by(column));
                }
            }
            Change::AlterColumn { .. } | Change::Manual(_) => {}
        }

        Self {
            change,
            provides,
            requires,
        }
    }
}

/// Orders steps so each one follows every step that provides a fact it
/// requires. The earliest ready step is taken first, so the incoming order
/// holds wherever no dependency overrides it.
fn order_steps(steps: Vec<Step>) -> Result<Vec<Change>> {
    let mut waiting_on: Vec<BTreeSet<usize>> = steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            steps
                .iter()
                .enumerate()
                .filter(|(j, other)| *j != i && !other.provides.is_disjoint(&step.requires))
                .map(|(j, _)| j)
                .collect()
        })
        .collect();

    let mut pending: Vec<Option<Change>> = steps.into_iter().map(|s| Some(s.change)).collect();
    let mut ordered = Vec::with_capacity(pending.len());

    while ordered.len() < pending.len() {
        let next = (0..pending.len()).find(|&i| pending[i].is_some() && waiting_on[i].is_empty());
        let Some(next) = next else {
            let stuck: Vec<String> = pending.iter().flatten().map(ToString::to_string).collect();
            return Err(MigrateError::UnsupportedChange(format!(
                "changes depend on each other through foreign keys: {}",
                stuck.join("; ")
            )));
        };
        for waiting in &mut waiting_on {
            waiting.remove(&next);
        }
        if let Some(change) = pending[next].take() {
            ordered.push(change);
        }
    }

    Ok(ordered)
}

/// Options for the autodetector.
#[derive(Debug, Clone)]
pub struct AutodetectorOptions {
    /// Whether to emit hints for dropped/added column pairs that look like
    /// renames.
    pub rename_hints: bool,
    /// Similarity threshold for rename hints (0.0 to 1.0).
    pub rename_threshold: f64,
}

impl Default for AutodetectorOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl AutodetectorOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rename_hints: false,
            rename_threshold: 0.4,
        }
    }

    /// Enables rename hints.
    #[must_use]
    pub fn with_rename_hints(mut self) -> Self {
        self.rename_hints = true;
        self
    }
}

/// Changes collected per phase before being concatenated.
#[derive(Default)]
struct Phases {
    create_tables: Vec<Change>,
    add_columns: Vec<Change>,
    alterations: Vec<Change>,
    drop_indexes: Vec<Change>,
    add_indexes: Vec<Change>,
    drop_columns: Vec<Change>,
    drop_tables: Vec<Change>,
    /// Foreign keys given up by tables left to a manual drop.
    manual_drop_releases: BTreeSet<Fact>,
}

impl Phases {
    fn into_changes(self) -> Result<Vec<Change>> {
        let mut steps: Vec<Step> = self
            .create_tables
            .into_iter()
            .chain(self.add_columns)
            .chain(self.alterations)
            .chain(self.drop_indexes)
            .chain(self.add_indexes)
            .chain(self.drop_columns)
            .map(Step::new)
            .collect();

        for change in self.drop_tables {
            let mut step = Step::new(change);
            if matches!(step.change, Change::Manual(_)) {
                step.provides.extend(self.manual_drop_releases.iter().cloned());
            }
            steps.push(step);
        }

        order_steps(steps)
    }
}

/// Detects schema changes and generates the changes to migrate them.
#[derive(Debug, Default)]
pub struct Autodetector {
    options: AutodetectorOptions,
}

impl Autodetector {
    /// Creates a new autodetector with default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: AutodetectorOptions::new(),
        }
    }

    /// Creates a new autodetector with custom options.
    #[must_use]
    pub fn with_options(options: AutodetectorOptions) -> Self {
        Self { options }
    }

    /// Compares two snapshots and returns the changes needed to transform
    /// `old` into `new`.
    ///
    /// Differences that cannot be migrated without risking data come back
    /// as [`Change::Manual`]. Changes whose foreign keys depend on each
    /// other in a cycle, such as two new tables referencing each other,
    /// cannot be ordered and fail with [`MigrateError::UnsupportedChange`].
    pub fn diff(&self, old: &SchemaSnapshot, new: &SchemaSnapshot) -> Result<Vec<Change>> {
        let old_names: BTreeSet<&str> = old.table_names().collect();
        let new_names: BTreeSet<&str> = new.table_names().collect();

        let created: BTreeSet<&str> = new_names.difference(&old_names).copied().collect();
        let dropped: BTreeSet<&str> = old_names.difference(&new_names).copied().collect();

        let mut phases = Phases::default();

        // Tables to create, referenced tables first
        let (create_order, cyclic) = dependency_order(&created, |name| {
            new.tables
                .get(name)
                .map(Table::referenced_tables)
                .unwrap_or_default()
        });
        if !cyclic.is_empty() {
            return Err(MigrateError::UnsupportedChange(format!(
                "new tables {} reference each other in a cycle and cannot be created \
                 with inline foreign keys",
                cyclic.join(", ")
            )));
        }
        for name in create_order {
            if let Some(table) = new.get_table(name) {
                // Indexes follow as separate AddIndex changes
                let mut columns_only = table.clone();
                columns_only.indexes.clear();
                phases.create_tables.push(Change::create_table(columns_only));
            }
        }

        // Tables present in both
        for (name, new_table) in &new.tables {
            match old.get_table(name) {
                Some(old_table) => self.diff_table(old_table, new_table, &mut phases),
                None => {
                    for index in new_table.indexes.values() {
                        phases
                            .add_indexes
                            .push(Change::add_index(name.clone(), index.clone()));
                    }
                }
            }
        }

        Self::drop_tables(old, new, &dropped, &mut phases);

        let changes = phases.into_changes()?;
        debug!("Detected {} change(s)", changes.len());
        Ok(changes)
    }

    /// Emits drops for tables that no longer exist, referencing tables
    /// first.
    fn drop_tables(
        old: &SchemaSnapshot,
        new: &SchemaSnapshot,
        dropped: &BTreeSet<&str>,
        phases: &mut Phases,
    ) {
        // Index names are global, so ones reused by the new schema must be
        // freed before the new indexes are created.
        let new_index_names: BTreeSet<&str> = new
            .tables
            .values()
            .flat_map(|t| t.indexes.keys().map(String::as_str))
            .collect();

        let (drop_order, cyclic) = dependency_order(dropped, |name| {
            dropped
                .iter()
                .copied()
                .filter(|other| {
                    old.get_table(other)
                        .is_some_and(|t| t.referenced_tables().contains(name))
                })
                .collect()
        });

        for name in drop_order.iter().chain(cyclic.iter()) {
            let Some(table) = old.get_table(name) else {
                continue;
            };
            for index in table.indexes.values() {
                if new_index_names.contains(index.name.as_str()) {
                    phases
                        .drop_indexes
                        .push(Change::drop_index((*name).to_string(), index.clone()));
                }
            }
        }

        for name in drop_order {
            if let Some(table) = old.get_table(name) {
                phases.drop_tables.push(Change::drop_table(table.clone()));
            }
        }

        if let Some(first) = cyclic.first() {
            warn!("Dropped tables {} form a reference cycle", cyclic.join(", "));
            phases.manual_drop_releases.extend(
                cyclic
                    .iter()
                    .filter_map(|name| old.get_table(name))
                    .flat_map(|table| table.columns.iter().filter_map(Fact::released_by)),
            );
            phases.drop_tables.push(Change::manual(
                *first,
                None,
                format!(
                    "tables {} reference each other and must be dropped by hand \
                     (remove the foreign keys first)",
                    cyclic.join(", ")
                ),
            ));
        }
    }

    /// Compares two versions of the same table.
    fn diff_table(&self, old: &Table, new: &Table, phases: &mut Phases) {
        let name = &new.name;
        let old_has_primary_key = !old.primary_key().is_empty();

        let added: Vec<&Column> = new
            .columns
            .iter()
            .filter(|c| old.get_column(&c.name).is_none())
            .collect();
        let removed: Vec<&Column> = old
            .columns
            .iter()
            .filter(|c| new.get_column(&c.name).is_none())
            .collect();
        let added_primary_keys = added.iter().filter(|c| c.primary_key).count();

        // New columns
        for column in &added {
            if column.primary_key && (old_has_primary_key || added_primary_keys > 1) {
                phases.alterations.push(Change::manual(
                    name.clone(),
                    Some(column.name.clone()),
                    format!(
                        "primary key changes from ({}) to ({}); add the column and \
                         rebuild the key by hand",
                        old.primary_key().join(", "),
                        new.primary_key().join(", ")
                    ),
                ));
            } else {
                phases
                    .add_columns
                    .push(Change::add_column(name.clone(), (*column).clone()));
            }
        }

        // Modified columns
        for new_column in &new.columns {
            if let Some(old_column) = old.get_column(&new_column.name) {
                if old_column != new_column {
                    phases
                        .alterations
                        .push(Self::diff_column(name, old_column, new_column));
                }
            }
        }

        if self.options.rename_hints {
            phases
                .alterations
                .extend(self.rename_hints(name, &removed, &added));
        }

        // Indexes
        for (index_name, old_index) in &old.indexes {
            match new.indexes.get(index_name) {
                Some(new_index) if new_index == old_index => {}
                _ => phases
                    .drop_indexes
                    .push(Change::drop_index(name.clone(), old_index.clone())),
            }
        }
        for (index_name, new_index) in &new.indexes {
            if old.indexes.get(index_name) != Some(new_index) {
                phases
                    .add_indexes
                    .push(Change::add_index(name.clone(), new_index.clone()));
            }
        }

        // Dropped columns
        for column in removed {
            phases
                .drop_columns
                .push(Change::drop_column(name.clone(), column.clone()));
        }
    }

    /// Classifies a column modification as an automatic alteration or a
    /// manual change.
    fn diff_column(table: &str, from: &Column, to: &Column) -> Change {
        let mut reasons = Vec::new();

        if from.ty != to.ty && !from.ty.widens_to(&to.ty) {
            reasons.push(format!(
                "type change {} -> {} may lose or reinterpret data",
                from.ty, to.ty
            ));
        }
        if from.nullable && !to.nullable && to.default.is_none() {
            reasons.push(
                "column becomes NOT NULL without a default for existing rows".to_string(),
            );
        }
        if from.primary_key != to.primary_key {
            reasons.push(if to.primary_key {
                "column joins the primary key".to_string()
            } else {
                "column leaves the primary key".to_string()
            });
        }
        if from.references != to.references {
            reasons.push(format!(
                "foreign key changes from {} to {}",
                describe_reference(from.references.as_ref()),
                describe_reference(to.references.as_ref())
            ));
        }

        if reasons.is_empty() {
            Change::alter_column(table, from.clone(), to.clone())
        } else {
            warn!(
                "Column '{}.{}' needs a manual migration: {}",
                table,
                to.name,
                reasons.join("; ")
            );
            Change::manual(table, Some(to.name.clone()), reasons.join("; "))
        }
    }

    /// Suggests renames for dropped/added column pairs with the same type
    /// and similar names.
    fn rename_hints(&self, table: &str, removed: &[&Column], added: &[&Column]) -> Vec<Change> {
        let mut hints = Vec::new();
        let mut matched = BTreeSet::new();

        for old_column in removed {
            let mut best: Option<(&Column, f64)> = None;
            for new_column in added {
                if new_column.ty != old_column.ty || matched.contains(new_column.name.as_str()) {
                    continue;
                }
                let score = similarity(&old_column.name, &new_column.name);
                if score >= self.options.rename_threshold
                    && best.map_or(true, |(_, best_score)| score > best_score)
                {
                    best = Some((*new_column, score));
                }
            }

            if let Some((new_column, _)) = best {
                matched.insert(new_column.name.as_str());
                hints.push(Change::manual(
                    table,
                    Some(new_column.name.clone()),
                    format!(
                        "column '{}' was dropped and '{}' added with the same type; \
                         if this is a rename, replace both with RENAME COLUMN",
                        old_column.name, new_column.name
                    ),
                ));
            }
        }

        hints
    }
}
