//! Integration tests for the diff engine.
//!
//! These tests diff snapshot pairs, then replay the resulting changes with
//! `SchemaState` to check that the up list reaches the new snapshot and
//! that every inverse undoes its change.

mod common;

use common::{col, kinds, pk_col, replay, schema, sessions, users};
use oxide_schemadiff::prelude::*;

// =============================================================================
// Added column and new table
// =============================================================================

fn users_with_email() -> Table {
    users().column(col("email", ColumnType::Text))
}

#[test]
fn new_table_and_column_up_sequence() {
    let old = schema(vec![users()]);
    let new = schema(vec![users_with_email(), sessions()]);

    let migration = Migration::new(Autodetector::new().diff(&old, &new).unwrap(), new.clone());

    assert_eq!(
        kinds(&migration.up),
        vec!["create_table:sessions", "add_column:users"]
    );
    assert_eq!(
        migration.down,
        vec![
            Change::drop_column("users", col("email", ColumnType::Text)),
            Change::drop_table(sessions()),
        ]
    );
    assert_eq!(migration.lock, new);
}

#[test]
fn new_table_and_column_replay() {
    let old = schema(vec![users()]);
    let new = schema(vec![users_with_email(), sessions()]);
    let migration = Migration::new(Autodetector::new().diff(&old, &new).unwrap(), new.clone());

    let migrated = replay(&old, &migration.up);
    assert_eq!(migrated, new);
    assert_eq!(replay(&migrated, &migration.down), old);
}

#[test]
fn new_table_and_column_scripts() {
    let old = schema(vec![users()]);
    let new = schema(vec![users_with_email(), sessions()]);
    let migration = Migration::new(Autodetector::new().diff(&old, &new).unwrap(), new);

    let dialect = PostgresDialect::new();
    let rendered = Renderer::new(&dialect).render(&migration).unwrap().unwrap();

    assert!(rendered.up.starts_with("CREATE TABLE \"sessions\""));
    assert!(rendered
        .up
        .ends_with("ALTER TABLE \"users\" ADD COLUMN \"email\" TEXT;\n"));
    assert_eq!(
        rendered.down,
        "ALTER TABLE \"users\" DROP COLUMN \"email\";\n\nDROP TABLE \"sessions\";\n"
    );
}

// =============================================================================
// Narrowing type change plus NOT NULL
// =============================================================================

#[test]
fn narrowing_not_null_change_is_a_single_manual_change() {
    let old = schema(vec![Table::new("orders")
        .column(pk_col("id", ColumnType::BigSerial))
        .column(col("status", ColumnType::Text))]);
    let new = schema(vec![Table::new("orders")
        .column(pk_col("id", ColumnType::BigSerial))
        .column(col("status", ColumnType::Integer).not_null())]);

    let migration = Migration::new(Autodetector::new().diff(&old, &new).unwrap(), new);
    assert_eq!(migration.up.len(), 1);
    assert_eq!(migration.up[0].risk(), Risk::Manual);

    let dialect = PostgresDialect::new();
    let rendered = Renderer::new(&dialect).render(&migration).unwrap().unwrap();

    assert!(rendered.up.starts_with("-- MANUAL CHANGE REQUIRED:"));
    assert!(rendered.up.contains("orders.status"));
    assert!(!rendered.up.contains("ALTER"));
    assert_eq!(migration.down.len(), 1);
    assert_eq!(migration.down[0].risk(), Risk::Manual);
    assert!(rendered.down.lines().all(|l| l.starts_with("--")));
}

// =============================================================================
// Foreign keys across changes
// =============================================================================

fn users_with_code() -> Table {
    users()
        .column(col("code", ColumnType::Text))
        .index(Index::new("idx_users_code", ["code"]).unique())
}

fn tokens() -> Table {
    Table::new("tokens")
        .column(pk_col("id", ColumnType::Uuid))
        .column(col("user_code", ColumnType::Text).references("users", "code"))
}

fn assert_replays(old: &SchemaSnapshot, new: &SchemaSnapshot) -> Migration {
    let migration = Migration::new(Autodetector::new().diff(old, new).unwrap(), new.clone());
    let migrated = replay(old, &migration.up);
    assert_eq!(&migrated, new);
    assert_eq!(&replay(&migrated, &migration.down), old);
    migration
}

#[test]
fn new_table_referencing_new_key_replays() {
    let old = schema(vec![users()]);
    let new = schema(vec![users_with_code(), tokens()]);

    let migration = assert_replays(&old, &new);
    assert_eq!(
        kinds(&migration.up),
        vec!["add_column:users", "add_index:users", "create_table:tokens"]
    );
}

#[test]
fn dropping_referenced_key_replays() {
    let old = schema(vec![
        users()
            .column(col("legacy_id", ColumnType::BigInt))
            .index(Index::new("idx_users_legacy", ["legacy_id"]).unique()),
        Table::new("audit")
            .column(pk_col("id", ColumnType::BigSerial))
            .column(col("user_legacy", ColumnType::BigInt).references("users", "legacy_id")),
    ]);
    let new = schema(vec![users()]);

    let migration = assert_replays(&old, &new);
    assert_eq!(
        kinds(&migration.up),
        vec!["drop_table:audit", "drop_index:users", "drop_column:users"]
    );
}

#[test]
fn added_column_referencing_new_key_replays() {
    let posts = Table::new("posts").column(pk_col("id", ColumnType::BigSerial));
    let old = schema(vec![users(), posts.clone()]);
    let new = schema(vec![
        users_with_code(),
        posts.column(col("author_code", ColumnType::Text).references("users", "code")),
    ]);

    let migration = assert_replays(&old, &new);
    assert_eq!(
        kinds(&migration.up),
        vec!["add_column:users", "add_index:users", "add_column:posts"]
    );

    // The reverse direction drops the referencing column first.
    let back = assert_replays(&new, &old);
    assert_eq!(
        kinds(&back.up),
        vec!["drop_column:posts", "drop_index:users", "drop_column:users"]
    );
}

// =============================================================================
// Properties
// =============================================================================

fn sample_pairs() -> Vec<(SchemaSnapshot, SchemaSnapshot)> {
    let blog_v1 = schema(vec![
        users(),
        Table::new("posts")
            .column(pk_col("id", ColumnType::BigSerial))
            .column(col("author_id", ColumnType::Uuid).references("users", "id"))
            .column(col("title", ColumnType::Varchar(100)).not_null())
            .column(col("views", ColumnType::Integer))
            .index(Index::new("idx_posts_author", ["author_id"])),
    ]);
    let blog_v2 = schema(vec![
        users().column(col("bio", ColumnType::Text)),
        Table::new("posts")
            .column(pk_col("id", ColumnType::BigSerial))
            .column(col("author_id", ColumnType::Uuid).references("users", "id"))
            .column(col("title", ColumnType::Varchar(200)).not_null())
            .column(col("views", ColumnType::BigInt).not_null().default("0"))
            .index(Index::new("idx_posts_author", ["author_id", "title"])),
        Table::new("comments")
            .column(pk_col("id", ColumnType::BigSerial))
            .column(col("post_id", ColumnType::BigInt).references("posts", "id"))
            .index(Index::new("idx_comments_post", ["post_id"])),
    ]);
    let shrunk = schema(vec![Table::new("users")
        .column(pk_col("id", ColumnType::Uuid))
        .column(col("name", ColumnType::Varchar(10)))]);

    vec![
        (SchemaSnapshot::new(), blog_v1.clone()),
        (blog_v1.clone(), blog_v2.clone()),
        (blog_v2.clone(), blog_v1.clone()),
        (blog_v2, SchemaSnapshot::new()),
        (blog_v1, shrunk),
    ]
}

#[test]
fn diff_is_deterministic() {
    let detector = Autodetector::new();
    for (old, new) in sample_pairs() {
        let first = detector.diff(&old, &new).unwrap();
        let second = detector.diff(&old, &new).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn diff_of_identical_snapshots_is_empty() {
    let detector = Autodetector::new();
    for (old, new) in sample_pairs() {
        assert!(detector.diff(&old, &old).unwrap().is_empty());
        assert!(detector.diff(&new, &new).unwrap().is_empty());
    }
}

#[test]
fn every_inverse_restores_the_previous_state() {
    let detector = Autodetector::new();
    for (old, new) in sample_pairs() {
        let changes = detector.diff(&old, &new).unwrap();

        let mut state = SchemaState::from_snapshot(old.clone());
        for change in &changes {
            let before = state.schema().clone();
            state.apply(change).unwrap();

            if let Some(inverse) = change.reverse() {
                let mut undo = SchemaState::from_snapshot(state.schema().clone());
                undo.apply(&inverse).unwrap();
                assert_eq!(undo.into_snapshot(), before, "inverse of {change}");
            }
        }
    }
}

#[test]
fn lossy_changes_are_never_automatic() {
    let detector = Autodetector::new();
    for (old, new) in sample_pairs() {
        for change in detector.diff(&old, &new).unwrap() {
            if let Change::AlterColumn { from, to, .. } = &change {
                assert!(from.ty.widens_to(&to.ty), "{change}");
                assert!(
                    to.nullable || !from.nullable || to.default.is_some(),
                    "{change}"
                );
            }
        }
    }
}

#[test]
fn v1_to_v2_orders_changes_by_phase() {
    let pairs = sample_pairs();
    let (old, new) = &pairs[1];

    let changes = Autodetector::new().diff(old, new).unwrap();
    assert_eq!(
        kinds(&changes),
        vec![
            "create_table:comments",
            "add_column:users",
            "alter_column:posts",
            "alter_column:posts",
            "drop_index:posts",
            "add_index:comments",
            "add_index:posts",
        ]
    );
}

#[test]
fn shrinking_varchar_is_manual() {
    let pairs = sample_pairs();
    let (old, new) = &pairs[4];

    let changes = Autodetector::new().diff(old, new).unwrap();
    let manual: Vec<&Change> = changes
        .iter()
        .filter(|c| c.risk() == Risk::Manual)
        .collect();
    assert_eq!(manual.len(), 1);
    assert!(manual[0].to_string().contains("text -> varchar(10)"));
    assert!(changes.iter().any(|c| matches!(c, Change::DropTable { .. })));
}
