//! Example: Blog Application Schema Evolution
//!
//! This example evolves the schema of a blog application over three
//! revisions and writes a migration for each into a temporary directory.
//!
//! Run with: cargo run --example blog_schema -p oxide-schemadiff

use std::fs;

use oxide_schemadiff::prelude::*;
use oxide_schemadiff::report;

// =============================================================================
// Schema Revisions
// =============================================================================

fn users() -> Table {
    Table::new("users")
        .column(Column::new("id", ColumnType::BigSerial).primary_key())
        .column(Column::new("username", ColumnType::Varchar(100)).not_null())
        .column(Column::new("email", ColumnType::Varchar(255)).not_null())
        .column(
            Column::new("created_at", ColumnType::TimestampTz)
                .not_null()
                .default("CURRENT_TIMESTAMP"),
        )
        .index(Index::new("idx_users_email", ["email"]).unique())
}

fn posts() -> Table {
    Table::new("posts")
        .column(Column::new("id", ColumnType::BigSerial).primary_key())
        .column(
            Column::new("author_id", ColumnType::BigInt)
                .not_null()
                .references("users", "id"),
        )
        .column(Column::new("title", ColumnType::Varchar(200)).not_null())
        .column(Column::new("body", ColumnType::Text))
        .index(Index::new("idx_posts_author", ["author_id"]))
}

/// First revision: users only.
fn revision_one() -> SchemaSnapshot {
    SchemaSnapshot::new().table(users())
}

/// Second revision: posts, and a longer username.
fn revision_two() -> SchemaSnapshot {
    let mut users = users();
    if let Some(username) = users.get_column_mut("username") {
        username.ty = ColumnType::Varchar(150);
    }
    SchemaSnapshot::new().table(users).table(posts())
}

/// Third revision: a shorter title that needs a human, and a dropped body.
fn revision_three() -> SchemaSnapshot {
    let mut posts = posts();
    posts.columns.retain(|c| c.name != "body");
    if let Some(title) = posts.get_column_mut("title") {
        title.ty = ColumnType::Varchar(120);
    }
    let posts = posts
        .column(
            Column::new("status", ColumnType::SmallInt)
                .not_null()
                .default("0"),
        )
        .column(Column::new("tags", ColumnType::array(ColumnType::Text)));

    let mut schema = revision_two();
    schema.add_table(posts);
    schema
}

// =============================================================================
// Main
// =============================================================================

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!(" OXIDE-SCHEMADIFF: Blog Application Example");
    println!("{}", "=".repeat(70));
    println!();

    let dir = tempfile::tempdir()?;
    let store = DirStore::new(dir.path().join("migrations"));

    let revisions = [
        ("create users", revision_one()),
        ("add posts", revision_two()),
        ("post status", revision_three()),
        ("no changes", revision_three()),
    ];

    for (step, (name, schema)) in revisions.iter().enumerate() {
        println!("[{}] Generating '{}'...", step + 1, name);

        let generator = MigrationGenerator::new(*name, store.clone(), PostgresDialect::new());
        let migration = generator.build(schema)?;
        print!("{}", report::summarize(&migration.up, true));

        match generator.generate(&migration)? {
            GenerateOutcome::NothingToDo => println!("    Nothing to generate\n"),
            GenerateOutcome::Written(written) => {
                println!("\n-- {}", written.up);
                print!("{}", fs::read_to_string(store.path(&written.up))?);
                println!("\n-- {}", written.down);
                print!("{}", fs::read_to_string(store.path(&written.down))?);
                println!();
            }
        }
    }

    println!("{}", "-".repeat(70));
    println!("Artifacts in {}:", store.dir().display());
    for name in store.list()? {
        println!("    - {}", name);
    }

    Ok(())
}
