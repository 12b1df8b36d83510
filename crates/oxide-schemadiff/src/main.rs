//! oxide-schemadiff CLI
//!
//! Command-line tool for generating migrations from a schema file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schemadiff::lock::DEFAULT_LOCK_FILE;
use oxide_schemadiff::prelude::*;
use oxide_schemadiff::report;

/// Schema diffing and migration generation.
#[derive(Parser)]
#[command(name = "oxide-schemadiff")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Migrations directory.
    #[arg(
        short,
        long,
        env = "OXIDE_MIGRATIONS_DIR",
        default_value = "migrations"
    )]
    migrations_dir: PathBuf,

    /// Lock file name inside the migrations directory.
    #[arg(long, default_value = DEFAULT_LOCK_FILE)]
    lock_file: String,

    /// SQL dialect of the generated scripts.
    #[arg(short, long, env = "OXIDE_DIALECT", value_enum, default_value_t = DialectKind::Postgres)]
    dialect: DialectKind,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the next migration from schema changes.
    Generate {
        /// Schema file describing the desired state.
        #[arg(short, long)]
        schema: PathBuf,

        /// Migration name/description.
        #[arg(short, long)]
        name: String,

        /// Show SQL without writing files (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the changes between the lock file and a schema file.
    Diff {
        /// Schema file describing the desired state.
        #[arg(short, long)]
        schema: PathBuf,

        /// Print the changes as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the schema recorded in the lock file.
    Lock,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let color = !cli.no_color;
    if !color {
        colored::control::set_override(false);
    }

    let config = GeneratorConfig {
        migrations_dir: cli.migrations_dir,
        lock_file: cli.lock_file,
        dialect: cli.dialect,
        ..GeneratorConfig::default()
    };

    match cli.command {
        Commands::Generate {
            schema,
            name,
            dry_run,
        } => {
            let store = config.store();
            let generator = MigrationGenerator::new(name, store.clone(), config.dialect.dialect())
                .with_lock_file(config.lock());
            let migration = generator.build(&JsonSchemaFile::new(schema))?;

            if migration.is_empty() {
                info!("No schema changes detected, nothing to generate");
                return Ok(());
            }

            print!("{}", report::summarize(&migration.up, color));

            if dry_run {
                info!("Dry run mode - no files will be written.");
                if let Some(rendered) = Renderer::new(generator.dialect()).render(&migration)? {
                    println!("\n-- up\n{}", rendered.up);
                    println!("-- down\n{}", rendered.down);
                }
                return Ok(());
            }

            if let GenerateOutcome::Written(written) = generator.generate(&migration)? {
                info!("Created {}", store.path(&written.down).display());
                info!("Created {}", store.path(&written.up).display());
                info!("Updated {}", store.path(&written.lock).display());
            }
        }

        Commands::Diff { schema, json } => {
            let generator = MigrationGenerator::new("diff", config.store(), config.dialect.dialect())
                .with_lock_file(config.lock());
            let migration = generator.build(&JsonSchemaFile::new(schema))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&migration.up)?);
            } else if migration.is_empty() {
                info!("No schema changes detected.");
            } else {
                print!("{}", report::summarize(&migration.up, color));
            }
        }

        Commands::Lock => {
            let snapshot = config.lock().load(&config.store())?;

            if snapshot.is_empty() {
                info!("The lock file records no tables yet.");
            } else {
                println!("\nLocked tables:");
                println!("{:-<60}", "");
                for table in snapshot.tables.values() {
                    println!(
                        " {} ({} column(s), {} index(es))",
                        table.name,
                        table.columns.len(),
                        table.indexes.len()
                    );
                }
                println!();
            }
        }
    }

    Ok(())
}
