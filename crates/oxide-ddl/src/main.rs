//! oxide-ddl CLI
//!
//! Command-line tool for diffing SQLite schemas and generating migrations.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_ddl::prelude::*;
use oxide_ddl::resolver::RENAME_SIMILARITY_THRESHOLD;

/// Schema diffing and DDL planning for SQLite.
#[derive(Parser)]
#[command(name = "oxide-ddl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Rename options shared by `diff` and `generate`.
#[derive(clap::Args)]
struct RenameArgs {
    /// Explicit rename, `from->to` for tables or `table.from->table.to` for columns.
    #[arg(short, long = "rename")]
    renames: Vec<String>,

    /// Detect remaining renames by name similarity.
    #[arg(long)]
    detect_renames: bool,

    /// Similarity threshold for detected renames.
    #[arg(long, default_value_t = RENAME_SIMILARITY_THRESHOLD)]
    threshold: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SQL migrating one schema into another.
    Diff {
        /// Current schema: a snapshot or an interim schema JSON file.
        #[arg(long)]
        from: PathBuf,

        /// Target interim schema JSON file.
        #[arg(long)]
        to: PathBuf,

        #[command(flatten)]
        renames: RenameArgs,

        /// Plan for direct application instead of a migration file.
        #[arg(long)]
        push: bool,

        /// Print statements with their SQL as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write the next migration against the latest snapshot.
    Generate {
        /// Target interim schema JSON file.
        #[arg(long)]
        to: PathBuf,

        /// Migration name.
        #[arg(short, long)]
        name: String,

        /// Migrations directory.
        #[arg(short, long, env = "OXIDE_DDL_OUT", default_value = "migrations")]
        out: PathBuf,

        /// Separate statements with breakpoints.
        #[arg(long, env = "OXIDE_DDL_BREAKPOINTS", default_value_t = true, action = ArgAction::Set)]
        breakpoints: bool,

        #[command(flatten)]
        renames: RenameArgs,
    },

    /// Validate an interim schema.
    Check {
        /// Interim schema JSON file.
        #[arg(long)]
        schema: PathBuf,
    },
}

impl RenameArgs {
    fn apply(self, config: DiffConfig) -> DiffConfig {
        let mut config = config;
        config.renames = self.renames;
        if self.detect_renames {
            config = config.detect_renames(self.threshold);
        }
        config
    }
}

/// Loads a schema from a snapshot or an interim schema file.
fn load_ddl(path: &Path) -> anyhow::Result<SqliteDdl> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    if value.get("ddl").is_some() {
        let snapshot = Snapshot::load(path)?;
        return Ok(snapshot.to_ddl()?);
    }
    let schema: InterimSchema = serde_json::from_value(value)?;
    Ok(build_ddl(&schema)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Diff {
            from,
            to,
            renames,
            push,
            json,
        } => {
            let mode = if push { DiffMode::Push } else { DiffMode::Generate };
            let config = renames.apply(DiffConfig::new().mode(mode));
            let result = ddl_diff_with_config(load_ddl(&from)?, load_ddl(&to)?, &config).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result.groups)?);
            } else if result.is_empty() {
                info!("No schema changes detected.");
            } else {
                for rename in &result.renames {
                    info!(rename = %rename, "Rename");
                }
                println!("{}", migration_sql(&result.sql_statements, false));
            }
        }

        Commands::Generate {
            to,
            name,
            out,
            breakpoints,
            renames,
        } => {
            let config = renames.apply(DiffConfig::new().out_dir(out).breakpoints(breakpoints));
            let migrations = MigrationDir::new(&config.out_dir);
            let previous = migrations.latest_snapshot()?;
            let target = build_ddl(&InterimSchema::load(&to)?)?;

            let result = ddl_diff_with_config(previous.to_ddl()?, target.clone(), &config).await?;
            if result.is_empty() {
                info!("No schema changes detected.");
                return Ok(());
            }

            let sql = migration_sql(&result.sql_statements, config.breakpoints);
            let snapshot = Snapshot::from_ddl(&target, previous.id, result.renames.clone());
            let entry = migrations.write(&name, &sql, &snapshot, config.breakpoints)?;
            info!(
                tag = %entry.tag,
                statements = result.statements.len(),
                "Migration generated"
            );
        }

        Commands::Check { schema } => {
            let interim = InterimSchema::load(&schema)?;
            let (_, errors) = interim_to_ddl(&interim);
            if !errors.is_empty() {
                return Err(DdlError::InvalidSchema(errors).into());
            }
            info!(path = %schema.display(), "Schema is valid.");
        }
    }

    Ok(())
}
