use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;

use rinktrax_admin::fixtures;
use rinktrax_admin::idmap::{MappingTable, SharedMappings, UserMappings};
use rinktrax_admin::restore::{RestoreError, RestoreReport, Restorer, Step, STEP_ORDER};
use rinktrax_admin::tabular::import::{import_maintenance, import_sessions};
use rinktrax_admin::tabular::migrate::migrate_sessions;
use rinktrax_admin::tabular::{CsvTable, DateExclusion};
use rinktrax_admin::validate::validate_user;
use rinktrax_admin::{db, AdminPaths, FixtureError};

#[derive(Debug, Parser)]
#[command(
    name = "rinktrax-admin",
    about = "Rinktrax data restore, migration, and import tool",
    version
)]
struct Cli {
    /// Admin data directory holding fixtures/, migrations/, and sessions/.
    #[arg(long, global = true, env = "RINKTRAX_ADMIN_DIR", default_value = "admin")]
    data_dir: PathBuf,
    /// SQLite database path. Defaults to the platform data directory.
    #[arg(long, global = true, env = "RINKTRAX_DB")]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Restore user data from YAML fixtures into the database.
    Restore {
        /// User fixture directory name (e.g. sparkles).
        user: String,
        /// Run all restore steps in dependency order.
        #[arg(long)]
        all: bool,
        /// Run specific step(s); repeat the flag to run several, in the
        /// order given. Canonical order: pooled, auth, profile, equipment,
        /// memberships, maintenance, sessions.
        #[arg(long = "step", value_enum)]
        steps: Vec<Step>,
    },
    /// Migrate a legacy CSV export into the database with ID translation.
    Migrate {
        /// User migration directory name.
        user: String,
        /// Path to the legacy CSV export.
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import post-migration session data from CSV (no ID translation).
    ImportSessions { user: String, csv_path: PathBuf },
    /// Import maintenance records from CSV, injecting the owner identity
    /// when the export omits it.
    ImportMaintenance { user: String, csv_path: PathBuf },
    /// Validate user fixtures without touching the database.
    Validate { user: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    rinktrax_admin::logging::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let paths = AdminPaths::new(&cli.data_dir);

    // Dry-run validation never opens the database.
    if let Commands::Validate { user } = &cli.command {
        return handle_validate(&paths, user);
    }

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create database parent directory {}", parent.display()))?;
    }
    let pool = db::open_pool(&db_path).await?;
    db::apply_schema(&pool).await?;

    // One logical session per invocation, released on every exit path.
    let result = dispatch(&cli.command, &paths, &pool).await;
    pool.close().await;
    result
}

async fn dispatch(command: &Commands, paths: &AdminPaths, pool: &SqlitePool) -> Result<i32> {
    match command {
        Commands::Restore { user, all, steps } => {
            handle_restore(pool, paths, user, *all, steps).await
        }
        Commands::Migrate { user, csv } => handle_migrate(pool, paths, user, csv).await,
        Commands::ImportSessions { user, csv_path } => {
            handle_import_sessions(pool, paths, user, csv_path).await
        }
        Commands::ImportMaintenance { user, csv_path } => {
            handle_import_maintenance(pool, paths, user, csv_path).await
        }
        Commands::Validate { .. } => unreachable!("validate handled before opening the database"),
    }
}

async fn handle_restore(
    pool: &SqlitePool,
    paths: &AdminPaths,
    user: &str,
    all: bool,
    steps: &[Step],
) -> Result<i32> {
    let steps: Vec<Step> = if all { STEP_ORDER.to_vec() } else { steps.to_vec() };
    if steps.is_empty() {
        eprintln!("restore requires --all or at least one --step");
        return Ok(2);
    }

    println!("Validating pooled references for '{user}'...");
    let restorer = Restorer::new(pool, paths, user);
    match restorer.run(&steps).await {
        Ok(report) => {
            println!("  All references OK\n");
            print_restore_report(&report);
            println!("\nDone.");
            Ok(0)
        }
        Err(RestoreError::ReferencesMissing(issues)) => {
            println!("\n  ABORT -- {} missing pooled reference(s):\n", issues.len());
            for issue in &issues {
                println!("    - {issue}");
            }
            println!("\n  Add the missing entries to fixtures/pooled/ and try again.");
            Ok(1)
        }
        Err(RestoreError::UserDirMissing(path)) => {
            eprintln!("Error: no fixture directory found at {}", path.display());
            Ok(1)
        }
        Err(err) => Err(err.into()),
    }
}

fn print_restore_report(report: &RestoreReport) {
    for step in &report.steps {
        if step.skipped {
            println!("  [{}] skipped", step.step);
        } else if step.failed > 0 {
            println!(
                "  [{}] {} record(s) loaded, {} failed (see log)",
                step.step, step.inserted, step.failed
            );
        } else {
            println!("  [{}] {} record(s) loaded", step.step, step.inserted);
        }
    }
}

async fn handle_migrate(
    pool: &SqlitePool,
    paths: &AdminPaths,
    user: &str,
    csv: &Path,
) -> Result<i32> {
    let shared_path = paths.shared_mappings();
    let user_path = paths.user_mappings(user);
    if !shared_path.is_file() {
        eprintln!("Error: shared mappings not found at {}", shared_path.display());
        return Ok(1);
    }
    if !user_path.is_file() {
        eprintln!("Error: user mappings not found at {}", user_path.display());
        return Ok(1);
    }

    let shared = SharedMappings::load(&shared_path)?;
    let user_maps = UserMappings::load(&user_path)?;
    let mapping = MappingTable::build(&shared, &user_maps);
    let owner = fixtures::owner_id(paths, user)?;
    let table = CsvTable::read(csv)?;

    println!("Migrating legacy data for '{user}'...\n");
    println!("  Read {} rows from {}", table.rows.len(), csv.display());

    let report = migrate_sessions(pool, table, &mapping, &owner).await?;
    print_exclusions(&report.date_invalid, &report.owner_mismatch);
    for (column, values) in &report.unmapped {
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        println!("  Warning: {column} had unmapped values: {values:?}");
    }
    println!(
        "  Migrated {} of {} rows into ice_sessions",
        report.written, report.input_rows
    );
    println!("\nDone.");
    Ok(0)
}

async fn handle_import_sessions(
    pool: &SqlitePool,
    paths: &AdminPaths,
    user: &str,
    csv_path: &Path,
) -> Result<i32> {
    let owner = fixtures::owner_id(paths, user)?;
    let table = CsvTable::read(csv_path)?;

    println!("Importing sessions for '{user}'...\n");
    let report = import_sessions(pool, table, &owner).await?;
    print_exclusions(&report.date_invalid, &report.owner_mismatch);
    println!(
        "  Imported {} of {} sessions from {}",
        report.written,
        report.input_rows,
        csv_path.display()
    );
    println!("\nDone.");
    Ok(0)
}

async fn handle_import_maintenance(
    pool: &SqlitePool,
    paths: &AdminPaths,
    user: &str,
    csv_path: &Path,
) -> Result<i32> {
    let owner = fixtures::owner_id(paths, user)?;
    let table = CsvTable::read(csv_path)?;

    println!("Importing maintenance for '{user}'...\n");
    let report = import_maintenance(pool, table, &owner).await?;
    print_exclusions(&report.date_invalid, &report.owner_mismatch);
    println!(
        "  Imported {} of {} maintenance records from {}",
        report.written,
        report.input_rows,
        csv_path.display()
    );
    println!("\nDone.");
    Ok(0)
}

fn handle_validate(paths: &AdminPaths, user: &str) -> Result<i32> {
    println!("Validating fixtures for '{user}'...\n");
    let outcome = match validate_user(paths, user) {
        Ok(outcome) => outcome,
        Err(FixtureError::Missing(path)) => {
            eprintln!("Error: no fixture directory found at {}", path.display());
            return Ok(1);
        }
        Err(err) => return Err(err.into()),
    };

    for note in &outcome.notes {
        println!("  {note}");
    }
    println!();
    if outcome.ok() {
        println!("  All fixtures valid for '{user}'");
        Ok(0)
    } else {
        println!("  ISSUES ({}):", outcome.issues.len());
        for issue in &outcome.issues {
            println!("    - {issue}");
        }
        Ok(1)
    }
}

fn print_exclusions(date_invalid: &[DateExclusion], owner_mismatch: &BTreeMap<String, u64>) {
    if !date_invalid.is_empty() {
        println!("  SKIPPED {} row(s) with invalid dates:", date_invalid.len());
        for exclusion in date_invalid {
            let mut line = format!("    row {}: date={:?}", exclusion.row, exclusion.value);
            for (name, value) in &exclusion.context {
                line.push_str(&format!(", {name}={value}"));
            }
            println!("{line}");
        }
    }
    if !owner_mismatch.is_empty() {
        let total: u64 = owner_mismatch.values().sum();
        println!("  FILTERED {total} row(s) belonging to other user(s):");
        for (owner, count) in owner_mismatch {
            println!("    {owner}: {count} row(s)");
        }
    }
}

fn default_db_path() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| std::env::current_dir().ok())
        .ok_or_else(|| anyhow::anyhow!("failed to resolve application data directory"))?;
    Ok(base.join("com.rinktrax.admin").join("rinktrax.sqlite3"))
}
