// src/main.rs

//! `mig` — thin CLI front-end over the `mig` library. Loads `db.toml`,
//! opens a connection to the target database, and dispatches to one of
//! the five subcommands. ANSI coloring and exit codes follow §6 exactly.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mig::{config, executor, store};
use rusqlite::Connection;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "mig", version, about = "Declarative schema migration engine for SQLite")]
struct Cli {
    /// Path to the project file describing the desired schema.
    #[arg(short, long, default_value = "db.toml")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dry-run: print the proposed migration without touching the database.
    Status,
    /// Apply the proposed migration transactionally.
    Commit,
    /// Read SQL from standard input, execute it, and attach it to the last migration.
    Manual,
    /// List every stored migration, most recent first.
    History,
    /// Append arbitrary SQL (read from standard input) to the last stored migration.
    Amend,
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn open_project(path: &PathBuf) -> Result<config::Project> {
    config::load(path, &process_env).with_context(|| format!("loading project file {}", path.display()))
}

fn open_db(project: &config::Project) -> Result<Connection> {
    let conn = Connection::open(&project.db_file_path)
        .map_err(|e| mig::Error::FailedOpenDb { db_file: project.db_file_path.clone(), msg: e.to_string() })?;
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
    Ok(conn)
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let project = open_project(&cli.project)?;
    let desired = config::desired_schema(&project)?;

    match cli.command {
        Commands::Status => {
            let conn = open_db(&project)?;
            let proposals = executor::dry_migration(&conn, &desired, &process_env)?;
            if proposals.is_empty() {
                println!("{GREEN}nothing to migrate{RESET}");
                return Ok(());
            }
            for p in &proposals {
                println!("{YELLOW}-- {}{RESET}", p.reason);
                for stmt in &p.statements {
                    println!("{stmt};");
                }
            }
        }
        Commands::Commit => {
            let mut conn = open_db(&project)?;
            let outcome = executor::commit(
                &mut conn,
                &desired,
                &project.db_file_path,
                &project.schema_version,
                &project.version_remarks,
                &process_env,
            )?;
            match outcome {
                executor::CommitOutcome::NothingToMigrate => {
                    println!("{GREEN}nothing to migrate{RESET}");
                }
                executor::CommitOutcome::Applied(intent) => {
                    let mut failed = false;
                    for (i, step) in intent.steps.iter().enumerate() {
                        match &step.error {
                            None => println!("{GREEN}step {i} ok{RESET}: {}", step.proposal.reason),
                            Some(e) => {
                                failed = true;
                                println!("{RED}step {i} failed{RESET}: {}: {e}", step.proposal.reason);
                            }
                        }
                    }
                    if failed {
                        anyhow::bail!("migration rolled back");
                    }
                    println!("{GREEN}committed {} step(s){RESET}", intent.steps.len());
                }
            }
        }
        Commands::Manual => {
            let mut conn = open_db(&project)?;
            executor::manual_migration(&mut conn, &desired, &process_env)?;
            println!("{GREEN}manual migration recorded{RESET}");
        }
        Commands::History => {
            let conn = open_db(&project)?;
            let migrations = store::get_migrations(&conn)?;
            if migrations.is_empty() {
                println!("{YELLOW}no migrations recorded{RESET}");
                return Ok(());
            }
            for m in &migrations {
                println!("{GREEN}{}{RESET} {} {YELLOW}{}{RESET} {}", m.date, m.hash, m.schema_version, m.version_remarks);
                for step in &m.steps {
                    match &step.error {
                        None => println!("  step {} {}", step.step_index, step.reason),
                        Some(e) => println!("  {RED}step {} {} failed: {e}{RESET}", step.step_index, step.reason),
                    }
                }
            }
        }
        Commands::Amend => {
            let conn = open_db(&project)?;
            let mut sql = String::new();
            std::io::stdin().read_line(&mut sql)?;
            let extra = mig::model::ProposalResult::ok(mig::model::SolverProposal {
                reason: mig::model::Diff::Added("manual intervention".to_string()),
                statements: vec![sql.trim().to_string()],
            });
            executor::append_last_migration(&conn, std::slice::from_ref(&extra))?;
            println!("{GREEN}amended last migration{RESET}");
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    info!("mig starting");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{RED}{e}{RESET}");
            ExitCode::FAILURE
        }
    }
}
