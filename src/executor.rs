// src/executor.rs

//! Orchestrates the read-schema → diff → apply → record cycle. The only
//! component that opens a write transaction against the target database.

use crate::catalog;
use crate::differ;
use crate::error::{Error, Result};
use crate::model::{Diff, MigrationIntent, ProposalResult, SolverProposal, SqlFile};
use crate::store;
use crate::typecheck;
use chrono::Utc;
use rusqlite::Connection;
use std::io::Read;
use tracing::{error, info, warn};

pub enum CommitOutcome {
    NothingToMigrate,
    Applied(MigrationIntent),
}

fn now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// §4.4 steps 1–2 only: never opens a write transaction.
pub fn dry_migration(conn: &Connection, desired: &SqlFile, env: &dyn Fn(&str) -> Option<String>) -> Result<Vec<SolverProposal>> {
    typecheck::validate(desired)?;
    let current = catalog::read_schema(conn)?;
    differ::diff(&current, desired, env)
}

/// Transactional apply (§4.4). `schema_version`/`version_remarks` come
/// from the project file (`db.toml`), not the schema itself.
pub fn commit(
    conn: &mut Connection,
    desired: &SqlFile,
    db_file: &str,
    schema_version: &str,
    version_remarks: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<CommitOutcome> {
    typecheck::validate(desired)?;
    store::init_store(conn)?;

    let current = catalog::read_schema(&*conn)?;
    let proposals = differ::diff(&current, desired, env)?;

    let stored = store::get_migrations(&*conn)?;
    let stored_version = stored.first().map(|m| m.schema_version.clone()).unwrap_or_default();

    if proposals.is_empty() {
        if stored_version == schema_version {
            info!("nothing to migrate");
            return Ok(CommitOutcome::NothingToMigrate);
        }
        if !stored_version.is_empty() && stored_version.as_str() > schema_version {
            return Err(Error::StaleMigration(0));
        }

        warn!(from = %stored_version, to = %schema_version, "recording version bump with no schema changes");
        let intent = MigrationIntent {
            version_remarks: version_remarks.to_string(),
            schema_version: schema_version.to_string(),
            date: now(),
            steps: vec![ProposalResult::ok(SolverProposal {
                reason: Diff::Changed(stored_version, schema_version.to_string()),
                statements: Vec::new(),
            })],
        };
        store::store_migration(conn, &intent, db_file)?;
        return Ok(CommitOutcome::Applied(intent));
    }

    let tx = conn.transaction()?;
    let mut step_results: Vec<ProposalResult> = Vec::new();

    for proposal in &proposals {
        let mut step_error = None;
        for sql in &proposal.statements {
            if let Err(e) = tx.execute_batch(sql) {
                step_error = Some(e.to_string());
                break;
            }
        }
        let failed = step_error.is_some();
        step_results.push(ProposalResult { proposal: proposal.clone(), error: step_error });
        if failed {
            break;
        }
    }

    let all_ok = step_results.iter().all(|s| s.error.is_none());
    if all_ok {
        tx.commit()?;
        info!(steps = step_results.len(), "migration committed");
    } else {
        tx.rollback()?;
        error!(steps = step_results.len(), "migration rolled back");
    }

    let intent = MigrationIntent {
        version_remarks: version_remarks.to_string(),
        schema_version: schema_version.to_string(),
        date: now(),
        steps: step_results,
    };
    store::store_migration(conn, &intent, db_file)?;

    Ok(CommitOutcome::Applied(intent))
}

/// Reads SQL from standard input until EOF, executes it directly, then
/// re-runs the Differ; fails if the schema still differs afterward. On
/// success, the user-supplied SQL is appended to the most recent stored
/// migration as one additional step.
pub fn manual_migration(conn: &mut Connection, desired: &SqlFile, env: &dyn Fn(&str) -> Option<String>) -> Result<()> {
    typecheck::validate(desired)?;
    let mut sql = String::new();
    std::io::stdin().read_to_string(&mut sql)?;

    conn.execute_batch(&sql)?;

    let current = catalog::read_schema(&*conn)?;
    let remaining = differ::diff(&current, desired, env)?;
    if !remaining.is_empty() {
        return Err(Error::SchemaStillDiffers(remaining.len()));
    }

    let extra = ProposalResult::ok(SolverProposal { reason: Diff::Added("manual intervention".to_string()), statements: vec![sql] });
    store::append_last_migration(conn, std::slice::from_ref(&extra), &now())?;

    Ok(())
}

/// Appends arbitrary pre-built steps to the most recent stored migration.
pub fn append_last_migration(conn: &Connection, extra: &[ProposalResult]) -> Result<()> {
    store::append_last_migration(conn, extra, &now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql_file;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn commit_creates_new_table_and_stores_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        let desired = parse_sql_file("CREATE TABLE t(id integer NOT NULL);").unwrap();

        let outcome = commit(&mut conn, &desired, "test.db", "1", "initial", &no_env).unwrap();
        assert!(matches!(outcome, CommitOutcome::Applied(_)));

        let current = catalog::read_schema(&conn).unwrap();
        assert_eq!(current.tables.len(), 1);

        let migrations = store::get_migrations(&conn).unwrap();
        assert_eq!(migrations.len(), 1);
        assert!(migrations[0].steps[0].error.is_none());
    }

    #[test]
    fn commit_is_a_no_op_when_converged() {
        let mut conn = Connection::open_in_memory().unwrap();
        let desired = parse_sql_file("CREATE TABLE t(id integer NOT NULL);").unwrap();

        commit(&mut conn, &desired, "test.db", "1", "initial", &no_env).unwrap();
        let outcome = commit(&mut conn, &desired, "test.db", "1", "initial", &no_env).unwrap();
        assert!(matches!(outcome, CommitOutcome::NothingToMigrate));
    }

    #[test]
    fn dry_migration_never_mutates() {
        let conn = Connection::open_in_memory().unwrap();
        let desired = parse_sql_file("CREATE TABLE t(id integer NOT NULL);").unwrap();
        let proposals = dry_migration(&conn, &desired, &no_env).unwrap();
        assert_eq!(proposals.len(), 1);
        let current = catalog::read_schema(&conn).unwrap();
        assert!(current.tables.is_empty());
    }
}
