// src/store.rs

//! The migration store: a hash-chained, tamper-evident audit log of every
//! migration ever applied, kept in three tables sharing a common name
//! prefix alongside the user's own schema.

use crate::error::{Error, Result};
use crate::model::{Diff, MigrationIntent, ProposalResult, SolverProposal};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tracing::info;

pub const STORE_TABLE_PREFIX: &str = "github_com_lamg_migrate_";

fn migration_table() -> String {
    format!("{STORE_TABLE_PREFIX}migration")
}
fn step_table() -> String {
    format!("{STORE_TABLE_PREFIX}step")
}
fn error_table() -> String {
    format!("{STORE_TABLE_PREFIX}error")
}

fn canonical_ddl() -> [(String, String); 3] {
    [
        (
            migration_table(),
            format!(
                "CREATE TABLE {}(\n  id             integer PRIMARY KEY AUTOINCREMENT,\n  hash           text NOT NULL,\n  versionRemarks text NOT NULL,\n  date           text NOT NULL,\n  dbFile         text NOT NULL,\n  schemaVersion  text NOT NULL)",
                migration_table()
            ),
        ),
        (
            step_table(),
            format!(
                "CREATE TABLE {}(\n  migrationId integer NOT NULL,\n  stepIndex   integer NOT NULL,\n  reason      text    NOT NULL,\n  sql         text    NOT NULL,\n  PRIMARY KEY (migrationId, stepIndex))",
                step_table()
            ),
        ),
        (
            error_table(),
            format!(
                "CREATE TABLE {}(\n  migrationId integer NOT NULL,\n  stepIndex   integer NOT NULL,\n  error       text    NOT NULL,\n  PRIMARY KEY (migrationId, stepIndex))",
                error_table()
            ),
        ),
    ]
}

/// Creates the store's tables if absent. If present, the caller is
/// trusted to have a schema-compatible database; we only verify the
/// three table names exist, since SQLite doesn't let us diff column
/// definitions without parsing `sqlite_master` ourselves (the Catalog
/// Reader already does that for user tables).
pub fn init_store(conn: &Connection) -> Result<()> {
    for (name, ddl) in canonical_ddl() {
        let existing: Option<String> = conn
            .query_row("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1", params![name], |r| r.get(0))
            .optional()?;

        match existing {
            None => {
                conn.execute_batch(&ddl).map_err(|e| Error::FailedOpenStore(e.to_string()))?;
            }
            Some(found) => {
                if normalize_ddl(&found) != normalize_ddl(&ddl) {
                    return Err(Error::FailedOpenStore(format!("store table {name} has an unexpected schema")));
                }
            }
        }
    }
    Ok(())
}

fn normalize_ddl(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The hash-canonical rendering of an intent's steps (§6), fed to SHA-256.
pub fn canonical_text(intent: &MigrationIntent, db_file: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("-- version_remarks: {}\n", intent.version_remarks));
    out.push_str(&format!("-- migration_date: {}\n", intent.date));
    out.push_str(&format!("--version: {}\n", intent.schema_version));
    out.push_str(&format!("-- database: {db_file}\n"));
    for (i, step) in intent.steps.iter().enumerate() {
        out.push_str(&format!("-- step {i} {}\n", step.proposal.reason));
        out.push_str(&step_sql_block(&step.proposal));
        out.push_str(";\n");
    }
    out
}

fn step_sql_block(proposal: &SolverProposal) -> String {
    proposal.statements.join(";\n")
}

pub fn hash_intent(intent: &MigrationIntent, db_file: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_text(intent, db_file).as_bytes());
    hex::encode(hasher.finalize())
}

/// Inserts one `migration` row, one `step` row per `ProposalResult`, and
/// one `error` row for each failed step. The caller guarantees
/// `intent.steps` is non-empty.
pub fn store_migration(conn: &Connection, intent: &MigrationIntent, db_file: &str) -> Result<i64> {
    let hash = hash_intent(intent, db_file);

    conn.execute(
        &format!(
            "INSERT INTO {}(hash, versionRemarks, date, dbFile, schemaVersion) VALUES (?1, ?2, ?3, ?4, ?5)",
            migration_table()
        ),
        params![hash, intent.version_remarks, intent.date, db_file, intent.schema_version],
    )?;
    let migration_id = conn.last_insert_rowid();

    for (i, step) in intent.steps.iter().enumerate() {
        conn.execute(
            &format!("INSERT INTO {}(migrationId, stepIndex, reason, sql) VALUES (?1, ?2, ?3, ?4)", step_table()),
            params![migration_id, i as i64, step.proposal.reason.to_string(), step_sql_block(&step.proposal)],
        )?;
        if let Some(err) = &step.error {
            conn.execute(
                &format!("INSERT INTO {}(migrationId, stepIndex, error) VALUES (?1, ?2, ?3)", error_table()),
                params![migration_id, i as i64, err],
            )?;
        }
    }

    info!(migration_id, steps = intent.steps.len(), "stored migration");
    Ok(migration_id)
}

#[derive(Debug, Clone)]
pub struct StoredStep {
    pub step_index: i64,
    pub reason: Diff,
    pub sql: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredMigration {
    pub id: i64,
    pub hash: String,
    pub version_remarks: String,
    pub date: String,
    pub db_file: String,
    pub schema_version: String,
    pub steps: Vec<StoredStep>,
}

/// Returns every stored migration, most recent first, each joined with
/// its steps and their optional errors.
pub fn get_migrations(conn: &Connection) -> Result<Vec<StoredMigration>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, hash, versionRemarks, date, dbFile, schemaVersion FROM {} ORDER BY date DESC",
        migration_table()
    ))?;
    let mut migrations: Vec<StoredMigration> = stmt
        .query_map([], |r| {
            Ok(StoredMigration {
                id: r.get(0)?,
                hash: r.get(1)?,
                version_remarks: r.get(2)?,
                date: r.get(3)?,
                db_file: r.get(4)?,
                schema_version: r.get(5)?,
                steps: Vec::new(),
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    for m in &mut migrations {
        m.steps = get_steps(conn, m.id)?;
    }

    Ok(migrations)
}

fn get_steps(conn: &Connection, migration_id: i64) -> Result<Vec<StoredStep>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT s.stepIndex, s.reason, s.sql, e.error \
         FROM {} s LEFT JOIN {} e ON e.migrationId = s.migrationId AND e.stepIndex = s.stepIndex \
         WHERE s.migrationId = ?1 ORDER BY s.stepIndex ASC",
        step_table(),
        error_table()
    ))?;

    let rows = stmt.query_map(params![migration_id], |r| {
        let reason_text: String = r.get(1)?;
        Ok((r.get::<_, i64>(0)?, reason_text, r.get::<_, String>(2)?, r.get::<_, Option<String>>(3)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (step_index, reason_text, sql, error) = row?;
        let reason = parse_reason(&reason_text)?;
        out.push(StoredStep { step_index, reason, sql, error });
    }
    Ok(out)
}

/// Extends the most recently stored migration with `extra` steps,
/// re-hashing over the combined step list and updating the migration
/// row's `hash` and `date` in place.
pub fn append_last_migration(conn: &Connection, extra: &[ProposalResult], date: &str) -> Result<()> {
    let mut migrations = get_migrations(conn)?;
    let last = migrations.first_mut().ok_or_else(|| Error::FailedOpenStore("no migration to amend".to_string()))?;

    let start_index = last.steps.len() as i64;
    for (offset, step) in extra.iter().enumerate() {
        let idx = start_index + offset as i64;
        conn.execute(
            &format!("INSERT INTO {}(migrationId, stepIndex, reason, sql) VALUES (?1, ?2, ?3, ?4)", step_table()),
            params![last.id, idx, step.proposal.reason.to_string(), step_sql_block(&step.proposal)],
        )?;
        if let Some(err) = &step.error {
            conn.execute(
                &format!("INSERT INTO {}(migrationId, stepIndex, error) VALUES (?1, ?2, ?3)", error_table()),
                params![last.id, idx, err],
            )?;
        }
    }

    let combined = MigrationIntent {
        version_remarks: last.version_remarks.clone(),
        schema_version: last.schema_version.clone(),
        date: date.to_string(),
        steps: last
            .steps
            .iter()
            .map(|s| ProposalResult {
                proposal: SolverProposal { reason: s.reason.clone(), statements: split_sql_block(&s.sql) },
                error: s.error.clone(),
            })
            .chain(extra.iter().cloned())
            .collect(),
    };
    let new_hash = hash_intent(&combined, &last.db_file);

    conn.execute(
        &format!("UPDATE {} SET hash = ?1, date = ?2 WHERE id = ?3", migration_table()),
        params![new_hash, date, last.id],
    )?;

    Ok(())
}

fn split_sql_block(s: &str) -> Vec<String> {
    s.split(";\n").map(str::to_string).collect()
}

fn added_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"^Added "(.*)"$"#).unwrap())
}
fn removed_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"^Removed "(.*)"$"#).unwrap())
}
fn changed_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r#"^Changed \("(.*)", "(.*)"\)$"#).unwrap())
}

/// The inverse of `Diff`'s `Display` impl; used to reconstitute a stored
/// reason string back into a `Diff`.
pub fn parse_reason(text: &str) -> Result<Diff> {
    if let Some(c) = added_re().captures(text) {
        return Ok(Diff::Added(c[1].to_string()));
    }
    if let Some(c) = removed_re().captures(text) {
        return Ok(Diff::Removed(c[1].to_string()));
    }
    if let Some(c) = changed_re().captures(text) {
        return Ok(Diff::Changed(c[1].to_string(), c[2].to_string()));
    }
    Err(Error::UnparseableReason(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_reason_shapes() {
        assert_eq!(parse_reason(r#"Added "table0""#).unwrap(), Diff::Added("table0".to_string()));
        assert_eq!(parse_reason(r#"Removed "col text""#).unwrap(), Diff::Removed("col text".to_string()));
        assert_eq!(
            parse_reason(r#"Changed ("zero", "one")"#).unwrap(),
            Diff::Changed("zero".to_string(), "one".to_string())
        );
    }

    #[test]
    fn rejects_unrecognized_reason() {
        assert!(matches!(parse_reason("nonsense"), Err(Error::UnparseableReason(_))));
    }

    #[test]
    fn reason_round_trips_through_display() {
        let d = Diff::Changed("a".to_string(), "b".to_string());
        assert_eq!(parse_reason(&d.to_string()).unwrap(), d);
    }

    #[test]
    fn init_store_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_store(&conn).unwrap();
        init_store(&conn).unwrap();
    }

    #[test]
    fn stores_and_reads_back_a_migration() {
        let conn = Connection::open_in_memory().unwrap();
        init_store(&conn).unwrap();

        let intent = MigrationIntent {
            version_remarks: "initial".to_string(),
            schema_version: "1".to_string(),
            date: "2026-07-26T00:00:00.000Z".to_string(),
            steps: vec![ProposalResult::ok(SolverProposal {
                reason: Diff::Added("table0".to_string()),
                statements: vec!["CREATE TABLE table0(id integer NOT NULL)".to_string()],
            })],
        };

        store_migration(&conn, &intent, "test.db").unwrap();
        let migrations = get_migrations(&conn).unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].steps.len(), 1);
        assert_eq!(migrations[0].steps[0].reason, Diff::Added("table0".to_string()));
    }
}
