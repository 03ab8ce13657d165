// tests/integration_test.rs

//! Black-box tests driving the parser, differ, and executor together
//! against a real on-disk SQLite database.

use mig::model::{Diff, ProposalResult, SolverProposal};
use mig::parser::parse_sql_file;
use mig::{catalog, differ, executor, store};
use rusqlite::Connection;
use tempfile::NamedTempFile;

fn no_env(_: &str) -> Option<String> {
    None
}

fn temp_db() -> (NamedTempFile, Connection) {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    (file, conn)
}

#[test]
fn scenario_a_add_table() {
    let (_file, conn) = temp_db();
    let desired = parse_sql_file("CREATE TABLE table0(id integer NOT NULL);").unwrap();

    let proposals = executor::dry_migration(&conn, &desired, &no_env).unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].reason, Diff::Added("table0".to_string()));
    assert_eq!(proposals[0].statements, vec!["CREATE TABLE table0(id integer NOT NULL)".to_string()]);
}

#[test]
fn scenario_b_rename_column_as_drop_then_add() {
    let (_file, mut conn) = temp_db();
    conn.execute_batch("CREATE TABLE t(id integer NOT NULL, column1 text NOT NULL DEFAULT 'bla');").unwrap();

    let desired = parse_sql_file("CREATE TABLE t(id integer NOT NULL, column2 text NOT NULL DEFAULT 'bla');").unwrap();
    let outcome = executor::commit(&mut conn, &desired, "test.db", "1", "rename column", &no_env).unwrap();
    assert!(matches!(outcome, executor::CommitOutcome::Applied(_)));

    let current = catalog::read_schema(&conn).unwrap();
    let remaining = differ::diff(&current, &desired, &no_env).unwrap();
    assert!(remaining.is_empty(), "schema should converge after one round of recreate-driven drop+add");
}

#[test]
fn scenario_c_add_unique_constraint_via_recreate() {
    let (_file, mut conn) = temp_db();
    conn.execute_batch("CREATE TABLE t(id integer NOT NULL);").unwrap();

    let desired = parse_sql_file("CREATE TABLE t(id integer NOT NULL, UNIQUE(id));").unwrap();
    let outcome = executor::commit(&mut conn, &desired, "test.db", "1", "add unique", &no_env).unwrap();
    assert!(matches!(outcome, executor::CommitOutcome::Applied(_)));

    let current = catalog::read_schema(&conn).unwrap();
    assert!(current.table("t").unwrap().constraints.iter().any(|c| matches!(c, mig::model::ColumnConstraint::Unique(_))));
}

#[test]
fn scenario_d_synchronized_row_update() {
    let (_file, mut conn) = temp_db();
    conn.execute_batch(
        "CREATE TABLE t(id integer PRIMARY KEY, name text NOT NULL); INSERT INTO t(id, name) VALUES (1, 'zero');",
    )
    .unwrap();

    let desired = mig::parser::parse_sql_file_with_inserts(
        "CREATE TABLE t(id integer PRIMARY KEY, name text NOT NULL); INSERT INTO t(id, name) VALUES (1, 'one');",
    )
    .unwrap();

    let outcome = executor::commit(&mut conn, &desired, "test.db", "1", "update row", &no_env).unwrap();
    let intent = match outcome {
        executor::CommitOutcome::Applied(intent) => intent,
        _ => panic!("expected a migration to be applied"),
    };
    assert_eq!(intent.steps.len(), 1);
    assert_eq!(intent.steps[0].proposal.reason, Diff::Changed("zero".to_string(), "one".to_string()));

    let name: String = conn.query_row("SELECT name FROM t WHERE id = 1", [], |r| r.get(0)).unwrap();
    assert_eq!(name, "one");
}

#[test]
fn scenario_e_synchronized_row_delete_then_insert() {
    let (_file, mut conn) = temp_db();
    conn.execute_batch(
        "CREATE TABLE t(id integer PRIMARY KEY, name text NOT NULL); INSERT INTO t(id, name) VALUES (1, 'one');",
    )
    .unwrap();

    let desired = mig::parser::parse_sql_file_with_inserts(
        "CREATE TABLE t(id integer PRIMARY KEY, name text NOT NULL); INSERT INTO t(id, name) VALUES (2, 'two');",
    )
    .unwrap();

    let outcome = executor::commit(&mut conn, &desired, "test.db", "1", "swap rows", &no_env).unwrap();
    let intent = match outcome {
        executor::CommitOutcome::Applied(intent) => intent,
        _ => panic!("expected a migration to be applied"),
    };
    assert_eq!(intent.steps.len(), 1);
    assert_eq!(intent.steps[0].proposal.reason, Diff::Removed("1".to_string()));

    // The remaining Added("2") proposal surfaces on the next invocation, since
    // each commit stops after the first non-empty category.
    let current = catalog::read_schema(&conn).unwrap();
    let remaining = differ::diff(&current, &desired, &no_env).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].reason, Diff::Added("2".to_string()));
}

#[test]
fn scenario_f_hash_chaining_after_amend() {
    let (_file, conn) = temp_db();
    store::init_store(&conn).unwrap();

    let intent = mig::model::MigrationIntent {
        version_remarks: "initial".to_string(),
        schema_version: "1".to_string(),
        date: "2026-07-26T00:00:00.000Z".to_string(),
        steps: vec![ProposalResult {
            proposal: SolverProposal { reason: Diff::Added("table0".to_string()), statements: vec!["bogus sql".to_string()] },
            error: Some("no such syntax".to_string()),
        }],
    };
    store::store_migration(&conn, &intent, "test.db").unwrap();

    let extra = ProposalResult::ok(SolverProposal {
        reason: Diff::Added("table0 fixed".to_string()),
        statements: vec!["CREATE TABLE table0(id integer NOT NULL)".to_string()],
    });
    store::append_last_migration(&conn, std::slice::from_ref(&extra), "2026-07-26T00:01:00.000Z").unwrap();

    let migrations = store::get_migrations(&conn).unwrap();
    assert_eq!(migrations.len(), 1);
    let m = &migrations[0];
    assert_eq!(m.steps.len(), 2);
    assert_eq!(m.steps[0].step_index, 0);
    assert_eq!(m.steps[1].step_index, 1);
    assert!(m.steps[0].error.is_some());
    assert!(m.steps[1].error.is_none());

    let combined = mig::model::MigrationIntent {
        version_remarks: m.version_remarks.clone(),
        schema_version: m.schema_version.clone(),
        date: m.date.clone(),
        steps: vec![
            ProposalResult {
                proposal: SolverProposal { reason: m.steps[0].reason.clone(), statements: vec!["bogus sql".to_string()] },
                error: m.steps[0].error.clone(),
            },
            ProposalResult { proposal: SolverProposal { reason: m.steps[1].reason.clone(), statements: vec![m.steps[1].sql.clone()] }, error: None },
        ],
    };
    assert_eq!(m.hash, store::hash_intent(&combined, "test.db"));
}

#[test]
fn dry_migration_against_a_real_file_never_mutates() {
    let (_file, conn) = temp_db();
    let desired = parse_sql_file("CREATE TABLE t(id integer NOT NULL);").unwrap();
    let proposals = executor::dry_migration(&conn, &desired, &no_env).unwrap();
    assert_eq!(proposals.len(), 1);
    assert!(catalog::read_schema(&conn).unwrap().tables.is_empty());
}
