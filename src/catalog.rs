// src/catalog.rs

//! Reads the live schema off a SQLite connection by querying
//! `sqlite_master` and feeding the user-object DDL back through the SQL
//! Parser, so the Differ always compares two `SqlFile`s.

use crate::error::Result;
use crate::model::SqlFile;
use crate::parser::parse_sql_file_with_inserts;
use crate::store::STORE_TABLE_PREFIX;
use rusqlite::Connection;
use tracing::debug;

/// Reads every user-defined table/view/index DDL statement from
/// `sqlite_master`, excluding SQLite's own `sqlite_*` objects and the
/// migration store's own tables, and re-parses the concatenation.
pub fn read_schema(conn: &Connection) -> Result<SqlFile> {
    let mut stmt = conn.prepare(
        "SELECT sql FROM sqlite_master \
         WHERE sql IS NOT NULL AND type IN ('table', 'view', 'index') \
         AND name NOT LIKE 'sqlite_%' AND name NOT LIKE ?1",
    )?;

    let prefix_pattern = format!("{STORE_TABLE_PREFIX}%");
    let rows = stmt.query_map([prefix_pattern], |row| row.get::<_, String>(0))?;

    let mut statements = Vec::new();
    for r in rows {
        statements.push(r?);
    }

    debug!(count = statements.len(), "read catalog statements");

    let joined = statements
        .into_iter()
        .map(|s| if s.trim_end().ends_with(';') { s } else { format!("{s};") })
        .collect::<Vec<_>>()
        .join("\n");

    parse_sql_file_with_inserts(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_reparses_user_tables() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(id integer PRIMARY KEY, name text NOT NULL);").unwrap();
        let file = read_schema(&conn).unwrap();
        assert_eq!(file.tables.len(), 1);
        assert_eq!(file.tables[0].name, "t");
    }

    #[test]
    fn excludes_store_tables() {
        let conn = Connection::open_in_memory().unwrap();
        crate::store::init_store(&conn).unwrap();
        conn.execute_batch("CREATE TABLE t(id integer PRIMARY KEY);").unwrap();
        let file = read_schema(&conn).unwrap();
        assert_eq!(file.tables.len(), 1);
        assert_eq!(file.tables[0].name, "t");
    }
}
