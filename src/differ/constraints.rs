// src/differ/constraints.rs

//! Category 4: table-level constraint changes. SQLite's `ALTER TABLE`
//! cannot add or drop a constraint directly, so any difference here is
//! repaired by the five-statement "recreate" sequence: rebuild the table
//! under an auxiliary name with the new definition, copy over the
//! column-intersection rows, drop the old table, and rename the new one
//! into place. Any view that reads from the table is dropped first (and
//! left for the next invocation's `views` category to recreate).

use super::set_diff;
use crate::generator;
use crate::model::{CreateTable, Diff, SolverProposal, SqlFile};

pub(super) fn diff(current: &SqlFile, desired: &SqlFile) -> Vec<SolverProposal> {
    let tables = set_diff(&current.tables, &desired.tables, |t| t.name.clone());

    let mut out = Vec::new();

    for (_, cur_table, des_table) in &tables.common {
        let d = set_diff(&cur_table.constraints, &des_table.constraints, generator::render_table_constraint);
        if d.removed.is_empty() && d.added.is_empty() {
            continue;
        }

        let reason = match (d.removed.first(), d.added.first()) {
            (None, Some((k, _))) => Diff::Added(k.clone()),
            (Some((k, _)), None) => Diff::Removed(k.clone()),
            (Some((rk, _)), Some((ak, _))) => Diff::Changed(rk.clone(), ak.clone()),
            (None, None) => unreachable!("checked above"),
        };

        out.push(SolverProposal { reason, statements: recreate_table(current, des_table) });
    }

    out
}

/// The five-statement recreate sequence for `table`'s new definition
/// (`des_table`), given the live schema `current` (used to find
/// dependent views and the current table's columns for the intersection
/// copy).
pub(super) fn recreate_table(current: &SqlFile, des_table: &CreateTable) -> Vec<String> {
    let mut stmts = Vec::new();

    for view in super::views_referencing(current, &des_table.name) {
        stmts.push(generator::render_drop_view_if_exists(view));
    }

    let aux = format!("{}_aux", des_table.name);
    let aux_table = CreateTable { name: aux.clone(), columns: des_table.columns.clone(), constraints: des_table.constraints.clone() };
    stmts.push(generator::render_create_table(&aux_table));

    let intersection: Vec<String> = match current.table(&des_table.name) {
        Some(cur_table) => des_table
            .columns
            .iter()
            .map(|c| &c.name)
            .filter(|name| cur_table.columns.iter().any(|c| &&c.name == name))
            .cloned()
            .collect(),
        None => des_table.columns.iter().map(|c| c.name.clone()).collect(),
    };
    let cols = intersection.join(", ");
    stmts.push(format!("INSERT OR IGNORE INTO {aux}({cols}) SELECT {cols} FROM {}", des_table.name));

    stmts.push(generator::render_drop_table(&des_table.name));
    stmts.push(format!("ALTER TABLE {aux} RENAME TO {}", des_table.name));

    stmts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql_file;

    #[test]
    fn adds_unique_constraint_via_recreate() {
        let current = parse_sql_file("CREATE TABLE t(id integer NOT NULL);").unwrap();
        let desired = parse_sql_file("CREATE TABLE t(id integer NOT NULL, UNIQUE(id));").unwrap();

        let proposals = diff(&current, &desired);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].reason, Diff::Added("UNIQUE(id)".to_string()));
        assert_eq!(
            proposals[0].statements,
            vec![
                "CREATE TABLE t_aux(id integer NOT NULL, UNIQUE(id))".to_string(),
                "INSERT OR IGNORE INTO t_aux(id) SELECT id FROM t".to_string(),
                "DROP TABLE t".to_string(),
                "ALTER TABLE t_aux RENAME TO t".to_string(),
            ]
        );
    }
}
