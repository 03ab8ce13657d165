// src/differ/tables.rs

//! Category 1: whole tables created or dropped. Column- and
//! constraint-level differences within a table present on both sides are
//! left to the `columns` and `constraints` categories.

use super::set_diff;
use crate::generator;
use crate::model::{Diff, SolverProposal, SqlFile};

pub(super) fn diff(current: &SqlFile, desired: &SqlFile) -> Vec<SolverProposal> {
    let d = set_diff(&current.tables, &desired.tables, |t| t.name.clone());

    let mut out = Vec::new();

    for (name, _) in &d.removed {
        out.push(SolverProposal {
            reason: Diff::Removed(name.clone()),
            statements: vec![generator::render_drop_table(name)],
        });
    }

    for (name, table) in &d.added {
        out.push(SolverProposal {
            reason: Diff::Added(name.clone()),
            statements: vec![generator::render_create_table(table)],
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql_file;

    #[test]
    fn proposes_create_for_new_table() {
        let desired = parse_sql_file("CREATE TABLE table0(id integer NOT NULL);").unwrap();
        let current = SqlFile::default();
        let proposals = diff(&current, &desired);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].reason, Diff::Added("table0".to_string()));
        assert_eq!(proposals[0].statements, vec!["CREATE TABLE table0(id integer NOT NULL)".to_string()]);
    }

    #[test]
    fn proposes_drop_for_removed_table() {
        let current = parse_sql_file("CREATE TABLE table0(id integer NOT NULL);").unwrap();
        let desired = SqlFile::default();
        let proposals = diff(&current, &desired);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].reason, Diff::Removed("table0".to_string()));
        assert_eq!(proposals[0].statements, vec!["DROP TABLE table0".to_string()]);
    }
}
