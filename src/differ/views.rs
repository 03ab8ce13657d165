// src/differ/views.rs

//! Category 2: views created or dropped. Keyed by the full rendered
//! `SELECT` text rather than the view's name, so a view renamed without
//! changing its body is matched as unchanged.

use super::set_diff;
use crate::generator;
use crate::model::{Diff, SolverProposal, SqlFile};

pub(super) fn diff(current: &SqlFile, desired: &SqlFile) -> Vec<SolverProposal> {
    let d = set_diff(&current.views, &desired.views, |v| generator::render_with_select(&v.select_union));

    let mut out = Vec::new();

    for (key, view) in &d.removed {
        out.push(SolverProposal { reason: Diff::Removed(key.clone()), statements: vec![generator::render_drop_view(&view.name)] });
    }

    for (key, view) in &d.added {
        out.push(SolverProposal { reason: Diff::Added(key.clone()), statements: vec![generator::render_create_view(view)] });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql_file_with_inserts;

    #[test]
    fn matches_renamed_view_with_identical_body() {
        let current =
            parse_sql_file_with_inserts("CREATE TABLE t(id integer NOT NULL); CREATE VIEW v1 AS SELECT id FROM t;")
                .unwrap();
        let desired =
            parse_sql_file_with_inserts("CREATE TABLE t(id integer NOT NULL); CREATE VIEW v2 AS SELECT id FROM t;")
                .unwrap();
        assert!(diff(&current, &desired).is_empty());
    }

    #[test]
    fn proposes_create_for_new_view() {
        let current = parse_sql_file_with_inserts("CREATE TABLE t(id integer NOT NULL);").unwrap();
        let desired = parse_sql_file_with_inserts(
            "CREATE TABLE t(id integer NOT NULL); CREATE VIEW v AS SELECT id FROM t;",
        )
        .unwrap();
        let proposals = diff(&current, &desired);
        assert_eq!(proposals.len(), 1);
        assert!(matches!(&proposals[0].reason, Diff::Added(_)));
    }
}
