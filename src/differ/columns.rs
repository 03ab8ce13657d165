// src/differ/columns.rs

//! Category 3: columns added or dropped within tables present on both
//! sides. A column whose name and type are unchanged but whose
//! constraints differ falls through to a table recreate, same as a
//! table-level constraint change.

use super::{constraints::recreate_table, set_diff};
use crate::error::{Error, Result};
use crate::generator;
use crate::model::{CreateTable, Diff, SolverProposal, SqlFile};

pub(super) fn diff(current: &SqlFile, desired: &SqlFile) -> Result<Vec<SolverProposal>> {
    let mut out = Vec::new();

    let tables = set_diff(&current.tables, &desired.tables, |t| t.name.clone());

    for (_, cur_table, des_table) in &tables.common {
        out.extend(diff_table_columns(current, cur_table, des_table)?);
    }

    Ok(out)
}

fn diff_table_columns(current: &SqlFile, cur_table: &CreateTable, des_table: &CreateTable) -> Result<Vec<SolverProposal>> {
    let d = set_diff(&cur_table.columns, &des_table.columns, generator::column_identity_key);

    let mut out = Vec::new();

    for (key, _) in &d.removed {
        out.push(SolverProposal {
            reason: Diff::Removed(key.clone()),
            statements: vec![format!("ALTER TABLE {} DROP COLUMN {}", cur_table.name, key.split(' ').next().unwrap())],
        });
    }

    for (key, col) in &d.added {
        if col.default().is_none() {
            return Err(Error::NoDefaultValueForColumn(format!("{}.{}", des_table.name, col.name)));
        }
        out.push(SolverProposal {
            reason: Diff::Added(key.clone()),
            statements: vec![format!("ALTER TABLE {} ADD COLUMN {}", des_table.name, generator::render_column_def(col))],
        });
    }

    let changed: Vec<(String, String)> = d
        .common
        .iter()
        .filter(|(_, cur_col, des_col)| cur_col.constraints != des_col.constraints)
        .map(|(_, cur_col, des_col)| (generator::render_column_def(cur_col), generator::render_column_def(des_col)))
        .collect();

    if !changed.is_empty() {
        let old = changed.iter().map(|(o, _)| o.as_str()).collect::<Vec<_>>().join(", ");
        let new = changed.iter().map(|(_, n)| n.as_str()).collect::<Vec<_>>().join(", ");
        out.push(SolverProposal { reason: Diff::Changed(old, new), statements: recreate_table(current, des_table) });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql_file;

    #[test]
    fn renames_column_as_drop_then_add() {
        let current =
            parse_sql_file("CREATE TABLE t(id integer NOT NULL, column1 text NOT NULL DEFAULT 'bla');").unwrap();
        let desired =
            parse_sql_file("CREATE TABLE t(id integer NOT NULL, column2 text NOT NULL DEFAULT 'bla');").unwrap();

        let proposals = diff(&current, &desired).unwrap();
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].reason, Diff::Removed("column1 text".to_string()));
        assert_eq!(proposals[0].statements, vec!["ALTER TABLE t DROP COLUMN column1".to_string()]);
        assert_eq!(proposals[1].reason, Diff::Added("column2 text".to_string()));
        assert_eq!(
            proposals[1].statements,
            vec!["ALTER TABLE t ADD COLUMN column2 text NOT NULL DEFAULT 'bla'".to_string()]
        );
    }

    #[test]
    fn rejects_added_column_without_default() {
        let current = parse_sql_file("CREATE TABLE t(id integer NOT NULL);").unwrap();
        let desired = parse_sql_file("CREATE TABLE t(id integer NOT NULL, extra text NOT NULL);").unwrap();
        let err = diff(&current, &desired).unwrap_err();
        assert!(matches!(err, Error::NoDefaultValueForColumn(_)));
    }
}
