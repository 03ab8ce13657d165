// src/differ/inserts.rs

//! Category 5: synchronized rows. For each table declared with `INSERT
//! INTO` statements on both sides, rows are keyed by their primary-key
//! tuple and diffed individually: new keys become `INSERT`s, missing keys
//! become `DELETE`s, and keys present on both sides whose non-PK columns
//! differ become `UPDATE`s.

use super::set_diff;
use crate::error::{Error, Result};
use crate::generator;
use crate::model::{CreateTable, Diff, Expr, InsertInto, SolverProposal, SqlFile};

pub(super) fn diff(current: &SqlFile, desired: &SqlFile, env: &dyn Fn(&str) -> Option<String>) -> Result<Vec<SolverProposal>> {
    let d = set_diff(&current.inserts, &desired.inserts, |i| i.table.clone());

    let mut out = Vec::new();

    for (table_name, insert) in &d.removed {
        let table = resolve_table(current, desired, table_name)?;
        out.extend(diff_rows(table, Some(insert), None, env)?);
    }

    for (table_name, insert) in &d.added {
        let table = resolve_table(current, desired, table_name)?;
        out.extend(diff_rows(table, None, Some(insert), env)?);
    }

    for (table_name, cur_insert, des_insert) in &d.common {
        let table = resolve_table(current, desired, table_name)?;
        out.extend(diff_rows(table, Some(cur_insert), Some(des_insert), env)?);
    }

    Ok(out)
}

fn resolve_table<'a>(current: &'a SqlFile, desired: &'a SqlFile, name: &str) -> Result<&'a CreateTable> {
    desired
        .table(name)
        .or_else(|| current.table(name))
        .ok_or_else(|| Error::TableShouldHavePrimaryKey(name.to_string()))
}

fn column_order(insert: &InsertInto, table: &CreateTable) -> Vec<String> {
    if insert.columns.is_empty() {
        table.columns.iter().map(|c| c.name.clone()).collect()
    } else {
        insert.columns.clone()
    }
}

fn reorder_rows(insert: &InsertInto, table: &CreateTable) -> Vec<Vec<Expr>> {
    let order = column_order(insert, table);
    insert
        .values
        .iter()
        .map(|row| {
            table
                .columns
                .iter()
                .map(|c| {
                    let idx = order.iter().position(|n| n == &c.name).expect("row covers every table column");
                    row[idx].clone()
                })
                .collect()
        })
        .collect()
}

fn substitute_env(e: &Expr, env: &dyn Fn(&str) -> Option<String>) -> Result<Expr> {
    match e {
        Expr::EnvVar { member } => {
            let v = env(member).ok_or_else(|| Error::ExpectingEnvVar(member.clone()))?;
            Ok(Expr::Text(v))
        }
        other => Ok(other.clone()),
    }
}

fn diff_rows(
    table: &CreateTable,
    cur_insert: Option<&InsertInto>,
    des_insert: Option<&InsertInto>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<SolverProposal>> {
    let pk = table.primary_key_columns().map_err(|n| {
        if n == 0 {
            Error::TableShouldHavePrimaryKey(table.name.clone())
        } else {
            Error::TableShouldHaveSinglePrimaryKey(table.name.clone())
        }
    })?;
    let pk_positions: Vec<usize> = pk.iter().map(|name| table.columns.iter().position(|c| &c.name == name).unwrap()).collect();

    let cur_rows = cur_insert.map(|i| reorder_rows(i, table)).unwrap_or_default();
    let mut des_rows = des_insert.map(|i| reorder_rows(i, table)).unwrap_or_default();
    for row in &mut des_rows {
        for value in row.iter_mut() {
            *value = substitute_env(value, env)?;
        }
    }

    let row_key = |row: &Vec<Expr>| -> String {
        pk_positions.iter().map(|&i| generator::render_row_literal(&row[i])).collect::<Vec<_>>().join(", ")
    };

    let l: std::collections::BTreeMap<String, Vec<Expr>> = cur_rows.into_iter().map(|r| (row_key(&r), r)).collect();
    let r: std::collections::BTreeMap<String, Vec<Expr>> = des_rows.into_iter().map(|r| (row_key(&r), r)).collect();

    let mut removed = Vec::new();
    let mut added = Vec::new();
    let mut changed = Vec::new();

    let keys: std::collections::BTreeSet<String> = l.keys().chain(r.keys()).cloned().collect();
    for k in keys {
        match (l.get(&k), r.get(&k)) {
            (Some(old), Some(new)) => {
                if non_pk_projection(table, &pk_positions, old) != non_pk_projection(table, &pk_positions, new) {
                    changed.push((k, old.clone(), new.clone()));
                }
            }
            (Some(old), None) => removed.push((k, old.clone())),
            (None, Some(new)) => added.push((k, new.clone())),
            (None, None) => unreachable!(),
        }
    }

    let mut out = Vec::new();

    for (key, row) in &removed {
        out.push(SolverProposal {
            reason: Diff::Removed(key.clone()),
            statements: vec![format!("DELETE FROM {} WHERE {}", table.name, pk_where_clause(table, &pk, row))],
        });
    }

    for (key, row, new) in &changed {
        let set_clause = non_pk_set_clause(table, &pk_positions, row, new);
        out.push(SolverProposal {
            reason: Diff::Changed(row_values_label(table, &pk_positions, row), row_values_label(table, &pk_positions, new)),
            statements: vec![format!("UPDATE {} SET {} WHERE {}", table.name, set_clause, pk_where_clause(table, &pk, new))],
        });
    }

    for (key, row) in &added {
        let cols = table.columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>().join(", ");
        let vals = row.iter().map(generator::render_row_literal).collect::<Vec<_>>().join(", ");
        out.push(SolverProposal {
            reason: Diff::Added(key.clone()),
            statements: vec![format!("INSERT INTO {}({cols}) VALUES ({vals})", table.name)],
        });
    }

    Ok(out)
}

fn non_pk_projection<'a>(table: &CreateTable, pk_positions: &[usize], row: &'a [Expr]) -> Vec<&'a Expr> {
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(i, _)| !pk_positions.contains(i))
        .map(|(i, _)| &row[i])
        .collect()
}

fn pk_where_clause(table: &CreateTable, pk: &[String], row: &[Expr]) -> String {
    pk.iter()
        .map(|name| {
            let i = table.columns.iter().position(|c| &c.name == name).unwrap();
            format!("{name} = {}", generator::render_row_literal(&row[i]))
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn non_pk_set_clause(table: &CreateTable, pk_positions: &[usize], _old: &[Expr], new: &[Expr]) -> String {
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(i, _)| !pk_positions.contains(i))
        .map(|(i, c)| format!("{} = {}", c.name, generator::render_row_literal(&new[i])))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Unlike `render_row_literal`, renders text values without surrounding
/// quotes — the `Changed` reason carries the raw value (§8 Scenario D:
/// `Changed("zero","one")`), not a SQL literal.
fn render_raw_value(e: &Expr) -> String {
    match e {
        Expr::Text(s) => s.clone(),
        other => generator::render_row_literal(other),
    }
}

fn row_values_label(table: &CreateTable, pk_positions: &[usize], row: &[Expr]) -> String {
    non_pk_projection(table, pk_positions, row).iter().map(|e| render_raw_value(e)).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql_file_with_inserts;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn updates_changed_row() {
        let current = parse_sql_file_with_inserts(
            "CREATE TABLE t(id integer PRIMARY KEY, name text NOT NULL); INSERT INTO t(id, name) VALUES (1, 'zero');",
        )
        .unwrap();
        let desired = parse_sql_file_with_inserts(
            "CREATE TABLE t(id integer PRIMARY KEY, name text NOT NULL); INSERT INTO t(id, name) VALUES (1, 'one');",
        )
        .unwrap();

        let proposals = diff(&current, &desired, &no_env).unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].reason, Diff::Changed("zero".to_string(), "one".to_string()));
        assert_eq!(proposals[0].statements, vec!["UPDATE t SET name = 'one' WHERE id = 1".to_string()]);
    }

    #[test]
    fn deletes_then_inserts() {
        let current = parse_sql_file_with_inserts(
            "CREATE TABLE t(id integer PRIMARY KEY, name text NOT NULL); INSERT INTO t(id, name) VALUES (1, 'one');",
        )
        .unwrap();
        let desired = parse_sql_file_with_inserts(
            "CREATE TABLE t(id integer PRIMARY KEY, name text NOT NULL); INSERT INTO t(id, name) VALUES (2, 'two');",
        )
        .unwrap();

        let proposals = diff(&current, &desired, &no_env).unwrap();
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].reason, Diff::Removed("1".to_string()));
        assert_eq!(proposals[0].statements, vec!["DELETE FROM t WHERE id = 1".to_string()]);
        assert_eq!(proposals[1].reason, Diff::Added("2".to_string()));
        assert_eq!(proposals[1].statements, vec!["INSERT INTO t(id, name) VALUES (2, 'two')".to_string()]);
    }

    #[test]
    fn missing_env_var_fails() {
        let current = SqlFile::default();
        let table = crate::model::CreateTable {
            name: "t".to_string(),
            columns: vec![
                crate::model::ColumnDef {
                    name: "id".to_string(),
                    sql_type: crate::model::SqlType::Integer,
                    constraints: vec![crate::model::ColumnConstraint::PrimaryKey { autoincrement: false }],
                },
                crate::model::ColumnDef {
                    name: "token".to_string(),
                    sql_type: crate::model::SqlType::Text,
                    constraints: vec![crate::model::ColumnConstraint::NotNull],
                },
            ],
            constraints: vec![],
        };
        let mut desired = SqlFile::default();
        desired.tables.push(table);
        desired.inserts.push(InsertInto {
            table: "t".to_string(),
            columns: vec!["id".to_string(), "token".to_string()],
            values: vec![vec![Expr::Integer(1), Expr::EnvVar { member: "MIG_TOKEN".to_string() }]],
        });
        let err = diff(&current, &desired, &no_env).unwrap_err();
        assert!(matches!(err, Error::ExpectingEnvVar(_)));
    }
}
