// src/typecheck.rs

//! Assigns a `SqlType` to every column exposed by every table and view, by
//! seeding from `CREATE TABLE` columns and then walking views in
//! dependency order, inferring each view's projected column types from
//! the relations available to it.

use crate::error::{Error, Result};
use crate::model::{BinOp, CreateView, Expr, Select, SqlFile, SqlType, UnOp, WithSelect};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnType {
    pub table: String,
    pub column: String,
    pub sql_type: SqlType,
}

/// A single relation occupying a slot in a `FROM` clause, resolved to the
/// columns it exposes and the name it can be qualified by.
struct FromLeaf {
    lookup_name: Option<String>,
    physical_table: Option<String>,
    inline_cols: Option<Vec<(String, SqlType)>>,
}

impl FromLeaf {
    fn cols(&self, known: &[ColumnType]) -> Vec<(String, SqlType)> {
        if let Some(t) = &self.physical_table {
            known.iter().filter(|c| &c.table == t).map(|c| (c.column.clone(), c.sql_type)).collect()
        } else {
            self.inline_cols.clone().unwrap_or_default()
        }
    }
}

/// Computes the exposed-column table for every table and every view, in
/// dependency order. Fails fatally if the view graph has a cycle.
pub fn compute_column_types(file: &SqlFile) -> Result<Vec<ColumnType>> {
    let mut known = seed_from_tables(file);
    let order = topological_view_order(file)?;

    for view_name in order {
        let view = file.views.iter().find(|v| v.name == view_name).expect("view in topo order exists");
        let cols = infer_with_select(&known, &view.select_union)?;
        for (name, ty) in cols {
            known.push(ColumnType { table: view.name.clone(), column: name, sql_type: ty });
        }
    }

    Ok(known)
}

fn seed_from_tables(file: &SqlFile) -> Vec<ColumnType> {
    let mut out = Vec::new();
    for t in &file.tables {
        for c in &t.columns {
            out.push(ColumnType { table: t.name.clone(), column: c.name.clone(), sql_type: c.sql_type });
        }
    }
    out
}

fn topological_view_order(file: &SqlFile) -> Result<Vec<String>> {
    let view_names: HashSet<&str> = file.views.iter().map(|v| v.name.as_str()).collect();
    let mut deps: HashMap<String, HashSet<String>> = HashMap::new();

    for v in &file.views {
        let refs = from_table_names(&v.select_union);
        let view_refs: HashSet<String> =
            refs.into_iter().filter(|n| view_names.contains(n.as_str()) && n != &v.name).collect();
        deps.insert(v.name.clone(), view_refs);
    }

    let mut order = Vec::new();
    let mut remaining: HashSet<String> = file.views.iter().map(|v| v.name.clone()).collect();

    loop {
        if remaining.is_empty() {
            break;
        }
        let ready: Vec<String> = remaining
            .iter()
            .filter(|name| deps[*name].iter().all(|dep| !remaining.contains(dep)))
            .cloned()
            .collect();

        if ready.is_empty() {
            let stuck: Vec<&str> = remaining.iter().map(String::as_str).collect();
            return Err(Error::ViewCycle(stuck.join(", ")));
        }

        for name in ready {
            remaining.remove(&name);
            order.push(name);
        }
    }

    Ok(order)
}

/// Table/view names referenced as `FROM`-clause leaves, recursing into
/// nested `WithSelect`s (CTEs and inline subqueries).
fn from_table_names(ws: &WithSelect) -> Vec<String> {
    let mut out = Vec::new();
    for (_, select) in &ws.ctes {
        collect_select_relation_names(select, &mut out);
    }
    collect_select_relation_names(&ws.select, &mut out);
    out
}

fn collect_select_relation_names(select: &Select, out: &mut Vec<String>) {
    if let Some(from) = &select.from {
        for leaf in flatten_from(from) {
            collect_leaf_relation_names(leaf, out);
        }
    }
}

fn collect_leaf_relation_names(e: &Expr, out: &mut Vec<String>) {
    match e {
        Expr::Table(name) => out.push(name.clone()),
        Expr::Alias { expr, .. } => collect_leaf_relation_names(expr, out),
        Expr::Subquery(ws) => out.extend(from_table_names(ws)),
        _ => {}
    }
}

/// Splits a `FROM` expression tree (built by the parser as nested
/// `Binary{InnerJoin|LeftOuterJoin, left, right: JoinOn}` nodes) into its
/// leaf relations, left to right.
fn flatten_from(e: &Expr) -> Vec<&Expr> {
    match e {
        Expr::Binary { op: BinOp::InnerJoin | BinOp::LeftOuterJoin, left, right } => {
            let mut leaves = flatten_from(left);
            if let Expr::JoinOn { relation, .. } = right.as_ref() {
                leaves.push(relation);
            }
            leaves
        }
        other => vec![other],
    }
}

fn resolve_from_leaves(known: &[ColumnType], select: &Select) -> Result<Vec<FromLeaf>> {
    let Some(from) = &select.from else { return Ok(Vec::new()) };

    flatten_from(from)
        .into_iter()
        .map(|leaf| resolve_one_leaf(known, leaf))
        .collect()
}

fn resolve_one_leaf(known: &[ColumnType], e: &Expr) -> Result<FromLeaf> {
    match e {
        Expr::Table(name) => {
            Ok(FromLeaf { lookup_name: Some(name.clone()), physical_table: Some(name.clone()), inline_cols: None })
        }
        Expr::Alias { expr, name } => match expr.as_ref() {
            Expr::Table(t) => {
                Ok(FromLeaf { lookup_name: Some(name.clone()), physical_table: Some(t.clone()), inline_cols: None })
            }
            Expr::Subquery(ws) => {
                let cols = infer_with_select(known, ws)?;
                Ok(FromLeaf { lookup_name: Some(name.clone()), physical_table: None, inline_cols: Some(cols) })
            }
            other => Err(Error::UnsupportedTypeInference(format!("{other:?}"))),
        },
        Expr::Subquery(ws) => {
            let cols = infer_with_select(known, ws)?;
            Ok(FromLeaf { lookup_name: None, physical_table: None, inline_cols: Some(cols) })
        }
        other => Err(Error::UnsupportedTypeInference(format!("{other:?}"))),
    }
}

fn infer_with_select(known: &[ColumnType], ws: &WithSelect) -> Result<Vec<(String, SqlType)>> {
    let mut local = known.to_vec();

    for (alias, select) in &ws.ctes {
        let cols = infer_select_columns(&local, select)?;
        for (name, ty) in cols {
            local.push(ColumnType { table: alias.clone(), column: name, sql_type: ty });
        }
    }

    infer_select_columns(&local, &ws.select)
}

fn infer_select_columns(known: &[ColumnType], select: &Select) -> Result<Vec<(String, SqlType)>> {
    let leaves = resolve_from_leaves(known, select)?;

    match &select.projection {
        None => {
            // `SELECT *`: expose every column of every relation, in order.
            let mut out = Vec::new();
            for leaf in &leaves {
                out.extend(leaf.cols(known));
            }
            Ok(out)
        }
        Some(items) => items.iter().map(|e| infer_projection_item(known, &leaves, e)).collect(),
    }
}

fn infer_projection_item(known: &[ColumnType], leaves: &[FromLeaf], e: &Expr) -> Result<(String, SqlType)> {
    match e {
        Expr::Alias { expr, name } => {
            let ty = infer_expr(known, leaves, expr)?;
            Ok((name.clone(), ty))
        }
        Expr::Column { member, .. } => {
            let ty = infer_expr(known, leaves, e)?;
            Ok((member.clone(), ty))
        }
        other => {
            let ty = infer_expr(known, leaves, other)?;
            Ok((default_projection_name(other), ty))
        }
    }
}

fn default_projection_name(e: &Expr) -> String {
    match e {
        Expr::Call { name, .. } => name.clone(),
        _ => "?column?".to_string(),
    }
}

fn infer_expr(known: &[ColumnType], leaves: &[FromLeaf], e: &Expr) -> Result<SqlType> {
    match e {
        Expr::Integer(_) => Ok(SqlType::Integer),
        Expr::Text(_) => Ok(SqlType::Text),
        Expr::Real(_) => Ok(SqlType::Real),
        Expr::EnvVar { .. } => Ok(SqlType::Text),
        Expr::Column { qualifier, member } => resolve_column(known, leaves, qualifier.as_deref(), member),
        Expr::Alias { expr, .. } => infer_expr(known, leaves, expr),
        Expr::Unary { op: UnOp::Not, expr } => {
            let t = infer_expr(known, leaves, expr)?;
            expect_bool(t)?;
            Ok(SqlType::Bool)
        }
        Expr::Unary { op: UnOp::Exists, .. } => Ok(SqlType::Bool),
        Expr::Binary { op, left, right } => infer_binary(known, leaves, *op, left, right),
        Expr::Case { when, then, r#else } => {
            let cond = infer_expr(known, leaves, when)?;
            expect_bool(cond)?;
            let then_ty = infer_expr(known, leaves, then)?;
            let else_ty = infer_expr(known, leaves, r#else)?;
            if then_ty != else_ty {
                return Err(Error::NotMatchingTypes(then_ty.to_string(), else_ty.to_string()));
            }
            Ok(then_ty)
        }
        Expr::Call { name, args, .. } => infer_call(known, leaves, name, args),
        Expr::Subquery(ws) => {
            let cols = infer_with_select(known, ws)?;
            cols.into_iter()
                .next()
                .map(|(_, t)| t)
                .ok_or_else(|| Error::UnsupportedTypeInference("empty subquery projection".to_string()))
        }
        other => Err(Error::UnsupportedTypeInference(format!("{other:?}"))),
    }
}

fn expect_bool(t: SqlType) -> Result<()> {
    if t == SqlType::Bool {
        Ok(())
    } else {
        Err(Error::ExpectingType(SqlType::Bool.to_string(), t.to_string()))
    }
}

fn infer_binary(known: &[ColumnType], leaves: &[FromLeaf], op: BinOp, left: &Expr, right: &Expr) -> Result<SqlType> {
    match op {
        BinOp::And | BinOp::Or => {
            let l = infer_expr(known, leaves, left)?;
            let r = infer_expr(known, leaves, right)?;
            expect_bool(l)?;
            expect_bool(r)?;
            Ok(SqlType::Bool)
        }
        BinOp::Eq | BinOp::Neq | BinOp::Gt | BinOp::Gte | BinOp::Lt | BinOp::Lte | BinOp::Like | BinOp::In => {
            let l = infer_expr(known, leaves, left)?;
            let r = infer_expr(known, leaves, right)?;
            if l != r {
                return Err(Error::NotMatchingTypes(l.to_string(), r.to_string()));
            }
            Ok(SqlType::Bool)
        }
        BinOp::Concat => {
            let l = infer_expr(known, leaves, left)?;
            let r = infer_expr(known, leaves, right)?;
            if l != SqlType::Text || r != SqlType::Text {
                return Err(Error::NotMatchingTypes(l.to_string(), r.to_string()));
            }
            Ok(SqlType::Text)
        }
        BinOp::InnerJoin | BinOp::LeftOuterJoin => {
            Err(Error::UnsupportedTypeInference("join operator used as a value expression".to_string()))
        }
    }
}

fn infer_call(known: &[ColumnType], leaves: &[FromLeaf], name: &str, args: &[Expr]) -> Result<SqlType> {
    match name.to_ascii_lowercase().as_str() {
        "date" | "strftime" => Ok(SqlType::Text),
        "sum" | "count" | "row_number" => Ok(SqlType::Integer),
        "coalesce" => {
            let last = args.last().ok_or_else(|| {
                Error::UnsupportedTypeInference("coalesce() requires at least one argument".to_string())
            })?;
            infer_expr(known, leaves, last)
        }
        other => Err(Error::UnsupportedTypeInference(format!("unknown function: {other}"))),
    }
}

fn resolve_column(known: &[ColumnType], leaves: &[FromLeaf], qualifier: Option<&str>, member: &str) -> Result<SqlType> {
    match qualifier {
        Some(t) => {
            let aliased_table = leaves.iter().find_map(|l| {
                if l.lookup_name.as_deref() == Some(t) {
                    l.physical_table.clone()
                } else {
                    None
                }
            });

            if let Some(physical) = aliased_table {
                let matches: Vec<SqlType> =
                    known.iter().filter(|c| c.table == physical && c.column == member).map(|c| c.sql_type).collect();
                return pick_unique(&matches, &format!("{t}.{member}"));
            }

            if let Some(leaf) = leaves.iter().find(|l| l.lookup_name.as_deref() == Some(t) && l.physical_table.is_none())
            {
                let cols = leaf.cols(known);
                let matches: Vec<SqlType> =
                    cols.iter().filter(|(n, _)| n == member).map(|(_, ty)| *ty).collect();
                return pick_unique(&matches, &format!("{t}.{member}"));
            }

            let matches: Vec<SqlType> =
                known.iter().filter(|c| c.table == t && c.column == member).map(|c| c.sql_type).collect();
            pick_unique(&matches, &format!("{t}.{member}"))
        }
        None => {
            if leaves.len() != 1 {
                return Err(Error::CannotInferTypeWithoutTable(member.to_string()));
            }
            let cols = leaves[0].cols(known);
            let matches: Vec<SqlType> = cols.iter().filter(|(n, _)| n == member).map(|(_, ty)| *ty).collect();
            pick_unique(&matches, member)
        }
    }
}

fn pick_unique(matches: &[SqlType], ident: &str) -> Result<SqlType> {
    match matches.len() {
        0 => Err(Error::UndefinedIdentifier(ident.to_string())),
        1 => Ok(matches[0]),
        _ => Err(Error::DuplicatedDefinition(ident.to_string())),
    }
}

/// Validates every view in the file type-checks, independent of whether
/// its column types are needed by a caller.
pub fn validate(file: &SqlFile) -> Result<()> {
    compute_column_types(file)?;
    Ok(())
}

#[allow(dead_code)]
fn view_name(v: &CreateView) -> &str {
    &v.name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql_file;

    #[test]
    fn seeds_types_from_tables() {
        let file = parse_sql_file("CREATE TABLE t(id integer NOT NULL, name text NOT NULL);").unwrap();
        let types = compute_column_types(&file).unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].sql_type, SqlType::Integer);
        assert_eq!(types[1].sql_type, SqlType::Text);
    }

    #[test]
    fn detects_view_cycle() {
        let sql = "CREATE TABLE t(id integer NOT NULL);\
                   CREATE VIEW v1 AS SELECT id FROM v2;\
                   CREATE VIEW v2 AS SELECT id FROM v1;";
        let file = crate::parser::parse_sql_file_with_inserts(sql).unwrap();
        let err = compute_column_types(&file).unwrap_err();
        assert!(matches!(err, Error::ViewCycle(_)));
    }

    #[test]
    fn infers_simple_view_column() {
        let sql = "CREATE TABLE t(id integer NOT NULL); CREATE VIEW v AS SELECT id FROM t;";
        let file = crate::parser::parse_sql_file_with_inserts(sql).unwrap();
        let types = compute_column_types(&file).unwrap();
        let v_col = types.iter().find(|c| c.table == "v" && c.column == "id").unwrap();
        assert_eq!(v_col.sql_type, SqlType::Integer);
    }

    #[test]
    fn unqualified_column_needs_single_table() {
        let sql = "CREATE TABLE a(id integer NOT NULL); CREATE TABLE b(id integer NOT NULL); \
                   CREATE VIEW v AS SELECT id FROM a INNER JOIN b ON a.id = b.id;";
        let file = crate::parser::parse_sql_file_with_inserts(sql).unwrap();
        let err = compute_column_types(&file).unwrap_err();
        assert!(matches!(err, Error::CannotInferTypeWithoutTable(_)));
    }
}
