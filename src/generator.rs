// src/generator.rs

//! Renders schema-model entities back to canonical SQL text. Used by the
//! differ both to produce the statements it proposes and to derive the
//! comparison keys (e.g. a view's key is its rendered `SELECT` text).

use crate::model::{
    ColumnConstraint, ColumnDef, CreateIndex, CreateTable, CreateView, Expr, OrderDirection,
    Select, WithSelect,
};

pub fn render_create_table(t: &CreateTable) -> String {
    let mut items: Vec<String> = t.columns.iter().map(render_column_def).collect();
    items.extend(t.constraints.iter().map(render_table_constraint));
    format!("CREATE TABLE {}({})", t.name, items.join(", "))
}

pub fn render_drop_table(name: &str) -> String {
    format!("DROP TABLE {name}")
}

pub fn render_create_view(v: &CreateView) -> String {
    format!("CREATE VIEW {} AS {}", v.name, render_with_select(&v.select_union))
}

pub fn render_drop_view(name: &str) -> String {
    format!("DROP VIEW {name}")
}

pub fn render_drop_view_if_exists(name: &str) -> String {
    format!("DROP VIEW IF EXISTS {name}")
}

pub fn render_create_index(i: &CreateIndex) -> String {
    format!("CREATE INDEX {} ON {}({})", i.name, i.table, i.columns.join(", "))
}

pub fn render_column_def(c: &ColumnDef) -> String {
    let mut s = format!("{} {}", c.name, c.sql_type);
    for constraint in &c.constraints {
        s.push(' ');
        s.push_str(&render_column_constraint(constraint));
    }
    s
}

/// `"{col.name} {col.type}"` — the differ's column identity key (§4.3).
pub fn column_identity_key(c: &ColumnDef) -> String {
    format!("{} {}", c.name, c.sql_type)
}

fn render_column_constraint(c: &ColumnConstraint) -> String {
    match c {
        ColumnConstraint::PrimaryKey { autoincrement } => {
            if *autoincrement {
                "PRIMARY KEY AUTOINCREMENT".to_string()
            } else {
                "PRIMARY KEY".to_string()
            }
        }
        ColumnConstraint::NotNull => "NOT NULL".to_string(),
        ColumnConstraint::Unique(cols) if cols.is_empty() => "UNIQUE".to_string(),
        ColumnConstraint::Default(e) => format!("DEFAULT {}", render_expr(e)),
        _ => render_table_constraint(c),
    }
}

/// Renders a constraint the way it appears at table level (or, for
/// `UNIQUE`/`PRIMARY KEY` with an explicit column list, at column level
/// too). This is also the differ's table-constraint identity key.
pub fn render_table_constraint(c: &ColumnConstraint) -> String {
    match c {
        ColumnConstraint::PrimaryKey { autoincrement } => {
            if *autoincrement {
                "PRIMARY KEY AUTOINCREMENT".to_string()
            } else {
                "PRIMARY KEY".to_string()
            }
        }
        ColumnConstraint::PrimaryKeyCols(cols) => format!("PRIMARY KEY({})", cols.join(", ")),
        ColumnConstraint::NotNull => "NOT NULL".to_string(),
        ColumnConstraint::Unique(cols) => {
            if cols.is_empty() {
                "UNIQUE".to_string()
            } else {
                format!("UNIQUE({})", cols.join(", "))
            }
        }
        ColumnConstraint::Default(e) => format!("DEFAULT {}", render_expr(e)),
        ColumnConstraint::ForeignKey { columns, ref_table, ref_columns } => format!(
            "FOREIGN KEY({}) REFERENCES {}({})",
            columns.join(", "),
            ref_table,
            ref_columns.join(", ")
        ),
    }
}

pub fn render_with_select(ws: &WithSelect) -> String {
    let mut out = String::new();
    if !ws.ctes.is_empty() {
        out.push_str("WITH ");
        let parts: Vec<String> =
            ws.ctes.iter().map(|(alias, sel)| format!("{alias} AS ({})", render_select(sel))).collect();
        out.push_str(&parts.join(", "));
        out.push(' ');
    }
    out.push_str(&render_select(&ws.select));
    out
}

pub fn render_select(s: &Select) -> String {
    let mut out = String::from("SELECT ");
    if s.distinct {
        out.push_str("DISTINCT ");
    }
    match &s.projection {
        None => out.push('*'),
        Some(items) => {
            let parts: Vec<String> = items.iter().map(render_expr).collect();
            out.push_str(&parts.join(", "));
        }
    }
    if let Some(from) = &s.from {
        out.push_str(" FROM ");
        out.push_str(&render_expr(from));
    }
    if let Some(filter) = &s.filter {
        out.push_str(" WHERE ");
        out.push_str(&render_expr(filter));
    }
    if !s.group_by.is_empty() {
        out.push_str(" GROUP BY ");
        out.push_str(&s.group_by.join(", "));
    }
    if let Some(having) = &s.having {
        out.push_str(" HAVING ");
        out.push_str(&render_expr(having));
    }
    if !s.order_by.is_empty() {
        out.push_str(" ORDER BY ");
        let parts: Vec<String> = s
            .order_by
            .iter()
            .map(|(col, dir)| {
                let d = match dir {
                    OrderDirection::Asc => "ASC",
                    OrderDirection::Desc => "DESC",
                };
                format!("{col} {d}")
            })
            .collect();
        out.push_str(&parts.join(", "));
    }
    if let Some(limit) = s.limit {
        out.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = s.offset {
        out.push_str(&format!(" OFFSET {offset}"));
    }
    out
}

pub fn render_expr(e: &Expr) -> String {
    match e {
        Expr::Integer(v) => v.to_string(),
        Expr::Text(s) => format!("'{s}'"),
        Expr::Real(v) => format_real(*v),
        Expr::Column { qualifier: Some(q), member } => format!("{q}.{member}"),
        Expr::Column { qualifier: None, member } => member.clone(),
        Expr::EnvVar { member } => format!("@{member}"),
        Expr::Call { name, args, over } => {
            let args_s: Vec<String> = args.iter().map(render_expr).collect();
            let mut s = format!("{name}({})", args_s.join(", "));
            if let Some(over) = over {
                s.push_str(" OVER (");
                let mut parts = Vec::new();
                if !over.partition_by.is_empty() {
                    parts.push(format!("PARTITION BY {}", over.partition_by.join(", ")));
                }
                if !over.order_by.is_empty() {
                    parts.push(format!("ORDER BY {}", over.order_by.join(", ")));
                }
                s.push_str(&parts.join(" "));
                s.push(')');
            }
            s
        }
        Expr::Case { when, then, r#else } => {
            format!("CASE WHEN {} THEN {} ELSE {} END", render_expr(when), render_expr(then), render_expr(r#else))
        }
        Expr::Unary { op, expr } => match op {
            crate::model::UnOp::Not => format!("NOT {}", render_expr(expr)),
            crate::model::UnOp::Exists => format!("EXISTS {}", render_expr(expr)),
        },
        Expr::Binary { op, left, right } => {
            let op_s = binop_str(*op);
            match op {
                crate::model::BinOp::InnerJoin => {
                    format!("{} INNER JOIN {}", render_expr(left), render_expr(right))
                }
                crate::model::BinOp::LeftOuterJoin => {
                    format!("{} LEFT OUTER JOIN {}", render_expr(left), render_expr(right))
                }
                _ => format!("{} {} {}", render_expr(left), op_s, render_expr(right)),
            }
        }
        Expr::Alias { expr, name } => format!("{} AS {name}", render_expr(expr)),
        Expr::JoinOn { relation, on } => match on {
            Some(on) => format!("{} ON {}", render_expr(relation), render_expr(on)),
            None => render_expr(relation),
        },
        Expr::Subquery(ws) => format!("({})", render_with_select(ws)),
        Expr::Table(name) => name.clone(),
        Expr::List(items) => {
            let parts: Vec<String> = items.iter().map(render_expr).collect();
            format!("({})", parts.join(", "))
        }
    }
}

fn binop_str(op: crate::model::BinOp) -> &'static str {
    use crate::model::BinOp::*;
    match op {
        And => "AND",
        Or => "OR",
        Eq => "=",
        Neq => "<>",
        Gt => ">",
        Gte => ">=",
        Lt => "<",
        Lte => "<=",
        Like => "LIKE",
        In => "IN",
        Concat => "||",
        InnerJoin | LeftOuterJoin => unreachable!("handled by caller"),
    }
}

/// The literal rendering rule used for `InsertInto` row values (§4.3):
/// integers as decimal digits, text wrapped in single quotes with no
/// additional escaping, reals as their shortest round-trip decimal.
pub fn render_row_literal(e: &Expr) -> String {
    match e {
        Expr::Integer(v) => v.to_string(),
        Expr::Text(s) => format!("'{s}'"),
        Expr::Real(v) => format_real(*v),
        other => render_expr(other),
    }
}

fn format_real(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}
