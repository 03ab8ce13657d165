// src/parser/expr.rs

//! Expression, SELECT, and FROM-clause grammar. A precedence-climbing
//! parser for `expr`, feeding into the `select`/`withSelect` grammar used
//! by `CREATE VIEW` and by subqueries.

use super::Parser;
use crate::error::Result;
use crate::model::{BinOp, Expr, Over, Select, UnOp, WithSelect};

pub(super) fn parse_with_select(p: &mut Parser) -> Result<WithSelect> {
    let mut ctes = Vec::new();

    if p.eat_kw_opt("WITH") {
        loop {
            let alias = p.ident()?;
            p.eat_kw("AS")?;
            p.eat_punct("(")?;
            let select = parse_select(p)?;
            p.eat_punct(")")?;
            ctes.push((alias, select));
            if !p.eat_punct_opt(",") {
                break;
            }
        }
    }

    let select = Box::new(parse_select(p)?);
    Ok(WithSelect { ctes, select })
}

pub(super) fn parse_select(p: &mut Parser) -> Result<Select> {
    p.eat_kw("SELECT")?;
    let distinct = p.eat_kw_opt("DISTINCT");

    let projection = if p.eat_punct_opt("*") {
        None
    } else {
        let mut items = vec![parse_projection_item(p)?];
        while p.eat_punct_opt(",") {
            items.push(parse_projection_item(p)?);
        }
        Some(items)
    };

    let from = if p.eat_kw_opt("FROM") {
        Some(Box::new(parse_from(p)?))
    } else {
        None
    };

    let filter = if p.eat_kw_opt("WHERE") {
        Some(Box::new(parse_expr(p)?))
    } else {
        None
    };

    let group_by = if p.eat_kw_opt("GROUP") {
        p.eat_kw("BY")?;
        p.ident_list()?
    } else {
        Vec::new()
    };

    let having = if p.eat_kw_opt("HAVING") {
        Some(Box::new(parse_expr(p)?))
    } else {
        None
    };

    let order_by = if p.eat_kw_opt("ORDER") {
        p.eat_kw("BY")?;
        let mut cols = vec![parse_order_item(p)?];
        while p.eat_punct_opt(",") {
            cols.push(parse_order_item(p)?);
        }
        cols
    } else {
        Vec::new()
    };

    let limit = if p.eat_kw_opt("LIMIT") { Some(parse_int(p)?) } else { None };
    let offset = if p.eat_kw_opt("OFFSET") { Some(parse_int(p)?) } else { None };

    Ok(Select { distinct, projection, from, filter, group_by, having, order_by, limit, offset })
}

fn parse_int(p: &mut Parser) -> Result<i64> {
    if let super::lexer::Token::Int(v) = *p.peek() {
        p.bump();
        Ok(v)
    } else {
        Err(p.err("integer literal"))
    }
}

fn parse_order_item(p: &mut Parser) -> Result<(String, crate::model::OrderDirection)> {
    let name = p.ident()?;
    let dir = if p.eat_kw_opt("DESC") {
        crate::model::OrderDirection::Desc
    } else {
        p.eat_kw_opt("ASC");
        crate::model::OrderDirection::Asc
    };
    Ok((name, dir))
}

fn parse_projection_item(p: &mut Parser) -> Result<Expr> {
    let e = parse_expr(p)?;
    if p.eat_kw_opt("AS") {
        let name = p.ident()?;
        Ok(Expr::Alias { expr: Box::new(e), name })
    } else {
        Ok(e)
    }
}

/// `fromExpr := tableExpr (joinKind tableExpr (ON expr)?)*`
fn parse_from(p: &mut Parser) -> Result<Expr> {
    let mut acc = parse_table_expr(p)?;

    loop {
        let op = if p.eat_kw_opt("INNER") {
            p.eat_kw("JOIN")?;
            BinOp::InnerJoin
        } else if p.check_kw("JOIN") {
            p.bump();
            BinOp::InnerJoin
        } else if p.check_kw("LEFT") {
            p.bump();
            p.eat_kw("OUTER")?;
            p.eat_kw("JOIN")?;
            BinOp::LeftOuterJoin
        } else {
            break;
        };

        let relation = parse_table_expr(p)?;
        let on = if p.eat_kw_opt("ON") { Some(Box::new(parse_expr(p)?)) } else { None };
        let right = Expr::JoinOn { relation: Box::new(relation), on };
        acc = Expr::Binary { op, left: Box::new(acc), right: Box::new(right) };
    }

    Ok(acc)
}

fn parse_table_expr(p: &mut Parser) -> Result<Expr> {
    let base = if p.eat_punct_opt("(") {
        let ws = parse_with_select(p)?;
        p.eat_punct(")")?;
        Expr::Subquery(Box::new(ws))
    } else {
        Expr::Table(p.ident()?)
    };

    if p.eat_kw_opt("AS") {
        let alias = p.ident()?;
        Ok(Expr::Alias { expr: Box::new(base), name: alias })
    } else {
        Ok(base)
    }
}

pub(super) fn parse_expr(p: &mut Parser) -> Result<Expr> {
    parse_or(p)
}

fn parse_or(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_and(p)?;
    while p.eat_kw_opt("OR") {
        let right = parse_and(p)?;
        left = Expr::Binary { op: BinOp::Or, left: Box::new(left), right: Box::new(right) };
    }
    Ok(left)
}

fn parse_and(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_not(p)?;
    while p.eat_kw_opt("AND") {
        let right = parse_not(p)?;
        left = Expr::Binary { op: BinOp::And, left: Box::new(left), right: Box::new(right) };
    }
    Ok(left)
}

fn parse_not(p: &mut Parser) -> Result<Expr> {
    if p.eat_kw_opt("NOT") {
        let inner = parse_not(p)?;
        Ok(Expr::Unary { op: UnOp::Not, expr: Box::new(inner) })
    } else {
        parse_comparison(p)
    }
}

fn parse_comparison(p: &mut Parser) -> Result<Expr> {
    let left = parse_concat(p)?;

    let op = if p.eat_punct_opt("=") {
        BinOp::Eq
    } else if p.eat_punct_opt("<>") {
        BinOp::Neq
    } else if p.eat_punct_opt("<=") {
        BinOp::Lte
    } else if p.eat_punct_opt(">=") {
        BinOp::Gte
    } else if p.eat_punct_opt("<") {
        BinOp::Lt
    } else if p.eat_punct_opt(">") {
        BinOp::Gt
    } else if p.eat_kw_opt("LIKE") {
        BinOp::Like
    } else if p.eat_kw_opt("IN") {
        BinOp::In
    } else {
        return Ok(left);
    };

    let right = if op == BinOp::In {
        parse_in_rhs(p)?
    } else {
        parse_concat(p)?
    };

    Ok(Expr::Binary { op, left: Box::new(left), right: Box::new(right) })
}

fn parse_in_rhs(p: &mut Parser) -> Result<Expr> {
    p.eat_punct("(")?;
    if p.check_kw("SELECT") || p.check_kw("WITH") {
        let ws = parse_with_select(p)?;
        p.eat_punct(")")?;
        return Ok(Expr::Subquery(Box::new(ws)));
    }
    let mut items = vec![parse_expr(p)?];
    while p.eat_punct_opt(",") {
        items.push(parse_expr(p)?);
    }
    p.eat_punct(")")?;
    Ok(Expr::List(items))
}

fn parse_concat(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_unary(p)?;
    while p.eat_punct_opt("||") {
        let right = parse_unary(p)?;
        left = Expr::Binary { op: BinOp::Concat, left: Box::new(left), right: Box::new(right) };
    }
    Ok(left)
}

fn parse_unary(p: &mut Parser) -> Result<Expr> {
    if p.eat_kw_opt("EXISTS") {
        p.eat_punct("(")?;
        let ws = parse_with_select(p)?;
        p.eat_punct(")")?;
        Ok(Expr::Unary { op: UnOp::Exists, expr: Box::new(Expr::Subquery(Box::new(ws))) })
    } else {
        parse_atom(p)
    }
}

fn parse_atom(p: &mut Parser) -> Result<Expr> {
    use super::lexer::Token;

    match p.peek().clone() {
        Token::Int(v) => {
            p.bump();
            Ok(Expr::Integer(v))
        }
        Token::Real(v) => {
            p.bump();
            Ok(Expr::Real(v))
        }
        Token::Str(s) => {
            p.bump();
            Ok(Expr::Text(s))
        }
        Token::EnvVar(name) => {
            p.bump();
            Ok(Expr::EnvVar { member: name })
        }
        Token::Punct("(") => {
            p.bump();
            let ws = parse_with_select(p)?;
            p.eat_punct(")")?;
            Ok(Expr::Subquery(Box::new(ws)))
        }
        Token::Ident(_) if p.check_kw("CASE") => parse_case(p),
        Token::Ident(name) => {
            p.bump();
            if p.eat_punct_opt("(") {
                let mut args = Vec::new();
                if !p.check_punct(")") {
                    args.push(parse_expr(p)?);
                    while p.eat_punct_opt(",") {
                        args.push(parse_expr(p)?);
                    }
                }
                p.eat_punct(")")?;

                let over = if p.eat_kw_opt("OVER") {
                    p.eat_punct("(")?;
                    let partition_by = if p.eat_kw_opt("PARTITION") {
                        p.eat_kw("BY")?;
                        p.ident_list()?
                    } else {
                        Vec::new()
                    };
                    let order_by = if p.eat_kw_opt("ORDER") {
                        p.eat_kw("BY")?;
                        p.ident_list()?
                    } else {
                        Vec::new()
                    };
                    p.eat_punct(")")?;
                    Some(Over { partition_by, order_by })
                } else {
                    None
                };

                Ok(Expr::Call { name, args, over })
            } else if p.eat_punct_opt(".") {
                let member = p.ident()?;
                Ok(Expr::Column { qualifier: Some(name), member })
            } else {
                Ok(Expr::Column { qualifier: None, member: name })
            }
        }
        _ => Err(p.err("expression")),
    }
}

fn parse_case(p: &mut Parser) -> Result<Expr> {
    p.eat_kw("CASE")?;
    p.eat_kw("WHEN")?;
    let when = parse_expr(p)?;
    p.eat_kw("THEN")?;
    let then = parse_expr(p)?;
    p.eat_kw("ELSE")?;
    let els = parse_expr(p)?;
    p.eat_kw("END")?;
    Ok(Expr::Case { when: Box::new(when), then: Box::new(then), r#else: Box::new(els) })
}
