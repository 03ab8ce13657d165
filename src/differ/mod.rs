// src/differ/mod.rs

//! Compares a `current` `SqlFile` (read from the live catalog) against a
//! `desired` one (parsed from source) and produces an ordered list of
//! `SolverProposal`s that move `current` toward `desired`.
//!
//! Categories are tried in a fixed order and only the first non-empty one
//! is returned; this keeps any single migration small and lets repeated
//! `commit` invocations converge one category at a time.

mod columns;
mod constraints;
mod inserts;
mod tables;
mod views;

use crate::error::Result;
use crate::model::{Expr, SolverProposal, SqlFile};
use std::collections::{BTreeMap, BTreeSet};

pub fn diff(current: &SqlFile, desired: &SqlFile, env: &dyn Fn(&str) -> Option<String>) -> Result<Vec<SolverProposal>> {
    let t = tables::diff(current, desired);
    if !t.is_empty() {
        return Ok(t);
    }

    let v = views::diff(current, desired);
    if !v.is_empty() {
        return Ok(v);
    }

    let c = columns::diff(current, desired)?;
    if !c.is_empty() {
        return Ok(c);
    }

    let k = constraints::diff(current, desired);
    if !k.is_empty() {
        return Ok(k);
    }

    inserts::diff(current, desired, env)
}

/// The outcome of comparing two keyed lists.
pub(super) struct SetDiff<'a, T, K> {
    pub removed: Vec<(K, &'a T)>,
    pub added: Vec<(K, &'a T)>,
    pub common: Vec<(K, &'a T, &'a T)>,
}

/// The generic set-difference template (§4.3): build `L = k→x` over
/// `current`, `R = k→x` over `desired`; removes/adds/common follow from
/// set operations over the keys, in sorted key order.
pub(super) fn set_diff<'a, T, K: Ord + Clone>(
    current: &'a [T],
    desired: &'a [T],
    key: impl Fn(&T) -> K,
) -> SetDiff<'a, T, K> {
    let mut l: BTreeMap<K, &T> = current.iter().map(|x| (key(x), x)).collect();
    let mut r: BTreeMap<K, &T> = desired.iter().map(|x| (key(x), x)).collect();

    let keys: BTreeSet<K> = l.keys().chain(r.keys()).cloned().collect();

    let mut removed = Vec::new();
    let mut added = Vec::new();
    let mut common = Vec::new();

    for k in keys {
        match (l.remove(&k), r.remove(&k)) {
            (Some(lv), Some(rv)) => common.push((k, lv, rv)),
            (Some(lv), None) => removed.push((k, lv)),
            (None, Some(rv)) => added.push((k, rv)),
            (None, None) => unreachable!("key came from one of the two maps"),
        }
    }

    SetDiff { removed, added, common }
}

/// Names of tables/views referenced as top-level `FROM` leaves by `view`.
pub(super) fn from_leaf_names(select_union: &crate::model::WithSelect) -> Vec<String> {
    let mut out = Vec::new();
    for (_, select) in &select_union.ctes {
        if let Some(from) = &select.from {
            collect_leaf_names(from, &mut out);
        }
    }
    if let Some(from) = &select_union.select.from {
        collect_leaf_names(from, &mut out);
    }
    out
}

fn collect_leaf_names(e: &Expr, out: &mut Vec<String>) {
    use crate::model::BinOp;
    match e {
        Expr::Binary { op: BinOp::InnerJoin | BinOp::LeftOuterJoin, left, right } => {
            collect_leaf_names(left, out);
            if let Expr::JoinOn { relation, .. } = right.as_ref() {
                collect_leaf_names(relation, out);
            }
        }
        Expr::Table(name) => out.push(name.clone()),
        Expr::Alias { expr, .. } => collect_leaf_names(expr, out),
        Expr::Subquery(ws) => out.extend(from_leaf_names(ws)),
        _ => {}
    }
}

/// Tables/views whose rendered `FROM` clause references `table`, sorted
/// by name for deterministic drop ordering.
pub(super) fn views_referencing<'a>(file: &'a SqlFile, table: &str) -> Vec<&'a str> {
    let mut out: Vec<&str> = file
        .views
        .iter()
        .filter(|v| from_leaf_names(&v.select_union).iter().any(|n| n == table))
        .map(|v| v.name.as_str())
        .collect();
    out.sort_unstable();
    out
}
