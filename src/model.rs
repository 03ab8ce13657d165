// src/model.rs

//! The schema model: algebraic data types for the SQL entities the parser
//! produces, the differ compares, and the generator renders back to text.
//!
//! Values here are created once by the parser and never mutated in place;
//! the differ and generator only ever read them.

use std::fmt;

/// A column's declared type. Equality is structural; no ordering is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Integer,
    Text,
    /// Reachable only through real-valued literals in `InsertInto` rows;
    /// the column grammar (`colType`) never produces this variant.
    Real,
    /// Reachable only as the inferred result of boolean operators in the
    /// type checker; never a column type.
    Bool,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SqlType::Integer => "integer",
            SqlType::Text => "text",
            SqlType::Real => "real",
            SqlType::Bool => "bool",
        };
        write!(f, "{s}")
    }
}

/// Binary operators accepted by the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
    Concat,
    InnerJoin,
    LeftOuterJoin,
}

/// Unary operators accepted by the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Exists,
}

/// A fully parsed `SELECT`, with its optional `WITH` prelude.
#[derive(Debug, Clone, PartialEq)]
pub struct WithSelect {
    /// `(alias, select)` pairs, in declaration order.
    pub ctes: Vec<(String, Select)>,
    pub select: Box<Select>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    /// `None` means `SELECT *`.
    pub projection: Option<Vec<Expr>>,
    pub from: Option<Box<Expr>>,
    pub filter: Option<Box<Expr>>,
    pub group_by: Vec<String>,
    pub having: Option<Box<Expr>>,
    pub order_by: Vec<(String, OrderDirection)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// The recursive expression type shared by column defaults, WHERE/ON
/// clauses, projections, and INSERT row values.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Integer(i64),
    Text(String),
    Real(f64),
    /// `qualifier?.member`
    Column {
        qualifier: Option<String>,
        member: String,
    },
    /// `@name`
    EnvVar { member: String },
    /// `name(args)` optionally followed by `OVER (...)`.
    Call {
        name: String,
        args: Vec<Expr>,
        over: Option<Over>,
    },
    Case {
        when: Box<Expr>,
        then: Box<Expr>,
        r#else: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Alias {
        expr: Box<Expr>,
        name: String,
    },
    /// `relation ON expr` as it appears in a FROM clause's join list.
    JoinOn {
        relation: Box<Expr>,
        on: Option<Box<Expr>>,
    },
    Subquery(Box<WithSelect>),
    Table(String),
    /// A parenthesized list of expressions, as used on the right-hand side
    /// of `IN` when it isn't a subquery (e.g. `x IN (1, 2, 3)`).
    List(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Over {
    pub partition_by: Vec<String>,
    pub order_by: Vec<String>,
}

/// Column-level constraints, as declared in a `CREATE TABLE` column clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraint {
    PrimaryKey { autoincrement: bool },
    PrimaryKeyCols(Vec<String>),
    NotNull,
    Unique(Vec<String>),
    Default(Expr),
    ForeignKey {
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnDef {
    pub fn is_not_null(&self) -> bool {
        self.constraints.iter().any(|c| matches!(c, ColumnConstraint::NotNull))
            || self.is_primary_key()
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, ColumnConstraint::PrimaryKey { .. }))
    }

    pub fn default(&self) -> Option<&Expr> {
        self.constraints.iter().find_map(|c| match c {
            ColumnConstraint::Default(e) => Some(e),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Table-level constraints, e.g. `UNIQUE(a, b)`, composite `PRIMARY KEY`,
    /// or a table-level `FOREIGN KEY`.
    pub constraints: Vec<ColumnConstraint>,
}

impl CreateTable {
    /// The table's primary-key columns, in canonical column order.
    ///
    /// Returns `Err` with the count of distinct PK declarations found when
    /// that count isn't exactly one (callers map this to
    /// `TableShouldHavePrimaryKey` / `TableShouldHaveSinglePrimaryKey`).
    pub fn primary_key_columns(&self) -> Result<Vec<String>, usize> {
        let mut found: Vec<Vec<String>> = Vec::new();

        for col in &self.columns {
            if col.is_primary_key() {
                found.push(vec![col.name.clone()]);
            }
        }
        for c in &self.constraints {
            match c {
                ColumnConstraint::PrimaryKeyCols(cols) => found.push(cols.clone()),
                ColumnConstraint::PrimaryKey { .. } => found.push(Vec::new()),
                _ => {}
            }
        }

        match found.len() {
            0 => Err(0),
            1 => Ok(found.remove(0)),
            n => Err(n),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateView {
    pub name: String,
    pub select_union: WithSelect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertInto {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expr>>,
}

/// A fully parsed SQL file: every top-level statement, grouped by kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlFile {
    pub tables: Vec<CreateTable>,
    pub views: Vec<CreateView>,
    pub indexes: Vec<CreateIndex>,
    pub inserts: Vec<InsertInto>,
}

impl SqlFile {
    pub fn table(&self, name: &str) -> Option<&CreateTable> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// The reason a `SolverProposal` was emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    Added(String),
    Removed(String),
    Changed(String, String),
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diff::Added(x) => write!(f, "Added \"{x}\""),
            Diff::Removed(x) => write!(f, "Removed \"{x}\""),
            Diff::Changed(a, b) => write!(f, "Changed (\"{a}\", \"{b}\")"),
        }
    }
}

/// A single (reason, statements) pair emitted by the differ.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverProposal {
    pub reason: Diff,
    pub statements: Vec<String>,
}

/// A `SolverProposal` plus whatever happened when the executor tried it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalResult {
    pub proposal: SolverProposal,
    pub error: Option<String>,
}

impl ProposalResult {
    pub fn ok(proposal: SolverProposal) -> Self {
        Self { proposal, error: None }
    }
}

/// The full set of proposals for one migration attempt, plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationIntent {
    pub version_remarks: String,
    pub schema_version: String,
    /// RFC 3339 UTC, millisecond precision.
    pub date: String,
    pub steps: Vec<ProposalResult>,
}

impl MigrationIntent {
    pub fn has_errors(&self) -> bool {
        self.steps.iter().any(|s| s.error.is_some())
    }
}
