// src/parser/mod.rs

//! Recursive-descent parser for the supported SQLite dialect subset:
//! `CREATE TABLE`, `CREATE VIEW`, `CREATE INDEX`, and `INSERT INTO ...
//! VALUES ...`. No error recovery — the first failure aborts parsing of
//! the whole file.

mod expr;
mod lexer;

use crate::error::{Error, Position, Result};
use crate::model::{
    ColumnConstraint, ColumnDef, CreateIndex, CreateTable, CreateView, Expr, InsertInto, SqlFile,
    SqlType,
};
use lexer::{tokenize, Spanned, Token};

pub(crate) struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_pos(&self) -> Position {
        self.tokens[self.pos].pos
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, element: &str) -> Error {
        let position = self.peek_pos();
        Error::FailedParse {
            position,
            element: element.to_string(),
            formatted: format!(
                "expected {element} at line {}, col {}, found {:?}",
                position.line,
                position.col,
                self.peek()
            ),
        }
    }

    fn check_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    /// Looks at the token `ahead` positions past the current one.
    fn check_kw_at(&self, ahead: usize, kw: &str) -> bool {
        match self.tokens.get(self.pos + ahead) {
            Some(Spanned { token: Token::Ident(s), .. }) => s.eq_ignore_ascii_case(kw),
            _ => false,
        }
    }

    fn check_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Token::Punct(q) if *q == p)
    }

    fn eat_kw(&mut self, kw: &str) -> Result<()> {
        if self.check_kw(kw) {
            self.bump();
            Ok(())
        } else {
            Err(self.err(kw))
        }
    }

    fn eat_punct(&mut self, p: &str) -> Result<()> {
        if self.check_punct(p) {
            self.bump();
            Ok(())
        } else {
            Err(self.err(p))
        }
    }

    fn eat_punct_opt(&mut self, p: &str) -> bool {
        if self.check_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw_opt(&mut self, kw: &str) -> bool {
        if self.check_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.bump() {
            Token::Ident(s) => Ok(s),
            _ => {
                // already consumed; report against the previous token
                self.pos = self.pos.saturating_sub(1);
                Err(self.err("identifier"))
            }
        }
    }

    fn ident_list(&mut self) -> Result<Vec<String>> {
        let mut out = vec![self.ident()?];
        while self.eat_punct_opt(",") {
            out.push(self.ident()?);
        }
        Ok(out)
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }
}

pub fn parse_sql_file(src: &str) -> Result<SqlFile> {
    let tokens = tokenize(src).map_err(|(position, msg)| Error::FailedParse {
        position,
        element: "token".to_string(),
        formatted: format!("lexical error at line {}, col {}: {msg}", position.line, position.col),
    })?;
    let mut p = Parser { tokens, pos: 0 };
    let mut file = SqlFile::default();

    while !p.is_eof() {
        p.eat_kw("CREATE").map_err(|_| p.err("CREATE, or INSERT"))?;
        if p.check_kw("TABLE") {
            file.tables.push(parse_create_table(&mut p)?);
        } else if p.check_kw("VIEW") {
            file.views.push(parse_create_view(&mut p)?);
        } else if p.check_kw("INDEX") {
            file.indexes.push(parse_create_index(&mut p)?);
        } else {
            return Err(p.err("TABLE, VIEW, or INDEX"));
        }
    }

    Ok(file)
}

/// Parses a single top-level statement list that may also contain
/// `INSERT INTO` statements (used by callers that need the create+insert
/// mix, e.g. project files with seed data). `parse_sql_file` handles the
/// DDL-only case above; this entry point is used by the config/project
/// loader which allows inserts interleaved with DDL in the same file.
pub fn parse_sql_file_with_inserts(src: &str) -> Result<SqlFile> {
    let tokens = tokenize(src).map_err(|(position, msg)| Error::FailedParse {
        position,
        element: "token".to_string(),
        formatted: format!("lexical error at line {}, col {}: {msg}", position.line, position.col),
    })?;
    let mut p = Parser { tokens, pos: 0 };
    let mut file = SqlFile::default();

    while !p.is_eof() {
        if p.check_kw("CREATE") {
            p.bump();
            if p.check_kw("TABLE") {
                file.tables.push(parse_create_table(&mut p)?);
            } else if p.check_kw("VIEW") {
                file.views.push(parse_create_view(&mut p)?);
            } else if p.check_kw("INDEX") {
                file.indexes.push(parse_create_index(&mut p)?);
            } else {
                return Err(p.err("TABLE, VIEW, or INDEX"));
            }
        } else if p.check_kw("INSERT") {
            file.inserts.push(parse_insert_into(&mut p)?);
        } else {
            return Err(p.err("CREATE or INSERT"));
        }
    }

    Ok(file)
}

fn parse_col_type(p: &mut Parser) -> Result<SqlType> {
    if p.check_kw("integer") {
        p.bump();
        Ok(SqlType::Integer)
    } else if p.check_kw("text") {
        p.bump();
        Ok(SqlType::Text)
    } else {
        Err(p.err("integer or text"))
    }
}

fn parse_col_constraint(p: &mut Parser) -> Result<Option<ColumnConstraint>> {
    if p.check_kw("NOT") {
        p.bump();
        p.eat_kw("NULL")?;
        Ok(Some(ColumnConstraint::NotNull))
    } else if p.check_kw("PRIMARY") {
        p.bump();
        p.eat_kw("KEY")?;
        let autoincrement = p.eat_kw_opt("AUTOINCREMENT");
        Ok(Some(ColumnConstraint::PrimaryKey { autoincrement }))
    } else if p.check_kw("UNIQUE") {
        p.bump();
        let cols = if p.eat_punct_opt("(") {
            let cols = p.ident_list()?;
            p.eat_punct(")")?;
            cols
        } else {
            Vec::new()
        };
        Ok(Some(ColumnConstraint::Unique(cols)))
    } else if p.check_kw("DEFAULT") {
        p.bump();
        let e = expr::parse_expr(p)?;
        Ok(Some(ColumnConstraint::Default(e)))
    } else if p.check_kw("FOREIGN") {
        p.bump();
        p.eat_kw("KEY")?;
        p.eat_punct("(")?;
        let columns = p.ident_list()?;
        p.eat_punct(")")?;
        p.eat_kw("REFERENCES")?;
        let ref_table = p.ident()?;
        p.eat_punct("(")?;
        let ref_columns = p.ident_list()?;
        p.eat_punct(")")?;
        Ok(Some(ColumnConstraint::ForeignKey { columns, ref_table, ref_columns }))
    } else {
        Ok(None)
    }
}

/// True when the upcoming comma-separated item is a table-level
/// constraint rather than a `columnDef`.
fn at_table_constraint(p: &Parser) -> bool {
    let unique_with_parens = p.check_kw("UNIQUE")
        && matches!(p.tokens.get(p.pos + 1), Some(s) if matches!(s.token, Token::Punct("(")));

    (p.check_kw("PRIMARY") && p.check_kw_at(1, "KEY")) || unique_with_parens || p.check_kw("FOREIGN")
}

fn parse_table_constraint(p: &mut Parser) -> Result<ColumnConstraint> {
    if p.check_kw("PRIMARY") {
        p.bump();
        p.eat_kw("KEY")?;
        p.eat_punct("(")?;
        let cols = p.ident_list()?;
        p.eat_punct(")")?;
        Ok(ColumnConstraint::PrimaryKeyCols(cols))
    } else if p.check_kw("UNIQUE") {
        p.bump();
        p.eat_punct("(")?;
        let cols = p.ident_list()?;
        p.eat_punct(")")?;
        Ok(ColumnConstraint::Unique(cols))
    } else if p.check_kw("FOREIGN") {
        p.bump();
        p.eat_kw("KEY")?;
        p.eat_punct("(")?;
        let columns = p.ident_list()?;
        p.eat_punct(")")?;
        p.eat_kw("REFERENCES")?;
        let ref_table = p.ident()?;
        p.eat_punct("(")?;
        let ref_columns = p.ident_list()?;
        p.eat_punct(")")?;
        Ok(ColumnConstraint::ForeignKey { columns, ref_table, ref_columns })
    } else {
        Err(p.err("PRIMARY KEY, UNIQUE, or FOREIGN KEY"))
    }
}

fn parse_column_def(p: &mut Parser) -> Result<ColumnDef> {
    let name = p.ident()?;
    let sql_type = parse_col_type(p)?;
    let mut constraints = Vec::new();
    while let Some(c) = parse_col_constraint(p)? {
        constraints.push(c);
    }
    Ok(ColumnDef { name, sql_type, constraints })
}

fn parse_create_table(p: &mut Parser) -> Result<CreateTable> {
    p.eat_kw("TABLE")?;
    let name = p.ident()?;
    p.eat_punct("(")?;

    let mut columns = Vec::new();
    let mut constraints = Vec::new();

    loop {
        if at_table_constraint(p) {
            constraints.push(parse_table_constraint(p)?);
        } else {
            columns.push(parse_column_def(p)?);
        }

        if !p.eat_punct_opt(",") {
            break;
        }
    }

    p.eat_punct(")")?;
    p.eat_punct(";")?;

    Ok(CreateTable { name, columns, constraints })
}

fn parse_create_view(p: &mut Parser) -> Result<CreateView> {
    p.eat_kw("VIEW")?;
    let name = p.ident()?;
    p.eat_kw("AS")?;
    let select_union = expr::parse_with_select(p)?;
    p.eat_punct(";")?;
    Ok(CreateView { name, select_union })
}

fn parse_create_index(p: &mut Parser) -> Result<CreateIndex> {
    p.eat_kw("INDEX")?;
    let name = p.ident()?;
    p.eat_kw("ON")?;
    let table = p.ident()?;
    p.eat_punct("(")?;
    let columns = p.ident_list()?;
    p.eat_punct(")")?;
    p.eat_punct(";")?;
    Ok(CreateIndex { name, table, columns })
}

fn parse_insert_into(p: &mut Parser) -> Result<InsertInto> {
    p.eat_kw("INSERT")?;
    p.eat_kw("INTO")?;
    let table = p.ident()?;

    let columns = if p.eat_punct_opt("(") {
        let cols = p.ident_list()?;
        p.eat_punct(")")?;
        cols
    } else {
        Vec::new()
    };

    p.eat_kw("VALUES")?;
    let mut values = Vec::new();
    loop {
        p.eat_punct("(")?;
        let mut row = Vec::new();
        row.push(expr::parse_expr(p)?);
        while p.eat_punct_opt(",") {
            row.push(expr::parse_expr(p)?);
        }
        p.eat_punct(")")?;
        values.push(row);
        if !p.eat_punct_opt(",") {
            break;
        }
    }
    p.eat_punct(";")?;

    for row in &values {
        if !columns.is_empty() && row.len() != columns.len() {
            return Err(Error::FailedParse {
                position: p.peek_pos(),
                element: "matching row arity".to_string(),
                formatted: format!(
                    "INSERT INTO {table}: row has {} values but {} columns were declared",
                    row.len(),
                    columns.len()
                ),
            });
        }
    }

    Ok(InsertInto { table, columns, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_table() {
        let sql = "CREATE TABLE table0(id integer NOT NULL);";
        let file = parse_sql_file(sql).unwrap();
        assert_eq!(file.tables.len(), 1);
        assert_eq!(file.tables[0].name, "table0");
        assert_eq!(file.tables[0].columns.len(), 1);
        assert_eq!(file.tables[0].columns[0].name, "id");
        assert_eq!(file.tables[0].columns[0].sql_type, SqlType::Integer);
        assert!(file.tables[0].columns[0].is_not_null());
    }

    #[test]
    fn parses_table_with_unique_constraint() {
        let sql = "CREATE TABLE t(id integer NOT NULL, UNIQUE(id));";
        let file = parse_sql_file(sql).unwrap();
        let t = &file.tables[0];
        assert_eq!(t.columns.len(), 1);
        assert_eq!(t.constraints.len(), 1);
        assert!(matches!(&t.constraints[0], ColumnConstraint::Unique(cols) if cols == &vec!["id".to_string()]));
    }

    #[test]
    fn parses_default_and_rename_columns() {
        let sql = "CREATE TABLE t(id integer NOT NULL, column1 text NOT NULL DEFAULT 'bla');";
        let file = parse_sql_file(sql).unwrap();
        let col = &file.tables[0].columns[1];
        assert_eq!(col.name, "column1");
        assert_eq!(col.sql_type, SqlType::Text);
        match col.default() {
            Some(Expr::Text(s)) => assert_eq!(s, "bla"),
            other => panic!("expected text default, got {other:?}"),
        }
    }

    #[test]
    fn parses_insert_into() {
        let sql = "INSERT INTO t(id, name) VALUES (1, 'one'), (2, 'two');";
        let file = parse_sql_file_with_inserts(sql).unwrap();
        assert_eq!(file.inserts.len(), 1);
        assert_eq!(file.inserts[0].values.len(), 2);
    }

    #[test]
    fn rejects_mismatched_insert_arity() {
        let sql = "INSERT INTO t(id, name) VALUES (1);";
        let err = parse_sql_file_with_inserts(sql).unwrap_err();
        assert!(matches!(err, Error::FailedParse { .. }));
    }

    #[test]
    fn parses_create_view_with_join() {
        let sql = "CREATE VIEW v AS SELECT a.id, b.name FROM a INNER JOIN b ON a.id = b.a_id;";
        let file = parse_sql_file_with_inserts(sql).unwrap();
        assert_eq!(file.views.len(), 1);
        assert_eq!(file.views[0].name, "v");
    }

    #[test]
    fn reports_position_on_failure() {
        let sql = "CREATE TALBE t(id integer);";
        let err = parse_sql_file(sql).unwrap_err();
        match err {
            Error::FailedParse { position, .. } => assert_eq!(position.line, 1),
            other => panic!("expected FailedParse, got {other:?}"),
        }
    }
}
