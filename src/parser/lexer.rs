// src/parser/lexer.rs

//! Tokenizer for the SQLite-like dialect. Whitespace and `-- ...` line
//! comments are skipped; every other byte of source text becomes exactly
//! one token, tagged with its 1-indexed (line, col).

use crate::error::Position;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Real(f64),
    Str(String),
    /// `@name`
    EnvVar(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub pos: Position,
}

const MULTI_CHAR_PUNCT: &[&str] = &["<>", "<=", ">=", "||"];

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, (Position, String)> {
    let bytes: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0usize;
    let mut line = 1usize;
    let mut col = 1usize;

    let advance = |i: &mut usize, line: &mut usize, col: &mut usize, bytes: &[char]| {
        if bytes[*i] == '\n' {
            *line += 1;
            *col = 1;
        } else {
            *col += 1;
        }
        *i += 1;
    };

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_whitespace() {
            advance(&mut i, &mut line, &mut col, &bytes);
            continue;
        }

        // line comment
        if c == '-' && i + 1 < bytes.len() && bytes[i + 1] == '-' {
            while i < bytes.len() && bytes[i] != '\n' {
                advance(&mut i, &mut line, &mut col, &bytes);
            }
            continue;
        }

        let start_pos = Position { line, col };

        // string literal
        if c == '\'' {
            advance(&mut i, &mut line, &mut col, &bytes);
            let mut s = String::new();
            loop {
                if i >= bytes.len() {
                    return Err((start_pos, "unterminated string literal".into()));
                }
                if bytes[i] == '\'' {
                    // doubled quote is an escaped quote
                    if i + 1 < bytes.len() && bytes[i + 1] == '\'' {
                        s.push('\'');
                        advance(&mut i, &mut line, &mut col, &bytes);
                        advance(&mut i, &mut line, &mut col, &bytes);
                        continue;
                    }
                    advance(&mut i, &mut line, &mut col, &bytes);
                    break;
                }
                s.push(bytes[i]);
                advance(&mut i, &mut line, &mut col, &bytes);
            }
            out.push(Spanned { token: Token::Str(s), pos: start_pos });
            continue;
        }

        // environment variable reference
        if c == '@' {
            advance(&mut i, &mut line, &mut col, &bytes);
            let mut name = String::new();
            while i < bytes.len() && (bytes[i].is_alphanumeric() || bytes[i] == '_') {
                name.push(bytes[i]);
                advance(&mut i, &mut line, &mut col, &bytes);
            }
            if name.is_empty() {
                return Err((start_pos, "expected identifier after '@'".into()));
            }
            out.push(Spanned { token: Token::EnvVar(name), pos: start_pos });
            continue;
        }

        // number
        if c.is_ascii_digit() {
            let mut s = String::new();
            let mut is_real = false;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == '.') {
                if bytes[i] == '.' {
                    is_real = true;
                }
                s.push(bytes[i]);
                advance(&mut i, &mut line, &mut col, &bytes);
            }
            if is_real {
                let v: f64 = s
                    .parse()
                    .map_err(|_| (start_pos, format!("invalid real literal: {s}")))?;
                out.push(Spanned { token: Token::Real(v), pos: start_pos });
            } else {
                let v: i64 = s
                    .parse()
                    .map_err(|_| (start_pos, format!("invalid integer literal: {s}")))?;
                out.push(Spanned { token: Token::Int(v), pos: start_pos });
            }
            continue;
        }

        // identifier / keyword
        if c.is_alphabetic() || c == '_' {
            let mut s = String::new();
            while i < bytes.len() && (bytes[i].is_alphanumeric() || bytes[i] == '_') {
                s.push(bytes[i]);
                advance(&mut i, &mut line, &mut col, &bytes);
            }
            out.push(Spanned { token: Token::Ident(s), pos: start_pos });
            continue;
        }

        // multi-char punctuation
        let two: String = bytes[i..(i + 2).min(bytes.len())].iter().collect();
        if let Some(p) = MULTI_CHAR_PUNCT.iter().find(|p| **p == two) {
            advance(&mut i, &mut line, &mut col, &bytes);
            advance(&mut i, &mut line, &mut col, &bytes);
            out.push(Spanned { token: Token::Punct(p), pos: start_pos });
            continue;
        }

        // single-char punctuation
        let single: &'static str = match c {
            '(' => "(",
            ')' => ")",
            ',' => ",",
            ';' => ";",
            '.' => ".",
            '=' => "=",
            '<' => "<",
            '>' => ">",
            '*' => "*",
            _ => return Err((start_pos, format!("unexpected character: {c:?}"))),
        };
        advance(&mut i, &mut line, &mut col, &bytes);
        out.push(Spanned { token: Token::Punct(single), pos: start_pos });
    }

    out.push(Spanned { token: Token::Eof, pos: Position { line, col } });
    Ok(out)
}
