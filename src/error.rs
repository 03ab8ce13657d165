// src/error.rs

use thiserror::Error;

/// The position of a parse failure, 1-indexed line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

/// Core error types for mig
#[derive(Error, Debug)]
pub enum Error {
    // --- Config errors ---
    /// The project file (`db.toml`) could not be parsed or is missing a required key
    #[error("malformed project file: {0}")]
    MalformedProject(String),

    /// An `@name` environment-variable reference has no value in the process environment
    #[error("expecting environment variable: {0}")]
    ExpectingEnvVar(String),

    // --- Parse errors ---
    /// The SQL parser failed at a specific position
    #[error("parse error at line {}, col {}: expected {element}", position.line, position.col)]
    FailedParse {
        position: Position,
        element: String,
        formatted: String,
    },

    // --- Type-check errors ---
    #[error("undefined identifier: {0}")]
    UndefinedIdentifier(String),

    #[error("duplicated definition: {0}")]
    DuplicatedDefinition(String),

    #[error("cannot infer type without table for: {0}")]
    CannotInferTypeWithoutTable(String),

    #[error("not matching types: {0} vs {1}")]
    NotMatchingTypes(String, String),

    #[error("expecting type {0}, got {1}")]
    ExpectingType(String, String),

    #[error("unsupported type inference for expression: {0}")]
    UnsupportedTypeInference(String),

    #[error("view dependency cycle detected, involving: {0}")]
    ViewCycle(String),

    // --- Planning errors ---
    #[error("table should have a primary key: {0}")]
    TableShouldHavePrimaryKey(String),

    #[error("table should have a single primary key: {0}")]
    TableShouldHaveSinglePrimaryKey(String),

    #[error("no default value for added column: {0}")]
    NoDefaultValueForColumn(String),

    // --- Execution errors ---
    #[error("failed to open database {db_file}: {msg}")]
    FailedOpenDb { db_file: String, msg: String },

    #[error("failed query: {sql}: {error}")]
    FailedQuery { sql: String, error: String },

    #[error("failed to open migration store: {0}")]
    FailedOpenStore(String),

    #[error("stale migration: stored schema version is ahead of desired, with {0} pending steps")]
    StaleMigration(usize),

    #[error("schema still differs after manual migration: {0} remaining proposals")]
    SchemaStillDiffers(usize),

    #[error("unrecoverable diff reason: {0}")]
    UnparseableReason(String),

    // --- Infrastructure ---
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid project TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias using mig's Error type
pub type Result<T> = std::result::Result<T, Error>;
