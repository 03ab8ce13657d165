// src/config.rs

//! Loads the `db.toml` project file: which SQL files make up the desired
//! schema, which tables are synchronized by `INSERT` rows, and the
//! environment variables that name the target database and optional
//! pull script. This is the CLI's only notion of "a project"; the core
//! parser/differ/executor never see it directly.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct ReportEntry {
    pub src: String,
    pub dest: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFile {
    /// Name of the environment variable whose value is the database path.
    pub db_file: String,
    /// `.sql` files making up the desired schema, relative to the project root.
    pub files: Vec<String>,
    pub schema_version: String,
    #[serde(default)]
    pub version_remarks: String,
    #[serde(default)]
    pub table_sync: Vec<String>,
    #[serde(default)]
    pub report: Vec<ReportEntry>,
    pub pull_script: Option<String>,
}

/// A loaded project: the parsed TOML plus everything resolved against
/// the environment and the filesystem.
pub struct Project {
    pub db_file_path: String,
    pub pull_script: Option<String>,
    pub schema_version: String,
    pub version_remarks: String,
    pub table_sync: Vec<String>,
    pub report: Vec<ReportEntry>,
    pub sql_sources: Vec<String>,
}

pub fn load(path: &Path, env: &dyn Fn(&str) -> Option<String>) -> Result<Project> {
    let text = std::fs::read_to_string(path)?;
    let file: ProjectFile = toml::from_str(&text)?;

    debug!(files = file.files.len(), "loaded project file");

    let root = path.parent().unwrap_or_else(|| Path::new("."));

    let db_file_path = env(&file.db_file).ok_or_else(|| Error::ExpectingEnvVar(file.db_file.clone()))?;
    let pull_script = match &file.pull_script {
        Some(name) => Some(env(name).ok_or_else(|| Error::ExpectingEnvVar(name.clone()))?),
        None => None,
    };

    let mut sql_sources = Vec::with_capacity(file.files.len());
    for rel in &file.files {
        let resolved: PathBuf = root.join(rel);
        let text = std::fs::read_to_string(&resolved)?;
        sql_sources.push(text);
    }

    Ok(Project {
        db_file_path,
        pull_script,
        schema_version: file.schema_version,
        version_remarks: file.version_remarks,
        table_sync: file.table_sync,
        report: file.report,
        sql_sources,
    })
}

/// Concatenates every source file and parses the combined text, since
/// the project may spread `CREATE` and `INSERT` statements across
/// multiple files.
pub fn desired_schema(project: &Project) -> Result<crate::model::SqlFile> {
    let combined = project.sql_sources.join("\n");
    crate::parser::parse_sql_file_with_inserts(&combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_project() {
        let dir = tempfile::tempdir().unwrap();
        let sql_path = dir.path().join("schema.sql");
        std::fs::File::create(&sql_path).unwrap().write_all(b"CREATE TABLE t(id integer NOT NULL);").unwrap();

        let toml_path = dir.path().join("db.toml");
        std::fs::File::create(&toml_path)
            .unwrap()
            .write_all(
                br#"
                db_file = "MIG_TEST_DB"
                files = ["schema.sql"]
                schema_version = "1"
                version_remarks = "initial"
                "#,
            )
            .unwrap();

        let env = |name: &str| if name == "MIG_TEST_DB" { Some("test.db".to_string()) } else { None };
        let project = load(&toml_path, &env).unwrap();
        assert_eq!(project.db_file_path, "test.db");
        assert_eq!(project.sql_sources.len(), 1);

        let schema = desired_schema(&project).unwrap();
        assert_eq!(schema.tables.len(), 1);
    }

    #[test]
    fn missing_env_var_fails() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("db.toml");
        std::fs::File::create(&toml_path)
            .unwrap()
            .write_all(br#"db_file = "MIG_MISSING"
files = []
schema_version = "1"
"#)
            .unwrap();

        let env = |_: &str| None;
        let err = load(&toml_path, &env).unwrap_err();
        assert!(matches!(err, Error::ExpectingEnvVar(_)));
    }
}
