// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("mig")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Declarative schema migration engine for SQLite")
        .subcommand_required(true)
        .arg(
            Arg::new("project")
                .short('p')
                .long("project")
                .value_name("PATH")
                .default_value("db.toml")
                .help("Path to the project file describing the desired schema"),
        )
        .subcommand(Command::new("status").about("Print the proposed migration without touching the database"))
        .subcommand(Command::new("commit").about("Apply the proposed migration transactionally"))
        .subcommand(Command::new("manual").about("Execute SQL from standard input and attach it to the last migration"))
        .subcommand(Command::new("history").about("List every stored migration, most recent first"))
        .subcommand(Command::new("amend").about("Append SQL from standard input to the last stored migration"))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("mig.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
