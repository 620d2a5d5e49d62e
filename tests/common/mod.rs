// Common test utilities
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use testify_migrate::{MigrateError, MigrationConfig, Migrator, RunSummary};

pub const MODULE: &str = "example.com/m";

/// A throwaway Go module rooted in a temp directory.
pub fn setup_module(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("go.mod"),
        format!("module {MODULE}\n\ngo 1.21\n"),
    )
    .unwrap();
    for (name, content) in files {
        write_file(temp_dir.path(), name, content);
    }
    temp_dir
}

pub fn write_file(dir: &Path, name: &str, content: &str) {
    let file_path = dir.join(name);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(file_path, content).unwrap();
}

pub fn read_file(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}

pub fn config_for(root: &Path, patterns: &[&str]) -> MigrationConfig {
    MigrationConfig {
        root: PathBuf::from(root),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    }
}

/// Run a migration and return the summary plus everything written to the report.
pub fn run(config: MigrationConfig) -> (RunSummary, String) {
    let mut out = Vec::new();
    let summary = Migrator::new(config).run(&mut out).unwrap();
    (summary, String::from_utf8(out).unwrap())
}

/// Like [`run`], but hands back the error instead of panicking.
pub fn try_run(config: MigrationConfig) -> Result<(RunSummary, String), MigrateError> {
    let mut out = Vec::new();
    let summary = Migrator::new(config).run(&mut out)?;
    Ok((summary, String::from_utf8(out).unwrap()))
}
