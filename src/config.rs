use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Root of the Go module to migrate (the directory holding go.mod)
    pub root: PathBuf,
    /// Package patterns, e.g. `./...` or `./pkg/store`
    pub patterns: Vec<String>,
    /// Also rewrite every package that depends on a requested package
    pub transitive: bool,
    /// Log derived matchers and template ASTs
    pub verbose: bool,
    /// Report matches without writing any file
    pub dry_run: bool,
    /// Alternative rule catalog (YAML); the built-in catalog is used when absent
    pub rules_file: Option<PathBuf>,
    /// Parent directory for the scratch template directory (defaults to the system temp dir)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            patterns: vec!["./...".to_string()],
            transitive: false,
            verbose: false,
            dry_run: false,
            rules_file: None,
            scratch_dir: None,
        }
    }
}
