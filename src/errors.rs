//! # Error Types
//!
//! Error handling for the migration pipeline.
//! Every stage reports through [`MigrateError`]; only match application
//! failures are tolerated by the orchestrator, everything else aborts a run.

use std::fmt;
use std::path::PathBuf;

/// Error types that can occur while migrating a source tree.
#[derive(Debug)]
pub enum MigrateError {
    /// The rule catalog is malformed or ambiguous
    Catalog(String),
    /// Writing or registering a synthetic template unit failed
    TemplateGeneration(String),
    /// The combined template and target program failed to load or parse
    ProgramLoad(String),
    /// A single matcher failed against a single file
    MatchApplication { file: PathBuf, message: String },
    /// Writing a rewritten file back to disk failed
    Persist { path: PathBuf, source: std::io::Error },
    /// A package pattern could not be compiled
    Pattern(String),
    /// I/O error reading files
    Io(std::io::Error),
    /// Error walking directory trees during package discovery
    WalkDir(walkdir::Error),
    /// Error parsing YAML rule catalogs
    SerdeYaml(serde_yaml::Error),
    /// Error serializing run summaries
    SerdeJson(serde_json::Error),
    /// Regular expression compilation error
    Regex(regex::Error),
    /// Glob pattern compilation error
    Glob(globset::Error),
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrateError::Catalog(msg) => write!(f, "Catalog error: {msg}"),
            MigrateError::TemplateGeneration(msg) => {
                write!(f, "Template generation error: {msg}")
            }
            MigrateError::ProgramLoad(msg) => write!(f, "Program load error: {msg}"),
            MigrateError::MatchApplication { file, message } => {
                write!(f, "Match application error in {}: {message}", file.display())
            }
            MigrateError::Persist { path, source } => {
                write!(f, "Failed to write {}: {source}", path.display())
            }
            MigrateError::Pattern(msg) => write!(f, "Package pattern error: {msg}"),
            MigrateError::Io(err) => write!(f, "IO error: {err}"),
            MigrateError::WalkDir(err) => write!(f, "Directory traversal error: {err}"),
            MigrateError::SerdeYaml(err) => write!(f, "YAML parsing error: {err}"),
            MigrateError::SerdeJson(err) => write!(f, "JSON error: {err}"),
            MigrateError::Regex(err) => write!(f, "Regex error: {err}"),
            MigrateError::Glob(err) => write!(f, "Glob error: {err}"),
        }
    }
}

impl std::error::Error for MigrateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrateError::Persist { source, .. } => Some(source),
            MigrateError::Io(err) => Some(err),
            MigrateError::WalkDir(err) => Some(err),
            MigrateError::SerdeYaml(err) => Some(err),
            MigrateError::SerdeJson(err) => Some(err),
            MigrateError::Regex(err) => Some(err),
            MigrateError::Glob(err) => Some(err),
            _ => None,
        }
    }
}

impl MigrateError {
    /// Whether the orchestrator may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MigrateError::MatchApplication { .. })
    }
}

impl From<std::io::Error> for MigrateError {
    fn from(err: std::io::Error) -> Self {
        MigrateError::Io(err)
    }
}

impl From<walkdir::Error> for MigrateError {
    fn from(err: walkdir::Error) -> Self {
        MigrateError::WalkDir(err)
    }
}

impl From<serde_yaml::Error> for MigrateError {
    fn from(err: serde_yaml::Error) -> Self {
        MigrateError::SerdeYaml(err)
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(err: serde_json::Error) -> Self {
        MigrateError::SerdeJson(err)
    }
}

impl From<regex::Error> for MigrateError {
    fn from(err: regex::Error) -> Self {
        MigrateError::Regex(err)
    }
}

impl From<globset::Error> for MigrateError {
    fn from(err: globset::Error) -> Self {
        MigrateError::Glob(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_match_errors_are_recoverable() {
        let err = MigrateError::MatchApplication {
            file: PathBuf::from("a_test.go"),
            message: "bad pattern".to_string(),
        };
        assert!(err.is_recoverable());
        assert!(!MigrateError::ProgramLoad("syntax".to_string()).is_recoverable());
        assert!(!MigrateError::TemplateGeneration("disk".to_string()).is_recoverable());
    }

    #[test]
    fn test_persist_display_names_path() {
        let err = MigrateError::Persist {
            path: PathBuf::from("pkg/x_test.go"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("pkg/x_test.go"));
    }
}
