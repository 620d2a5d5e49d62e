pub mod ast_utils;
pub mod config;
pub mod engine;
pub mod errors;
pub mod expander;
pub mod family;
pub mod imports;
pub mod migrate;
pub mod reconcile;
pub mod rules;
pub mod target;

// Re-export commonly used types
pub use config::MigrationConfig;
pub use errors::MigrateError;
pub use migrate::{FileReport, Migrator, RunSummary};
pub use rules::types::*;
