pub mod catalog;
pub mod types;

// Re-export commonly used types
pub use catalog::RuleCatalog;
pub use types::*;
