//! # Migration Orchestrator
//!
//! Drives one run: catalog, template expansion, program load, matcher
//! derivation, then every matcher and the import reconciler over each file
//! of the resolved packages. The orchestrator is the only component that
//! writes to the target tree.

use crate::config::MigrationConfig;
use crate::engine::{Engine, Matcher};
use crate::errors::MigrateError;
use crate::expander::{TemplateExpander, UnitOrigin};
use crate::family::RewriteFamily;
use crate::reconcile::ImportReconciler;
use crate::rules::RuleCatalog;
use crate::target::TargetFile;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, info, warn};

/// One rewritten file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub matches: usize,
    /// sha256 of the rewritten content
    pub file_hash: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub templates: usize,
    pub packages: Vec<String>,
    pub files: Vec<FileReport>,
    pub total_matches: usize,
    /// Rewrites per catalog rule id (import changes excluded)
    pub rule_matches: BTreeMap<String, usize>,
    pub dry_run: bool,
}

/// One rewrite pass over a file, credited to a catalog rule.
pub(crate) trait FileRewrite {
    fn rule_id(&self) -> &str;
    fn rewrite(&self, file: &mut TargetFile) -> Result<usize, MigrateError>;
}

struct RuleMatcher<'a> {
    matcher: Matcher,
    origin: &'a UnitOrigin,
}

impl FileRewrite for RuleMatcher<'_> {
    fn rule_id(&self) -> &str {
        &self.origin.rule_id
    }

    fn rewrite(&self, file: &mut TargetFile) -> Result<usize, MigrateError> {
        self.matcher.apply(file)
    }
}

/// Run every rewrite over `file`. A rewrite that fails recoverably is logged
/// and counts as zero matches; any other failure aborts.
pub(crate) fn rewrite_file<'a>(
    rewrites: impl IntoIterator<Item = &'a dyn FileRewrite>,
    file: &mut TargetFile,
    rule_matches: &mut BTreeMap<String, usize>,
) -> Result<usize, MigrateError> {
    let mut count = 0;
    for rewrite in rewrites {
        let n = match rewrite.rewrite(file) {
            Ok(n) => n,
            Err(e) if e.is_recoverable() => {
                warn!("{e}");
                0
            }
            Err(e) => return Err(e),
        };
        if n > 0 {
            *rule_matches.entry(rewrite.rule_id().to_string()).or_default() += n;
            count += n;
        }
    }
    Ok(count)
}

pub struct Migrator {
    config: MigrationConfig,
}

impl Migrator {
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Run the migration, writing progress lines to `out`.
    pub fn run(&self, out: &mut dyn Write) -> Result<RunSummary, MigrateError> {
        let catalog = match &self.config.rules_file {
            Some(path) => RuleCatalog::load(path)?,
            None => RuleCatalog::builtin()?,
        };
        let families = RewriteFamily::builtin();

        let mut engine = Engine::new(self.config.scratch_dir.as_deref(), self.config.verbose)?;
        let expansion = TemplateExpander::new().expand(&catalog, &families, &mut engine)?;
        info!(
            "Expanded {} rules into {} template units",
            catalog.len(),
            expansion.count()
        );

        let mut program = engine.load_program(&self.config.root)?;
        let matchers: Vec<RuleMatcher<'_>> = expansion
            .units
            .iter()
            .map(|(handle, origin)| {
                Ok(RuleMatcher {
                    matcher: engine.make_matcher(&program, *handle)?,
                    origin,
                })
            })
            .collect::<Result<_, MigrateError>>()?;
        debug!("Derived {} matchers", matchers.len());

        let selected = program.resolve(&self.config.patterns, self.config.transitive)?;
        let reconciler = ImportReconciler::new(families, &catalog);

        let mut summary = RunSummary {
            templates: expansion.count(),
            dry_run: self.config.dry_run,
            ..RunSummary::default()
        };

        for idx in selected {
            let package = &mut program.packages[idx];
            if package.is_template() {
                continue;
            }
            writeln!(out, "Handling package {}", package.import_path)?;
            summary.packages.push(package.import_path.clone());

            for file in &mut package.files {
                let mut count = rewrite_file(
                    matchers.iter().map(|m| m as &dyn FileRewrite),
                    file,
                    &mut summary.rule_matches,
                )?;
                count += reconciler.reconcile(file);

                if count == 0 {
                    continue;
                }
                writeln!(out, "=== {} ({} matches)", file.path.display(), count)?;
                if !self.config.dry_run {
                    engine.write_file(file)?;
                }
                summary.total_matches += count;
                summary.files.push(FileReport {
                    path: file.path.display().to_string(),
                    matches: count,
                    file_hash: format!("{:x}", Sha256::digest(file.source.as_bytes())),
                });
            }
        }

        info!(
            "Rewrote {} files with {} matches",
            summary.files.len(),
            summary.total_matches
        );
        Ok(summary)
    }
}
