//! # Rewrite Engine
//!
//! Example-based rewriting on top of ast-grep. Template units are registered
//! as Go source, written to a scratch directory, loaded together with the
//! target packages, and each one is turned into a [`Matcher`].

pub mod matcher;
pub mod program;

pub use matcher::Matcher;
pub use program::{Package, PackageOrigin, Program, UNIT_NAMESPACE};

use crate::errors::MigrateError;
use crate::expander::UnitSink;
use crate::target::TargetFile;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Usage text describing how the engine interprets template units.
pub const ENGINE_HELP: &str = "\
Rewrite engine: example-based refactoring.

Each template unit is a Go file declaring two functions with identical
signatures:

    func before(t testing.TB, a, b interface{}) { require.Equal(t, a, b) }
    func after(t testing.TB, a, b interface{})  { gassert.EQ(t, b, a) }

Every parameter is a wildcard. A call in the target code matching the body
of `before` is replaced by the body of `after`, with the wildcards bound to
the matched sub-expressions. Literal arguments whose type cannot fit the
declared parameter type are not rewritten. A call is only considered when
the file imports the package the `before` call is qualified with.
";

/// Ordinal of a registered template unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitHandle(pub usize);

#[derive(Debug)]
struct RegisteredUnit {
    name: String,
    path: PathBuf,
}

pub struct Engine {
    scratch: TempDir,
    units: Vec<RegisteredUnit>,
    verbose: bool,
}

impl Engine {
    /// Acquire a scratch directory (under `scratch_parent` when given). It is
    /// removed when the engine is dropped.
    pub fn new(scratch_parent: Option<&Path>, verbose: bool) -> Result<Self, MigrateError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".migrate-templates-");
        let scratch = match scratch_parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| {
            MigrateError::TemplateGeneration(format!("cannot create scratch directory: {e}"))
        })?;
        debug!("Template scratch directory {:?}", scratch.path());

        Ok(Self {
            scratch,
            units: Vec::new(),
            verbose,
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Load, parse and check every package under `root` together with the
    /// registered units.
    pub fn load_program(&self, root: &Path) -> Result<Program, MigrateError> {
        let module_path = program::read_module_path(root)?;
        let mut packages = program::discover_packages(root, &module_path)?;
        info!(
            "Loaded {} packages of module {}",
            packages.len(),
            module_path
        );

        let mut unit_handles = Vec::with_capacity(self.units.len());
        for (ordinal, unit) in self.units.iter().enumerate() {
            let handle = UnitHandle(ordinal);
            let file = TargetFile::load(&unit.path)?;
            if file.package_name != unit.name {
                return Err(MigrateError::ProgramLoad(format!(
                    "template unit {} declares package {}",
                    unit.name, file.package_name
                )));
            }
            packages.push(Package {
                import_path: format!("{UNIT_NAMESPACE}/{}", unit.name),
                dir: self.scratch.path().to_path_buf(),
                name: unit.name.clone(),
                origin: PackageOrigin::Template(handle),
                files: vec![file],
            });
            unit_handles.push(handle);
        }

        Ok(Program {
            root: root.to_path_buf(),
            module_path,
            packages,
            unit_handles,
        })
    }

    pub fn make_matcher(&self, program: &Program, handle: UnitHandle) -> Result<Matcher, MigrateError> {
        let package = program.unit_package(handle).ok_or_else(|| {
            MigrateError::ProgramLoad(format!("unknown template unit #{}", handle.0))
        })?;
        Matcher::from_unit(package, self.verbose)
    }

    /// Persist a rewritten file to its original path.
    pub fn write_file(&self, file: &TargetFile) -> Result<(), MigrateError> {
        fs::write(&file.path, &file.source).map_err(|source| MigrateError::Persist {
            path: file.path.clone(),
            source,
        })
    }
}

impl UnitSink for Engine {
    fn register_unit(&mut self, name: &str, source: &str) -> Result<UnitHandle, MigrateError> {
        let path = self.scratch.path().join(format!("{name}.go"));
        fs::write(&path, source).map_err(|e| {
            MigrateError::TemplateGeneration(format!("cannot write {}: {e}", path.display()))
        })?;
        let handle = UnitHandle(self.units.len());
        self.units.push(RegisteredUnit {
            name: name.to_string(),
            path,
        });
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::TemplateExpander;
    use crate::family::RewriteFamily;
    use crate::rules::RuleCatalog;

    #[test]
    fn test_scratch_directory_removed_on_drop() {
        let parent = TempDir::new().unwrap();
        let scratch = {
            let mut engine = Engine::new(Some(parent.path()), false).unwrap();
            engine
                .register_unit("migrate_template_0000", "package migrate_template_0000\n")
                .unwrap();
            let path = engine.scratch_dir().to_path_buf();
            assert!(path.join("migrate_template_0000.go").is_file());
            path
        };
        assert!(!scratch.exists());
    }

    #[test]
    fn test_write_failure_is_persist_error() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::new(Some(dir.path()), false).unwrap();
        // A directory cannot be overwritten as a file
        let file = TargetFile::parse(dir.path(), "package p\n".to_string()).unwrap();

        let err = engine.write_file(&file).unwrap_err();
        assert!(matches!(err, MigrateError::Persist { ref path, .. } if path == dir.path()));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_matchers_derived_from_units() {
        let root = TempDir::new().unwrap();
        let mut engine = Engine::new(None, false).unwrap();
        let catalog = RuleCatalog::builtin().unwrap();
        let expansion = TemplateExpander::new()
            .expand(&catalog, &[RewriteFamily::strict()], &mut engine)
            .unwrap();
        assert_eq!(expansion.count(), catalog.len() * 6);

        let program = engine.load_program(root.path()).unwrap();
        assert_eq!(program.target_packages().count(), 0);

        // Third unit: no-error rule with two trailing arguments
        let matcher = engine.make_matcher(&program, UnitHandle(2)).unwrap();
        assert_eq!(matcher.pattern_text(), "require.NoError($T, $ERR, $M0, $M1)");
        assert_eq!(matcher.replacement(), "gassert.NoError($T, $ERR, $M0, $M1)");
    }

    #[test]
    fn test_mismatched_unit_signatures_rejected() {
        let root = TempDir::new().unwrap();
        let mut engine = Engine::new(None, false).unwrap();
        engine
            .register_unit(
                "migrate_template_0000",
                "package migrate_template_0000\n\nimport (\n\t\"testing\"\n\n\t\"github.com/stretchr/testify/require\"\n)\n\nfunc before(t testing.TB, a bool) { require.True(t, a) }\n\nfunc after(t testing.TB) { require.True(t, true) }\n",
            )
            .unwrap();
        let program = engine.load_program(root.path()).unwrap();
        let err = engine.make_matcher(&program, UnitHandle(0)).unwrap_err();
        assert!(err.to_string().contains("different signatures"));
    }
}
