//! # Program Image
//!
//! Every Go package under a module root plus the injected template units.
//! Package resolution (patterns and transitive dependents) works on this
//! image.

use super::UnitHandle;
use crate::errors::MigrateError;
use crate::target::TargetFile;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Import-path namespace for template units. Go import paths may not start
/// with an underscore, so no real package can collide with it.
pub const UNIT_NAMESPACE: &str = "_migrate_templates";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageOrigin {
    Target,
    Template(UnitHandle),
}

#[derive(Debug, Clone)]
pub struct Package {
    pub import_path: String,
    pub dir: PathBuf,
    pub name: String,
    pub origin: PackageOrigin,
    pub files: Vec<TargetFile>,
}

impl Package {
    pub fn is_template(&self) -> bool {
        matches!(self.origin, PackageOrigin::Template(_))
    }

    /// Import paths referenced by any file of the package.
    pub fn imported_paths(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .flat_map(|f| f.imports.records().iter().map(|r| r.path.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Program {
    pub root: PathBuf,
    pub module_path: String,
    pub packages: Vec<Package>,
    /// Handles of the template units, in registration order
    pub unit_handles: Vec<UnitHandle>,
}

impl Program {
    pub fn target_packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter().filter(|p| !p.is_template())
    }

    pub fn unit_package(&self, handle: UnitHandle) -> Option<&Package> {
        self.packages
            .iter()
            .find(|p| p.origin == PackageOrigin::Template(handle))
    }

    /// Indices of the target packages selected by `patterns`, sorted by
    /// import path. With `transitive`, every package that imports a selected
    /// package (directly or indirectly) is added.
    pub fn resolve(&self, patterns: &[String], transitive: bool) -> Result<Vec<usize>, MigrateError> {
        let matcher = compile_patterns(patterns, &self.module_path)?;

        let mut selected: BTreeSet<usize> = BTreeSet::new();
        for (idx, package) in self.packages.iter().enumerate() {
            if !package.is_template() && matcher.is_match(&package.import_path) {
                selected.insert(idx);
            }
        }
        if selected.is_empty() {
            warn!("No packages matched {:?}", patterns);
        }

        if transitive {
            let expanded = self.dependents_closure(&selected);
            debug!(
                "Transitive mode added {} dependent packages",
                expanded.len() - selected.len()
            );
            selected = expanded;
        }

        let mut ordered: Vec<usize> = selected.into_iter().collect();
        ordered.sort_by(|a, b| self.packages[*a].import_path.cmp(&self.packages[*b].import_path));
        Ok(ordered)
    }

    fn dependents_closure(&self, seeds: &BTreeSet<usize>) -> BTreeSet<usize> {
        let index: BTreeMap<&str, usize> = self
            .packages
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_template())
            .map(|(i, p)| (p.import_path.as_str(), i))
            .collect();

        let mut dependents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, package) in self.packages.iter().enumerate() {
            if package.is_template() {
                continue;
            }
            for path in package.imported_paths() {
                if let Some(&dep) = index.get(path.as_str()) {
                    if dep != idx {
                        dependents.entry(dep).or_default().push(idx);
                    }
                }
            }
        }

        let mut closure = seeds.clone();
        let mut queue: VecDeque<usize> = seeds.iter().copied().collect();
        while let Some(idx) = queue.pop_front() {
            for &dependent in dependents.get(&idx).into_iter().flatten() {
                if closure.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
        closure
    }
}

/// Module path from `go.mod`, or the root directory name when there is none.
pub fn read_module_path(root: &Path) -> Result<String, MigrateError> {
    let go_mod = root.join("go.mod");
    if go_mod.is_file() {
        let content = std::fs::read_to_string(&go_mod)
            .map_err(|e| MigrateError::ProgramLoad(format!("{}: {e}", go_mod.display())))?;
        let module = Regex::new(r"(?m)^\s*module\s+(\S+)")?;
        if let Some(caps) = module.captures(&content) {
            return Ok(caps[1].trim_matches('"').to_string());
        }
        return Err(MigrateError::ProgramLoad(format!(
            "{}: no module directive",
            go_mod.display()
        )));
    }
    Ok(root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string()))
}

fn skip_dir(name: &str) -> bool {
    name == "vendor" || name == "testdata" || name.starts_with('.') || name.starts_with('_')
}

/// Parse every Go package under `root`.
pub fn discover_packages(root: &Path, module_path: &str) -> Result<Vec<Package>, MigrateError> {
    let mut by_dir: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !skip_dir(&e.file_name().to_string_lossy())
        })
    {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "go") {
            if let Some(dir) = path.parent() {
                by_dir.entry(dir.to_path_buf()).or_default().push(path.to_path_buf());
            }
        }
    }

    let mut packages = Vec::new();
    for (dir, paths) in by_dir {
        let files = paths
            .iter()
            .map(|p| TargetFile::load(p))
            .collect::<Result<Vec<_>, _>>()?;

        let name = files
            .iter()
            .map(|f| f.package_name.as_str())
            .find(|n| !n.ends_with("_test"))
            .or_else(|| files.first().map(|f| f.package_name.as_str()))
            .unwrap_or_default()
            .to_string();

        let rel = dir.strip_prefix(root).unwrap_or(&dir);
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");
        let import_path = if rel.is_empty() {
            module_path.to_string()
        } else {
            format!("{module_path}/{rel}")
        };

        debug!("Discovered package {} ({} files)", import_path, files.len());
        packages.push(Package {
            import_path,
            dir,
            name,
            origin: PackageOrigin::Target,
            files,
        });
    }

    Ok(packages)
}

/// Compile Go-style package patterns (`./...`, `./pkg`, `example.com/m/x/...`)
/// into a glob set over import paths.
pub fn compile_patterns(patterns: &[String], module_path: &str) -> Result<GlobSet, MigrateError> {
    let mut builder = GlobSetBuilder::new();
    for raw in patterns {
        let pattern = raw.trim().trim_end_matches('/');
        if pattern.is_empty() {
            return Err(MigrateError::Pattern("empty package pattern".to_string()));
        }
        if pattern.starts_with("..") {
            return Err(MigrateError::Pattern(format!(
                "{raw}: pattern escapes the module root"
            )));
        }

        let absolute = if pattern == "." {
            module_path.to_string()
        } else if let Some(rest) = pattern.strip_prefix("./") {
            format!("{module_path}/{rest}")
        } else {
            pattern.to_string()
        };

        let mut globs = vec![absolute.replace("...", "*")];
        if let Some(prefix) = absolute.strip_suffix("/...") {
            globs.push(prefix.replace("...", "*"));
        }
        for glob in globs {
            let glob = GlobBuilder::new(&glob)
                .literal_separator(false)
                .build()
                .map_err(|e| MigrateError::Pattern(format!("{raw}: {e}")))?;
            builder.add(glob);
        }
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursive_pattern_includes_root() {
        let set = compile_patterns(&["./...".to_string()], "example.com/m").unwrap();
        assert!(set.is_match("example.com/m"));
        assert!(set.is_match("example.com/m/a/b"));
        assert!(!set.is_match("example.com/other"));
    }

    #[test]
    fn test_plain_directory_pattern() {
        let set = compile_patterns(&["./store".to_string()], "example.com/m").unwrap();
        assert!(set.is_match("example.com/m/store"));
        assert!(!set.is_match("example.com/m/store/sub"));
    }

    #[test]
    fn test_parent_pattern_rejected() {
        assert!(compile_patterns(&["../x".to_string()], "example.com/m").is_err());
    }
}
