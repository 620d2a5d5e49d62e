//! # Target Files
//!
//! A Go source file being migrated. The matchers rewrite `source` in place;
//! the reconciler edits `imports` and then brings the import declarations of
//! `source` in line with it.

use crate::ast_utils::{GoNode, first_error_line, has_syntax_error, parse_go};
use crate::errors::MigrateError;
use crate::family::ApiImport;
use crate::imports::{
    ImportLayout, ImportRecord, ImportSet, import_region, package_clause_end, used_qualifiers,
};
use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TargetFile {
    pub path: PathBuf,
    pub package_name: String,
    pub source: String,
    /// Canonical import set for the file
    pub imports: ImportSet,
    modified: bool,
}

impl TargetFile {
    /// Parse a file, rejecting sources with syntax errors.
    pub fn parse(path: impl Into<PathBuf>, source: String) -> Result<Self, MigrateError> {
        let path = path.into();
        let ast = parse_go(&source);
        if has_syntax_error(ast.root()) {
            let line = first_error_line(ast.root()).map(|l| l + 1).unwrap_or(0);
            return Err(MigrateError::ProgramLoad(format!(
                "{}:{line}: syntax error",
                path.display()
            )));
        }

        let package_name = ast
            .root()
            .children()
            .find(|n| n.kind() == "package_clause")
            .and_then(|clause| {
                clause
                    .children()
                    .find(|n| n.kind() == "package_identifier")
                    .map(|n| n.text().to_string())
            })
            .ok_or_else(|| {
                MigrateError::ProgramLoad(format!("{}: missing package clause", path.display()))
            })?;

        let mut imports = ImportSet::parse(ast.root());
        imports.mark_usage(&used_qualifiers(ast.root()));

        Ok(Self {
            path,
            package_name,
            source,
            imports,
            modified: false,
        })
    }

    pub fn load(path: &Path) -> Result<Self, MigrateError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| MigrateError::ProgramLoad(format!("{}: {e}", path.display())))?;
        Self::parse(path, source)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Replace the file text after a rewrite.
    pub fn set_source(&mut self, source: String) {
        if source != self.source {
            self.source = source;
            self.modified = true;
        }
    }

    /// Whether the file imports `api` under the name rewrite shapes expect.
    pub fn imports_as(&self, api: &ApiImport) -> bool {
        self.imports
            .find(|r| api.matches_path(&r.path) && r.local_name() == api.name)
            .is_some()
    }

    /// Package qualifiers currently referenced by the file body.
    pub fn used_qualifiers(&self) -> BTreeSet<String> {
        let ast = parse_go(&self.source);
        used_qualifiers(ast.root())
    }

    /// Re-derive the import list by walking the file's top-level declarations.
    pub fn declared_imports(&self) -> ImportSet {
        let ast = parse_go(&self.source);
        let mut set = ImportSet::parse(ast.root());
        set.mark_usage(&used_qualifiers(ast.root()));
        set
    }

    /// Edit the import declarations of `source` to match the canonical set.
    ///
    /// Surviving specs keep their place, declaration and comments. A spec
    /// whose package is gone loses its line, a replacement takes over the
    /// spec it replaces, and new specs go next to the spec that follows them
    /// in the set (or after the last surviving spec). The whole region is
    /// rendered from scratch only when no spec survives.
    pub fn regenerate_imports(&mut self) {
        let edited = {
            let ast = parse_go(&self.source);
            let layout = ImportLayout::parse(ast.root());
            match ImportPlan::new(&layout, self.imports.records()) {
                Some(plan) => {
                    tidy_import_blocks(plan.apply(&self.source, &layout, &self.imports))
                }
                None => self.render_import_region(ast.root()),
            }
        };

        self.set_source(edited);
        self.imports = self.declared_imports();
    }

    fn render_import_region(&self, root: GoNode<'_>) -> String {
        let rendered = self.imports.render();
        let mut source = self.source.clone();

        match import_region(root.clone()) {
            Some(region) if rendered.is_empty() => {
                let end = skip_newlines(&source, region.end);
                source.replace_range(region.start..end, "");
            }
            Some(region) => source.replace_range(region, &rendered),
            None if rendered.is_empty() => {}
            None => {
                let at = package_clause_end(root).unwrap_or(0);
                source.insert_str(at, &format!("\n\n{rendered}"));
            }
        }
        source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecAction {
    Keep,
    /// Replace the spec text with the record at this index
    Rewrite(usize),
    Remove,
}

/// How existing specs map onto the canonical records. Indices refer to
/// `ImportSet::records()`.
#[derive(Debug)]
struct ImportPlan {
    actions: Vec<SpecAction>,
    /// New records written on their own lines before each spec
    before: Vec<Vec<usize>>,
    /// New records written after the last surviving spec
    trailing: Vec<usize>,
}

impl ImportPlan {
    fn new(layout: &ImportLayout, records: &[ImportRecord]) -> Option<Self> {
        let old = &layout.specs;
        let mut actions = Vec::with_capacity(old.len());
        let mut before = vec![Vec::new(); old.len()];
        let mut pending = Vec::new();
        let mut j = 0;

        for (i, spec) in old.iter().enumerate() {
            loop {
                let Some(record) = records.get(j) else {
                    actions.push(SpecAction::Remove);
                    break;
                };
                let record_is_old = old[i..].iter().any(|o| o.path == record.path);
                let spec_is_kept = records[j..].iter().any(|r| r.path == spec.path);

                if record.path == spec.path {
                    before[i] = std::mem::take(&mut pending);
                    actions.push(if record.alias == spec.alias {
                        SpecAction::Keep
                    } else {
                        SpecAction::Rewrite(j)
                    });
                    j += 1;
                    break;
                }
                match (record_is_old, spec_is_kept) {
                    (false, false) => {
                        before[i] = std::mem::take(&mut pending);
                        actions.push(SpecAction::Rewrite(j));
                        j += 1;
                        break;
                    }
                    (false, true) => {
                        pending.push(j);
                        j += 1;
                    }
                    (true, _) => {
                        actions.push(SpecAction::Remove);
                        break;
                    }
                }
            }
        }

        pending.extend(j..records.len());
        let survivors = actions.iter().any(|a| *a != SpecAction::Remove);
        if old.is_empty() || (!survivors && !pending.is_empty()) {
            return None;
        }
        Some(Self {
            actions,
            before,
            trailing: pending,
        })
    }

    fn apply(&self, source: &str, layout: &ImportLayout, set: &ImportSet) -> String {
        let records = set.records();
        let last_kept = self.actions.iter().rposition(|a| *a != SpecAction::Remove);
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();

        for (d, decl) in layout.decls.iter().enumerate() {
            let specs: Vec<usize> = (0..layout.specs.len())
                .filter(|&s| layout.specs[s].decl == d)
                .collect();

            if specs.iter().all(|&s| self.actions[s] == SpecAction::Remove) {
                let end = skip_newlines(source, decl.range.end);
                edits.push((decl.range.clone(), String::new()));
                if end > decl.range.end {
                    edits.push((decl.range.end..end, String::new()));
                }
                continue;
            }

            let spec_text = |s: usize| match self.actions[s] {
                SpecAction::Rewrite(j) => records[j].render(),
                _ => source[layout.specs[s].range.clone()].to_string(),
            };
            let trailing_here = |s: usize| last_kept == Some(s);

            if !decl.parenthesized {
                let Some(&s) = specs.first() else { continue };
                if self.before[s].is_empty() && !trailing_here(s) {
                    if let SpecAction::Rewrite(_) = self.actions[s] {
                        edits.push((layout.specs[s].range.clone(), spec_text(s)));
                    }
                    continue;
                }
                let mut block = String::from("import (\n");
                let mut lines: Vec<String> =
                    self.before[s].iter().map(|&j| records[j].render()).collect();
                lines.push(spec_text(s));
                if trailing_here(s) {
                    lines.extend(self.trailing.iter().map(|&j| records[j].render()));
                }
                for line in lines {
                    block.push('\t');
                    block.push_str(&line);
                    block.push('\n');
                }
                block.push(')');
                edits.push((decl.range.clone(), block));
                continue;
            }

            for &s in &specs {
                let range = &layout.specs[s].range;
                let start = line_start(source, range.start);
                let indent = &source[start..range.start];
                let indent = if indent.trim().is_empty() { indent } else { "\t" };
                let lines = |js: &[usize]| -> String {
                    js.iter()
                        .map(|&j| format!("{indent}{}\n", records[j].render()))
                        .collect()
                };

                match self.actions[s] {
                    SpecAction::Remove => {
                        edits.push((start..line_end(source, range.end), String::new()));
                        continue;
                    }
                    SpecAction::Rewrite(_) => edits.push((range.clone(), spec_text(s))),
                    SpecAction::Keep => {}
                }
                if !self.before[s].is_empty() {
                    edits.push((start..start, lines(self.before[s].as_slice())));
                }
                if trailing_here(s) && !self.trailing.is_empty() {
                    let end = line_end(source, range.end);
                    edits.push((end..end, lines(self.trailing.as_slice())));
                }
            }
        }

        // Later edits first; at equal starts the wider edit goes first so an
        // insertion lands in front of it.
        edits.sort_by(|a, b| (b.0.start, b.0.end).cmp(&(a.0.start, a.0.end)));
        let mut out = source.to_string();
        for (range, text) in edits {
            out.replace_range(range, &text);
        }
        out
    }
}

fn line_start(source: &str, pos: usize) -> usize {
    source[..pos].rfind('\n').map_or(0, |i| i + 1)
}

/// Offset just past the newline ending the line that holds `pos`.
fn line_end(source: &str, pos: usize) -> usize {
    source[pos..].find('\n').map_or(source.len(), |i| pos + i + 1)
}

fn skip_newlines(source: &str, mut pos: usize) -> usize {
    let bytes = source.as_bytes();
    while pos < bytes.len() && bytes[pos] == b'\n' {
        pos += 1;
    }
    pos
}

/// Drop blank lines left at the edges of `import ( ... )` blocks and collapse
/// runs of blank lines inside them.
fn tidy_import_blocks(source: String) -> String {
    let mut out = source.clone();
    let ast = parse_go(&source);
    let layout = ImportLayout::parse(ast.root());
    for decl in layout.decls.iter().rev().filter(|d| d.parenthesized) {
        let block = &source[decl.range.clone()];
        let mut lines: Vec<&str> = Vec::new();
        for line in block.split('\n') {
            let blank = line.trim().is_empty();
            let after_gap = lines
                .last()
                .is_none_or(|prev| prev.trim().is_empty() || prev.trim_end().ends_with('('));
            if blank && after_gap {
                continue;
            }
            if line.trim_start().starts_with(')') {
                while lines.last().is_some_and(|prev| prev.trim().is_empty()) {
                    lines.pop();
                }
            }
            lines.push(line);
        }
        let tidied = lines.join("\n");
        if tidied != block {
            out.replace_range(decl.range.clone(), &tidied);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reads_package_and_imports() {
        let file = TargetFile::parse(
            "x_test.go",
            "package x\n\nimport \"testing\"\n\nfunc TestX(t *testing.T) {}\n".to_string(),
        )
        .unwrap();
        assert_eq!(file.package_name, "x");
        assert_eq!(file.imports.keys(), vec![("testing", None)]);
        assert!(file.imports.records()[0].used);
        assert!(!file.is_modified());
    }

    #[test]
    fn test_syntax_error_is_load_error() {
        let err = TargetFile::parse("bad.go", "package x\n\nfunc f() { ) }\n".to_string())
            .unwrap_err();
        assert!(matches!(err, MigrateError::ProgramLoad(_)));
    }

    #[test]
    fn test_regenerate_inserts_block_after_package_clause() {
        let mut file =
            TargetFile::parse("x.go", "package x\n\nfunc f() {}\n".to_string()).unwrap();
        file.imports.push(ImportRecord::new("fmt", None, 0));
        file.regenerate_imports();
        assert_eq!(file.source, "package x\n\nimport \"fmt\"\n\nfunc f() {}\n");
        assert!(file.is_modified());
    }

    #[test]
    fn test_regenerate_removes_empty_block() {
        let mut file = TargetFile::parse(
            "x.go",
            "package x\n\nimport \"fmt\"\n\nfunc f() {}\n".to_string(),
        )
        .unwrap();
        file.imports.retain(|_| false);
        file.regenerate_imports();
        assert_eq!(file.source, "package x\n\nfunc f() {}\n");
        assert_eq!(file.declared_imports(), file.imports);
    }

    #[test]
    fn test_regenerate_keeps_comments_around_rewritten_spec() {
        let source = "package x\n\nimport (\n\t\"testing\"\n\n\t// assertions\n\t\"github.com/stretchr/testify/require\"\n\t_ \"embed\" // for go:embed\n)\n\nfunc TestX(t *testing.T) {}\n";
        let mut file = TargetFile::parse("x_test.go", source.to_string()).unwrap();
        if let Some(record) = file.imports.get_mut(1) {
            record.path = "github.com/grailbio/testutil/assert".to_string();
            record.alias = Some("gassert".to_string());
        }
        file.regenerate_imports();
        assert_eq!(
            file.source,
            "package x\n\nimport (\n\t\"testing\"\n\n\t// assertions\n\tgassert \"github.com/grailbio/testutil/assert\"\n\t_ \"embed\" // for go:embed\n)\n\nfunc TestX(t *testing.T) {}\n"
        );
    }

    #[test]
    fn test_regenerate_appends_after_trailing_comment() {
        let source = "package x\n\nimport (\n\t\"testing\" // std\n)\n\nfunc TestX(t *testing.T) {}\n";
        let mut file = TargetFile::parse("x_test.go", source.to_string()).unwrap();
        file.imports.push(ImportRecord::new("os", None, 0));
        file.regenerate_imports();
        assert!(file.source.contains("import (\n\t\"testing\" // std\n\t\"os\"\n)\n"));
        assert_eq!(file.imports.keys(), vec![("testing", None), ("os", None)]);
    }

    #[test]
    fn test_regenerate_drops_blank_lines_of_emptied_group() {
        let source = "package x\n\nimport (\n\t\"fmt\"\n\n\t\"github.com/stretchr/testify/require\"\n\n\t\"os\"\n\n\t\"strings\"\n)\n";
        let mut file = TargetFile::parse("x.go", source.to_string()).unwrap();
        file.imports
            .retain(|r| r.path != "github.com/stretchr/testify/require" && r.path != "strings");
        file.regenerate_imports();
        assert_eq!(file.source, "package x\n\nimport (\n\t\"fmt\"\n\n\t\"os\"\n)\n");
        assert_eq!(file.declared_imports(), file.imports);
    }

    #[test]
    fn test_regenerate_leaves_other_declarations_alone() {
        let source = "package x\n\n// #include <stdlib.h>\nimport \"C\"\n\nimport \"github.com/stretchr/testify/require\"\n\nfunc f() {}\n";
        let mut file = TargetFile::parse("x.go", source.to_string()).unwrap();
        file.imports.retain(|r| r.path == "C");
        file.regenerate_imports();
        assert_eq!(file.source, "package x\n\n// #include <stdlib.h>\nimport \"C\"\n\nfunc f() {}\n");
    }
}
