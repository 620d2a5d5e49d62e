//! # Import Sets
//!
//! Canonical model of a Go file's import declarations. The reconciler edits
//! an [`ImportSet`]; the file's import declarations are then edited to match
//! it (see [`ImportLayout`]) and the set is re-derived from the result, so
//! the declared import list and the declaration walk can never disagree.

use crate::ast_utils::{GoNode, descendants, unquote};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRecord {
    pub path: String,
    /// Explicit name, including `_` and `.`
    pub alias: Option<String>,
    /// Blank-line separated group the import belongs to
    pub group: usize,
    /// Whether the file references the package through its local name
    pub used: bool,
}

impl ImportRecord {
    pub fn new(path: impl Into<String>, alias: Option<String>, group: usize) -> Self {
        Self {
            path: path.into(),
            alias,
            group,
            used: false,
        }
    }

    /// The identifier code uses to reference this import.
    pub fn local_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => package_name_for_path(&self.path),
        }
    }

    pub fn key(&self) -> (&str, Option<&str>) {
        (self.path.as_str(), self.alias.as_deref())
    }

    pub fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{alias} \"{}\"", self.path),
            None => format!("\"{}\"", self.path),
        }
    }
}

/// Best guess at the package name Go binds for an unaliased import.
pub fn package_name_for_path(path: &str) -> &str {
    let mut segments = path.rsplit('/');
    let last = segments.next().unwrap_or(path);
    let is_major_version = last.len() > 1
        && last.starts_with('v')
        && last[1..].chars().all(|c| c.is_ascii_digit());
    let name = if is_major_version {
        segments.next().unwrap_or(last)
    } else {
        last
    };
    // gopkg.in/yaml.v3 binds `yaml`
    match name.rfind(".v") {
        Some(idx)
            if idx + 2 < name.len() && name[idx + 2..].chars().all(|c| c.is_ascii_digit()) =>
        {
            &name[..idx]
        }
        _ => name,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSet {
    records: Vec<ImportRecord>,
}

impl ImportSet {
    pub fn new(records: Vec<ImportRecord>) -> Self {
        Self { records }
    }

    /// Read the imports declared at the top level of a parsed file.
    pub fn parse(root: GoNode<'_>) -> Self {
        let mut records = Vec::new();
        let mut group = 0;

        for decl in root.children().filter(|n| n.kind() == "import_declaration") {
            if !records.is_empty() {
                group += 1;
            }
            let mut prev_end: Option<usize> = None;
            for spec in import_specs(decl) {
                let start = spec.start_pos().line();
                if let Some(end) = prev_end {
                    if start > end + 1 {
                        group += 1;
                    }
                }
                prev_end = Some(spec.end_pos().line());

                if let (Some(path), alias) = spec_path_and_alias(&spec) {
                    records.push(ImportRecord::new(path, alias, group));
                }
            }
        }

        Self { records }
    }

    pub fn records(&self) -> &[ImportRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn position(&self, predicate: impl Fn(&ImportRecord) -> bool) -> Option<usize> {
        self.records.iter().position(predicate)
    }

    pub fn find(&self, predicate: impl Fn(&ImportRecord) -> bool) -> Option<&ImportRecord> {
        self.records.iter().find(|r| predicate(r))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ImportRecord> {
        self.records.get_mut(index)
    }

    pub fn insert(&mut self, index: usize, record: ImportRecord) {
        let index = index.min(self.records.len());
        self.records.insert(index, record);
    }

    pub fn push(&mut self, record: ImportRecord) {
        self.records.push(record);
    }

    pub fn retain(&mut self, keep: impl FnMut(&ImportRecord) -> bool) {
        self.records.retain(keep);
    }

    /// Group index new imports are appended to.
    pub fn last_group(&self) -> usize {
        self.records.iter().map(|r| r.group).max().unwrap_or(0)
    }

    /// Renumber groups consecutively from 0 after records were removed.
    pub fn compact_groups(&mut self) {
        let mut next = 0;
        let mut prev = None;
        for record in &mut self.records {
            if prev.is_some_and(|p| p != record.group) {
                next += 1;
            }
            prev = Some(record.group);
            record.group = next;
        }
    }

    /// Refresh the `used` flags from the set of referenced qualifiers.
    pub fn mark_usage(&mut self, qualifiers: &BTreeSet<String>) {
        for record in &mut self.records {
            record.used = qualifiers.contains(record.local_name());
        }
    }

    /// Path and alias of every import, in declaration order.
    pub fn keys(&self) -> Vec<(&str, Option<&str>)> {
        self.records.iter().map(ImportRecord::key).collect()
    }

    /// Render the set as a single import declaration (empty for no imports).
    pub fn render(&self) -> String {
        match self.records.as_slice() {
            [] => String::new(),
            [only] => format!("import {}", only.render()),
            records => {
                let mut out = String::from("import (\n");
                let mut prev_group = records[0].group;
                for record in records {
                    if record.group != prev_group {
                        out.push('\n');
                        prev_group = record.group;
                    }
                    out.push('\t');
                    out.push_str(&record.render());
                    out.push('\n');
                }
                out.push(')');
                out
            }
        }
    }
}

fn spec_path_and_alias(spec: &GoNode<'_>) -> (Option<String>, Option<String>) {
    let mut path = None;
    let mut alias = None;
    for child in spec.children() {
        match &*child.kind() {
            "interpreted_string_literal" | "raw_string_literal" => {
                path = Some(unquote(&child.text()));
            }
            "package_identifier" | "blank_identifier" | "dot" | "." => {
                alias = Some(child.text().to_string());
            }
            _ => {}
        }
    }
    (path, alias)
}

fn import_specs(decl: GoNode<'_>) -> Vec<GoNode<'_>> {
    let mut specs = Vec::new();
    for child in decl.children() {
        let kind = child.kind().to_string();
        match kind.as_str() {
            "import_spec" => specs.push(child),
            "import_spec_list" => {
                specs.extend(child.children().filter(|n| n.kind() == "import_spec"));
            }
            _ => {}
        }
    }
    specs
}

/// Where one import spec sits in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSpan {
    pub path: String,
    pub alias: Option<String>,
    pub range: Range<usize>,
    /// Index into [`ImportLayout::decls`]
    pub decl: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclSpan {
    pub range: Range<usize>,
    /// `import ( ... )` rather than `import "x"`
    pub parenthesized: bool,
}

/// Byte positions of every top-level import declaration and spec. Comments
/// are not part of any span, so edits confined to spans keep them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportLayout {
    pub decls: Vec<DeclSpan>,
    pub specs: Vec<SpecSpan>,
}

impl ImportLayout {
    pub fn parse(root: GoNode<'_>) -> Self {
        let mut layout = Self::default();
        for decl in root.children().filter(|n| n.kind() == "import_declaration") {
            let index = layout.decls.len();
            layout.decls.push(DeclSpan {
                range: decl.range(),
                parenthesized: decl.children().any(|c| c.kind() == "import_spec_list"),
            });
            for spec in import_specs(decl) {
                if let (Some(path), alias) = spec_path_and_alias(&spec) {
                    layout.specs.push(SpecSpan {
                        path,
                        alias,
                        range: spec.range(),
                        decl: index,
                    });
                }
            }
        }
        layout
    }
}

/// Byte range spanning every top-level import declaration.
pub fn import_region(root: GoNode<'_>) -> Option<Range<usize>> {
    let decls: Vec<Range<usize>> = root
        .children()
        .filter(|n| n.kind() == "import_declaration")
        .map(|n| n.range())
        .collect();
    let first = decls.first()?;
    let last = decls.last()?;
    Some(first.start..last.end)
}

/// End offset of the package clause, where a fresh import block is inserted.
pub fn package_clause_end(root: GoNode<'_>) -> Option<usize> {
    root.children()
        .find(|n| n.kind() == "package_clause")
        .map(|n| n.range().end)
}

/// Identifiers used as package qualifiers: `x` in `x.Call()` and `x.Type`.
pub fn used_qualifiers(root: GoNode<'_>) -> BTreeSet<String> {
    qualified_references(root)
        .into_iter()
        .map(|(qualifier, _)| qualifier)
        .collect()
}

/// Every `(qualifier, member)` pair referenced through a selector or a
/// qualified type.
pub fn qualified_references(root: GoNode<'_>) -> BTreeSet<(String, String)> {
    let mut all = Vec::new();
    descendants(root, &mut all);

    let mut refs = BTreeSet::new();
    for node in all {
        let operand_kind = match &*node.kind() {
            "selector_expression" => "identifier",
            "qualified_type" => "package_identifier",
            _ => continue,
        };
        let parts: Vec<GoNode<'_>> = node.children().filter(|n| n.kind() != ".").collect();
        if let [operand, member, ..] = parts.as_slice() {
            if operand.kind() == operand_kind {
                refs.insert((operand.text().to_string(), member.text().to_string()));
            }
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast_utils::parse_go;

    const GROUPED: &str = r#"package store

import (
	"fmt"
	"testing"

	"github.com/stretchr/testify/assert"
	gassert "github.com/grailbio/testutil/assert"
)

func TestX(t *testing.T) {
	assert.True(t, true)
	fmt.Println(gassert.EQ)
}
"#;

    #[test]
    fn test_parse_preserves_groups_and_aliases() {
        let ast = parse_go(GROUPED);
        let set = ImportSet::parse(ast.root());
        assert_eq!(
            set.keys(),
            vec![
                ("fmt", None),
                ("testing", None),
                ("github.com/stretchr/testify/assert", None),
                ("github.com/grailbio/testutil/assert", Some("gassert")),
            ]
        );
        let groups: Vec<usize> = set.records().iter().map(|r| r.group).collect();
        assert_eq!(groups, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_render_matches_gofmt_layout() {
        let ast = parse_go(GROUPED);
        let set = ImportSet::parse(ast.root());
        let region = import_region(ast.root()).unwrap();
        assert_eq!(set.render(), &GROUPED[region]);
    }

    #[test]
    fn test_single_import_renders_inline() {
        let set = ImportSet::new(vec![ImportRecord::new("testing", None, 0)]);
        assert_eq!(set.render(), "import \"testing\"");
        assert_eq!(ImportSet::default().render(), "");
    }

    #[test]
    fn test_used_qualifiers() {
        let ast = parse_go(GROUPED);
        let used = used_qualifiers(ast.root());
        assert!(used.contains("assert"));
        assert!(used.contains("gassert"));
        assert!(used.contains("fmt"));
        assert!(used.contains("testing"));

        let refs = qualified_references(ast.root());
        assert!(refs.contains(&("gassert".to_string(), "EQ".to_string())));
        assert!(refs.contains(&("testing".to_string(), "T".to_string())));
    }

    #[test]
    fn test_package_name_for_path() {
        assert_eq!(package_name_for_path("github.com/stretchr/testify/require"), "require");
        assert_eq!(package_name_for_path("github.com/foo/bar/v2"), "bar");
        assert_eq!(package_name_for_path("gopkg.in/yaml.v3"), "yaml");
        assert_eq!(package_name_for_path("testing"), "testing");
    }

    #[test]
    fn test_compact_groups_after_removal() {
        let mut set = ImportSet::new(vec![
            ImportRecord::new("testing", None, 0),
            ImportRecord::new("github.com/stretchr/testify/require", None, 1),
            ImportRecord::new("os", None, 2),
        ]);
        set.retain(|r| r.path != "github.com/stretchr/testify/require");
        set.compact_groups();
        let groups: Vec<usize> = set.records().iter().map(|r| r.group).collect();
        assert_eq!(groups, vec![0, 1]);
    }
}
