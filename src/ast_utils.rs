//! # AST Utilities Module
//!
//! Helpers for parsing Go sources with ast-grep and walking the resulting
//! tree-sitter nodes.

use ast_grep_core::{AstGrep, Node, tree_sitter::StrDoc};
use ast_grep_language::SupportLang as Language;

pub type GoNode<'r> = Node<'r, StrDoc<Language>>;

/// Parse Go source text.
pub fn parse_go(code: &str) -> AstGrep<StrDoc<Language>> {
    AstGrep::new(code, Language::Go)
}

/// Collect `node` and all of its descendants in pre-order.
pub fn descendants<'r>(node: GoNode<'r>, out: &mut Vec<GoNode<'r>>) {
    let children: Vec<GoNode<'r>> = node.children().collect();
    out.push(node);
    for child in children {
        descendants(child, out);
    }
}

/// First descendant (including `node` itself) of the given kind.
pub fn find_kind<'r>(node: GoNode<'r>, kind: &str) -> Option<GoNode<'r>> {
    let mut all = Vec::new();
    descendants(node, &mut all);
    all.into_iter().find(|n| n.kind() == kind)
}

/// Whether the tree contains a tree-sitter error node.
pub fn has_syntax_error(node: GoNode<'_>) -> bool {
    let mut all = Vec::new();
    descendants(node, &mut all);
    all.iter().any(|n| n.kind() == "ERROR")
}

/// Line (0-based) of the first syntax error, for diagnostics.
pub fn first_error_line(node: GoNode<'_>) -> Option<usize> {
    let mut all = Vec::new();
    descendants(node, &mut all);
    all.iter()
        .find(|n| n.kind() == "ERROR")
        .map(|n| n.start_pos().line())
}

/// Strip the quotes from an interpreted or raw Go string literal.
pub fn unquote(literal: &str) -> String {
    let trimmed = literal.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
        .unwrap_or(trimmed)
        .to_string()
}

/// Indented outline of the named nodes under `node`, one per line with its
/// 1-based line number. Leaves carry their source text.
pub fn outline(node: GoNode<'_>, depth: usize) -> String {
    let mut out = String::new();
    write_outline(node, depth, &mut out);
    out
}

fn write_outline(node: GoNode<'_>, depth: usize, out: &mut String) {
    let named: Vec<GoNode<'_>> = node.children().filter(|c| c.is_named()).collect();
    out.push_str(&format!(
        "{}{} @{}",
        "  ".repeat(depth),
        node.kind(),
        node.start_pos().line() + 1
    ));
    if named.is_empty() {
        out.push_str(&format!(" {:?}", node.text()));
    }
    out.push('\n');
    for child in named {
        write_outline(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_call_expression() {
        let ast = parse_go("package p\n\nfunc f() { require.NoError(t, err) }\n");
        let call = find_kind(ast.root(), "call_expression").unwrap();
        assert_eq!(call.text(), "require.NoError(t, err)");
    }

    #[test]
    fn test_syntax_error_detected() {
        let ast = parse_go("package p\n\nfunc f() { ) }\n");
        assert!(has_syntax_error(ast.root()));
        let ok = parse_go("package p\n");
        assert!(!has_syntax_error(ok.root()));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"testing\""), "testing");
        assert_eq!(unquote("`raw/path`"), "raw/path");
    }

    #[test]
    fn test_outline_lists_named_nodes_only() {
        let ast = parse_go("package p\n\nfunc f() { g(1) }\n");
        let dump = outline(ast.root(), 0);
        assert!(dump.starts_with("source_file @1\n"));
        assert!(dump.contains("  package_clause @1\n"));
        assert!(dump.contains("package_identifier @1 \"p\"\n"));
        assert!(dump.contains("int_literal @3 \"1\"\n"));
        assert!(!dump.contains("\"(\""));
    }
}
