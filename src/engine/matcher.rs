//! # Matchers
//!
//! A matcher is derived from one template unit: the body of `before`
//! becomes an ast-grep pattern, the body of `after` its replacement, and
//! each parameter turns into a metavariable typed by its declaration.

use super::program::Package;
use crate::ast_utils::{GoNode, descendants, find_kind, outline, parse_go};
use crate::errors::MigrateError;
use crate::family::ApiImport;
use crate::rules::ParamType;
use crate::target::TargetFile;
use ast_grep_core::{NodeMatch, Pattern, tree_sitter::StrDoc};
use ast_grep_language::SupportLang as Language;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

#[derive(Clone)]
pub struct Matcher {
    unit_name: String,
    /// Package the before-call is qualified with
    source: ApiImport,
    callee: String,
    pattern: Pattern,
    pattern_text: String,
    replacement: String,
    /// Metavariable name to declared parameter type
    bindings: BTreeMap<String, ParamType>,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("unit", &self.unit_name)
            .field("pattern", &self.pattern_text)
            .field("replacement", &self.replacement)
            .finish()
    }
}

struct FuncShape {
    params_text: String,
    params: Vec<(String, ParamType)>,
    call_text: String,
    call_start: usize,
    /// Byte ranges (relative to the whole unit) of parameter identifiers in the call
    param_refs: Vec<(std::ops::Range<usize>, String)>,
    qualifier: String,
    callee: String,
}

impl Matcher {
    /// Derive a matcher from a loaded template unit package.
    pub fn from_unit(package: &Package, verbose: bool) -> Result<Self, MigrateError> {
        let unit_name = package.name.clone();
        let file = package.files.first().ok_or_else(|| {
            MigrateError::ProgramLoad(format!("template unit {unit_name} has no file"))
        })?;

        let ast = parse_go(&file.source);
        let before = function_shape(ast.root(), "before", &unit_name)?;
        let after = function_shape(ast.root(), "after", &unit_name)?;

        if before.params_text != after.params_text {
            return Err(MigrateError::ProgramLoad(format!(
                "template unit {unit_name}: before{} and after{} have different signatures",
                before.params_text, after.params_text
            )));
        }

        let source_path = file
            .imports
            .find(|r| r.local_name() == before.qualifier)
            .map(|r| r.path.clone())
            .ok_or_else(|| {
                MigrateError::ProgramLoad(format!(
                    "template unit {unit_name}: '{}' is not imported",
                    before.qualifier
                ))
            })?;

        let pattern_text = metavariable_template(&before);
        let replacement = metavariable_template(&after);
        let bindings = before
            .params
            .iter()
            .map(|(name, ty)| (metavar_name(name), *ty))
            .collect();

        if verbose {
            debug!("{unit_name}: {pattern_text} => {replacement}");
            if let Some(call) = find_kind(ast.root(), "call_expression") {
                debug!("{unit_name} before-call AST:\n{}", outline(call, 0));
            }
        }

        let pattern = compile_pattern(&unit_name, &pattern_text)?;

        Ok(Self {
            unit_name,
            source: ApiImport::new(source_path, before.qualifier.clone()),
            callee: before.callee.clone(),
            pattern,
            pattern_text,
            replacement,
            bindings,
        })
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    pub fn pattern_text(&self) -> &str {
        &self.pattern_text
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Rewrite every type-compatible match in `file`, returning the count.
    pub fn apply(&self, file: &mut TargetFile) -> Result<usize, MigrateError> {
        if !file.imports_as(&self.source) {
            return Ok(0);
        }
        let needle = format!("{}.{}", self.source.name, self.callee);
        if !file.source.contains(&needle) {
            return Ok(0);
        }

        let ast = parse_go(&file.source);
        let accepted: HashSet<usize> = ast
            .root()
            .find_all(self.pattern.clone())
            .filter(|m| self.bindings_fit(m))
            .filter(|m| !qualifier_shadowed(m.get_node(), &self.source.name))
            .map(|m| m.get_node().range().start)
            .collect();
        if accepted.is_empty() {
            return Ok(0);
        }

        let edits = ast
            .root()
            .replace_all(self.pattern.clone(), self.replacement.as_str());
        let mut result = file.source.clone();
        let mut count = 0;

        // Apply edits in reverse order to maintain correct offsets
        for edit in edits.into_iter().rev() {
            if !accepted.contains(&edit.position) {
                continue;
            }
            let start = edit.position;
            let end = start + edit.deleted_length;
            let inserted = std::str::from_utf8(&edit.inserted_text).map_err(|e| {
                MigrateError::MatchApplication {
                    file: file.path.clone(),
                    message: format!("{}: {e}", self.unit_name),
                }
            })?;
            if end > result.len() {
                return Err(MigrateError::MatchApplication {
                    file: file.path.clone(),
                    message: format!("{}: edit past end of file", self.unit_name),
                });
            }
            result.replace_range(start..end, inserted);
            count += 1;
        }

        file.set_source(result);
        Ok(count)
    }

    fn bindings_fit(&self, node: &NodeMatch<StrDoc<Language>>) -> bool {
        let vars: HashMap<String, String> = node.get_env().clone().into();
        self.bindings.iter().all(|(var, ty)| {
            vars.get(var)
                .is_none_or(|text| binding_compatible(*ty, text))
        })
    }
}

fn compile_pattern(unit_name: &str, text: &str) -> Result<Pattern, MigrateError> {
    Pattern::try_new(text, Language::Go).map_err(|e| {
        MigrateError::ProgramLoad(format!("template unit {unit_name}: invalid pattern: {e}"))
    })
}

/// Whether `qualifier` is redeclared as a local (`assert := assert.New(t)`,
/// `var require = ...`, a parameter) anywhere in the top-level function
/// enclosing `node`. A call through such a local is a method call, not a
/// package call.
fn qualifier_shadowed(node: &GoNode<'_>, qualifier: &str) -> bool {
    let outermost = node
        .ancestors()
        .filter(|a| {
            matches!(
                &*a.kind(),
                "function_declaration" | "method_declaration" | "func_literal"
            )
        })
        .last();
    let Some(func) = outermost else {
        return false;
    };

    let mut all = Vec::new();
    descendants(func, &mut all);
    all.iter().any(|decl| {
        let names: Vec<GoNode<'_>> = match &*decl.kind() {
            "short_var_declaration" | "range_clause" => decl
                .field("left")
                .map(|left| left.children().collect())
                .unwrap_or_default(),
            "var_spec" | "const_spec" | "parameter_declaration"
            | "variadic_parameter_declaration" => decl.children().collect(),
            _ => return false,
        };
        names
            .iter()
            .any(|n| n.kind() == "identifier" && n.text() == qualifier)
    })
}

#[derive(Debug, PartialEq, Eq)]
enum Literal {
    String,
    Number,
    Bool,
    Nil,
}

fn literal_kind(text: &str) -> Option<Literal> {
    let text = text.trim();
    let first = text.chars().next()?;
    match first {
        '"' | '`' | '\'' => Some(Literal::String),
        '0'..='9' => Some(Literal::Number),
        '-' | '.' if text[1..].starts_with(|c: char| c.is_ascii_digit()) => Some(Literal::Number),
        _ if text == "nil" => Some(Literal::Nil),
        _ if text == "true" || text == "false" => Some(Literal::Bool),
        _ => None,
    }
}

/// Whether an expression can stand in for a parameter of type `ty`.
/// Only literals are checked; anything else is accepted.
fn binding_compatible(ty: ParamType, text: &str) -> bool {
    match (ty, literal_kind(text)) {
        (_, None) | (ParamType::Any, _) => true,
        (ParamType::Bool, Some(lit)) => lit == Literal::Bool,
        (ParamType::Error, Some(lit)) => lit == Literal::Nil,
        (ParamType::String, Some(lit)) => lit == Literal::String,
        (ParamType::Tb, Some(_)) => false,
    }
}

fn metavar_name(param: &str) -> String {
    param.to_ascii_uppercase()
}

/// The call text with every parameter reference replaced by `$PARAM`.
fn metavariable_template(shape: &FuncShape) -> String {
    let mut text = shape.call_text.clone();
    let mut refs = shape.param_refs.clone();
    refs.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));
    for (range, name) in refs {
        let start = range.start - shape.call_start;
        let end = range.end - shape.call_start;
        text.replace_range(start..end, &format!("${}", metavar_name(&name)));
    }
    text
}

fn function_shape(root: GoNode<'_>, name: &str, unit: &str) -> Result<FuncShape, MigrateError> {
    let err = |msg: &str| MigrateError::ProgramLoad(format!("template unit {unit}: {msg}"));

    let func = root
        .children()
        .filter(|n| n.kind() == "function_declaration")
        .find(|n| {
            n.children()
                .any(|c| c.kind() == "identifier" && c.text() == name)
        })
        .ok_or_else(|| err(&format!("missing func {name}")))?;

    let param_list = func
        .children()
        .find(|n| n.kind() == "parameter_list")
        .ok_or_else(|| err(&format!("func {name} has no parameters")))?;

    let mut params = Vec::new();
    for decl in param_list.children() {
        match &*decl.kind() {
            "parameter_declaration" => {}
            "(" | ")" | "," | "comment" => continue,
            other => return Err(err(&format!("unsupported parameter form {other}"))),
        }
        let parts: Vec<GoNode<'_>> = decl.children().filter(|c| c.kind() != ",").collect();
        let (ty_node, names) = parts
            .split_last()
            .ok_or_else(|| err("empty parameter declaration"))?;
        let ty = ParamType::from_go_type(&ty_node.text())
            .ok_or_else(|| err(&format!("unsupported parameter type {}", ty_node.text())))?;
        for ident in names.iter().filter(|n| n.kind() == "identifier") {
            params.push((ident.text().to_string(), ty));
        }
    }

    let body = func
        .children()
        .find(|n| n.kind() == "block")
        .ok_or_else(|| err(&format!("func {name} has no body")))?;
    let call = find_kind(body, "call_expression")
        .ok_or_else(|| err(&format!("func {name} body is not a call")))?;

    let selector = call
        .children()
        .next()
        .filter(|n| n.kind() == "selector_expression")
        .ok_or_else(|| err(&format!("func {name} must call a package function")))?;
    let mut selector_parts = selector.children().filter(|n| n.kind() != ".");
    let qualifier = selector_parts
        .next()
        .map(|n| n.text().to_string())
        .ok_or_else(|| err("call has no qualifier"))?;
    let callee = selector_parts
        .next()
        .map(|n| n.text().to_string())
        .ok_or_else(|| err("call has no callee"))?;

    let call_text = call.text().to_string();
    let call_start = call.range().start;
    let names: HashSet<&str> = params.iter().map(|(n, _)| n.as_str()).collect();
    let mut all = Vec::new();
    descendants(call, &mut all);
    let param_refs = all
        .iter()
        .filter(|n| n.kind() == "identifier" && names.contains(&*n.text()))
        .map(|n| (n.range(), n.text().to_string()))
        .collect();

    Ok(FuncShape {
        params_text: param_list.text().to_string(),
        params,
        call_text,
        call_start,
        param_refs,
        qualifier,
        callee,
    })
}
