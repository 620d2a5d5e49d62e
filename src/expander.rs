//! # Template Expander
//!
//! Expands every catalog rule against every rewrite family and arity
//! variant, producing one [`TemplateUnit`] per combination. Units stay
//! structured until [`TemplateUnit::render`] turns them into Go source for
//! the engine.

use crate::engine::UnitHandle;
use crate::errors::MigrateError;
use crate::family::{ApiImport, ArityVariant, FamilyKind, RewriteFamily};
use crate::imports::{ImportRecord, ImportSet};
use crate::rules::{ArgShape, CallShape, RuleCatalog, SubstitutionRule};
use serde::Serialize;
use tracing::debug;

/// Package-name prefix of every synthetic unit.
pub const UNIT_PREFIX: &str = "migrate_template_";

/// One parameter group of a unit signature, e.g. `a, b interface{}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureSlot {
    pub names: Vec<String>,
    pub go_type: String,
}

/// A qualified call `qualifier.callee(args...)` with arguments already rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallExpr {
    pub qualifier: String,
    pub callee: String,
    pub args: Vec<String>,
}

impl CallExpr {
    pub fn render(&self) -> String {
        format!("{}.{}({})", self.qualifier, self.callee, self.args.join(", "))
    }
}

/// Where a unit came from, kept so results can be reported per rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitOrigin {
    pub rule_id: String,
    pub family: FamilyKind,
    pub arity: ArityVariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateUnit {
    pub name: String,
    pub origin: UnitOrigin,
    pub signature: Vec<SignatureSlot>,
    pub before: CallExpr,
    pub after: CallExpr,
    pub imports: ImportSet,
}

impl TemplateUnit {
    pub fn render_signature(&self) -> String {
        self.signature
            .iter()
            .map(|slot| format!("{} {}", slot.names.join(", "), slot.go_type))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Compilable Go source holding the `before` and `after` functions.
    pub fn render(&self) -> String {
        let signature = self.render_signature();
        format!(
            "package {name}\n\n{imports}\n\nfunc before({signature}) {{ {before} }}\n\nfunc after({signature}) {{ {after} }}\n",
            name = self.name,
            imports = self.imports.render(),
            before = self.before.render(),
            after = self.after.render(),
        )
    }
}

/// Receives rendered units; implemented by the rewrite engine.
pub trait UnitSink {
    fn register_unit(&mut self, name: &str, source: &str) -> Result<UnitHandle, MigrateError>;
}

/// Units handed to a sink, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub units: Vec<(UnitHandle, UnitOrigin)>,
}

impl Expansion {
    pub fn count(&self) -> usize {
        self.units.len()
    }

    pub fn origin(&self, handle: UnitHandle) -> Option<&UnitOrigin> {
        self.units
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, origin)| origin)
    }
}

/// Expands rules into units. Numbering is local to one expander, so
/// separate runs never share unit names.
#[derive(Debug, Default)]
pub struct TemplateExpander {
    next_seq: usize,
}

impl TemplateExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every unit for `catalog` x `families` x arity variants.
    pub fn expand_units(
        &mut self,
        catalog: &RuleCatalog,
        families: &[RewriteFamily],
    ) -> Result<Vec<TemplateUnit>, MigrateError> {
        let mut units = Vec::new();
        for rule in catalog.rules() {
            for family in families {
                for arity in ArityVariant::all() {
                    units.push(self.expand_rule(rule, family, arity)?);
                }
            }
        }
        Ok(units)
    }

    /// Expand and register every unit with `sink`. Any registration failure
    /// aborts the whole expansion.
    pub fn expand(
        &mut self,
        catalog: &RuleCatalog,
        families: &[RewriteFamily],
        sink: &mut dyn UnitSink,
    ) -> Result<Expansion, MigrateError> {
        let mut expansion = Expansion::default();
        for unit in self.expand_units(catalog, families)? {
            let handle = sink.register_unit(&unit.name, &unit.render())?;
            expansion.units.push((handle, unit.origin));
        }
        debug!("Registered {} template units", expansion.count());
        Ok(expansion)
    }

    fn next_name(&mut self) -> String {
        let name = format!("{UNIT_PREFIX}{:04}", self.next_seq);
        self.next_seq += 1;
        name
    }

    fn expand_rule(
        &mut self,
        rule: &SubstitutionRule,
        family: &RewriteFamily,
        arity: ArityVariant,
    ) -> Result<TemplateUnit, MigrateError> {
        let trailing = arity.arg_names();

        let mut signature: Vec<SignatureSlot> = rule
            .params
            .iter()
            .map(|slot| SignatureSlot {
                names: slot.names.clone(),
                go_type: slot.ty.go_type().to_string(),
            })
            .collect();
        if !trailing.is_empty() {
            signature.push(SignatureSlot {
                names: trailing.clone(),
                go_type: "interface{}".to_string(),
            });
        }

        let helper = if rule.after.uses_helper() {
            Some(family.helper.as_ref().ok_or_else(|| {
                MigrateError::TemplateGeneration(format!(
                    "rule '{}' uses helpers but the {} family has no helper package",
                    rule.id, family.kind
                ))
            })?)
        } else {
            None
        };

        let before = call_expr(&family.source, &rule.before, None, &trailing);
        let after = call_expr(&family.destination, &rule.after, helper, &trailing);

        let mut imports = ImportSet::new(vec![
            ImportRecord::new("testing", None, 0),
            ImportRecord::new(family.source.path.clone(), None, 1),
            api_import(&family.destination),
        ]);
        if let Some(helper) = helper {
            imports.push(api_import(helper));
        }

        Ok(TemplateUnit {
            name: self.next_name(),
            origin: UnitOrigin {
                rule_id: rule.id.clone(),
                family: family.kind,
                arity,
            },
            signature,
            before,
            after,
            imports,
        })
    }
}

fn api_import(api: &ApiImport) -> ImportRecord {
    let alias = api.needs_alias().then(|| api.name.clone());
    ImportRecord::new(api.path.clone(), alias, 1)
}

fn call_expr(
    api: &ApiImport,
    shape: &CallShape,
    helper: Option<&ApiImport>,
    trailing: &[String],
) -> CallExpr {
    let mut args: Vec<String> = shape
        .args
        .iter()
        .map(|arg| match arg {
            ArgShape::Param(name) => name.clone(),
            ArgShape::Helper { helper: func, args } => {
                let ns = helper.map(|h| h.name.as_str()).unwrap_or("h");
                format!("{ns}.{func}({})", args.join(", "))
            }
        })
        .collect();
    args.extend(trailing.iter().cloned());

    CallExpr {
        qualifier: api.name.clone(),
        callee: shape.callee.clone(),
        args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equal_unit(arity: usize) -> TemplateUnit {
        let catalog = RuleCatalog::builtin().unwrap();
        let rule = catalog.get("equal").unwrap();
        let mut expander = TemplateExpander::new();
        expander
            .expand_rule(rule, &RewriteFamily::strict(), ArityVariant::new(arity).unwrap())
            .unwrap()
    }

    #[test]
    fn test_swapped_operands_with_trailing_args() {
        let unit = equal_unit(2);
        assert_eq!(unit.before.render(), "require.Equal(t, a, b, m0, m1)");
        assert_eq!(unit.after.render(), "gassert.EQ(t, b, a, m0, m1)");
        assert_eq!(
            unit.render_signature(),
            "t testing.TB, a, b interface{}, m0, m1 interface{}"
        );
    }

    #[test]
    fn test_render_is_a_go_unit() {
        let unit = equal_unit(0);
        let source = unit.render();
        assert!(source.starts_with("package migrate_template_0000\n"));
        assert!(source.contains("\tgassert \"github.com/grailbio/testutil/assert\"\n"));
        assert!(source.contains(
            "func before(t testing.TB, a, b interface{}) { require.Equal(t, a, b) }"
        ));
        assert!(source.contains("func after(t testing.TB, a, b interface{}) { gassert.EQ(t, b, a) }"));
    }

    #[test]
    fn test_helper_import_only_when_referenced() {
        let catalog = RuleCatalog::builtin().unwrap();
        let mut expander = TemplateExpander::new();
        let len = expander
            .expand_rule(
                catalog.get("len").unwrap(),
                &RewriteFamily::soft(),
                ArityVariant::new(0).unwrap(),
            )
            .unwrap();
        assert_eq!(len.after.render(), "gexpect.That(t, x, h.HasLen(n))");
        assert!(
            len.imports
                .find(|r| r.path == "github.com/grailbio/testutil/h")
                .is_some()
        );

        let nil = expander
            .expand_rule(
                catalog.get("nil").unwrap(),
                &RewriteFamily::soft(),
                ArityVariant::new(0).unwrap(),
            )
            .unwrap();
        assert!(
            nil.imports
                .find(|r| r.path == "github.com/grailbio/testutil/h")
                .is_none()
        );
    }

    #[test]
    fn test_counter_is_per_expander() {
        let catalog = RuleCatalog::builtin().unwrap();
        let families = RewriteFamily::builtin();
        let first = TemplateExpander::new()
            .expand_units(&catalog, &families)
            .unwrap();
        let second = TemplateExpander::new()
            .expand_units(&catalog, &families)
            .unwrap();
        assert_eq!(first[0].name, second[0].name);
        assert_eq!(first[0].name, "migrate_template_0000");
    }
}
