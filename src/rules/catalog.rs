//! # Rule Catalog
//!
//! Loads and validates the declarative list of substitution rules.

use super::types::*;
use crate::errors::MigrateError;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::debug;

const BUILTIN_CATALOG: &str = include_str!("testify.yaml");

/// Names the expander reserves for trailing message arguments.
pub const RESERVED_TRAILING_PREFIX: char = 'm';

/// An ordered, validated list of substitution rules
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<SubstitutionRule>,
}

impl RuleCatalog {
    /// The testify catalog compiled into the binary.
    pub fn builtin() -> Result<Self, MigrateError> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    /// Load a catalog from a YAML file on disk.
    pub fn load(path: &Path) -> Result<Self, MigrateError> {
        let content = fs::read_to_string(path).map_err(|e| {
            MigrateError::Catalog(format!("cannot read {}: {e}", path.display()))
        })?;
        let catalog = Self::from_yaml(&content)?;
        debug!("Loaded {} rules from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    pub fn from_yaml(content: &str) -> Result<Self, MigrateError> {
        let rules: Vec<SubstitutionRule> = serde_yaml::from_str(content)?;
        Self::new(rules)
    }

    /// Build a catalog, rejecting malformed or ambiguous rules.
    pub fn new(rules: Vec<SubstitutionRule>) -> Result<Self, MigrateError> {
        let catalog = Self { rules };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn rules(&self) -> &[SubstitutionRule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&SubstitutionRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        let ident = Regex::new(r"^[a-z][A-Za-z0-9_]*$")?;
        let exported = Regex::new(r"^[A-Z][A-Za-z0-9_]*$")?;
        let reserved = Regex::new(&format!(r"^{RESERVED_TRAILING_PREFIX}[0-9]+$"))?;

        if self.rules.is_empty() {
            return Err(MigrateError::Catalog("catalog contains no rules".to_string()));
        }

        let mut seen_ids = BTreeSet::new();
        let mut seen_callees: HashMap<&str, &str> = HashMap::new();

        for rule in &self.rules {
            if !seen_ids.insert(rule.id.as_str()) {
                return Err(MigrateError::Catalog(format!("duplicate rule id '{}'", rule.id)));
            }

            // Arity variants cover every trailing count for a callee, so two
            // rules on one callee would always overlap.
            if let Some(other) = seen_callees.insert(rule.before.callee.as_str(), &rule.id) {
                return Err(MigrateError::Catalog(format!(
                    "rules '{}' and '{}' both match calls to {}",
                    other, rule.id, rule.before.callee
                )));
            }

            for callee in [&rule.before.callee, &rule.after.callee] {
                if !exported.is_match(callee) {
                    return Err(MigrateError::Catalog(format!(
                        "rule '{}': '{callee}' is not an exported Go identifier",
                        rule.id
                    )));
                }
            }

            match rule.params.first() {
                Some(slot) if slot.ty == ParamType::Tb && slot.names.len() == 1 => {}
                _ => {
                    return Err(MigrateError::Catalog(format!(
                        "rule '{}': first parameter must be the test handle",
                        rule.id
                    )));
                }
            }

            let names = rule.param_names();
            let mut declared = BTreeSet::new();
            for name in &names {
                if !ident.is_match(name) || reserved.is_match(name) {
                    return Err(MigrateError::Catalog(format!(
                        "rule '{}': invalid parameter name '{name}'",
                        rule.id
                    )));
                }
                if !declared.insert(*name) {
                    return Err(MigrateError::Catalog(format!(
                        "rule '{}': parameter '{name}' declared twice",
                        rule.id
                    )));
                }
            }

            let before_refs = rule.before.param_refs();
            if rule.before.uses_helper() {
                return Err(MigrateError::Catalog(format!(
                    "rule '{}': helper calls are only allowed in the after shape",
                    rule.id
                )));
            }
            let before_set: BTreeSet<&str> = before_refs.iter().copied().collect();
            if before_refs.len() != before_set.len() || before_set != declared {
                return Err(MigrateError::Catalog(format!(
                    "rule '{}': before shape must bind every parameter exactly once",
                    rule.id
                )));
            }

            let after_set: BTreeSet<&str> = rule.after.param_refs().into_iter().collect();
            if after_set != declared {
                return Err(MigrateError::Catalog(format!(
                    "rule '{}': after shape must use the same parameters as the before shape",
                    rule.id
                )));
            }

            if let Some(helper) = rule.after.args.iter().find_map(|arg| match arg {
                ArgShape::Helper { helper, .. } => Some(helper),
                ArgShape::Param(_) => None,
            }) {
                if !exported.is_match(helper) {
                    return Err(MigrateError::Catalog(format!(
                        "rule '{}': helper '{helper}' is not an exported Go identifier",
                        rule.id
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_yaml(extra: &str) -> String {
        format!(
            r#"
- id: equal
  params:
    - {{ names: [t], type: tb }}
    - {{ names: [a, b], type: any }}
  before: {{ callee: Equal, args: [t, a, b] }}
  after: {{ callee: EQ, args: [t, b, a] }}
{extra}"#
        )
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = RuleCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 16);
        let equal = catalog.get("equal").unwrap();
        assert_eq!(equal.before.callee, "Equal");
        assert_eq!(equal.after.callee, "EQ");
        assert!(catalog.get("len").unwrap().after.uses_helper());
    }

    #[test]
    fn test_overlapping_before_shapes_rejected() {
        let yaml = rule_yaml(
            r#"
- id: equal-again
  params:
    - { names: [t], type: tb }
    - { names: [a, b], type: any }
  before: { callee: Equal, args: [t, a, b] }
  after: { callee: EQ, args: [t, a, b] }
"#,
        );
        let err = RuleCatalog::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("both match calls to Equal"));
    }

    #[test]
    fn test_after_shape_must_bind_same_variables() {
        let yaml = r#"
- id: equal
  params:
    - { names: [t], type: tb }
    - { names: [a, b], type: any }
  before: { callee: Equal, args: [t, a, b] }
  after: { callee: EQ, args: [t, a] }
"#;
        let err = RuleCatalog::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("same parameters"));
    }

    #[test]
    fn test_reserved_trailing_names_rejected() {
        let yaml = r#"
- id: nil
  params:
    - { names: [t], type: tb }
    - { names: [m0], type: any }
  before: { callee: Nil, args: [t, m0] }
  after: { callee: Nil, args: [t, m0] }
"#;
        assert!(RuleCatalog::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_first_param_must_be_test_handle() {
        let yaml = r#"
- id: nil
  params:
    - { names: [a], type: any }
  before: { callee: Nil, args: [a] }
  after: { callee: Nil, args: [a] }
"#;
        let err = RuleCatalog::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("test handle"));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(RuleCatalog::from_yaml("[]").is_err());
    }
}
