use serde::{Deserialize, Serialize};
use std::fmt;

// Substitution rule types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubstitutionRule {
    pub id: String,
    pub params: Vec<ParamSlot>,
    pub before: CallShape,
    pub after: CallShape,
}

/// One or more parameters sharing a declared type, e.g. `a, b interface{}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamSlot {
    pub names: Vec<String>,
    #[serde(rename = "type")]
    pub ty: ParamType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// The test handle, rendered as `testing.TB`
    Tb,
    Error,
    Bool,
    String,
    /// Rendered as `interface{}`
    Any,
}

impl ParamType {
    pub fn go_type(&self) -> &'static str {
        match self {
            ParamType::Tb => "testing.TB",
            ParamType::Error => "error",
            ParamType::Bool => "bool",
            ParamType::String => "string",
            ParamType::Any => "interface{}",
        }
    }

    /// Inverse of [`ParamType::go_type`], used when reading a parsed unit back.
    pub fn from_go_type(text: &str) -> Option<Self> {
        match text.split_whitespace().collect::<String>().as_str() {
            "testing.TB" => Some(ParamType::Tb),
            "error" => Some(ParamType::Error),
            "bool" => Some(ParamType::Bool),
            "string" => Some(ParamType::String),
            "interface{}" | "any" => Some(ParamType::Any),
            _ => None,
        }
    }
}

/// A call on a family qualifier: `<qualifier>.<callee>(<args>, <trailing>)`.
///
/// The qualifier is not part of the shape; the expander supplies it from the
/// rewrite family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallShape {
    pub callee: String,
    pub args: Vec<ArgShape>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ArgShape {
    /// Reference to a declared parameter
    Param(String),
    /// Call into the helper namespace, e.g. `h.HasLen(n)`
    Helper { helper: String, args: Vec<String> },
}

impl ArgShape {
    pub fn param_refs(&self) -> Vec<&str> {
        match self {
            ArgShape::Param(name) => vec![name.as_str()],
            ArgShape::Helper { args, .. } => args.iter().map(String::as_str).collect(),
        }
    }
}

impl CallShape {
    /// Every parameter referenced, in order of appearance (duplicates kept).
    pub fn param_refs(&self) -> Vec<&str> {
        self.args.iter().flat_map(ArgShape::param_refs).collect()
    }

    pub fn uses_helper(&self) -> bool {
        self.args
            .iter()
            .any(|arg| matches!(arg, ArgShape::Helper { .. }))
    }
}

impl SubstitutionRule {
    pub fn param_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .flat_map(|slot| slot.names.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for SubstitutionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} -> {})", self.id, self.before.callee, self.after.callee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_shape_deserializes_untagged() {
        let yaml = r#"
- a
- helper: HasLen
  args: [n]
"#;
        let args: Vec<ArgShape> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(args[0], ArgShape::Param("a".to_string()));
        assert_eq!(
            args[1],
            ArgShape::Helper {
                helper: "HasLen".to_string(),
                args: vec!["n".to_string()],
            }
        );
    }

    #[test]
    fn test_from_go_type_ignores_spacing() {
        assert_eq!(ParamType::from_go_type("testing.TB"), Some(ParamType::Tb));
        assert_eq!(ParamType::from_go_type("interface {}"), Some(ParamType::Any));
        assert_eq!(ParamType::from_go_type("any"), Some(ParamType::Any));
        assert_eq!(ParamType::from_go_type("int"), None);
    }
}
