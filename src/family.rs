//! # Rewrite Families
//!
//! A rewrite family pairs one source API package with its destination
//! package. Rules are written once and expanded against every family.

use serde::Serialize;
use std::fmt;

/// Number of trailing message-argument variants generated per rule (0..=5).
pub const MAX_TRAILING_ARGS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyKind {
    /// Fail fast: testify `require` to testutil `assert`
    Strict,
    /// Record and continue: testify `assert` to testutil `expect`
    Soft,
}

impl fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FamilyKind::Strict => write!(f, "strict"),
            FamilyKind::Soft => write!(f, "soft"),
        }
    }
}

/// An import path together with the name code uses to reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiImport {
    pub path: String,
    pub name: String,
}

impl ApiImport {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    /// Whether `path` names this package, directly or through a vendor directory.
    pub fn matches_path(&self, path: &str) -> bool {
        path == self.path
            || path
                .strip_suffix(self.path.as_str())
                .is_some_and(|prefix| prefix.ends_with('/'))
    }

    /// The package name Go would bind without an explicit alias.
    pub fn default_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Whether an import of this package needs an explicit alias to be
    /// referenced as [`ApiImport::name`].
    pub fn needs_alias(&self) -> bool {
        self.default_name() != self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteFamily {
    pub kind: FamilyKind,
    pub source: ApiImport,
    pub destination: ApiImport,
    /// Extra namespace available to after-shapes that reference helpers
    pub helper: Option<ApiImport>,
}

impl RewriteFamily {
    pub fn strict() -> Self {
        Self {
            kind: FamilyKind::Strict,
            source: ApiImport::new("github.com/stretchr/testify/require", "require"),
            destination: ApiImport::new("github.com/grailbio/testutil/assert", "gassert"),
            helper: Some(helper_import()),
        }
    }

    pub fn soft() -> Self {
        Self {
            kind: FamilyKind::Soft,
            source: ApiImport::new("github.com/stretchr/testify/assert", "assert"),
            destination: ApiImport::new("github.com/grailbio/testutil/expect", "gexpect"),
            helper: Some(helper_import()),
        }
    }

    /// Both families, strict first.
    pub fn builtin() -> Vec<Self> {
        vec![Self::strict(), Self::soft()]
    }
}

fn helper_import() -> ApiImport {
    ApiImport::new("github.com/grailbio/testutil/h", "h")
}

/// Count of optional trailing message arguments a call carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArityVariant(usize);

impl ArityVariant {
    pub fn all() -> impl Iterator<Item = ArityVariant> {
        (0..=MAX_TRAILING_ARGS).map(ArityVariant)
    }

    pub fn new(count: usize) -> Option<Self> {
        (count <= MAX_TRAILING_ARGS).then_some(ArityVariant(count))
    }

    pub fn count(&self) -> usize {
        self.0
    }

    /// `m0, m1, ...` in declaration order.
    pub fn arg_names(&self) -> Vec<String> {
        (0..self.0).map(|i| format!("m{i}")).collect()
    }

    /// Declaration fragment appended to a signature, e.g. `m0, m1 interface{}`.
    /// Empty for the zero variant.
    pub fn decl_fragment(&self) -> String {
        if self.0 == 0 {
            String::new()
        } else {
            format!("{} interface{{}}", self.arg_names().join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendored_source_path_matches() {
        let family = RewriteFamily::soft();
        assert!(family.source.matches_path("github.com/stretchr/testify/assert"));
        assert!(
            family
                .source
                .matches_path("vendor/github.com/stretchr/testify/assert")
        );
        assert!(!family.source.matches_path("github.com/grailbio/testutil/assert"));
        assert!(!family.source.matches_path("xgithub.com/stretchr/testify/assert"));
    }

    #[test]
    fn test_destination_aliases() {
        assert!(RewriteFamily::strict().destination.needs_alias());
        assert!(!RewriteFamily::strict().source.needs_alias());
        assert!(!helper_import().needs_alias());
    }

    #[test]
    fn test_arity_fragments() {
        let variants: Vec<_> = ArityVariant::all().collect();
        assert_eq!(variants.len(), MAX_TRAILING_ARGS + 1);
        assert_eq!(variants[0].decl_fragment(), "");
        assert_eq!(variants[2].decl_fragment(), "m0, m1 interface{}");
        assert_eq!(variants[2].arg_names(), vec!["m0", "m1"]);
        assert!(ArityVariant::new(6).is_none());
    }
}
