//! # Import Reconciler
//!
//! Runs after every matcher has been applied to a file. Source-family
//! imports the file no longer references are dropped, and destination (and
//! helper) imports are added or re-aliased to the names the after-shapes
//! were generated with. Both families are handled in one sweep over the
//! canonical import set; the file's import region is regenerated only when
//! that set changed.

use crate::ast_utils::parse_go;
use crate::family::{ApiImport, RewriteFamily};
use crate::imports::{ImportRecord, ImportSet, qualified_references};
use crate::rules::{ArgShape, RuleCatalog};
use crate::target::TargetFile;
use std::collections::BTreeSet;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ImportReconciler {
    families: Vec<RewriteFamily>,
    /// Members of the helper namespace that after-shapes may introduce
    helper_symbols: BTreeSet<String>,
}

impl ImportReconciler {
    pub fn new(families: Vec<RewriteFamily>, catalog: &RuleCatalog) -> Self {
        let helper_symbols = catalog
            .rules()
            .iter()
            .flat_map(|rule| rule.after.args.iter())
            .filter_map(|arg| match arg {
                ArgShape::Helper { helper, .. } => Some(helper.clone()),
                ArgShape::Param(_) => None,
            })
            .collect();
        Self {
            families,
            helper_symbols,
        }
    }

    /// Reconcile `file`'s imports with its current body. Returns 1 when the
    /// import set changed, 0 otherwise.
    pub fn reconcile(&self, file: &mut TargetFile) -> usize {
        let ast = parse_go(&file.source);
        let refs = qualified_references(ast.root());
        let used: BTreeSet<String> = refs.iter().map(|(q, _)| q.clone()).collect();

        let mut set = file.imports.clone();
        for family in &self.families {
            let mut anchor = set.position(|r| family.source.matches_path(&r.path));

            if used.contains(&family.destination.name) {
                ensure_import(&mut set, &family.destination, &used, &mut anchor);
            }
            if let Some(helper) = &family.helper {
                let introduced = refs
                    .iter()
                    .any(|(q, member)| *q == helper.name && self.helper_symbols.contains(member));
                if introduced {
                    ensure_import(&mut set, helper, &used, &mut anchor);
                }
            }

            set.retain(|r| {
                if !family.source.matches_path(&r.path) {
                    return true;
                }
                let still_used = used.contains(r.local_name());
                if still_used {
                    debug!(
                        "{}: {} still referenced after rewriting, keeping import",
                        file.path.display(),
                        r.path
                    );
                }
                still_used
            });
        }
        set.compact_groups();
        set.mark_usage(&used);

        if set.keys() == file.imports.keys() {
            file.imports = set;
            return 0;
        }

        debug!(
            "{}: imports {:?} -> {:?}",
            file.path.display(),
            file.imports.keys(),
            set.keys()
        );
        file.imports = set;
        file.regenerate_imports();
        1
    }
}

/// Make sure `api` is imported under `api.name`. New imports go where the
/// family's source import sat (`anchor`), or at the end of the last group.
/// Nothing is added when another package already owns the name.
fn ensure_import(
    set: &mut ImportSet,
    api: &ApiImport,
    used: &BTreeSet<String>,
    anchor: &mut Option<usize>,
) {
    if set
        .find(|r| r.path == api.path && r.local_name() == api.name)
        .is_some()
    {
        return;
    }
    if let Some(other) = set.find(|r| r.local_name() == api.name && r.path != api.path) {
        warn!(
            "{} already names {}, not importing {}",
            api.name, other.path, api.path
        );
        return;
    }
    let alias = api.needs_alias().then(|| api.name.clone());

    if let Some(idx) = set.position(|r| r.path == api.path) {
        let old_name = set.records()[idx].local_name().to_string();
        if !used.contains(&old_name) {
            if let Some(record) = set.get_mut(idx) {
                record.alias = alias;
            }
            return;
        }
        // The old name is still in use; import the package a second time.
        let group = set.records()[idx].group;
        set.insert(idx + 1, ImportRecord::new(api.path.clone(), alias, group));
        if let Some(a) = anchor.as_mut() {
            if *a > idx {
                *a += 1;
            }
        }
        return;
    }

    match anchor {
        Some(idx) => {
            let group = set.records()[*idx].group;
            set.insert(*idx, ImportRecord::new(api.path.clone(), alias, group));
            *idx += 1;
        }
        None => {
            let group = set.last_group();
            set.push(ImportRecord::new(api.path.clone(), alias, group));
        }
    }
}
