//! Merges an entry workflow's frontmatter with its resolved imports
//! (§4.A).
//!
//! Merge order is declaration order, deepest-first: each import is folded
//! in turn, and the entry file's own frontmatter is folded in last so it
//! always has the final say. Within one fold:
//!
//! - mappings merge key-by-key, recursively;
//! - sequences concatenate, with exact-duplicate elements dropped;
//! - scalars take the later value, and when both sides set a *different*
//!   scalar for the same key, a [`Reporter::conflict_reported`] diagnostic
//!   fires (SPEC_FULL "verbose conflict reporting").

use serde_yaml::Value;

use crate::diagnostics::Reporter;
use crate::imports::ImportClosure;

/// Fold `incoming` into `base`, mutating `base` in place. `base_name` and
/// `incoming_name` are used only for conflict diagnostics.
fn merge_value(
    base: &mut Value,
    incoming: &Value,
    path: &str,
    workflow_label: &str,
    base_name: &str,
    incoming_name: &str,
    reporter: &dyn Reporter,
) {
    match (&mut *base, incoming) {
        (Value::Mapping(base_map), Value::Mapping(incoming_map)) => {
            for (key, incoming_val) in incoming_map {
                let key_str = key.as_str().unwrap_or("<non-string-key>").to_string();
                let child_path = if path.is_empty() {
                    key_str.clone()
                } else {
                    format!("{path}.{key_str}")
                };
                match base_map.get_mut(key) {
                    Some(existing) => {
                        merge_value(
                            existing,
                            incoming_val,
                            &child_path,
                            workflow_label,
                            base_name,
                            incoming_name,
                            reporter,
                        );
                    }
                    None => {
                        base_map.insert(key.clone(), incoming_val.clone());
                    }
                }
            }
        }
        (Value::Sequence(base_seq), Value::Sequence(incoming_seq)) => {
            for item in incoming_seq {
                if !base_seq.contains(item) {
                    base_seq.push(item.clone());
                }
            }
        }
        (existing, incoming) if existing == incoming => {
            // identical scalars (or identical complex values of mismatched
            // container kind, e.g. both null) — nothing to report.
        }
        (existing, incoming) => {
            reporter.conflict_reported(workflow_label, path, incoming_name, base_name);
            *existing = incoming.clone();
        }
    }
}

/// Merge an [`ImportClosure`] into one frontmatter document, applying
/// imports in declaration order and the entry file's own frontmatter
/// last.
pub fn merge_closure(closure: &ImportClosure, reporter: &dyn Reporter) -> Value {
    let workflow_label = closure.entry.path.to_string_lossy().into_owned();
    let mut merged = Value::Mapping(Default::default());
    for import in &closure.imports {
        merge_value(
            &mut merged,
            &import.parsed.frontmatter,
            "",
            &workflow_label,
            "<base>",
            &import.reference,
            reporter,
        );
    }
    merge_value(
        &mut merged,
        &closure.entry.frontmatter,
        "",
        &workflow_label,
        "<imports>",
        &workflow_label,
        reporter,
    );
    merged
}
