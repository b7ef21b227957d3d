//! The `update` pipeline (Component H, §4.H): refreshes a workflow whose
//! frontmatter declares a `source:` it was vendored from, by resolving
//! the latest upstream ref and either overriding the local content with
//! it or 3-way merging local edits against it.
//!
//! This is a different operation from [`crate::pipeline::compile_workflow`]:
//! compiling only ever regenerates the `.lock.yml` from whatever `.md` is
//! on disk right now and never touches the `.md` itself. `update` is the
//! one operation that rewrites the source file, and the only one that
//! talks to a remote repository host.

use aw_source::SourceFetcher;
use aw_types::{Outcome, SourceRef};

use crate::error::CompileError;
use crate::frontmatter::parse_source;

/// How a conflicting source update is resolved (§6 `--merge`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Replace local content outright with the upstream version. Default.
    Override,
    /// 3-way merge local edits against the upstream change.
    Merge,
}

/// How the synthetic `on.stop-after` field should be rewritten (§6
/// `--no-stop-after` / `--stop-after <value>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopAfterMode {
    Unchanged,
    Clear,
    Set(String),
}

pub struct UpdateOptions<'a> {
    pub fetcher: &'a dyn SourceFetcher,
    /// `--major`: allow crossing a major version when picking the
    /// highest SemVer tag, instead of staying within the pinned major.
    pub allow_major_bump: bool,
    /// `--force`: proceed even if the resolved ref is unchanged.
    pub force: bool,
    pub merge: MergeMode,
    pub stop_after: StopAfterMode,
}

/// The result of updating one workflow's source, before recompilation.
#[derive(Debug, Clone)]
pub struct SourceUpdate {
    pub outcome: Outcome,
    pub resolved_ref: Option<String>,
    /// New file content to write to disk, when `outcome` is `Updated`.
    pub new_content: Option<String>,
    /// Content with diff3 conflict markers, when `outcome` is `Conflicted`.
    pub conflict_markers: Option<String>,
}

/// A bare `major.minor.patch` version, for picking the highest release
/// tag within a major version (§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SemverTag(u64, u64, u64);

impl SemverTag {
    fn parse(tag: &str) -> Option<Self> {
        let body = tag.strip_prefix('v').unwrap_or(tag);
        let mut parts = body.splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().unwrap_or("0").parse().ok()?;
        let patch = parts
            .next()
            .unwrap_or("0")
            .split(['-', '+'])
            .next()
            .unwrap_or("0")
            .parse()
            .ok()?;
        Some(Self(major, minor, patch))
    }
}

fn registry_err(e: anyhow::Error) -> CompileError {
    CompileError::RegistryUnavailable {
        detail: e.to_string(),
    }
}

/// Resolve the "latest" ref for `source` per §4.H's three rules: a SemVer
/// tag queries releases and picks the highest tag within the pinned major
/// (crossing it only under `--major`); a plain ref is treated as a branch
/// and re-resolved to its current head; no ref at all means "track the
/// default branch", already what [`SourceFetcher::resolve_ref`] does.
fn resolve_latest_ref(
    source: &SourceRef,
    options: &UpdateOptions<'_>,
) -> Result<String, CompileError> {
    let Some(current) = &source.r#ref else {
        return options.fetcher.resolve_ref(source).map_err(registry_err);
    };

    if let Some(current_tag) = SemverTag::parse(current) {
        let tags = options.fetcher.list_tags(source).map_err(registry_err)?;
        let best = tags
            .iter()
            .filter_map(|t| SemverTag::parse(t).map(|v| (v, t)))
            .filter(|(v, _)| options.allow_major_bump || v.0 == current_tag.0)
            .max_by_key(|(v, _)| *v);
        return Ok(best.map(|(_, t)| t.clone()).unwrap_or_else(|| current.clone()));
    }

    options
        .fetcher
        .branch_head(source, current)
        .map_err(registry_err)
}

/// Set (or insert) the `source:` key in `frontmatter` to `owner/repo/path@ref`
/// and re-render the document as `---\n<frontmatter>---\n<body>`.
fn with_source_pinned_to(
    frontmatter: &serde_yaml::Value,
    body: &str,
    source: &SourceRef,
    r#ref: &str,
) -> Result<String, CompileError> {
    let mut mapping = match frontmatter {
        serde_yaml::Value::Mapping(m) => m.clone(),
        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
        other => {
            return Err(CompileError::MalformedSource {
                path: Default::default(),
                line: 1,
                detail: format!("frontmatter root must be a mapping, found {other:?}"),
            })
        }
    };
    let pinned = SourceRef {
        owner: source.owner.clone(),
        repo: source.repo.clone(),
        path: source.path.clone(),
        r#ref: Some(r#ref.to_string()),
    };
    mapping.insert(
        serde_yaml::Value::String("source".to_string()),
        serde_yaml::Value::String(pinned.to_string()),
    );
    let yaml = serde_yaml::to_string(&serde_yaml::Value::Mapping(mapping)).map_err(|e| {
        CompileError::EmissionError {
            path: Default::default(),
            detail: e.to_string(),
            source: None,
        }
    })?;
    Ok(format!("---\n{yaml}---\n{body}"))
}

/// Update one workflow source in memory (§4.H steps 1–5); writing the
/// result and recompiling (step 6) is the caller's job, via
/// [`crate::pipeline::compile_and_update`] once `new_content` has been
/// written to disk.
///
/// `local_raw` is the current on-disk content of the workflow; `source`
/// is its parsed `source:` field (the caller selects only workflows that
/// have one, per §4.H's opening sentence).
pub fn update_source(
    local_raw: &str,
    source: &SourceRef,
    options: &UpdateOptions<'_>,
) -> Result<SourceUpdate, CompileError> {
    let resolved_ref = resolve_latest_ref(source, options)?;
    let current_ref = source.r#ref.clone().unwrap_or_default();

    if resolved_ref == current_ref && !options.force {
        return Ok(SourceUpdate {
            outcome: Outcome::Unchanged,
            resolved_ref: Some(resolved_ref),
            new_content: None,
            conflict_markers: None,
        });
    }

    let base_fetched = options
        .fetcher
        .fetch_content(source)
        .map_err(registry_err)?;
    let new_source = SourceRef {
        r#ref: Some(resolved_ref.clone()),
        ..source.clone()
    };
    let new_fetched = options
        .fetcher
        .fetch_content(&new_source)
        .map_err(registry_err)?;

    let base_parsed = parse_source(std::path::Path::new("<base>"), &base_fetched)?;
    let base_pinned = with_source_pinned_to(
        &base_parsed.frontmatter,
        &base_parsed.body,
        source,
        &current_ref,
    )?;
    let new_parsed = parse_source(std::path::Path::new("<new>"), &new_fetched)?;
    let mut new_pinned = with_source_pinned_to(
        &new_parsed.frontmatter,
        &new_parsed.body,
        source,
        &resolved_ref,
    )?;

    new_pinned = apply_stop_after(&new_pinned, &options.stop_after)?;

    let content = match options.merge {
        MergeMode::Override => new_pinned,
        MergeMode::Merge => {
            match aw_git::three_way_merge(&base_pinned, local_raw, &new_pinned).map_err(|e| {
                CompileError::EmissionError {
                    path: Default::default(),
                    detail: e.to_string(),
                    source: Some(e),
                }
            })? {
                aw_git::MergeOutcome::Clean(merged) => merged,
                aw_git::MergeOutcome::Conflicted(markers) => {
                    return Ok(SourceUpdate {
                        outcome: Outcome::Conflicted,
                        resolved_ref: Some(resolved_ref),
                        new_content: None,
                        conflict_markers: Some(markers),
                    });
                }
            }
        }
    };

    Ok(SourceUpdate {
        outcome: Outcome::Updated,
        resolved_ref: Some(resolved_ref),
        new_content: Some(content),
        conflict_markers: None,
    })
}

/// Rewrite `on.stop-after` per `mode` (§6 `--no-stop-after`/`--stop-after`).
/// Reparses the already-pinned content so the rewrite sees the final
/// frontmatter shape.
fn apply_stop_after(content: &str, mode: &StopAfterMode) -> Result<String, CompileError> {
    if *mode == StopAfterMode::Unchanged {
        return Ok(content.to_string());
    }
    let parsed = parse_source(std::path::Path::new("<stop-after>"), content)?;
    let mut mapping = match parsed.frontmatter {
        serde_yaml::Value::Mapping(m) => m,
        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
        _ => return Ok(content.to_string()),
    };
    let on_key = serde_yaml::Value::String("on".to_string());
    let mut on_mapping = match mapping.get(&on_key) {
        Some(serde_yaml::Value::Mapping(m)) => m.clone(),
        _ => serde_yaml::Mapping::new(),
    };
    let stop_after_key = serde_yaml::Value::String("stop-after".to_string());
    match mode {
        StopAfterMode::Clear => {
            on_mapping.remove(&stop_after_key);
        }
        StopAfterMode::Set(value) => {
            on_mapping.insert(stop_after_key, serde_yaml::Value::String(value.clone()));
        }
        StopAfterMode::Unchanged => unreachable!("handled above"),
    }
    mapping.insert(on_key, serde_yaml::Value::Mapping(on_mapping));
    let yaml = serde_yaml::to_string(&serde_yaml::Value::Mapping(mapping)).map_err(|e| {
        CompileError::EmissionError {
            path: Default::default(),
            detail: e.to_string(),
            source: None,
        }
    })?;
    Ok(format!("---\n{yaml}---\n{}", parsed.body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Mutex;

    struct FakeFetcher {
        tags: Vec<String>,
        contents: Mutex<Vec<(String, String)>>, // (ref, content) fixtures
        default_branch_head: String,
    }

    impl SourceFetcher for FakeFetcher {
        fn fetch_content(&self, source: &SourceRef) -> Result<String> {
            let r#ref = source.r#ref.clone().unwrap_or_default();
            self.contents
                .lock()
                .unwrap()
                .iter()
                .find(|(r, _)| *r == r#ref)
                .map(|(_, c)| c.clone())
                .ok_or_else(|| anyhow::anyhow!("no fixture for ref `{ref}`", ref = r#ref))
        }

        fn resolve_ref(&self, _source: &SourceRef) -> Result<String> {
            Ok(self.default_branch_head.clone())
        }

        fn list_tags(&self, _source: &SourceRef) -> Result<Vec<String>> {
            Ok(self.tags.clone())
        }

        fn branch_head(&self, _source: &SourceRef, _branch: &str) -> Result<String> {
            Ok(self.default_branch_head.clone())
        }
    }

    fn source(r#ref: &str) -> SourceRef {
        SourceRef {
            owner: "o".to_string(),
            repo: "r".to_string(),
            path: "f.md".to_string(),
            r#ref: Some(r#ref.to_string()),
        }
    }

    #[test]
    fn resolve_latest_ref_picks_highest_tag_within_pinned_major() {
        let fetcher = FakeFetcher {
            tags: vec!["v1.2.0".into(), "v1.3.0".into(), "v2.0.0".into()],
            contents: Mutex::new(vec![]),
            default_branch_head: "HEAD".into(),
        };
        let options = UpdateOptions {
            fetcher: &fetcher,
            allow_major_bump: false,
            force: false,
            merge: MergeMode::Override,
            stop_after: StopAfterMode::Unchanged,
        };
        let resolved = resolve_latest_ref(&source("v1.0.0"), &options).unwrap();
        assert_eq!(resolved, "v1.3.0");
    }

    #[test]
    fn resolve_latest_ref_crosses_major_when_allowed() {
        let fetcher = FakeFetcher {
            tags: vec!["v1.2.0".into(), "v2.0.0".into()],
            contents: Mutex::new(vec![]),
            default_branch_head: "HEAD".into(),
        };
        let options = UpdateOptions {
            fetcher: &fetcher,
            allow_major_bump: true,
            force: false,
            merge: MergeMode::Override,
            stop_after: StopAfterMode::Unchanged,
        };
        let resolved = resolve_latest_ref(&source("v1.0.0"), &options).unwrap();
        assert_eq!(resolved, "v2.0.0");
    }

    #[test]
    fn same_resolved_ref_is_unchanged() {
        let fetcher = FakeFetcher {
            tags: vec!["v1.0.0".into()],
            contents: Mutex::new(vec![]),
            default_branch_head: "HEAD".into(),
        };
        let options = UpdateOptions {
            fetcher: &fetcher,
            allow_major_bump: false,
            force: false,
            merge: MergeMode::Override,
            stop_after: StopAfterMode::Unchanged,
        };
        let result = update_source("---\nname: T\n---\nbody\n", &source("v1.0.0"), &options).unwrap();
        assert_eq!(result.outcome, Outcome::Unchanged);
        assert!(result.new_content.is_none());
    }

    #[test]
    fn override_mode_replaces_content_and_pins_new_ref() {
        let fetcher = FakeFetcher {
            tags: vec!["v1.0.0".into(), "v1.1.0".into()],
            contents: Mutex::new(vec![
                ("v1.0.0".into(), "---\nname: Old\non: { push: {} }\n---\nold body\n".into()),
                ("v1.1.0".into(), "---\nname: New\non: { push: {} }\n---\nnew body\n".into()),
            ]),
            default_branch_head: "HEAD".into(),
        };
        let options = UpdateOptions {
            fetcher: &fetcher,
            allow_major_bump: false,
            force: false,
            merge: MergeMode::Override,
            stop_after: StopAfterMode::Unchanged,
        };
        let result = update_source(
            "---\nname: Old\non: { push: {} }\nsource: o/r/f.md@v1.0.0\n---\nold body\n",
            &source("v1.0.0"),
            &options,
        )
        .unwrap();
        assert_eq!(result.outcome, Outcome::Updated);
        let content = result.new_content.unwrap();
        assert!(content.contains("name: New"));
        assert!(content.contains("source: o/r/f.md@v1.1.0"));
    }

    #[test]
    fn merge_mode_conflicts_when_both_sides_edit_the_same_field() {
        let fetcher = FakeFetcher {
            tags: vec!["v1.0.0".into(), "v1.1.0".into()],
            contents: Mutex::new(vec![
                (
                    "v1.0.0".into(),
                    "---\nname: T\non: { push: {} }\npermissions:\n  issues: read\n---\nbody\n".into(),
                ),
                (
                    "v1.1.0".into(),
                    "---\nname: T\non: { push: {} }\npermissions:\n  issues: none\n---\nbody\n".into(),
                ),
            ]),
            default_branch_head: "HEAD".into(),
        };
        let options = UpdateOptions {
            fetcher: &fetcher,
            allow_major_bump: false,
            force: false,
            merge: MergeMode::Merge,
            stop_after: StopAfterMode::Unchanged,
        };
        let local = "---\nname: T\non: { push: {} }\npermissions:\n  issues: write\nsource: o/r/f.md@v1.0.0\n---\nbody\n";
        let result = update_source(local, &source("v1.0.0"), &options).unwrap();
        assert_eq!(result.outcome, Outcome::Conflicted);
        let markers = result.conflict_markers.unwrap();
        assert!(markers.contains("<<<<<<<"));
        assert!(markers.contains(">>>>>>>"));
    }

    #[test]
    fn stop_after_clear_removes_the_field() {
        let content = "---\nname: T\non:\n  push: {}\n  stop-after: '2025-01-01'\n---\nbody\n";
        let rewritten = apply_stop_after(content, &StopAfterMode::Clear).unwrap();
        assert!(!rewritten.contains("stop-after"));
    }

    #[test]
    fn stop_after_set_rewrites_the_field() {
        let content = "---\nname: T\non:\n  push: {}\n---\nbody\n";
        let rewritten = apply_stop_after(content, &StopAfterMode::Set("2026-01-01".to_string())).unwrap();
        assert!(rewritten.contains("stop-after: 2026-01-01"));
    }
}
