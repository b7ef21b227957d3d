//! Wires every stage together into the two entry points callers actually
//! use: compiling one workflow source into a [`LockFile`], and
//! reconciling that result with whatever lock file already exists on
//! disk (§5).
//!
//! Stage order mirrors §4 exactly: frontmatter split → import resolution
//! → merge → model validation → MCP manifest / job graph assembly → lock
//! emission. Each stage's errors propagate as `CompileError` without
//! being caught here; callers that compile a batch of workflows (the CLI)
//! catch per-workflow so one failure doesn't abort the rest (§5
//! concurrency model).

use std::path::{Path, PathBuf};

use aw_source::SourceFetcher;
use aw_types::{EngineId, Outcome};

use crate::diagnostics::Reporter;
use crate::error::CompileError;
use crate::frontmatter::parse_source;
use crate::imports::resolve_imports;
use crate::jobgraph::{self, RuntimePaths};
use crate::lock::{self, LockFile};
use crate::merge::merge_closure;
use crate::mcp;
use crate::model::{apply_engine_defaults, build_model, validate_strict_mode};

/// A placeholder GitHub Actions expression standing in for the gateway's
/// per-run API key. The real value is minted at workflow runtime by the
/// gateway startup step, not at compile time — embedding an actual secret
/// in the lock file would break both determinism and the "no secrets at
/// rest" expectation for a file meant to be committed (see DESIGN.md).
const MCP_GATEWAY_API_KEY_EXPR: &str = "${{ github.run_id }}-${{ github.run_attempt }}";

/// Everything [`compile_workflow`] needs beyond the entry file itself.
pub struct CompileOptions<'a> {
    pub reporter: &'a dyn Reporter,
    pub remote: Option<&'a dyn SourceFetcher>,
    pub paths: RuntimePaths,
    pub force_token_env: Option<&'a str>,
    /// `compile --engine E` (§6): overrides whatever `engine:` the
    /// frontmatter declared, reapplying that engine's defaults.
    pub engine_override: Option<EngineId>,
    /// `compile --strict` (§6): forces strict mode on for this run even
    /// if the frontmatter didn't declare `strict: true`.
    pub force_strict: bool,
}

/// Compile one workflow source file into its lock file representation.
/// Does not touch disk beyond reading `entry_path` and its imports.
pub fn compile_workflow(
    entry_path: &Path,
    project_root: &Path,
    options: &CompileOptions<'_>,
) -> Result<LockFile, CompileError> {
    let raw = std::fs::read_to_string(entry_path).map_err(|_| CompileError::SourceNotFound {
        path: entry_path.to_path_buf(),
    })?;
    let parsed = parse_source(entry_path, &raw)?;
    let closure = resolve_imports(parsed, project_root, options.remote)?;
    let merged = merge_closure(&closure, options.reporter);
    let mut data = build_model(entry_path, merged)?;

    if let Some(id) = options.engine_override {
        data.engine.id = id;
        data.engine.model = None;
        apply_engine_defaults(&mut data.engine);
    }

    if options.force_strict && !data.strict {
        data.strict = true;
        validate_strict_mode(entry_path, &data)?;
    }

    let manifest_json = if data.mcp_servers.is_empty() {
        None
    } else {
        let manifest = mcp::build_manifest(&data, MCP_GATEWAY_API_KEY_EXPR, "127.0.0.1")?;
        Some(serde_json::to_string_pretty(&manifest).map_err(|e| CompileError::EmissionError {
            path: entry_path.to_path_buf(),
            detail: e.to_string(),
            source: None,
        })?)
    };

    let jobs = jobgraph::build_jobs(
        &data,
        &options.paths,
        &closure.entry.body,
        manifest_json.as_deref(),
        options.force_token_env,
    )?;
    let order = jobgraph::validate_dag(&jobs)?;
    lock::render(&data, jobs, &order)
}

/// Compile `entry_path` and write the result to `lock_path` if it differs
/// from what is already there. `compile` never merges or conflicts — the
/// lock file is wholly derived from the source, so a changed source
/// simply produces a changed lock file. Conflicts only arise in
/// [`crate::update`], which rewrites the *source* file against an
/// upstream change before this function ever runs.
pub fn compile_and_update(
    entry_path: &Path,
    project_root: &Path,
    lock_path: &Path,
    options: &CompileOptions<'_>,
) -> Result<Outcome, CompileError> {
    let new_lock = compile_workflow(entry_path, project_root, options)?;
    let existing = std::fs::read_to_string(lock_path).ok();
    if existing.as_deref() == Some(new_lock.yaml.as_str()) {
        return Ok(Outcome::Unchanged);
    }
    lock::write_atomically(lock_path, &new_lock)?;
    Ok(Outcome::Updated)
}

/// Classify a compile result as the [`Outcome`] the batch summary tracks
/// (§7): `Ok` carries whatever [`compile_and_update`] decided; an `Err`
/// that never got that far is always `Failed`.
pub fn outcome_of(result: &Result<Outcome, CompileError>) -> Outcome {
    match result {
        Ok(outcome) => *outcome,
        Err(_) => Outcome::Failed,
    }
}

/// Delete every `*.lock.yml` under `workflows_dir` whose matching `.md`
/// source no longer exists (§4.G `--purge`), returning the paths removed.
pub fn purge_orphan_locks(workflows_dir: &Path) -> Result<Vec<PathBuf>, CompileError> {
    let mut removed = Vec::new();
    let entries = std::fs::read_dir(workflows_dir).map_err(|e| CompileError::EmissionError {
        path: workflows_dir.to_path_buf(),
        detail: e.to_string(),
        source: None,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| CompileError::EmissionError {
            path: workflows_dir.to_path_buf(),
            detail: e.to_string(),
            source: None,
        })?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = name.strip_suffix(".lock.yml") else {
            continue;
        };
        let source_path = workflows_dir.join(format!("{stem}.md"));
        if !source_path.exists() {
            std::fs::remove_file(&path).map_err(|e| CompileError::EmissionError {
                path: path.clone(),
                detail: e.to_string(),
                source: None,
            })?;
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullReporter;

    fn write_workflow(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn compiles_a_minimal_workflow_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_workflow(
            dir.path(),
            "wf.md",
            "---\nname: Demo\non:\n  issues: {}\nengine: claude\nsafe-outputs:\n  add-comment: {}\n---\nDo the thing.\n",
        );
        let reporter = NullReporter;
        let options = CompileOptions {
            reporter: &reporter,
            remote: None,
            paths: RuntimePaths::default(),
            force_token_env: None,
            engine_override: None,
            force_strict: false,
        };
        let lock = compile_workflow(&entry, dir.path(), &options).unwrap();
        assert!(lock.yaml.contains("name: Demo"));
        assert!(lock.yaml.contains("check-permissions"));
        assert!(lock.yaml.contains("add-comment"));
    }

    #[test]
    fn compiles_with_an_import() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(
            dir.path(),
            "shared.md",
            "---\ntools:\n  bash: [ls]\n---\nshared\n",
        );
        let entry = write_workflow(
            dir.path(),
            "wf.md",
            "---\nname: Demo\non: { push: {} }\nengine: claude\nimports: [shared.md]\n---\nRun.\n",
        );
        let reporter = NullReporter;
        let options = CompileOptions {
            reporter: &reporter,
            remote: None,
            paths: RuntimePaths::default(),
            force_token_env: None,
            engine_override: None,
            force_strict: false,
        };
        let lock = compile_workflow(&entry, dir.path(), &options).unwrap();
        assert!(lock.yaml.contains("name: Demo"));
    }

    #[test]
    fn engine_override_replaces_frontmatter_engine_and_its_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_workflow(
            dir.path(),
            "wf.md",
            "---\nname: Demo\non: { push: {} }\nengine: claude\n---\nRun.\n",
        );
        let reporter = NullReporter;
        let options = CompileOptions {
            reporter: &reporter,
            remote: None,
            paths: RuntimePaths::default(),
            force_token_env: None,
            engine_override: Some(aw_types::EngineId::Codex),
            force_strict: false,
        };
        let lock = compile_workflow(&entry, dir.path(), &options).unwrap();
        assert!(lock.yaml.contains("gpt-5-codex"));
        assert!(!lock.yaml.contains("claude-sonnet-4-5"));
    }

    #[test]
    fn missing_entry_file_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = NullReporter;
        let options = CompileOptions {
            reporter: &reporter,
            remote: None,
            paths: RuntimePaths::default(),
            force_token_env: None,
            engine_override: None,
            force_strict: false,
        };
        let err = compile_workflow(&dir.path().join("missing.md"), dir.path(), &options)
            .unwrap_err();
        assert!(matches!(err, CompileError::SourceNotFound { .. }));
    }

    #[test]
    fn force_strict_rejects_a_workflow_with_no_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_workflow(
            dir.path(),
            "wf.md",
            "---\nname: Demo\non: { push: {} }\nengine: claude\n---\nRun.\n",
        );
        let reporter = NullReporter;
        let options = CompileOptions {
            reporter: &reporter,
            remote: None,
            paths: RuntimePaths::default(),
            force_token_env: None,
            engine_override: None,
            force_strict: true,
        };
        let err = compile_workflow(&entry, dir.path(), &options).unwrap_err();
        assert!(matches!(err, CompileError::StrictModeViolation { .. }));
    }

    #[test]
    fn compile_and_update_writes_a_fresh_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_workflow(
            dir.path(),
            "wf.md",
            "---\nname: Demo\non: { push: {} }\nengine: claude\n---\nRun.\n",
        );
        let lock_path = dir.path().join("wf.lock.yml");
        let reporter = NullReporter;
        let options = CompileOptions {
            reporter: &reporter,
            remote: None,
            paths: RuntimePaths::default(),
            force_token_env: None,
            engine_override: None,
            force_strict: false,
        };
        let outcome = compile_and_update(&entry, dir.path(), &lock_path, &options).unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert!(lock_path.exists());
    }

    #[test]
    fn recompiling_an_unchanged_workflow_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_workflow(
            dir.path(),
            "wf.md",
            "---\nname: Demo\non: { push: {} }\nengine: claude\n---\nRun.\n",
        );
        let lock_path = dir.path().join("wf.lock.yml");
        let reporter = NullReporter;
        let options = CompileOptions {
            reporter: &reporter,
            remote: None,
            paths: RuntimePaths::default(),
            force_token_env: None,
            engine_override: None,
            force_strict: false,
        };
        compile_and_update(&entry, dir.path(), &lock_path, &options).unwrap();
        let second = compile_and_update(&entry, dir.path(), &lock_path, &options).unwrap();
        assert_eq!(second, Outcome::Unchanged);
    }

    #[test]
    fn outcome_of_maps_error_to_failed() {
        let err: Result<Outcome, CompileError> = Err(CompileError::SourceNotFound {
            path: std::path::PathBuf::from("x"),
        });
        assert_eq!(outcome_of(&err), Outcome::Failed);
    }

    #[test]
    fn purge_removes_locks_with_no_matching_source() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(dir.path(), "kept.md", "---\nname: K\n---\nbody\n");
        std::fs::write(dir.path().join("kept.lock.yml"), "name: K\n").unwrap();
        std::fs::write(dir.path().join("orphan.lock.yml"), "name: O\n").unwrap();

        let removed = purge_orphan_locks(dir.path()).unwrap();

        assert_eq!(removed, vec![dir.path().join("orphan.lock.yml")]);
        assert!(dir.path().join("kept.lock.yml").exists());
        assert!(!dir.path().join("orphan.lock.yml").exists());
    }
}
