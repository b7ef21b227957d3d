//! Renders and atomically writes the compiled GitHub Actions lock file
//! (§4.G).
//!
//! Emission is deterministic: job insertion order follows the
//! topological order [`crate::jobgraph::validate_dag`] already computed,
//! and `serde_yaml` over [`indexmap::IndexMap`] preserves that order
//! rather than re-sorting keys. A SHA-256 hash of the canonical YAML body
//! is recorded in a header comment (SPEC_FULL "Structural hash recorded
//! in the lock file header"), the same technique the teacher uses for its
//! plan identity hash, so `update` can tell at a glance whether
//! regenerating from source would change anything before doing the more
//! expensive three-way merge.

use std::io::Write as _;
use std::path::Path;

use aw_types::{Job, WorkflowData};
use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CompileError;

#[derive(Debug, Serialize)]
struct ConcurrencyBlock {
    group: String,
    #[serde(rename = "cancel-in-progress")]
    cancel_in_progress: bool,
}

#[derive(Debug, Serialize)]
struct LockDocument {
    name: String,
    on: serde_yaml::Value,
    concurrency: ConcurrencyBlock,
    jobs: IndexMap<String, Job>,
}

/// A fully rendered lock file, ready to be written to disk.
#[derive(Debug, Clone)]
pub struct LockFile {
    pub yaml: String,
    pub content_hash: String,
}

fn concurrency_for(data: &WorkflowData) -> ConcurrencyBlock {
    let group = data
        .concurrency
        .clone()
        .unwrap_or_else(|| format!("aw-{}-${{{{ github.ref }}}}", slug(&data.name)));
    ConcurrencyBlock {
        group,
        cancel_in_progress: true,
    }
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

fn on_value(data: &WorkflowData) -> serde_yaml::Value {
    let mut on = serde_yaml::Mapping::new();
    let mut events = data.on.events.clone();
    if data.on.command.is_some() && !events.contains_key("issue_comment") {
        events.insert(
            "issue_comment".to_string(),
            serde_json::json!({ "types": ["created"] }),
        );
    }
    for (k, v) in events {
        let yaml_v: serde_yaml::Value = serde_yaml::to_value(&v).unwrap_or(serde_yaml::Value::Null);
        on.insert(serde_yaml::Value::String(k), yaml_v);
    }
    serde_yaml::Value::Mapping(on)
}

/// Apply the `command:` trigger's slash-command gate to the agent job's
/// `if:` condition, so the agent only runs when the triggering comment
/// actually invokes it.
fn apply_command_gate(jobs: &mut IndexMap<String, Job>, data: &WorkflowData) {
    let Some(command) = &data.on.command else {
        return;
    };
    if let Some(agent) = jobs.get_mut("agent") {
        let gate = format!(
            "contains(github.event.comment.body, '/{}')",
            command.name
        );
        agent.r#if = Some(match agent.r#if.take() {
            Some(existing) => format!("({existing}) && {gate}"),
            None => gate,
        });
    }
}

/// Render `data` and its already-ordered `jobs` into a [`LockFile`].
pub fn render(
    data: &WorkflowData,
    mut jobs: IndexMap<String, Job>,
    order: &[String],
) -> Result<LockFile, CompileError> {
    apply_command_gate(&mut jobs, data);

    let mut ordered = IndexMap::new();
    for key in order {
        if let Some(job) = jobs.shift_remove(key) {
            ordered.insert(key.clone(), job);
        }
    }
    // anything validate_dag didn't see (shouldn't happen) is appended so
    // no job is silently dropped.
    ordered.extend(jobs);

    let doc = LockDocument {
        name: data.name.clone(),
        on: on_value(data),
        concurrency: concurrency_for(data),
        jobs: ordered,
    };

    let body = serde_yaml::to_string(&doc).map_err(|e| CompileError::EmissionError {
        path: Default::default(),
        detail: e.to_string(),
        source: None,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    let content_hash = hex::encode(hasher.finalize());

    let header = format!(
        "# This file is generated. Do not edit it directly; edit the source workflow instead.\n# sha256:{content_hash}\n"
    );

    Ok(LockFile {
        yaml: format!("{header}{body}"),
        content_hash,
    })
}

/// Write `lock` to `path` atomically: write to a sibling `.tmp` file,
/// `fsync`, then `rename` over the destination. Mirrors the teacher's
/// `atomic_write_json` so a crash mid-write never leaves a truncated
/// lock file behind.
pub fn write_atomically(path: &Path, lock: &LockFile) -> Result<(), CompileError> {
    let tmp_path = path.with_extension("lock.tmp");
    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(lock.yaml.as_bytes())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp_path, path)?;
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    };
    write().map_err(|e| CompileError::EmissionError {
        path: path.to_path_buf(),
        detail: e.to_string(),
        source: None,
    })
}
