//! Assembles the final job graph (§4.F): the optional permission-check
//! preamble, the agent job itself, and every safe-output handler job,
//! wired together with `needs:` edges.
//!
//! [`topo_sort`] mirrors the teacher's dependency-graph ordering (the
//! same shape used there to sequence package publication by dependency
//! order): a `BTreeMap<String, BTreeSet<String>>` adjacency map walked
//! with a visiting/finished split so a cycle is reported precisely
//! instead of overflowing the stack.

use std::collections::{BTreeMap, BTreeSet};

use aw_types::{Job, JobStep, Permissions, WorkflowData};
use indexmap::IndexMap;

use crate::engines::{self, EngineContext};
use crate::error::CompileError;
use crate::model::effective_agent_permissions;
use crate::safeoutputs::{self, SafeOutputsContext};

const PERMISSION_CHECK_JOB: &str = "check-permissions";
const AGENT_JOB: &str = "agent";

/// Paths baked into every emitted lock file for the runtime artifacts the
/// agent job produces and the safe-output jobs consume.
pub struct RuntimePaths {
    pub prompt_path: String,
    pub mcp_config_path: String,
    pub safe_outputs_path: String,
}

impl Default for RuntimePaths {
    fn default() -> Self {
        Self {
            prompt_path: "/tmp/aw-prompts/prompt.md".to_string(),
            mcp_config_path: "/tmp/mcp-config/mcp-servers.json".to_string(),
            safe_outputs_path: "/tmp/aw-safe-outputs/outputs.jsonl".to_string(),
        }
    }
}

fn permission_check_job(runs_on: &str) -> Job {
    let script = r#"const actor = context.actor;
const { data: perm } = await github.rest.repos.getCollaboratorPermissionLevel({
  owner: context.repo.owner,
  repo: context.repo.repo,
  username: actor,
});
const allowed = ['admin', 'write'].includes(perm.permission);
core.setOutput('allowed', String(allowed));
if (!allowed) core.setFailed(`actor ${actor} lacks write access`);
"#
    .to_string();
    let mut with = IndexMap::new();
    with.insert("script".to_string(), serde_json::json!(script));
    Job {
        name: "check permissions".to_string(),
        runs_on: runs_on.to_string(),
        permissions: Permissions::contents_read_only(),
        outputs: IndexMap::from([(
            "allowed".to_string(),
            "${{ steps.check.outputs.allowed }}".to_string(),
        )]),
        steps: vec![JobStep {
            name: Some("Check actor permission".to_string()),
            id: Some("check".to_string()),
            uses: Some("actions/github-script@v7".to_string()),
            with,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn write_file_step(name: &str, path: &str, content: &str) -> JobStep {
    let script = format!(
        "const fs = require('fs');\nconst path = require('path');\nfs.mkdirSync(path.dirname({path:?}), {{ recursive: true }});\nfs.writeFileSync({path:?}, {content:?});\n",
        path = path,
        content = content,
    );
    let mut with = IndexMap::new();
    with.insert("script".to_string(), serde_json::json!(script));
    JobStep {
        name: Some(name.to_string()),
        uses: Some("actions/github-script@v7".to_string()),
        with,
        ..Default::default()
    }
}

fn agent_job(
    data: &WorkflowData,
    runs_on: &str,
    needs_permission_check: bool,
    paths: &RuntimePaths,
    prompt_body: &str,
    mcp_manifest_json: Option<&str>,
) -> Job {
    let ctx = EngineContext {
        data,
        prompt_path: &paths.prompt_path,
        mcp_config_path: &paths.mcp_config_path,
        safe_outputs_path: &paths.safe_outputs_path,
    };
    let adapter = engines::adapter_for(data.engine.id);

    let mut steps = vec![
        JobStep {
            name: Some("Checkout".to_string()),
            uses: Some("actions/checkout@v4".to_string()),
            ..Default::default()
        },
        write_file_step("Write prompt", &paths.prompt_path, prompt_body),
    ];
    if let Some(manifest) = mcp_manifest_json {
        steps.push(write_file_step(
            "Write MCP gateway config",
            &paths.mcp_config_path,
            manifest,
        ));
    }
    steps.extend(adapter.build_steps(&ctx));

    Job {
        name: "agent".to_string(),
        needs: if needs_permission_check {
            vec![PERMISSION_CHECK_JOB.to_string()]
        } else {
            Vec::new()
        },
        r#if: needs_permission_check
            .then(|| format!("needs.{PERMISSION_CHECK_JOB}.outputs.allowed == 'true'")),
        runs_on: runs_on.to_string(),
        permissions: effective_agent_permissions(data),
        timeout_minutes: data.timeout_minutes,
        env: data.env.clone(),
        steps,
        ..Default::default()
    }
}

/// Build every job in the lock file, in insertion order
/// (`check-permissions` if needed, `agent`, then each safe-output
/// handler).
pub fn build_jobs(
    data: &WorkflowData,
    paths: &RuntimePaths,
    prompt_body: &str,
    mcp_manifest_json: Option<&str>,
    force_token_env: Option<&str>,
) -> Result<IndexMap<String, Job>, CompileError> {
    let runs_on = data.runs_on.clone().unwrap_or_else(|| "ubuntu-latest".to_string());
    let needs_permission_check = !data.on.bypasses_permission_check();

    let mut jobs = IndexMap::new();
    if needs_permission_check {
        jobs.insert(
            PERMISSION_CHECK_JOB.to_string(),
            permission_check_job(&runs_on),
        );
    }
    jobs.insert(
        AGENT_JOB.to_string(),
        agent_job(
            data,
            &runs_on,
            needs_permission_check,
            paths,
            prompt_body,
            mcp_manifest_json,
        ),
    );

    let safe_output_runs_on = data
        .safe_outputs
        .runs_on
        .clone()
        .unwrap_or_else(|| runs_on.clone());
    let so_ctx = SafeOutputsContext {
        data,
        runs_on: &safe_output_runs_on,
        force_token_env,
    };
    for job in safeoutputs::plan_jobs(&so_ctx)? {
        let key = job
            .name
            .strip_prefix("safe-output: ")
            .unwrap_or(&job.name)
            .to_string();
        jobs.insert(key, job);
    }

    validate_dag(&jobs)?;
    Ok(jobs)
}

/// Verify every `needs:` edge points at a job that exists and that the
/// graph has no cycle, returning the topological order.
pub fn validate_dag(jobs: &IndexMap<String, Job>) -> Result<Vec<String>, CompileError> {
    let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (name, job) in jobs {
        let mut needs = BTreeSet::new();
        for need in &job.needs {
            if !jobs.contains_key(need) {
                return Err(CompileError::SchemaViolation {
                    path: Default::default(),
                    detail: format!("job `{name}` needs unknown job `{need}`"),
                });
            }
            needs.insert(need.clone());
        }
        deps.insert(name.clone(), needs);
    }

    topo_sort(&deps).map_err(|cycle| CompileError::SchemaViolation {
        path: Default::default(),
        detail: format!("job dependency cycle: {cycle}"),
    })
}

fn topo_sort(deps: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, String> {
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
    let mut order = Vec::new();

    fn visit<'a>(
        node: &'a str,
        deps: &'a BTreeMap<String, BTreeSet<String>>,
        marks: &mut BTreeMap<&'a str, Mark>,
        order: &mut Vec<String>,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), String> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let pos = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<&str> = stack[pos..].to_vec();
                cycle.push(node);
                return Err(cycle.join(" -> "));
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        if let Some(children) = deps.get(node) {
            for child in children {
                visit(child, deps, marks, order, stack)?;
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        order.push(node.to_string());
        Ok(())
    }

    let mut stack = Vec::new();
    for node in deps.keys() {
        visit(node, deps, &mut marks, &mut order, &mut stack)?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow(yaml: &str) -> WorkflowData {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn build_jobs_includes_permission_check_for_comment_trigger() {
        let data = workflow("name: T\non: { issue_comment: {} }\nengine: claude\n");
        let jobs = build_jobs(&data, &RuntimePaths::default(), "prompt body", None, None).unwrap();
        assert!(jobs.contains_key(PERMISSION_CHECK_JOB));
        assert_eq!(jobs[AGENT_JOB].needs, vec![PERMISSION_CHECK_JOB.to_string()]);
    }

    #[test]
    fn build_jobs_skips_permission_check_for_schedule_trigger() {
        let data = workflow("name: T\non: { schedule: [] }\nengine: claude\n");
        let jobs = build_jobs(&data, &RuntimePaths::default(), "prompt body", None, None).unwrap();
        assert!(!jobs.contains_key(PERMISSION_CHECK_JOB));
        assert!(jobs[AGENT_JOB].needs.is_empty());
    }

    #[test]
    fn safe_output_jobs_follow_agent_in_the_graph() {
        let data = workflow(
            "name: T\non: { issues: {} }\nengine: claude\nsafe-outputs:\n  create-issue: {}\n",
        );
        let jobs = build_jobs(&data, &RuntimePaths::default(), "prompt body", None, None).unwrap();
        assert!(jobs.contains_key("create-issue"));
        assert_eq!(jobs["create-issue"].needs, vec!["agent".to_string()]);
    }

    #[test]
    fn topo_sort_detects_a_cycle() {
        let mut deps = BTreeMap::new();
        deps.insert("a".to_string(), BTreeSet::from(["b".to_string()]));
        deps.insert("b".to_string(), BTreeSet::from(["a".to_string()]));
        assert!(topo_sort(&deps).is_err());
    }

    #[test]
    fn topo_sort_orders_dependencies_before_dependents() {
        let mut deps = BTreeMap::new();
        deps.insert("agent".to_string(), BTreeSet::new());
        deps.insert(
            "create-issue".to_string(),
            BTreeSet::from(["agent".to_string()]),
        );
        let order = topo_sort(&deps).unwrap();
        let agent_pos = order.iter().position(|n| n == "agent").unwrap();
        let issue_pos = order.iter().position(|n| n == "create-issue").unwrap();
        assert!(agent_pos < issue_pos);
    }
}
