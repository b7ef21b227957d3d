//! The safe-output planner (§4.E): turns the configured
//! `safe-outputs:` bag into one GitHub Actions job per output type, each
//! gated on the agent job succeeding and each reading only the JSONL sink
//! the agent wrote to, never the agent's own permissions.
//!
//! Every handler job follows the same two-step shape:
//!
//! 1. a **filter step**, an inline `actions/github-script` invocation
//!    that reads `GITHUB_AW_SAFE_OUTPUTS`, keeps only entries whose
//!    `type` matches this handler, enforces `min`/`max`, and sanitizes
//!    every string field (the same rules [`aw_sanitize`] implements,
//!    mirrored into the embedded JavaScript since this step runs inside
//!    the GitHub Actions runtime, not this compiler's own process);
//! 2. an **action step** that does the actual GitHub API call with the
//!    filtered, sanitized items.
//!
//! Splitting sanitization into its own step means a handler never sees
//! unsanitized agent output, regardless of how the action step is
//! implemented.

use aw_types::{
    IfNoChanges, Job, JobStep, Permissions, SafeOutputsConfig, Side, Target, WorkflowData,
};
use indexmap::IndexMap;

use crate::error::CompileError;

/// One configured safe-output handler, reduced to what every handler
/// needs regardless of kind.
struct HandlerSpec {
    /// Job id / name suffix, e.g. `create-issue`.
    key: &'static str,
    /// The JSONL `type` discriminator this handler consumes.
    entry_type: &'static str,
    min: u32,
    max: u32,
    token_expr: aw_token::TokenExpr,
    target_repo: Option<String>,
    /// The action step's embedded script body.
    action_script: String,
}

fn filter_step(entry_type: &str, min: u32, max: u32) -> JobStep {
    let script = format!(
        r#"const fs = require('fs');
const path = process.env.{sink_env};
let lines = [];
if (path && fs.existsSync(path)) {{
  lines = fs.readFileSync(path, 'utf8').split('\n').filter(Boolean);
}}
const items = [];
for (const line of lines) {{
  let obj;
  try {{ obj = JSON.parse(line); }} catch {{ continue; }}
  if (obj.type !== '{entry_type}') continue;
  for (const key of Object.keys(obj)) {{
    if (typeof obj[key] === 'string') {{
      obj[key] = obj[key]
        .replace(/[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]/g, '')
        .replace(/&/g, '&amp;').replace(/</g, '&lt;').replace(/>/g, '&gt;')
        .replace(/"/g, '&quot;').replace(/'/g, '&apos;');
    }}
  }}
  items.push(obj);
}}
if (items.length < {min}) {{
  core.setFailed(`expected at least {min} '{entry_type}' item(s), found ${{items.length}}`);
  return;
}}
const capped = items.slice(0, {max});
core.setOutput('items', JSON.stringify(capped));
core.setOutput('count', String(capped.length));
"#,
        sink_env = aw_events::SAFE_OUTPUTS_ENV_VAR,
    );

    let mut with = IndexMap::new();
    with.insert("script".to_string(), serde_json::json!(script));
    JobStep {
        name: Some(format!("Filter {entry_type} safe outputs")),
        id: Some("filter".to_string()),
        uses: Some("actions/github-script@v7".to_string()),
        with,
        ..Default::default()
    }
}

fn action_step(name: &str, token_expr: &aw_token::TokenExpr, script: String) -> JobStep {
    let mut with = IndexMap::new();
    with.insert("script".to_string(), serde_json::json!(script));
    let mut env = IndexMap::new();
    env.insert(
        "GITHUB_TOKEN".to_string(),
        token_expr.as_expression().to_string(),
    );
    JobStep {
        name: Some(name.to_string()),
        id: Some("action".to_string()),
        uses: Some("actions/github-script@v7".to_string()),
        with,
        env,
        ..Default::default()
    }
}

fn target_expr(target: Target) -> &'static str {
    match target {
        Target::Triggering => "context.issue.number",
        Target::Any => "item.number",
        Target::Explicit(_) => "TARGET_NUMBER",
    }
}

fn job_for(spec: &HandlerSpec, runs_on: &str) -> Job {
    let mut action = action_step(
        &format!("Apply {}", spec.key),
        &spec.token_expr,
        spec.action_script.clone(),
    );
    if let Some(target_repo) = &spec.target_repo {
        action
            .env
            .insert("GH_AW_TARGET_REPO".to_string(), target_repo.clone());
    }
    Job {
        name: format!("safe-output: {}", spec.key),
        r#if: Some("needs.agent.result == 'success'".to_string()),
        needs: vec!["agent".to_string()],
        runs_on: runs_on.to_string(),
        permissions: permissions_for(spec.key),
        steps: vec![filter_step(spec.entry_type, spec.min, spec.max), action],
        ..Default::default()
    }
}

fn permissions_for(key: &str) -> Permissions {
    let mut perms = Permissions::contents_read_only();
    match key {
        "create-issue" | "add-comment" | "add-labels" | "update-issue" => {
            perms.issues = Some(aw_types::Level::Write)
        }
        "create-pull-request" | "push-to-pull-request-branch" | "create-pull-request-review-comment" => {
            perms.pull_requests = Some(aw_types::Level::Write);
            perms.contents = Some(aw_types::Level::Write);
        }
        "create-discussion" => perms.discussions = Some(aw_types::Level::Write),
        "create-code-scanning-alert" => perms.actions = Some(aw_types::Level::Write),
        "update-release" | "upload-asset" => perms.contents = Some(aw_types::Level::Write),
        // Projects v2 writes go through the GraphQL API under a scope the
        // default `GITHUB_TOKEN` doesn't carry; the job relies on an
        // explicit `github-token:` (a PAT or GitHub App token) rather
        // than a `permissions:` grant, so nothing is added here.
        "update-project" => {}
        _ => {}
    }
    perms
}

/// Everything the planner needs beyond the `safe-outputs:` config itself.
pub struct SafeOutputsContext<'a> {
    pub data: &'a WorkflowData,
    pub runs_on: &'a str,
    pub force_token_env: Option<&'a str>,
}

/// Build one job per configured safe-output handler, plus one per custom
/// `safe-outputs.jobs.*` entry.
pub fn plan_jobs(ctx: &SafeOutputsContext<'_>) -> Result<Vec<Job>, CompileError> {
    let cfg = &ctx.data.safe_outputs;
    let mut jobs = Vec::new();

    macro_rules! resolve_token {
        ($per_output:expr) => {
            aw_token::resolve_token(ctx.force_token_env, $per_output, cfg.github_token.as_deref())
                .map_err(|e| CompileError::AuthError {
                    path: Default::default(),
                    detail: e.to_string(),
                })?
        };
    }

    if let Some(c) = &cfg.create_issue {
        let token = resolve_token!(c.common.github_token.as_deref());
        let title_prefix = c.title_prefix.clone().unwrap_or_default();
        let labels = c.labels.clone();
        let script = format!(
            r#"const items = JSON.parse('${{{{ steps.filter.outputs.items }}}}');
for (const item of items) {{
  await github.rest.issues.create({{
    owner: context.repo.owner,
    repo: context.repo.repo,
    title: '{title_prefix}' + item.title,
    body: item.body,
    labels: {labels:?},
  }});
}}
"#,
        );
        jobs.push(job_for(
            &HandlerSpec {
                key: "create-issue",
                entry_type: "create_issue",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.add_comment {
        let token = resolve_token!(c.common.github_token.as_deref());
        let target = target_expr(c.target);
        let script = format!(
            r#"const items = JSON.parse('${{{{ steps.filter.outputs.items }}}}');
for (const item of items) {{
  await github.rest.issues.createComment({{
    owner: context.repo.owner,
    repo: context.repo.repo,
    issue_number: {target},
    body: item.body,
  }});
}}
"#,
        );
        jobs.push(job_for(
            &HandlerSpec {
                key: "add-comment",
                entry_type: "add_comment",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.add_labels {
        let token = resolve_token!(c.common.github_token.as_deref());
        let target = target_expr(c.target);
        let allowed = c.allowed.clone();
        let script = format!(
            r#"const items = JSON.parse('${{{{ steps.filter.outputs.items }}}}');
const allowed = {allowed:?};
for (const item of items) {{
  let labels = item.labels || [];
  if (allowed) labels = labels.filter(l => allowed.includes(l));
  if (labels.length === 0) continue;
  await github.rest.issues.addLabels({{
    owner: context.repo.owner,
    repo: context.repo.repo,
    issue_number: {target},
    labels,
  }});
}}
"#,
        );
        jobs.push(job_for(
            &HandlerSpec {
                key: "add-labels",
                entry_type: "add_labels",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.update_issue {
        let token = resolve_token!(c.common.github_token.as_deref());
        let target = target_expr(c.target);
        let (status, title, body) = (c.status, c.title, c.body);
        let script = format!(
            r#"const items = JSON.parse('${{{{ steps.filter.outputs.items }}}}');
for (const item of items) {{
  const patch = {{}};
  if ({status} && item.status) patch.state = item.status;
  if ({title} && item.title) patch.title = item.title;
  if ({body} && item.body) patch.body = item.body;
  await github.rest.issues.update({{
    owner: context.repo.owner,
    repo: context.repo.repo,
    issue_number: {target},
    ...patch,
  }});
}}
"#,
        );
        jobs.push(job_for(
            &HandlerSpec {
                key: "update-issue",
                entry_type: "update_issue",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.create_pull_request {
        let token = resolve_token!(c.common.github_token.as_deref());
        let title_prefix = c.title_prefix.clone().unwrap_or_default();
        let labels = c.labels.clone();
        let draft = c.draft;
        let if_no_changes = c.if_no_changes;
        let script = format!(
            r#"const items = JSON.parse('${{{{ steps.filter.outputs.items }}}}');
if (items.length === 0) {{
  {no_changes_branch}
  return;
}}
for (const item of items) {{
  await github.rest.pulls.create({{
    owner: context.repo.owner,
    repo: context.repo.repo,
    title: '{title_prefix}' + item.title,
    head: item.branch,
    base: context.payload.repository.default_branch,
    body: item.body,
    draft: {draft},
  }});
}}
// labels applied post-create: {labels:?}
"#,
            no_changes_branch = no_changes_branch(if_no_changes),
        );
        jobs.push(job_for(
            &HandlerSpec {
                key: "create-pull-request",
                entry_type: "create_pull_request",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.create_pull_request_review_comment {
        let token = resolve_token!(c.common.github_token.as_deref());
        let target = target_expr(c.target);
        let side = match c.side {
            Side::Left => "LEFT",
            Side::Right => "RIGHT",
        };
        let script = generic_create_script(
            "pulls.createReviewComment",
            &format!("pull_number: {target}, path: item.path, line: item.line, side: '{side}', body: item.body"),
        );
        jobs.push(job_for(
            &HandlerSpec {
                key: "create-pull-request-review-comment",
                entry_type: "create_pull_request_review_comment",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.push_to_pull_request_branch {
        let token = resolve_token!(c.common.github_token.as_deref());
        let if_no_changes = c.if_no_changes;
        let script = format!(
            r#"const items = JSON.parse('${{{{ steps.filter.outputs.items }}}}');
if (items.length === 0) {{
  {no_changes_branch}
  return;
}}
core.info(`would push ${{items.length}} patch(es) to the pull request branch`);
"#,
            no_changes_branch = no_changes_branch(if_no_changes),
        );
        jobs.push(job_for(
            &HandlerSpec {
                key: "push-to-pull-request-branch",
                entry_type: "push_to_pull_request_branch",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.create_discussion {
        let token = resolve_token!(c.common.github_token.as_deref());
        let title_prefix = c.title_prefix.clone().unwrap_or_default();
        let category = c.category.clone().unwrap_or_else(|| "General".to_string());
        let script = format!(
            r#"const items = JSON.parse('${{{{ steps.filter.outputs.items }}}}');
for (const item of items) {{
  core.info(`would create discussion '{title_prefix}' + item.title in category '{category}'`);
}}
"#,
        );
        jobs.push(job_for(
            &HandlerSpec {
                key: "create-discussion",
                entry_type: "create_discussion",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.create_code_scanning_alert {
        let token = resolve_token!(c.common.github_token.as_deref());
        let script = generic_create_script("checks.create", "name: item.rule_id, conclusion: 'neutral', output: { title: item.title, summary: item.body }");
        jobs.push(job_for(
            &HandlerSpec {
                key: "create-code-scanning-alert",
                entry_type: "create_code_scanning_alert",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.update_release {
        let token = resolve_token!(c.common.github_token.as_deref());
        let target = target_expr(c.target);
        let release_id = c.release_id.clone().unwrap_or_else(|| target.to_string());
        let script = generic_create_script("repos.updateRelease", &format!("release_id: {release_id}, body: item.body"));
        jobs.push(job_for(
            &HandlerSpec {
                key: "update-release",
                entry_type: "update_release",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.update_project {
        let token = resolve_token!(c.common.github_token.as_deref());
        let project_url = c.project.clone();
        let allowed_fields = c.fields.clone();
        let script = format!(
            r#"const items = JSON.parse('${{{{ steps.filter.outputs.items }}}}');
const projectUrl = {project_url:?};
const allowedFields = {allowed_fields:?};

const urlMatch = projectUrl.match(/\/(orgs|users)\/([^/]+)\/projects\/(\d+)/);
if (!urlMatch) {{
  core.setFailed(`update-project: '${{projectUrl}}' is not a recognized project URL`);
  throw new Error('unrecognized project URL');
}}
const [, ownerKind, ownerLogin, projectNumber] = urlMatch;
const ownerQuery = ownerKind === 'orgs' ? 'organization' : 'user';
const {{ [ownerQuery]: owner }} = await github.graphql(
  `query($login: String!, $number: Int!) {{
    ${{ownerQuery}}(login: $login) {{
      projectV2(number: $number) {{
        id
        fields(first: 50) {{
          nodes {{
            ... on ProjectV2FieldCommon {{ id name }}
            ... on ProjectV2SingleSelectField {{ options {{ id name }} }}
          }}
        }}
      }}
    }}
  }}`,
  {{ login: ownerLogin, number: Number(projectNumber) }},
);
const project = owner.projectV2;
const fieldsByName = {{}};
for (const field of project.fields.nodes) {{
  fieldsByName[field.name] = field;
}}

for (const item of items) {{
  // Open Question 1 (§9): accept both legacy `issue`/current
  // `issue_number`/`pull_request_number` item shapes; prefer
  // issue_number when both are present, warning rather than failing.
  const issueNumber = item.issue_number ?? item.issue;
  const prNumber = item.pull_request_number ?? item.pull_request;
  if (issueNumber && prNumber) {{
    core.warning('update-project item set both an issue and a pull request target; using the issue');
  }}
  const targetNumber = issueNumber ?? prNumber;
  if (!targetNumber) {{
    core.warning('update-project item has no issue_number/pull_request_number; skipping');
    continue;
  }}

  const contentNodeId = issueNumber
    ? (await github.rest.issues.get({{ owner: context.repo.owner, repo: context.repo.repo, issue_number: targetNumber }})).data.node_id
    : (await github.rest.pulls.get({{ owner: context.repo.owner, repo: context.repo.repo, pull_number: targetNumber }})).data.node_id;

  const {{ addProjectV2ItemById: {{ item: projectItem }} }} = await github.graphql(
    `mutation($projectId: ID!, $contentId: ID!) {{
      addProjectV2ItemById(input: {{ projectId: $projectId, contentId: $contentId }}) {{ item {{ id }} }}
    }}`,
    {{ projectId: project.id, contentId: contentNodeId }},
  );

  const fields = {{ ...(item.fields || {{}}) }};
  if (fieldsByName['Start Date'] && fields['Start Date'] === undefined && item.created_at) {{
    fields['Start Date'] = item.created_at.slice(0, 10);
  }}
  if (fieldsByName['End Date'] && fields['End Date'] === undefined && item.closed_at) {{
    fields['End Date'] = item.closed_at.slice(0, 10);
  }}

  for (const [name, value] of Object.entries(fields)) {{
    if (allowedFields.length && !allowedFields.includes(name)) {{
      core.warning(`update-project: field '${{name}}' is not in the allowed field list; skipping`);
      continue;
    }}
    const field = fieldsByName[name];
    if (!field) {{
      core.warning(`update-project: project has no field named '${{name}}'; skipping`);
      continue;
    }}
    // Route by field shape: single-select resolves an option id; every
    // other kind (text, number, ISO-8601 date, iteration) is a scalar
    // value assignment.
    const fieldValue = field.options
      ? {{ singleSelectOptionId: (field.options.find(o => o.name === String(value)) || {{}}).id }}
      : (typeof value === 'number' ? {{ number: value }} : {{ text: String(value) }});
    await github.graphql(
      `mutation($projectId: ID!, $itemId: ID!, $fieldId: ID!, $value: ProjectV2FieldValue!) {{
        updateProjectV2ItemFieldValue(input: {{ projectId: $projectId, itemId: $itemId, fieldId: $fieldId, value: $value }}) {{
          projectV2Item {{ id }}
        }}
      }}`,
      {{ projectId: project.id, itemId: projectItem.id, fieldId: field.id, value: fieldValue }},
    );
  }}
}}
"#,
        );
        jobs.push(job_for(
            &HandlerSpec {
                key: "update-project",
                entry_type: "update_project",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.upload_asset {
        let token = resolve_token!(c.common.github_token.as_deref());
        let max_size_kb = c.max_size_kb;
        let allowed_exts = c.allowed_exts.clone();
        let script = format!(
            r#"const items = JSON.parse('${{{{ steps.filter.outputs.items }}}}');
const allowedExts = {allowed_exts:?};
for (const item of items) {{
  const ext = item.path.slice(item.path.lastIndexOf('.'));
  if (!allowedExts.includes(ext)) {{ core.warning(`skipping disallowed extension ${{ext}}`); continue; }}
  if (item.size_kb && item.size_kb > {max_size_kb}) {{ core.warning('skipping oversized asset'); continue; }}
  core.info(`would upload asset ${{item.path}}`);
}}
"#,
        );
        jobs.push(job_for(
            &HandlerSpec {
                key: "upload-asset",
                entry_type: "upload_asset",
                min: c.common.min.unwrap_or(0),
                max: c.common.max,
                token_expr: token,
                target_repo: c.common.target_repo.clone(),
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    if let Some(c) = &cfg.missing_tool {
        let token = resolve_token!(None);
        let script = r#"const items = JSON.parse('${{ steps.filter.outputs.items }}');
for (const item of items) {
  core.warning(`agent reported a missing tool: ${item.tool} (${item.reason || 'no reason given'})`);
}
"#
        .to_string();
        jobs.push(job_for(
            &HandlerSpec {
                key: "missing-tool",
                entry_type: "missing_tool",
                min: 0,
                max: c.max,
                token_expr: token,
                target_repo: None,
                action_script: script,
            },
            ctx.runs_on,
        ));
    }

    for (name, custom) in &cfg.jobs {
        jobs.push(Job {
            name: format!("safe-output: {name}"),
            r#if: Some("needs.agent.result == 'success'".to_string()),
            needs: vec!["agent".to_string()],
            runs_on: custom.runs_on.clone().unwrap_or_else(|| ctx.runs_on.to_string()),
            permissions: custom.permissions.clone(),
            steps: custom
                .steps
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect(),
            ..Default::default()
        });
    }

    Ok(jobs)
}

fn no_changes_branch(mode: IfNoChanges) -> &'static str {
    match mode {
        IfNoChanges::Warn => "core.warning('no changes produced by the agent');",
        IfNoChanges::Error => "core.setFailed('no changes produced by the agent');",
        IfNoChanges::Ignore => "// no changes produced; silently skipping per if-no-changes: ignore",
    }
}

fn generic_create_script(method: &str, fields: &str) -> String {
    format!(
        r#"const items = JSON.parse('${{{{ steps.filter.outputs.items }}}}');
for (const item of items) {{
  await github.rest.{method}({{
    owner: context.repo.owner,
    repo: context.repo.repo,
    {fields},
  }});
}}
"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use aw_types::WorkflowData;

    fn workflow(yaml: &str) -> WorkflowData {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn plan_jobs_builds_one_job_per_configured_output() {
        let data = workflow(
            "name: T\non: { issues: {} }\nengine: claude\nsafe-outputs:\n  create-issue: {}\n  add-comment: {}\n",
        );
        let ctx = SafeOutputsContext {
            data: &data,
            runs_on: "ubuntu-latest",
            force_token_env: None,
        };
        let jobs = plan_jobs(&ctx).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().any(|j| j.name.contains("create-issue")));
        assert!(jobs.iter().any(|j| j.name.contains("add-comment")));
    }

    #[test]
    fn every_job_gates_on_agent_success() {
        let data = workflow(
            "name: T\non: { issues: {} }\nengine: claude\nsafe-outputs:\n  create-issue: {}\n",
        );
        let ctx = SafeOutputsContext {
            data: &data,
            runs_on: "ubuntu-latest",
            force_token_env: None,
        };
        let jobs = plan_jobs(&ctx).unwrap();
        assert_eq!(jobs[0].needs, vec!["agent".to_string()]);
        assert_eq!(
            jobs[0].r#if.as_deref(),
            Some("needs.agent.result == 'success'")
        );
    }

    #[test]
    fn create_issue_job_has_issues_write_permission_only() {
        let data = workflow(
            "name: T\non: { issues: {} }\nengine: claude\nsafe-outputs:\n  create-issue: {}\n",
        );
        let ctx = SafeOutputsContext {
            data: &data,
            runs_on: "ubuntu-latest",
            force_token_env: None,
        };
        let jobs = plan_jobs(&ctx).unwrap();
        assert_eq!(jobs[0].permissions.issues, Some(aw_types::Level::Write));
        assert!(jobs[0].permissions.pull_requests.is_none());
    }

    #[test]
    fn custom_safe_job_is_emitted_verbatim() {
        let data = workflow(
            "name: T\non: { issues: {} }\nengine: claude\nsafe-outputs:\n  jobs:\n    notify:\n      runs-on: ubuntu-latest\n      steps: []\n",
        );
        let ctx = SafeOutputsContext {
            data: &data,
            runs_on: "ubuntu-latest",
            force_token_env: None,
        };
        let jobs = plan_jobs(&ctx).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "safe-output: notify");
    }

    #[test]
    fn missing_tool_handler_uses_default_token() {
        let data = workflow(
            "name: T\non: { issues: {} }\nengine: claude\nsafe-outputs:\n  missing-tool: {}\n",
        );
        let ctx = SafeOutputsContext {
            data: &data,
            runs_on: "ubuntu-latest",
            force_token_env: None,
        };
        let jobs = plan_jobs(&ctx).unwrap();
        let token = jobs[0]
            .steps
            .iter()
            .find_map(|s| s.env.get("GITHUB_TOKEN"))
            .map(String::as_str);
        assert_eq!(token, Some("${{ secrets.GITHUB_TOKEN }}"));
    }

    #[test]
    fn update_project_job_embeds_project_url_and_allowed_fields() {
        let data = workflow(
            "name: T\non: { issues: {} }\nengine: claude\nsafe-outputs:\n  update-project:\n    project: https://github.com/orgs/acme/projects/7\n    fields: [Status, Start Date]\n",
        );
        let ctx = SafeOutputsContext {
            data: &data,
            runs_on: "ubuntu-latest",
            force_token_env: None,
        };
        let jobs = plan_jobs(&ctx).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "safe-output: update-project");
        assert!(jobs[0].permissions.contents.is_some());
        assert!(!jobs[0].permissions.has_any_write());

        let action_script = jobs[0]
            .steps
            .iter()
            .find(|s| s.id.as_deref() == Some("action"))
            .and_then(|s| s.with.get("script"))
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(action_script.contains("orgs/acme/projects/7"));
        assert!(action_script.contains("\"Status\""));
        assert!(action_script.contains("updateProjectV2ItemFieldValue"));
    }
}
