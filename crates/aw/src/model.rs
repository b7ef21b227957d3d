//! Builds and validates the final [`WorkflowData`] model from merged
//! frontmatter (§4.B).
//!
//! This is the single place defaults get applied and cross-field rules
//! get enforced; everything downstream (engine adapters, the MCP gateway
//! builder, the safe-output planner, the job graph) consumes an already-
//! valid [`WorkflowData`] and never re-checks these invariants itself.

use std::path::Path;

use aw_types::{EngineConfig, EngineId, Permissions, WorkflowData};

use crate::error::CompileError;

/// Environment variable names a safe-output job always needs to control
/// itself; `safe-outputs.env` may not redefine any of these (Open
/// Question 2, resolved in favor of a strict deny-list — see
/// `DESIGN.md`).
pub const RESERVED_SAFE_OUTPUT_ENV_KEYS: &[&str] = &[
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "GH_AW_GITHUB_TOKEN",
    "GITHUB_AW_SAFE_OUTPUTS",
    "GITHUB_REPOSITORY",
    "GITHUB_RUN_ID",
    "GITHUB_SERVER_URL",
];

/// Deserialize merged frontmatter into a [`WorkflowData`], applying
/// structural defaults (`engine: claude` when absent, empty permissions,
/// `network: defaults`) via `serde`'s own `#[serde(default)]` handling,
/// then running the cross-field checks that go beyond what a derived
/// `Deserialize` impl can express.
pub fn build_model(path: &Path, merged: serde_yaml::Value) -> Result<WorkflowData, CompileError> {
    let mut data: WorkflowData =
        serde_yaml::from_value(merged).map_err(|e| CompileError::SchemaViolation {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    if data.name.trim().is_empty() {
        return Err(CompileError::SchemaViolation {
            path: path.to_path_buf(),
            detail: "`name` must not be empty".to_string(),
        });
    }

    apply_engine_defaults(&mut data.engine);
    validate_triggers(path, &data)?;
    validate_strict_mode(path, &data)?;
    validate_safe_output_env(path, &data)?;
    validate_permissions(path, &data)?;

    Ok(data)
}

pub(crate) fn apply_engine_defaults(engine: &mut EngineConfig) {
    if engine.model.is_none() {
        engine.model = match engine.id {
            EngineId::Claude => Some("claude-sonnet-4-5".to_string()),
            EngineId::Codex => Some("gpt-5-codex".to_string()),
            EngineId::Copilot => Some("copilot-default".to_string()),
            EngineId::Custom => None,
        };
    }
}

/// §4.B: an unattended workflow (its sole trigger is `schedule`,
/// `workflow_dispatch`, or `command`) must not grant any `write`
/// permission, since there is no human in the loop approving the run.
fn validate_triggers(path: &Path, data: &WorkflowData) -> Result<(), CompileError> {
    if data.on.has_single_unattended_trigger() && data.permissions.has_any_write() {
        return Err(CompileError::SchemaViolation {
            path: path.to_path_buf(),
            detail: "a workflow whose sole trigger is schedule/workflow_dispatch/command \
                     may not declare write permissions directly; use safe-outputs instead"
                .to_string(),
        });
    }
    Ok(())
}

pub(crate) fn validate_strict_mode(path: &Path, data: &WorkflowData) -> Result<(), CompileError> {
    if !data.strict {
        return Ok(());
    }
    if data.timeout_minutes.is_none() {
        return Err(CompileError::StrictModeViolation {
            path: path.to_path_buf(),
            detail: "timeout-missing: `timeout-minutes` is required under `strict: true`"
                .to_string(),
        });
    }
    if data.network.has_wildcard() {
        return Err(CompileError::StrictModeViolation {
            path: path.to_path_buf(),
            detail: "network allowlist may not contain a wildcard under `strict: true`"
                .to_string(),
        });
    }
    for (name, server) in &data.mcp_servers {
        if server.allowed.is_wildcard() {
            return Err(CompileError::StrictModeViolation {
                path: path.to_path_buf(),
                detail: format!(
                    "mcp-servers.{name}.allowed may not be `[\"*\"]` under `strict: true`"
                ),
            });
        }
    }
    Ok(())
}

fn validate_safe_output_env(path: &Path, data: &WorkflowData) -> Result<(), CompileError> {
    for key in data.safe_outputs.env.keys() {
        if RESERVED_SAFE_OUTPUT_ENV_KEYS.contains(&key.as_str()) {
            return Err(CompileError::SafeOutputInvalid {
                path: path.to_path_buf(),
                detail: format!("safe-outputs.env may not redefine reserved key `{key}`"),
            });
        }
    }
    Ok(())
}

/// The agent job always runs with at most `contents: read`; anything
/// else it needs must go through a safe-output, never direct
/// `permissions:` escalation (§3 Invariant, §4.B).
fn validate_permissions(path: &Path, data: &WorkflowData) -> Result<(), CompileError> {
    if data.permissions.has_any_write() && data.safe_outputs.has_any_besides_missing_tool() {
        return Err(CompileError::SchemaViolation {
            path: path.to_path_buf(),
            detail: "a workflow may declare write permissions directly or use safe-outputs, \
                     not both"
                .to_string(),
        });
    }
    Ok(())
}

/// The effective job-level permissions after applying the
/// read-only-by-default rule: the agent job itself never receives more
/// than `contents: read` plus whatever the workflow explicitly granted
/// that isn't a safe-output concern.
pub fn effective_agent_permissions(data: &WorkflowData) -> Permissions {
    let mut perms = Permissions::contents_read_only();
    if !data.safe_outputs.has_any_besides_missing_tool() {
        // No safe-outputs in play: honor whatever the workflow declared
        // directly (already validated not to conflict with safe-outputs
        // above).
        perms = data.permissions.clone();
        if perms.contents.is_none() {
            perms.contents = Some(aw_types::Level::Read);
        }
    }
    perms
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(yaml: &str) -> serde_yaml::Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn rejects_empty_name() {
        let merged = parse("name: \"\"\non: { push: {} }\nengine: claude\n");
        let err = build_model(&PathBuf::from("wf.md"), merged).unwrap_err();
        assert!(matches!(err, CompileError::SchemaViolation { .. }));
    }

    #[test]
    fn applies_default_model_for_claude() {
        let merged = parse("name: Test\non: { push: {} }\nengine: claude\n");
        let data = build_model(&PathBuf::from("wf.md"), merged).unwrap();
        assert_eq!(data.engine.model.as_deref(), Some("claude-sonnet-4-5"));
    }

    #[test]
    fn unattended_trigger_with_write_permission_is_rejected() {
        let merged = parse(
            "name: Test\non: { schedule: [] }\nengine: claude\npermissions:\n  contents: write\n",
        );
        let err = build_model(&PathBuf::from("wf.md"), merged).unwrap_err();
        assert!(matches!(err, CompileError::SchemaViolation { .. }));
    }

    #[test]
    fn strict_mode_rejects_network_wildcard() {
        let merged = parse(
            "name: Test\non: { push: {} }\nengine: claude\nstrict: true\ntimeout-minutes: 10\nnetwork:\n  mode: allowlist\n  allowed: [\"*\"]\n",
        );
        let err = build_model(&PathBuf::from("wf.md"), merged).unwrap_err();
        assert!(matches!(err, CompileError::StrictModeViolation { .. }));
    }

    #[test]
    fn strict_mode_rejects_missing_timeout() {
        let merged = parse("name: Test\non: { push: {} }\nengine: claude\nstrict: true\n");
        let err = build_model(&PathBuf::from("wf.md"), merged).unwrap_err();
        match err {
            CompileError::StrictModeViolation { detail, .. } => {
                assert!(detail.contains("timeout-missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reserved_safe_output_env_key_is_rejected() {
        let merged = parse(
            "name: Test\non: { push: {} }\nengine: claude\nsafe-outputs:\n  env:\n    GITHUB_TOKEN: evil\n  add-comment: {}\n",
        );
        let err = build_model(&PathBuf::from("wf.md"), merged).unwrap_err();
        assert!(matches!(err, CompileError::SafeOutputInvalid { .. }));
    }

    #[test]
    fn write_permissions_alongside_safe_outputs_is_rejected() {
        let merged = parse(
            "name: Test\non: { push: {} }\nengine: claude\npermissions:\n  contents: write\nsafe-outputs:\n  add-comment: {}\n",
        );
        let err = build_model(&PathBuf::from("wf.md"), merged).unwrap_err();
        assert!(matches!(err, CompileError::SchemaViolation { .. }));
    }

    #[test]
    fn effective_permissions_default_to_contents_read() {
        let merged = parse("name: Test\non: { push: {} }\nengine: claude\n");
        let data = build_model(&PathBuf::from("wf.md"), merged).unwrap();
        let perms = effective_agent_permissions(&data);
        assert_eq!(perms.contents, Some(aw_types::Level::Read));
        assert!(!perms.has_any_write());
    }
}
