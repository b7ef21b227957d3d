use aw_types::{EngineId, JobStep};
use indexmap::IndexMap;

use super::{EngineAdapter, EngineContext};

/// Runs the workflow prompt through Claude Code via its official GitHub
/// Action.
pub struct ClaudeEngine;

impl EngineAdapter for ClaudeEngine {
    fn id(&self) -> EngineId {
        EngineId::Claude
    }

    fn build_steps(&self, ctx: &EngineContext<'_>) -> Vec<JobStep> {
        let mut with = IndexMap::new();
        with.insert(
            "prompt_file".to_string(),
            serde_json::json!(ctx.prompt_path),
        );
        with.insert(
            "mcp_config".to_string(),
            serde_json::json!(ctx.mcp_config_path),
        );
        if let Some(model) = &ctx.data.engine.model {
            with.insert("model".to_string(), serde_json::json!(model));
        }
        if let Some(max_turns) = ctx.data.engine.max_turns {
            with.insert("max_turns".to_string(), serde_json::json!(max_turns));
        }

        vec![JobStep {
            name: Some("Run Claude Code".to_string()),
            id: Some("agent".to_string()),
            uses: Some("anthropics/claude-code-action@v1".to_string()),
            with,
            env: super::common_env(ctx),
            ..Default::default()
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aw_types::WorkflowData;

    fn workflow() -> WorkflowData {
        serde_yaml::from_str("name: T\non: { push: {} }\nengine: claude\n").unwrap()
    }

    #[test]
    fn build_steps_passes_prompt_and_mcp_config() {
        let data = workflow();
        let ctx = EngineContext {
            data: &data,
            prompt_path: "/tmp/prompt.md",
            mcp_config_path: "/tmp/mcp-config/mcp-servers.json",
            safe_outputs_path: "/tmp/safe-outputs.jsonl",
        };
        let steps = ClaudeEngine.build_steps(&ctx);
        assert_eq!(steps.len(), 1);
        assert_eq!(
            steps[0].with.get("prompt_file").unwrap(),
            "/tmp/prompt.md"
        );
        assert_eq!(
            steps[0].uses.as_deref(),
            Some("anthropics/claude-code-action@v1")
        );
    }
}
