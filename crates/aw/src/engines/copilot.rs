use aw_types::{EngineId, JobStep};
use indexmap::IndexMap;

use super::{EngineAdapter, EngineContext};

/// Runs the workflow prompt through GitHub Copilot's coding agent action.
pub struct CopilotEngine;

impl EngineAdapter for CopilotEngine {
    fn id(&self) -> EngineId {
        EngineId::Copilot
    }

    fn build_steps(&self, ctx: &EngineContext<'_>) -> Vec<JobStep> {
        let mut with = IndexMap::new();
        with.insert(
            "prompt-file".to_string(),
            serde_json::json!(ctx.prompt_path),
        );
        with.insert(
            "mcp-config".to_string(),
            serde_json::json!(ctx.mcp_config_path),
        );
        if let Some(model) = &ctx.data.engine.model {
            with.insert("model".to_string(), serde_json::json!(model));
        }

        vec![JobStep {
            name: Some("Run Copilot".to_string()),
            id: Some("agent".to_string()),
            uses: Some("github/copilot-coding-agent-action@v1".to_string()),
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

    #[test]
    fn build_steps_uses_copilot_action() {
        let data: WorkflowData =
            serde_yaml::from_str("name: T\non: { push: {} }\nengine: copilot\n").unwrap();
        let ctx = EngineContext {
            data: &data,
            prompt_path: "/tmp/p.md",
            mcp_config_path: "/tmp/m.json",
            safe_outputs_path: "/tmp/s.jsonl",
        };
        let steps = CopilotEngine.build_steps(&ctx);
        assert_eq!(
            steps[0].uses.as_deref(),
            Some("github/copilot-coding-agent-action@v1")
        );
    }
}
