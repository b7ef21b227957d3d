use aw_types::{EngineId, JobStep};
use indexmap::IndexMap;

use super::{EngineAdapter, EngineContext};

/// Runs the workflow prompt through OpenAI Codex via its CLI, installed
/// and invoked as a plain shell step rather than a marketplace action
/// (Codex has no first-party GitHub Action at time of writing).
pub struct CodexEngine;

impl EngineAdapter for CodexEngine {
    fn id(&self) -> EngineId {
        EngineId::Codex
    }

    fn build_steps(&self, ctx: &EngineContext<'_>) -> Vec<JobStep> {
        let model_flag = ctx
            .data
            .engine
            .model
            .as_deref()
            .map(|m| format!(" --model {m}"))
            .unwrap_or_default();
        let max_turns_flag = ctx
            .data
            .engine
            .max_turns
            .map(|n| format!(" --max-turns {n}"))
            .unwrap_or_default();

        let install = JobStep {
            name: Some("Install Codex CLI".to_string()),
            run: Some("npm install -g @openai/codex-cli".to_string()),
            ..Default::default()
        };

        let run = JobStep {
            name: Some("Run Codex".to_string()),
            id: Some("agent".to_string()),
            run: Some(format!(
                "codex exec --mcp-config {}{}{} < {}",
                ctx.mcp_config_path, model_flag, max_turns_flag, ctx.prompt_path
            )),
            env: super::common_env(ctx),
            with: IndexMap::new(),
            ..Default::default()
        };

        vec![install, run]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aw_types::WorkflowData;

    fn workflow() -> WorkflowData {
        serde_yaml::from_str(
            "name: T\non: { push: {} }\nengine:\n  id: codex\n  model: gpt-5-codex\n  maxTurns: 10\n",
        )
        .unwrap()
    }

    #[test]
    fn build_steps_includes_install_and_run() {
        let data = workflow();
        let ctx = EngineContext {
            data: &data,
            prompt_path: "/tmp/prompt.md",
            mcp_config_path: "/tmp/mcp.json",
            safe_outputs_path: "/tmp/safe.jsonl",
        };
        let steps = CodexEngine.build_steps(&ctx);
        assert_eq!(steps.len(), 2);
        let run = &steps[1];
        assert!(run.run.as_deref().unwrap().contains("--model gpt-5-codex"));
        assert!(run.run.as_deref().unwrap().contains("--max-turns 10"));
    }
}
