//! Engine adapters (§4.C): strategy pattern over the handful of AI
//! engines a workflow's `engine:` frontmatter can select, each responsible
//! for rendering the step(s) that invoke it.
//!
//! The adapter registry is the one piece of process-wide state the
//! compiler keeps (SPEC_FULL "Configuration / CLI"): a fixed,
//! immutable-after-construction lookup from [`EngineId`] to adapter,
//! built once via [`std::sync::OnceLock`] rather than passed around by
//! every call site.

mod claude;
mod codex;
mod copilot;
mod custom;

use std::sync::OnceLock;

use aw_types::{EngineId, JobStep, WorkflowData};

/// What an engine adapter needs to render its invocation step(s).
pub struct EngineContext<'a> {
    pub data: &'a WorkflowData,
    pub prompt_path: &'a str,
    pub mcp_config_path: &'a str,
    pub safe_outputs_path: &'a str,
}

/// Renders the steps that run one engine against a prepared prompt.
pub trait EngineAdapter: Send + Sync {
    fn id(&self) -> EngineId;

    /// The step(s) that invoke this engine. Always at least one step;
    /// some engines (e.g. custom) may emit a short setup step plus the
    /// invocation itself.
    fn build_steps(&self, ctx: &EngineContext<'_>) -> Vec<JobStep>;

    /// Environment variables every invocation of this engine needs,
    /// beyond the MCP gateway and safe-outputs sink paths every engine
    /// gets regardless of which one it is.
    fn extra_env(&self, ctx: &EngineContext<'_>) -> indexmap::IndexMap<String, String> {
        let _ = ctx;
        indexmap::IndexMap::new()
    }
}

struct Registry {
    claude: claude::ClaudeEngine,
    codex: codex::CodexEngine,
    copilot: copilot::CopilotEngine,
    custom: custom::CustomEngine,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        claude: claude::ClaudeEngine,
        codex: codex::CodexEngine,
        copilot: copilot::CopilotEngine,
        custom: custom::CustomEngine,
    })
}

/// Look up the adapter for `id`.
pub fn adapter_for(id: EngineId) -> &'static dyn EngineAdapter {
    let registry = registry();
    match id {
        EngineId::Claude => &registry.claude,
        EngineId::Codex => &registry.codex,
        EngineId::Copilot => &registry.copilot,
        EngineId::Custom => &registry.custom,
    }
}

/// Environment every engine adapter's steps receive regardless of which
/// engine is selected: where to find the MCP gateway manifest and where
/// to write safe-output entries.
pub fn common_env(ctx: &EngineContext<'_>) -> indexmap::IndexMap<String, String> {
    let mut env = indexmap::IndexMap::new();
    env.insert(
        aw_events::SAFE_OUTPUTS_ENV_VAR.to_string(),
        ctx.safe_outputs_path.to_string(),
    );
    env.insert(
        "GITHUB_AW_MCP_CONFIG".to_string(),
        ctx.mcp_config_path.to_string(),
    );
    env
}
