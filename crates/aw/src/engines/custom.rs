use aw_types::{EngineId, JobStep};

use super::{EngineAdapter, EngineContext};

/// `engine: custom` hands the workflow author full control: whatever raw
/// steps they declared under `engine.steps` are emitted verbatim, with
/// only the common MCP/safe-outputs environment layered on top of each
/// one so the agent they invoke can still talk to the gateway and write
/// safe outputs the same way a built-in adapter's engine would.
pub struct CustomEngine;

impl EngineAdapter for CustomEngine {
    fn id(&self) -> EngineId {
        EngineId::Custom
    }

    fn build_steps(&self, ctx: &EngineContext<'_>) -> Vec<JobStep> {
        let common_env = super::common_env(ctx);
        ctx.data
            .engine
            .steps
            .iter()
            .map(|raw| {
                let mut step: JobStep =
                    serde_json::from_value(raw.clone()).unwrap_or_default();
                for (k, v) in &common_env {
                    step.env.entry(k.clone()).or_insert_with(|| v.clone());
                }
                step
            })
            .collect()
    }
}
