//! Builds the [`McpGatewayManifest`] (§4.D) from a workflow's
//! `mcp-servers:` declarations.
//!
//! The gateway is the single process inside the sandbox that the agent's
//! MCP client talks to; every declared server becomes one entry in the
//! manifest the gateway reads at startup. This module's job is purely
//! translation and validation — actually running the gateway process is
//! outside the compiler's scope (§Non-goals).

use aw_types::{McpGatewayManifest, McpServerDecl, McpServerManifestEntry, McpTransport, WorkflowData};

use crate::error::CompileError;

const DEFAULT_GATEWAY_PORT: u16 = 8765;
const DEFAULT_STARTUP_TIMEOUT_SECS: u32 = 30;
const DEFAULT_TOOL_TIMEOUT_SECS: u32 = 60;

fn validate_server(name: &str, decl: &McpServerDecl) -> Result<(), CompileError> {
    match decl.r#type {
        McpTransport::Stdio => {
            if decl.command.is_none() && decl.entrypoint.is_none() {
                return Err(mcp_error(name, "stdio server requires `command` or `entrypoint`"));
            }
        }
        McpTransport::Http => {
            if decl.url.is_none() {
                return Err(mcp_error(name, "http server requires `url`"));
            }
        }
    }
    Ok(())
}

fn mcp_error(server: &str, detail: &str) -> CompileError {
    CompileError::McpServerUnresolvable {
        path: Default::default(),
        server: server.to_string(),
        detail: detail.to_string(),
    }
}

fn entry_for(decl: &McpServerDecl) -> McpServerManifestEntry {
    let entrypoint_args = decl.args.clone();
    McpServerManifestEntry {
        r#type: decl.r#type,
        container: decl.container.clone(),
        entrypoint: decl.entrypoint.clone().or_else(|| decl.command.clone()),
        entrypoint_args,
        mounts: decl.mounts.clone(),
        env: decl.env.clone(),
        url: decl.url.clone(),
        headers: decl.headers.clone(),
        tools: match &decl.allowed {
            aw_types::ToolAllowlist::Wildcard(_) => None,
            aw_types::ToolAllowlist::Named(names) => Some(names.clone()),
        },
    }
}

/// Build the manifest for `data`'s declared MCP servers. `api_key` is
/// supplied by the caller (the pipeline generates one random-looking
/// token per compile, but this function takes it as an argument so it
/// stays pure and deterministic for tests and snapshot fixtures).
pub fn build_manifest(
    data: &WorkflowData,
    api_key: &str,
    gateway_domain: &str,
) -> Result<McpGatewayManifest, CompileError> {
    let mut mcp_servers = indexmap::IndexMap::new();
    for (name, decl) in &data.mcp_servers {
        validate_server(name, decl)?;
        mcp_servers.insert(name.clone(), entry_for(decl));
    }

    Ok(McpGatewayManifest {
        mcp_servers,
        gateway: aw_types::GatewayConfig {
            port: DEFAULT_GATEWAY_PORT,
            api_key: api_key.to_string(),
            domain: gateway_domain.to_string(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT_SECS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT_SECS,
        },
    })
}
