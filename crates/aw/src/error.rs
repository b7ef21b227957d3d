//! The domain error taxonomy (§7). Every variant carries enough context
//! (a workflow path, and where applicable a line number) that a
//! diagnostic can be rendered without the caller re-deriving it, and a
//! `#[source]` chain so `anyhow::Context` can layer human prose on top
//! without discarding the structured kind.
//!
//! Callers that need to branch on *which* error occurred — the CLI's
//! exit-code mapping, the batch summary's per-outcome bucketing —
//! recover it with `anyhow::Error::downcast_ref::<CompileError>()`
//! rather than matching on the `anyhow::Error`'s `Display` output.

use std::path::PathBuf;

use thiserror::Error;

/// The full set of ways compiling a single workflow can fail (§7).
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{path}: source file not found")]
    SourceNotFound { path: PathBuf },

    #[error("{path}:{line}: malformed source: {detail}")]
    MalformedSource {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    #[error("{path}: import cycle detected: {cycle}")]
    ImportCycle { path: PathBuf, cycle: String },

    #[error("{path}: import `{import}` could not be found")]
    ImportNotFound { path: PathBuf, import: String },

    #[error("{path}: failed to fetch remote import `{import}`")]
    RemoteFetchFailed {
        path: PathBuf,
        import: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{path}: schema violation: {detail}")]
    SchemaViolation { path: PathBuf, detail: String },

    #[error("{path}: strict mode violation: {detail}")]
    StrictModeViolation { path: PathBuf, detail: String },

    #[error("{path}: engine misconfigured: {detail}")]
    EngineMisconfigured { path: PathBuf, detail: String },

    #[error("{path}: unknown tool `{tool}`")]
    ToolUnknown { path: PathBuf, tool: String },

    #[error("{path}: MCP server `{server}` could not be resolved: {detail}")]
    McpServerUnresolvable {
        path: PathBuf,
        server: String,
        detail: String,
    },

    #[error("{path}: invalid safe-output configuration: {detail}")]
    SafeOutputInvalid { path: PathBuf, detail: String },

    #[error("{path}: merge conflict while updating lock file")]
    MergeConflict { path: PathBuf, markers: String },

    #[error("source registry unavailable: {detail}")]
    RegistryUnavailable { detail: String },

    #[error("{path}: authentication error resolving token: {detail}")]
    AuthError { path: PathBuf, detail: String },

    #[error("{path}: patch exceeds maximum size ({actual_kb}KB > {limit_kb}KB)")]
    PatchTooLarge {
        path: PathBuf,
        actual_kb: u64,
        limit_kb: u64,
    },

    #[error("{path}: failed to emit lock file: {detail}")]
    EmissionError {
        path: PathBuf,
        detail: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl CompileError {
    /// The workflow path every variant carries, for diagnostics that only
    /// need to know *where*, not *why*.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            CompileError::SourceNotFound { path }
            | CompileError::MalformedSource { path, .. }
            | CompileError::ImportCycle { path, .. }
            | CompileError::ImportNotFound { path, .. }
            | CompileError::RemoteFetchFailed { path, .. }
            | CompileError::SchemaViolation { path, .. }
            | CompileError::StrictModeViolation { path, .. }
            | CompileError::EngineMisconfigured { path, .. }
            | CompileError::ToolUnknown { path, .. }
            | CompileError::McpServerUnresolvable { path, .. }
            | CompileError::SafeOutputInvalid { path, .. }
            | CompileError::MergeConflict { path, .. }
            | CompileError::AuthError { path, .. }
            | CompileError::PatchTooLarge { path, .. }
            | CompileError::EmissionError { path, .. } => Some(path),
            CompileError::RegistryUnavailable { .. } => None,
        }
    }

    /// A short, stable identifier for this error kind, used in the CLI's
    /// machine-readable output and in tests that assert on error
    /// classification without string-matching the full message.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CompileError::SourceNotFound { .. } => "source_not_found",
            CompileError::MalformedSource { .. } => "malformed_source",
            CompileError::ImportCycle { .. } => "import_cycle",
            CompileError::ImportNotFound { .. } => "import_not_found",
            CompileError::RemoteFetchFailed { .. } => "remote_fetch_failed",
            CompileError::SchemaViolation { .. } => "schema_violation",
            CompileError::StrictModeViolation { .. } => "strict_mode_violation",
            CompileError::EngineMisconfigured { .. } => "engine_misconfigured",
            CompileError::ToolUnknown { .. } => "tool_unknown",
            CompileError::McpServerUnresolvable { .. } => "mcp_server_unresolvable",
            CompileError::SafeOutputInvalid { .. } => "safe_output_invalid",
            CompileError::MergeConflict { .. } => "merge_conflict",
            CompileError::RegistryUnavailable { .. } => "registry_unavailable",
            CompileError::AuthError { .. } => "auth_error",
            CompileError::PatchTooLarge { .. } => "patch_too_large",
            CompileError::EmissionError { .. } => "emission_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_recovers_structured_kind_through_anyhow_context() {
        let err: anyhow::Error = CompileError::ImportCycle {
            path: PathBuf::from("wf.md"),
            cycle: "a -> b -> a".to_string(),
        }
        .into();
        let wrapped = err.context("compiling workflow");
        let recovered = wrapped.downcast_ref::<CompileError>().unwrap();
        assert_eq!(recovered.kind_name(), "import_cycle");
    }

    #[test]
    fn path_accessor_returns_none_for_registry_errors() {
        let err = CompileError::RegistryUnavailable {
            detail: "timeout".to_string(),
        };
        assert!(err.path().is_none());
    }
}
