//! GitHub token resolution for safe-output handler jobs (§3 Invariant 5,
//! §4.E).
//!
//! Precedence, highest to lowest:
//!
//! 1. `GH_AW_GITHUB_TOKEN` repository/organization secret — an explicit
//!    escape hatch that always wins, so an administrator can force every
//!    handler in a repository onto one token without editing workflow
//!    source.
//! 2. The per-output `github-token:` field on the specific safe-output
//!    block being resolved.
//! 3. The workflow-wide `safe-outputs.github-token` field.
//! 4. The default `GITHUB_TOKEN` GitHub Actions provides to every job.
//!
//! This mirrors the environment → config-file → fallback resolution order
//! a publish tool uses to find a registry credential, just with GitHub
//! Actions expression strings standing in for the resolved value rather
//! than a token the resolver reads directly — the compiler emits the
//! precedence chain as an `env:` expression, it never holds a real secret
//! itself.

use thiserror::Error;

/// An environment variable name that expands to a GitHub token at
/// workflow runtime. The compiler only ever emits the *name* of the
/// variable to use (`${{ secrets.GH_AW_GITHUB_TOKEN }}`, etc.); it never
/// has the token value available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenExpr(String);

impl TokenExpr {
    pub fn as_expression(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TokenExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("github-token field `{0}` is not a valid GitHub Actions expression or secret reference")]
    InvalidExpression(String),
}

/// Turn a raw `github-token:` frontmatter value into an `${{ }}`
/// expression. A value that already looks like an expression
/// (`${{ secrets.FOO }}`) passes through unchanged; a bare identifier is
/// treated as a secret name and wrapped.
fn normalize(raw: &str) -> Result<TokenExpr, TokenError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TokenError::InvalidExpression(raw.to_string()));
    }
    if trimmed.starts_with("${{") && trimmed.ends_with("}}") {
        return Ok(TokenExpr(trimmed.to_string()));
    }
    if trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Ok(TokenExpr(format!("${{{{ secrets.{trimmed} }}}}")));
    }
    Err(TokenError::InvalidExpression(raw.to_string()))
}

/// The default token every job gets for free, with no secret lookup
/// required.
pub fn default_token_expr() -> TokenExpr {
    TokenExpr("${{ secrets.GITHUB_TOKEN }}".to_string())
}

/// Resolve the token expression a single safe-output handler's job should
/// use, applying the four-tier precedence above. `per_output` is the
/// specific block's own `github-token:` (e.g.
/// `safe-outputs.create-issue.github-token`); `global` is
/// `safe-outputs.github-token`.
///
/// `force_override_env` models the `GH_AW_GITHUB_TOKEN` check: callers
/// pass `std::env::var("GH_AW_GITHUB_TOKEN").ok()` in production and a
/// fixed value in tests, keeping this function free of direct
/// environment access so it stays unit-testable without `serial_test`.
pub fn resolve_token(
    force_override_env: Option<&str>,
    per_output: Option<&str>,
    global: Option<&str>,
) -> Result<TokenExpr, TokenError> {
    if let Some(forced) = force_override_env {
        if !forced.trim().is_empty() {
            return normalize(forced);
        }
    }
    if let Some(p) = per_output {
        if !p.trim().is_empty() {
            return normalize(p);
        }
    }
    if let Some(g) = global {
        if !g.trim().is_empty() {
            return normalize(g);
        }
    }
    Ok(default_token_expr())
}

/// Convenience wrapper reading `GH_AW_GITHUB_TOKEN` from the real process
/// environment. Kept separate from [`resolve_token`] so the precedence
/// logic itself has no environment dependency.
pub fn resolve_token_from_env(
    per_output: Option<&str>,
    global: Option<&str>,
) -> Result<TokenExpr, TokenError> {
    let forced = std::env::var("GH_AW_GITHUB_TOKEN").ok();
    resolve_token(forced.as_deref(), per_output, global)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_override_wins_over_everything() {
        let t = resolve_token(
            Some("FORCE_TOKEN"),
            Some("PER_OUTPUT"),
            Some("GLOBAL_TOKEN"),
        )
        .unwrap();
        assert_eq!(t.as_expression(), "${{ secrets.FORCE_TOKEN }}");
    }

    #[test]
    fn per_output_wins_over_global() {
        let t = resolve_token(None, Some("PER_OUTPUT"), Some("GLOBAL_TOKEN")).unwrap();
        assert_eq!(t.as_expression(), "${{ secrets.PER_OUTPUT }}");
    }

    #[test]
    fn global_wins_over_default() {
        let t = resolve_token(None, None, Some("GLOBAL_TOKEN")).unwrap();
        assert_eq!(t.as_expression(), "${{ secrets.GLOBAL_TOKEN }}");
    }

    #[test]
    fn falls_back_to_github_token() {
        let t = resolve_token(None, None, None).unwrap();
        assert_eq!(t, default_token_expr());
    }

    #[test]
    fn expression_values_pass_through_unwrapped() {
        let t = resolve_token(None, Some("${{ secrets.CUSTOM }}"), None).unwrap();
        assert_eq!(t.as_expression(), "${{ secrets.CUSTOM }}");
    }

    #[test]
    fn blank_override_does_not_shadow_lower_tiers() {
        let t = resolve_token(Some("   "), Some("PER_OUTPUT"), None).unwrap();
        assert_eq!(t.as_expression(), "${{ secrets.PER_OUTPUT }}");
    }

    #[test]
    fn rejects_malformed_expression() {
        let err = resolve_token(None, Some("not valid!"), None).unwrap_err();
        assert!(matches!(err, TokenError::InvalidExpression(_)));
    }

    #[test]
    #[serial_test::serial]
    fn resolve_token_from_env_reads_real_env_var() {
        temp_env::with_var("GH_AW_GITHUB_TOKEN", Some("ENV_FORCED"), || {
            let t = resolve_token_from_env(None, None).unwrap();
            assert_eq!(t.as_expression(), "${{ secrets.ENV_FORCED }}");
        });
    }
}
