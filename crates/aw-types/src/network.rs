//! The canonical GitHub-owned domain list backing `network: defaults` and
//! the safe-output sanitizer's default `allowed-domains` (§4.B, §4.E).
//!
//! Kept in one place so the egress allowlist and the body-sanitizer's URL
//! filter never drift apart — previously each call site grew its own copy.

/// Domains reachable under `network: defaults` without an explicit
/// `allowed:` list, and the default redaction allowlist for safe-output
/// body sanitization.
pub const GITHUB_OWNED_DOMAINS: &[&str] = &[
    "github.com",
    "api.github.com",
    "raw.githubusercontent.com",
    "codeload.github.com",
    "objects.githubusercontent.com",
    "uploads.github.com",
    "avatars.githubusercontent.com",
    "github.io",
    "githubusercontent.com",
    "ghcr.io",
];

/// True if `domain` is exactly one of [`GITHUB_OWNED_DOMAINS`] or a
/// subdomain of one (e.g. `foo.githubusercontent.com`).
pub fn is_github_owned(domain: &str) -> bool {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    GITHUB_OWNED_DOMAINS
        .iter()
        .any(|owned| domain == *owned || domain.ends_with(&format!(".{owned}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(is_github_owned("github.com"));
    }

    #[test]
    fn subdomain_match() {
        assert!(is_github_owned("gist.githubusercontent.com"));
    }

    #[test]
    fn unrelated_domain_rejected() {
        assert!(!is_github_owned("evil.example.com"));
    }

    #[test]
    fn case_and_trailing_dot_normalized() {
        assert!(is_github_owned("GitHub.com."));
    }
}
