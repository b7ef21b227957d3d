//! Sanitization for agent-controlled text before it reaches a safe-output
//! handler job (§4.E).
//!
//! Every field the agent writes into the JSONL sink is untrusted: it came
//! from a language model acting on repository content, which may itself
//! contain adversarial instructions. The pipeline here is fixed and
//! applies uniformly regardless of which safe-output type the text is
//! bound for:
//!
//! 1. strip ASCII control characters (except `\n`/`\t`) — defeats
//!    terminal/markdown-renderer escape-sequence tricks;
//! 2. XML-escape the five reserved characters, since the body is
//!    eventually interpolated into a GitHub Actions `run:` heredoc;
//! 3. redact any URI that is not `https://` or whose host is not on the
//!    allowed-domains list;
//! 4. truncate to the byte/line budget, spilling the untruncated original
//!    to an artifact file when it's large enough that a full round-trip
//!    through the model's context would be wasteful;
//! 5. append the `gh aw add`-hint footer every safe-output body carries.

use std::sync::LazyLock;

use aw_types::network::is_github_owned;
use aw_types::PayloadLimits;
use regex::Regex;

/// Runtime configuration for one sanitize pass, derived from
/// `safe-outputs.allowed-domains` plus the compiled-in GitHub default set.
#[derive(Debug, Clone)]
pub struct SanitizeConfig {
    pub allowed_domains: Vec<String>,
    pub max_bytes: usize,
    pub max_lines: usize,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            max_bytes: PayloadLimits::MAX_BYTES,
            max_lines: PayloadLimits::MAX_LINES,
        }
    }
}

impl SanitizeConfig {
    fn domain_allowed(&self, host: &str) -> bool {
        is_github_owned(host)
            || self
                .allowed_domains
                .iter()
                .any(|d| host == d || host.ends_with(&format!(".{d}")))
    }
}

/// The result of sanitizing one field.
#[derive(Debug, Clone)]
pub struct SanitizeOutcome {
    pub text: String,
    pub truncated: bool,
    pub redacted_uri_count: usize,
    /// Set when the original exceeded the spill threshold and was written
    /// to an artifact file whose name is embedded in the returned text.
    pub spill_file_name: Option<String>,
}

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());

static URI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([a-z][a-z0-9+.\-]*)://([^\s<>\x22']+)").unwrap());

/// Remove ASCII control characters other than `\n` (0x0A) and `\t` (0x09).
pub fn strip_control_chars(input: &str) -> String {
    CONTROL_CHARS.replace_all(input, "").into_owned()
}

/// Escape the five characters that are meaningful in both XML and the
/// GitHub Actions `run:` block context this text is ultimately embedded
/// in.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Replace any non-`https` URI, or any `https` URI whose host is not on
/// `config`'s allowlist (GitHub-owned domains always pass), with a
/// `[redacted: scheme://host]` marker. Returns the rewritten text plus how
/// many URIs were redacted.
pub fn redact_uris(input: &str, config: &SanitizeConfig) -> (String, usize) {
    let mut redacted_count = 0usize;
    let out = URI_PATTERN.replace_all(input, |caps: &regex::Captures| {
        let scheme = &caps[1];
        let rest = &caps[2];
        let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
        let host_only = host.split(['@']).next_back().unwrap_or(host);
        let host_no_port = host_only.split(':').next().unwrap_or(host_only);

        if scheme.eq_ignore_ascii_case("https") && config.domain_allowed(host_no_port) {
            caps[0].to_string()
        } else {
            redacted_count += 1;
            format!("[redacted: {scheme}://{host_no_port}]")
        }
    });
    (out.into_owned(), redacted_count)
}

/// Truncate `input` to `max_lines` lines and `max_bytes` bytes (whichever
/// binds first), returning whether truncation occurred.
pub fn truncate(input: &str, max_bytes: usize, max_lines: usize) -> (String, bool) {
    let mut truncated = false;
    let mut result: String = input
        .lines()
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n");
    if input.lines().count() > max_lines {
        truncated = true;
    }
    if result.len() > max_bytes {
        truncated = true;
        let mut cut = max_bytes;
        while cut > 0 && !result.is_char_boundary(cut) {
            cut -= 1;
        }
        result.truncate(cut);
    }
    (result, truncated)
}

/// The full pipeline: strip, escape, redact, truncate. When the original
/// (post-escape) text exceeds [`PayloadLimits::SPILL_TOKEN_THRESHOLD`]
/// bytes, `spill` is invoked with the untruncated text and its return
/// value (the artifact file name) is recorded; the returned text is
/// always the truncated form plus a stub line referencing that file.
pub fn sanitize(
    raw: &str,
    config: &SanitizeConfig,
    spill: impl FnOnce(&str) -> Option<String>,
) -> SanitizeOutcome {
    let stripped = strip_control_chars(raw);
    let escaped = escape_xml(&stripped);
    let (redacted, redacted_uri_count) = redact_uris(&escaped, config);

    let mut spill_file_name = None;
    if redacted.len() > PayloadLimits::SPILL_TOKEN_THRESHOLD {
        spill_file_name = spill(&redacted);
    }

    let (mut text, mut truncated) = truncate(&redacted, config.max_bytes, config.max_lines);
    if let Some(name) = &spill_file_name {
        text.push_str("\n\n");
        text.push_str(&aw_types::spill_stub(name));
        truncated = true;
    }

    SanitizeOutcome {
        text,
        truncated,
        redacted_uri_count,
        spill_file_name,
    }
}

/// The standard footer appended to every safe-output-created issue/PR/
/// comment body, hinting at how the workflow that produced it can be
/// re-run or inspected via `gh aw`.
pub fn add_hint_footer(workflow_name: &str, run_url: &str) -> String {
    format!(
        "\n\n---\n*Generated by [{workflow_name}]({run_url}) — re-run with `gh aw run {workflow_name}`.*"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_chars_but_keeps_newline_and_tab() {
        let input = "hello\x07world\n\ttab";
        let out = strip_control_chars(input);
        assert_eq!(out, "helloworld\n\ttab");
    }

    #[test]
    fn escapes_all_five_xml_chars() {
        let out = escape_xml(r#"<a>&"'"#);
        assert_eq!(out, "&lt;a&gt;&amp;&quot;&apos;");
    }

    #[test]
    fn redacts_non_https_scheme() {
        let cfg = SanitizeConfig::default();
        let (out, n) = redact_uris("see http://evil.example.com/x", &cfg);
        assert_eq!(n, 1);
        assert!(out.contains("[redacted: http://evil.example.com]"));
    }

    #[test]
    fn github_owned_https_passes_through() {
        let cfg = SanitizeConfig::default();
        let (out, n) = redact_uris("see https://github.com/foo/bar", &cfg);
        assert_eq!(n, 0);
        assert!(out.contains("https://github.com/foo/bar"));
    }

    #[test]
    fn disallowed_https_host_is_redacted() {
        let cfg = SanitizeConfig::default();
        let (out, n) = redact_uris("see https://attacker.example.com/x", &cfg);
        assert_eq!(n, 1);
        assert!(out.contains("[redacted: https://attacker.example.com]"));
    }

    #[test]
    fn allowlisted_custom_domain_passes() {
        let cfg = SanitizeConfig {
            allowed_domains: vec!["example.com".into()],
            ..SanitizeConfig::default()
        };
        let (out, n) = redact_uris("see https://api.example.com/x", &cfg);
        assert_eq!(n, 0);
        assert!(out.contains("https://api.example.com/x"));
    }

    #[test]
    fn truncate_by_line_count() {
        let text = (0..10).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let (out, truncated) = truncate(&text, 1_000_000, 3);
        assert!(truncated);
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn truncate_by_byte_count_respects_utf8_boundary() {
        let text = "héllo wörld";
        let (out, truncated) = truncate(text, 5, 1000);
        assert!(truncated);
        assert!(out.len() <= 5);
        assert!(std::str::from_utf8(out.as_bytes()).is_ok());
    }

    #[test]
    fn sanitize_spills_large_bodies() {
        let huge = "x".repeat(PayloadLimits::SPILL_TOKEN_THRESHOLD + 10);
        let cfg = SanitizeConfig::default();
        let outcome = sanitize(&huge, &cfg, |_| Some("spill-001.txt".to_string()));
        assert_eq!(outcome.spill_file_name.as_deref(), Some("spill-001.txt"));
        assert!(outcome.text.contains("spill-001.txt"));
        assert!(outcome.truncated);
    }

    #[test]
    fn sanitize_small_body_is_untouched_besides_escaping() {
        let cfg = SanitizeConfig::default();
        let outcome = sanitize("plain text", &cfg, |_| None);
        assert_eq!(outcome.text, "plain text");
        assert!(!outcome.truncated);
        assert!(outcome.spill_file_name.is_none());
    }

    #[test]
    fn footer_mentions_workflow_name_and_run_url() {
        let footer = add_hint_footer("nightly-triage", "https://github.com/o/r/actions/runs/1");
        assert!(footer.contains("nightly-triage"));
        assert!(footer.contains("https://github.com/o/r/actions/runs/1"));
    }
}
