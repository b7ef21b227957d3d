//! Remote workflow source resolution (§4.A imports, Component H
//! update/merge): fetching the content behind an `owner/repo/path@ref`
//! reference, and resolving a missing `ref` to the repository's default
//! branch.
//!
//! This is the one place the compiler talks to the network. It is kept
//! behind a trait, [`SourceFetcher`], the same way the teacher's registry
//! client is wrapped behind an interface the rest of the pipeline depends
//! on abstractly — callers that only need local-filesystem imports (the
//! common case, and every test in this workspace) never have to construct
//! an HTTP client.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use aw_retry::{RetryPolicy, RetryStrategyConfig};
use aw_types::SourceRef;

/// Resolves and fetches workflow source content, whether local or remote.
pub trait SourceFetcher: Send + Sync {
    /// Fetch the raw text content referenced by `source`.
    fn fetch_content(&self, source: &SourceRef) -> Result<String>;

    /// Resolve `source`'s `ref` (branch/tag/sha) to a concrete commit SHA,
    /// using the repository's default branch when `source.ref` is `None`.
    fn resolve_ref(&self, source: &SourceRef) -> Result<String>;

    /// The repository's release/tag names, newest first as the host
    /// reports them. Used by `update` (§4.H) to pick the highest SemVer
    /// tag within a major version. Local imports have no tags.
    fn list_tags(&self, source: &SourceRef) -> Result<Vec<String>>;

    /// The current commit SHA at the tip of `branch`. Used by `update`
    /// (§4.H) to re-resolve a branch-pinned source to its latest commit.
    fn branch_head(&self, source: &SourceRef, branch: &str) -> Result<String>;
}

/// Reads imports from the local filesystem, ignoring `owner`/`repo`/`ref`
/// and resolving `path` relative to `root`. Used for same-repository
/// imports, which never need a network round-trip, and in tests.
pub struct LocalSourceFetcher {
    root: PathBuf,
}

impl LocalSourceFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceFetcher for LocalSourceFetcher {
    fn fetch_content(&self, source: &SourceRef) -> Result<String> {
        let full = self.root.join(&source.path);
        std::fs::read_to_string(&full)
            .with_context(|| format!("reading local import {}", full.display()))
    }

    fn resolve_ref(&self, _source: &SourceRef) -> Result<String> {
        Ok("local".to_string())
    }

    fn list_tags(&self, _source: &SourceRef) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn branch_head(&self, _source: &SourceRef, branch: &str) -> Result<String> {
        Ok(branch.to_string())
    }
}

/// Fetches imports from GitHub via the raw-content CDN and the REST API,
/// with one retry on a transient failure (§4.A, per the shared
/// [`aw_retry`] policy).
pub struct GitHubSourceFetcher {
    client: reqwest::blocking::Client,
    token: Option<String>,
    retry: RetryStrategyConfig,
    api_base: String,
    raw_base: String,
}

impl GitHubSourceFetcher {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("aw-compile/0.3")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("building GitHub HTTP client")?;
        Ok(Self {
            client,
            token,
            retry: RetryPolicy::Default.to_config(),
            api_base: "https://api.github.com".to_string(),
            raw_base: "https://raw.githubusercontent.com".to_string(),
        })
    }

    #[cfg(test)]
    fn with_bases(mut self, api_base: String, raw_base: String) -> Self {
        self.api_base = api_base;
        self.raw_base = raw_base;
        self
    }

    fn authed(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    fn with_retry<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last_err = None;
        for attempt in 1..=self.retry.max_attempts {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    last_err = Some(e);
                    if attempt < self.retry.max_attempts {
                        std::thread::sleep(self.retry.delay_for_attempt(attempt));
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("retry loop produced no attempts")))
    }
}

impl SourceFetcher for GitHubSourceFetcher {
    fn fetch_content(&self, source: &SourceRef) -> Result<String> {
        let git_ref = match &source.r#ref {
            Some(r) => r.clone(),
            None => self.resolve_ref(source)?,
        };
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_base, source.owner, source.repo, git_ref, source.path
        );
        self.with_retry(|| {
            let resp = self
                .authed(self.client.get(&url))
                .send()
                .with_context(|| format!("fetching {url}"))?;
            if !resp.status().is_success() {
                anyhow::bail!("fetching {url}: HTTP {}", resp.status());
            }
            resp.text().with_context(|| format!("reading body of {url}"))
        })
    }

    fn resolve_ref(&self, source: &SourceRef) -> Result<String> {
        if let Some(r) = &source.r#ref {
            return Ok(r.clone());
        }
        let url = format!(
            "{}/repos/{}/{}",
            self.api_base, source.owner, source.repo
        );
        self.with_retry(|| {
            let resp = self
                .authed(self.client.get(&url))
                .send()
                .with_context(|| format!("fetching {url}"))?;
            if !resp.status().is_success() {
                anyhow::bail!("fetching {url}: HTTP {}", resp.status());
            }
            let body: serde_json::Value = resp
                .json()
                .with_context(|| format!("parsing JSON from {url}"))?;
            body.get("default_branch")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .ok_or_else(|| anyhow::anyhow!("{url} response missing default_branch"))
        })
    }

    fn list_tags(&self, source: &SourceRef) -> Result<Vec<String>> {
        let url = format!(
            "{}/repos/{}/{}/tags?per_page=100",
            self.api_base, source.owner, source.repo
        );
        self.with_retry(|| {
            let resp = self
                .authed(self.client.get(&url))
                .send()
                .with_context(|| format!("fetching {url}"))?;
            if !resp.status().is_success() {
                anyhow::bail!("fetching {url}: HTTP {}", resp.status());
            }
            let body: Vec<serde_json::Value> = resp
                .json()
                .with_context(|| format!("parsing JSON from {url}"))?;
            Ok(body
                .iter()
                .filter_map(|t| t.get("name").and_then(|n| n.as_str()).map(str::to_string))
                .collect())
        })
    }

    fn branch_head(&self, source: &SourceRef, branch: &str) -> Result<String> {
        let url = format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_base, source.owner, source.repo, branch
        );
        self.with_retry(|| {
            let resp = self
                .authed(self.client.get(&url).header("Accept", "application/vnd.github.sha"))
                .send()
                .with_context(|| format!("fetching {url}"))?;
            if !resp.status().is_success() {
                anyhow::bail!("fetching {url}: HTTP {}", resp.status());
            }
            resp.text().with_context(|| format!("reading body of {url}"))
        })
    }
}

/// Open a pull request via the GitHub REST API, for `update --pr` (§6). A
/// thin wrapper rather than a `SourceFetcher` method since opening a PR is
/// a write, not a source-resolution operation.
pub fn open_pull_request(
    token: &str,
    owner: &str,
    repo: &str,
    head_branch: &str,
    base_branch: &str,
    title: &str,
    body: &str,
) -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .user_agent("aw-compile/0.3")
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("building GitHub HTTP client")?;
    let url = format!("https://api.github.com/repos/{owner}/{repo}/pulls");
    let resp = client
        .post(&url)
        .bearer_auth(token)
        .json(&serde_json::json!({
            "title": title,
            "head": head_branch,
            "base": base_branch,
            "body": body,
        }))
        .send()
        .with_context(|| format!("opening pull request via {url}"))?;
    if !resp.status().is_success() {
        anyhow::bail!("opening pull request: HTTP {}", resp.status());
    }
    let parsed: serde_json::Value = resp.json().context("parsing pull request response")?;
    parsed
        .get("html_url")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("pull request response missing html_url"))
}

/// True if `path` looks like a same-repository-relative import rather
/// than a fully-qualified `owner/repo/path[@ref]` reference — i.e. it
/// doesn't parse as a [`SourceRef`] at all.
pub fn is_local_import(raw: &str) -> bool {
    SourceRef::parse(raw).is_none()
}

/// Resolve a workflow's declared import path (either a local relative
/// path or a full `owner/repo/path@ref`) using whichever fetcher fits.
pub fn fetch_import(
    raw: &str,
    local_root: &Path,
    remote: Option<&dyn SourceFetcher>,
) -> Result<String> {
    if is_local_import(raw) {
        let full = local_root.join(raw);
        return std::fs::read_to_string(&full)
            .with_context(|| format!("reading local import {}", full.display()));
    }
    let source = SourceRef::parse(raw)
        .ok_or_else(|| anyhow::anyhow!("`{raw}` is not a valid owner/repo/path[@ref] reference"))?;
    let fetcher = remote.ok_or_else(|| {
        anyhow::anyhow!("`{raw}` requires network access but no remote fetcher was configured")
    })?;
    fetcher.fetch_content(&source)
}
