//! # aw-types
//!
//! Core domain types shared across the agentic workflow compiler: the
//! normalized [`WorkflowData`] model, the MCP gateway manifest, the
//! safe-output configuration bag, and the emitted [`Job`] graph node shape.
//!
//! These types are pure data — no I/O, no validation side effects beyond
//! what `serde` enforces structurally. Cross-field validation (the "model
//! builder" in the compiler's terminology) lives in the `aw` crate, which
//! depends on this one.
//!
//! ## Serialization
//!
//! Most types implement `Serialize`/`Deserialize`. Field order in structs
//! that end up embedded in the rendered lock file uses [`indexmap::IndexMap`]
//! rather than `BTreeMap`/`HashMap` so that insertion order — not key sort
//! order — drives emission; the lock emitter is responsible for imposing
//! its own canonical order on top of that where the spec requires it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub mod network;

/// Deserialize a [`Duration`] from either a human-readable string (`"2m"`,
/// `"500ms"`) or a raw millisecond count.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DurationHelper {
        String(String),
        U64(u64),
    }

    match DurationHelper::deserialize(deserializer)? {
        DurationHelper::String(s) => humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
        DurationHelper::U64(ms) => Ok(Duration::from_millis(ms)),
    }
}

/// Serialize a [`Duration`] as milliseconds so it round-trips through
/// [`deserialize_duration`].
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// A GitHub Actions permission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Read,
    Write,
    #[default]
    None,
}

impl Level {
    pub fn is_write(self) -> bool {
        matches!(self, Level::Write)
    }
}

/// The permission block attached to a job. Only fields the workflow
/// actually declares are `Some`; absence means "not granted" rather than
/// "default", matching GitHub Actions' own semantics once a `permissions:`
/// block is present at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permissions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Level>,
    #[serde(rename = "pull-requests", skip_serializing_if = "Option::is_none")]
    pub pull_requests: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discussions: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<Level>,
    #[serde(rename = "id-token", skip_serializing_if = "Option::is_none")]
    pub id_token: Option<Level>,
}

impl Permissions {
    /// The read-only permission set every agent job is restricted to,
    /// plus whatever the user explicitly declared on top.
    pub fn contents_read_only() -> Self {
        Self {
            contents: Some(Level::Read),
            ..Default::default()
        }
    }

    /// Returns true if any field grants `write`.
    pub fn has_any_write(&self) -> bool {
        [
            self.contents,
            self.issues,
            self.pull_requests,
            self.discussions,
            self.actions,
            self.packages,
            self.id_token,
        ]
        .into_iter()
        .flatten()
        .any(Level::is_write)
    }
}

/// Which AI engine runs the agent job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    Claude,
    Codex,
    Copilot,
    Custom,
}

/// Normalized `engine:` frontmatter, whether the source wrote it as a bare
/// string (`engine: claude`) or an object (`engine: {id: claude, ...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub id: EngineId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "maxTurns", skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    /// Raw GitHub Actions steps, used only by `engine: custom` to let the
    /// workflow author supply their own invocation in full instead of
    /// relying on an adapter to render one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id: EngineId::Claude,
            version: None,
            model: None,
            max_turns: None,
            steps: Vec::new(),
        }
    }
}

/// `owner/repo/path.md@ref` — where a workflow was imported/added from.
///
/// On the wire (frontmatter YAML, the lock file) this is always the single
/// string form, never a mapping — `Serialize`/`Deserialize` are hand-written
/// around [`SourceRef::parse`]/`Display` rather than derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub r#ref: Option<String>,
}

impl Serialize for SourceRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SourceRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SourceRef::parse(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "`{raw}` is not a valid owner/repo/path[@ref] source reference"
            ))
        })
    }
}

impl SourceRef {
    /// Parse `owner/repo/path/to/file.md@ref` (the `@ref` suffix optional).
    pub fn parse(spec: &str) -> Option<Self> {
        let (body, r#ref) = match spec.rsplit_once('@') {
            Some((b, r)) if !r.is_empty() => (b, Some(r.to_string())),
            _ => (spec, None),
        };
        let mut parts = body.splitn(3, '/');
        let owner = parts.next()?.to_string();
        let repo = parts.next()?.to_string();
        let path = parts.next()?.to_string();
        if owner.is_empty() || repo.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self {
            owner,
            repo,
            path,
            r#ref,
        })
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.repo, self.path)?;
        if let Some(r) = &self.r#ref {
            write!(f, "@{r}")?;
        }
        Ok(())
    }
}

/// The synthetic `command:` trigger (a `/slash-command`-style activation
/// in issue/PR comments), separate from native GitHub events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTrigger {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
}

/// The `on:` trigger set: native GitHub Actions events (kept as opaque JSON
/// filter objects, since their shape is event-specific and not this
/// compiler's concern) plus the synthetic keys the spec adds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnConfig {
    /// event name -> filter object (e.g. `issues: {types: [opened]}`).
    #[serde(flatten)]
    pub events: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandTrigger>,
    #[serde(rename = "stop-after", skip_serializing_if = "Option::is_none")]
    pub stop_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction: Option<String>,
}

impl OnConfig {
    /// Events that bypass the permission-check preamble job (§4.B): they
    /// cannot carry attacker-controlled actor context the way
    /// `issue_comment`/`pull_request_target` etc. can.
    pub const PERMISSION_CHECK_BYPASS: &'static [&'static str] =
        &["workflow_run", "schedule", "workflow_dispatch"];

    pub fn bypasses_permission_check(&self) -> bool {
        self.events.len() == 1
            && self
                .events
                .keys()
                .next()
                .is_some_and(|k| Self::PERMISSION_CHECK_BYPASS.contains(&k.as_str()))
    }

    /// True when the *only* activation is one of `schedule`, `command`, or
    /// `workflow_dispatch` — the sole-trigger rule in §4.B.
    pub fn has_single_unattended_trigger(&self) -> bool {
        let event_is_sole_unattended = self.events.len() == 1
            && self.command.is_none()
            && self
                .events
                .keys()
                .next()
                .is_some_and(|k| matches!(k.as_str(), "schedule" | "workflow_dispatch"));
        let command_is_sole = self.events.is_empty() && self.command.is_some();
        event_is_sole_unattended || command_is_sole
    }
}

/// Network egress policy for the MCP gateway and any containerized MCP
/// servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkMode {
    #[default]
    Defaults,
    Allowlist,
    DenyAll,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mode: NetworkMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

impl NetworkConfig {
    /// Whether `allowed` contains a bare wildcard, which `strict:` mode
    /// forbids (§4.B).
    pub fn has_wildcard(&self) -> bool {
        self.allowed.iter().any(|d| d == "*" || d.contains('*'))
    }
}

/// `sandbox.mcp` — which container image/version runs the MCP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRuntime {
    pub container: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp: Option<McpRuntime>,
}

/// Transport for a user-declared or implicit MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    Stdio,
    Http,
}

/// A tool allowlist: either an explicit set of tool names, or the
/// `["*"]` wildcard (legal only when the user wrote it explicitly; see
/// §4.D).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolAllowlist {
    Wildcard(WildcardMarker),
    Named(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WildcardMarker;

impl Serialize for WildcardMarker {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = s.serialize_seq(Some(1))?;
        seq.serialize_element("*")?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for WildcardMarker {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v: Vec<String> = Deserialize::deserialize(d)?;
        if v == ["*"] {
            Ok(WildcardMarker)
        } else {
            Err(serde::de::Error::custom("expected [\"*\"]"))
        }
    }
}

impl ToolAllowlist {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, ToolAllowlist::Wildcard(_))
    }

    pub fn allows(&self, tool: &str) -> bool {
        match self {
            ToolAllowlist::Wildcard(_) => true,
            ToolAllowlist::Named(names) => names.iter().any(|n| n == tool),
        }
    }
}

/// A user-declared entry under `mcp-servers:`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerDecl {
    pub r#type: McpTransport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    pub allowed: ToolAllowlist,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,
}

/// One entry in the derived [`McpGatewayManifest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerManifestEntry {
    pub r#type: McpTransport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(
        rename = "entrypointArgs",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub entrypoint_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub port: u16,
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub domain: String,
    #[serde(rename = "startupTimeout")]
    pub startup_timeout: u32,
    #[serde(rename = "toolTimeout")]
    pub tool_timeout: u32,
}

/// The runtime MCP gateway manifest (§3, §4.D, §6). Written verbatim to
/// `/tmp/mcp-config/mcp-servers.json` at workflow runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpGatewayManifest {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: IndexMap<String, McpServerManifestEntry>,
    pub gateway: GatewayConfig,
}

/// Where a safe-output job should act: the triggering issue/PR/discussion,
/// an explicit number the agent supplies, or "any" (`target: "*"`), which
/// additionally requires the agent's item to carry its own number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Triggering,
    Any,
    Explicit(u64),
}

impl Default for Target {
    fn default() -> Self {
        Target::Triggering
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Default for Side {
    fn default() -> Self {
        Side::Right
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfNoChanges {
    Warn,
    Error,
    Ignore,
}

impl Default for IfNoChanges {
    fn default() -> Self {
        IfNoChanges::Warn
    }
}

/// Fields common to every safe-output configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeOutputCommon {
    #[serde(default = "default_max")]
    pub max: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(rename = "github-token", skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(rename = "target-repo", skip_serializing_if = "Option::is_none")]
    pub target_repo: Option<String>,
}

fn default_max() -> u32 {
    1
}

impl Default for SafeOutputCommon {
    fn default() -> Self {
        Self {
            max: 1,
            min: None,
            github_token: None,
            target_repo: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateIssueConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    #[serde(rename = "title-prefix", skip_serializing_if = "Option::is_none")]
    pub title_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCommentConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    #[serde(default)]
    pub target: Target,
}

impl Default for AddCommentConfig {
    fn default() -> Self {
        Self {
            common: SafeOutputCommon::default(),
            target: Target::Triggering,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddLabelsConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    #[serde(default)]
    pub target: Target,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateIssueConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub title: bool,
    #[serde(default)]
    pub body: bool,
    #[serde(default)]
    pub target: Target,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePullRequestConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    #[serde(rename = "title-prefix", skip_serializing_if = "Option::is_none")]
    pub title_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default = "default_true")]
    pub draft: bool,
    #[serde(rename = "if-no-changes", default)]
    pub if_no_changes: IfNoChanges,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePrReviewCommentConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    #[serde(default)]
    pub side: Side,
    #[serde(default)]
    pub target: Target,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushToPrBranchConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    #[serde(default)]
    pub target: Target,
    #[serde(rename = "title-prefix", skip_serializing_if = "Option::is_none")]
    pub title_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(rename = "if-no-changes", default)]
    pub if_no_changes: IfNoChanges,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDiscussionConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    #[serde(rename = "title-prefix", skip_serializing_if = "Option::is_none")]
    pub title_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCodeScanningAlertConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReleaseConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    #[serde(rename = "release-id", skip_serializing_if = "Option::is_none")]
    pub release_id: Option<String>,
    #[serde(default)]
    pub target: Target,
}

/// `update-project` (§4.E): resolves `project`'s GraphQL node ID and
/// routes each item's field updates by field type. `fields`, when
/// non-empty, restricts which project fields an item may set; an
/// unlisted field is dropped rather than rejecting the whole item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProjectConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    pub project: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadAssetConfig {
    #[serde(flatten)]
    pub common: SafeOutputCommon,
    #[serde(rename = "max-size-kb", default = "default_upload_max_kb")]
    pub max_size_kb: u32,
    #[serde(rename = "allowed-exts", default = "default_upload_exts")]
    pub allowed_exts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

fn default_upload_max_kb() -> u32 {
    10_240
}

fn default_upload_exts() -> Vec<String> {
    vec![".png".into(), ".jpg".into(), ".jpeg".into()]
}

impl Default for UploadAssetConfig {
    fn default() -> Self {
        Self {
            common: SafeOutputCommon::default(),
            max_size_kb: default_upload_max_kb(),
            allowed_exts: default_upload_exts(),
            branch: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissingToolConfig {
    #[serde(default = "default_max")]
    pub max: u32,
}

/// A user-declared custom safe-job (`safe-outputs.jobs.<name>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomSafeJob {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "runs-on", skip_serializing_if = "Option::is_none")]
    pub runs_on: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Value>,
}

/// The full `safe-outputs:` bag (§3, §6). Every field is optional; the
/// model builder applies defaults described in §4.B.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafeOutputsConfig {
    #[serde(rename = "github-token", skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(rename = "runs-on", skip_serializing_if = "Option::is_none")]
    pub runs_on: Option<String>,
    #[serde(rename = "max-patch-size", skip_serializing_if = "Option::is_none")]
    pub max_patch_size_kb: Option<u32>,
    #[serde(rename = "allowed-domains", skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
    #[serde(rename = "create-issue", skip_serializing_if = "Option::is_none")]
    pub create_issue: Option<CreateIssueConfig>,
    #[serde(rename = "add-comment", skip_serializing_if = "Option::is_none")]
    pub add_comment: Option<AddCommentConfig>,
    #[serde(rename = "add-labels", skip_serializing_if = "Option::is_none")]
    pub add_labels: Option<AddLabelsConfig>,
    #[serde(rename = "update-issue", skip_serializing_if = "Option::is_none")]
    pub update_issue: Option<UpdateIssueConfig>,
    #[serde(rename = "create-pull-request", skip_serializing_if = "Option::is_none")]
    pub create_pull_request: Option<CreatePullRequestConfig>,
    #[serde(
        rename = "create-pull-request-review-comment",
        skip_serializing_if = "Option::is_none"
    )]
    pub create_pull_request_review_comment: Option<CreatePrReviewCommentConfig>,
    #[serde(
        rename = "push-to-pull-request-branch",
        skip_serializing_if = "Option::is_none"
    )]
    pub push_to_pull_request_branch: Option<PushToPrBranchConfig>,
    #[serde(rename = "create-discussion", skip_serializing_if = "Option::is_none")]
    pub create_discussion: Option<CreateDiscussionConfig>,
    #[serde(
        rename = "create-code-scanning-alert",
        skip_serializing_if = "Option::is_none"
    )]
    pub create_code_scanning_alert: Option<CreateCodeScanningAlertConfig>,
    #[serde(rename = "update-release", skip_serializing_if = "Option::is_none")]
    pub update_release: Option<UpdateReleaseConfig>,
    #[serde(rename = "update-project", skip_serializing_if = "Option::is_none")]
    pub update_project: Option<UpdateProjectConfig>,
    #[serde(rename = "upload-asset", skip_serializing_if = "Option::is_none")]
    pub upload_asset: Option<UploadAssetConfig>,
    #[serde(rename = "missing-tool", skip_serializing_if = "Option::is_none")]
    pub missing_tool: Option<MissingToolConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noop: Option<bool>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub jobs: IndexMap<String, CustomSafeJob>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
}

impl SafeOutputsConfig {
    /// True if any safe-output (besides `missing-tool` itself) is configured.
    pub fn has_any_besides_missing_tool(&self) -> bool {
        self.create_issue.is_some()
            || self.add_comment.is_some()
            || self.add_labels.is_some()
            || self.update_issue.is_some()
            || self.create_pull_request.is_some()
            || self.create_pull_request_review_comment.is_some()
            || self.push_to_pull_request_branch.is_some()
            || self.create_discussion.is_some()
            || self.create_code_scanning_alert.is_some()
            || self.update_release.is_some()
            || self.update_project.is_some()
            || self.upload_asset.is_some()
            || self.noop.unwrap_or(false)
            || !self.jobs.is_empty()
    }
}

/// Campaign correlation label (§GLOSSARY "Campaign").
pub type CampaignId = String;

/// The root, immutable, fully-validated workflow model (§3 `WorkflowData`).
/// Built once per source file by the model builder; never mutated after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<CampaignId>,
    #[serde(default)]
    pub strict: bool,
    pub on: OnConfig,
    #[serde(default)]
    pub permissions: Permissions,
    pub engine: EngineConfig,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tools: IndexMap<String, Value>,
    #[serde(default)]
    pub safe_outputs: SafeOutputsConfig,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub mcp_servers: IndexMap<String, McpServerDecl>,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxConfig>,
    #[serde(rename = "timeout-minutes", skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<String>,
    #[serde(rename = "runs-on", skip_serializing_if = "Option::is_none")]
    pub runs_on: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
}

/// A single safe-output item as emitted at runtime (§3, §6). The payload
/// is kept as a raw JSON object; typed accessors for each flavor live in
/// the `aw` crate's `safeoutputs` module next to their handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeOutputEntry {
    pub r#type: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

/// A rendered GitHub Actions step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub r#if: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub with: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(
        rename = "timeout-minutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_minutes: Option<u32>,
}

/// A rendered GitHub Actions job node (§3 `Job`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub r#if: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    #[serde(rename = "runs-on")]
    pub runs_on: String,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(
        rename = "timeout-minutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<JobStep>,
}

/// Per-workflow outcome classification, used by the batch summary (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Updated,
    Unchanged,
    Conflicted,
    Failed,
}

/// Rollup of [`Outcome`]s across one `compile`/`update` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub updated: u32,
    pub unchanged: u32,
    pub conflicted: u32,
    pub failed: u32,
}

impl OutcomeSummary {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Conflicted => self.conflicted += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.updated + self.unchanged + self.conflicted + self.failed
    }

    pub fn any_failed(&self) -> bool {
        self.failed > 0
    }
}

/// Manifest-spill stub text used when a safe-output payload field exceeds
/// the token budget (§3, §6).
pub fn spill_stub(file_name: &str) -> String {
    format!("[Content too large, saved to file: {file_name}]")
}

/// Hard limits on any single safe-output payload (§3, §4.E sanitization).
pub struct PayloadLimits;

impl PayloadLimits {
    pub const MAX_BYTES: usize = 524_288;
    pub const MAX_LINES: usize = 65_000;
    pub const SPILL_TOKEN_THRESHOLD: usize = 16_000;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DurationHolder(#[serde(with = "duration_serde")] pub Duration);

mod duration_serde {
    use super::{deserialize_duration, serialize_duration};
    use serde::{Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        serialize_duration(d, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        deserialize_duration(d)
    }
}

/// Backwards-compatible alias kept for call sites that think in terms of a
/// plain `name -> path` map of additional files bundled with a workflow.
pub type FileMap = BTreeMap<String, PathBuf>;

/// Timestamp type used for `stop-after:` once resolved to an absolute
/// instant (the frontmatter value itself may be a relative expression; see
/// `aw::model`).
pub type Timestamp = DateTime<Utc>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ref_parses_with_ref() {
        let s = SourceRef::parse("owner/repo/path/to/file.md@v1.2.3").unwrap();
        assert_eq!(s.owner, "owner");
        assert_eq!(s.repo, "repo");
        assert_eq!(s.path, "path/to/file.md");
        assert_eq!(s.r#ref.as_deref(), Some("v1.2.3"));
    }

    #[test]
    fn source_ref_parses_without_ref() {
        let s = SourceRef::parse("owner/repo/file.md").unwrap();
        assert_eq!(s.r#ref, None);
    }

    #[test]
    fn source_ref_rejects_too_few_segments() {
        assert!(SourceRef::parse("owner/repo").is_none());
    }

    #[test]
    fn tool_allowlist_wildcard_allows_everything() {
        let wl: ToolAllowlist = serde_json::from_str(r#"["*"]"#).unwrap();
        assert!(wl.is_wildcard());
        assert!(wl.allows("anything"));
    }

    #[test]
    fn tool_allowlist_named_is_exact() {
        let wl: ToolAllowlist = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert!(wl.allows("a"));
        assert!(!wl.allows("c"));
    }

    #[test]
    fn on_config_detects_sole_schedule_trigger() {
        let mut on = OnConfig::default();
        on.events.insert("schedule".into(), serde_json::json!([]));
        assert!(on.has_single_unattended_trigger());
    }

    #[test]
    fn on_config_bypass_list_matches_workflow_dispatch() {
        let mut on = OnConfig::default();
        on.events
            .insert("workflow_dispatch".into(), serde_json::Value::Null);
        assert!(on.bypasses_permission_check());
    }

    #[test]
    fn permissions_contents_read_only_has_no_write() {
        let p = Permissions::contents_read_only();
        assert!(!p.has_any_write());
    }

    #[test]
    fn outcome_summary_tracks_failures() {
        let mut s = OutcomeSummary::default();
        s.record(Outcome::Updated);
        s.record(Outcome::Failed);
        s.record(Outcome::Failed);
        assert_eq!(s.total(), 3);
        assert!(s.any_failed());
    }
}
