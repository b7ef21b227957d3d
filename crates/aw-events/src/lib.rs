//! Append-only JSONL sink for [`SafeOutputEntry`] records (§3, §4.E, §6).
//!
//! At workflow runtime the agent engine writes one JSON object per line to
//! the file named by `GITHUB_AW_SAFE_OUTPUTS`; the safe-output jobs this
//! compiler emits then read that file back, one line per call to
//! `SafeOutputLog::read_from_file`. The format is intentionally the
//! simplest thing that supports incremental, crash-safe writes: appends
//! never require rewriting already-written lines.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use aw_types::SafeOutputEntry;

/// The environment variable naming the JSONL sink file.
pub const SAFE_OUTPUTS_ENV_VAR: &str = "GITHUB_AW_SAFE_OUTPUTS";

/// An in-memory view over a safe-output JSONL file.
#[derive(Debug, Clone, Default)]
pub struct SafeOutputLog {
    entries: Vec<SafeOutputEntry>,
}

/// A line that failed to parse as a [`SafeOutputEntry`], kept so callers
/// can surface a diagnostic instead of silently dropping agent output.
#[derive(Debug, Clone)]
pub struct MalformedLine {
    pub line_number: usize,
    pub raw: String,
    pub error: String,
}

impl SafeOutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: SafeOutputEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[SafeOutputEntry] {
        &self.entries
    }

    /// All entries whose `type` field matches `kind` exactly (the handler
    /// discriminator described in §3/§4.E).
    pub fn entries_of_type<'a>(
        &'a self,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a SafeOutputEntry> + 'a {
        self.entries.iter().filter(move |e| e.r#type == kind)
    }

    /// Append every recorded entry to `path` as newline-delimited JSON,
    /// creating the file if it doesn't exist. Existing content is
    /// preserved: this is an append, not a rewrite, matching the
    /// crash-safety the runtime sink depends on.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening safe-output sink {}", path.display()))?;
        for entry in &self.entries {
            let line = serde_json::to_string(entry)
                .with_context(|| "serializing safe-output entry".to_string())?;
            writeln!(file, "{line}")
                .with_context(|| format!("writing to safe-output sink {}", path.display()))?;
        }
        file.sync_all()
            .with_context(|| format!("fsyncing safe-output sink {}", path.display()))?;
        Ok(())
    }

    /// Read `path` strictly: any malformed line is a hard error. Returns
    /// an empty log if the file doesn't exist yet (the agent produced no
    /// safe outputs).
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let (log, malformed) = Self::read_from_file_lenient(path)?;
        if let Some(first) = malformed.first() {
            anyhow::bail!(
                "{}:{}: malformed safe-output line: {}",
                path.display(),
                first.line_number,
                first.error
            );
        }
        Ok(log)
    }

    /// Read `path`, collecting malformed lines instead of failing so the
    /// caller can decide whether to warn-and-continue or error out.
    pub fn read_from_file_lenient(path: &Path) -> Result<(Self, Vec<MalformedLine>)> {
        if !path.exists() {
            return Ok((Self::new(), Vec::new()));
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading safe-output sink {}", path.display()))?;
        let mut log = Self::new();
        let mut malformed = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SafeOutputEntry>(line) {
                Ok(entry) => log.record(entry),
                Err(e) => malformed.push(MalformedLine {
                    line_number: idx + 1,
                    raw: line.to_string(),
                    error: e.to_string(),
                }),
            }
        }
        Ok((log, malformed))
    }
}
