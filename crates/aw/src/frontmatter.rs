//! Splits a workflow source file into its YAML frontmatter block and
//! Markdown prompt body (§3, §4.A).
//!
//! The format is the common `---`-delimited frontmatter convention: the
//! file must open with a line containing exactly `---`, and the
//! frontmatter ends at the next line containing exactly `---`. Everything
//! after that second delimiter is the prompt body, kept as raw text —
//! this compiler never parses or alters Markdown content itself, only the
//! structured YAML above it.

use std::path::{Path, PathBuf};

use crate::error::CompileError;

/// One source file split into its two halves.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub path: PathBuf,
    pub frontmatter: serde_yaml::Value,
    pub frontmatter_raw: String,
    pub body: String,
}

const DELIMITER: &str = "---";

/// Parse `raw` (the full contents of the file at `path`) into frontmatter
/// and body.
pub fn parse_source(path: &Path, raw: &str) -> Result<ParsedSource, CompileError> {
    let mut lines = raw.lines();

    let Some(first) = lines.next() else {
        return Err(CompileError::MalformedSource {
            path: path.to_path_buf(),
            line: 1,
            detail: "file is empty".to_string(),
        });
    };
    if first.trim_end() != DELIMITER {
        return Err(CompileError::MalformedSource {
            path: path.to_path_buf(),
            line: 1,
            detail: "file must begin with a `---` frontmatter delimiter".to_string(),
        });
    }

    let mut frontmatter_lines = Vec::new();
    let mut closing_line = None;
    for (idx, line) in lines.by_ref().enumerate() {
        if line.trim_end() == DELIMITER {
            closing_line = Some(idx + 2); // +1 for the opening line, +1 for 1-indexing
            break;
        }
        frontmatter_lines.push(line);
    }

    let Some(closing_line) = closing_line else {
        return Err(CompileError::MalformedSource {
            path: path.to_path_buf(),
            line: 1,
            detail: "frontmatter is not closed with a `---` delimiter".to_string(),
        });
    };

    let frontmatter_raw = frontmatter_lines.join("\n");
    let frontmatter: serde_yaml::Value = serde_yaml::from_str(&frontmatter_raw).map_err(|e| {
        CompileError::MalformedSource {
            path: path.to_path_buf(),
            line: e.location().map(|l| l.line() + 1).unwrap_or(2),
            detail: format!("invalid YAML frontmatter: {e}"),
        }
    })?;

    let body = raw
        .splitn(closing_line + 1, '\n')
        .nth(closing_line)
        .unwrap_or("")
        .to_string();

    Ok(ParsedSource {
        path: path.to_path_buf(),
        frontmatter,
        frontmatter_raw,
        body,
    })
}
