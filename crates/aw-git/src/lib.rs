//! Git plumbing used by the update/merge pipeline (Component H): resolving
//! refs, checking working-tree cleanliness, staging a source-ref bump for
//! a pull request, and three-way merging a workflow's local edits against
//! an upstream change to its vendored source.
//!
//! All of this shells out to the `git` binary on `PATH` rather than
//! linking `libgit2` — the compiler only ever needs a handful of plumbing
//! commands, and a subprocess keeps the dependency footprint down the way
//! the rest of this workspace's process wrappers do.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// The outcome of running a git subprocess.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn ok(&self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            anyhow::bail!(
                "git command failed (exit {:?}): {}",
                self.exit_code,
                self.stderr.trim()
            )
        }
    }
}

fn run(args: &[&str], cwd: &Path) -> Result<CommandResult> {
    let started = Instant::now();
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("spawning `git {}`", args.join(" ")))?;
    Ok(CommandResult {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration: started.elapsed(),
        timed_out: false,
    })
}

/// True if `path` is (inside) a git working tree.
pub fn is_git_repo(path: &Path) -> bool {
    run(&["rev-parse", "--is-inside-work-tree"], path)
        .map(|r| r.success)
        .unwrap_or(false)
}

/// True if the working tree at `path` has no uncommitted changes.
pub fn is_clean(path: &Path) -> Result<bool> {
    let result = run(&["status", "--porcelain"], path)?;
    result.ok()?;
    Ok(result.stdout.trim().is_empty())
}

/// Resolve `git_ref` (a branch, tag, or partial SHA) to its full commit
/// SHA in the repository at `path`.
pub fn resolve_ref(path: &Path, git_ref: &str) -> Result<String> {
    let result = run(&["rev-parse", git_ref], path)?;
    result.ok()?;
    Ok(result.stdout.trim().to_string())
}

/// The current commit, branch (if on one), and dirty flag for `path`.
#[derive(Debug, Clone, Default)]
pub struct GitContext {
    pub commit: Option<String>,
    pub branch: Option<String>,
    pub dirty: bool,
}

impl GitContext {
    pub fn capture(path: &Path) -> Self {
        if !is_git_repo(path) {
            return Self::default();
        }
        let commit = run(&["rev-parse", "HEAD"], path)
            .ok()
            .filter(|r| r.success)
            .map(|r| r.stdout.trim().to_string());
        let branch = run(&["symbolic-ref", "--short", "-q", "HEAD"], path)
            .ok()
            .filter(|r| r.success && !r.stdout.trim().is_empty())
            .map(|r| r.stdout.trim().to_string());
        let dirty = !is_clean(path).unwrap_or(true);
        Self {
            commit,
            branch,
            dirty,
        }
    }

    pub fn short_commit(&self) -> Option<String> {
        self.commit.as_ref().map(|c| c.chars().take(12).collect())
    }
}

/// Create and check out `branch`, stage everything, and commit with
/// `message`. Used by `update --pr` (§6) to stage a source-ref bump
/// before opening a pull request.
pub fn create_branch_and_commit(repo_path: &Path, branch: &str, message: &str) -> Result<()> {
    run(&["checkout", "-b", branch], repo_path)?.ok()?;
    run(&["add", "-A"], repo_path)?.ok()?;
    run(&["commit", "-q", "-m", message], repo_path)?.ok()
}

/// Push `branch` to `remote`, creating the upstream ref if needed.
pub fn push_branch(repo_path: &Path, remote: &str, branch: &str) -> Result<()> {
    run(&["push", "-u", remote, branch], repo_path)?.ok()
}

/// The unified diff between two file contents, produced via
/// `git diff --no-index` so it works outside a repository too.
pub fn diff_text(path: &Path, old: &str, new: &str) -> Result<String> {
    let dir = tempfile::tempdir().context("creating diff scratch dir")?;
    let old_path = dir.path().join("old");
    let new_path = dir.path().join("new");
    std::fs::write(&old_path, old)?;
    std::fs::write(&new_path, new)?;
    let result = run(
        &[
            "diff",
            "--no-index",
            "--no-color",
            old_path.to_str().unwrap(),
            new_path.to_str().unwrap(),
        ],
        path,
    )?;
    // `git diff --no-index` exits 1 when there is a difference; that's
    // not a failure for our purposes.
    if result.exit_code.is_some_and(|c| c > 1) {
        result.ok()?;
    }
    Ok(result.stdout)
}

/// Result of a three-way merge attempt (Component H).
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// The merge applied cleanly; this is the merged content.
    Clean(String),
    /// The merge produced conflicts; this is the content with
    /// `<<<<<<<`/`|||||||`/`=======`/`>>>>>>>` diff3-style markers.
    Conflicted(String),
}

/// Three-way merge `ours` and `theirs` against `base` using
/// `git merge-file --diff3`, the same plumbing command a `git rebase`
/// conflict uses under the hood. Used by `update --merge` to reconcile a
/// workflow's local hand-edits (`ours`) against the upstream version at
/// the newly resolved ref (`theirs`), on top of the version at the
/// previously pinned ref (`base`).
pub fn three_way_merge(base: &str, ours: &str, theirs: &str) -> Result<MergeOutcome> {
    let dir = tempfile::tempdir().context("creating merge scratch dir")?;
    let ours_path = dir.path().join("ours");
    let base_path = dir.path().join("base");
    let theirs_path = dir.path().join("theirs");
    std::fs::write(&ours_path, ours)?;
    std::fs::write(&base_path, base)?;
    std::fs::write(&theirs_path, theirs)?;

    let result = run(
        &[
            "merge-file",
            "--diff3",
            "-p",
            "-L",
            "current",
            "-L",
            "base",
            "-L",
            "new",
            ours_path.to_str().unwrap(),
            base_path.to_str().unwrap(),
            theirs_path.to_str().unwrap(),
        ],
        dir.path(),
    )?;

    match result.exit_code {
        Some(0) => Ok(MergeOutcome::Clean(result.stdout)),
        Some(n) if n > 0 => Ok(MergeOutcome::Conflicted(result.stdout)),
        _ => {
            result.ok()?;
            unreachable!("ok() returns Err for any non-success result")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &Path) {
        run(&["init", "-q"], dir).unwrap().ok().unwrap();
        run(&["config", "user.email", "test@example.com"], dir)
            .unwrap()
            .ok()
            .unwrap();
        run(&["config", "user.name", "Test"], dir).unwrap().ok().unwrap();
    }

    #[test]
    fn is_git_repo_detects_initialized_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_git_repo(dir.path()));
        init_repo(dir.path());
        assert!(is_git_repo(dir.path()));
    }

    #[test]
    fn clean_repo_reports_clean() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("f.txt"), "hello").unwrap();
        run(&["add", "."], dir.path()).unwrap().ok().unwrap();
        run(&["commit", "-q", "-m", "init"], dir.path())
            .unwrap()
            .ok()
            .unwrap();
        assert!(is_clean(dir.path()).unwrap());
    }

    #[test]
    fn dirty_working_tree_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("f.txt"), "hello").unwrap();
        assert!(!is_clean(dir.path()).unwrap());
    }

    #[test]
    fn three_way_merge_clean_when_only_one_side_changes() {
        let base = "line1\nline2\nline3\n";
        let ours = "line1\nline2\nline3\n";
        let theirs = "line1\nCHANGED\nline3\n";
        match three_way_merge(base, ours, theirs).unwrap() {
            MergeOutcome::Clean(merged) => assert_eq!(merged, "line1\nCHANGED\nline3\n"),
            MergeOutcome::Conflicted(_) => panic!("expected clean merge"),
        }
    }

    #[test]
    fn three_way_merge_conflicts_on_both_sides_changing_same_line() {
        let base = "line1\nline2\nline3\n";
        let ours = "line1\nOURS\nline3\n";
        let theirs = "line1\nTHEIRS\nline3\n";
        match three_way_merge(base, ours, theirs).unwrap() {
            MergeOutcome::Clean(_) => panic!("expected a conflict"),
            MergeOutcome::Conflicted(text) => {
                assert!(text.contains("<<<<<<< current"));
                assert!(text.contains("||||||| base"));
                assert!(text.contains(">>>>>>> new"));
            }
        }
    }

    #[test]
    fn resolve_ref_returns_full_sha() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("f.txt"), "hello").unwrap();
        run(&["add", "."], dir.path()).unwrap().ok().unwrap();
        run(&["commit", "-q", "-m", "init"], dir.path())
            .unwrap()
            .ok()
            .unwrap();
        let sha = resolve_ref(dir.path(), "HEAD").unwrap();
        assert_eq!(sha.len(), 40);
    }

    #[test]
    fn git_context_on_non_repo_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = GitContext::capture(dir.path());
        assert!(ctx.commit.is_none());
        assert!(!ctx.dirty);
    }

    #[test]
    fn create_branch_and_commit_produces_a_new_commit_on_a_new_branch() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("f.txt"), "base\n").unwrap();
        run(&["add", "."], dir.path()).unwrap().ok().unwrap();
        run(&["commit", "-q", "-m", "init"], dir.path())
            .unwrap()
            .ok()
            .unwrap();
        let base_sha = resolve_ref(dir.path(), "HEAD").unwrap();

        std::fs::write(dir.path().join("f.txt"), "updated\n").unwrap();
        create_branch_and_commit(dir.path(), "aw-update/f", "bump source ref").unwrap();

        let branch = run(&["symbolic-ref", "--short", "-q", "HEAD"], dir.path())
            .unwrap()
            .stdout
            .trim()
            .to_string();
        assert_eq!(branch, "aw-update/f");
        let new_sha = resolve_ref(dir.path(), "HEAD").unwrap();
        assert_ne!(new_sha, base_sha);
    }
}
