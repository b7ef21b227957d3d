use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use is_terminal::IsTerminal;

use aw::diagnostics::{Reporter, Severity, SummaryTracker};
use aw::error::CompileError;
use aw::frontmatter::parse_source;
use aw::jobgraph::RuntimePaths;
use aw::pipeline::{self, CompileOptions};
use aw::update::{self, MergeMode, StopAfterMode, UpdateOptions};
use aw_source::{GitHubSourceFetcher, LocalSourceFetcher, SourceFetcher};
use aw_types::{EngineId, Outcome, SourceRef};

#[derive(Parser, Debug)]
#[command(name = "aw", version)]
#[command(about = "Compiles agentic GitHub Actions workflows into security-hardened lock files")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile workflow sources into their `.lock.yml` (§4.A-G).
    Compile(CompileArgs),
    /// Refresh a workflow's vendored `source:` against its upstream (§4.H).
    Update(UpdateArgs),
}

#[derive(Parser, Debug)]
struct CompileArgs {
    /// Restrict to these workflow names (file stem, no extension). All
    /// workflows under `--workflows-dir` if omitted.
    names: Vec<String>,

    /// Print every diagnostic, including import merge conflicts.
    #[arg(long)]
    verbose: bool,

    /// Run every stage but never write a lock file.
    #[arg(long)]
    validate: bool,

    /// Alias for `--validate`: compile in memory only.
    #[arg(long)]
    no_emit: bool,

    /// Force strict mode on, even if the source didn't declare it.
    #[arg(long)]
    strict: bool,

    /// Override the declared engine for every compiled workflow.
    #[arg(long)]
    engine: Option<String>,

    /// Remove `*.lock.yml` files whose source `.md` no longer exists.
    #[arg(long)]
    purge: bool,

    /// Recompile on source changes until interrupted.
    #[arg(long)]
    watch: bool,

    /// Directory holding `*.md` workflow sources.
    #[arg(long, default_value = ".github/workflows")]
    workflows_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct UpdateArgs {
    /// Restrict to these workflow names (file stem, no extension).
    names: Vec<String>,

    /// Allow crossing a major SemVer version when resolving the latest tag.
    #[arg(long)]
    major: bool,

    /// Proceed even if the resolved ref is unchanged.
    #[arg(long)]
    force: bool,

    /// 3-way merge local edits against the upstream change instead of
    /// overriding local content outright.
    #[arg(long)]
    merge: bool,

    /// Override the declared engine when recompiling after the update.
    #[arg(long)]
    engine: Option<String>,

    /// Directory holding `*.md` workflow sources.
    #[arg(long, default_value = ".github/workflows")]
    dir: PathBuf,

    /// Clear any `on.stop-after` field.
    #[arg(long, conflicts_with = "stop_after")]
    no_stop_after: bool,

    /// Set `on.stop-after` to this value.
    #[arg(long)]
    stop_after: Option<String>,

    /// Open a pull request with the updated sources instead of leaving
    /// them as working-tree changes.
    #[arg(long)]
    pr: bool,
}

/// Renders [`Reporter`] calls to stderr, colored when attached to a TTY —
/// the one place this binary talks to the terminal (§7).
struct CliReporter {
    verbose: bool,
    color: bool,
}

impl CliReporter {
    fn new(verbose: bool) -> Self {
        Self {
            verbose,
            color: std::io::stderr().is_terminal(),
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\u{1b}[{code}m{text}\u{1b}[0m")
        } else {
            text.to_string()
        }
    }
}

impl Reporter for CliReporter {
    fn info(&self, message: &str) {
        eprintln!("{} {message}", self.paint("36", "[info]"));
    }

    fn warn(&self, message: &str) {
        eprintln!("{} {message}", self.paint("33", "[warn]"));
    }

    fn error(&self, message: &str) {
        eprintln!("{} {message}", self.paint("31", "[error]"));
    }

    fn conflict_reported(&self, workflow: &str, field: &str, winner: &str, loser: &str) {
        if self.verbose {
            self.warn(&format!(
                "{workflow}: field `{field}` set by both `{winner}` and `{loser}`; `{winner}` wins"
            ));
        }
    }
}

fn parse_engine(name: &str) -> Result<EngineId> {
    match name {
        "claude" => Ok(EngineId::Claude),
        "codex" => Ok(EngineId::Codex),
        "copilot" => Ok(EngineId::Copilot),
        "custom" => Ok(EngineId::Custom),
        other => bail!("unknown engine `{other}` (expected claude, codex, copilot, or custom)"),
    }
}

/// Every `*.md` directly under `dir`, filtered to `names` (matched against
/// the file stem) when non-empty.
fn discover_workflows(dir: &Path, names: &[String]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("reading workflow directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        if !names.is_empty() {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            if !names.iter().any(|n| n == stem) {
                continue;
            }
        }
        found.push(path);
    }
    found.sort();
    Ok(found)
}

fn lock_path_for(entry: &Path) -> PathBuf {
    entry.with_extension("lock.yml")
}

fn run_compile(args: CompileArgs, reporter: &CliReporter) -> Result<bool> {
    let engine_override = args.engine.as_deref().map(parse_engine).transpose()?;
    let workflows = discover_workflows(&args.workflows_dir, &args.names)?;

    let mut tracker = SummaryTracker::default();
    let mut any_failed = false;

    for entry in &workflows {
        let options = CompileOptions {
            reporter,
            remote: None,
            paths: RuntimePaths::default(),
            force_token_env: None,
            engine_override,
            force_strict: args.strict,
        };

        let outcome = if args.validate || args.no_emit {
            match pipeline::compile_workflow(entry, &args.workflows_dir, &options) {
                Ok(_) => Outcome::Unchanged,
                Err(e) => {
                    reporter.error(&format!("{}: {e}", entry.display()));
                    Outcome::Failed
                }
            }
        } else {
            let lock_path = lock_path_for(entry);
            match pipeline::compile_and_update(entry, &args.workflows_dir, &lock_path, &options) {
                Ok(o) => o,
                Err(e) => {
                    reporter.error(&format!("{}: {e}", entry.display()));
                    Outcome::Failed
                }
            }
        };

        if outcome == Outcome::Failed {
            any_failed = true;
        }
        tracker.record(outcome);
    }

    if args.purge {
        match pipeline::purge_orphan_locks(&args.workflows_dir) {
            Ok(removed) => {
                for path in removed {
                    reporter.info(&format!("purged orphan lock {}", path.display()));
                }
            }
            Err(e) => {
                reporter.error(&e.to_string());
                any_failed = true;
            }
        }
    }

    tracker.finish(reporter);

    if args.watch {
        watch_loop(&args.workflows_dir, &args.names, engine_override, args.strict, reporter)?;
    }

    Ok(!any_failed)
}

/// Polls `dir` every 250ms (§5 watch-mode debounce) and recompiles any
/// `.md` whose mtime advanced since the last pass. Recompiles run one at
/// a time on this thread, so two passes over the same file never overlap.
fn watch_loop(
    dir: &Path,
    names: &[String],
    engine_override: Option<EngineId>,
    force_strict: bool,
    reporter: &CliReporter,
) -> Result<()> {
    reporter.info(&format!("watching {} for changes (ctrl-c to stop)", dir.display()));
    let mut last_seen: std::collections::HashMap<PathBuf, std::time::SystemTime> =
        std::collections::HashMap::new();

    loop {
        std::thread::sleep(Duration::from_millis(250));
        let tick = Instant::now();
        let workflows = discover_workflows(dir, names)?;
        for entry in &workflows {
            let modified = fs::metadata(entry).and_then(|m| m.modified()).ok();
            let changed = match (last_seen.get(entry), modified) {
                (Some(prev), Some(now)) => now > *prev,
                (None, Some(_)) => true,
                _ => false,
            };
            if let Some(now) = modified {
                last_seen.insert(entry.clone(), now);
            }
            if !changed {
                continue;
            }
            let options = CompileOptions {
                reporter,
                remote: None,
                paths: RuntimePaths::default(),
                force_token_env: None,
                engine_override,
                force_strict,
            };
            let lock_path = lock_path_for(entry);
            match pipeline::compile_and_update(entry, dir, &lock_path, &options) {
                Ok(outcome) => reporter.info(&format!("{}: {outcome:?}", entry.display())),
                Err(e) => reporter.error(&format!("{}: {e}", entry.display())),
            }
        }
        let _ = tick.elapsed();
    }
}

fn run_update(args: UpdateArgs, reporter: &CliReporter) -> Result<bool> {
    if args.stop_after.is_some() && args.no_stop_after {
        bail!("--stop-after and --no-stop-after are mutually exclusive");
    }
    let engine_override = args.engine.as_deref().map(parse_engine).transpose()?;
    let stop_after = match (&args.stop_after, args.no_stop_after) {
        (Some(v), _) => StopAfterMode::Set(v.clone()),
        (None, true) => StopAfterMode::Clear,
        (None, false) => StopAfterMode::Unchanged,
    };
    let merge = if args.merge {
        MergeMode::Merge
    } else {
        MergeMode::Override
    };

    let token = std::env::var("GITHUB_TOKEN").ok();
    let fetcher: Box<dyn SourceFetcher> = match &token {
        Some(t) => Box::new(GitHubSourceFetcher::new(Some(t.clone()))?),
        None => Box::new(LocalSourceFetcher::new(&args.dir)),
    };

    let update_options = UpdateOptions {
        fetcher: fetcher.as_ref(),
        allow_major_bump: args.major,
        force: args.force,
        merge,
        stop_after,
    };

    let workflows = discover_workflows(&args.dir, &args.names)?;
    let mut tracker = SummaryTracker::default();
    let mut any_failed = false;
    let mut updated_paths = Vec::new();

    for entry in &workflows {
        let raw = fs::read_to_string(entry)
            .with_context(|| format!("reading {}", entry.display()))?;
        let parsed = parse_source(entry, &raw)?;
        let Some(source_raw) = parsed.frontmatter.get("source").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(source_ref) = SourceRef::parse(source_raw) else {
            reporter.warn(&format!(
                "{}: `source: {source_raw}` is not a valid owner/repo/path[@ref]",
                entry.display()
            ));
            any_failed = true;
            tracker.record(Outcome::Failed);
            continue;
        };

        let result = update::update_source(&raw, &source_ref, &update_options)
            .map_err(|e| anyhow::anyhow!(e));
        let result = match result {
            Ok(r) => r,
            Err(e) => {
                reporter.error(&format!("{}: {e}", entry.display()));
                any_failed = true;
                tracker.record(Outcome::Failed);
                continue;
            }
        };

        match result.outcome {
            Outcome::Unchanged => {
                reporter.info(&format!("{}: already at latest ref", entry.display()));
                tracker.record(Outcome::Unchanged);
            }
            Outcome::Updated => {
                let content = result.new_content.expect("Updated carries new_content");
                fs::write(entry, &content)
                    .with_context(|| format!("writing {}", entry.display()))?;
                let options = CompileOptions {
                    reporter,
                    remote: None,
                    paths: RuntimePaths::default(),
                    force_token_env: None,
                    engine_override,
                    force_strict: false,
                };
                let lock_path = lock_path_for(entry);
                match pipeline::compile_and_update(entry, &args.dir, &lock_path, &options) {
                    Ok(_) => {
                        reporter.info(&format!(
                            "{}: updated to {}",
                            entry.display(),
                            result.resolved_ref.unwrap_or_default()
                        ));
                        tracker.record(Outcome::Updated);
                        updated_paths.push(entry.clone());
                    }
                    Err(e) => {
                        reporter.error(&format!("{}: {e}", entry.display()));
                        any_failed = true;
                        tracker.record(Outcome::Failed);
                    }
                }
            }
            Outcome::Conflicted => {
                let markers = result.conflict_markers.expect("Conflicted carries markers");
                fs::write(entry, &markers)
                    .with_context(|| format!("writing {}", entry.display()))?;
                let err = CompileError::MergeConflict {
                    path: entry.clone(),
                    markers,
                };
                reporter.error(&err.to_string());
                any_failed = true;
                tracker.record(Outcome::Conflicted);
            }
            Outcome::Failed => unreachable!("update_source never returns Failed directly"),
        }
    }

    tracker.finish(reporter);

    if args.pr && !updated_paths.is_empty() {
        open_update_pull_request(&args.dir, &updated_paths, reporter)?;
    }

    Ok(!any_failed)
}

fn open_update_pull_request(
    repo_root: &Path,
    updated_paths: &[PathBuf],
    reporter: &CliReporter,
) -> Result<()> {
    let Some(token) = std::env::var("GITHUB_TOKEN").ok() else {
        bail!("--pr requires GITHUB_TOKEN to open a pull request");
    };
    let origin = std::env::var("AW_GITHUB_REPOSITORY")
        .context("--pr requires AW_GITHUB_REPOSITORY (owner/repo) to target a pull request")?;
    let (owner, repo) = origin
        .split_once('/')
        .context("AW_GITHUB_REPOSITORY must be `owner/repo`")?;

    let base_branch = aw_git::GitContext::capture(repo_root)
        .branch
        .unwrap_or_else(|| "main".to_string());
    let head_branch = "aw-update/sources".to_string();
    let message = format!("aw update: refresh {} workflow source(s)", updated_paths.len());

    aw_git::create_branch_and_commit(repo_root, &head_branch, &message)?;
    aw_git::push_branch(repo_root, "origin", &head_branch)?;

    let body = updated_paths
        .iter()
        .map(|p| format!("- {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    let url = aw_source::open_pull_request(
        &token,
        owner,
        repo,
        &head_branch,
        &base_branch,
        "aw update: refresh workflow sources",
        &body,
    )?;
    reporter.info(&format!("opened pull request {url}"));
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let ok = match cli.cmd {
        Commands::Compile(args) => {
            let reporter = CliReporter::new(args.verbose);
            run_compile(args, &reporter)?
        }
        Commands::Update(args) => {
            let reporter = CliReporter::new(false);
            run_update(args, &reporter)?
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_engine_accepts_known_names_and_rejects_others() {
        assert!(matches!(parse_engine("claude"), Ok(EngineId::Claude)));
        assert!(matches!(parse_engine("codex"), Ok(EngineId::Codex)));
        assert!(parse_engine("bogus").is_err());
    }

    #[test]
    fn discover_workflows_filters_by_name_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "---\n---\nbody\n").unwrap();
        std::fs::write(dir.path().join("b.md"), "---\n---\nbody\n").unwrap();
        std::fs::write(dir.path().join("a.lock.yml"), "name: A\n").unwrap();

        let all = discover_workflows(dir.path(), &[]).unwrap();
        assert_eq!(all.len(), 2);

        let filtered = discover_workflows(dir.path(), &["a".to_string()]).unwrap();
        assert_eq!(filtered, vec![dir.path().join("a.md")]);
    }

    #[test]
    fn lock_path_for_replaces_extension() {
        let entry = PathBuf::from("/workflows/demo.md");
        assert_eq!(lock_path_for(&entry), PathBuf::from("/workflows/demo.lock.yml"));
    }

    #[test]
    fn cli_reporter_methods_are_callable() {
        let reporter = CliReporter::new(true);
        reporter.info("info");
        reporter.warn("warn");
        reporter.error("error");
    }

    #[test]
    fn compile_end_to_end_writes_a_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wf.md"),
            "---\nname: Demo\non: { push: {} }\nengine: claude\n---\nRun.\n",
        )
        .unwrap();

        let reporter = CliReporter::new(false);
        let args = CompileArgs {
            names: vec![],
            verbose: false,
            validate: false,
            no_emit: false,
            strict: false,
            engine: None,
            purge: false,
            watch: false,
            workflows_dir: dir.path().to_path_buf(),
        };
        let ok = run_compile(args, &reporter).unwrap();
        assert!(ok);
        assert!(dir.path().join("wf.lock.yml").exists());
    }

    #[test]
    fn compile_validate_never_writes_a_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wf.md"),
            "---\nname: Demo\non: { push: {} }\nengine: claude\n---\nRun.\n",
        )
        .unwrap();

        let reporter = CliReporter::new(false);
        let args = CompileArgs {
            names: vec![],
            verbose: false,
            validate: true,
            no_emit: false,
            strict: false,
            engine: None,
            purge: false,
            watch: false,
            workflows_dir: dir.path().to_path_buf(),
        };
        let ok = run_compile(args, &reporter).unwrap();
        assert!(ok);
        assert!(!dir.path().join("wf.lock.yml").exists());
    }

    #[test]
    fn compile_purge_removes_orphaned_locks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orphan.lock.yml"), "name: O\n").unwrap();

        let reporter = CliReporter::new(false);
        let args = CompileArgs {
            names: vec![],
            verbose: false,
            validate: false,
            no_emit: false,
            strict: false,
            engine: None,
            purge: true,
            watch: false,
            workflows_dir: dir.path().to_path_buf(),
        };
        run_compile(args, &reporter).unwrap();
        assert!(!dir.path().join("orphan.lock.yml").exists());
    }
}
