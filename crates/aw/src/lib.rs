//! Compiles agentic GitHub Actions workflows (Markdown + YAML frontmatter)
//! into security-hardened, deterministic GitHub Actions lock files.
//!
//! [`pipeline`] is the entry point most callers want:
//! [`pipeline::compile_workflow`] for a pure in-memory compile, or
//! [`pipeline::compile_and_update`] to also write the result to a lock
//! file on disk. [`update`] is the separate operation that refreshes a
//! workflow's vendored `source:` against its upstream and recompiles.
//! Everything else in this crate is one stage of that pipeline, exposed
//! publicly so a caller that needs finer control (or just wants to unit
//! test a stage in isolation, as every module here does) isn't forced
//! through the orchestrator.

pub mod diagnostics;
pub mod engines;
pub mod error;
pub mod frontmatter;
pub mod imports;
pub mod jobgraph;
pub mod lock;
pub mod mcp;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod safeoutputs;
pub mod update;

pub use diagnostics::{CapturingReporter, NullReporter, Reporter, Severity, SummaryTracker};
pub use error::CompileError;
pub use jobgraph::RuntimePaths;
pub use lock::LockFile;
pub use pipeline::{compile_and_update, compile_workflow, outcome_of, purge_orphan_locks, CompileOptions};
pub use update::{update_source, MergeMode, SourceUpdate, StopAfterMode, UpdateOptions};
