//! Import resolution and cycle detection (§4.A).
//!
//! A workflow's frontmatter may declare `imports: [path, ...]`, each
//! entry either a same-repository relative path or a fully-qualified
//! `owner/repo/path@ref`. Imports are resolved depth-first; the same
//! cycle-detection shape the teacher uses for its package dependency
//! graph (a visiting stack plus a finished set) catches `a` importing `b`
//! importing `a`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use aw_source::SourceFetcher;

use crate::error::CompileError;
use crate::frontmatter::{parse_source, ParsedSource};

/// One resolved import, in the order it should be merged (§4.A: imports
/// are merged in declaration order, with the entry file's own frontmatter
/// applied last so it always wins).
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub reference: String,
    pub parsed: ParsedSource,
}

/// The entry file plus every import it transitively pulls in, flattened
/// into merge order (deepest/earliest-declared first).
#[derive(Debug, Clone)]
pub struct ImportClosure {
    pub entry: ParsedSource,
    pub imports: Vec<ResolvedImport>,
}

struct Resolver<'a> {
    local_root: &'a Path,
    remote: Option<&'a dyn SourceFetcher>,
    visiting: Vec<String>,
    finished: BTreeSet<String>,
    collected: Vec<ResolvedImport>,
}

fn import_list(frontmatter: &serde_yaml::Value) -> Vec<String> {
    frontmatter
        .get("imports")
        .and_then(|v| v.as_sequence())
        .map(|seq| {
            seq.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

impl<'a> Resolver<'a> {
    fn load(&self, entry_path: &Path, reference: &str) -> Result<ParsedSource, CompileError> {
        let raw = aw_source::fetch_import(reference, self.local_root, self.remote).map_err(|e| {
            CompileError::RemoteFetchFailed {
                path: entry_path.to_path_buf(),
                import: reference.to_string(),
                source: e,
            }
        })?;
        parse_source(&PathBuf::from(reference), &raw)
    }

    fn visit(&mut self, entry_path: &Path, reference: &str) -> Result<(), CompileError> {
        if self.finished.contains(reference) {
            return Ok(());
        }
        if let Some(pos) = self.visiting.iter().position(|r| r == reference) {
            let mut cycle: Vec<&str> = self.visiting[pos..].iter().map(String::as_str).collect();
            cycle.push(reference);
            return Err(CompileError::ImportCycle {
                path: entry_path.to_path_buf(),
                cycle: cycle.join(" -> "),
            });
        }

        self.visiting.push(reference.to_string());
        let parsed = self.load(entry_path, reference)?;
        for nested in import_list(&parsed.frontmatter) {
            self.visit(entry_path, &nested)?;
        }
        self.visiting.pop();
        self.finished.insert(reference.to_string());
        self.collected.push(ResolvedImport {
            reference: reference.to_string(),
            parsed,
        });
        Ok(())
    }
}

/// Resolve every import the entry file (and its imports, transitively)
/// declares, in depth-first merge order, detecting cycles along the way.
pub fn resolve_imports(
    entry: ParsedSource,
    local_root: &Path,
    remote: Option<&dyn SourceFetcher>,
) -> Result<ImportClosure, CompileError> {
    let mut resolver = Resolver {
        local_root,
        remote,
        visiting: vec![entry.path.to_string_lossy().into_owned()],
        finished: BTreeSet::new(),
        collected: Vec::new(),
    };

    for reference in import_list(&entry.frontmatter) {
        resolver.visit(&entry.path, &reference)?;
    }

    Ok(ImportClosure {
        entry,
        imports: resolver.collected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn resolves_single_import() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "entry.md",
            "---\nname: Entry\nimports: [shared.md]\n---\nbody\n",
        );
        write(dir.path(), "shared.md", "---\nengine: claude\n---\nshared\n");

        let entry = parse_source(
            &dir.path().join("entry.md"),
            &fs::read_to_string(dir.path().join("entry.md")).unwrap(),
        )
        .unwrap();
        let closure = resolve_imports(entry, dir.path(), None).unwrap();
        assert_eq!(closure.imports.len(), 1);
        assert_eq!(closure.imports[0].reference, "shared.md");
    }

    #[test]
    fn detects_direct_cycle() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "---\nimports: [b.md]\n---\na\n");
        write(dir.path(), "b.md", "---\nimports: [a.md]\n---\nb\n");

        let entry = parse_source(
            &dir.path().join("a.md"),
            &fs::read_to_string(dir.path().join("a.md")).unwrap(),
        )
        .unwrap();
        let err = resolve_imports(entry, dir.path(), None).unwrap_err();
        assert!(matches!(err, CompileError::ImportCycle { .. }));
    }

    #[test]
    fn diamond_import_is_resolved_once() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "entry.md",
            "---\nimports: [a.md, b.md]\n---\nentry\n",
        );
        write(dir.path(), "a.md", "---\nimports: [shared.md]\n---\na\n");
        write(dir.path(), "b.md", "---\nimports: [shared.md]\n---\nb\n");
        write(dir.path(), "shared.md", "---\n{}\n---\nshared\n");

        let entry = parse_source(
            &dir.path().join("entry.md"),
            &fs::read_to_string(dir.path().join("entry.md")).unwrap(),
        )
        .unwrap();
        let closure = resolve_imports(entry, dir.path(), None).unwrap();
        let shared_count = closure
            .imports
            .iter()
            .filter(|i| i.reference == "shared.md")
            .count();
        assert_eq!(shared_count, 1);
    }

    #[test]
    fn missing_import_surfaces_as_remote_fetch_failed() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "entry.md",
            "---\nimports: [missing.md]\n---\nentry\n",
        );
        let entry = parse_source(
            &dir.path().join("entry.md"),
            &fs::read_to_string(dir.path().join("entry.md")).unwrap(),
        )
        .unwrap();
        let err = resolve_imports(entry, dir.path(), None).unwrap_err();
        assert!(matches!(err, CompileError::RemoteFetchFailed { .. }));
    }
}
