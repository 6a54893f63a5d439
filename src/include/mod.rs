//! Include Resolver
//!
//! Inlines `include "path"` directives relative to a base directory
//! supplied by the caller (spec §4.3). An unresolved path (missing file,
//! I/O error) produces an unresolved `IncludeDef` marker rather than a hard
//! failure: the node stays in the tree and downstream dependency analysis
//! reports the labels whose expressions reference the variables the
//! missing include would have defined. A cycle — revisiting a path already
//! on the current inlining stack — raises `ImseError::IncludeCycle`.

use crate::ast::{IncludeDef, Script};
use crate::error::ImseError;
use crate::parser::{parse_script, ParseMode};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Reads script source given a resolved path. Implemented as a trait so
/// tests can substitute an in-memory source set instead of touching the
/// filesystem.
pub trait ScriptSource {
    fn read(&self, path: &Path) -> std::io::Result<String>;
}

pub struct FsScriptSource;

impl ScriptSource for FsScriptSource {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Recursively inline every `include` directive found anywhere in `script`
/// (meta/params blocks never contain includes; only section/function
/// bodies do). `base_dir` is the directory `include "relative/path"` is
/// resolved against.
pub fn resolve_includes(mut script: Script, base_dir: &Path, source: &dyn ScriptSource, mode: ParseMode) -> Result<Script, ImseError> {
    let mut visited = HashSet::new();
    let mut still_unresolved = Vec::new();

    for inc in std::mem::take(&mut script.unresolved_includes) {
        match inc {
            IncludeDef::Unresolved { path, .. } => {
                let resolved_path = base_dir.join(&path);
                match inline_one(&resolved_path, source, &mut visited, mode) {
                    Ok(inlined) => {
                        script.functions.extend(inlined.functions);
                        script.sections.extend(inlined.sections);
                        if script.params.is_none() {
                            script.params = inlined.params;
                        }
                        still_unresolved.extend(inlined.unresolved_includes);
                    }
                    Err(ImseError::IncludeCycle { path }) => return Err(ImseError::IncludeCycle { path }),
                    Err(_) => {
                        still_unresolved.push(IncludeDef::Unresolved { path: path.clone(), reason: "could not read include file".to_string() });
                    }
                }
            }
            resolved @ IncludeDef::Resolved { .. } => still_unresolved.push(resolved),
        }
    }

    script.unresolved_includes = still_unresolved;
    Ok(script)
}

fn inline_one(path: &Path, source: &dyn ScriptSource, visited: &mut HashSet<PathBuf>, mode: ParseMode) -> Result<Script, ImseError> {
    let canonical = path.to_path_buf();
    if !visited.insert(canonical.clone()) {
        return Err(ImseError::IncludeCycle { path: path.display().to_string() });
    }

    let text = source.read(path).map_err(|e| ImseError::Syntax { position: 0, expected: "readable include".to_string(), got: e.to_string() })?;
    let outcome = parse_script(&text, mode)?;
    let mut inlined = outcome.script;

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut still_unresolved = Vec::new();
    for inc in std::mem::take(&mut inlined.unresolved_includes) {
        if let IncludeDef::Unresolved { path: sub_path, .. } = inc {
            let sub_resolved = base.join(&sub_path);
            match inline_one(&sub_resolved, source, visited, mode) {
                Ok(sub) => {
                    inlined.functions.extend(sub.functions);
                    inlined.sections.extend(sub.sections);
                    still_unresolved.extend(sub.unresolved_includes);
                }
                Err(ImseError::IncludeCycle { path }) => {
                    visited.remove(&canonical);
                    return Err(ImseError::IncludeCycle { path });
                }
                Err(_) => still_unresolved.push(IncludeDef::Unresolved { path: sub_path, reason: "could not read include file".to_string() }),
            }
        }
    }
    inlined.unresolved_includes = still_unresolved;

    visited.remove(&canonical);
    Ok(inlined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeSource(RefCell<HashMap<PathBuf, String>>);

    impl ScriptSource for FakeSource {
        fn read(&self, path: &Path) -> std::io::Result<String> {
            self.0
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "not found"))
        }
    }

    #[test]
    fn inlines_a_simple_include() {
        let mut map = HashMap::new();
        map.insert(PathBuf::from("/base/shared.imse"), "shared_val = 42\n".to_string());
        let source = FakeSource(RefCell::new(map));

        let outcome = parse_script("include \"shared.imse\"\nx = shared_val + 1\n", ParseMode::Strict).unwrap();
        let resolved = resolve_includes(outcome.script, Path::new("/base"), &source, ParseMode::Strict).unwrap();
        assert!(resolved.unresolved_includes.is_empty());
        assert_eq!(resolved.sections.iter().flat_map(|s| &s.assignments).count(), 2);
    }

    #[test]
    fn missing_include_stays_as_marker() {
        let source = FakeSource(RefCell::new(HashMap::new()));
        let outcome = parse_script("include \"missing.imse\"\nx = 1\n", ParseMode::Strict).unwrap();
        let resolved = resolve_includes(outcome.script, Path::new("/base"), &source, ParseMode::Strict).unwrap();
        assert_eq!(resolved.unresolved_includes.len(), 1);
    }

    #[test]
    fn detects_cycle() {
        let mut map = HashMap::new();
        map.insert(PathBuf::from("/base/a.imse"), "include \"b.imse\"\n".to_string());
        map.insert(PathBuf::from("/base/b.imse"), "include \"a.imse\"\n".to_string());
        let source = FakeSource(RefCell::new(map));

        let outcome = parse_script("include \"a.imse\"\n", ParseMode::Strict).unwrap();
        let result = resolve_includes(outcome.script, Path::new("/base"), &source, ParseMode::Strict);
        assert!(matches!(result, Err(ImseError::IncludeCycle { .. })));
    }
}
