use std::path::{Component, Path, PathBuf};

use crate::errors::{ToolError, ToolResult};

/// Resolve `candidate` against `root` and verify the result stays inside `root`.
///
/// This is pure path arithmetic: no filesystem access, so it works for paths
/// that do not exist yet (e.g. a file about to be written). Every tool that
/// accepts a path or working directory must call this before any I/O.
pub fn ensure_contained(candidate: impl AsRef<Path>, root: impl AsRef<Path>) -> ToolResult<PathBuf> {
    let candidate = candidate.as_ref();
    let root = normalize(root.as_ref());

    let resolved = if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&root.join(candidate))
    };

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(ToolError::PathEscape(candidate.display().to_string()))
    }
}

/// Collapse `.` and `..` segments without touching the filesystem.
///
/// Popping past the root of an absolute path stays at the root; a relative
/// path keeps its leading `..` segments so the containment check still fails.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir),
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match normalized.components().next_back() {
                    Some(Component::Normal(_)) => normalized.pop(),
                    _ => false,
                };
                if !popped && !path.is_absolute() {
                    normalized.push(Component::ParentDir);
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}
