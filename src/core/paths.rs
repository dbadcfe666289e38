//! Path helpers for scan-root resolution.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolve a scan root to an absolute path.
///
/// Existing paths are canonicalized so a symlinked root resolves to its
/// target before traversal begins (the walk itself never follows links).
/// Nonexistent paths are made absolute against the working directory with
/// `.`/`..` components folded syntactically, so error messages still show
/// a sensible absolute path.
pub fn resolve_scan_root(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };
    fold_dots(&absolute)
}

fn fold_dots(path: &Path) -> PathBuf {
    let mut kept = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                kept.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = kept.last() {
                    kept.pop();
                }
            }
        }
    }
    kept.into_iter().collect()
}
