//! Shared path manipulation utilities.
//!
//! Trust-sensitive callers (the script validator) must pair these helpers
//! with their own policy checks: syntactic normalization alone cannot prove
//! a path stays inside an allowed root once symlinks are involved, so the
//! validator re-canonicalizes and prefix-checks after every resolution step.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Expand a leading `~` or `~/` to the user's home directory.
///
/// Paths without the shorthand are returned unchanged. If `HOME` is unset
/// the shorthand is left literal; the later not-found failure names the
/// offending path instead of guessing.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if s == "~" {
        return env::var_os("HOME").map_or_else(|| path.to_path_buf(), PathBuf::from);
    }
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve
/// symlinks and normalize components. If it fails (e.g. path does not
/// exist), the path is made absolute relative to CWD and `..`/`.`
/// components are resolved syntactically.
#[must_use]
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    // Try filesystem resolution first (handles symlinks).
    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    // Fallback: syntactic normalization.
    normalize_syntactic(&absolute)
}

/// Whether `path` contains any `..` component before normalization.
#[must_use]
pub fn has_parent_component(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::ParentDir))
}

/// Whether `path` sits under `root` (component-wise prefix, not string prefix).
///
/// `/opt/widgets-evil` is NOT under `/opt/widgets`.
#[must_use]
pub fn is_under_root(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
