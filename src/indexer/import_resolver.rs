//! Turns import specifiers into files on disk.
//!
//! Only relative (`./`, `../`) and rooted (`/`) specifiers are resolved by the
//! generic helpers here; language extractors decide what counts as local.

use std::path::{Component, Path, PathBuf};

use crate::model::relative_path;

/// Lexically resolves `.` and `..` without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Base path a relative or rooted specifier points at, before extension probing.
pub fn specifier_base(specifier: &str, file: &Path, repo_root: &Path) -> Option<PathBuf> {
    if is_relative_specifier(specifier) {
        let dir = file.parent()?;
        Some(normalize_lexically(&dir.join(specifier)))
    } else if let Some(rooted) = specifier.strip_prefix('/') {
        Some(normalize_lexically(&repo_root.join(rooted)))
    } else {
        None
    }
}

fn with_suffix(base: &Path, ext: &str) -> PathBuf {
    let mut raw = base.as_os_str().to_os_string();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

/// Probes `base` as a file, then `base.<ext>` for each extension, then
/// `base/<index>.<ext>`. First existing file wins.
pub fn probe_module(base: &Path, extensions: &[&str], index_names: &[&str]) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }
    for ext in extensions {
        let candidate = with_suffix(base, ext);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    if base.is_dir() {
        for index in index_names {
            for ext in extensions {
                let candidate = with_suffix(&base.join(index), ext);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

/// Repository-relative path of `candidate`, or `None` when it lies outside `repo_root`.
pub fn path_within_root(candidate: &Path, repo_root: &Path) -> Option<String> {
    let resolved = candidate
        .canonicalize()
        .unwrap_or_else(|_| normalize_lexically(candidate));
    let stripped = resolved.strip_prefix(repo_root).ok()?;
    if stripped.as_os_str().is_empty() {
        return None;
    }
    Some(relative_path(&resolved, repo_root))
}
