//! Workspace package discovery.
//!
//! Walks a root directory for `pubspec.yaml` files, skipping ignored
//! directory segments, and produces a deterministic, deduplicated package
//! list. Ignore matching is segment-exact: `build/` is skipped,
//! `build_utils/` is not.

use crate::manifest;
use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Directory segments never descended into, by the discovery walk, the
/// source-file walk, and the filesystem watcher alike.
pub const IGNORED_SEGMENTS: &[&str] = &[
    ".git",
    ".hg",
    "build",
    crate::cache::CACHE_DIR,
    "node_modules",
    ".pub-cache",
    ".pub",
    ".dart_tool",
    ".symlinks",
    ".plugin_symlinks",
    "ephemeral",
    ".idea",
    ".vscode",
];

/// Whether any path component is an ignored segment.
pub fn is_ignored_path(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(seg) => seg
            .to_str()
            .is_some_and(|s| IGNORED_SEGMENTS.contains(&s)),
        _ => false,
    })
}

/// One discovered workspace package.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PackageEntry {
    pub name: String,
    pub absolute_path: PathBuf,
    /// POSIX-form path relative to the discovery root; empty for the root
    /// package itself.
    pub relative_path: String,
}

/// Recursively locate package manifests under `root`.
///
/// Output is sorted by relative path and deduplicated by absolute path.
pub fn discover_packages(root: &Path) -> Result<Vec<PackageEntry>> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut packages = Vec::new();

    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        !(e.file_type().is_dir()
            && e.file_name()
                .to_str()
                .is_some_and(|name| IGNORED_SEGMENTS.contains(&name)))
    }) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() || entry.file_name() != manifest::PUBSPEC_FILE {
            continue;
        }

        let Some(package_dir) = entry.path().parent() else {
            continue;
        };
        let relative = package_dir
            .strip_prefix(root)
            .unwrap_or(package_dir)
            .to_path_buf();
        if is_ignored_path(&relative) {
            continue;
        }
        if !seen.insert(package_dir.to_path_buf()) {
            continue;
        }

        let Ok(text) = fs::read_to_string(entry.path()) else {
            continue;
        };
        let Some(name) = manifest::package_name(&text) else {
            continue;
        };

        packages.push(PackageEntry {
            name,
            absolute_path: package_dir.to_path_buf(),
            relative_path: relative.to_string_lossy().replace('\\', "/"),
        });
    }

    packages.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(packages)
}

/// Enumerate Dart source files under `root`, skipping ignored segments and
/// anything the workspace's own .gitignore rules exclude. Sorted for
/// deterministic indexing order.
pub fn discover_source_files(root: &Path) -> Vec<PathBuf> {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(|e| {
            !(e.file_type().is_some_and(|t| t.is_dir())
                && e.file_name()
                    .to_str()
                    .is_some_and(|name| IGNORED_SEGMENTS.contains(&name)))
        })
        .build();

    let mut files: Vec<PathBuf> = walker
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("dart"))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_match_is_exact() {
        assert!(is_ignored_path(Path::new("build/out.dart")));
        assert!(is_ignored_path(Path::new("x/.dart_tool/y")));
        assert!(!is_ignored_path(Path::new("build_utils/helper.dart")));
        assert!(!is_ignored_path(Path::new("lib/building.dart")));
    }
}
