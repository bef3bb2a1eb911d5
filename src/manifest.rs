//! Package metadata extraction.
//!
//! The engine needs three things from the package manager's files: the
//! package's own `(name, version, dependency names)` from `pubspec.yaml`,
//! the resolved dependency roots from `.dart_tool/package_config.json`, and
//! `(name, version)` pairs from `pubspec.lock` for batch dependency
//! indexing. Nothing beyond that is interpreted; the pubspec and lockfile
//! are line-scanned rather than parsed as full YAML.

use crate::error::EngineError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const PUBSPEC_FILE: &str = "pubspec.yaml";
pub const LOCKFILE: &str = "pubspec.lock";
pub const PACKAGE_CONFIG: &str = ".dart_tool/package_config.json";

/// `(name, version, dependencies)` of one workspace package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: String,
    pub version: Option<String>,
    pub dependencies: Vec<String>,
    pub dev_dependencies: Vec<String>,
}

impl PackageManifest {
    pub fn load(project_root: &Path) -> Result<Self, EngineError> {
        let path = project_root.join(PUBSPEC_FILE);
        let text = fs::read_to_string(&path)
            .map_err(|_| EngineError::MissingPackageManifest(project_root.to_path_buf()))?;
        Self::parse(&text)
            .ok_or_else(|| EngineError::MissingPackageManifest(project_root.to_path_buf()))
    }

    /// Line scan of the pubspec: top-level `name:`/`version:` values plus
    /// the dependency names listed at the first indent level under
    /// `dependencies:` and `dev_dependencies:`.
    pub fn parse(text: &str) -> Option<Self> {
        #[derive(PartialEq)]
        enum Section {
            None,
            Dependencies,
            DevDependencies,
        }

        let mut manifest = Self::default();
        let mut section = Section::None;

        for line in text.lines() {
            let trimmed_end = line.trim_end();
            if trimmed_end.is_empty() || trimmed_end.trim_start().starts_with('#') {
                continue;
            }

            let indent = line.len() - line.trim_start().len();
            if indent == 0 {
                section = Section::None;
                let Some((key, value)) = trimmed_end.split_once(':') else {
                    continue;
                };
                let value = strip_quotes(value.trim());
                match key {
                    "name" => manifest.name = value.to_string(),
                    "version" if !value.is_empty() => {
                        manifest.version = Some(value.to_string());
                    }
                    "dependencies" => section = Section::Dependencies,
                    "dev_dependencies" => section = Section::DevDependencies,
                    _ => {}
                }
                continue;
            }

            if indent == 2 && section != Section::None {
                if let Some((key, _)) = trimmed_end.trim_start().split_once(':') {
                    let dep = key.trim().to_string();
                    if !dep.is_empty() {
                        match section {
                            Section::Dependencies => manifest.dependencies.push(dep),
                            Section::DevDependencies => manifest.dev_dependencies.push(dep),
                            Section::None => {}
                        }
                    }
                }
            }
        }

        if manifest.name.is_empty() {
            return None;
        }
        Some(manifest)
    }

    pub fn uses_flutter(&self) -> bool {
        self.dependencies.iter().any(|d| d == "flutter")
            || self.dev_dependencies.iter().any(|d| d == "flutter_test")
    }
}

/// Extract just the `name:` field of a pubspec, for package discovery.
pub fn package_name(pubspec_text: &str) -> Option<String> {
    PackageManifest::parse(pubspec_text).map(|m| m.name)
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

// ----------------------------------------------------------------------
// Resolved package config
// ----------------------------------------------------------------------

/// Where a resolved dependency's source lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// The workspace package itself.
    Root,
    /// A path dependency inside or beside the workspace.
    Path,
    /// Pub-hosted, living in the pub cache; carries the resolved version.
    Hosted { version: String },
    /// Git checkout in the pub cache; the key is `repo-commit`.
    Git { key: String },
    /// Shipped with an SDK (e.g. Flutter's bundled packages).
    Sdk,
}

#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: String,
    /// Absolute package root.
    pub root: PathBuf,
    pub source: DependencySource,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedPackageConfig {
    pub packages: Vec<ResolvedPackage>,
}

#[derive(Deserialize)]
struct RawPackageConfig {
    packages: Vec<RawPackageEntry>,
}

#[derive(Deserialize)]
struct RawPackageEntry {
    name: String,
    #[serde(rename = "rootUri")]
    root_uri: String,
}

impl ResolvedPackageConfig {
    pub fn load(project_root: &Path) -> Result<Self, EngineError> {
        let path = project_root.join(PACKAGE_CONFIG);
        let data = fs::read(&path)
            .map_err(|_| EngineError::MissingResolvedConfig(path.clone()))?;
        let raw: RawPackageConfig = serde_json::from_slice(&data)
            .map_err(|_| EngineError::MissingResolvedConfig(path.clone()))?;

        let config_dir = path.parent().unwrap_or(project_root).to_path_buf();
        let packages = raw
            .packages
            .into_iter()
            .map(|entry| {
                let root = resolve_root_uri(&entry.root_uri, &config_dir);
                let source = classify_source(&root, project_root);
                ResolvedPackage {
                    name: entry.name,
                    root,
                    source,
                }
            })
            .collect();
        Ok(Self { packages })
    }
}

fn resolve_root_uri(uri: &str, config_dir: &Path) -> PathBuf {
    if let Some(path) = uri.strip_prefix("file://") {
        return PathBuf::from(path);
    }
    let joined = config_dir.join(uri);
    normalize(&joined)
}

/// Lexical `..`/`.` normalization; the pub cache paths in a package config
/// always exist, so no filesystem round trip is needed.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            c => out.push(c.as_os_str()),
        }
    }
    out
}

fn classify_source(root: &Path, project_root: &Path) -> DependencySource {
    if root == project_root {
        return DependencySource::Root;
    }
    let display = root.to_string_lossy().replace('\\', "/");
    if display.contains("/hosted/") {
        let version = root
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.rsplit_once('-'))
            .map(|(_, v)| v.to_string())
            .unwrap_or_default();
        return DependencySource::Hosted { version };
    }
    if display.contains("/git/") {
        let key = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        return DependencySource::Git { key };
    }
    if display.contains("/flutter/packages/") || display.contains("/lib/_internal/") {
        return DependencySource::Sdk;
    }
    DependencySource::Path
}

// ----------------------------------------------------------------------
// Lockfile
// ----------------------------------------------------------------------

/// One `(name, version)` pair from the lockfile, with its source kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub name: String,
    pub version: String,
    pub source: String,
}

pub fn load_lockfile(project_root: &Path) -> Option<Vec<LockEntry>> {
    let text = fs::read_to_string(project_root.join(LOCKFILE)).ok()?;
    Some(parse_lockfile(&text))
}

/// Extract `(name, version, source)` triples from the lockfile's
/// `packages:` block. Everything else in the schema is ignored.
pub fn parse_lockfile(text: &str) -> Vec<LockEntry> {
    let mut entries = Vec::new();
    let mut in_packages = false;
    let mut current: Option<(String, Option<String>, Option<String>)> = None;

    for line in text.lines() {
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if indent == 0 {
            flush(&mut current, &mut entries);
            in_packages = trimmed == "packages:";
            continue;
        }
        if !in_packages {
            continue;
        }

        if indent == 2 {
            flush(&mut current, &mut entries);
            if let Some((name, _)) = trimmed.split_once(':') {
                current = Some((name.trim().to_string(), None, None));
            }
        } else if indent == 4 {
            if let Some((key, value)) = trimmed.split_once(':') {
                let value = strip_quotes(value.trim()).to_string();
                if let Some(entry) = current.as_mut() {
                    match key.trim() {
                        "version" => entry.1 = Some(value),
                        "source" => entry.2 = Some(value),
                        _ => {}
                    }
                }
            }
        }
    }
    flush(&mut current, &mut entries);
    entries
}

fn flush(
    current: &mut Option<(String, Option<String>, Option<String>)>,
    entries: &mut Vec<LockEntry>,
) {
    if let Some((name, Some(version), source)) = current.take() {
        entries.push(LockEntry {
            name,
            version,
            source: source.unwrap_or_default(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PUBSPEC: &str = r#"
name: myapp
description: A sample app.
version: 1.2.0
environment:
  sdk: ">=3.0.0 <4.0.0"

dependencies:
  flutter:
    sdk: flutter
  http: ^1.0.0
  collection: any

dev_dependencies:
  flutter_test:
    sdk: flutter
  test: ^1.24.0
"#;

    #[test]
    fn pubspec_fields() {
        let m = PackageManifest::parse(PUBSPEC).unwrap();
        assert_eq!(m.name, "myapp");
        assert_eq!(m.version.as_deref(), Some("1.2.0"));
        assert_eq!(m.dependencies, vec!["flutter", "http", "collection"]);
        assert_eq!(m.dev_dependencies, vec!["flutter_test", "test"]);
        assert!(m.uses_flutter());
    }

    #[test]
    fn pubspec_without_name_is_rejected() {
        assert!(PackageManifest::parse("version: 1.0.0\n").is_none());
    }

    #[test]
    fn environment_keys_are_not_dependencies() {
        let m = PackageManifest::parse("name: x\nenvironment:\n  sdk: '>=3.0.0'\n").unwrap();
        assert!(m.dependencies.is_empty());
    }

    #[test]
    fn lockfile_pairs() {
        let lock = r#"
packages:
  http:
    dependency: "direct main"
    source: hosted
    version: "1.2.0"
  args:
    dependency: transitive
    source: hosted
    version: "2.4.2"
sdks:
  dart: ">=3.0.0 <4.0.0"
"#;
        let entries = parse_lockfile(lock);
        assert_eq!(
            entries,
            vec![
                LockEntry {
                    name: "http".into(),
                    version: "1.2.0".into(),
                    source: "hosted".into()
                },
                LockEntry {
                    name: "args".into(),
                    version: "2.4.2".into(),
                    source: "hosted".into()
                },
            ]
        );
    }

    #[test]
    fn hosted_root_classification() {
        let root = PathBuf::from("/home/u/.pub-cache/hosted/pub.dev/http-1.2.0");
        let source = classify_source(&root, Path::new("/work/app"));
        assert_eq!(
            source,
            DependencySource::Hosted {
                version: "1.2.0".into()
            }
        );
    }

    #[test]
    fn root_uri_resolution() {
        let config_dir = Path::new("/work/app/.dart_tool");
        assert_eq!(
            resolve_root_uri("../", config_dir),
            PathBuf::from("/work/app")
        );
        assert_eq!(
            resolve_root_uri("file:///home/u/.pub-cache/hosted/pub.dev/http-1.2.0", config_dir),
            PathBuf::from("/home/u/.pub-cache/hosted/pub.dev/http-1.2.0")
        );
    }
}
