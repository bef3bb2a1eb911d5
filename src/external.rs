//! Immutable external indexes: SDK, framework, hosted and git packages.
//!
//! The builder produces `index.bin` + `manifest.json` pairs under the
//! global cache root; the registry loads them lazily and treats them as
//! read-only. A manifest whose tool version does not match the running
//! binary is rejected so stale layouts regenerate instead of misloading.

use crate::analyzer::{self, Analyzer};
use crate::analyzer::syntactic::SyntacticAnalyzer;
use crate::discovery;
use crate::index::Index;
use crate::manifest::{self, PackageManifest};
use crate::scip;
use crate::types::{Document, IndexStats};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const INDEX_FILE: &str = "index.bin";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Environment override for the global cache root.
pub const HOME_ENV: &str = "DARTSCOPE_HOME";

/// Where pre-built external indexes live:
/// `$DARTSCOPE_HOME`, else `<home>/.dartscope`.
pub fn global_cache_root() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dartscope")
}

/// Where dependency source lives: `$PUB_CACHE`, else `<home>/.pub-cache`.
pub fn pub_cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("PUB_CACHE") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pub-cache")
}

/// Kind of external index, fixing both the cache subdirectory and the
/// manifest `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    Sdk,
    Framework,
    Hosted,
    Git,
    Package,
}

impl ExternalKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Sdk => "sdk",
            Self::Framework => "framework",
            Self::Hosted => "hosted",
            Self::Git => "git",
            Self::Package => "package",
        }
    }

    pub fn manifest_type(&self) -> &'static str {
        match self {
            Self::Sdk => "sdk",
            Self::Framework => "flutter",
            Self::Hosted => "hosted",
            Self::Git => "git",
            Self::Package => "package",
        }
    }
}

/// Sidecar manifest written next to every external index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalManifest {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub version: String,
    pub source_path: String,
    pub indexed_at: DateTime<Utc>,
    pub tool_version: String,
}

/// A loaded, read-only external index.
pub struct ExternalPackage {
    pub name: String,
    pub version: String,
    pub kind: String,
    pub index: Arc<Index>,
}

/// Outcome of a batch dependency build.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchReport {
    pub built: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct ExternalIndexBuilder {
    cache_root: PathBuf,
}

impl ExternalIndexBuilder {
    pub fn new(cache_root: PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn with_default_root() -> Self {
        Self::new(global_cache_root())
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Index one package tree into `<cache_root>/<kind>/<key>/`.
    ///
    /// Packages with a `lib/` directory are indexed from that directory
    /// only, with document paths computed against the package root; trees
    /// without one fall back to indexing every source file under the root.
    pub fn build_package_index(
        &self,
        source_root: &Path,
        name: &str,
        version: &str,
        kind: ExternalKind,
        key: &str,
    ) -> Result<IndexStats> {
        let lib_dir = source_root.join("lib");
        let scan_root = if lib_dir.is_dir() {
            lib_dir
        } else {
            source_root.to_path_buf()
        };

        let analyzer = SyntacticAnalyzer::new(source_root.to_path_buf(), name, version);
        let mut documents: Vec<Document> = Vec::new();
        for file in discovery::discover_source_files(&scan_root) {
            match analyzer.resolved_unit(&file) {
                Ok(Some(unit)) => documents.push(analyzer::lower_unit(&unit)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("skipping {}: {e}", file.display());
                }
            }
        }

        let record = scip::build_index_record(source_root, &documents);
        let out_dir = self.cache_root.join(kind.dir_name()).join(key);
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        scip::write_to(&out_dir.join(INDEX_FILE), &record)?;

        let manifest = ExternalManifest {
            kind: kind.manifest_type().to_string(),
            name: name.to_string(),
            version: version.to_string(),
            source_path: source_root.display().to_string(),
            indexed_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        fs::write(
            out_dir.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )
        .with_context(|| format!("failed to write manifest in {}", out_dir.display()))?;

        let index = Index::from_record(&record, out_dir, source_root.to_path_buf());
        Ok(index.stats())
    }

    /// Index the Dart SDK's bundled libraries under `sdk/<version>/`.
    pub fn index_sdk(&self, sdk_path: &Path) -> Result<IndexStats> {
        let version = read_version_file(sdk_path).unwrap_or_else(|| "unknown".to_string());
        self.build_package_index(sdk_path, "dart-sdk", &version, ExternalKind::Sdk, &version)
    }

    /// Index every package bundled with a framework checkout under
    /// `framework/<version>/<package>/`.
    pub fn index_framework(&self, framework_root: &Path) -> Result<(String, Vec<String>)> {
        let version = read_version_file(framework_root).unwrap_or_else(|| "unknown".to_string());
        let packages_dir = framework_root.join("packages");
        let mut indexed = Vec::new();

        for entry in fs::read_dir(&packages_dir)
            .with_context(|| format!("no packages directory in {}", framework_root.display()))?
        {
            let entry = entry?;
            let package_root = entry.path();
            if !package_root.is_dir() {
                continue;
            }
            let Ok(pkg) = PackageManifest::load(&package_root) else {
                continue;
            };
            let key = format!("{version}/{}", pkg.name);
            let pkg_version = pkg.version.unwrap_or_else(|| version.clone());
            match self.build_package_index(
                &package_root,
                &pkg.name,
                &pkg_version,
                ExternalKind::Framework,
                &key,
            ) {
                Ok(_) => indexed.push(pkg.name),
                Err(e) => tracing::warn!("failed to index {}: {e}", pkg.name),
            }
        }
        Ok((version, indexed))
    }

    /// Parse the project's lockfile and index every hosted dependency whose
    /// source is present in the pub cache. Existing indexes are skipped
    /// unless `force`.
    pub fn index_dependencies(&self, project_root: &Path, force: bool) -> Result<BatchReport> {
        let Some(entries) = manifest::load_lockfile(project_root) else {
            tracing::warn!(
                "no {} under {}, nothing to index",
                manifest::LOCKFILE,
                project_root.display()
            );
            return Ok(BatchReport::default());
        };

        let pub_cache = pub_cache_dir();
        let mut report = BatchReport::default();

        for entry in entries.iter().filter(|e| e.source == "hosted") {
            let key = format!("{}-{}", entry.name, entry.version);
            let out_dir = self.cache_root.join(ExternalKind::Hosted.dir_name()).join(&key);
            if !force && out_dir.join(INDEX_FILE).exists() {
                report.skipped += 1;
                continue;
            }

            let Some(source_root) = hosted_source_root(&pub_cache, &entry.name, &entry.version)
            else {
                report.failed += 1;
                continue;
            };
            match self.build_package_index(
                &source_root,
                &entry.name,
                &entry.version,
                ExternalKind::Hosted,
                &key,
            ) {
                Ok(_) => report.built += 1,
                Err(e) => {
                    tracing::warn!("failed to index {key}: {e}");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Enumerate every index under the cache root.
    pub fn list_indexes(&self) -> Vec<(PathBuf, ExternalManifest)> {
        let mut found = Vec::new();
        for kind in ["sdk", "framework", "hosted", "git", "package"] {
            let dir = self.cache_root.join(kind);
            collect_manifests(&dir, &mut found);
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }
}

fn collect_manifests(dir: &Path, found: &mut Vec<(PathBuf, ExternalManifest)>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let manifest_path = path.join(MANIFEST_FILE);
        if manifest_path.exists() {
            if let Some(manifest) = read_manifest(&manifest_path) {
                found.push((path, manifest));
            }
        } else {
            // framework/<version>/<package>/ nests one level deeper.
            collect_manifests(&path, found);
        }
    }
}

fn read_manifest(path: &Path) -> Option<ExternalManifest> {
    let data = fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

/// Load one external index directory; None when missing, unreadable, or
/// written by a different tool version.
pub fn load_external(dir: &Path) -> Option<ExternalPackage> {
    let manifest = read_manifest(&dir.join(MANIFEST_FILE))?;
    if manifest.tool_version != env!("CARGO_PKG_VERSION") {
        tracing::warn!(
            "ignoring {} (built by {}, running {})",
            dir.display(),
            manifest.tool_version,
            env!("CARGO_PKG_VERSION"),
        );
        return None;
    }
    let record = scip::read_from(&dir.join(INDEX_FILE)).ok()?;
    let index = Index::from_record(
        &record,
        dir.to_path_buf(),
        PathBuf::from(&manifest.source_path),
    );
    Some(ExternalPackage {
        name: manifest.name,
        version: manifest.version,
        kind: manifest.kind,
        index: Arc::new(index),
    })
}

/// SDK and framework checkouts carry a `version` file at the root.
fn read_version_file(root: &Path) -> Option<String> {
    let text = fs::read_to_string(root.join("version")).ok()?;
    let version = text.trim().to_string();
    if version.is_empty() { None } else { Some(version) }
}

fn hosted_source_root(pub_cache: &Path, name: &str, version: &str) -> Option<PathBuf> {
    for host in ["pub.dev", "pub.dartlang.org"] {
        let candidate = pub_cache
            .join("hosted")
            .join(host)
            .join(format!("{name}-{version}"));
        if candidate.is_dir() {
            return Some(candidate);
        }
    }
    None
}
