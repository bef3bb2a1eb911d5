//! Multi-index federation.
//!
//! A registry owns the writable, watched indexes of every workspace
//! package plus lazily-loaded immutable external indexes: the SDK, the
//! framework's companion packages, hosted dependencies and git
//! dependencies. Federated queries visit indexes in provenance order —
//! local first, then sdk, framework, hosted, git — and deduplicate by the
//! key appropriate to the query: symbol id for symbol queries,
//! `(file, line, col)` for occurrences.

use crate::discovery;
use crate::error::EngineError;
use crate::external::{self, ExternalPackage};
use crate::index::Index;
use crate::indexer::{IncrementalIndexer, IndexerOptions};
use crate::manifest::{DependencySource, ResolvedPackageConfig};
use crate::types::{
    GrepMatch, GrepOptions, IndexStats, Occurrence, SymbolInformation, SymbolKind,
};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// How far a symbol search reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    #[default]
    Project,
    ProjectAndLoaded,
}

pub struct LocalPackage {
    pub name: String,
    pub path: PathBuf,
    pub indexer: Arc<IncrementalIndexer>,
}

#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Watch local packages for filesystem changes.
    pub watch: bool,
    /// Resolve and load external indexes (SDK, framework, dependencies).
    pub load_external: bool,
}

pub struct PackageRegistry {
    root: PathBuf,
    cache_root: PathBuf,
    local: Vec<LocalPackage>,
    sdk: Option<ExternalPackage>,
    framework: BTreeMap<String, ExternalPackage>,
    hosted: BTreeMap<String, ExternalPackage>,
    git: BTreeMap<String, ExternalPackage>,
    warnings: Vec<String>,
}

impl std::fmt::Debug for PackageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageRegistry")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl PackageRegistry {
    /// Open every package under `root` and, when asked, load the external
    /// indexes its dependencies point at.
    pub async fn open(root: &Path, options: RegistryOptions) -> Result<Self, EngineError> {
        let root = root
            .canonicalize()
            .map_err(|_| EngineError::RootNotFound(root.to_path_buf()))?;

        let packages = discovery::discover_packages(&root).map_err(EngineError::from_anyhow)?;
        if packages.is_empty() {
            return Err(EngineError::MissingPackageManifest(root));
        }

        let mut registry = Self {
            root: root.clone(),
            cache_root: external::global_cache_root(),
            local: Vec::new(),
            sdk: None,
            framework: BTreeMap::new(),
            hosted: BTreeMap::new(),
            git: BTreeMap::new(),
            warnings: Vec::new(),
        };

        for entry in packages {
            let indexer = IncrementalIndexer::open(
                &entry.absolute_path,
                IndexerOptions {
                    watch: options.watch,
                },
            )
            .await?;
            registry.local.push(LocalPackage {
                name: entry.name,
                path: entry.absolute_path,
                indexer,
            });
        }

        if options.load_external {
            registry.load_external_indexes()?;
        }

        Ok(registry)
    }

    /// Load the SDK index, framework companions, and every hosted/git
    /// dependency whose pre-built index exists on disk.
    fn load_external_indexes(&mut self) -> Result<(), EngineError> {
        match detect_sdk_version() {
            Some(version) => {
                let dir = self.cache_root.join("sdk").join(&version);
                if let Some(pkg) = external::load_external(&dir) {
                    self.sdk = Some(pkg);
                }
            }
            None => {
                self.warnings
                    .push("could not detect Dart SDK version (`dart --version` failed)".to_string());
            }
        }

        let uses_flutter = self
            .local
            .iter()
            .any(|p| p.indexer.package().uses_flutter());
        if uses_flutter {
            match detect_flutter_version() {
                Some(version) => {
                    let dir = self.cache_root.join("framework").join(&version);
                    if let Ok(entries) = std::fs::read_dir(&dir) {
                        for entry in entries.flatten() {
                            if let Some(pkg) = external::load_external(&entry.path()) {
                                self.framework.insert(pkg.name.clone(), pkg);
                            }
                        }
                    }
                }
                None => {
                    self.warnings.push(
                        "could not detect Flutter version (`flutter --version` failed)".to_string(),
                    );
                }
            }
        }

        for local in &self.local {
            let config = ResolvedPackageConfig::load(&local.path)?;
            for dep in &config.packages {
                match &dep.source {
                    DependencySource::Hosted { version } => {
                        let key = format!("{}-{}", dep.name, version);
                        if self.hosted.contains_key(&key) {
                            continue;
                        }
                        let dir = self.cache_root.join("hosted").join(&key);
                        if let Some(pkg) = external::load_external(&dir) {
                            self.hosted.insert(key, pkg);
                        }
                    }
                    DependencySource::Git { key } => {
                        if self.git.contains_key(key) {
                            continue;
                        }
                        let dir = self.cache_root.join("git").join(key);
                        if let Some(pkg) = external::load_external(&dir) {
                            self.git.insert(key.clone(), pkg);
                        }
                    }
                    DependencySource::Root | DependencySource::Path | DependencySource::Sdk => {}
                }
            }
        }
        Ok(())
    }

    /// Attach an already-loaded external package. Used by hosts that build
    /// and load indexes themselves rather than through the global cache.
    pub fn attach_external(&mut self, pkg: ExternalPackage) {
        match pkg.kind.as_str() {
            "sdk" => self.sdk = Some(pkg),
            "flutter" => {
                self.framework.insert(pkg.name.clone(), pkg);
            }
            "git" => {
                self.git.insert(format!("{}-{}", pkg.name, pkg.version), pkg);
            }
            _ => {
                self.hosted
                    .insert(format!("{}-{}", pkg.name, pkg.version), pkg);
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn local_packages(&self) -> &[LocalPackage] {
        &self.local
    }

    /// Structured warnings collected while loading (e.g. toolchain version
    /// detection failures).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// All indexes in provenance order: local, sdk, framework, hosted,
    /// git.
    pub fn all_indexes(&self) -> Vec<Arc<Index>> {
        let mut out: Vec<Arc<Index>> = self
            .local
            .iter()
            .map(|p| p.indexer.index().clone())
            .collect();
        if let Some(sdk) = &self.sdk {
            out.push(sdk.index.clone());
        }
        out.extend(self.framework.values().map(|p| p.index.clone()));
        out.extend(self.hosted.values().map(|p| p.index.clone()));
        out.extend(self.git.values().map(|p| p.index.clone()));
        out
    }

    fn local_indexes(&self) -> Vec<Arc<Index>> {
        self.local.iter().map(|p| p.indexer.index().clone()).collect()
    }

    fn indexes_for(&self, scope: SearchScope) -> Vec<Arc<Index>> {
        match scope {
            SearchScope::Project => self.local_indexes(),
            SearchScope::ProjectAndLoaded => self.all_indexes(),
        }
    }

    // ------------------------------------------------------------------
    // Federated lookups
    // ------------------------------------------------------------------

    /// First hit in iteration order.
    pub fn get_symbol(&self, id: &str) -> Option<SymbolInformation> {
        self.all_indexes().iter().find_map(|ix| ix.get_symbol(id))
    }

    /// The index that defines `id` (not merely references it).
    pub fn find_owning_index(&self, id: &str) -> Option<Arc<Index>> {
        self.all_indexes()
            .into_iter()
            .find(|ix| ix.get_symbol(id).is_some_and(|s| !s.is_external()))
    }

    /// Absolute path of the file defining `id`, composed from the owning
    /// index's source root.
    pub fn resolve_file_path(&self, id: &str) -> Option<PathBuf> {
        let owning = self.find_owning_index(id)?;
        let info = owning.get_symbol(id)?;
        Some(owning.source_root().join(info.defining_file?))
    }

    pub fn find_definition(&self, id: &str) -> Option<Occurrence> {
        self.all_indexes().iter().find_map(|ix| ix.find_definition(id))
    }

    /// Union of non-definition occurrences across every index.
    pub fn find_all_references(&self, id: &str) -> Vec<Occurrence> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for ix in self.all_indexes() {
            for occ in ix.find_references(id) {
                if seen.insert((occ.file.clone(), occ.start_line, occ.start_col)) {
                    out.push(occ);
                }
            }
        }
        out
    }

    /// Cross-index reference join by display name (and kind when given).
    ///
    /// External packages mint their own symbol ids, so the same conceptual
    /// symbol carries different ids in the workspace and in a dependency
    /// index; the display name plus kind is the join key. Definition
    /// occurrences are included so a dependency's defining document shows
    /// up alongside workspace references.
    pub fn find_all_references_by_name(
        &self,
        name: &str,
        kind: Option<SymbolKind>,
    ) -> Vec<Occurrence> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for ix in self.all_indexes() {
            for info in ix.find_by_name(name) {
                if kind.is_some_and(|k| k != info.kind) {
                    continue;
                }
                let mut occs = vec![];
                if let Some(def) = ix.find_definition(&info.symbol) {
                    occs.push(def);
                }
                occs.extend(ix.find_references(&info.symbol));
                for occ in occs {
                    if seen.insert((occ.file.clone(), occ.start_line, occ.start_col)) {
                        out.push(occ);
                    }
                }
            }
        }
        out
    }

    pub fn find_by_name(&self, name: &str) -> Vec<SymbolInformation> {
        dedup_symbols(self.all_indexes().iter().flat_map(|ix| ix.find_by_name(name)))
    }

    pub fn find_symbols(&self, pattern: &str, scope: SearchScope) -> Vec<SymbolInformation> {
        dedup_symbols(
            self.indexes_for(scope)
                .iter()
                .flat_map(|ix| ix.find_symbols(pattern)),
        )
    }

    pub fn find_symbols_matching(&self, re: &Regex, scope: SearchScope) -> Vec<SymbolInformation> {
        dedup_symbols(
            self.indexes_for(scope)
                .iter()
                .flat_map(|ix| ix.find_symbols_matching(re)),
        )
    }

    pub fn find_symbols_fuzzy(
        &self,
        pattern: &str,
        max_distance: usize,
        scope: SearchScope,
    ) -> Vec<SymbolInformation> {
        dedup_symbols(
            self.indexes_for(scope)
                .iter()
                .flat_map(|ix| ix.find_symbols_fuzzy(pattern, max_distance)),
        )
    }

    pub fn find_qualified(&self, container: &str, member: &str) -> Vec<SymbolInformation> {
        dedup_symbols(
            self.all_indexes()
                .iter()
                .flat_map(|ix| ix.find_qualified(container, member)),
        )
    }

    /// First index with a non-empty member list wins.
    pub fn members_of(&self, id: &str) -> Vec<SymbolInformation> {
        for ix in self.all_indexes() {
            let members = ix.members_of(id);
            if !members.is_empty() {
                return members;
            }
        }
        Vec::new()
    }

    pub fn supertypes_of(&self, id: &str) -> Vec<String> {
        dedup_strings(self.all_indexes().iter().flat_map(|ix| ix.supertypes_of(id)))
    }

    pub fn subtypes_of(&self, id: &str) -> Vec<String> {
        dedup_strings(self.all_indexes().iter().flat_map(|ix| ix.subtypes_of(id)))
    }

    pub fn get_calls(&self, id: &str) -> Vec<String> {
        dedup_strings(self.all_indexes().iter().flat_map(|ix| ix.get_calls(id)))
    }

    pub fn get_callers(&self, id: &str) -> Vec<String> {
        dedup_strings(self.all_indexes().iter().flat_map(|ix| ix.get_callers(id)))
    }

    pub fn get_source(&self, id: &str) -> Option<String> {
        self.all_indexes().iter().find_map(|ix| ix.get_source(id))
    }

    /// Grep across indexes, visiting each unique source root at most once.
    /// External indexes are included only when `include_external`.
    pub fn grep(
        &self,
        pattern: &Regex,
        opts: &GrepOptions,
        include_external: bool,
    ) -> Vec<GrepMatch> {
        let indexes = if include_external {
            self.all_indexes()
        } else {
            self.local_indexes()
        };
        let mut visited_roots: HashSet<PathBuf> = HashSet::new();
        let mut out = Vec::new();
        for ix in indexes {
            if !visited_roots.insert(ix.source_root().to_path_buf()) {
                continue;
            }
            out.extend(ix.grep(pattern, opts));
        }
        out
    }

    /// Local package whose path is the longest prefix of `path`.
    pub fn find_package_for_path(&self, path: &Path) -> Option<&LocalPackage> {
        self.local
            .iter()
            .filter(|p| path.starts_with(&p.path))
            .max_by_key(|p| p.path.components().count())
    }

    /// All indexed documents per local package, for the `files` action.
    pub fn documents(&self) -> Vec<String> {
        let mut out = Vec::new();
        for pkg in &self.local {
            out.extend(pkg.indexer.index().documents());
        }
        out.sort();
        out.dedup();
        out
    }

    /// Documents across the chosen scope, with their owning index.
    pub fn documents_in_scope(&self, include_external: bool) -> Vec<(Arc<Index>, String)> {
        let indexes = if include_external {
            self.all_indexes()
        } else {
            self.local_indexes()
        };
        let mut out = Vec::new();
        for ix in indexes {
            for doc in ix.documents() {
                out.push((ix.clone(), doc));
            }
        }
        out
    }

    /// Locate a document by exact relative path, or by trailing file name
    /// when no exact slot matches.
    pub fn find_document(&self, path_or_name: &str) -> Option<(Arc<Index>, String)> {
        for ix in self.all_indexes() {
            if ix.contains_document(path_or_name) {
                return Some((ix, path_or_name.to_string()));
            }
        }
        let file_name = path_or_name.rsplit('/').next().unwrap_or(path_or_name);
        for ix in self.all_indexes() {
            if let Some(doc) = ix
                .documents()
                .into_iter()
                .find(|d| d.ends_with(&format!("/{file_name}")) || d == file_name)
            {
                return Some((ix, doc));
            }
        }
        None
    }

    /// Aggregated statistics across local and loaded external indexes.
    pub fn stats(&self) -> RegistryStats {
        let locals: Vec<(String, IndexStats)> = self
            .local
            .iter()
            .map(|p| (p.name.clone(), p.indexer.stats()))
            .collect();
        let external_count = self.all_indexes().len() - self.local.len();
        RegistryStats {
            packages: locals,
            external_indexes: external_count,
        }
    }

    /// Drop watchers and close every indexer's update stream.
    pub fn dispose(&self) {
        for pkg in &self.local {
            pkg.indexer.dispose();
        }
    }
}

impl Drop for PackageRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub packages: Vec<(String, IndexStats)>,
    pub external_indexes: usize,
}

fn dedup_symbols(iter: impl Iterator<Item = SymbolInformation>) -> Vec<SymbolInformation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for info in iter {
        if seen.insert(info.symbol.clone()) {
            out.push(info);
        }
    }
    out
}

fn dedup_strings(iter: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for s in iter {
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }
    out
}

/// `dart --version` → "3.5.0". Failure is reported as a warning, not an
/// error.
fn detect_sdk_version() -> Option<String> {
    let output = Command::new("dart").arg("--version").output().ok()?;
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    extract_version(&text)
}

/// `flutter --version` → "3.24.0".
fn detect_flutter_version() -> Option<String> {
    let output = Command::new("flutter").arg("--version").output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout).to_string();
    extract_version(&text)
}

fn extract_version(text: &str) -> Option<String> {
    let re = Regex::new(r"(\d+\.\d+\.\d+[\w.+-]*)").ok()?;
    Some(re.captures(text)?.get(1)?.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_extraction() {
        assert_eq!(
            extract_version("Dart SDK version: 3.5.0 (stable) (Tue Jul 30)").as_deref(),
            Some("3.5.0")
        );
        assert_eq!(
            extract_version("Flutter 3.24.0-0.1.pre • channel beta").as_deref(),
            Some("3.24.0-0.1.pre")
        );
        assert_eq!(extract_version("no version here"), None);
    }
}
