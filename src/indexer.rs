//! Incremental indexer for one workspace package.
//!
//! Owns the package's [`Index`], its disk cache, the content-hash table,
//! and the analyzer (or external adapter) that resolves source files. Emits
//! update events on a broadcast stream; slow subscribers drop from their
//! own buffer and never block the indexer.

use crate::analyzer::{self, Analyzer, FileEvent};
use crate::analyzer::syntactic::SyntacticAnalyzer;
use crate::cache::{self, FileHashes, IndexCache};
use crate::discovery;
use crate::error::EngineError;
use crate::index::Index;
use crate::manifest::PackageManifest;
use crate::types::IndexStats;
use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Broadcast buffer per subscriber. Consumers that fall further behind
/// than this lose their oldest events.
const EVENT_BUFFER: usize = 256;

/// Events published on the indexer's update stream.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// First full build of a project with no usable cache.
    InitialBuild { stats: IndexStats },
    /// Cache restored and verified with nothing to reindex.
    CachedLoad { stats: IndexStats, checked_files: usize },
    /// Cache restored, changed subset reindexed.
    IncrementalBuild {
        stats: IndexStats,
        added: usize,
        changed: usize,
        removed: usize,
    },
    FileUpdated { path: String, symbol_count: usize },
    FileRemoved { path: String },
    IndexError { path: String, message: String },
}

/// Outcome of indexing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Document replaced, derived tables rebuilt.
    Updated,
    /// Content hash unchanged, nothing done.
    Unchanged,
    /// Analyzer had nothing to say; hash recorded.
    Skipped,
    /// Analyzer failed; previous slot kept.
    Failed,
    /// Indexer shutting down; hash not recorded.
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct IndexerOptions {
    /// Subscribe to filesystem events after the initial build.
    pub watch: bool,
}

pub struct IncrementalIndexer {
    project_root: PathBuf,
    package: PackageManifest,
    analyzer: Arc<dyn Analyzer>,
    index: Arc<Index>,
    cache: IndexCache,
    hashes: Mutex<FileHashes>,
    events: broadcast::Sender<UpdateEvent>,
    /// Events emitted before `open` returned, kept for consumers that can
    /// only subscribe afterwards.
    startup_events: Mutex<Vec<UpdateEvent>>,
    recording_startup: AtomicBool,
    shutdown: watch::Sender<bool>,
    watcher_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for IncrementalIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalIndexer")
            .field("project_root", &self.project_root)
            .finish_non_exhaustive()
    }
}

impl IncrementalIndexer {
    /// Open a workspace package with the bundled analyzer.
    pub async fn open(project_root: &Path, options: IndexerOptions) -> Result<Arc<Self>, EngineError> {
        let root = project_root
            .canonicalize()
            .map_err(|_| EngineError::RootNotFound(project_root.to_path_buf()))?;
        let package = PackageManifest::load(&root)?;
        let version = package.version.clone().unwrap_or_else(|| "0.0.0".to_string());
        let analyzer: Arc<dyn Analyzer> =
            Arc::new(SyntacticAnalyzer::new(root.clone(), &package.name, &version));
        Self::open_with(root, package, analyzer, options).await
    }

    /// Open with an external adapter in place of the bundled analyzer. The
    /// adapter's project root wins; change detection falls back to the
    /// unit's own content hash when no file backs it on disk.
    pub async fn open_with_adapter(
        adapter: Arc<dyn Analyzer>,
        package: PackageManifest,
        options: IndexerOptions,
    ) -> Result<Arc<Self>, EngineError> {
        let root = adapter.project_root().to_path_buf();
        Self::open_with(root, package, adapter, options).await
    }

    async fn open_with(
        root: PathBuf,
        package: PackageManifest,
        analyzer: Arc<dyn Analyzer>,
        options: IndexerOptions,
    ) -> Result<Arc<Self>, EngineError> {
        let cache = IndexCache::new(root.clone());
        let restored = cache.load();
        let restored_ok = restored.is_some();

        let (index, recorded_hashes) = match restored {
            Some((record, hashes)) => (
                Arc::new(Index::from_record(&record, root.clone(), root.clone())),
                hashes,
            ),
            None => (Arc::new(Index::new(root.clone())), FileHashes::new()),
        };

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (shutdown, _) = watch::channel(false);

        let indexer = Arc::new(Self {
            project_root: root.clone(),
            package,
            analyzer,
            index,
            cache,
            hashes: Mutex::new(recorded_hashes),
            events,
            startup_events: Mutex::new(Vec::new()),
            recording_startup: AtomicBool::new(true),
            shutdown,
            watcher_task: Mutex::new(None),
        });

        let files = indexer
            .analyzer
            .list_source_files()
            .unwrap_or_else(|| discovery::discover_source_files(&root));

        if restored_ok {
            let current = hash_all(&root, &files);
            let diff = indexer.cache.diff_against(&current);
            if diff.is_empty() {
                indexer.emit(UpdateEvent::CachedLoad {
                    stats: indexer.index.stats(),
                    checked_files: files.len(),
                });
            } else {
                for rel in &diff.removed {
                    indexer.index.remove_document(rel);
                    indexer.hashes.lock().remove(rel);
                }
                for rel in diff.changed.iter().chain(diff.added.iter()) {
                    indexer.index_one_file(&root.join(rel)).await;
                }
                indexer.emit(UpdateEvent::IncrementalBuild {
                    stats: indexer.index.stats(),
                    added: diff.added.len(),
                    changed: diff.changed.len(),
                    removed: diff.removed.len(),
                });
            }
        } else {
            for file in &files {
                indexer.index_one_file(file).await;
            }
            indexer.emit(UpdateEvent::InitialBuild {
                stats: indexer.index.stats(),
            });
        }

        indexer.save_cache();
        indexer.recording_startup.store(false, Ordering::Release);

        if options.watch {
            indexer.clone().spawn_watcher();
        }

        Ok(indexer)
    }

    /// Events emitted during the open sequence (`InitialBuild`,
    /// `CachedLoad` or `IncrementalBuild` plus per-file events), for
    /// consumers that subscribe after `open` returns.
    pub fn startup_events(&self) -> Vec<UpdateEvent> {
        self.startup_events.lock().clone()
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn package(&self) -> &PackageManifest {
        &self.package
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    /// Subscribe to the update stream. Each subscriber gets its own
    /// bounded buffer.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: UpdateEvent) {
        if self.recording_startup.load(Ordering::Acquire) {
            self.startup_events.lock().push(event.clone());
        }
        let _ = self.events.send(event);
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Hash, resolve, lower and commit a single file. Cancellation is
    /// honored at entry, between hashing and resolution, and between
    /// lowering and commit; a cancelled run records nothing.
    pub async fn index_one_file(&self, path: &Path) -> FileOutcome {
        if self.is_shutting_down() {
            return FileOutcome::Cancelled;
        }
        let Some(rel) = relative_posix(&self.project_root, path) else {
            return FileOutcome::Skipped;
        };

        let disk_hash = tokio::fs::read(path).await.ok().map(|b| cache::hash_bytes(&b));
        if let Some(hash) = &disk_hash {
            if self.hashes.lock().get(&rel) == Some(hash) {
                return FileOutcome::Unchanged;
            }
        }

        if self.is_shutting_down() {
            return FileOutcome::Cancelled;
        }

        let unit = match self.analyzer.resolved_unit(path) {
            Ok(unit) => unit,
            Err(e) => {
                tracing::warn!("analyzer failed on {}: {e}", rel);
                self.emit(UpdateEvent::IndexError {
                    path: rel,
                    message: e.to_string(),
                });
                return FileOutcome::Failed;
            }
        };

        let Some(unit) = unit else {
            if let Some(hash) = disk_hash {
                self.hashes.lock().insert(rel, hash);
            }
            return FileOutcome::Skipped;
        };

        let hash = match &disk_hash {
            Some(h) => h.clone(),
            None => unit.content_hash.clone(),
        };
        // Change detection for units with no backing file on disk rides on
        // the hash the adapter computed.
        if disk_hash.is_none() && self.hashes.lock().get(&rel).is_some_and(|h| *h == hash) {
            return FileOutcome::Unchanged;
        }
        let doc = analyzer::lower_unit(&unit);
        let symbol_count = doc.symbols.iter().filter(|s| !s.is_external()).count();

        if self.is_shutting_down() {
            return FileOutcome::Cancelled;
        }

        self.index.update_document(doc);
        self.emit(UpdateEvent::FileUpdated {
            path: rel.clone(),
            symbol_count,
        });
        self.hashes.lock().insert(rel, hash);
        FileOutcome::Updated
    }

    /// Apply one filesystem (or adapter) event. Events for ignored paths
    /// were suppressed at the source; a move is a delete then a create.
    pub async fn handle_event(&self, event: FileEvent) {
        let mutated = match event {
            FileEvent::Created(path) | FileEvent::Modified(path) => {
                self.analyzer.notify_file_change(&path);
                matches!(self.index_one_file(&path).await, FileOutcome::Updated)
            }
            FileEvent::Removed(path) => self.remove_file(&path),
            FileEvent::Moved { from, to } => {
                let removed = self.remove_file(&from);
                self.analyzer.notify_file_change(&to);
                let updated =
                    matches!(self.index_one_file(&to).await, FileOutcome::Updated);
                removed || updated
            }
        };
        if mutated && !self.is_shutting_down() {
            self.save_cache();
        }
    }

    fn remove_file(&self, path: &Path) -> bool {
        let Some(rel) = relative_posix(&self.project_root, path) else {
            return false;
        };
        if !self.index.remove_document(&rel) {
            return false;
        }
        self.hashes.lock().remove(&rel);
        self.emit(UpdateEvent::FileRemoved { path: rel });
        true
    }

    /// Persist the index and hash table. The hash snapshot is taken after
    /// the record so the persisted pair is never ahead of the index.
    pub fn save_cache(&self) {
        let record = self.index.to_record();
        let hashes = self.hashes.lock().clone();
        if let Err(e) = self.cache.save(&record, &hashes) {
            tracing::warn!("cache save failed for {}: {e}", self.project_root.display());
        }
    }

    /// Cancel in-flight work, stop the watcher and close the update
    /// stream.
    pub fn dispose(&self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.watcher_task.lock().take() {
            task.abort();
        }
    }

    fn spawn_watcher(self: Arc<Self>) {
        // An adapter that publishes its own change stream replaces the
        // filesystem watcher entirely.
        if let Some(mut adapter_rx) = self.analyzer.file_changes() {
            let indexer = self.clone();
            let mut shutdown_rx = self.shutdown.subscribe();
            let task = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        event = adapter_rx.recv() => {
                            match event {
                                Ok(event) => indexer.handle_event(event).await,
                                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                                Err(broadcast::error::RecvError::Closed) => break,
                            }
                        }
                    }
                }
            });
            *self.watcher_task.lock() = Some(task);
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<FileEvent>();
        let root = self.project_root.clone();

        let watcher = {
            let root = root.clone();
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                let Ok(event) = res else { return };
                for file_event in translate_event(&root, event) {
                    let _ = tx.send(file_event);
                }
            })
        };

        let mut watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!("file watcher unavailable: {e}");
                return;
            }
        };
        if let Err(e) = watcher.watch(&root, RecursiveMode::Recursive) {
            tracing::warn!("cannot watch {}: {e}", root.display());
            return;
        }

        let indexer = self.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let task = tokio::spawn(async move {
            // The watcher must live as long as the loop.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    event = rx.recv() => {
                        match event {
                            Some(event) => indexer.handle_event(event).await,
                            None => break,
                        }
                    }
                }
            }
        });
        *self.watcher_task.lock() = Some(task);
    }
}

impl Drop for IncrementalIndexer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.watcher_task.lock().take() {
            task.abort();
        }
    }
}

/// Translate a notify event into indexer events, suppressing ignored paths
/// and non-source files.
fn translate_event(root: &Path, event: notify::Event) -> Vec<FileEvent> {
    use notify::EventKind;
    use notify::event::{ModifyKind, RenameMode};

    let relevant = |path: &PathBuf| -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("dart")
            && path
                .strip_prefix(root)
                .map(|rel| !discovery::is_ignored_path(rel))
                .unwrap_or(false)
    };

    let paths: Vec<PathBuf> = event.paths.into_iter().collect();
    match event.kind {
        EventKind::Create(_) => paths
            .into_iter()
            .filter(relevant)
            .map(FileEvent::Created)
            .collect(),
        EventKind::Remove(_) => paths
            .into_iter()
            .filter(relevant)
            .map(FileEvent::Removed)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if paths.len() == 2 && relevant(&paths[0]) && relevant(&paths[1]) {
                let mut iter = paths.into_iter();
                let from = iter.next().unwrap();
                let to = iter.next().unwrap();
                vec![FileEvent::Moved { from, to }]
            } else {
                Vec::new()
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths
            .into_iter()
            .filter(relevant)
            .map(FileEvent::Removed)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths
            .into_iter()
            .filter(relevant)
            .map(FileEvent::Created)
            .collect(),
        EventKind::Modify(_) => paths
            .into_iter()
            .filter(relevant)
            .map(FileEvent::Modified)
            .collect(),
        _ => Vec::new(),
    }
}

fn relative_posix(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

fn hash_all(root: &Path, files: &[PathBuf]) -> FileHashes {
    let mut hashes = FileHashes::new();
    for file in files {
        let Some(rel) = relative_posix(root, file) else {
            continue;
        };
        if let Ok(hash) = cache::hash_file(file) {
            hashes.insert(rel, hash);
        }
    }
    hashes
}
