//! End-to-end indexer scenarios: bulk build, incremental updates, cache
//! round-trips and the update stream.

mod common;

use common::{dart_package, write_file};
use dartscope::analyzer::FileEvent;
use dartscope::cache::IndexCache;
use dartscope::indexer::{FileOutcome, IncrementalIndexer, IndexerOptions, UpdateEvent};
use pretty_assertions::assert_eq;

async fn open(root: &std::path::Path) -> std::sync::Arc<IncrementalIndexer> {
    IncrementalIndexer::open(root, IndexerOptions::default())
        .await
        .expect("open indexer")
}

fn names(infos: &[dartscope::types::SymbolInformation]) -> Vec<String> {
    infos.iter().map(|i| i.name()).collect()
}

#[tokio::test]
async fn bulk_index_then_incremental_update() {
    let temp = dart_package("app");
    write_file(temp.path(), "lib/a.dart", "class A {\n  void m() {}\n}\n");
    write_file(
        temp.path(),
        "lib/b.dart",
        "class B extends A {\n  void m() {}\n}\n",
    );

    let indexer = open(temp.path()).await;
    let index = indexer.index();

    let a_id = index
        .find_by_name("A")
        .into_iter()
        .find(|i| !i.is_external())
        .unwrap()
        .symbol;
    let b_id = index
        .find_by_name("B")
        .into_iter()
        .find(|i| !i.is_external())
        .unwrap()
        .symbol;

    // hierarchy A: no supertypes, subtype B.
    assert!(index.supertypes_of(&a_id).is_empty());
    assert_eq!(index.subtypes_of(&a_id), vec![b_id.clone()]);
    // hierarchy B: supertype A, no subtypes.
    assert_eq!(
        index
            .supertypes_of(&b_id)
            .iter()
            .map(|id| dartscope::symbol::name_of(id))
            .collect::<Vec<_>>(),
        vec!["A"]
    );
    assert!(index.subtypes_of(&b_id).is_empty());

    assert_eq!(names(&index.members_of(&a_id)), vec!["m"]);
    assert_eq!(names(&index.members_of(&b_id)), vec!["m"]);

    // Remove B's m and refresh: members B empties, members A unchanged.
    write_file(temp.path(), "lib/b.dart", "class B extends A {}\n");
    indexer
        .handle_event(FileEvent::Modified(temp.path().join("lib/b.dart")))
        .await;

    assert!(index.members_of(&b_id).is_empty());
    assert_eq!(names(&index.members_of(&a_id)), vec!["m"]);

    indexer.dispose();
}

#[tokio::test]
async fn call_graph_scenario() {
    let temp = dart_package("app");
    write_file(
        temp.path(),
        "lib/s.dart",
        "class Svc {\n  int login(String u) {\n    return validate(u);\n  }\n  int validate(String u) {\n    return u.length;\n  }\n}\n",
    );

    let indexer = open(temp.path()).await;
    let index = indexer.index();

    let login_id = index.find_by_name("login")[0].symbol.clone();
    let validate_id = index.find_by_name("validate")[0].symbol.clone();

    assert_eq!(index.get_calls(&login_id), vec![validate_id.clone()]);
    assert_eq!(index.get_callers(&validate_id), vec![login_id.clone()]);

    // Delete the file; both directions empty out.
    std::fs::remove_file(temp.path().join("lib/s.dart")).unwrap();
    indexer
        .handle_event(FileEvent::Removed(temp.path().join("lib/s.dart")))
        .await;

    assert!(index.get_calls(&login_id).is_empty());
    assert!(index.get_callers(&validate_id).is_empty());
    assert!(index.find_by_name("login").is_empty());

    indexer.dispose();
}

#[tokio::test]
async fn cache_round_trip_emits_cached_load() {
    let temp = dart_package("app");
    write_file(temp.path(), "lib/a.dart", "class A {\n  void m() {}\n}\n");

    let first = open(temp.path()).await;
    let first_stats = first.stats();
    assert!(
        first
            .startup_events()
            .iter()
            .any(|e| matches!(e, UpdateEvent::InitialBuild { .. }))
    );
    first.dispose();
    drop(first);

    // Touch nothing and reopen: exactly one CachedLoad, identical stats.
    let second = open(temp.path()).await;
    let events = second.startup_events();
    let cached_loads = events
        .iter()
        .filter(|e| matches!(e, UpdateEvent::CachedLoad { .. }))
        .count();
    assert_eq!(cached_loads, 1);
    assert_eq!(events.len(), 1);
    assert_eq!(second.stats(), first_stats);

    // Identical query answers for members on a symbol present.
    let a_id = second.index().find_by_name("A")[0].symbol.clone();
    assert_eq!(names(&second.index().members_of(&a_id)), vec!["m"]);
    second.dispose();
}

#[tokio::test]
async fn incremental_reopen_applies_diff() {
    let temp = dart_package("app");
    // Validation spot-checks the first five recorded hashes; keep those
    // stable so the changed files land on the incremental path.
    for name in ["a", "b", "c", "d", "e"] {
        write_file(
            temp.path(),
            &format!("lib/{name}.dart"),
            &format!("class Stable{} {{}}\n", name.to_uppercase()),
        );
    }
    write_file(temp.path(), "lib/x.dart", "class X {}\n");
    write_file(temp.path(), "lib/z.dart", "class Z {}\n");

    let first = open(temp.path()).await;
    first.dispose();
    drop(first);

    // One changed, one added, one removed, all past the sampled prefix.
    write_file(temp.path(), "lib/x.dart", "class X {\n  void fresh() {}\n}\n");
    write_file(temp.path(), "lib/y.dart", "class Y {}\n");
    std::fs::remove_file(temp.path().join("lib/z.dart")).unwrap();

    let second = open(temp.path()).await;
    let incremental = second
        .startup_events()
        .into_iter()
        .find(|e| matches!(e, UpdateEvent::IncrementalBuild { .. }));
    let Some(UpdateEvent::IncrementalBuild {
        added,
        changed,
        removed,
        ..
    }) = incremental
    else {
        panic!("expected an IncrementalBuild event");
    };
    assert_eq!((added, changed, removed), (1, 1, 1));

    let index = second.index();
    assert!(index.find_by_name("Z").is_empty());
    assert_eq!(index.find_by_name("Y").len(), 1);
    assert_eq!(index.find_by_name("fresh").len(), 1);
    assert_eq!(index.find_by_name("StableA").len(), 1);
    second.dispose();
}

#[tokio::test]
async fn unchanged_files_are_skipped() {
    let temp = dart_package("app");
    write_file(temp.path(), "lib/a.dart", "class A {}\n");

    let indexer = open(temp.path()).await;
    let outcome = indexer.index_one_file(&temp.path().join("lib/a.dart")).await;
    assert_eq!(outcome, FileOutcome::Unchanged);
    indexer.dispose();
}

#[tokio::test]
async fn corrupt_cache_falls_back_to_full_rebuild() {
    let temp = dart_package("app");
    write_file(temp.path(), "lib/a.dart", "class A {}\n");

    let first = open(temp.path()).await;
    first.dispose();
    drop(first);

    // Truncate the index bytes; the reopen must silently rebuild.
    let cache = IndexCache::new(temp.path().to_path_buf());
    std::fs::write(cache.index_path(), b"garbage").unwrap();

    let second = open(temp.path()).await;
    assert!(matches!(
        second.startup_events().last(),
        Some(UpdateEvent::InitialBuild { .. })
    ));
    assert_eq!(second.index().find_by_name("A").len(), 1);
    second.dispose();
}

#[tokio::test]
async fn move_event_is_delete_then_create() {
    let temp = dart_package("app");
    write_file(temp.path(), "lib/old.dart", "class Thing {}\n");

    let indexer = open(temp.path()).await;
    assert!(indexer.index().contains_document("lib/old.dart"));

    std::fs::rename(
        temp.path().join("lib/old.dart"),
        temp.path().join("lib/new.dart"),
    )
    .unwrap();
    indexer
        .handle_event(FileEvent::Moved {
            from: temp.path().join("lib/old.dart"),
            to: temp.path().join("lib/new.dart"),
        })
        .await;

    assert!(!indexer.index().contains_document("lib/old.dart"));
    assert!(indexer.index().contains_document("lib/new.dart"));
    assert_eq!(indexer.index().find_by_name("Thing").len(), 1);
    indexer.dispose();
}

#[tokio::test]
async fn missing_pubspec_aborts_open() {
    let temp = tempfile::tempdir().unwrap();
    write_file(temp.path(), "lib/a.dart", "class A {}\n");

    let err = IncrementalIndexer::open(temp.path(), IndexerOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        dartscope::error::EngineError::MissingPackageManifest(_)
    ));
}

#[tokio::test]
async fn file_updated_events_carry_symbol_counts() {
    let temp = dart_package("app");
    write_file(temp.path(), "lib/a.dart", "class A {\n  void m() {}\n}\n");

    let indexer = open(temp.path()).await;
    let updated = indexer
        .startup_events()
        .into_iter()
        .find_map(|e| match e {
            UpdateEvent::FileUpdated { path, symbol_count } => Some((path, symbol_count)),
            _ => None,
        })
        .expect("a FileUpdated event");
    assert_eq!(updated.0, "lib/a.dart");
    assert_eq!(updated.1, 2);
    indexer.dispose();
}

/// Adapter serving resolved units for files that never touch disk; change
/// detection must fall back to the unit's own content hash.
struct StaticAdapter {
    root: std::path::PathBuf,
    files: Vec<std::path::PathBuf>,
}

impl dartscope::Analyzer for StaticAdapter {
    fn project_root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolved_unit(
        &self,
        path: &std::path::Path,
    ) -> Result<Option<dartscope::ResolvedUnit>, dartscope::analyzer::AnalyzerError> {
        use dartscope::analyzer::{Declaration, SourceRange};
        let rel = path
            .strip_prefix(&self.root)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        Ok(Some(dartscope::ResolvedUnit {
            relative_path: rel.clone(),
            language: "dart".into(),
            content_hash: dartscope::cache::hash_bytes(rel.as_bytes()),
            declarations: vec![Declaration {
                symbol: format!("scip-dart pub virt 1.0.0 {rel}/Thing#"),
                kind: dartscope::types::SymbolKind::Class,
                display_name: "Thing".into(),
                documentation: Vec::new(),
                supertypes: Vec::new(),
                range: SourceRange {
                    start_line: 0,
                    start_col: 6,
                    end_line: 0,
                    end_col: 11,
                },
                body_end_line: 0,
            }],
            references: Vec::new(),
            external_symbols: Vec::new(),
        }))
    }

    fn notify_file_change(&self, _path: &std::path::Path) {}

    fn list_source_files(&self) -> Option<Vec<std::path::PathBuf>> {
        Some(self.files.clone())
    }
}

#[tokio::test]
async fn adapter_backed_open_uses_unit_content_hashes() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().to_path_buf();
    let adapter = std::sync::Arc::new(StaticAdapter {
        files: vec![root.join("lib/virtual.dart")],
        root,
    });

    let package = dartscope::manifest::PackageManifest {
        name: "virt".into(),
        version: Some("1.0.0".into()),
        ..Default::default()
    };
    let indexer =
        IncrementalIndexer::open_with_adapter(adapter, package, IndexerOptions::default())
            .await
            .unwrap();

    assert!(
        indexer
            .startup_events()
            .iter()
            .any(|e| matches!(e, UpdateEvent::InitialBuild { .. }))
    );
    assert!(indexer.index().contains_document("lib/virtual.dart"));
    assert_eq!(indexer.index().find_by_name("Thing").len(), 1);

    // Reindexing the same virtual file is a no-op thanks to the unit's
    // content hash.
    let outcome = indexer
        .index_one_file(&indexer.project_root().join("lib/virtual.dart"))
        .await;
    assert_eq!(outcome, FileOutcome::Unchanged);
    indexer.dispose();
}

#[tokio::test]
async fn live_events_reach_subscribers() {
    let temp = dart_package("app");
    write_file(temp.path(), "lib/a.dart", "class A {}\n");

    let indexer = open(temp.path()).await;
    let mut events = indexer.subscribe();

    write_file(temp.path(), "lib/a.dart", "class A {\n  void m() {}\n}\n");
    indexer
        .handle_event(FileEvent::Modified(temp.path().join("lib/a.dart")))
        .await;

    let event = events.try_recv().expect("an event");
    assert!(matches!(event, UpdateEvent::FileUpdated { .. }));
    indexer.dispose();
}
