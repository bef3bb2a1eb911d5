//! Package discovery: segment-exact ignores and deterministic output.

mod common;

use common::write_file;
use dartscope::discovery::{discover_packages, discover_source_files};
use pretty_assertions::assert_eq;

#[test]
fn discovers_packages_sorted_and_named() {
    let temp = tempfile::tempdir().unwrap();
    write_file(temp.path(), "pubspec.yaml", "name: root_app\n");
    write_file(temp.path(), "packages/b/pubspec.yaml", "name: beta\n");
    write_file(temp.path(), "packages/a/pubspec.yaml", "name: alpha\n");

    let packages = discover_packages(temp.path()).unwrap();
    let summary: Vec<(&str, &str)> = packages
        .iter()
        .map(|p| (p.name.as_str(), p.relative_path.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("root_app", ""),
            ("alpha", "packages/a"),
            ("beta", "packages/b"),
        ]
    );
}

#[test]
fn ignored_segments_are_skipped() {
    let temp = tempfile::tempdir().unwrap();
    write_file(temp.path(), "pubspec.yaml", "name: app\n");
    write_file(temp.path(), "build/pubspec.yaml", "name: built\n");
    write_file(temp.path(), ".dart_tool/pkg/pubspec.yaml", "name: tooled\n");
    write_file(
        temp.path(),
        "examples_dir/.pub-cache/x/pubspec.yaml",
        "name: cached\n",
    );

    let packages = discover_packages(temp.path()).unwrap();
    let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["app"]);
}

#[test]
fn segment_match_is_not_substring_match() {
    let temp = tempfile::tempdir().unwrap();
    write_file(temp.path(), "pubspec.yaml", "name: app\n");
    // `build_utils` contains "build" but is not the `build` segment.
    write_file(temp.path(), "build_utils/pubspec.yaml", "name: build_utils\n");

    let packages = discover_packages(temp.path()).unwrap();
    let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["app", "build_utils"]);
}

#[test]
fn pubspec_without_a_name_is_ignored() {
    let temp = tempfile::tempdir().unwrap();
    write_file(temp.path(), "pubspec.yaml", "name: app\n");
    write_file(temp.path(), "broken/pubspec.yaml", "description: nameless\n");

    let packages = discover_packages(temp.path()).unwrap();
    assert_eq!(packages.len(), 1);
}

#[test]
fn source_walk_skips_ignored_directories() {
    let temp = tempfile::tempdir().unwrap();
    write_file(temp.path(), "lib/a.dart", "class A {}\n");
    write_file(temp.path(), "lib/src/b.dart", "class B {}\n");
    write_file(temp.path(), "build/generated.dart", "class G {}\n");
    write_file(temp.path(), ".dart_tool/cache.dart", "class C {}\n");
    write_file(temp.path(), "build_utils/keep.dart", "class K {}\n");
    write_file(temp.path(), "notes.txt", "not dart\n");

    let files = discover_source_files(temp.path());
    let rels: Vec<String> = files
        .iter()
        .map(|f| {
            f.strip_prefix(temp.path())
                .unwrap()
                .to_string_lossy()
                .to_string()
        })
        .collect();
    assert_eq!(
        rels,
        vec!["build_utils/keep.dart", "lib/a.dart", "lib/src/b.dart"]
    );
}
