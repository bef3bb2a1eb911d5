//! Invariants of the in-memory index over hand-built documents.

mod common;

use dartscope::index::Index;
use dartscope::types::{
    Document, Occurrence, Relationship, SymbolInformation, SymbolKind, SymbolRole,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

const PKG: &str = "scip-dart pub app 1.0.0";

fn sym(id: &str, kind: SymbolKind, file: Option<&str>) -> SymbolInformation {
    SymbolInformation {
        symbol: id.to_string(),
        kind,
        display_name: None,
        documentation: Vec::new(),
        relationships: Vec::new(),
        defining_file: file.map(str::to_string),
    }
}

fn def(file: &str, id: &str, line: u32, end: u32) -> Occurrence {
    Occurrence {
        file: file.to_string(),
        symbol: id.to_string(),
        start_line: line,
        start_col: 0,
        end_line: line,
        end_col: 1,
        roles: SymbolRole::DEFINITION,
        enclosing_end_line: Some(end),
    }
}

fn reference(file: &str, id: &str, line: u32) -> Occurrence {
    Occurrence {
        file: file.to_string(),
        symbol: id.to_string(),
        start_line: line,
        start_col: 4,
        end_line: line,
        end_col: 8,
        roles: SymbolRole::empty(),
        enclosing_end_line: None,
    }
}

/// `lib/svc.dart`: class Svc with login() calling validate().
fn svc_document() -> Document {
    let class_id = format!("{PKG} lib/svc.dart/Svc#");
    let login_id = format!("{PKG} lib/svc.dart/Svc#login().");
    let validate_id = format!("{PKG} lib/svc.dart/Svc#validate().");
    Document {
        language: "dart".into(),
        relative_path: "lib/svc.dart".into(),
        symbols: vec![
            sym(&class_id, SymbolKind::Class, Some("lib/svc.dart")),
            sym(&login_id, SymbolKind::Method, Some("lib/svc.dart")),
            sym(&validate_id, SymbolKind::Method, Some("lib/svc.dart")),
        ],
        occurrences: vec![
            def("lib/svc.dart", &class_id, 0, 8),
            def("lib/svc.dart", &login_id, 1, 3),
            reference("lib/svc.dart", &validate_id, 2),
            def("lib/svc.dart", &validate_id, 4, 6),
        ],
    }
}

fn new_index() -> Index {
    Index::new(PathBuf::from("/nonexistent"))
}

#[test]
fn update_then_remove_then_update_is_idempotent() {
    let index = new_index();
    let doc = svc_document();
    let login_id = format!("{PKG} lib/svc.dart/Svc#login().");
    let class_id = format!("{PKG} lib/svc.dart/Svc#");

    index.update_document(doc.clone());
    let stats_before = index.stats();
    let members_before: Vec<String> = index
        .members_of(&class_id)
        .iter()
        .map(|m| m.symbol.clone())
        .collect();
    let calls_before = index.get_calls(&login_id);

    assert!(index.remove_document("lib/svc.dart"));
    assert_eq!(index.stats().symbols, 0);
    assert_eq!(index.stats().documents, 0);
    assert!(index.get_calls(&login_id).is_empty());

    index.update_document(doc);
    assert_eq!(index.stats(), stats_before);
    let members_after: Vec<String> = index
        .members_of(&class_id)
        .iter()
        .map(|m| m.symbol.clone())
        .collect();
    assert_eq!(members_after, members_before);
    assert_eq!(index.get_calls(&login_id), calls_before);
}

#[test]
fn members_follow_descriptor_truncation() {
    let index = new_index();
    index.update_document(svc_document());
    let class_id = format!("{PKG} lib/svc.dart/Svc#");

    let members: Vec<String> = index
        .members_of(&class_id)
        .iter()
        .map(|m| m.name())
        .collect();
    assert_eq!(members, vec!["login", "validate"]);
}

#[test]
fn call_graph_credits_innermost_definition() {
    let index = new_index();
    index.update_document(svc_document());
    let login_id = format!("{PKG} lib/svc.dart/Svc#login().");
    let validate_id = format!("{PKG} lib/svc.dart/Svc#validate().");

    assert_eq!(index.get_calls(&login_id), vec![validate_id.clone()]);
    assert_eq!(index.get_callers(&validate_id), vec![login_id]);
}

#[test]
fn references_are_disjoint_from_definitions() {
    let index = new_index();
    index.update_document(svc_document());
    let validate_id = format!("{PKG} lib/svc.dart/Svc#validate().");

    let refs = index.find_references(&validate_id);
    assert_eq!(refs.len(), 1);
    assert!(refs.iter().all(|r| !r.is_definition()));

    let definition = index.find_definition(&validate_id).unwrap();
    assert!(definition.is_definition());
    assert!(
        refs.iter()
            .all(|r| (r.start_line, r.start_col) != (definition.start_line, definition.start_col))
    );
}

#[test]
fn removing_a_document_purges_cross_file_references() {
    let index = new_index();
    index.update_document(svc_document());

    // lib/caller.dart references Svc#validate() from another file.
    let validate_id = format!("{PKG} lib/svc.dart/Svc#validate().");
    let helper_id = format!("{PKG} lib/caller.dart/helper().");
    index.update_document(Document {
        language: "dart".into(),
        relative_path: "lib/caller.dart".into(),
        symbols: vec![sym(&helper_id, SymbolKind::Function, Some("lib/caller.dart"))],
        occurrences: vec![
            def("lib/caller.dart", &helper_id, 0, 2),
            reference("lib/caller.dart", &validate_id, 1),
        ],
    });

    assert_eq!(index.find_references(&validate_id).len(), 2);

    index.remove_document("lib/caller.dart");
    let remaining = index.find_references(&validate_id);
    assert_eq!(remaining.len(), 1);
    assert!(remaining.iter().all(|r| r.file == "lib/svc.dart"));
    // Nothing anywhere still references the removed file.
    for id in [&validate_id, &helper_id] {
        assert!(
            index
                .find_references(id)
                .iter()
                .all(|r| r.file != "lib/caller.dart")
        );
    }
    assert!(index.get_symbol(&helper_id).is_none());
}

#[test]
fn external_symbols_never_parent_and_vanish_with_last_occurrence() {
    let index = new_index();
    let widget_id = "scip-dart pub unresolved 0.0.0 _/Widget#";
    let app_id = format!("{PKG} lib/app.dart/App#");

    let mut doc = Document {
        language: "dart".into(),
        relative_path: "lib/app.dart".into(),
        symbols: vec![sym(&app_id, SymbolKind::Class, Some("lib/app.dart"))],
        occurrences: vec![
            def("lib/app.dart", &app_id, 0, 4),
            reference("lib/app.dart", widget_id, 1),
        ],
    };
    doc.symbols.push(sym(widget_id, SymbolKind::Class, None));
    index.update_document(doc);

    let info = index.get_symbol(widget_id).unwrap();
    assert!(info.is_external());
    // External symbols participate in occurrence queries...
    assert_eq!(index.find_references(widget_id).len(), 1);
    // ...but never become callers.
    assert!(index.get_calls(widget_id).is_empty());
    assert_eq!(index.stats().external_symbols, 1);

    index.remove_document("lib/app.dart");
    assert!(index.get_symbol(widget_id).is_none());
}

#[test]
fn subtype_edges_resolve_by_relationship() {
    let index = new_index();
    let a_id = format!("{PKG} lib/a.dart/A#");
    index.update_document(Document {
        language: "dart".into(),
        relative_path: "lib/a.dart".into(),
        symbols: vec![sym(&a_id, SymbolKind::Class, Some("lib/a.dart"))],
        occurrences: vec![def("lib/a.dart", &a_id, 0, 2)],
    });

    let b_id = format!("{PKG} lib/b.dart/B#");
    let mut b = sym(&b_id, SymbolKind::Class, Some("lib/b.dart"));
    b.relationships.push(Relationship {
        symbol: a_id.clone(),
        is_implementation: true,
        ..Default::default()
    });
    index.update_document(Document {
        language: "dart".into(),
        relative_path: "lib/b.dart".into(),
        symbols: vec![b],
        occurrences: vec![def("lib/b.dart", &b_id, 0, 2)],
    });

    assert_eq!(index.supertypes_of(&b_id), vec![a_id.clone()]);
    assert_eq!(index.subtypes_of(&a_id), vec![b_id.clone()]);

    index.remove_document("lib/b.dart");
    assert!(index.subtypes_of(&a_id).is_empty());
}

#[test]
fn pattern_search_is_contained_in_star() {
    let index = new_index();
    index.update_document(svc_document());

    let all = index.find_symbols("*");
    let subset = index.find_symbols("va?idate");
    assert!(!subset.is_empty());
    for info in &subset {
        assert!(all.iter().any(|a| a.symbol == info.symbol));
    }

    // Fuzzy search with a one-character typo still finds the method.
    let fuzzy = index.find_symbols_fuzzy("validte", 2);
    assert!(fuzzy.iter().any(|s| s.name() == "validate"));
}

#[test]
fn qualified_lookup_matches_container_and_member() {
    let index = new_index();
    index.update_document(svc_document());

    let hits = index.find_qualified("Svc", "log*");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name(), "login");

    assert!(index.find_qualified("Other", "login").is_empty());
}

#[test]
fn find_by_name_uses_display_name_override() {
    let index = new_index();
    let id = format!("{PKG} lib/x.dart/internalName().");
    let mut info = sym(&id, SymbolKind::Function, Some("lib/x.dart"));
    info.display_name = Some("publicName".into());
    index.update_document(Document {
        language: "dart".into(),
        relative_path: "lib/x.dart".into(),
        symbols: vec![info],
        occurrences: vec![def("lib/x.dart", &id, 0, 0)],
    });

    assert_eq!(index.find_by_name("publicName").len(), 1);
    assert!(index.find_by_name("internalName").is_empty());
}

#[test]
fn get_source_reads_enclosing_span() {
    let temp = common::dart_package("app");
    common::write_file(
        temp.path(),
        "lib/svc.dart",
        "class Svc {\n  int login() {\n    return 1;\n  }\n}\n",
    );

    let index = Index::new(temp.path().to_path_buf());
    index.update_document(svc_document());
    let login_id = format!("{PKG} lib/svc.dart/Svc#login().");

    let source = index.get_source(&login_id).unwrap();
    assert_eq!(source, "  int login() {\n    return 1;\n  }");

    // A file that is not on disk degrades to None, not an error.
    let missing = Index::new(PathBuf::from("/nonexistent"));
    missing.update_document(svc_document());
    assert!(missing.get_source(&login_id).is_none());
}
