//! Per-document call-graph construction.
//!
//! Caller/callee edges are derived in two passes over a single document:
//! definitions with their enclosing spans first, then every non-definition
//! occurrence is credited to the innermost definition whose span contains
//! its line. Cross-file calls appear only when the caller's body is present
//! in some document, which is exactly the information a per-file analyzer
//! emits.

use crate::types::Document;

/// A definition span inside one document.
#[derive(Debug, Clone)]
struct DefSpan {
    symbol: String,
    start_line: u32,
    end_line: u32,
}

/// Build `(caller, callee)` edges for one document.
///
/// Definitions are sorted by `(start_line asc, enclosing_end_line asc)` so
/// the innermost enclosing definition is the last one whose start does not
/// exceed the reference line while its end still covers it.
pub fn build_edges(doc: &Document) -> Vec<(String, String)> {
    let mut defs: Vec<DefSpan> = doc
        .occurrences
        .iter()
        .filter(|occ| occ.is_definition())
        .filter_map(|occ| {
            let end_line = occ.enclosing_end_line?;
            Some(DefSpan {
                symbol: occ.symbol.clone(),
                start_line: occ.start_line,
                end_line,
            })
        })
        .collect();

    if defs.is_empty() {
        return Vec::new();
    }

    defs.sort_by(|a, b| {
        a.start_line
            .cmp(&b.start_line)
            .then(a.end_line.cmp(&b.end_line))
    });

    let mut edges = Vec::new();
    for occ in doc.occurrences.iter().filter(|o| !o.is_definition()) {
        let line = occ.start_line;
        let caller = defs
            .iter()
            .filter(|d| d.start_line <= line && line <= d.end_line)
            .next_back();
        if let Some(caller) = caller {
            edges.push((caller.symbol.clone(), occ.symbol.clone()));
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Occurrence, SymbolRole};

    fn def(symbol: &str, line: u32, end: u32) -> Occurrence {
        Occurrence {
            file: "lib/s.dart".into(),
            symbol: symbol.into(),
            start_line: line,
            start_col: 0,
            end_line: line,
            end_col: 1,
            roles: SymbolRole::DEFINITION,
            enclosing_end_line: Some(end),
        }
    }

    fn reference(symbol: &str, line: u32) -> Occurrence {
        Occurrence {
            file: "lib/s.dart".into(),
            symbol: symbol.into(),
            start_line: line,
            start_col: 0,
            end_line: line,
            end_col: 1,
            roles: SymbolRole::empty(),
            enclosing_end_line: None,
        }
    }

    fn doc(occurrences: Vec<Occurrence>) -> Document {
        Document {
            language: "dart".into(),
            relative_path: "lib/s.dart".into(),
            symbols: vec![],
            occurrences,
        }
    }

    #[test]
    fn credits_innermost_definition() {
        // class Svc spans 0..10, login() spans 1..4; a reference on line 2
        // belongs to login, not to the class.
        let d = doc(vec![
            def("Svc#", 0, 10),
            def("Svc#login().", 1, 4),
            def("Svc#validate().", 5, 8),
            reference("Svc#validate().", 2),
        ]);
        let edges = build_edges(&d);
        assert_eq!(edges, vec![("Svc#login().".to_string(), "Svc#validate().".to_string())]);
    }

    #[test]
    fn reference_outside_any_definition_is_dropped() {
        let d = doc(vec![def("Svc#login().", 1, 4), reference("other", 9)]);
        assert!(build_edges(&d).is_empty());
    }

    #[test]
    fn recursion_yields_a_self_edge() {
        let d = doc(vec![
            def("Svc#login().", 1, 4),
            reference("Svc#login().", 2),
        ]);
        let edges = build_edges(&d);
        assert_eq!(edges, vec![("Svc#login().".to_string(), "Svc#login().".to_string())]);
    }

    #[test]
    fn unsorted_definitions_still_resolve_innermost() {
        // Definitions emitted inner-first; the sort fixes the scan order.
        let d = doc(vec![
            def("Svc#login().", 1, 4),
            def("Svc#", 0, 10),
            reference("Svc#validate().", 3),
        ]);
        let edges = build_edges(&d);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].0, "Svc#login().");
    }
}
