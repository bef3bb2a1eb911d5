//! In-memory symbol/occurrence/call-graph store for one package or source
//! tree.
//!
//! The index holds a document table plus derived tables kept in lockstep:
//! symbols, occurrence lists, the parent/child hierarchy, and the call
//! graph. All tables live behind one `RwLock` so a query observes either
//! the entirety of a document's slot or none of it; mutation prepares the
//! new slot first and swaps it in under the write lock.
//!
//! Graphs are stored as disjoint maps keyed by opaque symbol ids — symbol
//! information is owned exclusively by the symbol table, every other table
//! holds ids.

pub mod callgraph;
pub mod grep;
pub mod pattern;

use crate::scip::ScipIndex;
use crate::symbol;
use crate::types::{
    Document, GrepMatch, GrepOptions, IndexStats, Occurrence, SymbolInformation,
};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Default)]
struct Tables {
    documents: HashMap<String, Document>,
    symbols: HashMap<String, SymbolInformation>,
    occurrences: HashMap<String, Vec<Occurrence>>,
    children: HashMap<String, Vec<String>>,
    /// caller -> callee -> edge count. Counted so removing one document's
    /// contribution never drops an edge another document still justifies.
    calls: HashMap<String, HashMap<String, u32>>,
    callers: HashMap<String, HashMap<String, u32>>,
    edges_by_file: HashMap<String, Vec<(String, String)>>,
}

/// In-memory index for one package.
///
/// `project_root` is where the cache lives; `source_root` is where the
/// source files reside. They differ for external indexes stored in the
/// global cache while their source sits in the pub cache or SDK.
pub struct Index {
    project_root: PathBuf,
    source_root: PathBuf,
    tables: RwLock<Tables>,
}

impl Index {
    pub fn new(project_root: PathBuf) -> Self {
        let source_root = project_root.clone();
        Self {
            project_root,
            source_root,
            tables: RwLock::new(Tables::default()),
        }
    }

    pub fn with_source_root(project_root: PathBuf, source_root: PathBuf) -> Self {
        Self {
            project_root,
            source_root,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Reconstruct an index from a serialized record stream.
    pub fn from_record(record: &ScipIndex, project_root: PathBuf, source_root: PathBuf) -> Self {
        let index = Self::with_source_root(project_root, source_root);
        for doc in &record.documents {
            index.update_document(doc.to_document());
        }
        index.register_external_symbols(
            record
                .external_symbols
                .iter()
                .map(|s| s.to_symbol_information(None))
                .collect(),
        );
        index
    }

    /// Serialize the current document table to the record stream shape.
    pub fn to_record(&self) -> ScipIndex {
        let tables = self.tables.read();
        let mut docs: Vec<Document> = tables.documents.values().cloned().collect();
        drop(tables);
        // Re-attach external symbol info so the record stream round-trips.
        let externals = self.external_symbols();
        for doc in &mut docs {
            let referenced: HashSet<&str> =
                doc.occurrences.iter().map(|o| o.symbol.as_str()).collect();
            for ext in &externals {
                if referenced.contains(ext.symbol.as_str()) {
                    doc.symbols.push(ext.clone());
                }
            }
        }
        crate::scip::build_index_record(&self.project_root, &docs)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Atomically replace the slot at `doc.relative_path`: the old slot's
    /// contributions leave every derived table, the new document's symbols,
    /// occurrences, parent links and call edges enter, in one write-lock
    /// critical section.
    pub fn update_document(&self, doc: Document) {
        // Everything derivable from the document alone is prepared outside
        // the critical section; an error here leaves the old slot intact.
        let edges = callgraph::build_edges(&doc);

        let mut tables = self.tables.write();
        remove_contributions(&mut tables, &doc.relative_path);
        insert_document(&mut tables, doc, edges);
    }

    /// Remove the document at `path` and all of its contributions,
    /// including occurrences it held for symbols defined elsewhere.
    /// Returns false when no such document exists.
    pub fn remove_document(&self, path: &str) -> bool {
        let mut tables = self.tables.write();
        let existed = tables.documents.contains_key(path);
        remove_contributions(&mut tables, path);
        existed
    }

    /// Install symbols that are referenced but defined outside every
    /// document in this index. Entries never displace a defined symbol.
    pub fn register_external_symbols(&self, infos: Vec<SymbolInformation>) {
        let mut tables = self.tables.write();
        for mut info in infos {
            info.defining_file = None;
            tables.symbols.entry(info.symbol.clone()).or_insert(info);
        }
    }

    // ------------------------------------------------------------------
    // Symbol queries
    // ------------------------------------------------------------------

    pub fn get_symbol(&self, id: &str) -> Option<SymbolInformation> {
        self.tables.read().symbols.get(id).cloned()
    }

    /// Exact-name lookup over extracted/display names.
    pub fn find_by_name(&self, name: &str) -> Vec<SymbolInformation> {
        let tables = self.tables.read();
        let mut out: Vec<SymbolInformation> = tables
            .symbols
            .values()
            .filter(|s| s.name() == name)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    /// Glob search, anchored to the whole name, case-insensitive.
    pub fn find_symbols(&self, pattern: &str) -> Vec<SymbolInformation> {
        match pattern::compile_glob(pattern) {
            Ok(re) => self.find_symbols_matching(&re),
            Err(_) => Vec::new(),
        }
    }

    /// Regex search over names, for the `/…/` pattern dialect.
    pub fn find_symbols_matching(&self, re: &Regex) -> Vec<SymbolInformation> {
        let tables = self.tables.read();
        let mut out: Vec<SymbolInformation> = tables
            .symbols
            .values()
            .filter(|s| re.is_match(&s.name()))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    /// Edit-distance search; substring hits bypass the distance check.
    pub fn find_symbols_fuzzy(&self, pattern: &str, max_distance: usize) -> Vec<SymbolInformation> {
        let tables = self.tables.read();
        let mut out: Vec<SymbolInformation> = tables
            .symbols
            .values()
            .filter(|s| pattern::fuzzy_matches(&s.name(), pattern, max_distance))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    /// Symbols whose name matches `member_pattern` and whose parent's name
    /// matches `container_pattern`, both with glob semantics.
    pub fn find_qualified(
        &self,
        container_pattern: &str,
        member_pattern: &str,
    ) -> Vec<SymbolInformation> {
        let (Ok(container_re), Ok(member_re)) = (
            pattern::compile_glob(container_pattern),
            pattern::compile_glob(member_pattern),
        ) else {
            return Vec::new();
        };

        let tables = self.tables.read();
        let mut out: Vec<SymbolInformation> = tables
            .symbols
            .values()
            .filter(|s| {
                if !member_re.is_match(&s.name()) {
                    return false;
                }
                let Some(parent_id) = symbol::parent_of(&s.symbol) else {
                    return false;
                };
                let parent_name = tables
                    .symbols
                    .get(&parent_id)
                    .map(|p| p.name())
                    .unwrap_or_else(|| symbol::name_of(&parent_id));
                container_re.is_match(&parent_name)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    // ------------------------------------------------------------------
    // Occurrence queries
    // ------------------------------------------------------------------

    /// Non-definition occurrences only.
    pub fn find_references(&self, id: &str) -> Vec<Occurrence> {
        self.tables
            .read()
            .occurrences
            .get(id)
            .map(|occs| {
                occs.iter()
                    .filter(|o| !o.is_definition())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First definition occurrence, or None.
    pub fn find_definition(&self, id: &str) -> Option<Occurrence> {
        self.tables
            .read()
            .occurrences
            .get(id)
            .and_then(|occs| occs.iter().find(|o| o.is_definition()).cloned())
    }

    // ------------------------------------------------------------------
    // Hierarchy queries
    // ------------------------------------------------------------------

    /// Children by lexical descriptor truncation, mapped through the symbol
    /// table.
    pub fn members_of(&self, id: &str) -> Vec<SymbolInformation> {
        let tables = self.tables.read();
        tables
            .children
            .get(id)
            .map(|kids| {
                kids.iter()
                    .filter_map(|k| tables.symbols.get(k).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids referenced by `is_implementation` relationships on `id`.
    pub fn supertypes_of(&self, id: &str) -> Vec<String> {
        self.tables
            .read()
            .symbols
            .get(id)
            .map(|info| {
                info.relationships
                    .iter()
                    .filter(|r| r.is_implementation)
                    .map(|r| r.symbol.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reverse scan over all symbols for `is_implementation` edges onto
    /// `id`. Also matches by display name so subtype edges that point at an
    /// equally-named symbol from another package version still resolve.
    pub fn subtypes_of(&self, id: &str) -> Vec<String> {
        let target_name = symbol::name_of(id);
        let tables = self.tables.read();
        let mut out: Vec<String> = tables
            .symbols
            .values()
            .filter(|s| {
                s.relationships.iter().any(|r| {
                    r.is_implementation
                        && (r.symbol == id
                            || (!target_name.is_empty() && symbol::name_of(&r.symbol) == target_name))
                })
            })
            .map(|s| s.symbol.clone())
            .collect();
        out.sort();
        out
    }

    // ------------------------------------------------------------------
    // Call graph
    // ------------------------------------------------------------------

    pub fn get_calls(&self, id: &str) -> Vec<String> {
        let tables = self.tables.read();
        let mut out: Vec<String> = tables
            .calls
            .get(id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    pub fn get_callers(&self, id: &str) -> Vec<String> {
        let tables = self.tables.read();
        let mut out: Vec<String> = tables
            .callers
            .get(id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    // ------------------------------------------------------------------
    // Documents and stats
    // ------------------------------------------------------------------

    pub fn contains_document(&self, path: &str) -> bool {
        self.tables.read().documents.contains_key(path)
    }

    /// Sorted relative paths of all documents.
    pub fn documents(&self) -> Vec<String> {
        let mut out: Vec<String> = self.tables.read().documents.keys().cloned().collect();
        out.sort();
        out
    }

    pub fn document_language(&self, path: &str) -> Option<String> {
        self.tables
            .read()
            .documents
            .get(path)
            .map(|d| d.language.clone())
    }

    /// Symbols defined in one document, in document order.
    pub fn symbols_in_file(&self, path: &str) -> Vec<SymbolInformation> {
        let tables = self.tables.read();
        tables
            .documents
            .get(path)
            .map(|doc| {
                doc.symbols
                    .iter()
                    .filter(|s| !s.is_external())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn external_symbols(&self) -> Vec<SymbolInformation> {
        let tables = self.tables.read();
        let mut out: Vec<SymbolInformation> = tables
            .symbols
            .values()
            .filter(|s| s.is_external())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    pub fn stats(&self) -> IndexStats {
        let tables = self.tables.read();
        IndexStats {
            documents: tables.documents.len(),
            symbols: tables.symbols.values().filter(|s| !s.is_external()).count(),
            external_symbols: tables.symbols.values().filter(|s| s.is_external()).count(),
            occurrences: tables.occurrences.values().map(Vec::len).sum(),
            call_edges: tables.calls.values().map(HashMap::len).sum(),
        }
    }

    // ------------------------------------------------------------------
    // Source access
    // ------------------------------------------------------------------

    /// Read the defining construct's source: lines from the definition's
    /// start through its enclosing end. Returns None when the symbol has no
    /// definition here or the file is not on disk.
    pub fn get_source(&self, id: &str) -> Option<String> {
        let def = self.find_definition(id)?;
        let end = def.enclosing_end_line.unwrap_or(def.start_line);
        let text = fs::read_to_string(self.source_root.join(&def.file)).ok()?;
        let lines: Vec<&str> = text.lines().collect();
        let start = def.start_line as usize;
        if start >= lines.len() {
            return None;
        }
        let end = (end as usize).min(lines.len().saturating_sub(1));
        Some(lines[start..=end].join("\n"))
    }

    /// Grep raw source under `source_root`, restricted to files the index
    /// knows about. Matches carry the innermost enclosing symbol name.
    pub fn grep(&self, pattern: &Regex, opts: &GrepOptions) -> Vec<GrepMatch> {
        // Snapshot the file list and definition spans, then do I/O without
        // holding the lock.
        let snapshot: Vec<(String, grep::FileSpans)> = {
            let tables = self.tables.read();
            let mut files: Vec<&String> = tables.documents.keys().collect();
            files.sort();
            files
                .into_iter()
                .filter(|path| grep::file_selected(path, opts))
                .map(|path| {
                    let doc = &tables.documents[path];
                    let mut spans: grep::FileSpans = doc
                        .occurrences
                        .iter()
                        .filter(|o| o.is_definition())
                        .filter_map(|o| {
                            let end = o.enclosing_end_line?;
                            let name = tables
                                .symbols
                                .get(&o.symbol)
                                .map(|s| s.name())
                                .unwrap_or_else(|| symbol::name_of(&o.symbol));
                            Some((name, o.start_line, end))
                        })
                        .collect();
                    spans.sort_by_key(|(_, start, _)| *start);
                    (path.clone(), spans)
                })
                .collect()
        };

        let mut matches = Vec::new();
        for (path, spans) in &snapshot {
            matches.extend(grep::grep_file(&self.source_root, path, spans, pattern, opts));
        }
        matches
    }
}

// ----------------------------------------------------------------------
// Table maintenance
// ----------------------------------------------------------------------

fn remove_contributions(tables: &mut Tables, path: &str) {
    let Some(old) = tables.documents.remove(path) else {
        return;
    };

    // Symbols defined by this document leave the symbol table and the
    // hierarchy.
    let mut removed_symbols: Vec<String> = Vec::new();
    for sym in old.symbols.iter().filter(|s| !s.is_external()) {
        if tables
            .symbols
            .get(&sym.symbol)
            .is_some_and(|s| s.defining_file.as_deref() == Some(path))
        {
            tables.symbols.remove(&sym.symbol);
            removed_symbols.push(sym.symbol.clone());
        }
    }
    for id in &removed_symbols {
        if let Some(parent) = symbol::parent_of(id) {
            if let Some(kids) = tables.children.get_mut(&parent) {
                kids.retain(|k| k != id);
                if kids.is_empty() {
                    tables.children.remove(&parent);
                }
            }
        }
        tables.children.remove(id);
    }

    // Purge this file's occurrences from every symbol it touched,
    // including symbols defined elsewhere that were referenced here.
    let touched: HashSet<&str> = old.occurrences.iter().map(|o| o.symbol.as_str()).collect();
    for id in &touched {
        if let Some(occs) = tables.occurrences.get_mut(*id) {
            occs.retain(|o| o.file != path);
            if occs.is_empty() {
                tables.occurrences.remove(*id);
            }
        }
    }

    // External symbols with no remaining occurrences anywhere are dropped.
    for id in &touched {
        let orphaned = tables.symbols.get(*id).is_some_and(|s| s.is_external())
            && !tables.occurrences.contains_key(*id);
        if orphaned {
            tables.symbols.remove(*id);
        }
    }

    // This document's call edges.
    if let Some(edges) = tables.edges_by_file.remove(path) {
        for (caller, callee) in edges {
            decrement_edge(&mut tables.calls, &caller, &callee);
            decrement_edge(&mut tables.callers, &callee, &caller);
        }
    }

    // Edges incident on symbols whose sole defining document just left.
    for id in &removed_symbols {
        if let Some(callees) = tables.calls.remove(id) {
            for callee in callees.keys() {
                if let Some(m) = tables.callers.get_mut(callee) {
                    m.remove(id);
                    if m.is_empty() {
                        tables.callers.remove(callee);
                    }
                }
            }
        }
        if let Some(callers) = tables.callers.remove(id) {
            for caller in callers.keys() {
                if let Some(m) = tables.calls.get_mut(caller) {
                    m.remove(id);
                    if m.is_empty() {
                        tables.calls.remove(caller);
                    }
                }
            }
        }
    }
}

fn insert_document(tables: &mut Tables, doc: Document, edges: Vec<(String, String)>) {
    let path = doc.relative_path.clone();

    for sym in &doc.symbols {
        if sym.is_external() {
            // Never displace a defined symbol with an external record.
            tables
                .symbols
                .entry(sym.symbol.clone())
                .or_insert_with(|| sym.clone());
            continue;
        }
        tables.symbols.insert(sym.symbol.clone(), sym.clone());
        if let Some(parent) = symbol::parent_of(&sym.symbol) {
            let kids = tables.children.entry(parent).or_default();
            if !kids.contains(&sym.symbol) {
                kids.push(sym.symbol.clone());
            }
        }
    }

    for occ in &doc.occurrences {
        tables
            .occurrences
            .entry(occ.symbol.clone())
            .or_default()
            .push(occ.clone());
    }

    for (caller, callee) in &edges {
        *tables
            .calls
            .entry(caller.clone())
            .or_default()
            .entry(callee.clone())
            .or_insert(0) += 1;
        *tables
            .callers
            .entry(callee.clone())
            .or_default()
            .entry(caller.clone())
            .or_insert(0) += 1;
    }
    if !edges.is_empty() {
        tables.edges_by_file.insert(path.clone(), edges);
    }

    tables.documents.insert(path, doc);
}

fn decrement_edge(map: &mut HashMap<String, HashMap<String, u32>>, from: &str, to: &str) {
    if let Some(inner) = map.get_mut(from) {
        if let Some(count) = inner.get_mut(to) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.remove(to);
            }
        }
        if inner.is_empty() {
            map.remove(from);
        }
    }
}
