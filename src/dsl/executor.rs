//! Query execution.
//!
//! Maps parsed commands onto registry lookups, assembles typed results,
//! and composes piped stages: each stage after the first runs once per
//! symbol the previous stage produced, and the fan-out results merge by
//! type-specific rules (reference lists concatenate, search results
//! deduplicate by id, call graphs union). An error or not-found result
//! short-circuits the pipeline.

use super::result::{
    CallDirection, DefinitionEntry, GrepMode, QueryResult, RefSite, ReferenceGroup, SymbolRef,
};
use super::{Action, Command, GrepFlags, PatternDialect, PIPE};
use crate::index::pattern::{self, FUZZY_DEFAULT_DISTANCE};
use crate::registry::{PackageRegistry, SearchScope};
use crate::symbol;
use crate::types::{GrepOptions, Occurrence, SymbolInformation, SymbolKind};
use regex::Regex;
use std::collections::HashSet;

/// Kinds a bare `def`/`refs` target resolves to before falling back to the
/// full candidate list.
const PRIMARY_KINDS: &[SymbolKind] = &[
    SymbolKind::Class,
    SymbolKind::Method,
    SymbolKind::Function,
    SymbolKind::Field,
    SymbolKind::Constructor,
    SymbolKind::Enum,
    SymbolKind::Mixin,
    SymbolKind::Extension,
    SymbolKind::Getter,
    SymbolKind::Setter,
    SymbolKind::Property,
];

/// Method-name family the storyboard scan looks for.
const NAVIGATION_METHODS: &[&str] = &[
    "push",
    "pushNamed",
    "pushReplacement",
    "pushReplacementNamed",
    "pushAndRemoveUntil",
    "popAndPushNamed",
    "pop",
    "popUntil",
];

fn kind_priority(kind: SymbolKind) -> usize {
    match kind {
        SymbolKind::Class => 0,
        SymbolKind::Function => 1,
        SymbolKind::Enum => 2,
        SymbolKind::Mixin => 3,
        SymbolKind::Extension => 4,
        SymbolKind::Method => 5,
        SymbolKind::Field => 6,
        SymbolKind::Constructor => 7,
        SymbolKind::Getter => 8,
        SymbolKind::Setter => 9,
        _ => 10,
    }
}

/// Optional callback that produces a signature for a symbol; the heuristic
/// source truncation is the fallback.
pub type SignatureProvider = Box<dyn Fn(&SymbolInformation) -> Option<String> + Send + Sync>;

pub struct QueryExecutor<'a> {
    registry: &'a PackageRegistry,
    signature_provider: Option<SignatureProvider>,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(registry: &'a PackageRegistry) -> Self {
        Self {
            registry,
            signature_provider: None,
        }
    }

    pub fn with_signature_provider(mut self, provider: SignatureProvider) -> Self {
        self.signature_provider = Some(provider);
        self
    }

    /// Execute a query string, composing stages split on `" | "`.
    pub fn execute(&self, input: &str) -> QueryResult {
        let stages: Vec<&str> = input.split(PIPE).collect();
        let mut result = self.run_stage(stages[0], None);

        for stage in &stages[1..] {
            if result.is_error() || result.is_not_found() {
                return result;
            }
            let mut names = result.extracted_symbols();
            dedup_in_place(&mut names);
            if names.is_empty() {
                return QueryResult::not_found(stage.trim());
            }

            let mut fanned = Vec::new();
            for name in &names {
                let sub = self.run_stage(stage, Some(name));
                if sub.is_error() || sub.is_not_found() {
                    return sub;
                }
                fanned.push(sub);
            }
            result = merge_results(fanned);
        }
        result
    }

    fn run_stage(&self, stage: &str, substitute_target: Option<&str>) -> QueryResult {
        // A fan-out stage gets the previous stage's symbol name appended as
        // a quoted token so it parses like any other target.
        let input = match substitute_target {
            Some(target) => format!("{} \"{}\"", stage.trim(), target),
            None => stage.trim().to_string(),
        };
        match super::parse(&input) {
            Ok(cmd) => self.execute_command(&cmd),
            Err(e) => QueryResult::Error {
                token: e.offending_token().to_string(),
                message: e.to_string(),
            },
        }
    }

    pub fn execute_command(&self, cmd: &Command) -> QueryResult {
        match cmd.action {
            Action::Def => self.def(cmd),
            Action::Refs => self.refs(cmd),
            Action::Sig => self.sig(cmd),
            Action::Source => self.source(cmd),
            Action::Members => self.members(cmd),
            Action::Impls | Action::Subtypes => self.hierarchy_side(cmd, false),
            Action::Supertypes => self.hierarchy_side(cmd, true),
            Action::Hierarchy => self.hierarchy(cmd),
            Action::Find => self.find(cmd),
            Action::Which => self.which(cmd),
            Action::Grep => self.grep(cmd),
            Action::Calls => self.call_graph(cmd, CallDirection::Calls),
            Action::Callers => self.call_graph(cmd, CallDirection::Callers),
            Action::Deps => self.deps(cmd),
            Action::Imports => self.imports(cmd),
            Action::Exports => self.exports(cmd),
            Action::Symbols => self.symbols_in(cmd),
            Action::Get => self.get(cmd),
            Action::Files => self.files(cmd),
            Action::Stats => QueryResult::Stats {
                stats: self.registry.stats(),
            },
            Action::Classify => self.classify(cmd),
            Action::Storyboard => self.storyboard(),
        }
    }

    // ------------------------------------------------------------------
    // Candidate resolution
    // ------------------------------------------------------------------

    fn resolve_candidates(&self, cmd: &Command) -> Vec<SymbolInformation> {
        let Some(target) = &cmd.target else {
            return Vec::new();
        };

        let mut candidates = match &cmd.dialect {
            PatternDialect::Literal => {
                let mut found = self.registry.find_by_name(target);
                if found.is_empty() {
                    if let Some((container, member)) = &cmd.qualified {
                        found = self.registry.find_qualified(container, member);
                    }
                }
                found
            }
            PatternDialect::Glob => match &cmd.qualified {
                Some((container, member)) => self.registry.find_qualified(container, member),
                None => self
                    .registry
                    .find_symbols(target, SearchScope::ProjectAndLoaded),
            },
            PatternDialect::Regex {
                body,
                case_insensitive,
            } => match pattern::compile_regex(body, *case_insensitive) {
                Ok(re) => self
                    .registry
                    .find_symbols_matching(&re, SearchScope::ProjectAndLoaded),
                Err(_) => Vec::new(),
            },
            PatternDialect::Fuzzy { body } => self.registry.find_symbols_fuzzy(
                body,
                FUZZY_DEFAULT_DISTANCE,
                SearchScope::ProjectAndLoaded,
            ),
        };

        if let Some(kind) = cmd.kind {
            candidates.retain(|c| c.kind == kind);
        }
        if let Some(prefix) = &cmd.path_prefix {
            candidates.retain(|c| {
                c.defining_file
                    .as_deref()
                    .is_some_and(|f| f.starts_with(prefix.as_str()))
            });
        }
        if let Some(lang) = &cmd.lang {
            candidates.retain(|c| {
                self.language_of(c)
                    .is_some_and(|l| l.eq_ignore_ascii_case(lang))
            });
        }
        collapse_externals(candidates)
    }

    fn language_of(&self, info: &SymbolInformation) -> Option<String> {
        let file = info.defining_file.as_deref()?;
        let owning = self.registry.find_owning_index(&info.symbol)?;
        owning.document_language(file)
    }

    /// Bare name the ranking compares against: the member part of a
    /// qualified target, the target otherwise.
    fn exact_name<'c>(&self, cmd: &'c Command) -> &'c str {
        match &cmd.qualified {
            Some((_, member)) => member,
            None => cmd.target.as_deref().unwrap_or_default(),
        }
    }

    fn primary_pool(&self, candidates: Vec<SymbolInformation>) -> Vec<SymbolInformation> {
        let primary: Vec<SymbolInformation> = candidates
            .iter()
            .filter(|c| PRIMARY_KINDS.contains(&c.kind))
            .cloned()
            .collect();
        if primary.is_empty() { candidates } else { primary }
    }

    fn symbol_ref(&self, info: &SymbolInformation) -> SymbolRef {
        let def = self.registry.find_definition(&info.symbol);
        let container = symbol::parent_of(&info.symbol).map(|parent| {
            self.registry
                .get_symbol(&parent)
                .map(|p| p.name())
                .unwrap_or_else(|| symbol::name_of(&parent))
        });
        SymbolRef {
            symbol: info.symbol.clone(),
            name: info.name(),
            kind: info.kind,
            file: info.defining_file.clone(),
            line: def.map(|d| d.start_line),
            container,
        }
    }

    fn ref_by_id(&self, id: &str) -> SymbolRef {
        match self.registry.get_symbol(id) {
            Some(info) => self.symbol_ref(&info),
            None => SymbolRef {
                symbol: id.to_string(),
                name: symbol::name_of(id),
                kind: SymbolKind::Unknown,
                file: None,
                line: None,
                container: None,
            },
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    fn def(&self, cmd: &Command) -> QueryResult {
        let candidates = self.resolve_candidates(cmd);
        if candidates.is_empty() {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        }
        let exact = self.exact_name(cmd).to_string();
        let mut pool = self.primary_pool(candidates);
        pool.sort_by_key(|c| (c.name() != exact, kind_priority(c.kind), c.symbol.clone()));

        let entries: Vec<DefinitionEntry> = pool
            .iter()
            .take(3)
            .map(|info| DefinitionEntry {
                symbol: self.symbol_ref(info),
                documentation: info.documentation.clone(),
                source: self.registry.get_source(&info.symbol),
            })
            .collect();
        QueryResult::Definition { entries }
    }

    fn refs(&self, cmd: &Command) -> QueryResult {
        let candidates = self.resolve_candidates(cmd);
        if candidates.is_empty() {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        }
        let pool = self.primary_pool(candidates);

        if pool.len() == 1 {
            let info = &pool[0];
            // The cross-index join by display name picks up occurrences in
            // dependency indexes whose ids differ from the workspace's.
            let occurrences = self
                .registry
                .find_all_references_by_name(&info.name(), Some(info.kind));
            return QueryResult::References {
                symbol: self.symbol_ref(info),
                references: occurrences.iter().map(site).collect(),
            };
        }

        let groups: Vec<ReferenceGroup> = pool
            .iter()
            .take(10)
            .map(|info| ReferenceGroup {
                symbol: self.symbol_ref(info),
                references: self
                    .registry
                    .find_all_references(&info.symbol)
                    .iter()
                    .map(site)
                    .collect(),
            })
            .collect();
        QueryResult::AggregatedReferences { groups }
    }

    fn members(&self, cmd: &Command) -> QueryResult {
        let candidates = self.resolve_candidates(cmd);
        let containers: Vec<&SymbolInformation> =
            candidates.iter().filter(|c| c.kind.is_container()).collect();
        if containers.is_empty() {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        }

        let chosen = containers
            .iter()
            .find(|c| !self.registry.members_of(&c.symbol).is_empty())
            .unwrap_or(&containers[0]);
        let members = self
            .registry
            .members_of(&chosen.symbol)
            .iter()
            .map(|m| self.symbol_ref(m))
            .collect();
        QueryResult::Members {
            container: self.symbol_ref(chosen),
            members,
        }
    }

    fn pick_type_candidate(&self, cmd: &Command) -> Option<SymbolInformation> {
        let candidates = self.resolve_candidates(cmd);
        candidates
            .iter()
            .find(|c| c.kind.is_container() || c.kind == SymbolKind::Interface)
            .cloned()
            .or_else(|| candidates.into_iter().next())
    }

    fn hierarchy(&self, cmd: &Command) -> QueryResult {
        let Some(info) = self.pick_type_candidate(cmd) else {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        };
        QueryResult::Hierarchy {
            symbol: self.symbol_ref(&info),
            supertypes: self.names_of(self.registry.supertypes_of(&info.symbol)),
            subtypes: self.names_of(self.registry.subtypes_of(&info.symbol)),
        }
    }

    fn hierarchy_side(&self, cmd: &Command, supertypes: bool) -> QueryResult {
        let Some(info) = self.pick_type_candidate(cmd) else {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        };
        let (supers, subs) = if supertypes {
            (self.names_of(self.registry.supertypes_of(&info.symbol)), Vec::new())
        } else {
            (Vec::new(), self.names_of(self.registry.subtypes_of(&info.symbol)))
        };
        QueryResult::Hierarchy {
            symbol: self.symbol_ref(&info),
            supertypes: supers,
            subtypes: subs,
        }
    }

    fn names_of(&self, ids: Vec<String>) -> Vec<String> {
        ids.iter()
            .map(|id| {
                self.registry
                    .get_symbol(id)
                    .map(|i| i.name())
                    .unwrap_or_else(|| symbol::name_of(id))
            })
            .collect()
    }

    fn source(&self, cmd: &Command) -> QueryResult {
        let candidates = self.resolve_candidates(cmd);
        for info in self.primary_pool(candidates) {
            if let Some(text) = self.registry.get_source(&info.symbol) {
                return QueryResult::Source {
                    symbol: self.symbol_ref(&info),
                    text,
                };
            }
        }
        QueryResult::not_found(cmd.target.as_deref().unwrap_or_default())
    }

    fn sig(&self, cmd: &Command) -> QueryResult {
        let candidates = self.resolve_candidates(cmd);
        if candidates.is_empty() {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        }
        let exact = self.exact_name(cmd).to_string();
        let mut pool = self.primary_pool(candidates);
        pool.sort_by_key(|c| (c.name() != exact, kind_priority(c.kind), c.symbol.clone()));
        let info = &pool[0];

        if let Some(provider) = &self.signature_provider {
            if let Some(signature) = provider(info) {
                return QueryResult::Signature {
                    symbol: self.symbol_ref(info),
                    signature,
                };
            }
        }

        let Some(source) = self.registry.get_source(&info.symbol) else {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        };
        QueryResult::Signature {
            symbol: self.symbol_ref(info),
            signature: derive_signature(&source, info.kind),
        }
    }

    fn find(&self, cmd: &Command) -> QueryResult {
        let candidates = self.resolve_candidates(cmd);
        QueryResult::Search {
            pattern: cmd.target.clone().unwrap_or_default(),
            symbols: candidates.iter().map(|c| self.symbol_ref(c)).collect(),
        }
    }

    fn which(&self, cmd: &Command) -> QueryResult {
        let candidates = self.resolve_candidates(cmd);
        if candidates.is_empty() {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        }
        let mut refs: Vec<SymbolRef> = candidates.iter().map(|c| self.symbol_ref(c)).collect();
        refs.sort_by(|a, b| {
            kind_priority(a.kind)
                .cmp(&kind_priority(b.kind))
                .then_with(|| a.container.cmp(&b.container))
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        QueryResult::Which { candidates: refs }
    }

    fn grep(&self, cmd: &Command) -> QueryResult {
        let target = cmd.target.clone().unwrap_or_default();
        let flags = &cmd.grep;

        let re = match build_grep_regex(&target, &cmd.dialect, flags) {
            Ok(re) => re,
            Err(e) => {
                return QueryResult::Error {
                    token: target,
                    message: format!("invalid pattern: {e}"),
                };
            }
        };

        let opts = GrepOptions {
            path_filter: cmd.path_prefix.clone(),
            include_glob: flags.include.clone(),
            exclude_glob: flags.exclude.clone(),
            before: flags.before,
            after: flags.after,
            invert: flags.invert,
            max_per_file: flags.max_per_file,
            multiline: flags.multiline,
            only_matching: flags.only_matching,
        };
        let matches = self.registry.grep(&re, &opts, flags.widen_external);

        if flags.list_files || flags.list_files_without {
            let matched: HashSet<String> = matches.iter().map(|m| m.file.clone()).collect();
            let files = if flags.list_files {
                let mut files: Vec<String> = matched.into_iter().collect();
                files.sort();
                files
            } else {
                let mut files: Vec<String> = self
                    .registry
                    .documents_in_scope(flags.widen_external)
                    .into_iter()
                    .map(|(_, doc)| doc)
                    .filter(|doc| !matched.contains(doc))
                    .collect();
                files.sort();
                files.dedup();
                files
            };
            return QueryResult::Grep {
                pattern: target,
                mode: if flags.list_files {
                    GrepMode::FilesWith
                } else {
                    GrepMode::FilesWithout
                },
                matches: Vec::new(),
                files,
                counts: Vec::new(),
            };
        }

        if flags.count {
            let mut counts: Vec<(String, usize)> = Vec::new();
            for m in &matches {
                match counts.iter().position(|(f, _)| f == &m.file) {
                    Some(i) => counts[i].1 += 1,
                    None => counts.push((m.file.clone(), 1)),
                }
            }
            counts.sort();
            return QueryResult::Grep {
                pattern: target,
                mode: GrepMode::Count,
                matches: Vec::new(),
                files: Vec::new(),
                counts,
            };
        }

        QueryResult::Grep {
            pattern: target,
            mode: GrepMode::Matches,
            matches,
            files: Vec::new(),
            counts: Vec::new(),
        }
    }

    fn call_graph(&self, cmd: &Command, direction: CallDirection) -> QueryResult {
        let candidates = self.resolve_candidates(cmd);
        if candidates.is_empty() {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        }
        // Prefer the candidate that actually has edges in the asked
        // direction.
        let pool = self.primary_pool(candidates);
        let edges_for = |id: &str| -> Vec<String> {
            match direction {
                CallDirection::Calls => self.registry.get_calls(id),
                CallDirection::Callers => self.registry.get_callers(id),
            }
        };
        let info = pool
            .iter()
            .find(|c| !edges_for(&c.symbol).is_empty())
            .unwrap_or(&pool[0]);

        let related = edges_for(&info.symbol)
            .iter()
            .map(|id| self.ref_by_id(id))
            .collect();
        QueryResult::CallGraph {
            symbol: self.symbol_ref(info),
            direction,
            related,
        }
    }

    fn deps(&self, cmd: &Command) -> QueryResult {
        let candidates = self.resolve_candidates(cmd);
        if candidates.is_empty() {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        }
        let pool = self.primary_pool(candidates);
        let info = &pool[0];

        let mut internal: HashSet<String> = HashSet::new();
        internal.insert(info.symbol.clone());

        let mut callee_ids: Vec<String> = self.registry.get_calls(&info.symbol);
        if info.kind.is_container() {
            for member in self.registry.members_of(&info.symbol) {
                internal.insert(member.symbol.clone());
                callee_ids.extend(self.registry.get_calls(&member.symbol));
            }
        }

        dedup_in_place(&mut callee_ids);
        callee_ids.retain(|id| !internal.contains(id));

        QueryResult::Dependencies {
            symbol: self.symbol_ref(info),
            depends_on: callee_ids.iter().map(|id| self.ref_by_id(id)).collect(),
        }
    }

    fn imports(&self, cmd: &Command) -> QueryResult {
        let target = cmd.target.clone().unwrap_or_default();
        let Some(text) = self.read_workspace_file(&target) else {
            return QueryResult::NotFound {
                target: target.clone(),
                message: format!("no file '{target}'"),
            };
        };
        let literals = extract_directives(&text, &["import", "export"]);
        let resolved = self.resolve_import_literals(&target, &literals);
        QueryResult::Imports {
            file: target,
            imports: literals,
            resolved,
        }
    }

    fn exports(&self, cmd: &Command) -> QueryResult {
        let target = cmd.target.clone().unwrap_or_default();

        if let Some(text) = self.read_workspace_file(&target) {
            let literals = extract_directives(&text, &["export"]);
            let resolved = self.resolve_import_literals(&target, &literals);
            return QueryResult::Imports {
                file: target,
                imports: literals,
                resolved,
            };
        }

        // Directory form: every public top-level symbol defined under it.
        let prefix = target.trim_end_matches('/');
        let mut symbols = Vec::new();
        for (ix, doc) in self.registry.documents_in_scope(false) {
            if !doc.starts_with(prefix) {
                continue;
            }
            for info in ix.symbols_in_file(&doc) {
                if symbol::parent_of(&info.symbol).is_none() && !info.name().starts_with('_') {
                    symbols.push(self.symbol_ref(&info));
                }
            }
        }
        if symbols.is_empty() {
            return QueryResult::not_found(&target);
        }
        symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        QueryResult::Search {
            pattern: target,
            symbols,
        }
    }

    fn symbols_in(&self, cmd: &Command) -> QueryResult {
        let target = cmd.target.clone().unwrap_or_default();
        let Some((ix, doc)) = self.registry.find_document(&target) else {
            return QueryResult::NotFound {
                target: target.clone(),
                message: format!("no indexed document '{target}'"),
            };
        };
        let symbols = ix
            .symbols_in_file(&doc)
            .iter()
            .map(|info| self.symbol_ref(info))
            .collect();
        QueryResult::Search {
            pattern: doc,
            symbols,
        }
    }

    fn get(&self, cmd: &Command) -> QueryResult {
        let target = cmd.target.clone().unwrap_or_default();
        if let Some(info) = self.registry.get_symbol(&target) {
            return QueryResult::Which {
                candidates: vec![self.symbol_ref(&info)],
            };
        }
        self.which(cmd)
    }

    fn files(&self, cmd: &Command) -> QueryResult {
        let mut files = self.registry.documents();
        if let Some(pattern) = &cmd.target {
            if let Ok(re) = pattern::compile_glob(&format!("*{pattern}*")) {
                files.retain(|f| re.is_match(f));
            }
        }
        QueryResult::Files { files }
    }

    fn classify(&self, cmd: &Command) -> QueryResult {
        let candidates = self.resolve_candidates(cmd);
        if candidates.is_empty() {
            return QueryResult::not_found(cmd.target.as_deref().unwrap_or_default());
        }
        let mut groups: Vec<(String, Vec<SymbolRef>)> = Vec::new();
        for info in &candidates {
            let kind = info.kind.as_str().to_string();
            let i = match groups.iter().position(|(k, _)| *k == kind) {
                Some(i) => i,
                None => {
                    groups.push((kind, Vec::new()));
                    groups.len() - 1
                }
            };
            groups[i].1.push(self.symbol_ref(info));
        }
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        QueryResult::Classify {
            pattern: cmd.target.clone().unwrap_or_default(),
            groups,
        }
    }

    /// Navigation transitions recovered from the call graph: callers of the
    /// navigation-method name family, reported as container -> action.
    fn storyboard(&self) -> QueryResult {
        let mut transitions = Vec::new();
        let mut seen = HashSet::new();
        for nav in NAVIGATION_METHODS {
            for info in self.registry.find_by_name(nav) {
                for caller in self.registry.get_callers(&info.symbol) {
                    let from = symbol::parent_of(&caller)
                        .map(|p| symbol::name_of(&p))
                        .unwrap_or_else(|| symbol::name_of(&caller));
                    if seen.insert((from.clone(), nav.to_string())) {
                        transitions.push((from, nav.to_string()));
                    }
                }
            }
        }
        transitions.sort();
        QueryResult::Storyboard { transitions }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn read_workspace_file(&self, relative: &str) -> Option<String> {
        let direct = self.registry.root().join(relative);
        if direct.is_file() {
            return std::fs::read_to_string(direct).ok();
        }
        for pkg in self.registry.local_packages() {
            let candidate = pkg.path.join(relative);
            if candidate.is_file() {
                return std::fs::read_to_string(candidate).ok();
            }
        }
        None
    }

    fn resolve_import_literals(&self, importing_file: &str, literals: &[String]) -> Vec<SymbolRef> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for literal in literals {
            let candidate = if let Some(rest) = literal.strip_prefix("package:") {
                // package:http/http.dart -> lib/http.dart in package http.
                rest.split_once('/').map(|(_, path)| format!("lib/{path}"))
            } else if literal.contains(':') {
                // dart:core and friends resolve only through an SDK index.
                Some(literal.clone())
            } else {
                Some(resolve_relative(importing_file, literal))
            };
            let Some(candidate) = candidate else { continue };
            let Some((ix, doc)) = self.registry.find_document(&candidate) else {
                continue;
            };
            for info in ix.symbols_in_file(&doc) {
                if seen.insert(info.symbol.clone()) {
                    out.push(self.symbol_ref(&info));
                }
            }
        }
        out
    }
}

/// An external record (imported-but-not-defined) and a defined symbol with
/// the same display name and kind are the same conceptual symbol across
/// index boundaries; keep the defined one so candidate counting does not
/// treat the pair as ambiguity.
fn collapse_externals(candidates: Vec<SymbolInformation>) -> Vec<SymbolInformation> {
    let defined: HashSet<(String, SymbolKind)> = candidates
        .iter()
        .filter(|c| !c.is_external())
        .map(|c| (c.name(), c.kind))
        .collect();
    candidates
        .into_iter()
        .filter(|c| !c.is_external() || !defined.contains(&(c.name(), c.kind)))
        .collect()
}

fn site(occ: &Occurrence) -> RefSite {
    RefSite {
        file: occ.file.clone(),
        line: occ.start_line,
        col: occ.start_col,
    }
}

fn dedup_in_place(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

/// Merge fan-out results by type-specific rules.
fn merge_results(mut results: Vec<QueryResult>) -> QueryResult {
    if results.len() == 1 {
        return results.pop().unwrap();
    }

    let all_search = results.iter().all(|r| matches!(r, QueryResult::Search { .. }));
    if all_search {
        let mut seen = HashSet::new();
        let mut symbols = Vec::new();
        let mut patterns = Vec::new();
        for result in results {
            if let QueryResult::Search {
                pattern,
                symbols: syms,
            } = result
            {
                patterns.push(pattern);
                for sym in syms {
                    if seen.insert(sym.symbol.clone()) {
                        symbols.push(sym);
                    }
                }
            }
        }
        return QueryResult::Search {
            pattern: patterns.join(", "),
            symbols,
        };
    }

    let all_refs = results.iter().all(|r| {
        matches!(
            r,
            QueryResult::References { .. } | QueryResult::AggregatedReferences { .. }
        )
    });
    if all_refs {
        let mut groups = Vec::new();
        for result in results {
            match result {
                QueryResult::References { symbol, references } => {
                    groups.push(ReferenceGroup { symbol, references });
                }
                QueryResult::AggregatedReferences { groups: more } => groups.extend(more),
                _ => unreachable!(),
            }
        }
        return QueryResult::AggregatedReferences { groups };
    }

    let all_calls = results
        .iter()
        .all(|r| matches!(r, QueryResult::CallGraph { .. }));
    if all_calls {
        let mut seen = HashSet::new();
        let mut related = Vec::new();
        let mut first: Option<(SymbolRef, CallDirection)> = None;
        for result in results {
            if let QueryResult::CallGraph {
                symbol,
                direction,
                related: more,
            } = result
            {
                if first.is_none() {
                    first = Some((symbol, direction));
                }
                for sym in more {
                    if seen.insert(sym.symbol.clone()) {
                        related.push(sym);
                    }
                }
            }
        }
        let (symbol, direction) = first.unwrap();
        return QueryResult::CallGraph {
            symbol,
            direction,
            related,
        };
    }

    QueryResult::Pipeline { results }
}

/// Assemble the grep regex: `-F` escapes, `-w` adds word anchors, and a
/// `/…/i` target carries its own case flag.
fn build_grep_regex(
    target: &str,
    dialect: &PatternDialect,
    flags: &GrepFlags,
) -> Result<Regex, regex::Error> {
    let (mut body, case_insensitive) = match dialect {
        PatternDialect::Regex {
            body,
            case_insensitive,
        } => (body.clone(), *case_insensitive),
        _ if flags.literal => (regex::escape(target), false),
        _ => (target.to_string(), false),
    };
    if flags.word {
        body = format!(r"\b(?:{body})\b");
    }
    if case_insensitive {
        body = format!("(?i){body}");
    }
    Regex::new(&body)
}

/// Pull `import`/`export` string literals out of a source file.
fn extract_directives(text: &str, keywords: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        for keyword in keywords {
            let Some(rest) = trimmed.strip_prefix(keyword) else {
                continue;
            };
            let rest = rest.trim_start();
            let Some(quote) = rest.chars().next().filter(|c| *c == '\'' || *c == '"') else {
                continue;
            };
            if let Some(end) = rest[1..].find(quote) {
                out.push(rest[1..1 + end].to_string());
            }
        }
    }
    out
}

/// Resolve a relative import against the importing file's directory.
fn resolve_relative(importing_file: &str, literal: &str) -> String {
    let mut parts: Vec<&str> = importing_file.split('/').collect();
    parts.pop(); // file name
    for segment in literal.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Heuristic signature: for callables, the header up to the first `{` or
/// `=>` after the parameter list's closing paren; for type declarations,
/// the first line with the body elided.
fn derive_signature(source: &str, kind: SymbolKind) -> String {
    let first_line = source.lines().next().unwrap_or_default();
    match kind {
        SymbolKind::Class | SymbolKind::Enum | SymbolKind::Mixin | SymbolKind::Extension => {
            let header = first_line.trim_end().trim_end_matches('{').trim_end();
            format!("{header} {{ ... }}")
        }
        SymbolKind::Method
        | SymbolKind::Function
        | SymbolKind::Constructor
        | SymbolKind::Getter
        | SymbolKind::Setter => {
            let cut = source
                .find(')')
                .map(|close| {
                    let tail = &source[close..];
                    let brace = tail.find('{').map(|p| close + p);
                    let arrow = tail.find("=>").map(|p| close + p);
                    match (brace, arrow) {
                        (Some(b), Some(a)) => b.min(a),
                        (Some(b), None) => b,
                        (None, Some(a)) => a,
                        (None, None) => source.len(),
                    }
                })
                .unwrap_or_else(|| source.find('{').unwrap_or(source.len()));
            source[..cut].trim().replace('\n', " ")
        }
        _ => first_line.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_truncation() {
        assert_eq!(
            derive_signature("int login(String user) {\n  return 1;\n}", SymbolKind::Method),
            "int login(String user)"
        );
        assert_eq!(
            derive_signature("int twice(int x) => x * 2;", SymbolKind::Method),
            "int twice(int x)"
        );
        assert_eq!(
            derive_signature("class AuthService extends Base {\n  ...\n}", SymbolKind::Class),
            "class AuthService extends Base { ... }"
        );
    }

    #[test]
    fn directive_extraction() {
        let text = "import 'package:http/http.dart';\nimport \"dart:async\";\nexport 'src/api.dart';\nclass X {}\n";
        assert_eq!(
            extract_directives(text, &["import", "export"]),
            vec!["package:http/http.dart", "dart:async", "src/api.dart"]
        );
        assert_eq!(extract_directives(text, &["export"]), vec!["src/api.dart"]);
    }

    #[test]
    fn relative_import_resolution() {
        assert_eq!(resolve_relative("lib/src/a.dart", "b.dart"), "lib/src/b.dart");
        assert_eq!(resolve_relative("lib/src/a.dart", "../c.dart"), "lib/c.dart");
        assert_eq!(
            resolve_relative("lib/a.dart", "./sub/d.dart"),
            "lib/sub/d.dart"
        );
    }

    #[test]
    fn grep_regex_building() {
        let flags = GrepFlags {
            word: true,
            ..Default::default()
        };
        let re = build_grep_regex("TODO", &PatternDialect::Literal, &flags).unwrap();
        assert!(re.is_match("// TODO fix"));
        assert!(!re.is_match("// TODOS"));

        let flags = GrepFlags {
            literal: true,
            ..Default::default()
        };
        let re = build_grep_regex("a.b(", &PatternDialect::Literal, &flags).unwrap();
        assert!(re.is_match("call a.b("));
        assert!(!re.is_match("axb("));
    }
}
