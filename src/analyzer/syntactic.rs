//! Bundled reference analyzer for a plain Dart subset.
//!
//! This analyzer is syntactic: it line-scans source for class/mixin/enum/
//! extension declarations, their members, top-level functions and
//! variables, and resolves call references by identifier within the same
//! file. It mints scip-dart-shaped symbol ids from the package name and
//! version it was constructed with. Identifiers that cannot be resolved
//! locally and look like type names are emitted as external symbols, the
//! way a resolver-backed analyzer reports imported-but-not-defined
//! symbols.
//!
//! It exists so the engine runs end-to-end without an external analyzer
//! process; hosts with a real resolver plug in their own [`Analyzer`].

use super::{
    Analyzer, AnalyzerError, Declaration, ExternalSymbol, Reference, ResolvedUnit, SourceRange,
};
use crate::cache::hash_bytes;
use crate::types::SymbolKind;
use dashmap::DashMap;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:abstract\s+|base\s+|final\s+|sealed\s+|interface\s+)*(?:mixin\s+)?class\s+([A-Za-z_]\w*)").unwrap()
});
static MIXIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:base\s+)?mixin\s+([A-Za-z_]\w*)").unwrap());
static ENUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*enum\s+([A-Za-z_]\w*)").unwrap());
static EXTENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*extension\s+([A-Za-z_]\w*)\s+on\s+([A-Za-z_]\w*)").unwrap()
});
static EXTENDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bextends\s+([A-Za-z_]\w*)").unwrap());
static WITH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bwith\s+([A-Za-z_][\w,\s]*)").unwrap());
static IMPLEMENTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bimplements\s+([A-Za-z_][\w,\s]*)").unwrap());
static GETTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)(?:static\s+)?[\w<>,?\[\]]+\s+get\s+([A-Za-z_]\w*)").unwrap()
});
static SETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)set\s+([A-Za-z_]\w*)\s*\(").unwrap());
static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)(?:static\s+)?([A-Za-z_]\w*(?:<[^>{;]*>)?\??)\s+([A-Za-z_]\w*)\s*\(")
        .unwrap()
});
static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:static\s+)?(?:late\s+)?(?:final\s+|const\s+|var\s+)?(?:[A-Za-z_]\w*(?:<[^>{;]*>)?\??\s+)?([A-Za-z_]\w*)\s*(?:=[^;]*)?;\s*$").unwrap()
});
static ENUM_MEMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_]\w*)\s*(?:\([^)]*\))?\s*[,;]?\s*$").unwrap());
static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\(").unwrap());

/// Identifiers that look like calls but are language constructs or noise.
const NON_CALL_WORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "assert", "super", "this", "new",
    "throw", "await", "async", "sync", "do", "else", "case", "required", "covariant",
];

/// Reserved words that never open a declaration's type position.
const NON_TYPE_WORDS: &[&str] = &[
    "return", "if", "while", "for", "await", "throw", "new", "else", "case", "yield",
    "assert", "switch", "catch", "do", "in", "is", "as", "get", "set",
];

pub struct SyntacticAnalyzer {
    project_root: PathBuf,
    package: String,
    version: String,
    units: DashMap<PathBuf, Arc<ResolvedUnit>>,
}

impl SyntacticAnalyzer {
    pub fn new(project_root: PathBuf, package: &str, version: &str) -> Self {
        Self {
            project_root,
            package: package.to_string(),
            version: version.to_string(),
            units: DashMap::new(),
        }
    }

    fn relative_posix(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.project_root).ok()?;
        Some(rel.to_string_lossy().replace('\\', "/"))
    }
}

impl Analyzer for SyntacticAnalyzer {
    fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn resolved_unit(&self, path: &Path) -> Result<Option<ResolvedUnit>, AnalyzerError> {
        if path.extension().and_then(|e| e.to_str()) != Some("dart") {
            return Ok(None);
        }
        if let Some(unit) = self.units.get(path) {
            return Ok(Some(unit.as_ref().clone()));
        }
        let Some(relative) = self.relative_posix(path) else {
            return Ok(None);
        };
        let bytes = std::fs::read(path)
            .map_err(|e| AnalyzerError::Resolution(format!("cannot read {}: {e}", path.display())))?;
        let source = String::from_utf8_lossy(&bytes);
        let unit = parse_unit(&source, &relative, &self.package, &self.version);
        let unit = Arc::new(ResolvedUnit {
            content_hash: hash_bytes(&bytes),
            ..unit
        });
        self.units.insert(path.to_path_buf(), unit.clone());
        Ok(Some(unit.as_ref().clone()))
    }

    fn notify_file_change(&self, path: &Path) {
        self.units.remove(path);
    }
}

// ----------------------------------------------------------------------
// Parsing
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum DeclShape {
    Container,
    Member,
}

#[derive(Debug)]
struct RawDecl {
    name: String,
    kind: SymbolKind,
    shape: DeclShape,
    /// Index into `decls` of the containing container.
    container: Option<usize>,
    supertype_names: Vec<String>,
    docs: Vec<String>,
    name_line: u32,
    name_col: u32,
    body_end: u32,
}

/// Parse one file into a resolved unit.
///
/// The scan is three passes: container declarations with their body spans,
/// member/top-level declarations outside any member body, then references
/// inside bodies resolved against the declared-name tables.
pub fn parse_unit(source: &str, relative_path: &str, package: &str, version: &str) -> ResolvedUnit {
    let (lines, docs_by_line) = strip_comments(source);
    let mut decls: Vec<RawDecl> = Vec::new();

    // Pass 1: containers.
    for (i, line) in lines.iter().enumerate() {
        let (kind, caps) = if let Some(c) = CLASS_RE.captures(line) {
            (SymbolKind::Class, c)
        } else if let Some(c) = ENUM_RE.captures(line) {
            (SymbolKind::Enum, c)
        } else if let Some(c) = EXTENSION_RE.captures(line) {
            (SymbolKind::Extension, c)
        } else if let Some(c) = MIXIN_RE.captures(line) {
            (SymbolKind::Mixin, c)
        } else {
            continue;
        };
        let name = caps.get(1).unwrap();

        let mut supertype_names = Vec::new();
        if kind == SymbolKind::Class {
            if let Some(sup) = EXTENDS_RE.captures(line) {
                supertype_names.push(sup[1].to_string());
            }
            for re in [&*WITH_RE, &*IMPLEMENTS_RE] {
                if let Some(sup) = re.captures(line) {
                    supertype_names.extend(
                        sup[1]
                            .split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty() && s.chars().next().is_some_and(char::is_uppercase)),
                    );
                }
            }
        }

        let body_end = find_body_end(&lines, i, name.end());
        decls.push(RawDecl {
            name: name.as_str().to_string(),
            kind,
            shape: DeclShape::Container,
            container: None,
            supertype_names,
            docs: docs_by_line.get(&i).cloned().unwrap_or_default(),
            name_line: i as u32,
            name_col: name.start() as u32,
            body_end,
        });
    }

    // Pass 2: members and top-level declarations. Lines inside a member's
    // body never declare; lines inside a container body declare members of
    // that container.
    let container_spans: Vec<(usize, u32, u32)> = decls
        .iter()
        .enumerate()
        .map(|(idx, d)| (idx, d.name_line, d.body_end))
        .collect();
    let innermost_container = |line: u32| -> Option<usize> {
        container_spans
            .iter()
            .filter(|(_, start, end)| *start <= line && line <= *end)
            .max_by_key(|(_, start, _)| *start)
            .map(|(idx, _, _)| *idx)
    };

    let mut member_decls: Vec<RawDecl> = Vec::new();
    // Lines inside the previous member's body never declare.
    let mut skip_until: Option<u32> = None;
    for (i, line) in lines.iter().enumerate() {
        let line_no = i as u32;
        if let Some(until) = skip_until {
            if line_no <= until {
                continue;
            }
            skip_until = None;
        }

        let container_idx = innermost_container(line_no);
        let is_container_header = decls
            .iter()
            .any(|d| d.name_line == line_no && d.shape == DeclShape::Container);

        // A container header line may carry single-line members after the
        // opening brace (`class A { void m() {} }`); scan its remainder.
        let (search_from, container_for_line) = if is_container_header {
            let brace = line.find('{').map(|p| p + 1).unwrap_or(line.len());
            (brace, container_idx)
        } else if container_idx.is_some() || !line.trim().is_empty() {
            (0, container_idx)
        } else {
            continue;
        };

        let segment = &line[search_from.min(line.len())..];
        if segment.trim().is_empty() {
            continue;
        }

        // Enum value section: plain identifiers before the value list ends.
        if let Some(idx) = container_for_line {
            if decls[idx].kind == SymbolKind::Enum
                && !is_container_header
                && enum_value_section(&lines, &decls[idx], line_no)
            {
                if let Some(caps) = ENUM_MEMBER_RE.captures(line) {
                    let m = caps.get(1).unwrap();
                    member_decls.push(RawDecl {
                        name: m.as_str().to_string(),
                        kind: SymbolKind::EnumMember,
                        shape: DeclShape::Member,
                        container: Some(idx),
                        supertype_names: Vec::new(),
                        docs: docs_by_line.get(&i).cloned().unwrap_or_default(),
                        name_line: line_no,
                        name_col: m.start() as u32,
                        body_end: line_no,
                    });
                    continue;
                }
            }
        }

        let Some(found) = match_member(segment, container_for_line.map(|idx| decls[idx].name.as_str()))
        else {
            continue;
        };

        let name_col = (search_from + found.name_start) as u32;
        let body_end = find_body_end(&lines, i, search_from + found.name_end);
        let kind = match (found.kind, container_for_line) {
            (SymbolKind::Method, None) => SymbolKind::Function,
            (SymbolKind::Field, None) => SymbolKind::Variable,
            (k, _) => k,
        };
        member_decls.push(RawDecl {
            name: found.name,
            kind,
            shape: DeclShape::Member,
            container: container_for_line,
            supertype_names: Vec::new(),
            docs: docs_by_line.get(&i).cloned().unwrap_or_default(),
            name_line: line_no,
            name_col,
            body_end,
        });
        if body_end > line_no {
            skip_until = Some(body_end);
        }
    }
    decls.extend(member_decls);

    // Mint symbol ids.
    let prefix = format!("scip-dart pub {package} {version} {relative_path}/");
    let ids: Vec<String> = decls
        .iter()
        .map(|d| {
            let descriptor = match d.kind {
                SymbolKind::Class | SymbolKind::Mixin | SymbolKind::Enum | SymbolKind::Extension => {
                    format!("{}#", d.name)
                }
                SymbolKind::Method
                | SymbolKind::Function
                | SymbolKind::Constructor
                | SymbolKind::Setter => format!("{}().", d.name),
                _ => format!("{}.", d.name),
            };
            match d.container {
                Some(c) => format!("{prefix}{}#{descriptor}", decls[c].name),
                None => format!("{prefix}{descriptor}"),
            }
        })
        .collect();

    build_unit(source, relative_path, &lines, decls, ids, innermost_container)
}

struct MemberMatch {
    name: String,
    kind: SymbolKind,
    name_start: usize,
    name_end: usize,
}

fn match_member(segment: &str, container_name: Option<&str>) -> Option<MemberMatch> {
    if let Some(caps) = GETTER_RE.captures(segment) {
        let m = caps.get(1).unwrap();
        return Some(MemberMatch {
            name: m.as_str().to_string(),
            kind: SymbolKind::Getter,
            name_start: m.start(),
            name_end: m.end(),
        });
    }
    if let Some(caps) = SETTER_RE.captures(segment) {
        let m = caps.get(1).unwrap();
        return Some(MemberMatch {
            name: m.as_str().to_string(),
            kind: SymbolKind::Setter,
            name_start: m.start(),
            name_end: m.end(),
        });
    }
    if let Some(caps) = METHOD_RE.captures(segment) {
        let type_token = caps.get(1).unwrap().as_str();
        let base_type = type_token.trim_end_matches('?');
        let m = caps.get(2).unwrap();
        if !NON_TYPE_WORDS.contains(&base_type) {
            // `Svc(...)` and `Svc.named(...)` inside Svc are constructors.
            let kind = if container_name == Some(m.as_str()) || container_name == Some(base_type) {
                SymbolKind::Constructor
            } else {
                SymbolKind::Method
            };
            return Some(MemberMatch {
                name: m.as_str().to_string(),
                kind,
                name_start: m.start(),
                name_end: m.end(),
            });
        }
    }
    // Constructor without preceding type: `Svc(this.x);` or `factory Svc(...)`.
    if let Some(container) = container_name {
        let ctor_re = Regex::new(&format!(
            r"(?:^|\s)(?:const\s+)?(?:factory\s+)?({container})(?:\.([A-Za-z_]\w*))?\s*\("
        ))
        .ok()?;
        if let Some(caps) = ctor_re.captures(segment) {
            let m = caps.get(2).or_else(|| caps.get(1)).unwrap();
            return Some(MemberMatch {
                name: m.as_str().to_string(),
                kind: SymbolKind::Constructor,
                name_start: m.start(),
                name_end: m.end(),
            });
        }
    }
    if let Some(caps) = FIELD_RE.captures(segment) {
        let m = caps.get(1).unwrap();
        if !NON_TYPE_WORDS.contains(&m.as_str()) && m.as_str() != "break" && m.as_str() != "continue"
        {
            return Some(MemberMatch {
                name: m.as_str().to_string(),
                kind: SymbolKind::Field,
                name_start: m.start(),
                name_end: m.end(),
            });
        }
    }
    None
}

/// Whether `line` still sits in the enum's value list (before the `;` that
/// opens the member section, if any).
fn enum_value_section(lines: &[String], enum_decl: &RawDecl, line: u32) -> bool {
    for i in (enum_decl.name_line as usize)..(line as usize) {
        if lines[i].contains(';') {
            return false;
        }
    }
    true
}

fn build_unit(
    source: &str,
    relative_path: &str,
    lines: &[String],
    decls: Vec<RawDecl>,
    ids: Vec<String>,
    innermost_container: impl Fn(u32) -> Option<usize>,
) -> ResolvedUnit {
    let mut declarations = Vec::with_capacity(decls.len());
    let mut references = Vec::new();
    let mut external_symbols: Vec<ExternalSymbol> = Vec::new();
    let mut seen_external = std::collections::HashSet::new();

    let external_id =
        |name: &str| -> String { format!("scip-dart pub unresolved 0.0.0 _/{name}#") };

    // Name tables for reference resolution.
    let find_decl = |name: &str, container: Option<usize>| -> Option<usize> {
        // Own container's member first, then top level, then any container.
        if let Some(c) = container {
            if let Some(i) = decls
                .iter()
                .position(|d| d.container == Some(c) && d.name == name)
            {
                return Some(i);
            }
        }
        if let Some(i) = decls
            .iter()
            .position(|d| d.container.is_none() && d.name == name)
        {
            return Some(i);
        }
        decls.iter().position(|d| d.name == name)
    };

    for (idx, decl) in decls.iter().enumerate() {
        // Supertype clauses: relationships plus a reference occurrence per
        // clause name.
        let mut supertype_ids = Vec::new();
        for sup_name in &decl.supertype_names {
            let target = match find_decl(sup_name, None) {
                Some(i) if decls[i].shape == DeclShape::Container => ids[i].clone(),
                _ => {
                    let id = external_id(sup_name);
                    if seen_external.insert(id.clone()) {
                        external_symbols.push(ExternalSymbol {
                            symbol: id.clone(),
                            kind: SymbolKind::Class,
                            display_name: sup_name.clone(),
                        });
                    }
                    id
                }
            };
            let line = &lines[decl.name_line as usize];
            if let Some(col) = find_word(line, sup_name, decl.name_col as usize) {
                references.push(Reference {
                    symbol: target.clone(),
                    range: SourceRange {
                        start_line: decl.name_line,
                        start_col: col as u32,
                        end_line: decl.name_line,
                        end_col: (col + sup_name.len()) as u32,
                    },
                });
            }
            supertype_ids.push(target);
        }

        declarations.push(Declaration {
            symbol: ids[idx].clone(),
            kind: decl.kind,
            display_name: decl.name.clone(),
            documentation: decl.docs.clone(),
            supertypes: supertype_ids,
            range: SourceRange {
                start_line: decl.name_line,
                start_col: decl.name_col,
                end_line: decl.name_line,
                end_col: decl.name_col + decl.name.len() as u32,
            },
            body_end_line: decl.body_end,
        });
    }

    // Pass 3: call references inside bodies.
    let decl_name_positions: std::collections::HashSet<(u32, u32)> = decls
        .iter()
        .map(|d| (d.name_line, d.name_col))
        .collect();

    for (i, line) in lines.iter().enumerate() {
        let line_no = i as u32;
        for caps in CALL_RE.captures_iter(line) {
            let m = caps.get(1).unwrap();
            let name = m.as_str();
            if decl_name_positions.contains(&(line_no, m.start() as u32)) {
                continue;
            }
            if NON_CALL_WORDS.contains(&name) {
                continue;
            }
            let container = innermost_container(line_no);
            let target = match find_decl(name, container) {
                Some(target_idx) => {
                    // A bare container-name call is a constructor call; point
                    // it at the type when no constructor was declared.
                    ids[target_idx].clone()
                }
                None => {
                    if !name.chars().next().is_some_and(char::is_uppercase) {
                        continue;
                    }
                    let id = external_id(name);
                    if seen_external.insert(id.clone()) {
                        external_symbols.push(ExternalSymbol {
                            symbol: id.clone(),
                            kind: SymbolKind::Class,
                            display_name: name.to_string(),
                        });
                    }
                    id
                }
            };
            references.push(Reference {
                symbol: target,
                range: SourceRange {
                    start_line: line_no,
                    start_col: m.start() as u32,
                    end_line: line_no,
                    end_col: m.end() as u32,
                },
            });
        }
    }

    ResolvedUnit {
        relative_path: relative_path.to_string(),
        language: "dart".to_string(),
        content_hash: hash_bytes(source.as_bytes()),
        declarations,
        references,
        external_symbols,
    }
}

fn find_word(line: &str, word: &str, from: usize) -> Option<usize> {
    let mut search = from.min(line.len());
    while let Some(pos) = line[search..].find(word) {
        let abs = search + pos;
        let before_ok = abs == 0
            || !line[..abs]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let after = abs + word.len();
        let after_ok = after >= line.len()
            || !line[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if before_ok && after_ok {
            return Some(abs);
        }
        search = abs + word.len();
    }
    None
}

/// Find the last line of the construct whose header starts at
/// `(start_line, start_col)`: the matching close of its first `{`, the line
/// of the `;` ending an `=>` body, or the `;` of a bodiless declaration.
fn find_body_end(lines: &[String], start_line: usize, start_col: usize) -> u32 {
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut prev: char = '\0';

    for (i, line) in lines.iter().enumerate().skip(start_line) {
        let text: &str = if i == start_line {
            &line[start_col.min(line.len())..]
        } else {
            line
        };
        for c in text.chars() {
            if let Some(q) = in_string {
                if c == q && prev != '\\' {
                    in_string = None;
                }
                prev = c;
                continue;
            }
            match c {
                '\'' | '"' => in_string = Some(c),
                '{' => depth += 1,
                '}' => {
                    if depth > 0 {
                        depth -= 1;
                        if depth == 0 {
                            return i as u32;
                        }
                    }
                }
                // A `;` at depth zero ends an `=>` body or a bodiless
                // declaration either way.
                ';' if depth == 0 => return i as u32,
                _ => {}
            }
            prev = c;
        }
        prev = '\0';
    }
    lines.len().saturating_sub(1) as u32
}

/// Blank out comments while preserving columns; collect `///` doc blocks
/// keyed by the line of the declaration they precede.
fn strip_comments(
    source: &str,
) -> (Vec<String>, std::collections::HashMap<usize, Vec<String>>) {
    let raw: Vec<&str> = source.lines().collect();
    let mut lines = Vec::with_capacity(raw.len());
    let mut docs: std::collections::HashMap<usize, Vec<String>> = std::collections::HashMap::new();
    let mut pending: Vec<String> = Vec::new();

    for (i, line) in raw.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("///") {
            pending.push(trimmed.trim_start_matches('/').trim().to_string());
            lines.push(String::new());
            continue;
        }
        let code = match find_comment_start(line) {
            Some(pos) => {
                let mut s = line[..pos].to_string();
                s.push_str(&" ".repeat(line.len() - pos));
                s
            }
            None => line.to_string(),
        };
        if !code.trim().is_empty() && !pending.is_empty() {
            docs.insert(i, std::mem::take(&mut pending));
        } else if code.trim().is_empty() && !trimmed.starts_with("///") && !trimmed.is_empty() {
            pending.clear();
        }
        lines.push(code);
    }
    (lines, docs)
}

/// Position of `//` outside string literals, if any.
fn find_comment_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut in_string: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = in_string {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q {
                in_string = None;
            }
        } else {
            match c {
                b'\'' | b'"' => in_string = Some(c),
                b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => return Some(i),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(source: &str) -> ResolvedUnit {
        parse_unit(source, "lib/a.dart", "app", "1.0.0")
    }

    fn decl<'a>(u: &'a ResolvedUnit, name: &str) -> &'a Declaration {
        u.declarations
            .iter()
            .find(|d| d.display_name == name)
            .unwrap_or_else(|| panic!("no declaration named {name}"))
    }

    #[test]
    fn class_with_members() {
        let u = unit(
            "class AuthService {\n  final String token = '';\n  int login(String user) {\n    return validate(user);\n  }\n  int validate(String user) {\n    return user.length;\n  }\n}\n",
        );
        let class = decl(&u, "AuthService");
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.body_end_line, 8);
        assert_eq!(class.symbol, "scip-dart pub app 1.0.0 lib/a.dart/AuthService#");

        let login = decl(&u, "login");
        assert_eq!(login.kind, SymbolKind::Method);
        assert_eq!(
            login.symbol,
            "scip-dart pub app 1.0.0 lib/a.dart/AuthService#login()."
        );
        assert_eq!(login.range.start_line, 2);
        assert_eq!(login.body_end_line, 4);

        let token = decl(&u, "token");
        assert_eq!(token.kind, SymbolKind::Field);

        // The call to validate resolves to the sibling method.
        let validate_id = decl(&u, "validate").symbol.clone();
        assert!(
            u.references
                .iter()
                .any(|r| r.symbol == validate_id && r.range.start_line == 3)
        );
    }

    #[test]
    fn single_line_class() {
        let u = unit("class A { void m() {} }\n");
        assert_eq!(decl(&u, "A").body_end_line, 0);
        let m = decl(&u, "m");
        assert_eq!(m.kind, SymbolKind::Method);
        assert_eq!(m.symbol, "scip-dart pub app 1.0.0 lib/a.dart/A#m().");
    }

    #[test]
    fn extends_clause_becomes_supertype_and_reference() {
        let u = unit("class A { void m() {} }\nclass B extends A { void m() {} }\n");
        let b = decl(&u, "B");
        assert_eq!(b.supertypes, vec!["scip-dart pub app 1.0.0 lib/a.dart/A#"]);
        assert!(
            u.references
                .iter()
                .any(|r| r.symbol.ends_with("/A#") && r.range.start_line == 1)
        );
    }

    #[test]
    fn unresolved_uppercase_call_is_external() {
        let u = unit("class App { Widget build() {\n  return Widget();\n} }\n");
        assert!(u.external_symbols.iter().any(|e| e.display_name == "Widget"));
        assert!(
            u.references
                .iter()
                .any(|r| r.symbol == "scip-dart pub unresolved 0.0.0 _/Widget#")
        );
    }

    #[test]
    fn top_level_function_and_variable() {
        let u = unit("final int answer = 42;\nString format(int x) {\n  return '$x';\n}\n");
        assert_eq!(decl(&u, "format").kind, SymbolKind::Function);
        assert_eq!(decl(&u, "answer").kind, SymbolKind::Variable);
        assert_eq!(
            decl(&u, "format").symbol,
            "scip-dart pub app 1.0.0 lib/a.dart/format()."
        );
    }

    #[test]
    fn enum_values() {
        let u = unit("enum Status {\n  active,\n  disabled;\n  bool get on => this == Status.active;\n}\n");
        assert_eq!(decl(&u, "active").kind, SymbolKind::EnumMember);
        assert_eq!(decl(&u, "disabled").kind, SymbolKind::EnumMember);
        assert_eq!(decl(&u, "on").kind, SymbolKind::Getter);
        assert_eq!(
            decl(&u, "active").symbol,
            "scip-dart pub app 1.0.0 lib/a.dart/Status#active."
        );
    }

    #[test]
    fn doc_comments_attach() {
        let u = unit("/// Validates users.\n/// Returns a score.\nclass Validator {}\n");
        assert_eq!(
            decl(&u, "Validator").documentation,
            vec!["Validates users.", "Returns a score."]
        );
    }

    #[test]
    fn arrow_body_ends_at_semicolon() {
        let u = unit("class A {\n  int twice(int x) => x * 2;\n  void other() {}\n}\n");
        assert_eq!(decl(&u, "twice").body_end_line, 1);
        assert_eq!(decl(&u, "other").kind, SymbolKind::Method);
    }

    #[test]
    fn local_variables_are_not_declarations() {
        let u = unit("class A {\n  void m() {\n    final int local = 1;\n    use(local);\n  }\n}\n");
        assert!(u.declarations.iter().all(|d| d.display_name != "local"));
    }

    #[test]
    fn comments_do_not_declare() {
        let u = unit("class A {\n  // int fake() {}\n  void real() {}\n}\n");
        assert!(u.declarations.iter().all(|d| d.display_name != "fake"));
        assert_eq!(decl(&u, "real").kind, SymbolKind::Method);
    }

    #[test]
    fn content_hash_is_recorded() {
        let u = unit("class A {}\n");
        assert_eq!(u.content_hash.len(), 64);
    }
}
