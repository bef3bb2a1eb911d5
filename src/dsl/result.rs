//! Typed query results.
//!
//! Every query resolves to one variant of [`QueryResult`]; each variant
//! carries its structured fields and renders itself both as human-readable
//! text and as JSON. Positions are stored 0-based like the index and
//! rendered 1-based in both forms.

use crate::types::{GrepMatch, SymbolKind};
use serde::Serialize;

/// A symbol as it appears in results: id plus the fields a reader needs to
/// tell candidates apart.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolRef {
    pub symbol: String,
    pub name: String,
    pub kind: SymbolKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl SymbolRef {
    fn render_line(&self) -> String {
        let mut out = format!("{} {}", self.kind.as_str(), self.name);
        if let Some(container) = &self.container {
            out.push_str(&format!(" (in {container})"));
        }
        if let Some(file) = &self.file {
            out.push_str(&format!("  {file}"));
            if let Some(line) = self.line {
                out.push_str(&format!(":{}", line + 1));
            }
        }
        out
    }
}

/// One reference site.
#[derive(Debug, Clone, Serialize)]
pub struct RefSite {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefinitionEntry {
    #[serde(flatten)]
    pub symbol: SymbolRef,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub documentation: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceGroup {
    #[serde(flatten)]
    pub symbol: SymbolRef,
    pub references: Vec<RefSite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Calls,
    Callers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrepMode {
    Matches,
    FilesWith,
    FilesWithout,
    Count,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryResult {
    /// Top-ranked definitions with source, at most three.
    Definition { entries: Vec<DefinitionEntry> },
    /// References of one unambiguous symbol.
    References {
        symbol: SymbolRef,
        references: Vec<RefSite>,
    },
    /// References grouped per candidate when the target was ambiguous.
    AggregatedReferences { groups: Vec<ReferenceGroup> },
    Members {
        container: SymbolRef,
        members: Vec<SymbolRef>,
    },
    Hierarchy {
        symbol: SymbolRef,
        supertypes: Vec<String>,
        subtypes: Vec<String>,
    },
    Source {
        symbol: SymbolRef,
        text: String,
    },
    Signature {
        symbol: SymbolRef,
        signature: String,
    },
    Search {
        pattern: String,
        symbols: Vec<SymbolRef>,
    },
    Which { candidates: Vec<SymbolRef> },
    Grep {
        pattern: String,
        mode: GrepMode,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        matches: Vec<GrepMatch>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        files: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        counts: Vec<(String, usize)>,
    },
    Imports {
        file: String,
        imports: Vec<String>,
        resolved: Vec<SymbolRef>,
    },
    CallGraph {
        symbol: SymbolRef,
        direction: CallDirection,
        related: Vec<SymbolRef>,
    },
    Dependencies {
        symbol: SymbolRef,
        depends_on: Vec<SymbolRef>,
    },
    Files { files: Vec<String> },
    Stats { stats: crate::registry::RegistryStats },
    /// Matching symbols grouped by kind.
    Classify {
        pattern: String,
        groups: Vec<(String, Vec<SymbolRef>)>,
    },
    /// Navigation transitions recovered from the call graph.
    Storyboard {
        transitions: Vec<(String, String)>,
    },
    Pipeline { results: Vec<QueryResult> },
    NotFound { target: String, message: String },
    Error { token: String, message: String },
}

impl QueryResult {
    pub fn not_found(target: &str) -> Self {
        Self::NotFound {
            target: target.to_string(),
            message: format!("no symbol matching '{target}'"),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Definition { entries } => {
                let mut out = String::new();
                for entry in entries {
                    out.push_str(&entry.symbol.render_line());
                    out.push('\n');
                    for doc in &entry.documentation {
                        out.push_str(&format!("  /// {doc}\n"));
                    }
                    if let Some(source) = &entry.source {
                        for line in source.lines() {
                            out.push_str(&format!("  {line}\n"));
                        }
                    }
                }
                out
            }
            Self::References { symbol, references } => {
                let mut out = format!(
                    "{} reference(s) to {}\n",
                    references.len(),
                    symbol.name
                );
                for site in references {
                    out.push_str(&format!(
                        "  {}:{}:{}\n",
                        site.file,
                        site.line + 1,
                        site.col + 1
                    ));
                }
                out
            }
            Self::AggregatedReferences { groups } => {
                let mut out = String::new();
                for group in groups {
                    out.push_str(&format!(
                        "{} ({} reference(s))\n",
                        group.symbol.render_line(),
                        group.references.len()
                    ));
                    for site in &group.references {
                        out.push_str(&format!(
                            "  {}:{}:{}\n",
                            site.file,
                            site.line + 1,
                            site.col + 1
                        ));
                    }
                }
                out
            }
            Self::Members { container, members } => {
                let mut out = format!("members of {}:\n", container.name);
                for member in members {
                    out.push_str(&format!("  {}\n", member.render_line()));
                }
                out
            }
            Self::Hierarchy {
                symbol,
                supertypes,
                subtypes,
            } => {
                format!(
                    "{}\n  supertypes: [{}]\n  subtypes: [{}]\n",
                    symbol.name,
                    supertypes.join(", "),
                    subtypes.join(", ")
                )
            }
            Self::Source { symbol, text } => {
                format!("// {}\n{text}\n", symbol.render_line())
            }
            Self::Signature { symbol, signature } => {
                format!("{}: {signature}\n", symbol.name)
            }
            Self::Search { pattern, symbols } => {
                let mut out = format!("{} match(es) for '{pattern}'\n", symbols.len());
                for sym in symbols {
                    out.push_str(&format!("  {}\n", sym.render_line()));
                }
                out
            }
            Self::Which { candidates } => {
                let mut out = String::new();
                for sym in candidates {
                    out.push_str(&format!("{}\n  {}\n", sym.render_line(), sym.symbol));
                }
                out
            }
            Self::Grep {
                pattern,
                mode,
                matches,
                files,
                counts,
            } => match mode {
                GrepMode::Matches => {
                    let mut out = String::new();
                    for m in matches {
                        let context = m
                            .symbol_context
                            .as_deref()
                            .map(|s| format!(" [{s}]"))
                            .unwrap_or_default();
                        for (i, line) in m.before.iter().enumerate() {
                            let n = m.line as usize + 1 - (m.before.len() - i);
                            out.push_str(&format!("{}:{}- {}\n", m.file, n, line));
                        }
                        out.push_str(&format!(
                            "{}:{}:{}{context}\n",
                            m.file,
                            m.line + 1,
                            m.text
                        ));
                        for (i, line) in m.after.iter().enumerate() {
                            out.push_str(&format!(
                                "{}:{}- {}\n",
                                m.file,
                                m.line as usize + 2 + i,
                                line
                            ));
                        }
                    }
                    if matches.is_empty() {
                        out.push_str(&format!("no matches for '{pattern}'\n"));
                    }
                    out
                }
                GrepMode::FilesWith | GrepMode::FilesWithout => {
                    let mut out = String::new();
                    for file in files {
                        out.push_str(file);
                        out.push('\n');
                    }
                    out
                }
                GrepMode::Count => {
                    let mut out = String::new();
                    let total: usize = counts.iter().map(|(_, n)| n).sum();
                    for (file, n) in counts {
                        out.push_str(&format!("{file}:{n}\n"));
                    }
                    out.push_str(&format!("total:{total}\n"));
                    out
                }
            },
            Self::Imports {
                file,
                imports,
                resolved,
            } => {
                let mut out = format!("imports of {file}:\n");
                for import in imports {
                    out.push_str(&format!("  {import}\n"));
                }
                if !resolved.is_empty() {
                    out.push_str("resolved symbols:\n");
                    for sym in resolved {
                        out.push_str(&format!("  {}\n", sym.render_line()));
                    }
                }
                out
            }
            Self::CallGraph {
                symbol,
                direction,
                related,
            } => {
                let label = match direction {
                    CallDirection::Calls => "calls",
                    CallDirection::Callers => "callers of",
                };
                let mut out = format!("{label} {}:\n", symbol.name);
                for sym in related {
                    out.push_str(&format!("  {}\n", sym.render_line()));
                }
                out
            }
            Self::Dependencies { symbol, depends_on } => {
                let mut out = format!("{} depends on:\n", symbol.name);
                for sym in depends_on {
                    out.push_str(&format!("  {}\n", sym.render_line()));
                }
                out
            }
            Self::Files { files } => {
                let mut out = String::new();
                for file in files {
                    out.push_str(file);
                    out.push('\n');
                }
                out
            }
            Self::Stats { stats } => {
                let mut out = String::new();
                for (name, s) in &stats.packages {
                    out.push_str(&format!(
                        "{name}: {} files, {} symbols, {} occurrences, {} call edges\n",
                        s.documents, s.symbols, s.occurrences, s.call_edges
                    ));
                }
                out.push_str(&format!("external indexes loaded: {}\n", stats.external_indexes));
                out
            }
            Self::Classify { pattern, groups } => {
                let mut out = format!("classification of '{pattern}':\n");
                for (kind, symbols) in groups {
                    out.push_str(&format!("  {kind} ({}):\n", symbols.len()));
                    for sym in symbols {
                        out.push_str(&format!("    {}\n", sym.name));
                    }
                }
                out
            }
            Self::Storyboard { transitions } => {
                let mut out = String::from("navigation transitions:\n");
                for (from, action) in transitions {
                    out.push_str(&format!("  {from} -> {action}\n"));
                }
                if transitions.is_empty() {
                    out.push_str("  (none found)\n");
                }
                out
            }
            Self::Pipeline { results } => {
                let mut out = String::new();
                for result in results {
                    out.push_str(&result.to_text());
                }
                out
            }
            Self::NotFound { message, .. } => format!("not found: {message}\n"),
            Self::Error { token, message } => {
                format!("bad query at '{token}': {message}\n")
            }
        }
    }

    /// Names handed to the next pipeline stage.
    pub fn extracted_symbols(&self) -> Vec<String> {
        match self {
            Self::Definition { entries } => {
                entries.iter().map(|e| e.symbol.name.clone()).collect()
            }
            Self::Search { symbols, .. } => symbols.iter().map(|s| s.name.clone()).collect(),
            Self::Which { candidates } => candidates.iter().map(|s| s.name.clone()).collect(),
            Self::Members { members, .. } => members.iter().map(|s| s.name.clone()).collect(),
            Self::CallGraph { related, .. } => related.iter().map(|s| s.name.clone()).collect(),
            Self::Dependencies { depends_on, .. } => {
                depends_on.iter().map(|s| s.name.clone()).collect()
            }
            Self::Hierarchy {
                supertypes,
                subtypes,
                ..
            } => supertypes.iter().chain(subtypes.iter()).cloned().collect(),
            Self::Classify { groups, .. } => groups
                .iter()
                .flat_map(|(_, symbols)| symbols.iter().map(|s| s.name.clone()))
                .collect(),
            Self::References { symbol, .. } => vec![symbol.name.clone()],
            Self::AggregatedReferences { groups } => {
                groups.iter().map(|g| g.symbol.name.clone()).collect()
            }
            Self::Pipeline { results } => results
                .iter()
                .flat_map(|r| r.extracted_symbols())
                .collect(),
            _ => Vec::new(),
        }
    }
}
