//! The analyzer seam.
//!
//! The engine never parses Dart itself; it consumes resolved units from an
//! analyzer behind the [`Analyzer`] capability trait and lowers them into
//! SCIP-shaped documents. Two implementations exist: the bundled
//! [`syntactic::SyntacticAnalyzer`] reference analyzer, and whatever
//! external adapter a host wires in (an adapter error is treated like an
//! analyzer resolution failure — the previous document slot stays intact).

pub mod syntactic;

use crate::types::{
    Document, Occurrence, Relationship, SymbolInformation, SymbolKind, SymbolRole,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("{0}")]
    Resolution(String),

    #[error("adapter failure: {0}")]
    Adapter(String),
}

/// A filesystem event as the indexer consumes it, either from the watcher
/// or from an adapter's own change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

/// 0-based source span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceRange {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// One declaration in a resolved unit.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub symbol: String,
    pub kind: SymbolKind,
    pub display_name: String,
    pub documentation: Vec<String>,
    /// Symbol ids this declaration extends/implements/mixes in.
    pub supertypes: Vec<String>,
    /// Span of the declared name.
    pub range: SourceRange,
    /// Last line of the declaring construct's body.
    pub body_end_line: u32,
}

/// One resolved reference site.
#[derive(Debug, Clone)]
pub struct Reference {
    pub symbol: String,
    pub range: SourceRange,
}

/// A symbol referenced by the unit but defined outside it (or outside the
/// package entirely).
#[derive(Debug, Clone)]
pub struct ExternalSymbol {
    pub symbol: String,
    pub kind: SymbolKind,
    pub display_name: String,
}

/// Analyzer output for one source file: resolutions ready to lower into a
/// document.
#[derive(Debug, Clone)]
pub struct ResolvedUnit {
    /// POSIX path relative to the analyzer's project root.
    pub relative_path: String,
    pub language: String,
    /// SHA-256 of the content the unit was resolved from. Used as the
    /// change-detection fallback when no file backs the unit on disk.
    pub content_hash: String,
    pub declarations: Vec<Declaration>,
    pub references: Vec<Reference>,
    pub external_symbols: Vec<ExternalSymbol>,
}

/// Capability contract the indexer drives.
///
/// The analyzer is a mutable resource (it holds a file cache); callers must
/// send `notify_file_change` before requesting the corresponding unit.
pub trait Analyzer: Send + Sync {
    fn project_root(&self) -> &Path;

    /// Resolve one file. `Ok(None)` means the analyzer has nothing to say
    /// about this file (not a source file, or excluded); the indexer
    /// records the hash and moves on.
    fn resolved_unit(&self, path: &Path) -> Result<Option<ResolvedUnit>, AnalyzerError>;

    /// Invalidate any cached state for `path`.
    fn notify_file_change(&self, path: &Path);

    /// Adapter-provided source enumeration; the indexer falls back to a
    /// directory walk when absent.
    fn list_source_files(&self) -> Option<Vec<PathBuf>> {
        None
    }

    /// Adapter-provided change stream; the indexer runs its own filesystem
    /// watcher when absent.
    fn file_changes(&self) -> Option<broadcast::Receiver<FileEvent>> {
        None
    }
}

/// Lower a resolved unit into a document: declarations become symbol
/// records and definition occurrences with enclosing ranges, references
/// become plain occurrences, externally-defined symbols are carried with
/// `defining_file = None`.
pub fn lower_unit(unit: &ResolvedUnit) -> Document {
    let mut symbols: Vec<SymbolInformation> = Vec::with_capacity(
        unit.declarations.len() + unit.external_symbols.len(),
    );
    let mut occurrences: Vec<Occurrence> =
        Vec::with_capacity(unit.declarations.len() + unit.references.len());

    for decl in &unit.declarations {
        symbols.push(SymbolInformation {
            symbol: decl.symbol.clone(),
            kind: decl.kind,
            display_name: if decl.display_name.is_empty() {
                None
            } else {
                Some(decl.display_name.clone())
            },
            documentation: decl.documentation.clone(),
            relationships: decl
                .supertypes
                .iter()
                .map(|sup| Relationship {
                    symbol: sup.clone(),
                    is_implementation: true,
                    ..Default::default()
                })
                .collect(),
            defining_file: Some(unit.relative_path.clone()),
        });

        occurrences.push(Occurrence {
            file: unit.relative_path.clone(),
            symbol: decl.symbol.clone(),
            start_line: decl.range.start_line,
            start_col: decl.range.start_col,
            end_line: decl.range.end_line,
            end_col: decl.range.end_col,
            roles: SymbolRole::DEFINITION,
            enclosing_end_line: Some(decl.body_end_line),
        });
    }

    for ext in &unit.external_symbols {
        symbols.push(SymbolInformation {
            symbol: ext.symbol.clone(),
            kind: ext.kind,
            display_name: if ext.display_name.is_empty() {
                None
            } else {
                Some(ext.display_name.clone())
            },
            documentation: Vec::new(),
            relationships: Vec::new(),
            defining_file: None,
        });
    }

    for reference in &unit.references {
        occurrences.push(Occurrence {
            file: unit.relative_path.clone(),
            symbol: reference.symbol.clone(),
            start_line: reference.range.start_line,
            start_col: reference.range.start_col,
            end_line: reference.range.end_line,
            end_col: reference.range.end_col,
            roles: SymbolRole::empty(),
            enclosing_end_line: None,
        });
    }

    Document {
        language: unit.language.clone(),
        relative_path: unit.relative_path.clone(),
        symbols,
        occurrences,
    }
}
