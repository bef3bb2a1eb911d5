//! SCIP-shaped record schema and on-disk codec.
//!
//! The engine consumes and emits a record stream shaped like the SCIP
//! protobuf schema: an index of documents, each carrying symbol information
//! and occurrences with compact integer ranges. Positions are 0-based on the
//! wire. The byte layout below the record schema is not part of the engine's
//! contract; records are encoded with bincode, the same codec the workspace
//! cache uses.

use crate::types::{Document, Occurrence, Relationship, SymbolInformation, SymbolKind, SymbolRole};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level record: one index for one package or source tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScipIndex {
    pub metadata: Metadata,
    pub documents: Vec<ScipDocument>,
    /// Symbols referenced by documents but defined outside the index.
    pub external_symbols: Vec<ScipSymbolInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// `file://` URI of the project root the documents are relative to.
    pub project_root: String,
    pub text_document_encoding: i32,
    pub tool_info: ToolInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScipDocument {
    pub language: String,
    /// POSIX form, relative to the index's project root.
    pub relative_path: String,
    pub symbols: Vec<ScipSymbolInfo>,
    pub occurrences: Vec<ScipOccurrence>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScipSymbolInfo {
    pub symbol: String,
    pub kind: SymbolKind,
    pub display_name: String,
    pub documentation: Vec<String>,
    pub relationships: Vec<ScipRelationship>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScipRelationship {
    pub symbol: String,
    pub is_reference: bool,
    pub is_implementation: bool,
    pub is_type_definition: bool,
    pub is_definition: bool,
}

/// One occurrence on the wire.
///
/// `range` is `[start_line, start_col, end_col]` when the occurrence is on a
/// single line, or `[start_line, start_col, end_line, end_col]` otherwise.
/// `enclosing_range` uses the same encoding and delimits the span of the
/// defining construct; it is present for definitions only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScipOccurrence {
    pub range: Vec<i32>,
    pub symbol: String,
    pub symbol_roles: u32,
    pub enclosing_range: Vec<i32>,
}

/// Decoded `(start_line, start_col, end_line, end_col)`.
pub fn decode_range(range: &[i32]) -> Option<(u32, u32, u32, u32)> {
    match range {
        [line, start_col, end_col] => {
            Some((*line as u32, *start_col as u32, *line as u32, *end_col as u32))
        }
        [start_line, start_col, end_line, end_col] => Some((
            *start_line as u32,
            *start_col as u32,
            *end_line as u32,
            *end_col as u32,
        )),
        _ => None,
    }
}

/// Encode a range, collapsing to the three-element form when possible.
pub fn encode_range(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Vec<i32> {
    if start_line == end_line {
        vec![start_line as i32, start_col as i32, end_col as i32]
    } else {
        vec![
            start_line as i32,
            start_col as i32,
            end_line as i32,
            end_col as i32,
        ]
    }
}

impl ScipRelationship {
    fn to_relationship(&self) -> Relationship {
        Relationship {
            symbol: self.symbol.clone(),
            is_reference: self.is_reference,
            is_implementation: self.is_implementation,
            is_type_definition: self.is_type_definition,
            is_definition: self.is_definition,
        }
    }

    fn from_relationship(rel: &Relationship) -> Self {
        Self {
            symbol: rel.symbol.clone(),
            is_reference: rel.is_reference,
            is_implementation: rel.is_implementation,
            is_type_definition: rel.is_type_definition,
            is_definition: rel.is_definition,
        }
    }
}

impl ScipSymbolInfo {
    /// Lift to the in-memory shape. `defining_file` is the owning document's
    /// path, or `None` when this record comes from an external-symbol table.
    pub fn to_symbol_information(&self, defining_file: Option<&str>) -> SymbolInformation {
        SymbolInformation {
            symbol: self.symbol.clone(),
            kind: self.kind,
            display_name: if self.display_name.is_empty() {
                None
            } else {
                Some(self.display_name.clone())
            },
            documentation: self.documentation.clone(),
            relationships: self.relationships.iter().map(|r| r.to_relationship()).collect(),
            defining_file: defining_file.map(str::to_string),
        }
    }

    pub fn from_symbol_information(info: &SymbolInformation) -> Self {
        Self {
            symbol: info.symbol.clone(),
            kind: info.kind,
            display_name: info.display_name.clone().unwrap_or_default(),
            documentation: info.documentation.clone(),
            relationships: info
                .relationships
                .iter()
                .map(ScipRelationship::from_relationship)
                .collect(),
        }
    }
}

impl ScipDocument {
    /// Decode into the in-memory document shape. Occurrences with malformed
    /// ranges are dropped.
    pub fn to_document(&self) -> Document {
        let symbols = self
            .symbols
            .iter()
            .map(|s| s.to_symbol_information(Some(&self.relative_path)))
            .collect();

        let occurrences = self
            .occurrences
            .iter()
            .filter_map(|occ| {
                let (start_line, start_col, end_line, end_col) = decode_range(&occ.range)?;
                let enclosing_end_line = decode_range(&occ.enclosing_range).map(|(_, _, l, _)| l);
                Some(Occurrence {
                    file: self.relative_path.clone(),
                    symbol: occ.symbol.clone(),
                    start_line,
                    start_col,
                    end_line,
                    end_col,
                    roles: SymbolRole::from_bits_truncate(occ.symbol_roles),
                    enclosing_end_line,
                })
            })
            .collect();

        Document {
            language: self.language.clone(),
            relative_path: self.relative_path.clone(),
            symbols,
            occurrences,
        }
    }

    pub fn from_document(doc: &Document) -> Self {
        Self {
            language: doc.language.clone(),
            relative_path: doc.relative_path.clone(),
            symbols: doc
                .symbols
                .iter()
                .filter(|s| !s.is_external())
                .map(ScipSymbolInfo::from_symbol_information)
                .collect(),
            occurrences: doc
                .occurrences
                .iter()
                .map(|occ| ScipOccurrence {
                    range: encode_range(occ.start_line, occ.start_col, occ.end_line, occ.end_col),
                    symbol: occ.symbol.clone(),
                    symbol_roles: occ.roles.bits(),
                    enclosing_range: occ
                        .enclosing_end_line
                        .map(|end| encode_range(occ.start_line, 0, end, 0))
                        .unwrap_or_default(),
                })
                .collect(),
        }
    }
}

/// Assemble the full index record for a set of in-memory documents.
///
/// External symbols referenced by the documents are collected into the
/// index-level `external_symbols` table, deduplicated by id, so a reload
/// reconstructs the exact same symbol table.
pub fn build_index_record(project_root: &Path, documents: &[Document]) -> ScipIndex {
    let mut externals: Vec<ScipSymbolInfo> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for doc in documents {
        for sym in doc.symbols.iter().filter(|s| s.is_external()) {
            if seen.insert(sym.symbol.clone()) {
                externals.push(ScipSymbolInfo::from_symbol_information(sym));
            }
        }
    }
    externals.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let mut docs: Vec<ScipDocument> = documents.iter().map(ScipDocument::from_document).collect();
    docs.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    ScipIndex {
        metadata: Metadata {
            project_root: format!("file://{}", project_root.display()),
            text_document_encoding: 0,
            tool_info: ToolInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                arguments: Vec::new(),
            },
        },
        documents: docs,
        external_symbols: externals,
    }
}

/// Serialize an index record to bytes.
pub fn encode(index: &ScipIndex) -> Result<Vec<u8>> {
    bincode::serialize(index).context("failed to encode index records")
}

/// Deserialize an index record from bytes.
pub fn decode(bytes: &[u8]) -> Result<ScipIndex> {
    bincode::deserialize(bytes).context("failed to decode index records")
}

pub fn write_to(path: &Path, index: &ScipIndex) -> Result<()> {
    let data = encode(index)?;
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn read_from(path: &Path) -> Result<ScipIndex> {
    let data =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    decode(&data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_codec() {
        assert_eq!(decode_range(&[3, 2, 9]), Some((3, 2, 3, 9)));
        assert_eq!(decode_range(&[3, 2, 5, 1]), Some((3, 2, 5, 1)));
        assert_eq!(decode_range(&[3]), None);
        assert_eq!(encode_range(3, 2, 3, 9), vec![3, 2, 9]);
        assert_eq!(encode_range(3, 2, 5, 1), vec![3, 2, 5, 1]);
    }

    #[test]
    fn document_round_trip() {
        let scip_doc = ScipDocument {
            language: "dart".into(),
            relative_path: "lib/a.dart".into(),
            symbols: vec![ScipSymbolInfo {
                symbol: "scip-dart pub app 1.0.0 lib/a.dart/A#".into(),
                kind: SymbolKind::Class,
                display_name: "A".into(),
                documentation: vec!["A class.".into()],
                relationships: vec![],
            }],
            occurrences: vec![ScipOccurrence {
                range: vec![0, 6, 7],
                symbol: "scip-dart pub app 1.0.0 lib/a.dart/A#".into(),
                symbol_roles: SymbolRole::DEFINITION.bits(),
                enclosing_range: vec![0, 0, 4, 0],
            }],
        };

        let doc = scip_doc.to_document();
        assert_eq!(doc.symbols[0].defining_file.as_deref(), Some("lib/a.dart"));
        assert_eq!(doc.occurrences[0].enclosing_end_line, Some(4));
        assert!(doc.occurrences[0].is_definition());

        let back = ScipDocument::from_document(&doc);
        assert_eq!(back.occurrences[0].range, vec![0, 6, 7]);
        assert_eq!(back.occurrences[0].enclosing_range, vec![0, 0, 4, 0]);
    }

    #[test]
    fn index_bytes_round_trip() {
        let index = ScipIndex {
            metadata: Metadata {
                project_root: "file:///tmp/app".into(),
                text_document_encoding: 0,
                tool_info: ToolInfo {
                    name: "dartscope".into(),
                    version: "0.1.0".into(),
                    arguments: vec![],
                },
            },
            documents: vec![ScipDocument {
                language: "dart".into(),
                relative_path: "lib/a.dart".into(),
                ..Default::default()
            }],
            external_symbols: vec![],
        };
        let bytes = encode(&index).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.documents.len(), 1);
        assert_eq!(decoded.metadata.project_root, "file:///tmp/app");
    }
}
