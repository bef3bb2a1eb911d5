//! Core types for the Dart code-intelligence index.
//!
//! These are the in-memory shapes the index and query layers work with.
//! The on-disk record stream lives in [`crate::scip`]; conversions between
//! the two are lossless.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Role bits attached to an occurrence, matching the SCIP `SymbolRole`
    /// bitmask. `DEFINITION` distinguishes definitions from references.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SymbolRole: u32 {
        const DEFINITION    = 0x1;
        const IMPORT        = 0x2;
        const WRITE_ACCESS  = 0x4;
        const READ_ACCESS   = 0x8;
        const GENERATED     = 0x10;
        const TEST          = 0x20;
    }
}

impl Serialize for SymbolRole {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for SymbolRole {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(SymbolRole::from_bits_truncate(bits))
    }
}

/// Kind of symbol in the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    Class,
    Method,
    Function,
    Field,
    Enum,
    EnumMember,
    Interface,
    Variable,
    Property,
    Parameter,
    Mixin,
    Extension,
    Getter,
    Setter,
    Constructor,
    TypeParameter,
    Constant,
    Library,
    #[default]
    Unknown,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Method => "method",
            Self::Function => "function",
            Self::Field => "field",
            Self::Enum => "enum",
            Self::EnumMember => "enum-member",
            Self::Interface => "interface",
            Self::Variable => "variable",
            Self::Property => "property",
            Self::Parameter => "parameter",
            Self::Mixin => "mixin",
            Self::Extension => "extension",
            Self::Getter => "getter",
            Self::Setter => "setter",
            Self::Constructor => "constructor",
            Self::TypeParameter => "type-parameter",
            Self::Constant => "constant",
            Self::Library => "library",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the `kind:` filter spelling. Accepts both `enum-member` and
    /// `enumMember` forms.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.to_ascii_lowercase().replace('-', "");
        Some(match normalized.as_str() {
            "class" => Self::Class,
            "method" => Self::Method,
            "function" => Self::Function,
            "field" => Self::Field,
            "enum" => Self::Enum,
            "enummember" => Self::EnumMember,
            "interface" => Self::Interface,
            "variable" => Self::Variable,
            "property" => Self::Property,
            "parameter" => Self::Parameter,
            "mixin" => Self::Mixin,
            "extension" => Self::Extension,
            "getter" => Self::Getter,
            "setter" => Self::Setter,
            "constructor" => Self::Constructor,
            "typeparameter" => Self::TypeParameter,
            "constant" => Self::Constant,
            "library" => Self::Library,
            _ => return None,
        })
    }

    /// Kinds that can contain members.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Class | Self::Mixin | Self::Extension | Self::Enum)
    }
}

/// A single textual appearance of a symbol in a document.
///
/// Positions are 0-based, matching the wire format; rendering adds 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// POSIX-form path relative to the index's project root.
    pub file: String,
    /// Full symbol id.
    pub symbol: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub roles: SymbolRole,
    /// Last line of the defining construct. Present for definitions only.
    pub enclosing_end_line: Option<u32>,
}

impl Occurrence {
    pub fn is_definition(&self) -> bool {
        self.roles.contains(SymbolRole::DEFINITION)
    }
}

/// Subtype/supertype and related edges between symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Relationship {
    pub symbol: String,
    pub is_reference: bool,
    pub is_implementation: bool,
    pub is_type_definition: bool,
    pub is_definition: bool,
}

/// Everything the index knows about one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInformation {
    /// Full symbol id, globally unique within a package version.
    pub symbol: String,
    pub kind: SymbolKind,
    pub display_name: Option<String>,
    pub documentation: Vec<String>,
    pub relationships: Vec<Relationship>,
    /// Document that defines this symbol; `None` for symbols imported but
    /// not defined in the index (external symbols).
    pub defining_file: Option<String>,
}

impl SymbolInformation {
    /// `display_name` when non-empty, otherwise the trailing identifier
    /// extracted from the symbol id.
    pub fn name(&self) -> String {
        match &self.display_name {
            Some(n) if !n.is_empty() => n.clone(),
            _ => crate::symbol::name_of(&self.symbol),
        }
    }

    pub fn is_external(&self) -> bool {
        self.defining_file.is_none()
    }
}

/// All symbols and occurrences for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub language: String,
    /// POSIX-form path relative to the index's project root.
    pub relative_path: String,
    pub symbols: Vec<SymbolInformation>,
    pub occurrences: Vec<Occurrence>,
}

/// Statistics about one index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: usize,
    pub symbols: usize,
    pub external_symbols: usize,
    pub occurrences: usize,
    pub call_edges: usize,
}

/// Options accepted by [`crate::index::Index::grep`].
#[derive(Debug, Clone, Default)]
pub struct GrepOptions {
    /// Only files whose relative path starts with this prefix.
    pub path_filter: Option<String>,
    /// Only files matching this glob.
    pub include_glob: Option<String>,
    /// Skip files matching this glob.
    pub exclude_glob: Option<String>,
    /// Lines of context before each match.
    pub before: usize,
    /// Lines of context after each match.
    pub after: usize,
    /// Report lines that do NOT match.
    pub invert: bool,
    /// Cap on matches per file.
    pub max_per_file: Option<usize>,
    /// Match against the whole file instead of line-by-line.
    pub multiline: bool,
    /// Report only the matched text, not the whole line.
    pub only_matching: bool,
}

/// One grep hit. `line` is 0-based like every other position in the index.
#[derive(Debug, Clone, Serialize)]
pub struct GrepMatch {
    pub file: String,
    pub line: u32,
    pub text: String,
    /// Name of the lexically innermost symbol whose definition span contains
    /// the match line.
    pub symbol_context: Option<String>,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_bits_round_trip() {
        let roles = SymbolRole::DEFINITION | SymbolRole::WRITE_ACCESS;
        assert!(roles.contains(SymbolRole::DEFINITION));
        assert_eq!(roles.bits(), 0x5);
    }

    #[test]
    fn kind_parse_accepts_both_spellings() {
        assert_eq!(SymbolKind::parse("enum-member"), Some(SymbolKind::EnumMember));
        assert_eq!(SymbolKind::parse("enumMember"), Some(SymbolKind::EnumMember));
        assert_eq!(SymbolKind::parse("CLASS"), Some(SymbolKind::Class));
        assert_eq!(SymbolKind::parse("widget"), None);
    }

    #[test]
    fn occurrence_definition_bit() {
        let occ = Occurrence {
            file: "lib/a.dart".into(),
            symbol: "scip-dart pub app 1.0.0 lib/a.dart/A#".into(),
            start_line: 0,
            start_col: 6,
            end_line: 0,
            end_col: 7,
            roles: SymbolRole::DEFINITION,
            enclosing_end_line: Some(4),
        };
        assert!(occ.is_definition());
    }
}
