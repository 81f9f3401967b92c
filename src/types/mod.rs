//! Core data model shared across the engine.
//!
//! Symbols and identifiers are produced by the external extractor and stored
//! in the per-workspace symbol database. Ids are extractor-assigned strings,
//! unique within a workspace and stable while the file content at that
//! location is stable.

use serde::{Deserialize, Serialize};

/// A declared program entity (class, function, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub language: String,
    pub file_path: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Symbol {
    /// Number of lines the symbol body spans, inclusive.
    pub fn line_span(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Method,
    Function,
    Interface,
    Enum,
    Struct,
    Trait,
    Field,
    Property,
    Module,
    Variable,
    Constant,
    TypeAlias,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Method => "method",
            Self::Function => "function",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Struct => "struct",
            Self::Trait => "trait",
            Self::Field => "field",
            Self::Property => "property",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::TypeAlias => "type_alias",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "class" => Self::Class,
            "method" => Self::Method,
            "function" => Self::Function,
            "interface" => Self::Interface,
            "enum" => Self::Enum,
            "struct" => Self::Struct,
            "trait" => Self::Trait,
            "field" => Self::Field,
            "property" => Self::Property,
            "module" => Self::Module,
            "variable" => Self::Variable,
            "constant" => Self::Constant,
            "type_alias" => Self::TypeAlias,
            _ => return None,
        })
    }
}

/// A usage occurrence of a symbol at a source location.
///
/// Many identifiers map to one symbol. `containing_symbol_id` expresses
/// "this call happens inside that function" and is the basis for call-path
/// edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub id: String,
    pub name: String,
    pub kind: IdentifierKind,
    pub language: String,
    pub file_path: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containing_symbol_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_symbol_id: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Call,
    MemberAccess,
    VariableRef,
    TypeRef,
    Import,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::MemberAccess => "member_access",
            Self::VariableRef => "variable_ref",
            Self::TypeRef => "type_ref",
            Self::Import => "import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "call" => Self::Call,
            "member_access" => Self::MemberAccess,
            "variable_ref" => Self::VariableRef,
            "type_ref" => Self::TypeRef,
            "import" => Self::Import,
            _ => return None,
        })
    }
}

/// A typed edge between two symbols in the same workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRelation {
    pub from_id: String,
    pub to_id: String,
    pub kind: RelationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Extends,
    Implements,
    Overrides,
    Uses,
    References,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::Overrides => "overrides",
            Self::Uses => "uses",
            Self::References => "references",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "extends" => Self::Extends,
            "implements" => Self::Implements,
            "overrides" => Self::Overrides,
            "uses" => Self::Uses,
            "references" => Self::References,
            _ => return None,
        })
    }
}

/// One indexed file, keyed by (workspace, path).
///
/// Mutated only by full replacement on content change; deleted when the
/// watcher observes removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub content: String,
    pub language: String,
    pub size_bytes: u64,
    pub last_modified_ms: u64,
    pub content_hash: String,
}

/// Direction of a call-path traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceDirection {
    Upward,
    Downward,
}

impl TraceDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upward => "upward",
            Self::Downward => "downward",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_kind_round_trips_through_str() {
        for kind in [
            SymbolKind::Class,
            SymbolKind::Method,
            SymbolKind::Function,
            SymbolKind::Interface,
            SymbolKind::Enum,
            SymbolKind::Field,
            SymbolKind::Property,
            SymbolKind::TypeAlias,
        ] {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SymbolKind::parse("widget"), None);
    }

    #[test]
    fn identifier_kind_round_trips_through_str() {
        for kind in [
            IdentifierKind::Call,
            IdentifierKind::MemberAccess,
            IdentifierKind::VariableRef,
            IdentifierKind::TypeRef,
        ] {
            assert_eq!(IdentifierKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn line_span_is_inclusive() {
        let sym = Symbol {
            id: "s1".into(),
            name: "foo".into(),
            kind: SymbolKind::Function,
            language: "rust".into(),
            file_path: "src/lib.rs".into(),
            start_line: 10,
            start_col: 0,
            end_line: 12,
            end_col: 1,
            signature: None,
            parent_id: None,
        };
        assert_eq!(sym.line_span(), 3);
    }
}
