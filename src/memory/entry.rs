//! Memory entry model, checkpoint id generation, and relationship kinds.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Field names that collide with core columns and are rejected as extended
/// field names.
pub const RESERVED_FIELD_NAMES: &[&str] = &[
    "id",
    "type",
    "content",
    "created",
    "modified",
    "last_accessed",
    "access_count",
    "session_id",
    "is_shared",
    "files_involved",
    "fields",
];

/// A schema-free knowledge document (note, decision, debt item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    /// Free-form tag, e.g. `TechnicalDebt`, `ArchitecturalDecision`.
    #[serde(rename = "type")]
    pub entry_type: String,
    pub content: String,
    pub created: u64,
    pub modified: u64,
    pub last_accessed: u64,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub files_involved: Vec<String>,
    /// Arbitrary extended fields, validated against the reserved set.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl MemoryEntry {
    /// A fresh entry stamped with the current time.
    pub fn new(entry_type: impl Into<String>, content: impl Into<String>) -> Self {
        let now = crate::workspace::registry::now_ms();
        Self {
            id: String::new(),
            entry_type: entry_type.into(),
            content: content.into(),
            created: now,
            modified: now,
            last_accessed: now,
            access_count: 0,
            session_id: None,
            is_shared: false,
            files_involved: Vec::new(),
            fields: serde_json::Map::new(),
        }
    }
}

/// Typed edge between two memory entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRelationship {
    pub from_id: String,
    pub to_id: String,
    pub kind: MemoryRelationKind,
    #[serde(default)]
    pub bidirectional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoryRelationKind {
    RelatedTo,
    BlockedBy,
    Implements,
    Supersedes,
    DependsOn,
    ParentOf,
    References,
    Causes,
    Resolves,
    Duplicates,
}

impl MemoryRelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelatedTo => "relatedTo",
            Self::BlockedBy => "blockedBy",
            Self::Implements => "implements",
            Self::Supersedes => "supersedes",
            Self::DependsOn => "dependsOn",
            Self::ParentOf => "parentOf",
            Self::References => "references",
            Self::Causes => "causes",
            Self::Resolves => "resolves",
            Self::Duplicates => "duplicates",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "relatedTo" => Self::RelatedTo,
            "blockedBy" => Self::BlockedBy,
            "implements" => Self::Implements,
            "supersedes" => Self::Supersedes,
            "dependsOn" => Self::DependsOn,
            "parentOf" => Self::ParentOf,
            "references" => Self::References,
            "causes" => Self::Causes,
            "resolves" => Self::Resolves,
            "duplicates" => Self::Duplicates,
            _ => return None,
        })
    }

    /// Symmetric kinds are indexed in both directions.
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::RelatedTo | Self::Duplicates)
    }
}

/// Generates `CHECKPOINT-<13-digit-unix-ms>-<6-hex-counter>` ids, sortable
/// lexicographically. The 24-bit counter wraps at 0xFFFFFF and is seeded
/// randomly per process.
pub struct CheckpointIdGenerator {
    counter: AtomicU32,
}

impl Default for CheckpointIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU32::new(rand::random::<u32>() & 0xFF_FFFF),
        }
    }

    pub fn next(&self) -> String {
        let count = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some((c + 1) & 0xFF_FFFF)
            })
            .unwrap_or(0);
        let now = crate::workspace::registry::now_ms();
        format!("CHECKPOINT-{now:013}-{count:06x}")
    }
}
