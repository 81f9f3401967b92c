//! Error types for the code-intelligence engine.
//!
//! Errors carry a stable [`ErrorKind`] so callers (and the MCP response
//! envelope) can react by policy instead of matching on message text.

use std::path::PathBuf;
use thiserror::Error;

/// Stable error classification surfaced to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller-supplied value violates a contract. Surface immediately.
    InvalidArgument,
    /// Workspace, symbol, or file absent. Never retry.
    NotFound,
    /// Another process holds the writer lock. Caller may retry.
    IndexLocked,
    /// On-disk index structure unreadable. Clear and rebuild.
    IndexCorrupt,
    /// Writer lock older than the configured timeout; recovered automatically.
    StuckLock,
    /// SQL schema version mismatch. Fatal for the workspace; rebuild.
    SchemaMismatch,
    /// Backpressure or disk-full. Retryable after resources free up.
    ResourceExhausted,
    /// Extractor or embedding provider missing. Feature degrades.
    DependencyUnavailable,
    /// Filesystem hiccup; retried once internally before surfacing.
    TransientIo,
    /// Uncategorized. Logged with full context, operation aborted.
    Fatal,
}

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("not found: {entity}")]
    NotFound { entity: String },

    #[error("index at '{path}' is locked by another process")]
    IndexLocked { path: PathBuf },

    #[error("index at '{path}' is corrupt: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("stuck writer lock at '{path}' (age {age_secs}s); index was cleared")]
    StuckLock { path: PathBuf, age_secs: u64 },

    #[error("symbol database schema version {found}, expected {expected}")]
    SchemaMismatch { found: i64, expected: i64 },

    #[error("resource exhausted: {reason}")]
    ResourceExhausted { reason: String },

    #[error("{dependency} unavailable: {reason}")]
    DependencyUnavailable { dependency: String, reason: String },

    #[error("failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("registry save failed: {reason}")]
    RegistrySave { reason: String },

    #[error("full-text index operation '{operation}' failed: {cause}")]
    Lexical { operation: String, cause: String },

    #[error("symbol database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Fatal(String),
}

impl EngineError {
    /// Classify into the stable taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::IndexLocked { .. } => ErrorKind::IndexLocked,
            Self::IndexCorrupt { .. } => ErrorKind::IndexCorrupt,
            Self::StuckLock { .. } => ErrorKind::StuckLock,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            Self::FileRead { .. } | Self::FileWrite { .. } | Self::Io(_) => ErrorKind::TransientIo,
            Self::Database(e) => match e {
                rusqlite::Error::SqliteFailure(code, _)
                    if code.code == rusqlite::ErrorCode::DatabaseCorrupt
                        || code.code == rusqlite::ErrorCode::NotADatabase =>
                {
                    ErrorKind::IndexCorrupt
                }
                _ => ErrorKind::Fatal,
            },
            Self::RegistrySave { .. } | Self::Lexical { .. } | Self::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Advisory strings surfaced to tool callers alongside the error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self.kind() {
            ErrorKind::NotFound => vec![
                "Index the workspace containing this path first",
                "Check the workspace list for registered roots",
            ],
            ErrorKind::IndexLocked => vec![
                "Another indexer is running; retry once it finishes",
                "If no other process exists, wait for the lock timeout and retry",
            ],
            ErrorKind::IndexCorrupt | ErrorKind::SchemaMismatch => vec![
                "Re-index the workspace to rebuild from scratch",
                "Check for disk errors in the index directory",
            ],
            ErrorKind::ResourceExhausted => vec![
                "Retry once memory pressure drops",
                "Lower batch.size or memory_limits.max_indexing_concurrency",
            ],
            ErrorKind::DependencyUnavailable => vec![
                "Configure extractor.command / embedding.endpoint in settings",
                "Lexical features keep working while the dependency is absent",
            ],
            ErrorKind::TransientIo => vec!["Retry the operation; the filesystem may have hiccuped"],
            _ => vec![],
        }
    }

    /// True when the caller can meaningfully retry without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::IndexLocked | ErrorKind::ResourceExhausted | ErrorKind::TransientIo
        )
    }
}

impl From<tantivy::TantivyError> for EngineError {
    fn from(e: tantivy::TantivyError) -> Self {
        match e {
            tantivy::TantivyError::LockFailure(_, _) => Self::IndexLocked {
                path: PathBuf::new(),
            },
            other => Self::Lexical {
                operation: "tantivy".to_string(),
                cause: other.to_string(),
            },
        }
    }
}

impl From<tantivy::directory::error::OpenDirectoryError> for EngineError {
    fn from(e: tantivy::directory::error::OpenDirectoryError) -> Self {
        Self::Lexical {
            operation: "tantivy".to_string(),
            cause: e.to_string(),
        }
    }
}

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_policy() {
        let locked = EngineError::IndexLocked {
            path: PathBuf::from("/idx"),
        };
        assert_eq!(locked.kind(), ErrorKind::IndexLocked);
        assert!(locked.is_retryable());

        let schema = EngineError::SchemaMismatch {
            found: 1,
            expected: 2,
        };
        assert_eq!(schema.kind(), ErrorKind::SchemaMismatch);
        assert!(!schema.is_retryable());
    }

    #[test]
    fn suggestions_exist_for_user_facing_kinds() {
        let nf = EngineError::NotFound {
            entity: "workspace /tmp/wx".into(),
        };
        assert!(!nf.recovery_suggestions().is_empty());
    }
}
