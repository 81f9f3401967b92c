//! Per-workspace symbol database.
//!
//! A single-file embedded SQLite database holds files, symbols, identifiers,
//! relationships, and symbol embeddings for one workspace. Writers are
//! serialized by the owning index coordinator; SQLite's WAL mode covers
//! concurrent readers.

pub mod glob;
pub mod symbol_db;
pub mod vector;

pub use glob::GlobMatcher;
pub use symbol_db::{CallPathRow, SymbolDb, SCHEMA_VERSION};
