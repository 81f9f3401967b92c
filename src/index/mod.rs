//! Per-workspace inverted-index lifecycle: schema, writer ownership,
//! batched commits, and the bounded query cache.

pub mod batch;
pub mod cache;
pub mod manager;
pub mod schema;

pub use batch::BatchIndexer;
pub use cache::QueryCache;
pub use manager::{IndexStatistics, LexicalIndexManager, TextHit, WorkspaceIndex};
pub use schema::{FileDocument, LexicalSchema, line_breaks, line_for_offset};
