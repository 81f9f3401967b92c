//! The workspace indexing pipeline: walking, reading, symbol extraction,
//! and emission into the lexical index and the symbol database.

pub mod extractor;
pub mod pipeline;
pub mod walker;

pub use extractor::{ExtractorOutput, SymbolExtractor};
pub use pipeline::{IndexStats, IndexingPipeline, WorkspaceHandles};
pub use walker::FileWalker;
