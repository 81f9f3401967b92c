//! Lexical document schema for the inverted index.
//!
//! One document per file. `id` doubles as the delete/update term; stored
//! `line_breaks` (byte offsets of every `\n`) let hit offsets be mapped back
//! to line numbers without re-reading the file.

use tantivy::schema::{
    FAST, Field, IndexRecordOption, STORED, STRING, Schema, SchemaBuilder, TextFieldIndexing,
    TextOptions,
};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer};
use tantivy::{Index, TantivyDocument as Document};

/// Tokenizer registered for code-friendly fields: split on non-alphanumeric,
/// lowercase. Underscore-joined and dotted names decompose into parts.
pub const CODE_TOKENIZER: &str = "code";

/// Schema fields for the per-file document index.
#[derive(Debug, Clone)]
pub struct LexicalSchema {
    pub id: Field,
    pub path: Field,
    pub filename: Field,
    pub extension: Field,
    pub content: Field,
    pub content_literal: Field,
    pub content_code: Field,
    pub content_symbols: Field,
    pub line_breaks: Field,
    pub size: Field,
    pub modified: Field,
}

impl LexicalSchema {
    pub fn build() -> (Schema, LexicalSchema) {
        let mut builder = SchemaBuilder::default();

        let id = builder.add_text_field("id", STRING | STORED);
        let path = builder.add_text_field("path", STRING | STORED);

        let text_with_positions = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("default")
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();
        let code_indexing = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(CODE_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );

        let filename = builder.add_text_field("filename", text_with_positions.clone());
        let extension = builder.add_text_field("extension", STRING | STORED);
        let content = builder.add_text_field("content", text_with_positions);
        // Raw field for exact / special-character matches.
        let content_literal = builder.add_text_field("content_literal", STRING);
        let content_code = builder.add_text_field("content_code", code_indexing.clone());
        let content_symbols = builder.add_text_field("content_symbols", code_indexing);
        let line_breaks = builder.add_text_field("line_breaks", STORED);
        let size = builder.add_u64_field("size", STORED);
        let modified = builder.add_u64_field("modified", STORED | FAST);

        let schema = builder.build();
        let lexical = LexicalSchema {
            id,
            path,
            filename,
            extension,
            content,
            content_literal,
            content_code,
            content_symbols,
            line_breaks,
            size,
            modified,
        };
        (schema, lexical)
    }
}

/// Register the code tokenizer on a freshly opened index.
pub fn register_tokenizers(index: &Index) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(CODE_TOKENIZER, analyzer);
}

/// Input for one lexical document.
#[derive(Debug, Clone)]
pub struct FileDocument {
    /// Workspace-relative path; also the document id.
    pub path: String,
    pub content: String,
    pub symbols: Vec<String>,
    pub size_bytes: u64,
    pub modified_ms: u64,
}

impl FileDocument {
    /// Build the tantivy document, precomputing `line_breaks`.
    pub fn into_document(self, schema: &LexicalSchema) -> Document {
        let filename = self
            .path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.path)
            .to_string();
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let breaks = line_breaks(&self.content);
        let breaks_json =
            serde_json::to_string(&breaks).unwrap_or_else(|_| "[]".to_string());

        let mut doc = Document::new();
        doc.add_text(schema.id, &self.path);
        doc.add_text(schema.path, &self.path);
        doc.add_text(schema.filename, &filename);
        doc.add_text(schema.extension, &extension);
        doc.add_text(schema.content, &self.content);
        doc.add_text(schema.content_literal, &self.content);
        doc.add_text(schema.content_code, &self.content);
        for symbol in &self.symbols {
            doc.add_text(schema.content_symbols, symbol);
        }
        doc.add_text(schema.line_breaks, &breaks_json);
        doc.add_u64(schema.size, self.size_bytes);
        doc.add_u64(schema.modified, self.modified_ms);
        doc
    }
}

/// Byte offsets of every `\n` in the content.
pub fn line_breaks(content: &str) -> Vec<usize> {
    content
        .bytes()
        .enumerate()
        .filter(|(_, b)| *b == b'\n')
        .map(|(i, _)| i)
        .collect()
}

/// Map a byte offset to a 1-based line number through precomputed breaks.
pub fn line_for_offset(breaks: &[usize], offset: usize) -> u32 {
    // partition_point counts the line breaks strictly before the offset.
    breaks.partition_point(|&b| b < offset) as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_breaks_positions() {
        assert_eq!(line_breaks("hello world\nfoo"), vec![11]);
        assert_eq!(line_breaks("a\nb\nc"), vec![1, 3]);
        assert!(line_breaks("no newline").is_empty());
    }

    #[test]
    fn offsets_map_to_lines() {
        let content = "hello world\nfoo\nbar";
        let breaks = line_breaks(content);
        assert_eq!(line_for_offset(&breaks, 0), 1);
        assert_eq!(line_for_offset(&breaks, 10), 1);
        // The byte *at* a break belongs to the line it terminates.
        assert_eq!(line_for_offset(&breaks, 11), 1);
        assert_eq!(line_for_offset(&breaks, 12), 2);
        assert_eq!(line_for_offset(&breaks, content.len() - 1), 3);
    }

    #[test]
    fn line_mapping_brackets_offsets_between_breaks() {
        // For any offset o on line L: the break ending line L-1 sits before
        // o, and the break ending line L sits at or after it.
        let content = "alpha\nbeta\ngamma\ndelta";
        let breaks = line_breaks(content);
        for (offset, _) in content.char_indices() {
            let line = line_for_offset(&breaks, offset) as usize;
            if line >= 2 {
                assert!(breaks[line - 2] < offset);
            }
            if line - 1 < breaks.len() {
                assert!(breaks[line - 1] >= offset);
            }
        }
    }

    #[test]
    fn document_fields_derive_from_path() {
        let (_schema, lexical) = LexicalSchema::build();
        let doc = FileDocument {
            path: "src/util/helpers.rs".into(),
            content: "fn help() {}\n".into(),
            symbols: vec!["help".into()],
            size_bytes: 13,
            modified_ms: 1,
        }
        .into_document(&lexical);

        use tantivy::schema::Value;
        let filename = doc
            .get_first(lexical.filename)
            .and_then(|v| v.as_str())
            .unwrap();
        assert_eq!(filename, "helpers.rs");
        let ext = doc
            .get_first(lexical.extension)
            .and_then(|v| v.as_str())
            .unwrap();
        assert_eq!(ext, "rs");
        let breaks: Vec<usize> = serde_json::from_str(
            doc.get_first(lexical.line_breaks)
                .and_then(|v| v.as_str())
                .unwrap(),
        )
        .unwrap();
        assert_eq!(breaks, vec![12]);
    }
}
