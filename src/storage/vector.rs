//! Symbol embedding storage and nearest-neighbor lookup.
//!
//! Vectors are little-endian f32 BLOBs in `symbol_embeddings`. Lookup is an
//! exhaustive cosine scan; at workspace scale (tens of thousands of symbols)
//! this stays comfortably under query budgets and needs no extension module.

use rusqlite::{OptionalExtension, params};

use crate::error::EngineResult;
use crate::types::Symbol;

use super::symbol_db::SymbolDb;

impl SymbolDb {
    /// Store (or replace) the embedding for a symbol.
    pub fn put_embedding(&self, symbol_id: &str, vector: &[f32]) -> EngineResult<()> {
        self.connection().execute(
            "INSERT OR REPLACE INTO symbol_embeddings (symbol_id, vector) VALUES (?1, ?2)",
            params![symbol_id, encode_vector(vector)],
        )?;
        Ok(())
    }

    pub fn embedding_for(&self, symbol_id: &str) -> EngineResult<Option<Vec<f32>>> {
        let blob: Option<Vec<u8>> = self
            .connection()
            .query_row(
                "SELECT vector FROM symbol_embeddings WHERE symbol_id = ?1",
                params![symbol_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.map(|b| decode_vector(&b)))
    }

    pub fn embedding_count(&self) -> EngineResult<u64> {
        Ok(self
            .connection()
            .query_row("SELECT COUNT(*) FROM symbol_embeddings", [], |row| row.get(0))?)
    }

    /// Symbols that have no embedding yet, up to `limit`. Returned with the
    /// text a provider should embed (name, kind, signature).
    pub fn symbols_without_embeddings(&self, limit: usize) -> EngineResult<Vec<(Symbol, String)>> {
        let mut stmt = self.connection().prepare(
            "SELECT s.id, s.name, s.kind, s.language, s.file_path, s.start_line,
                    s.start_col, s.end_line, s.end_col, s.signature, s.parent_id
             FROM symbols s
             LEFT JOIN symbol_embeddings e ON e.symbol_id = s.id
             WHERE e.symbol_id IS NULL
             ORDER BY s.file_path, s.start_line
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let kind_str: String = row.get(2)?;
            Ok(Symbol {
                id: row.get(0)?,
                name: row.get(1)?,
                kind: crate::types::SymbolKind::parse(&kind_str)
                    .unwrap_or(crate::types::SymbolKind::Function),
                language: row.get(3)?,
                file_path: row.get(4)?,
                start_line: row.get(5)?,
                start_col: row.get(6)?,
                end_line: row.get(7)?,
                end_col: row.get(8)?,
                signature: row.get(9)?,
                parent_id: row.get(10)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            let symbol = row?;
            let text = embedding_text(&symbol);
            out.push((symbol, text));
        }
        Ok(out)
    }

    /// Nearest symbols to a query vector, by cosine similarity, best first.
    /// Similarities are clamped to [0, 1]. The scan is CPU-parallel.
    pub fn nearest_symbols(
        &self,
        query: &[f32],
        k: usize,
    ) -> EngineResult<Vec<(Symbol, f32)>> {
        use rayon::prelude::*;

        let mut stmt = self.connection().prepare(
            "SELECT e.symbol_id, e.vector FROM symbol_embeddings e",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        let raw: Vec<(String, Vec<u8>)> = rows.collect::<Result<_, _>>()?;

        let mut scored: Vec<(String, f32)> = raw
            .into_par_iter()
            .filter_map(|(symbol_id, blob)| {
                let vector = decode_vector(&blob);
                if vector.len() != query.len() {
                    return None;
                }
                let similarity = cosine_similarity(query, &vector).clamp(0.0, 1.0);
                Some((symbol_id, similarity))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let mut results = Vec::with_capacity(scored.len());
        for (symbol_id, similarity) in scored {
            if let Some(symbol) = self.find_symbol_by_id(&symbol_id)? {
                results.push((symbol, similarity));
            }
        }
        Ok(results)
    }
}

/// Text handed to the embedding provider for a symbol.
pub fn embedding_text(symbol: &Symbol) -> String {
    match &symbol.signature {
        Some(sig) => format!("{} {} {}", symbol.kind.as_str(), symbol.name, sig),
        None => format!("{} {}", symbol.kind.as_str(), symbol.name),
    }
}

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors of equal length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileRecord, SymbolKind};
    use tempfile::TempDir;

    fn seeded_db() -> (TempDir, SymbolDb) {
        let dir = TempDir::new().unwrap();
        let mut db = SymbolDb::open(dir.path().join("ws.db")).unwrap();
        let file = FileRecord {
            path: "src/auth.rs".into(),
            content: "fn login() {}\nfn render() {}".into(),
            language: "rust".into(),
            size_bytes: 28,
            last_modified_ms: 0,
            content_hash: "h".into(),
        };
        let mk = |id: &str, name: &str, line: u32| Symbol {
            id: id.into(),
            name: name.into(),
            kind: SymbolKind::Function,
            language: "rust".into(),
            file_path: "src/auth.rs".into(),
            start_line: line,
            start_col: 0,
            end_line: line,
            end_col: 10,
            signature: None,
            parent_id: None,
        };
        db.upsert_file_symbols(
            &file,
            &[mk("s-login", "login", 1), mk("s-render", "render", 2)],
            &[],
            &[],
        )
        .unwrap();
        (dir, db)
    }

    #[test]
    fn vector_round_trip() {
        let v = vec![0.25, -1.5, 3.75];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn nearest_orders_by_similarity() {
        let (_dir, db) = seeded_db();
        db.put_embedding("s-login", &[1.0, 0.0, 0.0]).unwrap();
        db.put_embedding("s-render", &[0.0, 1.0, 0.0]).unwrap();

        let hits = db.nearest_symbols(&[0.9, 0.1, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.name, "login");
        assert!(hits[0].1 > hits[1].1);
        assert!((0.0..=1.0).contains(&hits[0].1));
    }

    #[test]
    fn dimension_mismatch_is_skipped() {
        let (_dir, db) = seeded_db();
        db.put_embedding("s-login", &[1.0, 0.0]).unwrap();
        db.put_embedding("s-render", &[0.0, 1.0, 0.0]).unwrap();

        let hits = db.nearest_symbols(&[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.name, "render");
    }

    #[test]
    fn missing_embeddings_listed_until_filled() {
        let (_dir, db) = seeded_db();
        assert_eq!(db.symbols_without_embeddings(10).unwrap().len(), 2);

        db.put_embedding("s-login", &[1.0]).unwrap();
        let remaining = db.symbols_without_embeddings(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0.name, "render");
        assert!(remaining[0].1.contains("render"));
    }
}
