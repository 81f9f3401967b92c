//! SQLite-backed store of files, symbols, identifiers, and relationships.
//!
//! One database file per workspace. All per-file mutations run inside a
//! single transaction so the file row, its symbols, and its identifiers stay
//! consistent as a unit. Call-path traversal is expressed as recursive CTEs
//! with a depth cap and pipe-delimited path strings for cycle detection.

use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::types::{FileRecord, Identifier, IdentifierKind, Symbol, SymbolKind, SymbolRelation};

use super::glob::GlobMatcher;

/// Bumped when the table layout changes; a mismatch is fatal for the
/// workspace and the caller rebuilds.
pub const SCHEMA_VERSION: i64 = 3;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    path            TEXT PRIMARY KEY,
    content         TEXT NOT NULL,
    language        TEXT NOT NULL,
    size            INTEGER NOT NULL,
    last_modified   INTEGER NOT NULL,
    content_hash    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS symbols (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,
    language    TEXT NOT NULL,
    file_path   TEXT NOT NULL,
    start_line  INTEGER NOT NULL,
    start_col   INTEGER NOT NULL,
    end_line    INTEGER NOT NULL,
    end_col     INTEGER NOT NULL,
    signature   TEXT,
    parent_id   TEXT
);
CREATE INDEX IF NOT EXISTS idx_symbols_name        ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_symbols_name_folded ON symbols(LOWER(name));
CREATE INDEX IF NOT EXISTS idx_symbols_file        ON symbols(file_path);
CREATE INDEX IF NOT EXISTS idx_symbols_kind        ON symbols(kind);

CREATE TABLE IF NOT EXISTS identifiers (
    id                    TEXT PRIMARY KEY,
    name                  TEXT NOT NULL,
    kind                  TEXT NOT NULL,
    language              TEXT NOT NULL,
    file_path             TEXT NOT NULL,
    start_line            INTEGER NOT NULL,
    start_col             INTEGER NOT NULL,
    end_line              INTEGER NOT NULL,
    end_col               INTEGER NOT NULL,
    code_context          TEXT,
    containing_symbol_id  TEXT,
    target_symbol_id      TEXT,
    confidence            REAL NOT NULL DEFAULT 1.0
);
CREATE INDEX IF NOT EXISTS idx_identifiers_name        ON identifiers(name);
CREATE INDEX IF NOT EXISTS idx_identifiers_name_folded ON identifiers(LOWER(name));
CREATE INDEX IF NOT EXISTS idx_identifiers_file        ON identifiers(file_path);
CREATE INDEX IF NOT EXISTS idx_identifiers_containing  ON identifiers(containing_symbol_id);
CREATE INDEX IF NOT EXISTS idx_identifiers_kind        ON identifiers(kind);

CREATE TABLE IF NOT EXISTS relationships (
    from_id TEXT NOT NULL,
    to_id   TEXT NOT NULL,
    kind    TEXT NOT NULL,
    PRIMARY KEY (from_id, to_id, kind)
);

CREATE TABLE IF NOT EXISTS symbol_embeddings (
    symbol_id TEXT PRIMARY KEY,
    vector    BLOB NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(path, content);
"#;

/// One flat row of a call-path traversal. The caller reconstructs hierarchy
/// from `depth` alone.
#[derive(Debug, Clone)]
pub struct CallPathRow {
    pub identifier: Identifier,
    pub containing_symbol: Option<Symbol>,
    pub target_symbol: Option<Symbol>,
    pub depth: u32,
}

/// Per-workspace symbol database handle.
///
/// The connection is not shared: the owning coordinator serializes writes,
/// readers get their own snapshot through SQLite WAL.
pub struct SymbolDb {
    conn: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for SymbolDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolDb").field("path", &self.path).finish()
    }
}

impl SymbolDb {
    /// Open or create the database at `path` and verify the schema version.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        match found {
            0 => {
                conn.execute_batch(SCHEMA_SQL)?;
                conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            }
            v if v == SCHEMA_VERSION => {
                // Re-running the batch is a no-op thanks to IF NOT EXISTS,
                // and repairs a half-created database.
                conn.execute_batch(SCHEMA_SQL)?;
            }
            v => {
                return Err(EngineError::SchemaMismatch {
                    found: v,
                    expected: SCHEMA_VERSION,
                });
            }
        }

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replace everything known about one file in a single transaction.
    ///
    /// Embeddings whose symbol still exists under the same
    /// (name, kind, signature) are carried over so a touched file does not
    /// lose its semantic index.
    pub fn upsert_file_symbols(
        &mut self,
        file: &FileRecord,
        symbols: &[Symbol],
        identifiers: &[Identifier],
        relations: &[SymbolRelation],
    ) -> EngineResult<()> {
        let tx = self.conn.transaction()?;

        // Stash embeddings of the outgoing symbols, keyed by identity that
        // survives a re-extraction at a shifted location.
        let mut preserved: HashMap<(String, String, Option<String>), Vec<u8>> = HashMap::new();
        {
            let mut stmt = tx.prepare(
                "SELECT s.name, s.kind, s.signature, e.vector
                 FROM symbols s
                 JOIN symbol_embeddings e ON e.symbol_id = s.id
                 WHERE s.file_path = ?1",
            )?;
            let rows = stmt.query_map(params![file.path], |row| {
                Ok((
                    (row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get(2)?),
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?;
            for row in rows {
                let (key, vector) = row?;
                preserved.insert(key, vector);
            }
        }

        tx.execute(
            "DELETE FROM symbol_embeddings WHERE symbol_id IN
             (SELECT id FROM symbols WHERE file_path = ?1)",
            params![file.path],
        )?;
        tx.execute(
            "DELETE FROM relationships WHERE from_id IN
               (SELECT id FROM symbols WHERE file_path = ?1)
             OR to_id IN (SELECT id FROM symbols WHERE file_path = ?1)",
            params![file.path],
        )?;
        tx.execute("DELETE FROM identifiers WHERE file_path = ?1", params![file.path])?;
        tx.execute("DELETE FROM symbols WHERE file_path = ?1", params![file.path])?;
        tx.execute("DELETE FROM files WHERE path = ?1", params![file.path])?;
        tx.execute("DELETE FROM files_fts WHERE path = ?1", params![file.path])?;

        tx.execute(
            "INSERT INTO files (path, content, language, size, last_modified, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file.path,
                file.content,
                file.language,
                file.size_bytes,
                file.last_modified_ms,
                file.content_hash
            ],
        )?;
        tx.execute(
            "INSERT INTO files_fts (path, content) VALUES (?1, ?2)",
            params![file.path, file.content],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO symbols
                 (id, name, kind, language, file_path, start_line, start_col,
                  end_line, end_col, signature, parent_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for sym in symbols {
                stmt.execute(params![
                    sym.id,
                    sym.name,
                    sym.kind.as_str(),
                    sym.language,
                    sym.file_path,
                    sym.start_line,
                    sym.start_col,
                    sym.end_line,
                    sym.end_col,
                    sym.signature,
                    sym.parent_id,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO identifiers
                 (id, name, kind, language, file_path, start_line, start_col,
                  end_line, end_col, code_context, containing_symbol_id,
                  target_symbol_id, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for ident in identifiers {
                stmt.execute(params![
                    ident.id,
                    ident.name,
                    ident.kind.as_str(),
                    ident.language,
                    ident.file_path,
                    ident.start_line,
                    ident.start_col,
                    ident.end_line,
                    ident.end_col,
                    ident.code_context,
                    ident.containing_symbol_id,
                    ident.target_symbol_id,
                    ident.confidence,
                ])?;
            }
        }

        {
            // Relationships require both endpoints; edges into files not yet
            // indexed are skipped and picked up on the next upsert of the
            // referencing file.
            let mut exists = tx.prepare("SELECT 1 FROM symbols WHERE id = ?1")?;
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO relationships (from_id, to_id, kind)
                 VALUES (?1, ?2, ?3)",
            )?;
            for rel in relations {
                let from_ok: Option<i64> =
                    exists.query_row(params![rel.from_id], |r| r.get(0)).optional()?;
                let to_ok: Option<i64> =
                    exists.query_row(params![rel.to_id], |r| r.get(0)).optional()?;
                if from_ok.is_some() && to_ok.is_some() {
                    insert.execute(params![rel.from_id, rel.to_id, rel.kind.as_str()])?;
                } else {
                    debug!(
                        "skipping relationship {} -> {} ({}): endpoint not indexed",
                        rel.from_id,
                        rel.to_id,
                        rel.kind.as_str()
                    );
                }
            }
        }

        {
            let mut restore = tx.prepare(
                "INSERT OR REPLACE INTO symbol_embeddings (symbol_id, vector)
                 VALUES (?1, ?2)",
            )?;
            for sym in symbols {
                let key = (sym.name.clone(), sym.kind.as_str().to_string(), sym.signature.clone());
                if let Some(vector) = preserved.get(&key) {
                    restore.execute(params![sym.id, vector])?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Remove a file and everything derived from it.
    pub fn delete_file(&mut self, path: &str) -> EngineResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM symbol_embeddings WHERE symbol_id IN
             (SELECT id FROM symbols WHERE file_path = ?1)",
            params![path],
        )?;
        tx.execute(
            "DELETE FROM relationships WHERE from_id IN
               (SELECT id FROM symbols WHERE file_path = ?1)
             OR to_id IN (SELECT id FROM symbols WHERE file_path = ?1)",
            params![path],
        )?;
        tx.execute("DELETE FROM identifiers WHERE file_path = ?1", params![path])?;
        tx.execute("DELETE FROM symbols WHERE file_path = ?1", params![path])?;
        tx.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        tx.execute("DELETE FROM files_fts WHERE path = ?1", params![path])?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_file(&self, path: &str) -> EngineResult<Option<FileRecord>> {
        self.conn
            .query_row(
                "SELECT path, content, language, size, last_modified, content_hash
                 FROM files WHERE path = ?1",
                params![path],
                |row| {
                    Ok(FileRecord {
                        path: row.get(0)?,
                        content: row.get(1)?,
                        language: row.get(2)?,
                        size_bytes: row.get(3)?,
                        last_modified_ms: row.get(4)?,
                        content_hash: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn file_count(&self) -> EngineResult<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?)
    }

    pub fn symbol_count(&self) -> EngineResult<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?)
    }

    pub fn find_symbol_by_id(&self, id: &str) -> EngineResult<Option<Symbol>> {
        self.conn
            .query_row(
                &format!("SELECT {SYMBOL_COLS} FROM symbols WHERE id = ?1"),
                params![id],
                symbol_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn find_symbols_by_name(
        &self,
        name: &str,
        case_sensitive: bool,
    ) -> EngineResult<Vec<Symbol>> {
        let sql = if case_sensitive {
            format!("SELECT {SYMBOL_COLS} FROM symbols WHERE name = ?1 ORDER BY file_path, start_line")
        } else {
            format!(
                "SELECT {SYMBOL_COLS} FROM symbols WHERE LOWER(name) = LOWER(?1)
                 ORDER BY file_path, start_line"
            )
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![name], symbol_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn symbols_for_file(&self, path: &str) -> EngineResult<Vec<Symbol>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SYMBOL_COLS} FROM symbols WHERE file_path = ?1 ORDER BY start_line"
        ))?;
        let rows = stmt.query_map(params![path], symbol_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All usage occurrences of a name, optionally restricted by kind.
    pub fn find_identifiers_by_name(
        &self,
        name: &str,
        kind: Option<IdentifierKind>,
        case_sensitive: bool,
    ) -> EngineResult<Vec<Identifier>> {
        let name_clause = if case_sensitive {
            "name = ?1"
        } else {
            "LOWER(name) = LOWER(?1)"
        };
        let (kind_clause, kind_param) = match kind {
            Some(k) => (" AND kind = ?2", Some(k.as_str())),
            None => ("", None),
        };
        let sql = format!(
            "SELECT {IDENT_COLS} FROM identifiers
             WHERE {name_clause}{kind_clause}
             ORDER BY file_path, start_line"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match kind_param {
            Some(k) => stmt.query_map(params![name, k], identifier_from_row)?,
            None => stmt.query_map(params![name], identifier_from_row)?,
        };
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Paths of indexed files matching a glob pattern.
    pub fn search_files_by_pattern(&self, pattern: &str) -> EngineResult<Vec<String>> {
        let matcher = GlobMatcher::compile(pattern)?;
        let mut stmt = self.conn.prepare("SELECT path FROM files ORDER BY path")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut matches = Vec::new();
        for row in rows {
            let path = row?;
            if matcher.is_match(&path) {
                matches.push(path);
            }
        }
        Ok(matches)
    }

    /// Fast grep over file contents via FTS5. Returns (path, snippet) pairs.
    pub fn search_file_content(
        &self,
        query: &str,
        limit: usize,
    ) -> EngineResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, snippet(files_fts, 1, '[', ']', '…', 12)
             FROM files_fts WHERE files_fts MATCH ?1
             ORDER BY rank LIMIT ?2",
        )?;
        // The raw query is kept out of error messages.
        let rows = stmt
            .query_map(params![query, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|_| EngineError::InvalidArgument {
                reason: "full-text query could not be parsed".into(),
            })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|_| EngineError::InvalidArgument {
                reason: "full-text query could not be parsed".into(),
            })?);
        }
        Ok(out)
    }

    /// Who calls `name`: walk identifier → containing symbol → identifiers of
    /// the same name, up to `max_depth` levels.
    pub fn trace_upward(
        &self,
        name: &str,
        max_depth: u32,
        case_sensitive: bool,
    ) -> EngineResult<Vec<CallPathRow>> {
        let name_match = if case_sensitive {
            "i.name = ?1"
        } else {
            "LOWER(i.name) = LOWER(?1)"
        };
        let sql = format!(
            r#"
            WITH RECURSIVE walk(identifier_id, depth, path) AS (
                SELECT i.id, 0, '|' || i.id || '|'
                FROM identifiers i
                WHERE i.kind = 'call' AND {name_match}
                UNION ALL
                SELECT nxt.id, walk.depth + 1, walk.path || nxt.id || '|'
                FROM walk
                JOIN identifiers cur ON cur.id = walk.identifier_id
                JOIN symbols enclosing ON enclosing.id = cur.containing_symbol_id
                JOIN identifiers nxt
                  ON nxt.kind = 'call' AND nxt.name = enclosing.name
                WHERE walk.depth + 1 < ?2
                  AND instr(walk.path, '|' || nxt.id || '|') = 0
            )
            {CALLPATH_SELECT}
            "#
        );
        self.run_callpath_query(&sql, name, max_depth)
    }

    /// What `name` calls: seed with identifiers contained in symbols named
    /// `name`, then follow each identifier to its target symbol's body.
    pub fn trace_downward(
        &self,
        name: &str,
        max_depth: u32,
        case_sensitive: bool,
    ) -> EngineResult<Vec<CallPathRow>> {
        let name_match = if case_sensitive {
            "s.name = ?1"
        } else {
            "LOWER(s.name) = LOWER(?1)"
        };
        let sql = format!(
            r#"
            WITH RECURSIVE walk(identifier_id, depth, path) AS (
                SELECT i.id, 0, '|' || i.id || '|'
                FROM identifiers i
                JOIN symbols s ON s.id = i.containing_symbol_id
                WHERE i.kind = 'call' AND {name_match}
                UNION ALL
                SELECT nxt.id, walk.depth + 1, walk.path || nxt.id || '|'
                FROM walk
                JOIN identifiers cur ON cur.id = walk.identifier_id
                JOIN symbols callee
                  ON callee.id = cur.target_symbol_id
                  OR (cur.target_symbol_id IS NULL
                      AND callee.name = cur.name
                      AND callee.kind IN ('function', 'method'))
                JOIN identifiers nxt
                  ON nxt.containing_symbol_id = callee.id AND nxt.kind = 'call'
                WHERE walk.depth + 1 < ?2
                  AND instr(walk.path, '|' || nxt.id || '|') = 0
            )
            {CALLPATH_SELECT}
            "#
        );
        self.run_callpath_query(&sql, name, max_depth)
    }

    fn run_callpath_query(
        &self,
        sql: &str,
        name: &str,
        max_depth: u32,
    ) -> EngineResult<Vec<CallPathRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![name, max_depth], callpath_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Pick the best definition among same-name candidates for a downward
    /// trace start: prefer non-interface files with a real body, else the
    /// widest line span.
    pub fn select_best_implementation(&self, name: &str) -> EngineResult<Option<Symbol>> {
        let candidates = self.find_symbols_by_name(name, true)?;
        if candidates.len() <= 1 {
            return Ok(candidates.into_iter().next());
        }

        let implementation = candidates
            .iter()
            .filter(|sym| !is_interface_file(&sym.file_path) && sym.line_span() >= 3)
            .max_by_key(|sym| sym.line_span())
            .cloned();

        Ok(implementation.or_else(|| {
            candidates
                .into_iter()
                .max_by_key(|sym| sym.line_span())
        }))
    }

    /// Run an integrity check; false signals corruption and the caller
    /// should clear and rebuild.
    pub fn check_integrity(&self) -> EngineResult<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if result != "ok" {
            warn!("integrity check failed for {}: {result}", self.path.display());
        }
        Ok(result == "ok")
    }
}

/// Interface-file heuristic: filename starts with `I` followed by another
/// uppercase letter (IFoo.cs, IUserService.ts).
fn is_interface_file(path: &str) -> bool {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let mut chars = name.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('I'), Some(second)) if second.is_ascii_uppercase()
    )
}

const SYMBOL_COLS: &str = "id, name, kind, language, file_path, start_line, start_col, \
                           end_line, end_col, signature, parent_id";

const IDENT_COLS: &str = "id, name, kind, language, file_path, start_line, start_col, \
                          end_line, end_col, code_context, containing_symbol_id, \
                          target_symbol_id, confidence";

const CALLPATH_SELECT: &str = r#"
SELECT i.id, i.name, i.kind, i.language, i.file_path, i.start_line, i.start_col,
       i.end_line, i.end_col, i.code_context, i.containing_symbol_id,
       i.target_symbol_id, i.confidence,
       MIN(walk.depth) AS depth,
       cs.id, cs.name, cs.kind, cs.language, cs.file_path, cs.start_line,
       cs.start_col, cs.end_line, cs.end_col, cs.signature, cs.parent_id,
       ts.id, ts.name, ts.kind, ts.language, ts.file_path, ts.start_line,
       ts.start_col, ts.end_line, ts.end_col, ts.signature, ts.parent_id
FROM walk
JOIN identifiers i ON i.id = walk.identifier_id
LEFT JOIN symbols cs ON cs.id = i.containing_symbol_id
LEFT JOIN symbols ts ON ts.id = i.target_symbol_id
GROUP BY i.id
ORDER BY depth ASC, i.file_path ASC
"#;

fn symbol_from_row(row: &Row<'_>) -> rusqlite::Result<Symbol> {
    let kind_str: String = row.get(2)?;
    Ok(Symbol {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: SymbolKind::parse(&kind_str).unwrap_or(SymbolKind::Function),
        language: row.get(3)?,
        file_path: row.get(4)?,
        start_line: row.get(5)?,
        start_col: row.get(6)?,
        end_line: row.get(7)?,
        end_col: row.get(8)?,
        signature: row.get(9)?,
        parent_id: row.get(10)?,
    })
}

/// Read a symbol starting at column `base`; returns None when the id column
/// is NULL (unmatched LEFT JOIN).
fn symbol_from_row_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Option<Symbol>> {
    let id: Option<String> = row.get(base)?;
    let Some(id) = id else {
        return Ok(None);
    };
    let kind_str: String = row.get(base + 2)?;
    Ok(Some(Symbol {
        id,
        name: row.get(base + 1)?,
        kind: SymbolKind::parse(&kind_str).unwrap_or(SymbolKind::Function),
        language: row.get(base + 3)?,
        file_path: row.get(base + 4)?,
        start_line: row.get(base + 5)?,
        start_col: row.get(base + 6)?,
        end_line: row.get(base + 7)?,
        end_col: row.get(base + 8)?,
        signature: row.get(base + 9)?,
        parent_id: row.get(base + 10)?,
    }))
}

fn identifier_from_row(row: &Row<'_>) -> rusqlite::Result<Identifier> {
    let kind_str: String = row.get(2)?;
    Ok(Identifier {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: IdentifierKind::parse(&kind_str).unwrap_or(IdentifierKind::Call),
        language: row.get(3)?,
        file_path: row.get(4)?,
        start_line: row.get(5)?,
        start_col: row.get(6)?,
        end_line: row.get(7)?,
        end_col: row.get(8)?,
        code_context: row.get(9)?,
        containing_symbol_id: row.get(10)?,
        target_symbol_id: row.get(11)?,
        confidence: row.get(12)?,
    })
}

fn callpath_from_row(row: &Row<'_>) -> rusqlite::Result<CallPathRow> {
    let identifier = identifier_from_row(row)?;
    let depth: u32 = row.get(13)?;
    let containing_symbol = symbol_from_row_at(row, 14)?;
    let target_symbol = symbol_from_row_at(row, 25)?;
    Ok(CallPathRow {
        identifier,
        containing_symbol,
        target_symbol,
        depth,
    })
}
