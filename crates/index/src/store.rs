//! SQLite FTS5 local document store (§4.7).

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::sanitize::sanitize_query;

const ALLOWED_TOKENIZERS: &[&str] = &["unicode61", "ascii", "porter", "trigram"];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub doc_id: i64,
    pub url: String,
    pub title: String,
    pub text: String,
    pub language: Option<String>,
    pub raw_html_hash: String,
    pub text_hash: String,
    pub crawled_at: f64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub recrawl_interval_secs: i64,
    pub stale_count: i64,
    pub last_recrawl_at: Option<f64>,
    pub change_frequency: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
    pub doc_id: i64,
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    pub language: Option<String>,
    pub crawled_at: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SearchFilters<'a> {
    pub language: Option<&'a str>,
    pub date_from: Option<f64>,
    pub date_to: Option<f64>,
    pub include_domains: Option<&'a [&'a str]>,
    pub exclude_domains: Option<&'a [&'a str]>,
}

/// Exported row shape used by the snapshot format (§4.7).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportedDocument {
    pub url: String,
    pub title: String,
    pub text: String,
    pub language: Option<String>,
    pub raw_html_hash: String,
    pub text_hash: String,
    pub crawled_at: f64,
}

/// SQLite FTS5 backed document store. A single connection owned behind a
/// mutex; WAL mode allows external readers to coexist with this writer.
pub struct LocalStore {
    conn: Mutex<Connection>,
    compression_enabled: bool,
    compression_level: i32,
}

impl LocalStore {
    pub fn open(path: &str, tokenizer: &str, compression_enabled: bool, compression_level: i32) -> IndexResult<Self> {
        if !ALLOWED_TOKENIZERS.contains(&tokenizer) {
            return Err(IndexError::InvalidTokenizer(tokenizer.to_owned()));
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn, tokenizer)?;
        Ok(Self {
            conn: Mutex::new(conn),
            compression_enabled,
            compression_level,
        })
    }

    pub fn open_in_memory(tokenizer: &str) -> IndexResult<Self> {
        if !ALLOWED_TOKENIZERS.contains(&tokenizer) {
            return Err(IndexError::InvalidTokenizer(tokenizer.to_owned()));
        }
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn, tokenizer)?;
        Ok(Self {
            conn: Mutex::new(conn),
            compression_enabled: false,
            compression_level: 3,
        })
    }

    fn init_schema(conn: &Connection, tokenizer: &str) -> IndexResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS documents (
                doc_id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                text TEXT NOT NULL,
                compressed_text BLOB,
                language TEXT,
                raw_html_hash TEXT NOT NULL DEFAULT '',
                text_hash TEXT UNIQUE NOT NULL,
                crawled_at REAL NOT NULL,
                etag TEXT,
                last_modified TEXT,
                recrawl_interval INTEGER DEFAULT 604800,
                stale_count INTEGER DEFAULT 0,
                last_recrawl_at REAL,
                change_frequency REAL DEFAULT 0.0
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
                title, text,
                content='documents',
                content_rowid='doc_id',
                tokenize='{tokenizer}'
            );

            CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
                INSERT INTO documents_fts(rowid, title, text) VALUES (new.doc_id, new.title, new.text);
            END;
            CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
                INSERT INTO documents_fts(documents_fts, rowid, title, text)
                VALUES ('delete', old.doc_id, old.title, old.text);
            END;
            CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
                INSERT INTO documents_fts(documents_fts, rowid, title, text)
                VALUES ('delete', old.doc_id, old.title, old.text);
                INSERT INTO documents_fts(rowid, title, text) VALUES (new.doc_id, new.title, new.text);
            END;"
        ))?;
        Self::migrate_schema(conn)?;
        Ok(())
    }

    /// Additive, idempotent migration: only missing columns are added.
    fn migrate_schema(conn: &Connection) -> IndexResult<()> {
        let mut stmt = conn.prepare("PRAGMA table_info(documents)")?;
        let existing: std::collections::HashSet<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(Result::ok)
            .collect();

        let migrations: &[(&str, &str)] = &[
            ("compressed_text", "ALTER TABLE documents ADD COLUMN compressed_text BLOB"),
            (
                "raw_html_hash",
                "ALTER TABLE documents ADD COLUMN raw_html_hash TEXT NOT NULL DEFAULT ''",
            ),
            ("etag", "ALTER TABLE documents ADD COLUMN etag TEXT"),
            ("last_modified", "ALTER TABLE documents ADD COLUMN last_modified TEXT"),
            (
                "recrawl_interval",
                "ALTER TABLE documents ADD COLUMN recrawl_interval INTEGER DEFAULT 604800",
            ),
            ("stale_count", "ALTER TABLE documents ADD COLUMN stale_count INTEGER DEFAULT 0"),
            ("last_recrawl_at", "ALTER TABLE documents ADD COLUMN last_recrawl_at REAL"),
            (
                "change_frequency",
                "ALTER TABLE documents ADD COLUMN change_frequency REAL DEFAULT 0.0",
            ),
        ];
        for (column, ddl) in migrations {
            if !existing.contains(*column) {
                conn.execute(ddl, [])?;
                tracing::info!(column, "schema_migrated");
            }
        }
        Ok(())
    }

    fn compress(&self, text: &str) -> Option<Vec<u8>> {
        if !self.compression_enabled {
            return None;
        }
        infomesh_primitives::hash::compress(text.as_bytes(), self.compression_level).ok()
    }

    fn decompress(&self, compressed: Option<Vec<u8>>, fallback: String) -> String {
        match compressed {
            Some(bytes) => infomesh_primitives::hash::decompress(&bytes)
                .ok()
                .and_then(|b| String::from_utf8(b).ok())
                .unwrap_or(fallback),
            None => fallback,
        }
    }

    /// Insert a document. Returns `Ok(None)` on a URL/text_hash uniqueness
    /// conflict (duplicate).
    pub fn add_document(
        &self,
        url: &str,
        title: &str,
        text: &str,
        raw_html_hash: &str,
        text_hash: &str,
        language: Option<&str>,
    ) -> IndexResult<Option<i64>> {
        let compressed = self.compress(text);
        let crawled_at = infomesh_primitives::time::now_unix();
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO documents (url, title, text, compressed_text, language, raw_html_hash, text_hash, crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![url, title, text, compressed, language, raw_html_hash, text_hash, crawled_at],
        );
        match result {
            Ok(_) => Ok(Some(conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn search(&self, query: &str, limit: usize, offset: usize, filters: SearchFilters<'_>) -> IndexResult<Vec<SearchResult>> {
        let sanitized = sanitize_query(query);
        let limit = limit.clamp(1, 1000);

        let mut sql = String::from(
            "SELECT d.doc_id, d.url, d.title,
                    snippet(documents_fts, 1, '<b>', '</b>', '...', 40) AS snippet,
                    bm25(documents_fts) AS score,
                    d.language, d.crawled_at
             FROM documents_fts
             JOIN documents d ON d.doc_id = documents_fts.rowid
             WHERE documents_fts MATCH ?1",
        );
        let mut param_idx = 2;
        if filters.language.is_some() {
            sql.push_str(&format!(" AND d.language = ?{param_idx}"));
            param_idx += 1;
        }
        if filters.date_from.is_some() {
            sql.push_str(&format!(" AND d.crawled_at >= ?{param_idx}"));
            param_idx += 1;
        }
        if filters.date_to.is_some() {
            sql.push_str(&format!(" AND d.crawled_at <= ?{param_idx}"));
            param_idx += 1;
        }
        sql.push_str(" ORDER BY bm25(documents_fts) LIMIT ?");
        sql.push_str(&param_idx.to_string());
        param_idx += 1;
        sql.push_str(" OFFSET ?");
        sql.push_str(&param_idx.to_string());

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;

        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(sanitized)];
        if let Some(lang) = filters.language {
            bound.push(Box::new(lang.to_owned()));
        }
        if let Some(from) = filters.date_from {
            bound.push(Box::new(from));
        }
        if let Some(to) = filters.date_to {
            bound.push(Box::new(to));
        }
        bound.push(Box::new(limit as i64));
        bound.push(Box::new(offset as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(AsRef::as_ref).collect();

        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(SearchResult {
                doc_id: row.get(0)?,
                url: row.get(1)?,
                title: row.get(2)?,
                snippet: row.get(3)?,
                score: (row.get::<_, f64>(4)?).abs(),
                language: row.get(5)?,
                crawled_at: row.get(6)?,
            })
        })?;

        let mut results: Vec<SearchResult> = rows.filter_map(Result::ok).collect();

        if let Some(include) = filters.include_domains {
            results.retain(|r| include.iter().any(|d| r.url.contains(d)));
        }
        if let Some(exclude) = filters.exclude_domains {
            results.retain(|r| !exclude.iter().any(|d| r.url.contains(d)));
        }

        Ok(results)
    }

    pub fn get_document(&self, doc_id: i64) -> IndexResult<Option<IndexedDocument>> {
        let conn = self.conn.lock();
        self.row_to_doc(&conn, "SELECT * FROM documents WHERE doc_id = ?1", params![doc_id])
    }

    pub fn get_document_by_url(&self, url: &str) -> IndexResult<Option<IndexedDocument>> {
        let conn = self.conn.lock();
        self.row_to_doc(&conn, "SELECT * FROM documents WHERE url = ?1", params![url])
    }

    fn row_to_doc(
        &self,
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> IndexResult<Option<IndexedDocument>> {
        let result = conn
            .query_row(sql, params, |row| {
                let compressed: Option<Vec<u8>> = row.get("compressed_text")?;
                let stored_text: String = row.get("text")?;
                Ok((
                    IndexedDocument {
                        doc_id: row.get("doc_id")?,
                        url: row.get("url")?,
                        title: row.get("title")?,
                        text: String::new(),
                        language: row.get("language")?,
                        raw_html_hash: row.get("raw_html_hash")?,
                        text_hash: row.get("text_hash")?,
                        crawled_at: row.get("crawled_at")?,
                        etag: row.get("etag")?,
                        last_modified: row.get("last_modified")?,
                        recrawl_interval_secs: row.get("recrawl_interval")?,
                        stale_count: row.get("stale_count")?,
                        last_recrawl_at: row.get("last_recrawl_at")?,
                        change_frequency: row.get("change_frequency")?,
                    },
                    compressed,
                    stored_text,
                ))
            })
            .optional()?;

        Ok(result.map(|(mut doc, compressed, stored_text)| {
            doc.text = self.decompress(compressed, stored_text);
            doc
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_document(
        &self,
        url: &str,
        title: Option<&str>,
        text: Option<&str>,
        text_hash: Option<&str>,
        etag: Option<&str>,
        last_modified: Option<&str>,
        recrawl_interval_secs: Option<i64>,
        stale_count: Option<i64>,
        last_recrawl_at: Option<f64>,
        change_frequency: Option<f64>,
    ) -> IndexResult<bool> {
        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        macro_rules! set_field {
            ($col:literal, $val:expr) => {
                if let Some(v) = $val {
                    columns.push($col);
                    values.push(Box::new(v));
                }
            };
        }
        set_field!("title", title.map(str::to_owned));
        if let Some(text) = text {
            columns.push("text");
            values.push(Box::new(text.to_owned()));
            if let Some(compressed) = self.compress(text) {
                columns.push("compressed_text");
                values.push(Box::new(compressed));
            }
        }
        set_field!("text_hash", text_hash.map(str::to_owned));
        set_field!("etag", etag.map(str::to_owned));
        set_field!("last_modified", last_modified.map(str::to_owned));
        set_field!("recrawl_interval", recrawl_interval_secs);
        set_field!("stale_count", stale_count);
        set_field!("last_recrawl_at", last_recrawl_at);
        set_field!("change_frequency", change_frequency);

        if columns.is_empty() {
            return Ok(false);
        }

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE documents SET {} WHERE url = ?{}",
            assignments.join(", "),
            values.len() + 1
        );
        values.push(Box::new(url.to_owned()));

        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(AsRef::as_ref).collect();
        let conn = self.conn.lock();
        let updated = conn.execute(&sql, param_refs.as_slice())? > 0;
        Ok(updated)
    }

    pub fn soft_delete(&self, url: &str) -> IndexResult<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM documents WHERE url = ?1", params![url])? > 0;
        Ok(deleted)
    }

    pub fn get_recrawl_candidates(&self, limit: usize) -> IndexResult<Vec<IndexedDocument>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM documents WHERE stale_count < 3
             ORDER BY last_recrawl_at IS NOT NULL, last_recrawl_at ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let compressed: Option<Vec<u8>> = row.get("compressed_text")?;
            let stored_text: String = row.get("text")?;
            Ok((
                IndexedDocument {
                    doc_id: row.get("doc_id")?,
                    url: row.get("url")?,
                    title: row.get("title")?,
                    text: String::new(),
                    language: row.get("language")?,
                    raw_html_hash: row.get("raw_html_hash")?,
                    text_hash: row.get("text_hash")?,
                    crawled_at: row.get("crawled_at")?,
                    etag: row.get("etag")?,
                    last_modified: row.get("last_modified")?,
                    recrawl_interval_secs: row.get("recrawl_interval")?,
                    stale_count: row.get("stale_count")?,
                    last_recrawl_at: row.get("last_recrawl_at")?,
                    change_frequency: row.get("change_frequency")?,
                },
                compressed,
                stored_text,
            ))
        })?;

        let docs = rows
            .filter_map(Result::ok)
            .map(|(mut doc, compressed, stored_text)| {
                doc.text = self.decompress(compressed, stored_text);
                doc
            })
            .collect();
        Ok(docs)
    }

    pub fn export_documents(&self) -> IndexResult<Vec<ExportedDocument>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT url, title, text, compressed_text, language, raw_html_hash, text_hash, crawled_at
             FROM documents ORDER BY doc_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let compressed: Option<Vec<u8>> = row.get(3)?;
            let stored_text: String = row.get(2)?;
            Ok((
                ExportedDocument {
                    url: row.get(0)?,
                    title: row.get(1)?,
                    text: String::new(),
                    language: row.get(4)?,
                    raw_html_hash: row.get(5)?,
                    text_hash: row.get(6)?,
                    crawled_at: row.get(7)?,
                },
                compressed,
                stored_text,
            ))
        })?;
        let docs = rows
            .filter_map(Result::ok)
            .map(|(mut doc, compressed, stored_text)| {
                doc.text = self.decompress(compressed, stored_text);
                doc
            })
            .collect();
        Ok(docs)
    }

    /// Import a previously exported row, skipping it if its `text_hash`
    /// already exists. Returns `true` if inserted.
    pub fn import_document(&self, doc: &ExportedDocument) -> IndexResult<bool> {
        let raw_html_hash = if doc.raw_html_hash.is_empty() {
            doc.text_hash.clone()
        } else {
            doc.raw_html_hash.clone()
        };
        Ok(self
            .add_document(&doc.url, &doc.title, &doc.text, &raw_html_hash, &doc.text_hash, doc.language.as_deref())?
            .is_some())
    }

    pub fn get_stats(&self) -> IndexResult<DocumentStats> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(DocumentStats { document_count: count })
    }

    /// Compact the FTS index (called hourly by the crawl loop).
    pub fn optimize(&self) -> IndexResult<()> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO documents_fts(documents_fts) VALUES ('optimize')", [])?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentStats {
    pub document_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LocalStore {
        LocalStore::open_in_memory("unicode61").expect("open")
    }

    #[test]
    fn add_document_rejects_duplicate_url() {
        let store = store();
        let long_text = "rust is a systems programming language with a strong type system and no garbage collector";
        let first = store.add_document("https://example.com/a", "Title", long_text, "raw1", "hash1", None).unwrap();
        assert!(first.is_some());
        let second = store.add_document("https://example.com/a", "Title2", long_text, "raw2", "hash2", None).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn add_document_rejects_duplicate_text_hash() {
        let store = store();
        let text = "rust is a systems programming language with a strong type system and no garbage collector";
        store.add_document("https://example.com/a", "Title", text, "raw1", "sharedhash", None).unwrap();
        let second = store.add_document("https://example.com/b", "Title2", text, "raw2", "sharedhash", None).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn search_finds_indexed_document() {
        let store = store();
        let text = "the rust programming language emphasizes memory safety without garbage collection at runtime";
        store.add_document("https://example.com/a", "Rust Lang", text, "raw1", "hash1", None).unwrap();
        let results = store.search("rust", 10, 0, SearchFilters::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/a");
    }

    #[test]
    fn soft_delete_removes_document_from_search() {
        let store = store();
        let text = "the rust programming language emphasizes memory safety without garbage collection at runtime";
        store.add_document("https://example.com/a", "Rust Lang", text, "raw1", "hash1", None).unwrap();
        assert!(store.soft_delete("https://example.com/a").unwrap());
        let results = store.search("rust", 10, 0, SearchFilters::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn export_then_import_round_trips() {
        let store = store();
        let text = "exported documents should survive a round trip through the snapshot format intact";
        store.add_document("https://example.com/a", "Title", text, "raw1", "hash1", None).unwrap();
        let exported = store.export_documents().unwrap();
        assert_eq!(exported.len(), 1);

        let other = store();
        for doc in &exported {
            assert!(other.import_document(doc).unwrap());
        }
        // Re-importing the same row is skipped as a duplicate.
        for doc in &exported {
            assert!(!other.import_document(doc).unwrap());
        }
    }
}
