//! URL/content/near-duplicate deduplication store (§4.2).
//!
//! Backed by a single-writer SQLite database opened in WAL mode; the
//! SimHash index is in-memory only and is rebuilt from the `simhash`
//! column on process restart by replaying [`DedupStore::rebuild_index`].

use std::sync::Mutex;

use infomesh_primitives::hash::sha256_hex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CrawlResult;
use crate::normalize::normalize;
use crate::simhash::{simhash, SimHashIndex, HAMMING_THRESHOLD};

/// Converts the unsigned 64-bit fingerprint SQLite's signed `INTEGER`
/// column can hold without truncation.
fn to_signed64(value: u64) -> i64 {
    value as i64
}

fn to_unsigned64(value: i64) -> u64 {
    value as u64
}

pub struct DedupStore {
    conn: Mutex<Connection>,
    simhash_index: Mutex<SimHashIndex>,
}

impl DedupStore {
    pub fn open(path: &str) -> CrawlResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
            simhash_index: Mutex::new(SimHashIndex::default()),
        };
        store.rebuild_index()?;
        Ok(store)
    }

    pub fn open_in_memory() -> CrawlResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            simhash_index: Mutex::new(SimHashIndex::default()),
        })
    }

    fn init_schema(conn: &Connection) -> CrawlResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS seen_urls (
                url_hash TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                content_hash TEXT,
                simhash INTEGER,
                crawled_at REAL NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Replays every stored fingerprint into the in-memory SimHash index.
    /// Called once at startup after opening a durable store.
    fn rebuild_index(&self) -> CrawlResult<()> {
        let conn = self.conn.lock().expect("dedup connection poisoned");
        let mut stmt = conn.prepare("SELECT url_hash, simhash FROM seen_urls WHERE simhash IS NOT NULL")?;
        let mut rows = stmt.query([])?;
        let mut index = self.simhash_index.lock().expect("simhash index poisoned");
        while let Some(row) = rows.next()? {
            let url_hash: String = row.get(0)?;
            let fp_signed: i64 = row.get(1)?;
            let doc_id = doc_id_from_url_hash(&url_hash);
            index.add(doc_id, to_unsigned64(fp_signed));
        }
        Ok(())
    }

    pub fn is_url_seen(&self, url: &str) -> CrawlResult<bool> {
        let normalized = normalize(url);
        let url_hash = sha256_hex(normalized.as_bytes());
        let conn = self.conn.lock().expect("dedup connection poisoned");
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM seen_urls WHERE url_hash = ?1",
                params![url_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn is_content_seen(&self, text_hash: &str) -> CrawlResult<bool> {
        let conn = self.conn.lock().expect("dedup connection poisoned");
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM seen_urls WHERE content_hash = ?1",
                params![text_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    #[must_use]
    pub fn is_near_duplicate(&self, text: &str, threshold: u32) -> bool {
        let fp = simhash(text);
        let index = self.simhash_index.lock().expect("simhash index poisoned");
        !index.find_near_duplicates(fp, threshold).is_empty()
    }

    #[must_use]
    pub fn is_near_duplicate_default(&self, text: &str) -> bool {
        self.is_near_duplicate(text, HAMMING_THRESHOLD)
    }

    /// Record `url` (and, if `text` is supplied, its content hash and
    /// SimHash fingerprint) as seen. `INSERT OR REPLACE` semantics.
    pub fn mark_seen(&self, url: &str, text_hash: &str, text: Option<&str>) -> CrawlResult<()> {
        let normalized = normalize(url);
        let url_hash = sha256_hex(normalized.as_bytes());
        let fp = text.map(simhash);
        let fp_signed = fp.map(to_signed64);

        let crawled_at = infomesh_primitives::time::now_unix();
        {
            let conn = self.conn.lock().expect("dedup connection poisoned");
            conn.execute(
                "INSERT OR REPLACE INTO seen_urls (url_hash, url, content_hash, simhash, crawled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![url_hash, normalized, text_hash, fp_signed, crawled_at],
            )?;
        }

        if let Some(fp) = fp {
            let doc_id = doc_id_from_url_hash(&url_hash);
            let mut index = self.simhash_index.lock().expect("simhash index poisoned");
            index.add(doc_id, fp);
        }
        Ok(())
    }
}

/// A stable 31-bit identifier derived from the first 8 hex chars of a
/// url hash, used as the SimHash index's document id.
fn doc_id_from_url_hash(url_hash: &str) -> u64 {
    u64::from_str_radix(&url_hash[..8], 16).unwrap_or(0) & 0x7FFF_FFFF
}
