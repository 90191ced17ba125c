//! Append-only signed credit ledger (§4.15).

use std::fmt;

use ed25519_dalek::Signature;
use infomesh_primitives::hash::sha256_hex;
use infomesh_primitives::identity::KeyPair;
use infomesh_primitives::time::now_unix;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::CreditsResult;

/// Named actions a node can be credited for. New variants must also be
/// added to [`ActionType::ALL`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ActionType {
    Crawl,
    QueryProcess,
    NetworkUptime,
}

impl ActionType {
    pub const ALL: [ActionType; 3] = [Self::Crawl, Self::QueryProcess, Self::NetworkUptime];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::QueryProcess => "query_process",
            Self::NetworkUptime => "network_uptime",
        }
    }

    /// Per-unit credit weight. Crawling and query processing are active,
    /// directly-useful contributions and are weighted accordingly; bare
    /// uptime is passive and weighted far lower so it cannot dominate the
    /// contribution score just by staying connected.
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Self::Crawl => 1.0,
            Self::QueryProcess => 0.5,
            Self::NetworkUptime => 0.1,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = crate::error::CreditsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| crate::error::CreditsError::UnknownAction(s.to_owned()))
    }
}

/// Tier labels surfaced in credit summaries. Thresholds are on cumulative
/// `contribution_score` (earned minus spent).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tier {
    One,
    Two,
    Three,
    Four,
    Five,
}

impl Tier {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 2000.0 {
            Self::Five
        } else if score >= 500.0 {
            Self::Four
        } else if score >= 100.0 {
            Self::Three
        } else if score >= 20.0 {
            Self::Two
        } else {
            Self::One
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::One => "Tier 1",
            Self::Two => "Tier 2",
            Self::Three => "Tier 3",
            Self::Four => "Tier 4",
            Self::Five => "Tier 5",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single append-only ledger row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreditEntry {
    pub id: i64,
    pub action: String,
    pub quantity: f64,
    pub weight: f64,
    pub multiplier: f64,
    pub credits: f64,
    pub timestamp: f64,
    pub note: String,
    pub entry_hash: String,
    pub signature: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CreditStats {
    pub total_earned: f64,
    pub total_spent: f64,
    pub contribution_score: f64,
}

impl CreditStats {
    #[must_use]
    pub fn tier(&self) -> Tier {
        Tier::from_score(self.contribution_score)
    }
}

/// Canonical byte form of an entry's signable fields. Exposed so a proof
/// response can be re-derived and so a signature can be (re)computed over
/// an entry pulled off the wire.
#[must_use]
pub fn entry_canonical(
    action: &str,
    quantity: f64,
    weight: f64,
    multiplier: f64,
    credits: f64,
    timestamp: f64,
    note: &str,
) -> Vec<u8> {
    format!("{action}|{quantity}|{weight}|{multiplier}|{credits}|{timestamp}|{note}").into_bytes()
}

/// SQLite-backed append-only ledger. A single connection behind a mutex;
/// entries are never updated or deleted once written.
pub struct CreditLedger {
    conn: Mutex<Connection>,
}

impl CreditLedger {
    pub fn open(path: &str) -> CreditsResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> CreditsResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> CreditsResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS credit_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                quantity REAL NOT NULL,
                weight REAL NOT NULL,
                multiplier REAL NOT NULL,
                credits REAL NOT NULL,
                timestamp REAL NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                entry_hash TEXT NOT NULL DEFAULT '',
                signature TEXT NOT NULL DEFAULT ''
            );",
        )?;
        Self::migrate_schema(conn)?;
        Ok(())
    }

    /// Additive, idempotent migration for ledgers written before the
    /// hash/signature columns existed.
    fn migrate_schema(conn: &Connection) -> CreditsResult<()> {
        let mut stmt = conn.prepare("PRAGMA table_info(credit_entries)")?;
        let existing: std::collections::HashSet<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(Result::ok)
            .collect();

        let migrations: &[(&str, &str)] = &[
            ("entry_hash", "ALTER TABLE credit_entries ADD COLUMN entry_hash TEXT NOT NULL DEFAULT ''"),
            ("signature", "ALTER TABLE credit_entries ADD COLUMN signature TEXT NOT NULL DEFAULT ''"),
        ];
        for (column, ddl) in migrations {
            if !existing.contains(*column) {
                conn.execute(ddl, [])?;
                tracing::info!(column, "credit_ledger_schema_migrated");
            }
        }
        Ok(())
    }

    /// Record an action, appending a new entry. `quantity` may be negative
    /// to represent a spend. When `key_pair` is given the canonical bytes
    /// are signed with Ed25519 and the hex signature is stored alongside
    /// the entry; otherwise the signature is left empty.
    pub fn record_action(
        &self,
        action: ActionType,
        quantity: f64,
        note: Option<&str>,
        key_pair: Option<&KeyPair>,
    ) -> CreditsResult<CreditEntry> {
        let weight = action.weight();
        let multiplier = 1.0;
        let credits = weight * quantity * multiplier;
        let timestamp = now_unix();
        let note = note.unwrap_or("").to_owned();

        let canonical = entry_canonical(action.as_str(), quantity, weight, multiplier, credits, timestamp, &note);
        let entry_hash = sha256_hex(&canonical);
        let signature = key_pair.map(|kp| hex::encode(kp.sign(&canonical).to_bytes())).unwrap_or_default();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO credit_entries
                (action, quantity, weight, multiplier, credits, timestamp, note, entry_hash, signature)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![action.as_str(), quantity, weight, multiplier, credits, timestamp, note, entry_hash, signature],
        )?;
        let id = conn.last_insert_rowid();

        Ok(CreditEntry {
            id,
            action: action.as_str().to_owned(),
            quantity,
            weight,
            multiplier,
            credits,
            timestamp,
            note,
            entry_hash,
            signature,
        })
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CreditEntry> {
        Ok(CreditEntry {
            id: row.get("id")?,
            action: row.get("action")?,
            quantity: row.get("quantity")?,
            weight: row.get("weight")?,
            multiplier: row.get("multiplier")?,
            credits: row.get("credits")?,
            timestamp: row.get("timestamp")?,
            note: row.get("note")?,
            entry_hash: row.get("entry_hash")?,
            signature: row.get("signature")?,
        })
    }

    /// Most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: usize) -> CreditsResult<Vec<CreditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM credit_entries ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_entry)?;
        Ok(rows.filter_map(Result::ok).collect())
    }

    /// All entries in insertion order.
    pub fn all_entries(&self) -> CreditsResult<Vec<CreditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM credit_entries ORDER BY id ASC")?;
        let rows = stmt.query_map([], Self::row_to_entry)?;
        Ok(rows.filter_map(Result::ok).collect())
    }

    /// Entries that carry a non-empty signature.
    pub fn signed_entries(&self) -> CreditsResult<Vec<CreditEntry>> {
        Ok(self.all_entries()?.into_iter().filter(|e| !e.signature.is_empty()).collect())
    }

    pub fn entry_count(&self) -> CreditsResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM credit_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Credits broken down per action, e.g. `{"crawl": 6.0, "query_process": 1.5}`.
    pub fn action_breakdown(&self) -> CreditsResult<std::collections::BTreeMap<String, f64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT action, SUM(credits) FROM credit_entries GROUP BY action")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
        Ok(rows.filter_map(Result::ok).collect())
    }

    pub fn stats(&self) -> CreditsResult<CreditStats> {
        let conn = self.conn.lock();
        let (earned, spent): (Option<f64>, Option<f64>) = conn.query_row(
            "SELECT SUM(CASE WHEN credits > 0 THEN credits ELSE 0 END),
                    SUM(CASE WHEN credits < 0 THEN -credits ELSE 0 END)
             FROM credit_entries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let total_earned = earned.unwrap_or(0.0);
        let total_spent = spent.unwrap_or(0.0);
        Ok(CreditStats {
            total_earned,
            total_spent,
            contribution_score: total_earned - total_spent,
        })
    }

    /// Look up a single entry by id (used by proof verification to re-walk
    /// a sampled entry's position, and by tests).
    pub fn entry(&self, id: i64) -> CreditsResult<Option<CreditEntry>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row("SELECT * FROM credit_entries WHERE id = ?1", params![id], Self::row_to_entry)
            .optional()?)
    }

    /// Drop the underlying connection explicitly rather than relying on
    /// scope exit.
    pub fn close(self) {
        drop(self);
    }
}

/// Verify a raw Ed25519 signature (hex-encoded) over `canonical` bytes
/// against a raw public key (hex-encoded). Returns `false` on any
/// malformed hex rather than erroring, matching the "garbage input fails
/// closed" posture of the rest of the verification surface.
#[must_use]
pub fn verify_hex_signature(public_key_hex: &str, canonical: &[u8], signature_hex: &str) -> bool {
    let Ok(pk_bytes) = hex::decode(public_key_hex) else { return false };
    let Ok(pk_array) = <[u8; 32]>::try_from(pk_bytes.as_slice()) else { return false };
    let Ok(sig_bytes) = hex::decode(signature_hex) else { return false };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else { return false };
    infomesh_primitives::identity::verify_signature(&pk_array, canonical, &sig_array)
}

/// Recover an Ed25519 [`Signature`] from hex for round-trip tests.
#[must_use]
pub fn signature_from_hex(signature_hex: &str) -> Option<Signature> {
    let bytes = hex::decode(signature_hex).ok()?;
    let array: [u8; 64] = bytes.try_into().ok()?;
    Some(Signature::from_bytes(&array))
}
