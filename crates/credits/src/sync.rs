//! Cross-device credit synchronization (§4.16).
//!
//! Nodes that share an owner (the same hashed email) exchange signed
//! credit summaries so a user running InfoMesh on several machines sees
//! one aggregated contribution total. Only `sha256(email)` ever crosses
//! the wire; each node stays authoritative over its own ledger.

use std::collections::HashMap;

use infomesh_primitives::hash::sha256_hex;
use infomesh_primitives::identity::KeyPair;
use infomesh_primitives::time::now_unix;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::CreditsResult;
use crate::ledger::CreditLedger;

pub const SUMMARY_TTL_HOURS: f64 = 72.0;
pub const SYNC_INTERVAL_SECONDS: f64 = 300.0;
pub const MAX_PEER_SUMMARIES: usize = 20;
const FUTURE_SKEW_SECONDS: f64 = 300.0;

/// A signed snapshot of one node's credit totals, exchanged between
/// same-owner peers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditSummary {
    pub peer_id: String,
    pub owner_email_hash: String,
    pub total_earned: f64,
    pub total_spent: f64,
    pub contribution_score: f64,
    pub entry_count: i64,
    pub tier: String,
    pub timestamp: f64,
    pub signature: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregatedCreditStats {
    pub total_earned: f64,
    pub total_spent: f64,
    pub balance: f64,
    pub contribution_score: f64,
    pub node_count: usize,
    pub peer_summaries: Vec<CreditSummary>,
}

/// SQLite-backed store for peer credit summaries.
pub struct CreditSyncStore {
    conn: Mutex<Connection>,
}

impl CreditSyncStore {
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
            "CREATE TABLE IF NOT EXISTS peer_credit_summaries (
                peer_id             TEXT PRIMARY KEY,
                owner_email_hash    TEXT NOT NULL,
                total_earned        REAL NOT NULL DEFAULT 0,
                total_spent         REAL NOT NULL DEFAULT 0,
                contribution_score  REAL NOT NULL DEFAULT 0,
                entry_count         INTEGER NOT NULL DEFAULT 0,
                tier                TEXT NOT NULL DEFAULT 'Tier 1',
                timestamp           REAL NOT NULL DEFAULT 0,
                signature           TEXT NOT NULL DEFAULT '',
                received_at         REAL NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_pcs_owner
                ON peer_credit_summaries(owner_email_hash);",
        )?;
        Ok(())
    }

    pub fn store_summary(&self, summary: &CreditSummary) -> CreditsResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO peer_credit_summaries
                (peer_id, owner_email_hash, total_earned, total_spent,
                 contribution_score, entry_count, tier, timestamp,
                 signature, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(peer_id) DO UPDATE SET
                total_earned = excluded.total_earned,
                total_spent = excluded.total_spent,
                contribution_score = excluded.contribution_score,
                entry_count = excluded.entry_count,
                tier = excluded.tier,
                timestamp = excluded.timestamp,
                signature = excluded.signature,
                received_at = excluded.received_at",
            params![
                summary.peer_id,
                summary.owner_email_hash,
                summary.total_earned,
                summary.total_spent,
                summary.contribution_score,
                summary.entry_count,
                summary.tier,
                summary.timestamp,
                summary.signature,
                now_unix(),
            ],
        )?;
        tracing::info!(
            peer_id = %truncate(&summary.peer_id, 16),
            earned = summary.total_earned,
            score = summary.contribution_score,
            "peer_summary_stored"
        );
        Ok(())
    }

    pub fn get_peer_summaries(&self, owner_email_hash: &str) -> CreditsResult<Vec<CreditSummary>> {
        let cutoff = now_unix() - SUMMARY_TTL_HOURS * 3600.0;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT peer_id, owner_email_hash, total_earned, total_spent,
                    contribution_score, entry_count, tier, timestamp, signature
             FROM peer_credit_summaries
             WHERE owner_email_hash = ?1 AND timestamp > ?2
             ORDER BY timestamp DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![owner_email_hash, cutoff, MAX_PEER_SUMMARIES as i64], |row| {
            Ok(CreditSummary {
                peer_id: row.get(0)?,
                owner_email_hash: row.get(1)?,
                total_earned: row.get(2)?,
                total_spent: row.get(3)?,
                contribution_score: row.get(4)?,
                entry_count: row.get(5)?,
                tier: row.get(6)?,
                timestamp: row.get(7)?,
                signature: row.get(8)?,
            })
        })?;
        Ok(rows.filter_map(Result::ok).collect())
    }

    pub fn purge_stale(&self) -> CreditsResult<usize> {
        let cutoff = now_unix() - SUMMARY_TTL_HOURS * 3600.0;
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM peer_credit_summaries WHERE timestamp < ?1", params![cutoff])?;
        if deleted > 0 {
            tracing::info!(count = deleted, "stale_summaries_purged");
        }
        Ok(deleted)
    }

    pub fn remove_peer(&self, peer_id: &str) -> CreditsResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM peer_credit_summaries WHERE peer_id = ?1", params![peer_id])?;
        Ok(())
    }

    pub fn peer_count(&self, owner_email_hash: &str) -> CreditsResult<usize> {
        let cutoff = now_unix() - SUMMARY_TTL_HOURS * 3600.0;
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM peer_credit_summaries WHERE owner_email_hash = ?1 AND timestamp > ?2",
                params![owner_email_hash, cutoff],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(count as usize)
    }

    fn has_peer(&self, owner_email_hash: &str, peer_id: &str) -> CreditsResult<bool> {
        Ok(self.get_peer_summaries(owner_email_hash)?.iter().any(|s| s.peer_id == peer_id))
    }
}

fn truncate(s: &str, n: usize) -> &str {
    &s[..s.len().min(n)]
}

/// Orchestrates sync between same-owner nodes: builds signed local
/// summaries, validates and stores peer summaries, and aggregates stats.
pub struct CreditSyncManager<'a> {
    ledger: &'a CreditLedger,
    store: CreditSyncStore,
    key_pair: Option<&'a KeyPair>,
    local_peer_id: String,
    owner_email_hash: String,
    same_owner_peers: Mutex<HashMap<String, f64>>,
}

impl<'a> CreditSyncManager<'a> {
    #[must_use]
    pub fn new(
        ledger: &'a CreditLedger,
        store: CreditSyncStore,
        owner_email: &str,
        key_pair: Option<&'a KeyPair>,
        local_peer_id: impl Into<String>,
    ) -> Self {
        let owner_email_hash = if owner_email.is_empty() {
            String::new()
        } else {
            sha256_hex(owner_email.to_lowercase().trim().as_bytes())
        };
        Self {
            ledger,
            store,
            key_pair,
            local_peer_id: local_peer_id.into(),
            owner_email_hash,
            same_owner_peers: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn owner_email_hash(&self) -> &str {
        &self.owner_email_hash
    }

    #[must_use]
    pub fn has_identity(&self) -> bool {
        !self.owner_email_hash.is_empty()
    }

    pub fn build_summary(&self) -> CreditsResult<CreditSummary> {
        let stats = self.ledger.stats()?;
        let entry_count = self.ledger.entry_count()? as i64;
        let now = now_unix();

        let canonical = format!(
            "{}|{}|{}|{}|{}|{now}",
            self.local_peer_id, self.owner_email_hash, stats.total_earned, stats.total_spent, stats.contribution_score
        )
        .into_bytes();

        let signature = self.key_pair.map(|kp| hex::encode(kp.sign(&canonical).to_bytes())).unwrap_or_default();

        Ok(CreditSummary {
            peer_id: self.local_peer_id.clone(),
            owner_email_hash: self.owner_email_hash.clone(),
            total_earned: stats.total_earned,
            total_spent: stats.total_spent,
            contribution_score: stats.contribution_score,
            entry_count,
            tier: stats.tier().as_str().to_owned(),
            timestamp: now,
            signature,
        })
    }

    /// Validate and store a peer's summary. Returns `true` if accepted.
    pub fn receive_summary(&self, summary: &CreditSummary) -> CreditsResult<bool> {
        if !self.has_identity() {
            tracing::debug!("credit_sync_no_identity");
            return Ok(false);
        }
        if summary.owner_email_hash != self.owner_email_hash {
            tracing::debug!(
                local = %truncate(&self.owner_email_hash, 16),
                remote = %truncate(&summary.owner_email_hash, 16),
                "credit_sync_owner_mismatch"
            );
            return Ok(false);
        }
        if summary.peer_id == self.local_peer_id {
            return Ok(false);
        }
        if summary.timestamp > now_unix() + FUTURE_SKEW_SECONDS {
            tracing::warn!(peer_id = %truncate(&summary.peer_id, 16), "credit_sync_future_timestamp");
            return Ok(false);
        }

        let current_count = self.store.peer_count(&self.owner_email_hash)?;
        if current_count >= MAX_PEER_SUMMARIES && !self.store.has_peer(&self.owner_email_hash, &summary.peer_id)? {
            tracing::warn!("credit_sync_max_peers_reached");
            return Ok(false);
        }

        self.store.store_summary(summary)?;
        self.same_owner_peers.lock().insert(summary.peer_id.clone(), now_unix());

        tracing::info!(
            peer_id = %truncate(&summary.peer_id, 16),
            total_earned = summary.total_earned,
            score = summary.contribution_score,
            "credit_summary_received"
        );
        Ok(true)
    }

    pub fn aggregated_stats(&self) -> CreditsResult<AggregatedCreditStats> {
        let local = self.ledger.stats()?;
        let peer_summaries = if self.has_identity() { self.store.get_peer_summaries(&self.owner_email_hash)? } else { Vec::new() };

        let mut total_earned = local.total_earned;
        let mut total_spent = local.total_spent;
        let mut contribution_score = local.contribution_score;
        for summary in &peer_summaries {
            total_earned += summary.total_earned;
            total_spent += summary.total_spent;
            contribution_score += summary.contribution_score;
        }

        Ok(AggregatedCreditStats {
            total_earned,
            total_spent,
            balance: total_earned - total_spent,
            contribution_score,
            node_count: 1 + peer_summaries.len(),
            peer_summaries,
        })
    }

    #[must_use]
    pub fn needs_sync(&self, peer_id: &str) -> bool {
        let last = self.same_owner_peers.lock().get(peer_id).copied().unwrap_or(0.0);
        now_unix() - last > SYNC_INTERVAL_SECONDS
    }

    pub fn register_same_owner_peer(&self, peer_id: &str) {
        if peer_id != self.local_peer_id {
            self.same_owner_peers.lock().insert(peer_id.to_owned(), 0.0);
            tracing::info!(peer_id = %truncate(peer_id, 16), "same_owner_peer_discovered");
        }
    }

    #[must_use]
    pub fn same_owner_peers(&self) -> Vec<String> {
        self.same_owner_peers.lock().keys().cloned().collect()
    }

    pub fn purge_stale(&self) -> CreditsResult<usize> {
        self.store.purge_stale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ActionType;

    fn manager_with_ledger<'a>(ledger: &'a CreditLedger, key_pair: &'a KeyPair, email: &str, peer_id: &str) -> CreditSyncManager<'a> {
        CreditSyncManager::new(ledger, CreditSyncStore::open_in_memory().expect("store"), email, Some(key_pair), peer_id)
    }

    #[test]
    fn owner_email_hash_is_normalized() {
        let ledger = CreditLedger::open_in_memory().expect("open");
        let key_pair = KeyPair::generate();
        let a = manager_with_ledger(&ledger, &key_pair, "  User@Example.com ", "peer-a");
        let b = manager_with_ledger(&ledger, &key_pair, "user@example.com", "peer-b");
        assert_eq!(a.owner_email_hash(), b.owner_email_hash());
    }

    #[test]
    fn rejects_summary_for_different_owner() {
        let ledger = CreditLedger::open_in_memory().expect("open");
        let key_pair = KeyPair::generate();
        let manager = manager_with_ledger(&ledger, &key_pair, "a@example.com", "local");

        let mut other = manager.build_summary().expect("summary");
        other.peer_id = "remote".to_owned();
        other.owner_email_hash = "different-hash".to_owned();

        assert!(!manager.receive_summary(&other).expect("receive"));
    }

    #[test]
    fn rejects_own_summary() {
        let ledger = CreditLedger::open_in_memory().expect("open");
        let key_pair = KeyPair::generate();
        let manager = manager_with_ledger(&ledger, &key_pair, "a@example.com", "local");
        let own = manager.build_summary().expect("summary");
        assert!(!manager.receive_summary(&own).expect("receive"));
    }

    #[test]
    fn rejects_future_timestamp() {
        let ledger = CreditLedger::open_in_memory().expect("open");
        let key_pair = KeyPair::generate();
        let manager = manager_with_ledger(&ledger, &key_pair, "a@example.com", "local");

        let mut remote = manager.build_summary().expect("summary");
        remote.peer_id = "remote".to_owned();
        remote.timestamp = now_unix() + 10_000.0;

        assert!(!manager.receive_summary(&remote).expect("receive"));
    }

    #[test]
    fn accepts_and_aggregates_same_owner_summary() {
        let ledger = CreditLedger::open_in_memory().expect("open");
        let key_pair = KeyPair::generate();
        ledger.record_action(ActionType::Crawl, 10.0, None, Some(&key_pair)).expect("record");
        let manager = manager_with_ledger(&ledger, &key_pair, "a@example.com", "local");

        let mut remote = manager.build_summary().expect("summary");
        remote.peer_id = "remote".to_owned();
        remote.total_earned = 5.0;
        remote.contribution_score = 5.0;

        assert!(manager.receive_summary(&remote).expect("receive"));

        let aggregated = manager.aggregated_stats().expect("aggregated");
        assert_eq!(aggregated.node_count, 2);
        assert!((aggregated.total_earned - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn enforces_max_peer_summaries_cap() {
        let ledger = CreditLedger::open_in_memory().expect("open");
        let key_pair = KeyPair::generate();
        let manager = manager_with_ledger(&ledger, &key_pair, "a@example.com", "local");

        for i in 0..MAX_PEER_SUMMARIES {
            let mut remote = manager.build_summary().expect("summary");
            remote.peer_id = format!("peer-{i}");
            assert!(manager.receive_summary(&remote).expect("receive"));
        }

        let mut one_too_many = manager.build_summary().expect("summary");
        one_too_many.peer_id = "peer-overflow".to_owned();
        assert!(!manager.receive_summary(&one_too_many).expect("receive"));
    }
}
