//! Directional link graph and PageRank-style domain authority (§4.8).
//!
//! Cross-domain links contribute full weight; same-domain (self) links
//! contribute 10% weight, so a site cannot inflate its own authority by
//! linking to itself.

use std::collections::HashMap;

use rusqlite::{params, Connection};

use crate::error::RankingResult;

const MAX_ITERATIONS: usize = 20;
const CONVERGENCE_THRESHOLD: f64 = 1e-6;
const DAMPING: f64 = 0.85;
const SELF_LINK_WEIGHT: f64 = 0.1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkGraphStats {
    pub link_count: i64,
    pub domain_count: i64,
}

/// SQLite-backed directed link graph with cached domain authority scores.
pub struct LinkGraph {
    conn: Connection,
}

impl LinkGraph {
    pub fn open(path: &str) -> RankingResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> RankingResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> RankingResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_url TEXT NOT NULL,
                target_url TEXT NOT NULL,
                source_domain TEXT NOT NULL,
                target_domain TEXT NOT NULL,
                created_at REAL NOT NULL,
                UNIQUE(source_url, target_url)
            );
            CREATE INDEX IF NOT EXISTS idx_target_domain ON links(target_domain);
            CREATE INDEX IF NOT EXISTS idx_source_domain ON links(source_domain);

            CREATE TABLE IF NOT EXISTS domain_authority (
                domain TEXT PRIMARY KEY,
                score REAL NOT NULL DEFAULT 0.0,
                inbound_count INTEGER NOT NULL DEFAULT 0,
                outbound_count INTEGER NOT NULL DEFAULT 0,
                updated_at REAL NOT NULL
            );",
        )?;
        Ok(())
    }

    fn extract_domain(url: &str) -> String {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Record edges from `source_url` to each of `target_urls`. Duplicate
    /// edges are silently skipped. Returns the number of rows inserted.
    pub fn add_links(&self, source_url: &str, target_urls: &[String]) -> RankingResult<usize> {
        let source_domain = Self::extract_domain(source_url);
        let now = infomesh_primitives::time::now_unix();
        let mut inserted = 0;
        for target in target_urls {
            let target_domain = Self::extract_domain(target);
            if target_domain.is_empty() {
                continue;
            }
            let changed = self.conn.execute(
                "INSERT OR IGNORE INTO links (source_url, target_url, source_domain, target_domain, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![source_url, target, source_domain, target_domain, now],
            )?;
            inserted += changed;
        }
        Ok(inserted)
    }

    /// Recompute every domain's authority score from the current link
    /// graph via damped iterative propagation, and persist the result.
    pub fn compute_domain_authority(&self) -> RankingResult<HashMap<String, f64>> {
        let all_domains: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT DISTINCT domain FROM (
                    SELECT source_domain AS domain FROM links
                    UNION
                    SELECT target_domain AS domain FROM links
                 )",
            )?;
            stmt.query_map([], |row| row.get(0))?.filter_map(Result::ok).collect()
        };
        let n = all_domains.len();
        if n == 0 {
            return Ok(HashMap::new());
        }

        let mut outbound: HashMap<String, i64> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT source_domain, COUNT(DISTINCT target_domain) FROM links
                 WHERE source_domain != target_domain GROUP BY source_domain",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows.filter_map(Result::ok) {
                outbound.insert(row.0, row.1);
            }
        }

        let mut edges: HashMap<String, Vec<(String, f64)>> =
            all_domains.iter().map(|d| (d.clone(), Vec::new())).collect();
        {
            let mut stmt = self.conn.prepare(
                "SELECT source_domain, target_domain, COUNT(*) AS link_count
                 FROM links GROUP BY source_domain, target_domain",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })?;
            for (source, target, count) in rows.filter_map(Result::ok) {
                let mut weight = count as f64;
                if source == target {
                    weight *= SELF_LINK_WEIGHT;
                }
                edges.entry(source).or_default().push((target, weight));
            }
        }

        let mut scores: HashMap<String, f64> = all_domains.iter().map(|d| (d.clone(), 1.0 / n as f64)).collect();

        for _ in 0..MAX_ITERATIONS {
            let mut new_scores: HashMap<String, f64> =
                all_domains.iter().map(|d| (d.clone(), (1.0 - DAMPING) / n as f64)).collect();

            for (src, targets) in &edges {
                let total_weight: f64 = targets.iter().map(|(_, w)| w).sum();
                if total_weight == 0.0 {
                    continue;
                }
                let src_score = scores[src];
                for (tgt, w) in targets {
                    *new_scores.get_mut(tgt).expect("target is in all_domains") += DAMPING * src_score * (w / total_weight);
                }
            }

            let diff: f64 = all_domains.iter().map(|d| (new_scores[d] - scores[d]).abs()).sum();
            scores = new_scores;
            if diff < CONVERGENCE_THRESHOLD {
                break;
            }
        }

        let max_score = scores.values().copied().fold(f64::MIN, f64::max);
        let normalized: HashMap<String, f64> = if max_score > 0.0 {
            scores.iter().map(|(d, s)| (d.clone(), s / max_score)).collect()
        } else {
            scores
        };

        let now = infomesh_primitives::time::now_unix();
        for (domain, score) in &normalized {
            let out_count = outbound.get(domain).copied().unwrap_or(0);
            let in_count: i64 = self.conn.query_row(
                "SELECT COUNT(DISTINCT source_domain) FROM links WHERE target_domain = ?1 AND source_domain != ?1",
                params![domain],
                |row| row.get(0),
            )?;
            self.conn.execute(
                "INSERT OR REPLACE INTO domain_authority (domain, score, inbound_count, outbound_count, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![domain, score, in_count, out_count, now],
            )?;
        }

        tracing::info!(domains = normalized.len(), "domain_authority_computed");
        Ok(normalized)
    }

    pub fn domain_authority(&self, domain: &str) -> RankingResult<f64> {
        let score = self
            .conn
            .query_row(
                "SELECT score FROM domain_authority WHERE domain = ?1",
                params![domain.to_lowercase()],
                |row| row.get(0),
            )
            .unwrap_or(0.0);
        Ok(score)
    }

    pub fn url_authority(&self, url: &str) -> RankingResult<f64> {
        let domain = Self::extract_domain(url);
        if domain.is_empty() {
            return Ok(0.0);
        }
        self.domain_authority(&domain)
    }

    pub fn get_stats(&self) -> RankingResult<LinkGraphStats> {
        let link_count: i64 = self.conn.query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))?;
        let domain_count: i64 = self.conn.query_row("SELECT COUNT(*) FROM domain_authority", [], |row| row.get(0))?;
        Ok(LinkGraphStats { link_count, domain_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_favors_domains_with_more_inbound_links() {
        let graph = LinkGraph::open_in_memory().unwrap();
        graph.add_links("https://a.com/1", &["https://popular.com".to_owned()]).unwrap();
        graph.add_links("https://b.com/1", &["https://popular.com".to_owned()]).unwrap();
        graph.add_links("https://c.com/1", &["https://obscure.com".to_owned()]).unwrap();

        let scores = graph.compute_domain_authority().unwrap();
        assert!(scores["popular.com"] > scores["obscure.com"]);
    }

    #[test]
    fn self_links_contribute_reduced_weight() {
        let graph = LinkGraph::open_in_memory().unwrap();
        graph.add_links("https://a.com/1", &["https://a.com/2".to_owned(), "https://b.com".to_owned()]).unwrap();
        graph.add_links("https://c.com/1", &["https://b.com".to_owned()]).unwrap();

        let scores = graph.compute_domain_authority().unwrap();
        assert!(scores["b.com"] > *scores.get("a.com").unwrap_or(&0.0));
    }

    #[test]
    fn duplicate_links_are_not_double_counted() {
        let graph = LinkGraph::open_in_memory().unwrap();
        let first = graph.add_links("https://a.com", &["https://b.com".to_owned()]).unwrap();
        let second = graph.add_links("https://a.com", &["https://b.com".to_owned()]).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[test]
    fn unknown_domain_has_zero_authority() {
        let graph = LinkGraph::open_in_memory().unwrap();
        assert_eq!(graph.domain_authority("nowhere.com").unwrap(), 0.0);
    }
}
