//! Atomic JSON status snapshot written to `p2p_status.json` (§6).
//!
//! Written via a temp-file-plus-rename so a reader never observes a
//! partially written file, the same convention `calimero-store`'s
//! snapshot helpers use for on-disk artifacts.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::NodeResult;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub peer_id: String,
    pub role: String,
    pub listen_address: String,
    pub connected_peers: usize,
    pub documents_indexed: u64,
    pub urls_crawled: u64,
    pub credits_earned: f64,
    pub updated_at: f64,
}

/// Write `snapshot` to `path` atomically: serialize to a sibling temp
/// file, then rename over the destination.
pub fn write_status(path: &Utf8Path, snapshot: &StatusSnapshot) -> NodeResult<()> {
    let body = serde_json::to_vec_pretty(snapshot)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
