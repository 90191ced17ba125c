//! XOR-distance peer selection for Kademlia-style replica placement.
//!
//! Both peer IDs and the DHT key derived from a document's URL are
//!40-hex-character (160-bit) strings; distance is byte-wise XOR, compared
//! as an unsigned big-endian integer. Peers whose ID doesn't decode to 20
//! bytes sort last, since we can't place them in the keyspace.

fn decode(id: &str) -> Option<[u8; 20]> {
    let bytes = hex::decode(id).ok()?;
    bytes.try_into().ok()
}

fn xor_distance(a: &[u8; 20], b: &[u8; 20]) -> [u8; 20] {
    let mut out = [0u8; 20];
    for i in 0..20 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Sort `peer_ids` by ascending XOR distance to `target_key_hex`, closest
/// first. Peers with a malformed (non-40-hex) ID are pushed to the end in
/// their original relative order.
#[must_use]
pub fn closest_peers(target_key_hex: &str, peer_ids: &[String], n: usize) -> Vec<String> {
    let Some(target) = decode(target_key_hex) else {
        return peer_ids.iter().take(n).cloned().collect();
    };

    let mut scored: Vec<(Option<[u8; 20]>, String)> = peer_ids
        .iter()
        .map(|pid| (decode(pid).map(|bytes| xor_distance(&target, &bytes)), pid.clone()))
        .collect();

    scored.sort_by(|a, b| match (&a.0, &b.0) {
        (Some(da), Some(db)) => da.cmp(db),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    scored.into_iter().take(n).map(|(_, pid)| pid).collect()
}
