//! Index snapshot export/import: a trust-bootstrapping transfer format
//! for a new peer to seed its local index from another peer's documents
//! (§4.7, §4.17).
//!
//! Wire shape: `[4B BE header_len][zstd JSON header][zstd msgpack document array]`.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::store::{ExportedDocument, LocalStore};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub format_version: u32,
    pub document_count: usize,
    pub created_at: f64,
    #[serde(default)]
    pub source_peer_id: Option<String>,
}

/// Serialize every live document in `store` into the snapshot wire format.
pub fn export_snapshot(store: &LocalStore, source_peer_id: Option<&str>) -> IndexResult<Vec<u8>> {
    let documents = store.export_documents()?;

    let header = SnapshotHeader {
        format_version: FORMAT_VERSION,
        document_count: documents.len(),
        created_at: infomesh_primitives::time::now_unix(),
        source_peer_id: source_peer_id.map(str::to_owned),
    };

    let header_json = serde_json::to_vec(&header)?;
    let header_compressed = infomesh_primitives::hash::compress(&header_json, 3)?;

    let body_packed = rmp_serde::to_vec(&documents)?;
    let body_compressed = infomesh_primitives::hash::compress(&body_packed, 3)?;

    let mut out = Vec::with_capacity(4 + header_compressed.len() + body_compressed.len());
    out.extend_from_slice(&(header_compressed.len() as u32).to_be_bytes());
    out.extend_from_slice(&header_compressed);
    out.extend_from_slice(&body_compressed);
    Ok(out)
}

/// Read only the header of a snapshot, without decoding its (potentially
/// large) document body. Used to decide whether a peer's snapshot is
/// worth fetching in full.
pub fn read_snapshot_metadata(bytes: &[u8]) -> IndexResult<SnapshotHeader> {
    let header_compressed = header_slice(bytes)?;
    let header_json = infomesh_primitives::hash::decompress(header_compressed)?;
    let header: SnapshotHeader = serde_json::from_slice(&header_json)?;
    if header.format_version > FORMAT_VERSION {
        return Err(IndexError::SnapshotTooNew {
            found: header.format_version,
            supported: FORMAT_VERSION,
        });
    }
    Ok(header)
}

fn header_slice(bytes: &[u8]) -> IndexResult<&[u8]> {
    if bytes.len() < 4 {
        return Err(IndexError::CorruptSnapshot("truncated length prefix".into()));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[..4]);
    let header_len = u32::from_be_bytes(len_bytes) as usize;
    bytes
        .get(4..4 + header_len)
        .ok_or_else(|| IndexError::CorruptSnapshot("header length exceeds payload".into()))
}

/// Import documents from a snapshot into `store`. Rows whose `text_hash`
/// already exists are skipped. Returns the number of documents actually
/// inserted.
pub fn import_snapshot(store: &LocalStore, bytes: &[u8]) -> IndexResult<usize> {
    let header_compressed = header_slice(bytes)?;
    let header_len = header_compressed.len();
    let header_json = infomesh_primitives::hash::decompress(header_compressed)?;
    let header: SnapshotHeader = serde_json::from_slice(&header_json)?;
    if header.format_version > FORMAT_VERSION {
        return Err(IndexError::SnapshotTooNew {
            found: header.format_version,
            supported: FORMAT_VERSION,
        });
    }

    let body_compressed = bytes
        .get(4 + header_len..)
        .ok_or_else(|| IndexError::CorruptSnapshot("missing document body".into()))?;
    let body_packed = infomesh_primitives::hash::decompress(body_compressed)?;
    let documents: Vec<ExportedDocument> = rmp_serde::from_slice(&body_packed)?;

    let mut inserted = 0;
    for doc in &documents {
        if store.import_document(doc)? {
            inserted += 1;
        }
    }
    tracing::info!(
        inserted,
        skipped = documents.len() - inserted,
        "snapshot_imported"
    );
    Ok(inserted)
}

/// Write a snapshot to a file path, for CLI-driven export flows.
pub fn write_snapshot_file(store: &LocalStore, path: &str, source_peer_id: Option<&str>) -> IndexResult<()> {
    let bytes = export_snapshot(store, source_peer_id)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Read a snapshot from a file path and import it into `store`.
pub fn import_snapshot_file(store: &LocalStore, path: &str) -> IndexResult<usize> {
    let mut file = std::fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    import_snapshot(store, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_then_import_round_trips_via_bytes() {
        let source = LocalStore::open_in_memory("unicode61").unwrap();
        let text = "snapshot transfer should preserve document content across the wire format boundary";
        source
            .add_document("https://example.com/a", "Title", text, "raw1", "hash1", Some("en"))
            .unwrap();

        let bytes = export_snapshot(&source, Some("peer123")).unwrap();

        let meta = read_snapshot_metadata(&bytes).unwrap();
        assert_eq!(meta.document_count, 1);
        assert_eq!(meta.format_version, FORMAT_VERSION);
        assert_eq!(meta.source_peer_id.as_deref(), Some("peer123"));

        let dest = LocalStore::open_in_memory("unicode61").unwrap();
        let inserted = import_snapshot(&dest, &bytes).unwrap();
        assert_eq!(inserted, 1);

        let doc = dest.get_document_by_url("https://example.com/a").unwrap().unwrap();
        assert_eq!(doc.text, text);
    }

    #[test]
    fn import_skips_documents_with_duplicate_text_hash() {
        let source = LocalStore::open_in_memory("unicode61").unwrap();
        let text = "duplicate detection during import relies on the text_hash unique constraint";
        source
            .add_document("https://example.com/a", "Title", text, "raw1", "duphash", None)
            .unwrap();
        let bytes = export_snapshot(&source, None).unwrap();

        let dest = LocalStore::open_in_memory("unicode61").unwrap();
        dest.add_document("https://example.com/b", "Other", text, "raw2", "duphash", None)
            .unwrap();

        let inserted = import_snapshot(&dest, &bytes).unwrap();
        assert_eq!(inserted, 0);
    }

    #[test]
    fn rejects_snapshot_from_a_newer_format_version() {
        let header = SnapshotHeader {
            format_version: FORMAT_VERSION + 1,
            document_count: 0,
            created_at: 0.0,
            source_peer_id: None,
        };
        let header_json = serde_json::to_vec(&header).unwrap();
        let header_compressed = infomesh_primitives::hash::compress(&header_json, 3).unwrap();
        let body_compressed = infomesh_primitives::hash::compress(&rmp_serde::to_vec::<Vec<ExportedDocument>>(&vec![]).unwrap(), 3).unwrap();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(header_compressed.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&header_compressed);
        bytes.extend_from_slice(&body_compressed);

        let dest = LocalStore::open_in_memory("unicode61").unwrap();
        let err = import_snapshot(&dest, &bytes).unwrap_err();
        assert!(matches!(err, IndexError::SnapshotTooNew { .. }));
    }
}
