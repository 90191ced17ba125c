//! DMZ-crawler → private-indexer submission bridge (§4.18 role `crawler`
//! / role `search`), wire types 80/81.
//!
//! A `crawler` role has no local FTS index; instead of indexing what it
//! crawls, it forwards the extracted page to one or more configured
//! indexer peers. A `search` role receives those submissions, checks the
//! sender against an allow-list (empty ⇒ open, per §6's `peer_acl`), and
//! runs the normal `index_document` path on acceptance.

use std::sync::Arc;

use async_trait::async_trait;
use infomesh_index::LocalStore;
use infomesh_primitives::identity::verify_signature;
use infomesh_replicate::Replicator;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IndexSubmitMessage {
    pub url: String,
    pub title: String,
    pub text: String,
    pub raw_html_hash: String,
    pub text_hash: String,
    pub language: Option<String>,
    pub crawled_at: f64,
    pub peer_id: String,
    pub signature: Option<Vec<u8>>,
    pub discovered_links: Vec<String>,
}

impl IndexSubmitMessage {
    /// Canonical bytes signed by the submitting crawler: the same field
    /// order every time, independent of serde's map ordering.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.url.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.title.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.text_hash.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.raw_html_hash.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.crawled_at.to_string().as_bytes());
        buf
    }
}

/// Capability seam for opening the `/infomesh/index-submit/1.0.0`
/// stream to an indexer peer; the stream itself is Non-goal transport
/// machinery.
#[async_trait]
pub trait IndexSubmitTransport: Send + Sync {
    async fn send_submission(&self, peer_id: &str, message: &IndexSubmitMessage) -> bool;
}

/// Crawler-role side: forwards every successfully crawled page to the
/// configured indexer peers.
pub struct IndexSubmitSender {
    transport: Arc<dyn IndexSubmitTransport>,
    indexer_peers: Vec<String>,
}

impl IndexSubmitSender {
    #[must_use]
    pub fn new(transport: Arc<dyn IndexSubmitTransport>, indexer_peers: Vec<String>) -> Self {
        Self {
            transport,
            indexer_peers,
        }
    }

    /// Forward `message` to every configured indexer peer, returning the
    /// number that acknowledged successfully.
    pub async fn submit(&self, message: &IndexSubmitMessage) -> usize {
        let mut acked = 0;
        for peer_id in &self.indexer_peers {
            if self.transport.send_submission(peer_id, message).await {
                acked += 1;
            } else {
                tracing::warn!(peer_id, url = %message.url, "index_submit_failed");
            }
        }
        acked
    }
}

/// Search-role side: validates the sender against the peer ACL then
/// indexes locally.
pub struct IndexSubmitReceiver {
    store: Arc<LocalStore>,
    allow_list: Vec<String>,
    replicator: Option<Arc<Replicator>>,
}

impl IndexSubmitReceiver {
    #[must_use]
    pub fn new(store: Arc<LocalStore>, allow_list: Vec<String>) -> Self {
        Self {
            store,
            allow_list,
            replicator: None,
        }
    }

    #[must_use]
    pub fn with_replicator(mut self, replicator: Arc<Replicator>) -> Self {
        self.replicator = Some(replicator);
        self
    }

    /// `true` iff the peer ACL is empty (open) or contains `peer_id`.
    #[must_use]
    pub fn is_allowed(&self, peer_id: &str) -> bool {
        self.allow_list.is_empty() || self.allow_list.iter().any(|p| p == peer_id)
    }

    /// Accept and index a submission. Verifies the attached signature
    /// when both a signature and the submitter's public key are known
    /// (`public_key_bytes` is supplied by the caller from its peer
    /// directory, out of scope for this bridge), then, once indexed,
    /// pushes the document out to its replica set (§4.13).
    pub async fn receive(
        &self,
        message: &IndexSubmitMessage,
        public_key_bytes: Option<&[u8; 32]>,
    ) -> NodeResult<bool> {
        if !self.is_allowed(&message.peer_id) {
            tracing::warn!(peer_id = %message.peer_id, "index_submit_rejected_acl");
            return Err(NodeError::SubmitterNotAllowed(message.peer_id.clone()));
        }

        if let (Some(pubkey), Some(sig)) = (public_key_bytes, &message.signature) {
            let Ok(sig_bytes): Result<[u8; 64], _> = sig.as_slice().try_into() else {
                tracing::warn!(peer_id = %message.peer_id, "index_submit_malformed_signature");
                return Ok(false);
            };
            if !verify_signature(pubkey, &message.canonical_bytes(), &sig_bytes) {
                tracing::warn!(peer_id = %message.peer_id, "index_submit_bad_signature");
                return Ok(false);
            }
        }

        let inserted = self.store.add_document(
            &message.url,
            &message.title,
            &message.text,
            &message.raw_html_hash,
            &message.text_hash,
            message.language.as_deref(),
        )?;

        let Some(doc_id) = inserted else {
            return Ok(false);
        };

        if let Some(replicator) = &self.replicator {
            replicator
                .replicate_document(
                    doc_id as u64,
                    &message.url,
                    &message.title,
                    &message.text,
                    &message.text_hash,
                    message.language.as_deref().unwrap_or(""),
                )
                .await;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infomesh_primitives::identity::KeyPair;

    fn sample_message() -> IndexSubmitMessage {
        IndexSubmitMessage {
            url: "https://example.com/a".into(),
            title: "Example".into(),
            text: "a".repeat(60),
            raw_html_hash: "deadbeef".into(),
            text_hash: "beefdead".into(),
            language: Some("en".into()),
            crawled_at: 1000.0,
            peer_id: "crawler-1".into(),
            signature: None,
            discovered_links: vec![],
        }
    }

    #[test]
    fn open_acl_allows_any_peer() {
        let store = Arc::new(LocalStore::open_in_memory("unicode61").unwrap());
        let receiver = IndexSubmitReceiver::new(store, vec![]);
        assert!(receiver.is_allowed("anyone"));
    }

    #[test]
    fn closed_acl_rejects_unknown_peer() {
        let store = Arc::new(LocalStore::open_in_memory("unicode61").unwrap());
        let receiver = IndexSubmitReceiver::new(store, vec!["crawler-1".into()]);
        assert!(receiver.is_allowed("crawler-1"));
        assert!(!receiver.is_allowed("crawler-2"));
    }

    #[tokio::test]
    async fn rejected_submission_is_not_indexed() {
        let store = Arc::new(LocalStore::open_in_memory("unicode61").unwrap());
        let receiver = IndexSubmitReceiver::new(Arc::clone(&store), vec!["only-this-one".into()]);
        let result = receiver.receive(&sample_message(), None).await;
        assert!(result.is_err());
        assert_eq!(store.get_stats().unwrap().document_count, 0);
    }

    #[tokio::test]
    async fn accepted_submission_is_indexed() {
        let store = Arc::new(LocalStore::open_in_memory("unicode61").unwrap());
        let receiver = IndexSubmitReceiver::new(Arc::clone(&store), vec![]);
        let inserted = receiver.receive(&sample_message(), None).await.unwrap();
        assert!(inserted);
        assert_eq!(store.get_stats().unwrap().document_count, 1);
    }

    #[tokio::test]
    async fn tampered_signature_is_not_indexed() {
        let store = Arc::new(LocalStore::open_in_memory("unicode61").unwrap());
        let receiver = IndexSubmitReceiver::new(Arc::clone(&store), vec![]);
        let key_pair = KeyPair::generate();
        let mut message = sample_message();
        let sig = key_pair.sign(&message.canonical_bytes());
        message.signature = Some(sig.to_bytes().to_vec());
        message.title = "Tampered Title".into();

        let accepted = receiver
            .receive(&message, Some(&key_pair.public_key_bytes()))
            .await
            .unwrap();
        assert!(!accepted);
        assert_eq!(store.get_stats().unwrap().document_count, 0);
    }
}
