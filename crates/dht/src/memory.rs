//! In-memory [`DhtStore`] implementation, used for single-node
//! deployments and tests where no real DHT transport is wired in.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::client::DhtStore;
use crate::error::DhtResult;

#[derive(Default)]
pub struct MemoryDhtStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDhtStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DhtStore for MemoryDhtStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> DhtResult<()> {
        self.entries.lock().insert(key.to_owned(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> DhtResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryDhtStore::new();
        store.put("/infomesh/kw/abc", b"value".to_vec()).await.unwrap();
        let value = store.get("/infomesh/kw/abc").await.unwrap();
        assert_eq!(value, Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let store = MemoryDhtStore::new();
        assert_eq!(store.get("/infomesh/kw/missing").await.unwrap(), None);
    }
}
